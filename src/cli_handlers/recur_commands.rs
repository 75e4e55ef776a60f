use super::config_commands::{lookahead_days, DEFAULT_LOOKAHEAD_DAYS};
use super::utils::{parse_pattern, print_json};
use crate::cli::RecurCommands;
use crate::db::models::{GeneratedInstance, Task};
use crate::error::{EngineError, Result};
use crate::instances::InstanceManager;
use crate::project::ProjectContext;
use crate::recurrence;
use crate::storage::{SqliteTaskStore, TaskStore};
use chrono::Utc;
use serde_json::json;

/// Handle all `tfe recur` subcommands
pub async fn handle_recur_command(cmd: RecurCommands) -> Result<()> {
    match cmd {
        RecurCommands::Next { pattern, from } => {
            let pattern = parse_pattern(&pattern)?;
            print_json(&recurrence::calculate_next_occurrence(
                &pattern,
                from.as_deref(),
            )?)
        },
        RecurCommands::Preview {
            pattern,
            from,
            days,
        } => {
            let pattern = parse_pattern(&pattern)?;
            let from = from.unwrap_or_else(|| recurrence::format_iso(Utc::now()));
            let days = match days {
                Some(days) => days,
                None => configured_lookahead().await?,
            };

            let dates = recurrence::get_upcoming_instances(&pattern, &from, days)?;
            print_json(&json!({
                "from": from,
                "lookAheadDays": days,
                "dates": dates,
            }))
        },
        RecurCommands::Describe { pattern } => {
            let pattern = parse_pattern(&pattern)?;
            print_json(&json!({
                "description": recurrence::get_pattern_description(&pattern),
            }))
        },
        RecurCommands::Generate { template_id, date } => {
            let ctx = ProjectContext::load_or_init().await?;
            let store = ctx.store();
            let template = load_task(&store, &template_id).await?;
            let date = date.unwrap_or_else(|| recurrence::format_iso(Utc::now()));

            let generated = InstanceManager::new(&store, &ctx.locks)
                .materialize_next(&template, &date)
                .await?;
            print_json(&generated)
        },
        RecurCommands::Due {
            template_id,
            project,
        } => {
            let ctx = ProjectContext::load_or_init().await?;
            let store = ctx.store();

            let sweep = project.is_some();
            let templates = match (template_id, project) {
                (Some(id), _) => vec![load_task(&store, &id).await?],
                (None, Some(project)) => store
                    .list_project_tasks(&project)
                    .await?
                    .into_iter()
                    .filter(Task::is_template)
                    .collect(),
                (None, None) => {
                    return Err(EngineError::InvalidInput(
                        "Pass a template id or --project".to_string(),
                    ))
                },
            };

            let generated = materialize_due(&store, &ctx, &templates, sweep).await?;
            print_json(&generated)
        },
        RecurCommands::Instances { template_id } => {
            let ctx = ProjectContext::load_or_init().await?;
            let store = ctx.store();
            let instances = InstanceManager::new(&store, &ctx.locks)
                .get_instances(&template_id)
                .await?;
            print_json(&instances)
        },
    }
}

async fn load_task(store: &SqliteTaskStore, id: &str) -> Result<Task> {
    store
        .get_task(id)
        .await?
        .ok_or_else(|| EngineError::TaskNotFound(id.to_string()))
}

/// Preview window from project settings; pure pattern commands also work
/// outside a project.
async fn configured_lookahead() -> Result<u32> {
    match ProjectContext::load().await {
        Ok(ctx) => lookahead_days(&ctx.pool).await,
        Err(EngineError::NotAProject) => Ok(DEFAULT_LOOKAHEAD_DAYS),
        Err(e) => Err(e),
    }
}

/// Catch every template up to now, one instance at a time.
///
/// In a project sweep a failing template is logged and skipped.
async fn materialize_due(
    store: &SqliteTaskStore,
    ctx: &ProjectContext,
    templates: &[Task],
    sweep: bool,
) -> Result<Vec<GeneratedInstance>> {
    let mgr = InstanceManager::new(store, &ctx.locks);
    let now = Utc::now();
    let mut generated = Vec::new();

    for template in templates {
        let before = generated.len();
        loop {
            match mgr.materialize_if_due(template, now).await {
                Ok(Some(instance)) => generated.push(instance),
                Ok(None) => break,
                Err(e) if sweep => {
                    crate::log_error!(e, template.id.as_str());
                    break;
                },
                Err(e) => return Err(e),
            }
        }
        tracing::info!(
            template_id = %template.id,
            generated = generated.len() - before,
            "Materialized due instances"
        );
    }

    Ok(generated)
}
