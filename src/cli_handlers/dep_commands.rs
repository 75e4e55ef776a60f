use super::utils::print_json;
use crate::cli::DepCommands;
use crate::dependencies::DependencyManager;
use crate::error::{EngineError, Result};
use crate::project::ProjectContext;
use crate::storage::TaskStore;
use serde_json::json;

/// Handle all `tfe dep` subcommands
pub async fn handle_dep_command(cmd: DepCommands) -> Result<()> {
    let ctx = ProjectContext::load_or_init().await?;
    let store = ctx.store();
    let mgr = DependencyManager::new(&store, &ctx.locks);

    match cmd {
        DepCommands::Add {
            dependent,
            blocking,
            project,
        } => print_json(
            &mgr.add_project_dependency(&project, &dependent, &blocking)
                .await?,
        ),
        DepCommands::Remove {
            dependent,
            blocking,
        } => {
            let task = store
                .get_task(&dependent)
                .await?
                .ok_or_else(|| EngineError::TaskNotFound(dependent.clone()))?;
            let removed = mgr
                .remove_project_dependency(&task.project_id, &dependent, &blocking)
                .await?;
            print_json(&json!({
                "dependentTaskId": dependent,
                "blockingTaskId": blocking,
                "removed": removed,
            }))
        },
        DepCommands::Status { id } => print_json(&mgr.get_dependency_status(&id).await?),
        DepCommands::Validate {
            dependent,
            blocking,
            project,
        } => print_json(
            &mgr.validate_project_dependency(&project, &dependent, &blocking)
                .await?,
        ),
        DepCommands::Order { project } => print_json(&mgr.get_topological_order(&project).await?),
        DepCommands::CriticalPath { project } => {
            print_json(&mgr.get_critical_path(&project).await?)
        },
    }
}
