use super::utils::{parse_pattern, print_json};
use crate::cli::TaskCommands;
use crate::db::models::Task;
use crate::error::Result;
use crate::project::ProjectContext;
use crate::tasks::TaskManager;
use serde_json::json;

/// Handle all `tfe task` subcommands
pub async fn handle_task_command(cmd: TaskCommands) -> Result<()> {
    let ctx = ProjectContext::load_or_init().await?;
    let store = ctx.store();
    let mgr = TaskManager::new(&store, &ctx.locks);

    match cmd {
        TaskCommands::Add {
            name,
            project,
            id,
            description,
            priority,
            due,
            start,
            recurrence,
        } => {
            let mut task = Task::new(id.unwrap_or_default(), project, name);
            task.description = description;
            task.priority = priority;
            task.due_date = due;
            task.start_date = start;
            task.recurrence_pattern = recurrence.as_deref().map(parse_pattern).transpose()?;

            print_json(&mgr.add_task(task).await?)
        },
        TaskCommands::List { project } => print_json(&mgr.list_tasks(&project).await?),
        TaskCommands::Get { id } => print_json(&mgr.get_task(&id).await?),
        TaskCommands::Start { id } => print_json(&mgr.start_task(&id).await?),
        TaskCommands::Done { id } => print_json(&mgr.complete_task(&id).await?),
        TaskCommands::Delete { id } => {
            mgr.delete_task(&id).await?;
            print_json(&json!({ "id": id, "deleted": true }))
        },
    }
}
