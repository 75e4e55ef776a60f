// CLI command handlers
//
// One module per command group: task, dep, recur, config.

pub mod config_commands;
pub mod dep_commands;
pub mod recur_commands;
pub mod task_commands;
pub mod utils;

pub use config_commands::handle_config_command;
pub use dep_commands::handle_dep_command;
pub use recur_commands::handle_recur_command;
pub use task_commands::handle_task_command;
pub use utils::{print_json, read_stdin};
