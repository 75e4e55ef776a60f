use clap::Parser;
use std::io::IsTerminal;
use taskflow_engine::cli::{Cli, Commands, RecurCommands};
use taskflow_engine::cli_handlers::{
    handle_config_command, handle_dep_command, handle_recur_command, handle_task_command,
};
use taskflow_engine::error::Result;
use taskflow_engine::logging::{self, ApplicationMode, LoggingConfig};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let sweep = matches!(cli.command, Commands::Recur(RecurCommands::Due { .. }));

    // Unattended `recur due` runs (stdout redirected, e.g. from cron) log to a file.
    let init = if sweep && !std::io::stdout().is_terminal() && cli.default_logging() {
        logging::init_logging(LoggingConfig::for_mode(ApplicationMode::Sweep))
    } else if cli.default_logging() {
        logging::init_from_env()
    } else {
        logging::init_logging(LoggingConfig::from_args(
            cli.quiet,
            cli.verbose > 0,
            cli.json,
        ))
    };

    if let Err(e) = init {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(cli).await {
        let error_response = e.to_error_response();
        match serde_json::to_string_pretty(&error_response) {
            Ok(body) => eprintln!("{}", body),
            Err(_) => eprintln!("{}", e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Task(cmd) => handle_task_command(cmd).await,
        Commands::Dep(cmd) => handle_dep_command(cmd).await,
        Commands::Recur(cmd) => handle_recur_command(cmd).await,
        Commands::Config(cmd) => handle_config_command(cmd).await,
    }
}
