use clap::{Parser, Subcommand};

const LONG_ABOUT: &str = r#"
Taskflow Engine - task dependencies and recurring tasks

Dependencies:
  tfe dep add B A --project web     ← B is blocked by A
  tfe dep order --project web       ← blockers first
  tfe dep critical-path --project web

Recurrence:
  tfe recur preview --pattern '{"frequency":"weekly","daysOfWeek":[1,3]}'
  tfe recur due <TEMPLATE_ID>       ← generate instances that are due

Key Rules:
  • a task cannot depend on itself, and no edge may close a cycle
  • a task with incomplete blockers cannot be started or completed
  • endDate and maxOccurrences are mutually exclusive

Patterns are JSON objects with camelCase fields; pass `-` to read one
from stdin. Every command prints JSON on stdout; errors are printed as
JSON on stderr with a non-zero exit status.
"#;

#[derive(Parser, Clone)]
#[command(name = "tfe")]
#[command(about = "Task dependency graph and recurrence engine")]
#[command(long_about = LONG_ABOUT)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output (-q)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output logs in JSON format
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// True when no logging flag was given on the command line.
    pub fn default_logging(&self) -> bool {
        self.verbose == 0 && !self.quiet && !self.json
    }
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Create, inspect and progress tasks
    #[command(subcommand)]
    Task(TaskCommands),

    /// Manage "blocked by" edges between tasks
    #[command(subcommand)]
    Dep(DepCommands),

    /// Evaluate recurrence patterns and materialize instances
    #[command(subcommand)]
    Recur(RecurCommands),

    /// Manage project settings
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Clone)]
pub enum TaskCommands {
    /// Create a task, or a recurrence template when --recurrence is given
    ///
    /// Examples:
    ///   tfe task add --name "Design API" --project web
    ///   tfe task add --name "Standup" --project web --start 2026-01-05 \
    ///       --recurrence '{"frequency":"weekly","daysOfWeek":[1,2,3,4,5]}'
    Add {
        #[arg(long)]
        name: String,

        #[arg(long)]
        project: String,

        /// Explicit task id (a UUID is generated otherwise)
        #[arg(long)]
        id: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        priority: Option<i32>,

        /// Due date (YYYY-MM-DD or ISO-8601)
        #[arg(long)]
        due: Option<String>,

        /// Start date (YYYY-MM-DD or ISO-8601)
        #[arg(long)]
        start: Option<String>,

        /// Recurrence pattern as JSON, or `-` for stdin
        #[arg(long)]
        recurrence: Option<String>,
    },

    /// List a project's tasks with their blocked flags
    List {
        #[arg(long)]
        project: String,
    },

    /// Show one task
    Get { id: String },

    /// Move a task to doing (refused while blocked)
    Start { id: String },

    /// Complete a task (refused while blocked)
    Done { id: String },

    /// Delete a task with its edges and, for templates, its instance records
    Delete { id: String },
}

#[derive(Subcommand, Clone)]
pub enum DepCommands {
    /// Record that DEPENDENT is blocked by BLOCKING
    Add {
        dependent: String,
        blocking: String,

        #[arg(long)]
        project: String,
    },

    /// Remove the edge DEPENDENT → BLOCKING
    Remove { dependent: String, blocking: String },

    /// Show blockers, dependents and whether a task can start
    Status { id: String },

    /// Check an edge without persisting it
    Validate {
        dependent: String,
        blocking: String,

        #[arg(long)]
        project: String,
    },

    /// Print the project's tasks in execution order
    Order {
        #[arg(long)]
        project: String,
    },

    /// Print the longest blocking chain of the project
    CriticalPath {
        #[arg(long)]
        project: String,
    },
}

#[derive(Subcommand, Clone)]
pub enum RecurCommands {
    /// Next occurrence strictly after --from (default: now)
    Next {
        /// Pattern JSON, or `-` for stdin
        #[arg(long)]
        pattern: String,

        #[arg(long)]
        from: Option<String>,
    },

    /// Occurrence dates in a look-ahead window, --from included
    ///
    /// The window defaults to the `recurrence.lookahead_days` setting (30).
    Preview {
        #[arg(long)]
        pattern: String,

        #[arg(long)]
        from: Option<String>,

        #[arg(long)]
        days: Option<u32>,
    },

    /// Human-readable description of a pattern
    Describe {
        #[arg(long)]
        pattern: String,
    },

    /// Materialize the next instance of a template on --date (default: now)
    Generate {
        template_id: String,

        #[arg(long)]
        date: Option<String>,
    },

    /// Materialize every instance that is due now
    ///
    /// Pass a template id, or --project to sweep all templates of a project.
    Due {
        #[arg(required_unless_present = "project")]
        template_id: Option<String>,

        #[arg(long, conflicts_with = "template_id")]
        project: Option<String>,
    },

    /// List instance records of a template
    Instances { template_id: String },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Set a configuration value
    ///
    /// Examples:
    ///   tfe config set recurrence.lookahead_days 14
    Set {
        key: String,
        value: String,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Get a configuration value
    Get {
        key: String,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// List configuration entries
    List {
        /// Filter by key prefix (e.g., "recurrence")
        #[arg(long)]
        prefix: Option<String>,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Remove a configuration entry
    Unset {
        key: String,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_dep_add() {
        let cli = Cli::try_parse_from(["tfe", "dep", "add", "t2", "t1", "--project", "web"]).unwrap();
        match &cli.command {
            Commands::Dep(DepCommands::Add {
                dependent,
                blocking,
                project,
            }) => {
                assert_eq!(dependent, "t2");
                assert_eq!(blocking, "t1");
                assert_eq!(project, "web");
            },
            _ => panic!("expected dep add"),
        }
        assert!(cli.default_logging());
    }

    #[test]
    fn test_recur_due_requires_template_or_project() {
        assert!(Cli::try_parse_from(["tfe", "recur", "due"]).is_err());
        assert!(Cli::try_parse_from(["tfe", "recur", "due", "tpl"]).is_ok());
        assert!(Cli::try_parse_from(["tfe", "recur", "due", "--project", "web"]).is_ok());
        assert!(Cli::try_parse_from(["tfe", "recur", "due", "tpl", "--project", "web"]).is_err());
    }
}
