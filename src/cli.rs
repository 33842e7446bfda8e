use clap::builder::NonEmptyStringValueParser;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "taskpages", version, about = "Timed task lists with rewards")]
pub struct Cli {
    /// Page store file (overrides config and project lookup)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a page store in the current directory
    Init {
        /// Title for the default page
        #[arg(long)]
        title: Option<String>,
    },
    /// List tasks on the current page
    List {
        /// Page id to show instead of the current one
        #[arg(long)]
        page: Option<String>,
        /// Only show tasks in this state
        #[arg(long, value_enum, default_value_t = StateFilter::All)]
        state: StateFilter,
    },
    /// List pages
    Pages,
    /// Add a task to the current page
    Add {
        /// Task name
        #[arg(value_parser = NonEmptyStringValueParser::new())]
        name: String,
        /// Countdown length in minutes
        #[arg(long)]
        timer: Option<u32>,
        /// Reward shown when the task is done
        #[arg(long)]
        reward: Option<String>,
        /// Start automatically at this time (YYYY-MM-DD HH:MM)
        #[arg(long)]
        at: Option<String>,
        /// Page id to add to (defaults to the current page)
        #[arg(long)]
        page: Option<String>,
    },
    /// Start a task, stamping its start and end times
    Start(TaskTarget),
    /// Mark a task as done
    Done(TaskTarget),
    /// Delete a task
    Delete(TaskTarget),
    /// Manage pages
    Page {
        #[command(subcommand)]
        action: PageCommand,
    },
    /// Start scheduled tasks that are due and finish expired timers
    Tick,
    /// Work with a single-page task file
    Single {
        /// Page file (defaults to data/page.json)
        #[arg(long)]
        file: Option<PathBuf>,
        #[command(subcommand)]
        action: SingleCommand,
    },
}

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct TaskTarget {
    /// 1-based position on the current page
    pub position: Option<usize>,
    /// Task id, searched across all pages
    #[arg(long)]
    pub id: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum PageCommand {
    /// Add an empty page
    Add {
        id: String,
        /// Display title (defaults to the id)
        #[arg(long)]
        title: Option<String>,
    },
    /// Give a page a new id
    Rename { old_id: String, new_id: String },
    /// Delete a page (the default page is emptied instead)
    Delete { id: String },
    /// Make a page the current one
    Switch { id: String },
}

#[derive(Subcommand, Debug)]
pub enum SingleCommand {
    /// Create the page file
    Init {
        #[arg(long)]
        title: Option<String>,
    },
    /// Show the page
    List,
    /// Add a task
    Add {
        #[arg(value_parser = NonEmptyStringValueParser::new())]
        name: String,
        #[arg(long)]
        timer: Option<u32>,
        #[arg(long)]
        reward: Option<String>,
    },
    /// Start the task at a 1-based position
    Start { position: usize },
    /// Mark the task at a 1-based position as done
    Done { position: usize },
    /// Delete the task at a 1-based position
    Delete { position: usize },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFilter {
    All,
    Running,
    Scheduled,
    Completed,
}
