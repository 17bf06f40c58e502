use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use taskdeck_core::models::{ConflictChoice, TaskPriority};
use taskdeck_core::sync::MergeChoice;

#[derive(Parser)]
#[command(name = "taskdeck")]
#[command(about = "Track tasks locally and keep them backed up")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name for backup and auth configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    /// Quick capture: taskdeck "buy milk"
    #[arg(trailing_var_arg = true)]
    pub title: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new task
    #[command(alias = "new")]
    Add {
        /// Task title
        title: Vec<String>,
        /// Longer description
        #[arg(long)]
        notes: Option<String>,
        #[arg(long, value_enum, default_value_t = PriorityArg::Medium)]
        priority: PriorityArg,
        /// Due date (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        due: Option<NaiveDate>,
        /// Tag, repeatable
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,
    },
    /// List tasks
    List {
        /// Include completed tasks
        #[arg(short, long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a task done
    Done {
        /// Task ID or unique ID prefix
        id: String,
    },
    /// Delete a task
    Delete {
        /// Task ID or unique ID prefix
        id: String,
    },
    /// Sync with the remote backup
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
    },
    /// Write every task to a backup file
    Export {
        /// Output file or directory (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Replace local tasks with a backup file
    Import {
        /// Backup file written by `taskdeck export`
        path: PathBuf,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Connect or disconnect the backup account
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum PriorityArg {
    Low,
    Medium,
    High,
}

impl From<PriorityArg> for TaskPriority {
    fn from(value: PriorityArg) -> Self {
        match value {
            PriorityArg::Low => Self::Low,
            PriorityArg::Medium => Self::Medium,
            PriorityArg::High => Self::High,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum KeepSide {
    Local,
    Remote,
}

impl From<KeepSide> for ConflictChoice {
    fn from(value: KeepSide) -> Self {
        match value {
            KeepSide::Local => Self::Local,
            KeepSide::Remote => Self::Remote,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum FirstSyncChoice {
    /// Merge both sides task by task
    Merge,
    /// Replace local tasks with the backup
    UseRemote,
    /// Replace the backup with local tasks
    UseLocal,
}

impl From<FirstSyncChoice> for MergeChoice {
    fn from(value: FirstSyncChoice) -> Self {
        match value {
            FirstSyncChoice::Merge => Self::Merge,
            FirstSyncChoice::UseRemote => Self::UseRemote,
            FirstSyncChoice::UseLocal => Self::UseLocal,
        }
    }
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Run a sync now (default)
    Now,
    /// Show sync status, pending changes and the last sync time
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List unresolved conflicts
    Conflicts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve a conflict by keeping one side
    Resolve {
        /// Task ID or unique ID prefix
        id: String,
        #[arg(long, value_enum)]
        keep: KeepSide,
    },
    /// Keep running: sync after edits and poll the backup for changes
    Watch,
    /// Delete the remote backup
    DeleteRemote {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// URL of the backup file
        #[arg(long, value_name = "URL")]
        backup_url: Option<String>,
        /// Token endpoint used for sign-in and silent refresh
        #[arg(long, value_name = "URL")]
        token_url: Option<String>,
        /// Client id sent to the token endpoint
        #[arg(long, value_name = "ID")]
        client_id: Option<String>,
        /// Delay between the last edit and the sync, in milliseconds
        #[arg(long, value_name = "MS")]
        debounce_ms: Option<u64>,
        /// Remote poll interval in `sync watch`, in seconds
        #[arg(long, value_name = "SECS")]
        poll_secs: Option<u64>,
        /// Keep the credential in the system keychain instead of the database
        #[arg(long)]
        keyring: bool,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the resolved profile
    Show,
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Sign in and connect this device to the backup
    Login {
        /// Account user name
        #[arg(long, value_name = "NAME", requires = "password", conflicts_with = "token")]
        username: Option<String>,
        /// Account password
        #[arg(long, value_name = "PASSWORD")]
        password: Option<String>,
        /// Use an existing bearer token instead of signing in
        #[arg(long, value_name = "TOKEN")]
        token: Option<String>,
        /// What to do when both this device and the backup already hold tasks
        #[arg(long, value_enum)]
        first_sync: Option<FirstSyncChoice>,
    },
    /// Show whether this device is connected
    Status,
    /// Disconnect this device; unsynced changes are kept
    Logout,
}
