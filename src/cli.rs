use std::path::PathBuf;

#[derive(clap::Parser, Debug)]
#[clap(name = "quillbox", about = "Manage the storage backend behind a novel-writing workspace")]
pub struct Cli {
    /// Application config file (defaults to config.toml / config.local.toml)
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Show the active backend and how much data it holds
    Status,
    /// Test the connection of the active backend, or of a database config file
    Test {
        /// TOML file holding a database config
        file: Option<PathBuf>,
    },
    /// Switch the active backend to the database config in a file
    Use {
        /// TOML file holding a database config
        file: PathBuf,
    },
    /// Write a JSON snapshot of the active backend
    Export { file: PathBuf },
    /// Import a JSON snapshot into the active backend
    Import { file: PathBuf },
    /// Move all data from the active backend to another one
    Migrate {
        /// TOML file holding the target database config
        file: PathBuf,
        /// Only run the pre-flight checks
        #[clap(long)]
        validate_only: bool,
    },
    /// Delete every record in the active backend
    Clear {
        /// Confirm the deletion
        #[clap(long)]
        yes: bool,
    },
    /// List the backends available in this environment
    Backends,
}
