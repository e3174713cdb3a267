//! CLI command definitions.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Validate and compile every job group, writing generated files
    Generate,

    /// Fail if any generated file is out of date
    Check,

    /// Compare a job group's compiled output with an existing file
    Diff {
        /// Job-group document
        file: PathBuf,

        /// Previously generated file (defaults to the group's output path)
        #[arg(short, long)]
        existing: Option<PathBuf>,
    },

    /// Compile a job group and print the generated file
    Print {
        /// Job-group document
        file: PathBuf,
    },

    /// Validate job-group documents without compiling them
    Validate {
        /// Job-group documents (defaults to every document in the input dir)
        files: Vec<PathBuf>,
    },

    /// Write release-branch copies of job groups that support branching
    Branch {
        /// Release branch name, e.g. release-1.12
        #[arg(short, long)]
        release: String,

        /// Directory to write branched documents to (defaults to the input dir)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Print the JSON Schema of authored documents
    Schema {
        /// Print the global settings schema instead of the job-group schema
        #[arg(long)]
        settings: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set configuration value
    Set {
        /// Key
        key: String,

        /// Value
        value: String,
    },
}
