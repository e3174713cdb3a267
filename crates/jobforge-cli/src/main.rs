//! jobforge CLI entrypoint.

use clap::{ArgAction, Parser};
use console::style;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod handlers;

use commands::{Commands, ConfigCommands};
use config::CliConfig;

#[derive(Parser)]
#[command(name = "jobforge")]
#[command(author, version, about = "Compile declarative job groups into CI job descriptors", long_about = None)]
struct Cli {
    /// Global settings document
    #[arg(long, global = true)]
    global: Option<PathBuf>,

    /// Directory holding job-group documents
    #[arg(long, global = true)]
    input: Option<PathBuf>,

    /// Directory generated files are written to
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli) {
        eprintln!("{} {}", style("error:").red().bold(), err);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = CliConfig::load()?.with_overrides(cli.global, cli.input, cli.output);

    match cli.command {
        Commands::Generate => handlers::generate(&config)?,
        Commands::Check => handlers::check(&config)?,
        Commands::Diff { file, existing } => handlers::diff(&config, &file, existing)?,
        Commands::Print { file } => handlers::print(&config, &file)?,
        Commands::Validate { files } => handlers::validate(&config, files)?,
        Commands::Branch { release, dir } => handlers::branch(&config, &release, dir)?,
        Commands::Schema { settings } => handlers::schema(settings)?,
        Commands::Config { command } => match command {
            ConfigCommands::Show => handlers::show_config(&config)?,
            ConfigCommands::Set { key, value } => handlers::set_config(&key, &value)?,
        },
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise the level follows `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
