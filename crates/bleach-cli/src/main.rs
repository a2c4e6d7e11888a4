use bleach_cli::cmd;
use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, run::RunArgs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "bleach",
    about = "Remove your own follows, likes, tweets and lists from a Twitter account",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: ./bleach.yaml)
    #[arg(long, global = true, env = "BLEACH_CONFIG")]
    config: Option<PathBuf>,

    /// Session file (default: ~/.bleach/session.json)
    #[arg(long, global = true, env = "BLEACH_SESSION")]
    session: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log at debug level
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize this tool through the browser and save the session
    Login {
        /// Print the authorize URL without opening a browser
        #[arg(long)]
        no_open: bool,
    },

    /// Delete the saved session
    Logout,

    /// Show the account the current credentials belong to
    Whoami,

    /// Bleach the account
    Run(RunArgs),

    /// Inspect and validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        match &cli.command {
            Commands::Run(_) | Commands::Login { .. } => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = bleach_cli::context::resolve_config_path(cli.config.as_deref());
    let session = cli.session.as_deref();

    let result = match cli.command {
        Commands::Login { no_open } => cmd::login::run(&config_path, session, no_open, cli.json),
        Commands::Logout => cmd::logout::run(session),
        Commands::Whoami => cmd::whoami::run(&config_path, session, cli.json),
        Commands::Run(args) => cmd::run::run(&config_path, session, args, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&config_path, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
