use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "convlog")]
#[command(about = "Turns OpenClaw session transcripts into daily markdown conversation logs", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Process pending messages and exit (same as the `once` command)
    #[arg(long)]
    once: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the active transcript until interrupted
    Run,
    /// Process pending messages and exit
    Once,
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a commented starter config
    Init {
        #[arg(long)]
        stdout: bool,
    },
    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "convlog=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config_path = convlog::config::resolve_config_path(cli.config.as_deref());

    match cli.command {
        Some(Commands::Once) => convlog::cli::run::once(config_path)?,
        None if cli.once => convlog::cli::run::once(config_path)?,
        Some(Commands::Run) | None => {
            // Default behavior is to run
            convlog::cli::run::run(config_path).await?;
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { stdout } => {
                convlog::cli::config::init(stdout)?;
            }
            ConfigAction::Show => {
                convlog::cli::config::show(config_path)?;
            }
        },
    }

    Ok(())
}
