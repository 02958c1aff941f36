use clap::{Parser, Subcommand};

mod commands;

use commands::{CheckConfigArgs, PaperArgs};

#[derive(Parser)]
#[command(name = "delta-neutral")]
#[command(about = "Delta-neutral options position manager", long_about = None)]
struct Cli {
    /// Optional log file path (logs to file instead of stderr)
    #[arg(long, global = true, env = "DN_LOG_FILE")]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a config file and print the derived risk limits
    CheckConfig(CheckConfigArgs),
    /// Run a paper session over a CSV quote replay
    Paper(PaperArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match &cli.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }

    match cli.command {
        Commands::CheckConfig(args) => commands::check_config::run(args)?,
        Commands::Paper(args) => commands::paper::run(args).await?,
    }

    Ok(())
}
