mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use nudge::config::NudgeConfig;

#[derive(Parser)]
#[command(name = "nudge", version, about = "Reminder and notification delivery engine")]
struct Cli {
    /// Path to a config file (default: ~/.nudge/config.toml)
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the engine: re-arm timers, sweep, deliver until Ctrl-C
    Serve,
    /// Create a reminder
    Add {
        /// Owner the reminder belongs to
        #[arg(long)]
        owner: String,
        title: String,
        /// Due time, RFC 3339 or "YYYY-MM-DD HH:MM" (UTC)
        #[arg(long)]
        due: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "medium")]
        priority: String,
        /// none, daily, weekly or monthly
        #[arg(long, default_value = "none")]
        recurrence: String,
    },
    /// List an owner's reminders
    List {
        owner: String,
        /// Only show reminders in this status
        #[arg(long)]
        status: Option<String>,
    },
    /// Mark a reminder completed
    Complete { id: String },
    /// Snooze a reminder
    Snooze {
        id: String,
        /// Minutes to snooze (default from config)
        #[arg(long)]
        minutes: Option<u32>,
    },
    /// Reminder and delivery statistics
    Stats,
    /// Check database health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => NudgeConfig::load_from(path)?,
        None => NudgeConfig::load()?,
    };

    // stderr keeps stdout clean for command output
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => cli::serve::serve(config).await?,
        Command::Add {
            owner,
            title,
            due,
            description,
            priority,
            recurrence,
        } => {
            let args = cli::add::AddArgs {
                owner,
                title,
                due,
                description,
                priority,
                recurrence,
            };
            cli::add::add(&config, args)?;
        }
        Command::List { owner, status } => cli::list::list(&config, &owner, status.as_deref())?,
        Command::Complete { id } => cli::complete::complete(&config, &id)?,
        Command::Snooze { id, minutes } => cli::complete::snooze(&config, &id, minutes)?,
        Command::Stats => cli::stats::stats(&config)?,
        Command::Doctor => cli::doctor::doctor(&config)?,
    }

    Ok(())
}
