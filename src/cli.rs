use crate::config::{AppConfig, ConfigFile, DEFAULT_CONFIG_PATH};
use crate::events::store::EventStore;
use crate::events::EventStatus;
use crate::logging;
use crate::mapping::resolve;
use crate::sync::{Clients, CycleMode, run_cycle};
use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "alertsync", version)]
#[command(
    about = "Forward open monitoring alerts to an event-management API",
    long_about = "alertsync pulls open alerts from a monitoring API, stores them with a delivery status, maps each one through a declarative field mapping, and submits them in batches to an event-management API. Failed deliveries are retried on the next invocation."
)]
#[command(arg_required_else_help = true)]
#[command(after_long_help = "Examples:
  alertsync run --config cfg/config.toml
  alertsync sync
  alertsync status
  alertsync resolve --event alert.json
  alertsync completion zsh > ~/.zsh/completions/_alertsync
  alertsync man > alertsync.1")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Run one full cycle: ingest open alerts, then deliver pending events",
        long_about = "Run one full cycle. Failures are logged; the command exits successfully so an external scheduler sees a normal completion."
    )]
    Run {
        #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_PATH, help = "Path to config file")]
        config: PathBuf,
    },
    #[command(about = "Only pull and store open alerts")]
    Ingest {
        #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_PATH, help = "Path to config file")]
        config: PathBuf,
    },
    #[command(about = "Only deliver RECEIVED and FAILED events")]
    Sync {
        #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_PATH, help = "Path to config file")]
        config: PathBuf,
    },
    #[command(about = "Show stored event counts per delivery status")]
    Status {
        #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_PATH, help = "Path to config file")]
        config: PathBuf,
    },
    #[command(
        about = "Print the target payload for one source alert",
        long_about = "Apply the configured field mapping to a source alert document and print the result. Nothing is stored or sent."
    )]
    #[command(arg_required_else_help = true)]
    Resolve {
        #[arg(long, value_name = "FILE", help = "JSON file holding one source alert")]
        event: PathBuf,
        #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_PATH, help = "Path to config file")]
        config: PathBuf,
    },
    #[command(
        about = "Generate shell completion script",
        long_about = "Generate shell completion script for your shell. Redirect output to your shell completion directory."
    )]
    #[command(arg_required_else_help = true)]
    Completion {
        #[arg(value_enum, value_name = "SHELL", help = "Target shell")]
        shell: Shell,
    },
    #[command(about = "Generate a man page", long_about = "Generate a roff man page for alertsync.")]
    Man {
        #[arg(
            long,
            value_name = "PATH",
            help = "Write man page to file (stdout when omitted)"
        )]
        output: Option<PathBuf>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config } => run_mode(&config, CycleMode::Full),
        Commands::Ingest { config } => run_mode(&config, CycleMode::IngestOnly),
        Commands::Sync { config } => run_mode(&config, CycleMode::SyncOnly),
        Commands::Status { config } => print_status(&config),
        Commands::Resolve { event, config } => print_resolved(&config, &event),
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        Commands::Man { output } => {
            let man = clap_mangen::Man::new(Cli::command());
            match output {
                Some(path) => {
                    let mut bytes = Vec::new();
                    man.render(&mut bytes)?;
                    fs::write(path, bytes)?;
                }
                None => {
                    man.render(&mut io::stdout())?;
                }
            }
            Ok(())
        }
    }
}

/// Installs logging from the `[logging]` section before the mapping is built,
/// so rule problems found at load time are reported.
fn load_with_logging(config: &Path) -> Result<AppConfig> {
    let file = ConfigFile::read(config)?;
    logging::init(file.logging())?;
    file.into_app_config()
}

fn run_mode(config: &Path, mode: CycleMode) -> Result<()> {
    let cfg = load_with_logging(config)?;
    let clients = Clients::http(&cfg);
    let report = run_cycle(&cfg, &clients, mode);
    if let Some(ingest) = &report.ingest {
        println!(
            "ingest: fetched={} open={} stored={} aborted={}",
            ingest.fetched, ingest.open, ingest.stored, ingest.aborted
        );
    }
    if let Some(sync) = &report.sync {
        println!(
            "sync: batches={} created={} failed={}",
            sync.batches.len(),
            sync.count(EventStatus::Created),
            sync.count(EventStatus::Failed)
        );
    }
    if let Some(err) = &report.error {
        println!("cycle {} ended early: {err}", report.cycle_id);
    }
    Ok(())
}

fn print_status(config: &Path) -> Result<()> {
    let cfg = load_with_logging(config)?;
    let store = EventStore::open(&cfg.database.path)?;
    let counts = store.status_counts()?;
    for status in [EventStatus::Received, EventStatus::Failed, EventStatus::Created] {
        println!("{status}\t{}", counts.get(&status).copied().unwrap_or(0));
    }
    Ok(())
}

fn print_resolved(config: &Path, event: &Path) -> Result<()> {
    let cfg = load_with_logging(config)?;
    let raw = fs::read_to_string(event)
        .with_context(|| format!("read event file {}", event.display()))?;
    let doc: Value = serde_json::from_str(&raw)
        .with_context(|| format!("parse event file {}", event.display()))?;
    let payload = resolve(&doc, &cfg.mapping);
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}
