use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use worldvault_common::{UnitName, VaultConfig};
use worldvault_persist::{BackupOrchestrator, BatchReport, Quiescer, SnapshotStore};

#[derive(Parser)]
#[command(name = "worldvault", about = "Integrity-checked world backups")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to the YAML config
    #[arg(short, long, default_value = "worldvault.yaml")]
    config: PathBuf,

    /// Override the server root from the config
    #[arg(long)]
    root: Option<PathBuf>,

    /// Print the batch report as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Back up every configured world that has no backup yet
    Backup,
    /// Verify backups and replace the live worlds with them
    Restore {
        /// Restore only this world
        #[arg(short, long)]
        world: Option<String>,
    },
    /// Check backups against their manifests without touching live worlds
    Verify,
    /// Show the backup state of every configured world
    Status,
}

/// Stand-in for a game server: there are no players to kick and nothing
/// loaded, so the hooks only log.
struct LogQuiescer;

impl Quiescer for LogQuiescer {
    fn evict_active_users(&self, unit: &UnitName) {
        tracing::info!(%unit, "world is being restored, players should reconnect later");
    }

    fn unload_from_service(&self, unit: &UnitName) {
        tracing::info!(%unit, "unloading world without saving");
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    if let Commands::Info = cli.command {
        println!("worldvault v{}", env!("CARGO_PKG_VERSION"));
        println!("common: {}", worldvault_common::crate_info());
        println!("persist: {}", worldvault_persist::crate_info());
        return Ok(());
    }

    let mut config = VaultConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(root) = cli.root {
        config.root = root;
        config.validate()?;
    }

    let store = SnapshotStore::from_config(&config).with_quiescer(LogQuiescer);
    let orchestrator = BackupOrchestrator::new(store);

    let report = match cli.command {
        Commands::Backup => orchestrator.backup_all(&config.worlds),
        Commands::Restore { world: None } => orchestrator.restore_all(&config.worlds),
        Commands::Restore { world: Some(name) } => {
            let unit = UnitName::new(name)?;
            if !config.worlds.contains(&unit) {
                anyhow::bail!("{unit} is not a configured world");
            }
            let unit_report = orchestrator.restore_one(&unit);
            BatchReport {
                success: !unit_report.outcome.is_failure(),
                units: vec![unit_report],
            }
        }
        Commands::Info => return Ok(()),
        Commands::Verify => orchestrator.verify_all(&config.worlds),
        Commands::Status => {
            let statuses = orchestrator.status(&config.worlds);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&statuses)?);
            } else {
                for status in &statuses {
                    println!("{:<24} {}", status.unit, status.state);
                }
            }
            return Ok(());
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for unit in &report.units {
            match &unit.detail {
                Some(detail) => println!("{:<24} {}: {detail}", unit.unit, unit.outcome),
                None => println!("{:<24} {}", unit.unit, unit.outcome),
            }
        }
    }

    if !report.success {
        anyhow::bail!("one or more worlds failed");
    }
    Ok(())
}
