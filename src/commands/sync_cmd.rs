//! Sync CLI commands for synchronizing with the remote API.

use clap::{Args, Subcommand};
use labsync::{Config, SyncOutcome, SyncRemote};

use super::{build_coordinator, build_engine, print_local_counts, remote_client, CommandError};

/// Sync with the remote API
#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration, local data and server status
    Status,
}

impl SyncCommand {
    pub async fn run(&self, config: &Config) -> Result<(), CommandError> {
        match &self.command {
            None => self.sync(config).await,
            Some(SyncSubcommand::Status) => self.status(config).await,
        }
    }

    async fn sync(&self, config: &Config) -> Result<(), CommandError> {
        let engine = build_engine(config)?;

        if let Err(e) = engine.coordinator().remote().health_check().await {
            println!("Remote unreachable ({}).", e);
            println!("Working in local-only mode; local data is unchanged.");
            return Ok(());
        }

        println!("Syncing with {}...", config.api_base_url().unwrap_or_default());
        println!();

        match engine.sync_now().await {
            SyncOutcome::Completed {
                last_sync_time,
                uploaded,
            } => {
                println!(
                    "  ✓ downloaded remote data{}",
                    if uploaded { ", uploaded local data" } else { "" }
                );
                println!();
                print_local_counts(engine.coordinator());
                println!();
                println!("Sync complete at {}.", last_sync_time.format("%Y-%m-%d %H:%M:%S UTC"));
                Ok(())
            }
            SyncOutcome::Failed { error } => Err(CommandError::SyncFailed(error)),
            other => {
                println!("{}", other.message());
                Ok(())
            }
        }
    }

    async fn status(&self, config: &Config) -> Result<(), CommandError> {
        println!("Sync Configuration");
        println!("==================");
        println!();

        println!("Mode:         {}", config.mode.value);
        println!("Data dir:     {}", config.data_dir.value.display());
        println!(
            "Auto-sync:    {} (every {}s)",
            if config.auto_sync.value {
                "enabled"
            } else {
                "disabled"
            },
            config.sync.interval_secs
        );
        println!("Merge policy: {}", config.sync.merge_policy);

        let Some(url) = config.api_base_url() else {
            println!("Remote:       Not configured");
            println!();
            println!("To enable sync, add to your config file:");
            println!();
            println!("  api:");
            println!("    {}: \"http://localhost:5000/api\"", config.mode.value);
            println!();
            println!("Or set the environment variable:");
            println!("  LABSYNC_API_URL");
            return Ok(());
        };
        println!("Remote:       {}", url);

        let coordinator = build_coordinator(config)?;
        println!(
            "Migrated:     {}",
            if coordinator.has_migrated() { "yes" } else { "no" }
        );
        println!();

        println!("Local records:");
        print_local_counts(&coordinator);
        println!();

        print!("Server status: ");
        match remote_client(config)?.health_check().await {
            Ok(health) if health.is_ok() => println!("✓ ok (database {})", health.database),
            Ok(health) => println!("✗ {}", health.status),
            Err(e) => println!("✗ unreachable: {}", e),
        }

        Ok(())
    }
}
