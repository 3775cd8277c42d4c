use chrono::Local;
use labsync::{Config, SyncRemote};

use super::{build_engine, CommandError};

/// Keep syncing in the background until interrupted
#[derive(Debug)]
pub struct WatchCommand;

impl WatchCommand {
    pub async fn run(&self, config: &Config) -> Result<(), CommandError> {
        let engine = build_engine(config)?;

        let _subscription = engine.add_listener(|event| {
            println!("[{}] {}", Local::now().format("%H:%M:%S"), event);
        });

        match engine.coordinator().remote().health_check().await {
            Ok(_) => {
                if let Err(e) = engine.coordinator().full_sync().await {
                    println!("Initial download failed: {}", e);
                }
            }
            Err(e) => println!("Remote unreachable ({}), will keep retrying.", e),
        }

        if !config.auto_sync.value {
            println!("Auto-sync is disabled; running a single sync.");
            println!("{}", engine.sync_now().await.message());
            return Ok(());
        }

        engine.start_auto_sync();
        println!(
            "Syncing every {}s. Press Ctrl-C to stop.",
            engine.config().interval.as_secs()
        );

        tokio::signal::ctrl_c().await?;
        engine.stop_auto_sync();

        println!();
        println!("Stopped. Status: {}", engine.state().indicator());
        Ok(())
    }
}
