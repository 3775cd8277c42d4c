use clap::Args;
use labsync::Config;

use super::{build_coordinator, print_local_counts, CommandError};

/// Upload pre-sync local data once, then download remote data
#[derive(Debug, Args)]
pub struct MigrateCommand {
    /// Clear the migration flag so the next migration uploads again
    #[arg(long)]
    reset: bool,
}

impl MigrateCommand {
    pub async fn run(&self, config: &Config) -> Result<(), CommandError> {
        let coordinator = build_coordinator(config)?;

        if self.reset {
            coordinator.reset_migration()?;
            println!("Migration flag cleared.");
            return Ok(());
        }

        if coordinator.has_migrated() {
            println!("Already migrated; downloading remote data.");
        } else {
            println!("Uploading local data...");
        }

        let summary = coordinator.full_sync().await?;
        println!("Downloaded {} records.", summary.total());
        println!();
        print_local_counts(&coordinator);

        Ok(())
    }
}
