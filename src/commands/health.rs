use labsync::{Config, SyncRemote};

use super::{remote_client, CommandError};

/// Check whether the remote API is reachable
#[derive(Debug)]
pub struct HealthCommand;

impl HealthCommand {
    pub async fn run(&self, config: &Config) -> Result<(), CommandError> {
        let client = remote_client(config)?;
        println!("Remote:   {}", client.base_url());

        let health = client.health_check().await?;
        println!(
            "Status:   {}",
            if health.is_ok() { "✓ ok" } else { "✗ error" }
        );
        println!("Database: {}", health.database);

        Ok(())
    }
}
