use clap::{Args, Subcommand, ValueEnum};
use std::fs;
use std::io::Write;

use labsync::config::ConfigValue;
use labsync::Config;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

fn print_value<T: std::fmt::Display>(name: &str, value: &ConfigValue<T>) {
    println!("{}: {}", name, value.value);
    println!("  source: {}", value.source);
    println!();
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("data_dir: {}", config.data_dir.value.display());
                        println!("  source: {}", config.data_dir.source);
                        println!();

                        print_value("mode", &config.mode);

                        println!(
                            "api_url: {}",
                            config.api_base_url().unwrap_or("(not configured)")
                        );
                        println!("  source: {}", config.api_url.source);
                        println!();

                        print_value("auto_sync", &config.auto_sync);

                        println!("sync:");
                        println!("  interval_secs: {}", config.sync.interval_secs);
                        println!("  timeout_secs: {}", config.sync.timeout_secs);
                        println!("  max_failures: {}", config.sync.max_failures);
                        println!("  reset_timeout_secs: {}", config.sync.reset_timeout_secs);
                        println!("  merge_policy: {}", config.sync.merge_policy);
                    }
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = Config::default_config_path();

                // Check if config already exists
                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'labsync config show' to view current configuration.");
                    return Ok(());
                }

                // Create parent directory
                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                // Write default config
                let default_config = r#"# labsync configuration

# Directory for local data (default: platform data dir + /labsync)
# data_dir: ~/.local/share/labsync

# Which API URL to use: development or production
mode: development

api:
  development: "http://localhost:5000/api"
  # production: "https://lab.example.com/api"

sync:
  auto_sync: true
  interval_secs: 30
  timeout_secs: 10
  max_failures: 3
  reset_timeout_secs: 300
  # replace or last-writer-wins
  merge_policy: replace
"#;

                let mut file = fs::File::create(&config_path)?;
                file.write_all(default_config.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                println!("\nEdit this file to customize your settings.");
                Ok(())
            }
        }
    }
}
