use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::snapshot::MergePolicy;
use crate::sync::{
    SyncConfig, DEFAULT_INTERVAL, DEFAULT_MAX_FAILURES, DEFAULT_RESET_TIMEOUT, DEFAULT_TIMEOUT,
};

/// Default API base URL in development mode.
pub const DEFAULT_DEVELOPMENT_API_URL: &str = "http://localhost:5000/api";

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Build mode selecting which API base URL is used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Development,
    Production,
}

impl BuildMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(BuildMode::Development),
            "production" | "prod" => Some(BuildMode::Production),
            _ => None,
        }
    }
}

impl std::fmt::Display for BuildMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildMode::Development => write!(f, "development"),
            BuildMode::Production => write!(f, "production"),
        }
    }
}

/// API base URLs per build mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub development: Option<String>,
    pub production: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            development: Some(DEFAULT_DEVELOPMENT_API_URL.to_string()),
            production: None,
        }
    }
}

impl ApiConfig {
    pub fn url_for(&self, mode: BuildMode) -> Option<&str> {
        match mode {
            BuildMode::Development => self.development.as_deref(),
            BuildMode::Production => self.production.as_deref(),
        }
    }
}

/// Sync engine settings as written in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Run periodic sync in `watch` (default: true)
    pub auto_sync: bool,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub max_failures: u32,
    pub reset_timeout_secs: u64,
    pub merge_policy: MergePolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            auto_sync: true,
            interval_secs: DEFAULT_INTERVAL.as_secs(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            max_failures: DEFAULT_MAX_FAILURES,
            reset_timeout_secs: DEFAULT_RESET_TIMEOUT.as_secs(),
            merge_policy: MergePolicy::default(),
        }
    }
}

impl SyncSettings {
    pub fn to_sync_config(&self) -> SyncConfig {
        SyncConfig::new()
            .with_interval(Duration::from_secs(self.interval_secs))
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_max_failures(self.max_failures)
            .with_reset_timeout(Duration::from_secs(self.reset_timeout_secs))
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Directory holding the local store
    pub data_dir: ConfigValue<PathBuf>,
    pub mode: ConfigValue<BuildMode>,
    /// URLs per mode as configured
    pub api: ApiConfig,
    /// Resolved base URL for the active mode
    pub api_url: ConfigValue<Option<String>>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    pub sync: SyncSettings,
    pub auto_sync: ConfigValue<bool>,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    mode: Option<BuildMode>,
    api: Option<ApiConfig>,
    sync: Option<SyncFileSection>,
}

/// `sync:` section of the config file; absent keys keep their defaults
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SyncFileSection {
    auto_sync: Option<bool>,
    interval_secs: Option<u64>,
    timeout_secs: Option<u64>,
    max_failures: Option<u32>,
    reset_timeout_secs: Option<u64>,
    merge_policy: Option<MergePolicy>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with_env(config_path, |key| std::env::var(key).ok())
    }

    /// Like [`Config::load`], reading environment variables through `env`.
    pub fn load_with_env<F>(config_path: Option<PathBuf>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Start with defaults
        let mut data_dir = ConfigValue::new(Self::default_data_dir(), ConfigSource::Default);
        let mut mode = ConfigValue::new(BuildMode::default(), ConfigSource::Default);
        let mut api = ApiConfig::default();
        let mut api_source = ConfigSource::Default;
        let mut sync = SyncSettings::default();
        let mut auto_sync_source = ConfigSource::Default;
        let mut config_file = None;

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(dir) = file_config.data_dir {
                // Resolve relative paths against config file's directory
                let resolved = if dir.is_relative() {
                    path.parent().map(|p| p.join(&dir)).unwrap_or(dir)
                } else {
                    dir
                };
                data_dir = ConfigValue::new(resolved, ConfigSource::File);
            }
            if let Some(file_mode) = file_config.mode {
                mode = ConfigValue::new(file_mode, ConfigSource::File);
            }
            if let Some(file_api) = file_config.api {
                api = file_api;
                api_source = ConfigSource::File;
            }
            if let Some(file_sync) = file_config.sync {
                if let Some(auto_sync) = file_sync.auto_sync {
                    sync.auto_sync = auto_sync;
                    auto_sync_source = ConfigSource::File;
                }
                if let Some(secs) = file_sync.interval_secs {
                    sync.interval_secs = secs;
                }
                if let Some(secs) = file_sync.timeout_secs {
                    sync.timeout_secs = secs;
                }
                if let Some(max) = file_sync.max_failures {
                    sync.max_failures = max;
                }
                if let Some(secs) = file_sync.reset_timeout_secs {
                    sync.reset_timeout_secs = secs;
                }
                if let Some(policy) = file_sync.merge_policy {
                    sync.merge_policy = policy;
                }
            }
        }

        // A zero timeout would fail every cycle
        if sync.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "sync.timeout_secs".to_string(),
                value: "0".to_string(),
            });
        }

        // Apply environment variable overrides
        if let Some(dir) = env("LABSYNC_DATA_DIR") {
            data_dir = ConfigValue::new(PathBuf::from(dir), ConfigSource::Environment);
        }
        if let Some(raw) = env("LABSYNC_MODE") {
            let parsed = BuildMode::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "LABSYNC_MODE".to_string(),
                value: raw.clone(),
            })?;
            mode = ConfigValue::new(parsed, ConfigSource::Environment);
        }
        if let Some(raw) = env("LABSYNC_AUTO_SYNC") {
            sync.auto_sync = parse_bool(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "LABSYNC_AUTO_SYNC".to_string(),
                value: raw.clone(),
            })?;
            auto_sync_source = ConfigSource::Environment;
        }

        let api_url = match env("LABSYNC_API_URL") {
            Some(url) => ConfigValue::new(Some(url), ConfigSource::Environment),
            None => ConfigValue::new(api.url_for(mode.value).map(str::to_string), api_source),
        };
        let auto_sync = ConfigValue::new(sync.auto_sync, auto_sync_source);

        Ok(Self {
            data_dir,
            mode,
            api,
            api_url,
            config_file,
            sync,
            auto_sync,
        })
    }

    /// Base URL of the remote API, or `None` if the active mode has none.
    pub fn api_base_url(&self) -> Option<&str> {
        self.api_url.value.as_deref()
    }

    /// Sync engine configuration from the `sync` section.
    pub fn sync_config(&self) -> SyncConfig {
        self.sync.to_sync_config()
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/labsync/
    /// - macOS: ~/Library/Application Support/labsync/
    /// - Windows: %APPDATA%/labsync/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("labsync")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/labsync/
    /// - macOS: ~/Library/Application Support/labsync/
    /// - Windows: %APPDATA%/labsync/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("labsync")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue { key: String, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "Invalid value for {}: '{}'", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadError(_, e) => Some(e),
            ConfigError::ParseError(_, e) => Some(e),
            ConfigError::InvalidValue { .. } => None,
        }
    }
}
