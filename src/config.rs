//! Configuration management
//!
//! Manages server, storage, authentication, analysis and chatbot settings.

use anyhow::{Result, Context};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "DATAI_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Database and upload locations
    #[serde(default)]
    pub storage: StorageConfig,
    /// JWT authentication settings
    #[serde(default)]
    pub auth: AuthConfig,
    /// Goniometry file interpretation
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// Question answering
    #[serde(default)]
    pub chatbot: ChatbotConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Serve over HTTPS (requires cert and key)
    #[serde(default)]
    pub https: bool,
    #[serde(default)]
    pub cert: Option<PathBuf>,
    #[serde(default)]
    pub key: Option<PathBuf>,
    /// Maximum request body size in megabytes
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_max_upload_mb() -> usize {
    25
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            https: false,
            cert: None,
            key: None,
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Directory where uploaded documents are written
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

fn default_data_root() -> PathBuf {
    data_dir().unwrap_or_else(|_| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("datai")
    })
}

fn default_database_path() -> PathBuf {
    default_data_root().join("datai.db")
}

fn default_upload_dir() -> PathBuf {
    default_data_root().join("docs")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            upload_dir: default_upload_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// JWT secret key (auto-generated if not set)
    pub jwt_secret: Option<String>,
    /// Access token expiration (minutes)
    #[serde(default = "default_token_expiry")]
    pub access_token_expiry_minutes: i64,
    /// Refresh token expiration (days)
    #[serde(default = "default_refresh_expiry")]
    pub refresh_token_expiry_days: i64,
    /// Maximum failed login attempts
    #[serde(default = "default_max_attempts")]
    pub max_login_attempts: u32,
    /// Lockout duration after failed attempts (minutes)
    #[serde(default = "default_lockout_duration")]
    pub lockout_duration_minutes: i64,
}

fn default_token_expiry() -> i64 {
    60
}

fn default_refresh_expiry() -> i64 {
    7
}

fn default_max_attempts() -> u32 {
    5
}

fn default_lockout_duration() -> i64 {
    30
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            access_token_expiry_minutes: default_token_expiry(),
            refresh_token_expiry_days: default_refresh_expiry(),
            max_login_attempts: default_max_attempts(),
            lockout_duration_minutes: default_lockout_duration(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Angle columns used in preference to keyword detection when present
    #[serde(default = "default_preferred_columns")]
    pub preferred_angle_columns: Vec<String>,
    /// Accepted names for the time column, in priority order
    #[serde(default = "default_time_candidates")]
    pub time_column_candidates: Vec<String>,
    /// Friendly labels for known column names
    #[serde(default = "default_display_names")]
    pub display_names: BTreeMap<String, String>,
    /// Parsed datasets kept in memory
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_preferred_columns() -> Vec<String> {
    vec![
        "Goniometry UpLeg Angle".to_string(),
        "Goniometry Leg Angle".to_string(),
    ]
}

fn default_time_candidates() -> Vec<String> {
    ["Time", "time", "Timestamp", "timestamp", "Tempo", "tempo"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_display_names() -> BTreeMap<String, String> {
    let mut names = BTreeMap::new();
    names.insert("Goniometry UpLeg Angle".to_string(), "Thigh".to_string());
    names.insert("Goniometry Leg Angle".to_string(), "Shank".to_string());
    names
}

fn default_cache_capacity() -> usize {
    32
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            preferred_angle_columns: default_preferred_columns(),
            time_column_candidates: default_time_candidates(),
            display_names: default_display_names(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatbotConfig {
    /// Minimum cosine similarity for an intent to be accepted
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    /// Messages kept per chat session
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_min_confidence() -> f32 {
    0.2
}

fn default_history_limit() -> usize {
    50
}

impl Default for ChatbotConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            history_limit: default_history_limit(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Load configuration from a specific file, creating it if missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .context("Failed to read config file")?;
            let config: Config = toml::from_str(&contents)
                .context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path()?)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let parent = path.parent()
            .context("Config path has no parent")?;

        std::fs::create_dir_all(parent)
            .context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Generate and save JWT secret if not exists
    pub fn ensure_jwt_secret(&mut self) -> Result<String> {
        if let Some(secret) = &self.auth.jwt_secret {
            return Ok(secret.clone());
        }

        let secret = crate::server::auth::generate_jwt_secret();
        self.auth.jwt_secret = Some(secret.clone());
        self.save()?;
        Ok(secret)
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    let base = directories::ProjectDirs::from("com", "datai", "datai")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "datai", "datai")
        .context("Failed to get project directories")?;
    Ok(base.data_dir().to_path_buf())
}

/// Show current configuration
pub fn show_config() -> Result<()> {
    let config = Config::load()?;

    println!("Configuration ({})", config_path()?.display());
    println!();
    println!("Server");
    println!("  address:          {}:{}", config.server.host, config.server.port);
    println!("  https:            {}", if config.server.https { "enabled" } else { "disabled" });
    println!("  max upload:       {} MB", config.server.max_upload_mb);
    println!("Storage");
    println!("  database:         {}", config.storage.database_path.display());
    println!("  uploads:          {}", config.storage.upload_dir.display());
    println!("Auth");
    println!("  jwt secret:       {}", config.auth.jwt_secret.as_ref().map(|_| "configured").unwrap_or("not configured"));
    println!("  token expiry:     {} min", config.auth.access_token_expiry_minutes);
    println!("  lockout:          {} attempts / {} min", config.auth.max_login_attempts, config.auth.lockout_duration_minutes);
    println!("Analysis");
    println!("  preferred angles: {}", config.analysis.preferred_angle_columns.join(", "));
    println!("  time columns:     {}", config.analysis.time_column_candidates.join(", "));
    println!("Chatbot");
    println!("  min confidence:   {}", config.chatbot.min_confidence);
    println!("  history limit:    {}", config.chatbot.history_limit);

    Ok(())
}

/// Generate new JWT secret
pub fn rotate_jwt_secret() -> Result<()> {
    let mut config = Config::load()?;
    let new_secret = crate::server::auth::generate_jwt_secret();
    config.auth.jwt_secret = Some(new_secret);
    config.save()?;
    println!("JWT secret rotated. All existing tokens are now invalid.");
    Ok(())
}

/// Reset configuration to defaults
pub fn reset_config() -> Result<()> {
    let config = Config::default();
    config.save()?;
    println!("Configuration reset to defaults.");
    Ok(())
}

/// Get default configuration as TOML string
pub fn default_config_toml() -> String {
    let config = Config::default();
    toml::to_string_pretty(&config).unwrap_or_else(|_| "# Default configuration\n".to_string())
}
