use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

/// Default device base URL
const DEFAULT_BOX_URL: &str = "http://fritz.box";

/// Environment variable name for box URL override
const ENV_BOX_URL: &str = "FRITZCAP_BOX_URL";

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    device: Option<DeviceSection>,
}

#[derive(Debug, Deserialize, Default)]
struct DeviceSection {
    /// Device base URL (e.g., "http://192.168.178.1")
    box_url: Option<String>,
    /// Default login username
    username: Option<String>,
}

/// Runtime device configuration
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Base URL for protocol exchanges (e.g., "http://fritz.box")
    pub box_url: String,
    /// Default login username, if configured
    pub username: Option<String>,
    /// Source of the box URL (for logging)
    pub source: ConfigSource,
}

/// Where the box URL came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Using the default hardcoded value
    Default,
    /// Loaded from environment variable
    Environment,
    /// Loaded from config file
    ConfigFile,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::ConfigFile => write!(f, "config file"),
        }
    }
}

/// Get the path to the configuration file
fn get_config_file_path() -> Option<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|p| p.join("fritzcap").join("config.toml"))
}

/// Load configuration from the config file
fn load_config_file() -> Option<ConfigFile> {
    let path = get_config_file_path()?;

    if !path.exists() {
        return None;
    }

    match fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::debug!("Loaded config from {:?}", path);
                Some(config)
            }
            Err(e) => {
                tracing::warn!("Failed to parse config file {:?}: {}", path, e);
                None
            }
        },
        Err(e) => {
            tracing::warn!("Failed to read config file {:?}: {}", path, e);
            None
        }
    }
}

/// Load the device configuration with priority:
/// 1. Environment variable (FRITZCAP_BOX_URL)
/// 2. Config file (~/.config/fritzcap/config.toml)
/// 3. Default values
///
/// The username only ever comes from the config file; it stays usable with a
/// box URL from any source.
pub fn load_device_config() -> DeviceConfig {
    let device = load_config_file().and_then(|c| c.device);
    let username = device.as_ref().and_then(|d| d.username.clone());

    // Priority 1: Environment variable
    if let Ok(url) = std::env::var(ENV_BOX_URL) {
        let url = url.trim().trim_end_matches('/');
        if !url.is_empty() {
            tracing::info!("Using box URL from environment variable: {}", url);
            return DeviceConfig {
                box_url: url.to_string(),
                username,
                source: ConfigSource::Environment,
            };
        }
    }

    // Priority 2: Config file
    if let Some(url) = device
        .as_ref()
        .and_then(|d| d.box_url.as_deref())
        .map(|u| u.trim().trim_end_matches('/'))
        .filter(|u| !u.is_empty())
    {
        tracing::info!("Using box URL from config file: {}", url);
        return DeviceConfig {
            box_url: url.to_string(),
            username,
            source: ConfigSource::ConfigFile,
        };
    }

    // Priority 3: Default values
    tracing::debug!("Using default box URL: {}", DEFAULT_BOX_URL);
    DeviceConfig {
        box_url: DEFAULT_BOX_URL.to_string(),
        username,
        source: ConfigSource::Default,
    }
}

/// Get the path to the config file for documentation purposes
pub fn get_config_file_path_string() -> String {
    get_config_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "~/.config/fritzcap/config.toml".to_string())
}

/// Generate example config file content
pub fn generate_example_config() -> String {
    r#"# Fritzcap Agent Configuration
# Place this file at: ~/.config/fritzcap/config.toml

[device]
# Device base URL
# Default: http://fritz.box
# box_url = "http://192.168.178.1"

# Default login username for 'fritzcap login'
# username = "admin"
"#
    .to_string()
}
