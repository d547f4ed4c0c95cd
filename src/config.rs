use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_URL: &str = "https://frontend-take-home-service.fetch.com";

/// A validation error in the configuration
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.field, self.message)
    }
}

/// API connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_ms() -> u64 {
    15_000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Search page settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrowseConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_age")]
    pub max_age: u32,
}

fn default_page_size() -> u32 {
    12
}

fn default_max_age() -> u32 {
    25
}

impl Default for BrowseConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_age: default_max_age(),
        }
    }
}

/// Where session state lives on disk
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub browse: BrowseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Same shape as [`Config`] with every field optional, so a file only
/// overrides what it mentions
#[derive(Debug, Clone, Deserialize, Default)]
struct PartialConfig {
    #[serde(default)]
    api: PartialApi,
    #[serde(default)]
    browse: PartialBrowse,
    #[serde(default)]
    storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct PartialApi {
    base_url: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct PartialBrowse {
    page_size: Option<u32>,
    max_age: Option<u32>,
}

impl Config {
    /// Load configuration from default paths
    /// Priority: local (.pawfinder/config.local.toml) > project (.pawfinder/config.toml)
    /// > user (~/.pawfinder/config.toml) > built-in defaults
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".pawfinder").join("config.toml");
            if user_config.exists() {
                config.merge_file(&user_config)?;
            }
        }

        let project_config = Path::new(".pawfinder").join("config.toml");
        if project_config.exists() {
            config.merge_file(&project_config)?;
        }

        // Should be gitignored
        let local_config = Path::new(".pawfinder").join("config.local.toml");
        if local_config.exists() {
            config.merge_file(&local_config)?;
        }

        Ok(config)
    }

    /// Load configuration from a specific path over the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        config.merge_file(path)?;
        Ok(config)
    }

    fn merge_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)?;
        let partial: PartialConfig = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "loaded config");
        self.merge(partial);
        Ok(())
    }

    /// Merge a partial config into this one (other takes priority where set)
    fn merge(&mut self, other: PartialConfig) {
        if let Some(base_url) = other.api.base_url {
            self.api.base_url = base_url;
        }
        if let Some(timeout_ms) = other.api.timeout_ms {
            self.api.timeout_ms = timeout_ms;
        }
        if let Some(page_size) = other.browse.page_size {
            self.browse.page_size = page_size;
        }
        if let Some(max_age) = other.browse.max_age {
            self.browse.max_age = max_age;
        }
        if other.storage.state_dir.is_some() {
            self.storage.state_dir = other.storage.state_dir;
        }
    }

    /// Directory for session state: configured, else ~/.pawfinder, else ./.pawfinder
    pub fn state_dir(&self) -> PathBuf {
        if let Some(dir) = &self.storage.state_dir {
            return dir.clone();
        }
        dirs::home_dir()
            .map(|home| home.join(".pawfinder"))
            .unwrap_or_else(|| PathBuf::from(".pawfinder"))
    }

    /// Validate configuration and return any errors found
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let url = &self.api.base_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(ValidationError {
                field: "api.base_url".to_string(),
                message: format!("Expected an http(s) URL, got '{}'", url),
            });
        }

        if self.api.timeout_ms == 0 {
            errors.push(ValidationError {
                field: "api.timeout_ms".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        // The search endpoint caps page size at 100
        if self.browse.page_size == 0 || self.browse.page_size > 100 {
            errors.push(ValidationError {
                field: "browse.page_size".to_string(),
                message: format!(
                    "Must be between 1 and 100, got {}",
                    self.browse.page_size
                ),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
