use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Overrides `server.base_url` when set
pub const API_URL_ENV: &str = "SHEET_BROWSER_API_URL";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub search: SearchConfig,
    pub filter: FilterConfig,
    pub paging: PagingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the table service API
    pub base_url: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum rows requested per search
    pub result_limit: usize,

    /// Quiet period before a submitted search is sent
    pub debounce_ms: u64,

    /// How long a search may run before the "searching" indicator shows
    pub loading_grace_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Quiet period after the last edit before the filter query is sent
    pub debounce_ms: u64,

    /// How long a filter query may run before the "filtering" indicator shows
    pub loading_grace_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
    /// Rows per page
    pub page_size: usize,

    /// Minimum time a page change stays in the loading state
    pub min_flip_ms: u64,

    /// Number of page buttons in the page strip
    pub strip_width: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is not set, e.g. "info" or "sheet_browser=debug"
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            result_limit: crate::api_client::DEFAULT_SEARCH_LIMIT,
            debounce_ms: 0,
            loading_grace_ms: 300,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            loading_grace_ms: 500,
        }
    }
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            page_size: crate::api_client::DEFAULT_PAGE_SIZE,
            min_flip_ms: 150,
            strip_width: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SearchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn loading_grace(&self) -> Duration {
        Duration::from_millis(self.loading_grace_ms)
    }
}

impl FilterConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn loading_grace(&self) -> Duration {
        Duration::from_millis(self.loading_grace_ms)
    }
}

impl PagingConfig {
    pub fn min_flip(&self) -> Duration {
        Duration::from_millis(self.min_flip_ms)
    }
}

impl Config {
    /// Load config from the default location, creating it if missing,
    /// then apply environment overrides
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            let default_config = Self::default();
            default_config.save_to(&config_path)?;
            default_config
        };

        if let Ok(url) = std::env::var(API_URL_ENV) {
            config.apply_api_url(&url);
        }

        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config.normalized())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default config file path
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("sheet-browser").join("config.toml"))
    }

    pub fn apply_api_url(&mut self, url: &str) {
        let url = url.trim();
        if !url.is_empty() {
            self.server.base_url = url.trim_end_matches('/').to_string();
        }
    }

    /// Replace values the controllers can't work with by their defaults
    fn normalized(mut self) -> Self {
        if self.paging.page_size == 0 {
            self.paging.page_size = PagingConfig::default().page_size;
        }
        if self.paging.strip_width == 0 {
            self.paging.strip_width = PagingConfig::default().strip_width;
        }
        if self.search.result_limit == 0 {
            self.search.result_limit = SearchConfig::default().result_limit;
        }
        self
    }

    /// Create a default config file with comments
    pub fn create_default_with_comments() -> String {
        r#"# Sheet Browser Configuration File
# Location: ~/.config/sheet-browser/config.toml (Linux)
#           ~/Library/Application Support/sheet-browser/config.toml (macOS)
#           %APPDATA%\sheet-browser\config.toml (Windows)

[server]
# Base URL of the table service API (SHEET_BROWSER_API_URL overrides this)
base_url = "http://localhost:5000/api"

# Request timeout in seconds
timeout_secs = 30

[search]
# Maximum rows requested per global search
result_limit = 5000

# Quiet period before a submitted search is sent (0 = send on the next tick)
debounce_ms = 0

# Only show the "searching" indicator for searches slower than this
loading_grace_ms = 300

[filter]
# Wait this long after the last edit of the result filter before querying
debounce_ms = 300

# Only show the "filtering" indicator for queries slower than this
loading_grace_ms = 500

[paging]
# Rows per page
page_size = 20

# Minimum time a page change stays in the loading state
min_flip_ms = 150

# Number of page numbers shown in the page strip
strip_width = 5

[logging]
# Default log filter when RUST_LOG is not set
level = "info"
"#
        .to_string()
    }
}
