//! Spy-cat configuration.
//!
//! Loaded from, in order of precedence: the `--config` flag, the
//! `CONFIG_PATH` environment variable, or `~/.spycat/config.toml`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Deployment environment. Selects the log format and level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Env {
    #[default]
    Local,
    Dev,
    Prod,
}

impl Env {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Dev => "dev",
            Self::Prod => "prod",
        }
    }
}

/// Spy-cat configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub env: Env,

    /// Path of the SQLite database file. Parent directories are created.
    pub storage_path: PathBuf,

    #[serde(default)]
    pub http_server: HttpServer,

    #[serde(default)]
    pub breeds: Breeds,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HttpServer {
    pub address: String,

    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for HttpServer {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8080".to_string(),
            timeout_secs: 5,
        }
    }
}

impl HttpServer {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Breeds {
    /// Upstream list of `{id, name}` breed records.
    pub url: String,

    pub refresh_interval_secs: u64,

    /// Breed names accepted before the first successful fetch.
    pub seed: Vec<String>,
}

impl Default for Breeds {
    fn default() -> Self {
        Self {
            url: "https://api.thecatapi.com/v1/breeds".to_string(),
            refresh_interval_secs: 24 * 60 * 60,
            seed: Vec::new(),
        }
    }
}

impl Breeds {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl Config {
    /// Load config from the resolved path.
    /// Returns an error if the file is missing or invalid.
    pub fn load(explicit: Option<&Path>) -> Result<Self, String> {
        let path = Self::resolve_path(explicit, env::var_os("CONFIG_PATH").map(PathBuf::from))
            .ok_or("could not determine home directory; pass --config or set CONFIG_PATH")?;

        if !path.exists() {
            return Err(format!(
                "no config file found at {}\n\
                 Create one with at minimum:\n\n\
                 storage-path = \"./storage/spy-cat.db\"",
                path.display()
            ));
        }

        let contents = fs::read_to_string(&path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;

        Self::parse(&contents).map_err(|e| format!("invalid config at {}: {e}", path.display()))
    }

    /// Parse and validate config file contents.
    pub fn parse(contents: &str) -> Result<Self, String> {
        let config: Self = toml::from_str(contents).map_err(|e| e.to_string())?;

        if config.storage_path.as_os_str().is_empty() {
            return Err("storage-path is empty".to_string());
        }
        if config.http_server.timeout_secs == 0 {
            return Err("http-server.timeout-secs must be at least 1".to_string());
        }
        if config.breeds.refresh_interval_secs == 0 {
            return Err("breeds.refresh-interval-secs must be at least 1".to_string());
        }

        Ok(config)
    }

    /// Picks the config file: explicit flag, then `from_env`, then the
    /// default under the home directory.
    pub fn resolve_path(explicit: Option<&Path>, from_env: Option<PathBuf>) -> Option<PathBuf> {
        explicit
            .map(Path::to_path_buf)
            .or(from_env.filter(|p| !p.as_os_str().is_empty()))
            .or_else(Self::default_path)
    }

    /// The default config file path: `~/.spycat/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".spycat").join("config.toml"))
    }
}
