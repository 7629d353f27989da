use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::session::ExploreSettings;
use crate::store::QueryLimits;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub traversal: TraversalConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

/// Which model to load and where to start exploring
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    /// Directory holding the `*.xml` documents of one model.
    pub folder: PathBuf,
    /// Snapshot cache key; defaults to the folder name.
    pub name: Option<String>,
    /// Enables the snapshot cache when set.
    pub cache_dir: Option<PathBuf>,
    /// File holding the initial entity; any file when absent.
    pub seed_file: Option<String>,
    pub seed_id: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Traversal and query bounds
#[derive(Debug, Clone, Deserialize)]
pub struct TraversalConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_max_nodes")]
    pub max_nodes_one_way: usize,
    #[serde(default = "default_expand_depth")]
    pub expand_depth: usize,
    #[serde(default = "default_children_limit")]
    pub children_limit: usize,
    #[serde(default = "default_parents_limit")]
    pub parents_limit: usize,
    #[serde(default = "default_properties_limit")]
    pub properties_limit: usize,
    #[serde(default = "default_click_window_ms")]
    pub click_window_ms: u64,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_nodes_one_way: default_max_nodes(),
            expand_depth: default_expand_depth(),
            children_limit: default_children_limit(),
            parents_limit: default_parents_limit(),
            properties_limit: default_properties_limit(),
            click_window_ms: default_click_window_ms(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_depth() -> usize {
    1000
}

fn default_max_nodes() -> usize {
    1000
}

fn default_expand_depth() -> usize {
    2
}

fn default_children_limit() -> usize {
    1000
}

fn default_parents_limit() -> usize {
    10000
}

fn default_properties_limit() -> usize {
    1000
}

fn default_click_window_ms() -> u64 {
    300
}

fn default_http_port() -> u16 {
    8050
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads `.env` first (if present), then reads the file named by
    /// CIMSCOPE_CONFIG, falling back to ./config.toml.
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();

        let config_path = std::env::var("CIMSCOPE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::from_toml_str(&config_str)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;
        config.validate()?;

        Ok(config)
    }

    /// Parse without validating; paths are not checked.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid configuration")
    }

    pub fn validate(&self) -> Result<()> {
        let folder = &self.dataset.folder;
        if !folder.exists() {
            anyhow::bail!(
                "dataset.folder does not exist: {}. Point it at a directory of CGMES *.xml files.",
                folder.display()
            );
        }
        if !folder.is_dir() {
            anyhow::bail!("dataset.folder must be a directory, not a file: {}", folder.display());
        }

        let t = &self.traversal;
        for (name, value) in [
            ("max_nodes_one_way", t.max_nodes_one_way),
            ("expand_depth", t.expand_depth),
            ("children_limit", t.children_limit),
            ("parents_limit", t.parents_limit),
            ("properties_limit", t.properties_limit),
        ] {
            if value == 0 {
                anyhow::bail!("traversal.{} must be greater than 0", name);
            }
        }

        Ok(())
    }

    pub fn folder(&self) -> &Path {
        &self.dataset.folder
    }

    /// Snapshot cache key.
    pub fn dataset_name(&self) -> String {
        self.dataset.name.clone().unwrap_or_else(|| {
            self.dataset
                .folder
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "dataset".to_string())
        })
    }

    pub fn explore_settings(&self) -> ExploreSettings {
        ExploreSettings {
            max_depth: self.traversal.max_depth,
            max_nodes_one_way: self.traversal.max_nodes_one_way,
            expand_depth: self.traversal.expand_depth,
        }
    }

    pub fn query_limits(&self) -> QueryLimits {
        QueryLimits {
            children: self.traversal.children_limit,
            parents: self.traversal.parents_limit,
            properties: self.traversal.properties_limit,
        }
    }

    pub fn click_window(&self) -> Duration {
        Duration::from_millis(self.traversal.click_window_ms)
    }
}
