//! Configuration module for chromaflow
//!
//! This module handles:
//! - Engine settings (`EngineConfig`), read from TOML or JSON
//! - Graph files (`GraphFile`) describing nodes, options and links
//!
//! # Config Location
//!
//! The default engine config lives in the platform config directory:
//! - **Linux**: `~/.config/chromaflow/engine.toml`
//! - **macOS**: `~/Library/Application Support/chromaflow/engine.toml`
//! - **Windows**: `%APPDATA%\chromaflow\engine.toml`
//!
//! # Example
//!
//! ```ignore
//! use chromaflow::config::{EngineConfig, GraphFile};
//!
//! let config = EngineConfig::load_or_default(EngineConfig::default_path().unwrap());
//! let graph = GraphFile::load("linear.json")?;
//! let mut conversion = graph.into_conversion(registry, config)?;
//! ```

pub mod graph_file;

pub use graph_file::{EdgeSpec, GraphFile, NodeSpec};

use crate::error::{ChromaflowError, Result};
use crate::pipeline::PixelLayout;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "chromaflow";

/// Engine config filename
pub const ENGINE_CONFIG_FILE: &str = "engine.toml";

/// Default limit on nested pulls during one run
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 64;

/// Get the path of the default engine config file
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID).join(ENGINE_CONFIG_FILE))
}

fn default_max_recursion_depth() -> usize {
    DEFAULT_MAX_RECURSION_DEPTH
}

fn default_true() -> bool {
    true
}

/// Serialization format, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Format {
    Toml,
    Json,
}

impl Format {
    pub(crate) fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
            _ => Format::Toml,
        }
    }

    pub(crate) fn parse<T: for<'de> Deserialize<'de>>(self, content: &str) -> Result<T> {
        match self {
            Format::Toml => toml::from_str(content)
                .map_err(|e| ChromaflowError::Serialization(e.to_string())),
            Format::Json => serde_json::from_str(content)
                .map_err(|e| ChromaflowError::Serialization(e.to_string())),
        }
    }

    pub(crate) fn render<T: Serialize>(self, value: &T) -> Result<String> {
        match self {
            Format::Toml => toml::to_string_pretty(value)
                .map_err(|e| ChromaflowError::Serialization(e.to_string())),
            Format::Json => serde_json::to_string_pretty(value)
                .map_err(|e| ChromaflowError::Serialization(e.to_string())),
        }
    }
}

/// Read and parse a config-like file.
pub(crate) fn read_file<T: for<'de> Deserialize<'de>>(path: &Path, what: &str) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ChromaflowError::Config(format!("Failed to read {} {:?}: {}", what, path, e))
    })?;
    Format::of(path).parse(&content).map_err(|e| {
        ChromaflowError::Config(format!("Failed to parse {} {:?}: {}", what, path, e))
    })
}

/// Serialize and write a config-like file, creating parent directories.
pub(crate) fn write_file<T: Serialize>(value: &T, path: &Path, what: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ChromaflowError::Config(format!("Failed to create {} directory: {}", what, e))
        })?;
    }
    let content = Format::of(path).render(value)?;
    std::fs::write(path, content).map_err(|e| {
        ChromaflowError::Config(format!("Failed to write {} {:?}: {}", what, path, e))
    })
}

// ==================== Engine Config ====================

/// Settings that shape how pipelines run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Nested pulls allowed before a run fails with a recursion error
    #[serde(default = "default_max_recursion_depth")]
    pub max_recursion_depth: usize,

    /// Retry once after resolving upstream data when a run hits an incomplete graph
    #[serde(default = "default_true")]
    pub retry_on_incomplete: bool,

    /// Share contexts through the context cache
    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// Log every node run at debug level
    #[serde(default)]
    pub verbose_nodes: bool,

    /// Layout for images the engine creates without a template
    #[serde(default)]
    pub default_layout: PixelLayout,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            retry_on_incomplete: true,
            cache_enabled: true,
            verbose_nodes: false,
            default_layout: PixelLayout::default(),
        }
    }
}

impl EngineConfig {
    /// Path of the default engine config file
    pub fn default_path() -> Option<PathBuf> {
        default_config_path()
    }

    /// Load from a TOML or JSON file (by extension)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = read_file(path.as_ref(), "engine config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, falling back to defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load engine config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save to a TOML or JSON file (by extension)
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_file(self, path.as_ref(), "engine config")
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_recursion_depth == 0 {
            return Err(ChromaflowError::Config(
                "max_recursion_depth must be at least 1".to_string(),
            ));
        }
        if !(1..=4).contains(&self.default_layout.channels) {
            return Err(ChromaflowError::Config(format!(
                "default_layout must have 1 to 4 channels, got {}",
                self.default_layout.channels
            )));
        }
        Ok(())
    }
}
