//! Configuration management.

use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the data directory holding the SQLite stores.
    pub data_dir: PathBuf,
    /// Conversation memory tuning.
    pub memory: MemoryConfig,
    /// Capacity of the hot-node cache in the context graph store.
    pub node_cache_capacity: usize,
    /// Default limit for retrieval queries.
    pub default_query_limit: usize,
}

/// Tuning for the bounded conversation window.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Maximum active segments before the window is considered full.
    pub capacity: usize,
    /// Segments retained by importance at compaction.
    pub retain_top: usize,
    /// Most recent segments kept regardless of score.
    pub recency_floor: usize,
    /// Capacity of the FIFO recent-topics window.
    pub topic_window: usize,
    /// Terms extracted per exchange.
    pub topic_terms: usize,
    /// Fraction of capacity at which compaction triggers.
    pub compact_watermark: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            retain_top: 20,
            recency_floor: 2,
            topic_window: 20,
            topic_terms: 5,
            compact_watermark: 0.9,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".mnemon"),
            memory: MemoryConfig::default(),
            node_cache_capacity: 256,
            default_query_limit: 5,
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Hot-node cache capacity.
    pub node_cache_capacity: Option<usize>,
    /// Default query limit.
    pub default_query_limit: Option<usize>,
    /// Memory section.
    pub memory: Option<ConfigFileMemory>,
}

/// Memory section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileMemory {
    /// Window capacity.
    pub capacity: Option<usize>,
    /// Retained segments at compaction.
    pub retain_top: Option<usize>,
    /// Recency floor.
    pub recency_floor: Option<usize>,
    /// Recent-topics window size.
    pub topic_window: Option<usize>,
    /// Terms extracted per exchange.
    pub topic_terms: Option<usize>,
    /// Compaction watermark fraction.
    pub compact_watermark: Option<f64>,
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &std::path::Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: e.to_string(),
            })?;

        let file: ConfigFile =
            toml::from_str(&contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the platform config dir first, then `~/.config/mnemon/`.
    /// Returns default configuration if no config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let platform_config = base_dirs.config_dir().join("mnemon").join("config.toml");
        if platform_config.exists() {
            if let Ok(config) = Self::load_from_file(&platform_config) {
                return config;
            }
        }

        let xdg_config = base_dirs
            .home_dir()
            .join(".config")
            .join("mnemon")
            .join("config.toml");
        if xdg_config.exists() {
            if let Ok(config) = Self::load_from_file(&xdg_config) {
                return config;
            }
        }

        Self::default()
    }

    /// Converts a `ConfigFile` to `EngineConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = PathBuf::from(data_dir);
        }
        if let Some(capacity) = file.node_cache_capacity {
            config.node_cache_capacity = capacity.max(1);
        }
        if let Some(limit) = file.default_query_limit {
            config.default_query_limit = limit;
        }
        if let Some(memory) = file.memory {
            if let Some(v) = memory.capacity {
                config.memory.capacity = v;
            }
            if let Some(v) = memory.retain_top {
                config.memory.retain_top = v;
            }
            if let Some(v) = memory.recency_floor {
                config.memory.recency_floor = v;
            }
            if let Some(v) = memory.topic_window {
                config.memory.topic_window = v;
            }
            if let Some(v) = memory.topic_terms {
                config.memory.topic_terms = v;
            }
            if let Some(v) = memory.compact_watermark {
                config.memory.compact_watermark = v.clamp(0.0, 1.0);
            }
        }

        config
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Sets the memory configuration.
    #[must_use]
    pub fn with_memory(mut self, memory: MemoryConfig) -> Self {
        self.memory = memory;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.memory.capacity, 100);
        assert_eq!(config.memory.retain_top, 20);
        assert!((config.memory.compact_watermark - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_config_file() {
        let raw = r#"
            data_dir = "/tmp/mnemon-test"
            default_query_limit = 8

            [memory]
            capacity = 50
            retain_top = 10
            compact_watermark = 1.5
        "#;
        let file: ConfigFile = toml::from_str(raw).expect("valid toml");
        let config = EngineConfig::from_config_file(file);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/mnemon-test"));
        assert_eq!(config.default_query_limit, 8);
        assert_eq!(config.memory.capacity, 50);
        assert_eq!(config.memory.retain_top, 10);
        // Watermark clamps to [0, 1]
        assert!((config.memory.compact_watermark - 1.0).abs() < f64::EPSILON);
        // Unspecified fields keep defaults
        assert_eq!(config.memory.topic_window, 20);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let result = EngineConfig::load_from_file(std::path::Path::new("/nonexistent/mnemon.toml"));
        assert!(result.is_err());
    }
}
