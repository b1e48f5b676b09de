//! Configuration management.
//!
//! Layered the usual way: built-in defaults, then an optional TOML config
//! file, then environment variables (loaded through `dotenvy`). The result is
//! an explicit [`RagConfig`] value passed into the factory and pipelines;
//! there is no ambient global configuration.

use serde::Deserialize;
use std::env;
use std::path::PathBuf;

use crate::models::DistanceMetric;
use crate::{Error, Result};

/// Default record count a collection must reach before the relational
/// backend builds its approximate index.
pub const DEFAULT_INDEX_THRESHOLD: u64 = 100;

/// Default vector dimension used when no embedder dictates one.
pub const DEFAULT_DIMENSIONS: usize = 768;

/// Default number of records written per transactional batch.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Default number of chunks pulled per page during ingestion.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Selects which vector store adapter the factory constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VectorBackendKind {
    /// Local, file-backed point index (default).
    #[default]
    Embedded,
    /// PostgreSQL with the pgvector extension.
    Pgvector,
}

impl VectorBackendKind {
    /// Returns the backend kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Embedded => "embedded",
            Self::Pgvector => "pgvector",
        }
    }

    /// Parses a backend name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownBackend`] for unrecognized names rather than
    /// silently defaulting.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "embedded" => Ok(Self::Embedded),
            "pgvector" => Ok(Self::Pgvector),
            other => Err(Error::UnknownBackend(other.to_string())),
        }
    }
}

/// Main configuration for ragstore.
#[derive(Debug, Clone, Default)]
pub struct RagConfig {
    /// Vector store settings.
    pub vector: VectorStoreConfig,
    /// Ingestion pipeline settings.
    pub ingestion: IngestionConfig,
}

/// Vector store settings consumed by the factory.
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    /// Which backend adapter to construct.
    pub backend: VectorBackendKind,
    /// Data directory for the embedded backend's collection files.
    pub data_dir: PathBuf,
    /// Connection URL for the relational backend.
    pub postgres_url: Option<String>,
    /// Similarity metric for new collections and indexes.
    pub distance_metric: DistanceMetric,
    /// Record count that promotes a relational collection to an indexed one.
    pub index_threshold: u64,
    /// Vector dimension used when no embedder dictates one.
    pub default_dimensions: usize,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackendKind::default(),
            data_dir: default_data_dir(),
            postgres_url: None,
            distance_metric: DistanceMetric::default(),
            index_threshold: DEFAULT_INDEX_THRESHOLD,
            default_dimensions: DEFAULT_DIMENSIONS,
        }
    }
}

/// Ingestion pipeline settings.
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// Records per transactional insert batch.
    pub batch_size: usize,
    /// Chunks pulled from the chunk store per page.
    pub page_size: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Vector store section.
    pub vector: Option<ConfigFileVector>,
    /// Ingestion section.
    pub ingestion: Option<ConfigFileIngestion>,
}

/// Vector store section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileVector {
    /// Backend name: "embedded" or "pgvector".
    pub backend: Option<String>,
    /// Data directory for the embedded backend.
    pub data_dir: Option<String>,
    /// Connection URL for the relational backend.
    pub postgres_url: Option<String>,
    /// Metric name: "cosine" or "dot".
    pub distance_metric: Option<String>,
    /// Index creation threshold.
    pub index_threshold: Option<u64>,
    /// Default vector dimension.
    pub default_dimensions: Option<usize>,
}

/// Ingestion section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileIngestion {
    /// Records per insert batch.
    pub batch_size: Option<usize>,
    /// Chunks per page.
    pub page_size: Option<usize>,
}

impl RagConfig {
    /// Loads configuration from the default file location and environment.
    ///
    /// The file is optional; environment variables override file values.
    /// `RAGSTORE_CONFIG` points at an alternate file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed, or if an
    /// override carries an invalid value.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = env::var("RAGSTORE_CONFIG")
            .map_or_else(|_| default_config_path(), PathBuf::from);

        let mut config = if path.is_file() {
            let content =
                std::fs::read_to_string(&path).map_err(|e| Error::OperationFailed {
                    operation: "read_config".to_string(),
                    cause: e.to_string(),
                })?;
            let file: ConfigFile =
                toml::from_str(&content).map_err(|e| Error::OperationFailed {
                    operation: "parse_config".to_string(),
                    cause: e.to_string(),
                })?;
            Self::from_file(file)?
        } else {
            Self::default()
        };

        config.apply_env()?;
        Ok(config)
    }

    /// Builds a configuration from a parsed file, on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a backend or metric name is invalid.
    pub fn from_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(vector) = file.vector {
            if let Some(backend) = vector.backend {
                config.vector.backend = VectorBackendKind::parse(&backend)?;
            }
            if let Some(dir) = vector.data_dir {
                config.vector.data_dir = PathBuf::from(dir);
            }
            if vector.postgres_url.is_some() {
                config.vector.postgres_url = vector.postgres_url;
            }
            if let Some(metric) = vector.distance_metric {
                config.vector.distance_metric = DistanceMetric::parse(&metric)?;
            }
            if let Some(threshold) = vector.index_threshold {
                config.vector.index_threshold = threshold;
            }
            if let Some(dims) = vector.default_dimensions {
                config.vector.default_dimensions = dims;
            }
        }

        if let Some(ingestion) = file.ingestion {
            if let Some(batch) = ingestion.batch_size {
                config.ingestion.batch_size = batch;
            }
            if let Some(page) = ingestion.page_size {
                config.ingestion.page_size = page;
            }
        }

        Ok(config)
    }

    /// Applies environment variable overrides.
    fn apply_env(&mut self) -> Result<()> {
        if let Ok(backend) = env::var("RAGSTORE_VECTOR_BACKEND") {
            self.vector.backend = VectorBackendKind::parse(&backend)?;
        }
        if let Ok(dir) = env::var("RAGSTORE_DATA_DIR") {
            self.vector.data_dir = PathBuf::from(dir);
        }
        if let Ok(url) = env::var("RAGSTORE_POSTGRES_URL") {
            self.vector.postgres_url = Some(url);
        }
        if let Ok(metric) = env::var("RAGSTORE_DISTANCE_METRIC") {
            self.vector.distance_metric = DistanceMetric::parse(&metric)?;
        }
        if let Ok(threshold) = env::var("RAGSTORE_INDEX_THRESHOLD") {
            self.vector.index_threshold = threshold.parse().map_err(|_| {
                Error::InvalidInput(format!("invalid RAGSTORE_INDEX_THRESHOLD: {threshold}"))
            })?;
        }
        Ok(())
    }
}

/// Resolves the default config file path.
fn default_config_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "ragstore").map_or_else(
        || PathBuf::from(".ragstore/config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Resolves the default data directory for the embedded backend.
fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "ragstore").map_or_else(
        || PathBuf::from(".ragstore/vectors"),
        |dirs| dirs.data_dir().join("vectors"),
    )
}
