use crate::error::{Result, SearchIndexError};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// How a finished regeneration generation becomes the latest live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionStrategy {
    /// Single `rename(2)` of the generation directory into the live tree.
    /// Falls back to `Copy` when the trees sit on different filesystems.
    Rename,
    /// Copy under a hidden name, then rename within the live tree.
    Copy,
}

impl PromotionStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rename" => Some(PromotionStrategy::Rename),
            "copy" => Some(PromotionStrategy::Copy),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub data_dir: PathBuf,
    pub writer_heap_mb: usize,
    pub batch_size: usize,
    pub batch_timeout_ms: u64,
    pub queue_capacity: usize,
    pub regeneration_batch_size: usize,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub min_gram: usize,
    pub max_gram: usize,
    pub promotion: PromotionStrategy,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            data_dir: PathBuf::from("./data"),
            writer_heap_mb: 50,
            batch_size: 10,
            batch_timeout_ms: 100,
            queue_capacity: 1000,
            regeneration_batch_size: 500,
            default_page_size: 100,
            max_page_size: 1000,
            min_gram: 2,
            max_gram: 24,
            promotion: PromotionStrategy::Rename,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl IndexConfig {
    pub fn with_data_dir<P: AsRef<Path>>(data_dir: P) -> Self {
        IndexConfig {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..IndexConfig::default()
        }
    }

    pub fn from_env() -> Self {
        let d = IndexConfig::default();
        IndexConfig {
            data_dir: env::var("SEARCHGEN_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.data_dir),
            writer_heap_mb: env_or("SEARCHGEN_WRITER_HEAP_MB", d.writer_heap_mb),
            batch_size: env_or("SEARCHGEN_BATCH_SIZE", d.batch_size),
            batch_timeout_ms: env_or("SEARCHGEN_BATCH_TIMEOUT_MS", d.batch_timeout_ms),
            queue_capacity: env_or("SEARCHGEN_QUEUE_CAPACITY", d.queue_capacity),
            regeneration_batch_size: env_or(
                "SEARCHGEN_REGENERATION_BATCH_SIZE",
                d.regeneration_batch_size,
            ),
            default_page_size: env_or("SEARCHGEN_DEFAULT_PAGE_SIZE", d.default_page_size),
            max_page_size: env_or("SEARCHGEN_MAX_PAGE_SIZE", d.max_page_size),
            min_gram: env_or("SEARCHGEN_MIN_GRAM", d.min_gram),
            max_gram: env_or("SEARCHGEN_MAX_GRAM", d.max_gram),
            promotion: env::var("SEARCHGEN_PROMOTION")
                .ok()
                .and_then(|s| PromotionStrategy::parse(&s))
                .unwrap_or(d.promotion),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: IndexConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        // tantivy refuses writer arenas below 15MB
        if self.writer_heap_mb < 15 {
            return Err(SearchIndexError::Config(format!(
                "writer_heap_mb must be at least 15, got {}",
                self.writer_heap_mb
            )));
        }
        if self.min_gram == 0 || self.min_gram > self.max_gram {
            return Err(SearchIndexError::Config(format!(
                "invalid n-gram bounds {}..={}",
                self.min_gram, self.max_gram
            )));
        }
        if self.batch_size == 0 || self.queue_capacity == 0 || self.regeneration_batch_size == 0
        {
            return Err(SearchIndexError::Config(
                "batch sizes and queue capacity must be non-zero".to_string(),
            ));
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(SearchIndexError::Config(format!(
                "default_page_size {} must be in 1..={}",
                self.default_page_size, self.max_page_size
            )));
        }
        Ok(())
    }

    pub fn writer_heap_bytes(&self) -> usize {
        self.writer_heap_mb * 1024 * 1024
    }

    pub fn tree_root(&self, tree: crate::types::Tree) -> PathBuf {
        self.data_dir.join(tree.dir_name())
    }
}
