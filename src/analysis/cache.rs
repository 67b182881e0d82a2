//! In-memory cache of parsed patient documents

use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::dataset::Dataset;
use super::numeric::NumberFormat;
use super::load_dataset_from_path;
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;

type CacheKey = (PathBuf, NumberFormat);

/// LRU of parsed datasets keyed by file path
pub struct DatasetCache {
    entries: Mutex<LruCache<CacheKey, Arc<Dataset>>>,
}

impl DatasetCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Return the cached dataset or parse the file on a blocking thread
    pub async fn get_or_load(
        &self,
        path: &Path,
        format: NumberFormat,
        config: &AnalysisConfig,
    ) -> Result<Arc<Dataset>, AnalysisError> {
        let key = (path.to_path_buf(), format);
        {
            let mut entries = self.entries.lock().await;
            if let Some(hit) = entries.get(&key) {
                debug!("Dataset cache hit for {}", path.display());
                return Ok(hit.clone());
            }
        }

        let owned_path = path.to_path_buf();
        let config = config.clone();
        let dataset = tokio::task::spawn_blocking(move || {
            load_dataset_from_path(&owned_path, format, &config)
        })
        .await??;

        let dataset = Arc::new(dataset);
        self.entries.lock().await.put(key, dataset.clone());
        Ok(dataset)
    }

    /// Forget every cached parse of these files
    pub async fn invalidate(&self, paths: &[PathBuf]) {
        let mut entries = self.entries.lock().await;
        for path in paths {
            for format in [NumberFormat::DecimalComma, NumberFormat::Robust] {
                entries.pop(&(path.clone(), format));
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}
