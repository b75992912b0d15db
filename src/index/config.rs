//! Index, writer and reader configuration.

use serde::{Deserialize, Serialize};

use crate::compression::CompressorKind;
use crate::error::{HopdexError, Result};

/// How an index encodes its blocks.
///
/// Recorded in the index manifest when the index is built; readers and
/// updaters take it from there rather than from the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Compressor for start and end arrays.
    pub posting_compressor: CompressorKind,

    /// Compressor for value arrays.
    pub value_compressor: CompressorKind,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            posting_compressor: CompressorKind::Post,
            value_compressor: CompressorKind::Zstd { level: 3 },
        }
    }
}

impl IndexConfig {
    pub fn validate(&self) -> Result<()> {
        self.posting_compressor.validate()?;
        self.value_compressor.validate()
    }
}

/// Buffering and parallelism of builders and updaters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Token records buffered before a run is spilled.
    pub token_buffer_records: usize,

    /// Annotation records buffered before a run is spilled.
    pub annotation_buffer_records: usize,

    /// Spill worker threads. `None` sizes the pool to the machine,
    /// `Some(0)` spills on the calling thread.
    pub worker_threads: Option<usize>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            token_buffer_records: 8 * 1024 * 1024,
            annotation_buffer_records: 8 * 1024 * 1024,
            worker_threads: None,
        }
    }
}

impl WriterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.token_buffer_records == 0 {
            return Err(HopdexError::invalid_config(
                "token_buffer_records must be positive",
            ));
        }
        if self.annotation_buffer_records == 0 {
            return Err(HopdexError::invalid_config(
                "annotation_buffer_records must be positive",
            ));
        }
        Ok(())
    }

    /// Number of spill workers to start.
    pub fn effective_workers(&self) -> usize {
        self.worker_threads.unwrap_or_else(num_cpus::get)
    }
}

/// Caching behaviour of an [`IndexReader`](crate::index::IndexReader).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Lists with more intervals than this are "large" and subject to
    /// eviction; smaller lists stay cached until reset.
    pub large_threshold: usize,

    /// Maximum decompressed bytes held by cached large lists.
    pub max_cache_memory: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            large_threshold: 1024,
            max_cache_memory: 512 * 1024 * 1024, // 512MB
        }
    }
}

impl ReaderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.large_threshold == 0 {
            return Err(HopdexError::invalid_config(
                "large_threshold must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        IndexConfig::default().validate().unwrap();
        WriterConfig::default().validate().unwrap();
        ReaderConfig::default().validate().unwrap();
        assert_eq!(ReaderConfig::default().large_threshold, 1024);
    }

    #[test]
    fn test_invalid_values() {
        let config = WriterConfig {
            token_buffer_records: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ReaderConfig {
            large_threshold: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = IndexConfig {
            value_compressor: CompressorKind::Zstd { level: 99 },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_effective_workers() {
        let config = WriterConfig {
            worker_threads: Some(3),
            ..Default::default()
        };
        assert_eq!(config.effective_workers(), 3);

        let auto = WriterConfig::default();
        assert!(auto.effective_workers() >= 1);
    }
}
