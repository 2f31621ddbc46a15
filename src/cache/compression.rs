//! Disk-tier compression.
//!
//! Only GZip is supported; the manager falls back to storing the
//! original bytes if compression would not shrink the payload, or if
//! compression fails outright (logged, never propagated as a hard error
//! since it is a size optimization, not a correctness requirement).

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub level: u32,
    pub min_size_bytes: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: 6,
            min_size_bytes: 1024,
        }
    }
}

pub trait Compressor: Send + Sync {
    fn compress(&self, data: &[u8], level: u32) -> Result<Vec<u8>>;
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

#[derive(Debug, Default)]
pub struct GzipCompressor;

impl Compressor for GzipCompressor {
    fn compress(&self, data: &[u8], level: u32) -> Result<Vec<u8>> {
        let level = level.clamp(1, 9);
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level));
        encoder
            .write_all(data)
            .map_err(|e| Error::Codec(format!("gzip compress: {e}")))?;
        encoder
            .finish()
            .map_err(|e| Error::Codec(format!("gzip compress: {e}")))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| Error::Codec(format!("gzip decompress: {e}")))?;
        Ok(out)
    }
}

/// Compresses with a size-threshold skip and an automatic fallback to
/// the original bytes when compression does not pay off.
pub struct CompressionManager {
    config: CompressionConfig,
    compressor: GzipCompressor,
}

impl CompressionManager {
    pub fn new(config: CompressionConfig) -> Self {
        Self {
            config,
            compressor: GzipCompressor,
        }
    }

    /// Returns `(bytes, was_compressed)`.
    pub fn compress(&self, data: &[u8]) -> (Vec<u8>, bool) {
        if !self.config.enabled || data.len() < self.config.min_size_bytes {
            return (data.to_vec(), false);
        }
        match self.compressor.compress(data, self.config.level) {
            Ok(compressed) if compressed.len() < data.len() => (compressed, true),
            Ok(_) => (data.to_vec(), false),
            Err(e) => {
                warn!(error = %e, "gzip compression failed, storing uncompressed");
                (data.to_vec(), false)
            }
        }
    }

    pub fn decompress(&self, data: &[u8], was_compressed: bool) -> Result<Vec<u8>> {
        if !was_compressed {
            return Ok(data.to_vec());
        }
        self.compressor.decompress(data)
    }
}

impl Default for CompressionManager {
    fn default() -> Self {
        Self::new(CompressionConfig::default())
    }
}
