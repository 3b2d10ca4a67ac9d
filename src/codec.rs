//! Codec Module
//!
//! Turns cache values into tier-2 payloads and back. The value encoding is
//! pluggable; payloads above a size threshold are gzip-compressed.
//!
//! Frame layout: one marker byte followed by the body.
//! - `0` = raw encoded value
//! - `1` = gzip-compressed encoded value

use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::cache::CacheValue;
use crate::error::{CacheError, Result};

const FRAME_RAW: u8 = 0;
const FRAME_GZIP: u8 = 1;

// == Codec Trait ==
/// Value encoding used for tier-2 payloads.
pub trait Codec: Send + Sync {
    fn name(&self) -> &'static str;
    fn encode(&self, value: &CacheValue) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<CacheValue>;
}

/// serde_json encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, value: &CacheValue) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<CacheValue> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

// == Payload Codec ==
/// An encoded payload and the bytes compression saved on it.
#[derive(Debug, Clone)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub saved_bytes: usize,
}

/// Codec plus optional gzip framing.
#[derive(Clone)]
pub struct PayloadCodec {
    codec: Arc<dyn Codec>,
    compression: bool,
    threshold: usize,
}

impl fmt::Debug for PayloadCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadCodec")
            .field("codec", &self.codec.name())
            .field("compression", &self.compression)
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl Default for PayloadCodec {
    fn default() -> Self {
        Self::new(Arc::new(JsonCodec), true, 1024)
    }
}

impl PayloadCodec {
    /// # Arguments
    /// * `codec` - Value encoding
    /// * `compression` - Whether large payloads are gzipped
    /// * `threshold` - Encoded size in bytes above which compression applies
    pub fn new(codec: Arc<dyn Codec>, compression: bool, threshold: usize) -> Self {
        Self {
            codec,
            compression,
            threshold,
        }
    }

    pub fn encode(&self, value: &CacheValue) -> Result<Encoded> {
        let raw = self.codec.encode(value)?;

        if self.compression && raw.len() > self.threshold {
            let compressed = gzip(&raw)?;
            // Keep the raw form when gzip does not help
            if compressed.len() < raw.len() {
                let saved_bytes = raw.len() - compressed.len();
                return Ok(Encoded {
                    bytes: frame(FRAME_GZIP, compressed),
                    saved_bytes,
                });
            }
        }

        Ok(Encoded {
            bytes: frame(FRAME_RAW, raw),
            saved_bytes: 0,
        })
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<CacheValue> {
        let (marker, body) = bytes
            .split_first()
            .ok_or_else(|| CacheError::Serialization("empty payload".to_string()))?;

        match *marker {
            FRAME_RAW => self.codec.decode(body),
            FRAME_GZIP => self.codec.decode(&gunzip(body)?),
            other => Err(CacheError::Serialization(format!(
                "unknown payload marker {}",
                other
            ))),
        }
    }
}

fn frame(marker: u8, body: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 1);
    out.push(marker);
    out.extend_from_slice(&body);
    out
}

fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| CacheError::Serialization(format!("compression failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| CacheError::Serialization(format!("compression failed: {}", e)))
}

fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CacheError::Serialization(format!("decompression failed: {}", e)))?;
    Ok(out)
}
