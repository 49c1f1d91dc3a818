//! Operator configuration that applications can serialize/deserialize.
//!
//! The library never reads environment variables or files; the assembling
//! application builds a `StreamConfig` in code or hands over a JSON document.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamError};

/// Largest length a 3-byte varint prefix can describe.
pub const MAX_FRAMED_MESSAGE_SIZE: usize = (1 << 21) - 1;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub framing: FramingConfig,
    pub compression: CompressionConfig,
    pub merge: MergeConfig,
    pub sort: SortConfig,
    pub pool: PoolConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramingConfig {
    /// Initial capacity of each serializer output buffer.
    pub initial_buffer_size: usize,

    /// Upper bound for one encoded item; also fixes the width of the length prefix.
    pub max_message_size: usize,

    /// `None` flushes on the next event loop turn.
    pub flush_delay_ms: Option<u64>,

    /// Drop items that fail to encode instead of failing the stream.
    pub skip_serialization_errors: bool,

    /// Raw chunks the deserializer buffers before suspending its input.
    pub deserializer_queue_len: usize,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            initial_buffer_size: 256 * 1024,
            max_message_size: MAX_FRAMED_MESSAGE_SIZE,
            flush_delay_ms: None,
            skip_serialization_errors: false,
            deserializer_queue_len: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Compress spilled runs with LZ4 blocks.
    pub enabled: bool,

    /// Chunk size used when reading compressed files back.
    pub read_block_size: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            read_block_size: 256 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Items buffered per reducer input before that input is suspended.
    pub input_buffer_size: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            input_buffer_size: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortConfig {
    /// Items held in memory before a sorted run is spilled.
    pub items_in_memory: usize,

    /// Keep only the first item per key.
    pub deduplicate: bool,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            items_in_memory: 100_000,
            deduplicate: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Bytes kept in free lists; released buffers beyond this are dropped.
    pub max_cached_bytes: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_cached_bytes: 64 * 1024 * 1024,
        }
    }
}

impl StreamConfig {
    /// Parse a JSON document; missing sections fall back to defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: StreamConfig = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        let framing = &self.framing;
        if framing.max_message_size == 0 || framing.max_message_size > MAX_FRAMED_MESSAGE_SIZE {
            return Err(StreamError::Config(format!(
                "max_message_size must be in 1..={}, got {}",
                MAX_FRAMED_MESSAGE_SIZE, framing.max_message_size
            )));
        }
        if framing.initial_buffer_size == 0 {
            return Err(StreamError::Config("initial_buffer_size must be > 0".into()));
        }
        if framing.deserializer_queue_len == 0 {
            return Err(StreamError::Config(
                "deserializer_queue_len must be > 0".into(),
            ));
        }
        if self.compression.read_block_size == 0 {
            return Err(StreamError::Config("read_block_size must be > 0".into()));
        }
        if self.merge.input_buffer_size == 0 {
            return Err(StreamError::Config("input_buffer_size must be > 0".into()));
        }
        Ok(())
    }
}
