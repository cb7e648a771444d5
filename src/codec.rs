//! The compressed container: a zstd frame around a serialized payload.
//!
//! Payloads are first serialized into a flat buffer (`.npy` for a single
//! array, `.npz` for a bundle) and then compressed into a single zstd frame.
//! The frame records the uncompressed size, which is used to allocate the
//! output buffer up front, and a checksum of the content, which is verified
//! when decompressing.
//!
//! Compression parameters are held by an immutable [`CodecOptions`] value
//! given to each [`Codec`].
//!
//! [`CodecOptions`]: ./struct.CodecOptions.html
//! [`Codec`]: ./struct.Codec.html
use crate::error::{PrepError, Result};
use crate::npy::bundle::{Bundle, EMPTY_ZIP_MAGIC, ZIP_MAGIC};
use crate::npy::{self, NpyArray, MAGIC};
use std::convert::TryFrom;

/// The zstd frame magic number, in the order it appears on disk.
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// The compression level used by default.
pub const DEFAULT_LEVEL: i32 = 8;

/// Upper bound of the ratio between the content and frame sizes. A block
/// holds at most 128 KiB and takes at least 4 bytes.
pub const MAX_EXPANSION: u64 = 1 << 15;

/// Content which can be stored in a container.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A single array.
    Array(NpyArray),
    /// A set of named arrays and scalars.
    Bundle(Bundle),
}

impl Payload {
    /// Serialize the payload into a flat buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Payload::Array(array) => npy::to_bytes(array),
            Payload::Bundle(bundle) => bundle.to_bytes(),
        }
    }

    /// Deserialize a payload, telling arrays from bundles by their magic
    /// bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.starts_with(MAGIC) {
            Ok(Payload::Array(npy::from_bytes(bytes)?))
        } else if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(EMPTY_ZIP_MAGIC) {
            Ok(Payload::Bundle(Bundle::from_bytes(bytes)?))
        } else {
            Err(PrepError::Format(
                "payload is neither an array nor a bundle".to_string(),
            ))
        }
    }

    /// Retrieve the array of this payload.
    pub fn into_array(self) -> Result<NpyArray> {
        match self {
            Payload::Array(array) => Ok(array),
            Payload::Bundle(_) => Err(PrepError::Format("expected an array, found a bundle".to_string())),
        }
    }

    /// Retrieve the bundle of this payload.
    pub fn into_bundle(self) -> Result<Bundle> {
        match self {
            Payload::Bundle(bundle) => Ok(bundle),
            Payload::Array(_) => Err(PrepError::Format("expected a bundle, found an array".to_string())),
        }
    }
}

impl From<NpyArray> for Payload {
    fn from(array: NpyArray) -> Self {
        Payload::Array(array)
    }
}

impl From<Bundle> for Payload {
    fn from(bundle: Bundle) -> Self {
        Payload::Bundle(bundle)
    }
}

/// Compression settings of a [`Codec`](struct.Codec.html).
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub struct CodecOptions {
    level: i32,
    checksum: bool,
    content_size: bool,
}

impl CodecOptions {
    /// Level 8 with both checksum and content size recorded.
    pub const fn new() -> Self {
        CodecOptions {
            level: DEFAULT_LEVEL,
            checksum: true,
            content_size: true,
        }
    }

    /// Set the zstd compression level.
    pub const fn level(self, level: i32) -> Self {
        CodecOptions { level, ..self }
    }

    /// Whether to record a checksum of the content.
    pub const fn checksum(self, checksum: bool) -> Self {
        CodecOptions { checksum, ..self }
    }

    /// Whether to record the uncompressed size of the content.
    pub const fn content_size(self, content_size: bool) -> Self {
        CodecOptions {
            content_size,
            ..self
        }
    }

    /// The configured compression level.
    pub fn get_level(&self) -> i32 {
        self.level
    }
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// The fields of a zstd frame header relevant to integrity checks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FrameInfo {
    /// The declared uncompressed size, if recorded.
    pub content_size: Option<u64>,
    /// Whether the frame ends with a content checksum.
    pub has_checksum: bool,
}

impl FrameInfo {
    /// Parse the header of the zstd frame at the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 5 || bytes[..4] != ZSTD_MAGIC {
            return Err(PrepError::Integrity("not a zstd frame".to_string()));
        }
        let has_checksum = bytes[4] & 0x04 != 0;
        let content_size = zstd::zstd_safe::get_frame_content_size(bytes)
            .map_err(|_| PrepError::Integrity("truncated or malformed frame header".to_string()))?;
        Ok(FrameInfo {
            content_size,
            has_checksum,
        })
    }
}

/// Encoder and decoder of compressed containers.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Codec {
    options: CodecOptions,
}

impl Codec {
    /// Create a codec with the given settings.
    pub fn new(options: CodecOptions) -> Self {
        Codec { options }
    }

    /// The settings of this codec.
    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// Compress a flat buffer into a single zstd frame.
    pub fn compress(&self, raw: &[u8]) -> Result<Vec<u8>> {
        let mut compressor = zstd::bulk::Compressor::new(self.options.level)?;
        compressor.include_checksum(self.options.checksum)?;
        compressor.include_contentsize(self.options.content_size)?;
        Ok(compressor.compress(raw)?)
    }

    /// Verify and decompress a single zstd frame.
    ///
    /// # Errors
    ///
    /// - `PrepError::Integrity` if the frame is malformed, lacks a checksum
    ///   or content size required by this codec's settings, declares more
    ///   content than it could hold, fails its checksum, or does not
    ///   decompress to its declared size.
    pub fn decompress(&self, container: &[u8]) -> Result<Vec<u8>> {
        let info = FrameInfo::parse(container)?;
        if self.options.checksum && !info.has_checksum {
            return Err(PrepError::Integrity("frame has no content checksum".to_string()));
        }
        let raw = match info.content_size {
            Some(size) => {
                let bound = (container.len() as u64).saturating_mul(MAX_EXPANSION);
                if size > bound {
                    return Err(PrepError::Integrity(format!(
                        "declared size {} exceeds what a {} byte frame can hold",
                        size,
                        container.len()
                    )));
                }
                let capacity = usize::try_from(size).map_err(|_| {
                    PrepError::Integrity(format!("declared size {} does not fit in memory", size))
                })?;
                let raw = zstd::bulk::decompress(container, capacity)
                    .map_err(|e| PrepError::Integrity(e.to_string()))?;
                if raw.len() != capacity {
                    return Err(PrepError::Integrity(format!(
                        "expected {} bytes, decompressed {}",
                        capacity,
                        raw.len()
                    )));
                }
                raw
            }
            None if self.options.content_size => {
                return Err(PrepError::Integrity("frame has no content size".to_string()))
            }
            None => zstd::stream::decode_all(container)
                .map_err(|e| PrepError::Integrity(e.to_string()))?,
        };
        Ok(raw)
    }

    /// Serialize and compress a payload.
    pub fn encode(&self, payload: &Payload) -> Result<Vec<u8>> {
        let raw = payload.to_bytes()?;
        let container = self.compress(&raw)?;
        log::trace!(
            "Compressed {} bytes into {} at level {}",
            raw.len(),
            container.len(),
            self.options.level
        );
        Ok(container)
    }

    /// Decompress and deserialize a payload.
    pub fn decode(&self, container: &[u8]) -> Result<Payload> {
        Payload::from_bytes(&self.decompress(container)?)
    }
}
