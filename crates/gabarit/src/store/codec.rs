//! Envelope around the opaque blobs of a model directory.
//!
//! A saved model keeps up to four blobs next to its configuration document:
//! the full snapshot (`{model_name}.bin`), the standalone inference pipeline,
//! the preprocessing pipeline and, for aggregations, the combination
//! function. Each one is a fixed 16-byte envelope followed by a Postcard
//! payload:
//!
//! ```text
//! bytes   field
//! 0..4    tag "GBRT"
//! 4       envelope format
//! 5       artifact kind (snapshot, pipeline, preprocess, aggregation)
//! 6       payload encoding (0 = plain, 1 = zstd)
//! 7       unused, zero
//! 8..12   payload length, little endian
//! 12..16  CRC32 of the stored payload, little endian
//! ```
//!
//! The kind byte lets a reload refuse a preprocessing blob handed in where
//! a pipeline was expected, instead of failing deep inside Postcard.

use std::borrow::Cow;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

const TAG: &[u8; 4] = b"GBRT";

/// Envelope format written by this version.
pub const ENVELOPE_FORMAT: u8 = 1;

pub const ENVELOPE_LEN: usize = 16;

/// Payloads below this size are stored plain even with compression enabled.
#[cfg(feature = "storage-compression")]
pub const COMPRESSION_THRESHOLD: usize = 32 * 1024;

/// What a blob holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ArtifactKind {
    /// Full model snapshot, including training-only state.
    Snapshot = 0,
    /// Inference pipeline only.
    Pipeline = 1,
    Preprocess = 2,
    AggregationFunction = 3,
}

impl TryFrom<u8> for ArtifactKind {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Snapshot),
            1 => Ok(Self::Pipeline),
            2 => Ok(Self::Preprocess),
            3 => Ok(Self::AggregationFunction),
            other => Err(DecodeError::UnknownKind(other)),
        }
    }
}

/// How the payload bytes are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PayloadEncoding {
    Plain = 0,
    Zstd = 1,
}

impl TryFrom<u8> for PayloadEncoding {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Plain),
            1 => Ok(Self::Zstd),
            other => Err(DecodeError::UnknownEncoding(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Envelope {
    format: u8,
    kind: ArtifactKind,
    encoding: PayloadEncoding,
    payload_len: u32,
    crc: u32,
}

impl Envelope {
    fn encode(&self) -> [u8; ENVELOPE_LEN] {
        let mut buf = [0u8; ENVELOPE_LEN];
        buf[0..4].copy_from_slice(TAG);
        buf[4] = self.format;
        buf[5] = self.kind as u8;
        buf[6] = self.encoding as u8;
        buf[8..12].copy_from_slice(&self.payload_len.to_le_bytes());
        buf[12..16].copy_from_slice(&self.crc.to_le_bytes());
        buf
    }

    /// Parse the envelope at the start of `bytes`; the rest is the payload.
    fn split(bytes: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        if bytes.len() < ENVELOPE_LEN {
            if !bytes.is_empty() && !TAG.starts_with(&bytes[..bytes.len().min(TAG.len())]) {
                return Err(DecodeError::NotAnArtifact);
            }
            return Err(DecodeError::Truncated {
                declared: ENVELOPE_LEN,
                available: bytes.len(),
            });
        }
        let (head, rest) = bytes.split_at(ENVELOPE_LEN);
        if &head[0..4] != TAG {
            return Err(DecodeError::NotAnArtifact);
        }
        if head[4] > ENVELOPE_FORMAT {
            return Err(DecodeError::NewerFormat(head[4]));
        }
        let envelope = Self {
            format: head[4],
            kind: ArtifactKind::try_from(head[5])?,
            encoding: PayloadEncoding::try_from(head[6])?,
            payload_len: u32::from_le_bytes([head[8], head[9], head[10], head[11]]),
            crc: u32::from_le_bytes([head[12], head[13], head[14], head[15]]),
        };

        // the declared length never exceeds what is present
        let declared = envelope.payload_len as usize;
        if declared > rest.len() {
            return Err(DecodeError::Truncated {
                declared,
                available: rest.len(),
            });
        }
        Ok((envelope, &rest[..declared]))
    }
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("postcard encoding failed: {0}")]
    Postcard(#[from] postcard::Error),

    #[error("payload of {0} bytes does not fit the envelope")]
    TooLarge(usize),

    #[cfg(feature = "storage-compression")]
    #[error("zstd compression failed: {0}")]
    Compression(std::io::Error),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("not a gabarit artifact")]
    NotAnArtifact,

    #[error("artifact uses envelope format {0}, newer than this build reads")]
    NewerFormat(u8),

    #[error("unknown artifact kind {0}")]
    UnknownKind(u8),

    #[error("unknown payload encoding {0}")]
    UnknownEncoding(u8),

    #[error("artifact truncated: {declared} bytes declared, {available} available")]
    Truncated { declared: usize, available: usize },

    #[error("payload CRC mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    Crc { stored: u32, computed: u32 },

    #[error("expected a {expected:?} artifact, found {found:?}")]
    KindMismatch { expected: ArtifactKind, found: ArtifactKind },

    #[error("artifact is zstd-compressed; enable the storage-compression feature to read it")]
    CompressionDisabled,

    #[cfg(feature = "storage-compression")]
    #[error("zstd decompression failed: {0}")]
    Decompression(std::io::Error),

    #[error("postcard decoding failed: {0}")]
    Postcard(#[from] postcard::Error),
}

/// Turns serde values into blobs and back.
#[derive(Debug, Clone)]
pub struct ArtifactCodec {
    /// zstd level for payloads above [`COMPRESSION_THRESHOLD`]; `None`
    /// stores everything plain.
    #[cfg(feature = "storage-compression")]
    pub zstd_level: Option<i32>,
}

impl Default for ArtifactCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactCodec {
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "storage-compression")]
            zstd_level: Some(3),
        }
    }

    #[cfg(feature = "storage-compression")]
    fn pack<'a>(&self, payload: &'a [u8]) -> Result<(PayloadEncoding, Cow<'a, [u8]>), EncodeError> {
        match self.zstd_level {
            Some(level) if payload.len() >= COMPRESSION_THRESHOLD => {
                let packed = zstd::encode_all(payload, level).map_err(EncodeError::Compression)?;
                Ok((PayloadEncoding::Zstd, Cow::Owned(packed)))
            }
            _ => Ok((PayloadEncoding::Plain, Cow::Borrowed(payload))),
        }
    }

    #[cfg(not(feature = "storage-compression"))]
    fn pack<'a>(&self, payload: &'a [u8]) -> Result<(PayloadEncoding, Cow<'a, [u8]>), EncodeError> {
        Ok((PayloadEncoding::Plain, Cow::Borrowed(payload)))
    }

    fn unpack<'a>(encoding: PayloadEncoding, stored: &'a [u8]) -> Result<Cow<'a, [u8]>, DecodeError> {
        match encoding {
            PayloadEncoding::Plain => Ok(Cow::Borrowed(stored)),
            #[cfg(feature = "storage-compression")]
            PayloadEncoding::Zstd => Ok(Cow::Owned(zstd::decode_all(stored).map_err(DecodeError::Decompression)?)),
            #[cfg(not(feature = "storage-compression"))]
            PayloadEncoding::Zstd => Err(DecodeError::CompressionDisabled),
        }
    }

    /// Encode `value` as a complete blob of the given kind.
    pub fn serialize<T: Serialize>(&self, kind: ArtifactKind, value: &T) -> Result<Vec<u8>, EncodeError> {
        let raw = postcard::to_allocvec(value)?;
        let (encoding, stored) = self.pack(&raw)?;
        let envelope = Envelope {
            format: ENVELOPE_FORMAT,
            kind,
            encoding,
            payload_len: u32::try_from(stored.len()).map_err(|_| EncodeError::TooLarge(stored.len()))?,
            crc: crc32fast::hash(&stored),
        };

        let mut blob = Vec::with_capacity(ENVELOPE_LEN + stored.len());
        blob.extend_from_slice(&envelope.encode());
        blob.extend_from_slice(&stored);
        Ok(blob)
    }

    /// Decode a blob, checking that it holds the `expected` kind.
    pub fn deserialize<T: DeserializeOwned>(&self, expected: ArtifactKind, bytes: &[u8]) -> Result<T, DecodeError> {
        let (envelope, stored) = Envelope::split(bytes)?;
        let computed = crc32fast::hash(stored);
        if computed != envelope.crc {
            return Err(DecodeError::Crc {
                stored: envelope.crc,
                computed,
            });
        }
        if envelope.kind != expected {
            return Err(DecodeError::KindMismatch {
                expected,
                found: envelope.kind,
            });
        }
        let payload = Self::unpack(envelope.encoding, stored)?;
        Ok(postcard::from_bytes(&payload)?)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Pipeline {
        vocabulary: Vec<String>,
        weights: Vec<f64>,
    }

    fn pipeline() -> Pipeline {
        Pipeline {
            vocabulary: vec!["refund".into(), "parcel".into()],
            weights: vec![0.5, -1.25],
        }
    }

    #[test]
    fn blob_reads_back() {
        let codec = ArtifactCodec::new();
        let blob = codec.serialize(ArtifactKind::Pipeline, &pipeline()).unwrap();
        assert_eq!(&blob[0..4], TAG);
        assert_eq!(blob[5], ArtifactKind::Pipeline as u8);
        let back: Pipeline = codec.deserialize(ArtifactKind::Pipeline, &blob).unwrap();
        assert_eq!(back, pipeline());
    }

    #[test]
    fn foreign_bytes_are_not_an_artifact() {
        let codec = ArtifactCodec::new();
        let result: Result<Pipeline, _> = codec.deserialize(ArtifactKind::Pipeline, b"{\"model_name\": \"x\"}");
        assert!(matches!(result, Err(DecodeError::NotAnArtifact)));
    }

    #[test]
    fn newer_envelope_format_is_rejected() {
        let codec = ArtifactCodec::new();
        let mut blob = codec.serialize(ArtifactKind::Snapshot, &pipeline()).unwrap();
        blob[4] = ENVELOPE_FORMAT + 1;
        let result: Result<Pipeline, _> = codec.deserialize(ArtifactKind::Snapshot, &blob);
        assert!(matches!(result, Err(DecodeError::NewerFormat(f)) if f == ENVELOPE_FORMAT + 1));
    }

    #[test]
    fn preprocess_blob_is_not_a_pipeline() {
        let codec = ArtifactCodec::new();
        let blob = codec.serialize(ArtifactKind::Preprocess, &pipeline()).unwrap();
        let result: Result<Pipeline, _> = codec.deserialize(ArtifactKind::Pipeline, &blob);
        assert!(matches!(
            result,
            Err(DecodeError::KindMismatch {
                expected: ArtifactKind::Pipeline,
                found: ArtifactKind::Preprocess
            })
        ));
    }

    #[test]
    fn flipped_payload_byte_fails_crc() {
        let codec = ArtifactCodec::new();
        let mut blob = codec.serialize(ArtifactKind::Snapshot, &pipeline()).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0xFF;
        let result: Result<Pipeline, _> = codec.deserialize(ArtifactKind::Snapshot, &blob);
        assert!(matches!(result, Err(DecodeError::Crc { .. })));
    }

    #[test]
    fn cut_blob_is_truncated() {
        let codec = ArtifactCodec::new();
        let blob = codec.serialize(ArtifactKind::Snapshot, &pipeline()).unwrap();
        let result: Result<Pipeline, _> = codec.deserialize(ArtifactKind::Snapshot, &blob[..ENVELOPE_LEN + 2]);
        assert!(matches!(result, Err(DecodeError::Truncated { available: 2, .. })));

        let result: Result<Pipeline, _> = codec.deserialize(ArtifactKind::Snapshot, &blob[..6]);
        assert!(matches!(result, Err(DecodeError::Truncated { available: 6, .. })));
    }

    #[test]
    fn oversized_declared_length_is_rejected_up_front() {
        let codec = ArtifactCodec::new();
        let mut blob = codec.serialize(ArtifactKind::Snapshot, &pipeline()).unwrap();
        blob[8..12].copy_from_slice(&u32::MAX.to_le_bytes());
        let available = blob.len() - ENVELOPE_LEN;
        let result: Result<Pipeline, _> = codec.deserialize(ArtifactKind::Snapshot, &blob);
        assert!(matches!(
            result,
            Err(DecodeError::Truncated { declared, available: a }) if declared == u32::MAX as usize && a == available
        ));
    }

    #[test]
    fn unknown_kind_byte_is_rejected() {
        let codec = ArtifactCodec::new();
        let mut blob = codec.serialize(ArtifactKind::Snapshot, &pipeline()).unwrap();
        blob[5] = 9;
        let result: Result<Pipeline, _> = codec.deserialize(ArtifactKind::Snapshot, &blob);
        assert!(matches!(result, Err(DecodeError::UnknownKind(9))));
    }

    #[cfg(feature = "storage-compression")]
    #[test]
    fn large_payloads_are_compressed() {
        let codec = ArtifactCodec::new();
        let large = vec![7u8; COMPRESSION_THRESHOLD * 2];
        let blob = codec.serialize(ArtifactKind::Snapshot, &large).unwrap();
        assert_eq!(blob[6], PayloadEncoding::Zstd as u8);
        assert!(blob.len() < large.len());
        let back: Vec<u8> = codec.deserialize(ArtifactKind::Snapshot, &blob).unwrap();
        assert_eq!(back, large);
    }
}
