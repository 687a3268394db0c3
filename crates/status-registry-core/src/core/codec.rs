// crates/status-registry-core/src/core/codec.rs
// ============================================================================
// Module: Bitstring Codec
// Description: Gzip + base64url/hex wire encoding for status bitstrings.
// Purpose: Losslessly convert bitstrings to and from their published form.
// Dependencies: flate2, base64, hex, serde, thiserror
// ============================================================================

//! ## Overview
//! A published bitstring is the gzip stream of the raw status bytes, rendered
//! as unpadded base64url or lowercase hex. Encoding is deterministic (the gzip
//! header carries no timestamp). Decompression is bounded by
//! [`MAX_BITSTRING_BITS`] so hostile payloads cannot exhaust memory.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::io::Read;
use std::io::Write;

use base64::Engine as _;
use base64::alphabet;
use base64::engine::DecodePaddingMode;
use base64::engine::GeneralPurpose;
use base64::engine::GeneralPurposeConfig;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::bitstring::StatusBitstring;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Largest bitstring the codec accepts (2^27 bits, 16 MiB of raw bytes).
pub const MAX_BITSTRING_BITS: u64 = 1 << 27;
/// Largest decompressed payload in bytes.
const MAX_BITSTRING_BYTES: u64 = MAX_BITSTRING_BITS / 8;
/// Capacity assumed when neither metadata nor the payload yields one.
pub const DEFAULT_CAPACITY_BITS: u64 = 131_072;

/// Unpadded base64url engine that tolerates padded input.
const BASE64URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

// ============================================================================
// SECTION: Types
// ============================================================================

/// Text encoding applied to the gzip stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Encoding {
    /// Unpadded URL-safe base64.
    #[default]
    #[serde(rename = "base64url")]
    Base64Url,
    /// Lowercase hexadecimal.
    #[serde(rename = "hex")]
    Hex,
}

impl Encoding {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Base64Url => "base64url",
            Self::Hex => "hex",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Published bitstring resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedBlob {
    /// Text encoding of `payload`.
    pub encoding: Encoding,
    /// Encoded gzip stream.
    pub payload: String,
}

/// Where a capacity estimate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacitySource {
    /// Explicit length recorded in surrounding metadata.
    Declared,
    /// Decompressed payload length times eight.
    Decompressed,
    /// Fallback default after decoding failed.
    Default,
}

impl CapacitySource {
    /// Returns the stable label used in provenance metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Declared => "declared",
            Self::Decompressed => "decompressed",
            Self::Default => "default",
        }
    }
}

/// Advisory capacity of an encoded bitstring.
///
/// # Invariants
/// - `fallback_reason` is set only when `source` is [`CapacitySource::Default`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityEstimate {
    /// Capacity in bits.
    pub bits: u64,
    /// Origin of the estimate.
    pub source: CapacitySource,
    /// Decoding failure that forced the default.
    pub fallback_reason: Option<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Codec failures for malformed or oversized payloads.
///
/// # Invariants
/// - Messages never embed payload content.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Payload is not valid base64url.
    #[error("invalid base64url payload: {0}")]
    InvalidBase64(String),
    /// Payload is not valid hex.
    #[error("invalid hex payload: {0}")]
    InvalidHex(String),
    /// Gzip stream is corrupt or truncated.
    #[error("corrupt gzip stream: {0}")]
    Decompress(String),
    /// Gzip compression failed.
    #[error("gzip compression failed: {0}")]
    Compress(String),
    /// Bitstring exceeds the codec maximum.
    #[error("bitstring exceeds {max_bits} bits")]
    TooLarge {
        /// Maximum supported bits.
        max_bits: u64,
    },
    /// Payload holds fewer bits than requested.
    #[error("bitstring holds {actual_bits} bits, expected at least {expected_bits}")]
    TooShort {
        /// Requested length.
        expected_bits: u64,
        /// Decoded length.
        actual_bits: u64,
    },
}

// ============================================================================
// SECTION: Codec
// ============================================================================

/// Encodes a bitstring as gzip + the chosen text encoding.
///
/// # Errors
///
/// Returns [`CodecError::TooLarge`] for oversized input and
/// [`CodecError::Compress`] when compression fails.
pub fn encode(bits: &StatusBitstring, encoding: Encoding) -> Result<EncodedBlob, CodecError> {
    if bits.len() as u64 > MAX_BITSTRING_BITS {
        return Err(CodecError::TooLarge {
            max_bits: MAX_BITSTRING_BITS,
        });
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&bits.to_bytes()).map_err(|err| CodecError::Compress(err.to_string()))?;
    let compressed = encoder.finish().map_err(|err| CodecError::Compress(err.to_string()))?;
    let payload = match encoding {
        Encoding::Base64Url => BASE64URL.encode(&compressed),
        Encoding::Hex => hex::encode(&compressed),
    };
    Ok(EncodedBlob {
        encoding,
        payload,
    })
}

/// Decodes a blob into a bitstring of `decompressed_bytes * 8` bits.
///
/// # Errors
///
/// Returns [`CodecError`] on malformed text, corrupt gzip, or oversized output.
pub fn decode(blob: &EncodedBlob) -> Result<StatusBitstring, CodecError> {
    Ok(StatusBitstring::from_bytes(decompress(blob)?))
}

/// Decodes a blob and truncates it to exactly `len` bits.
///
/// # Errors
///
/// Returns [`CodecError::TooShort`] when the payload carries fewer than `len`
/// bits, or any [`decode`] error.
pub fn decode_exact(blob: &EncodedBlob, len: u64) -> Result<StatusBitstring, CodecError> {
    let mut bits = decode(blob)?;
    let actual_bits = bits.len() as u64;
    if actual_bits < len {
        return Err(CodecError::TooShort {
            expected_bits: len,
            actual_bits,
        });
    }
    let len = usize::try_from(len).map_err(|_| CodecError::TooLarge {
        max_bits: MAX_BITSTRING_BITS,
    })?;
    bits.truncate(len);
    Ok(bits)
}

/// Reports the capacity of an encoded blob without knowing its size up front.
///
/// A declared (non-zero) length wins. Otherwise the payload is decompressed
/// and its byte length times eight is used. When that fails the documented
/// default is returned together with the failure reason; this never errors.
#[must_use]
pub fn size_of(blob: &EncodedBlob, declared_bits: Option<u64>) -> CapacityEstimate {
    if let Some(bits) = declared_bits.filter(|bits| *bits > 0) {
        return CapacityEstimate {
            bits,
            source: CapacitySource::Declared,
            fallback_reason: None,
        };
    }
    match decompress(blob) {
        Ok(bytes) => CapacityEstimate {
            bits: (bytes.len() as u64).saturating_mul(8),
            source: CapacitySource::Decompressed,
            fallback_reason: None,
        },
        Err(err) => CapacityEstimate {
            bits: DEFAULT_CAPACITY_BITS,
            source: CapacitySource::Default,
            fallback_reason: Some(err.to_string()),
        },
    }
}

/// Decodes the text layer and inflates the gzip stream with a size bound.
fn decompress(blob: &EncodedBlob) -> Result<Vec<u8>, CodecError> {
    let compressed = match blob.encoding {
        Encoding::Base64Url => BASE64URL
            .decode(blob.payload.trim())
            .map_err(|err| CodecError::InvalidBase64(err.to_string()))?,
        Encoding::Hex => {
            hex::decode(blob.payload.trim()).map_err(|err| CodecError::InvalidHex(err.to_string()))?
        }
    };
    let mut bytes = Vec::new();
    GzDecoder::new(compressed.as_slice())
        .take(MAX_BITSTRING_BYTES + 1)
        .read_to_end(&mut bytes)
        .map_err(|err| CodecError::Decompress(err.to_string()))?;
    if bytes.len() as u64 > MAX_BITSTRING_BYTES {
        return Err(CodecError::TooLarge {
            max_bits: MAX_BITSTRING_BITS,
        });
    }
    Ok(bytes)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Test-only assertions are permitted.")]

    use super::CapacitySource;
    use super::CodecError;
    use super::DEFAULT_CAPACITY_BITS;
    use super::EncodedBlob;
    use super::Encoding;
    use super::decode;
    use super::decode_exact;
    use super::encode;
    use super::size_of;
    use crate::core::bitstring::StatusBitstring;

    #[test]
    fn encoding_is_deterministic() {
        let mut bits = StatusBitstring::zeroed(1024);
        bits.set(17, true);
        let first = encode(&bits, Encoding::Base64Url).expect("encode");
        let second = encode(&bits, Encoding::Base64Url).expect("encode");
        assert_eq!(first, second);
        assert!(!first.payload.contains('='));
    }

    #[test]
    fn hex_roundtrip_preserves_bits() {
        let mut bits = StatusBitstring::zeroed(64);
        bits.set(63, true);
        let blob = encode(&bits, Encoding::Hex).expect("encode");
        assert!(blob.payload.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(decode(&blob).expect("decode"), bits);
    }

    #[test]
    fn decode_exact_truncates_padding() {
        let bits = StatusBitstring::from_bools(&[true, false, true, true, false]);
        let blob = encode(&bits, Encoding::Base64Url).expect("encode");
        assert_eq!(decode(&blob).expect("decode").len(), 8);
        assert_eq!(decode_exact(&blob, 5).expect("decode exact"), bits);
        assert!(matches!(decode_exact(&blob, 9), Err(CodecError::TooShort { .. })));
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        let bad_text = EncodedBlob {
            encoding: Encoding::Base64Url,
            payload: "***".to_string(),
        };
        assert!(matches!(decode(&bad_text), Err(CodecError::InvalidBase64(_))));
        let bad_hex = EncodedBlob {
            encoding: Encoding::Hex,
            payload: "zz".to_string(),
        };
        assert!(matches!(decode(&bad_hex), Err(CodecError::InvalidHex(_))));
        let not_gzip = EncodedBlob {
            encoding: Encoding::Hex,
            payload: "00112233".to_string(),
        };
        assert!(matches!(decode(&not_gzip), Err(CodecError::Decompress(_))));
    }

    #[test]
    fn truncated_gzip_stream_is_rejected() {
        let blob = encode(&StatusBitstring::zeroed(4096), Encoding::Hex).expect("encode");
        let truncated = EncodedBlob {
            encoding: Encoding::Hex,
            payload: blob.payload[.. blob.payload.len() / 4 * 2].to_string(),
        };
        assert!(matches!(decode(&truncated), Err(CodecError::Decompress(_))));
    }

    #[test]
    fn size_of_prefers_declared_then_decompressed_then_default() {
        let blob = encode(&StatusBitstring::zeroed(800), Encoding::Base64Url).expect("encode");
        let declared = size_of(&blob, Some(1000));
        assert_eq!(declared.bits, 1000);
        assert_eq!(declared.source, CapacitySource::Declared);
        let derived = size_of(&blob, None);
        assert_eq!(derived.bits, 800);
        assert_eq!(derived.source, CapacitySource::Decompressed);
        let broken = EncodedBlob {
            encoding: Encoding::Base64Url,
            payload: "not gzip".to_string(),
        };
        let fallback = size_of(&broken, Some(0));
        assert_eq!(fallback.bits, DEFAULT_CAPACITY_BITS);
        assert_eq!(fallback.source, CapacitySource::Default);
        assert!(fallback.fallback_reason.is_some());
    }
}
