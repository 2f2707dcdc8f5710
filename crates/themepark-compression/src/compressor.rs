//! Core compression functionality

use bytes::Bytes;
use std::io::{self, Read, Write};

/// Gzip content-coding name
pub const GZIP: &str = "gzip";
/// Deflate content-coding name
pub const DEFLATE: &str = "deflate";
/// Identity content-coding name
pub const IDENTITY: &str = "identity";

/// Failure while transcoding a payload
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The compressed stream could not be read back
    #[error("unable to read {encoding} content: {source}")]
    Reader {
        /// Content-coding being decoded
        encoding: &'static str,
        /// Underlying stream error
        source: io::Error,
    },

    /// The payload could not be compressed
    #[error("unable to write {encoding} content: {source}")]
    Writer {
        /// Content-coding being encoded
        encoding: &'static str,
        /// Underlying stream error
        source: io::Error,
    },
}

impl CodecError {
    /// Whether this error came from reading (decoding) a stream
    pub fn is_reader_error(&self) -> bool {
        matches!(self, CodecError::Reader { .. })
    }
}

/// Content-codings this crate understands.
///
/// Anything else parses to [`Encoding::Passthrough`], which transcodes as a
/// no-op so unknown codings (`br`, `zstd`, ...) degrade instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// No transformation
    Identity,
    /// RFC 1952 gzip
    Gzip,
    /// Raw DEFLATE stream
    Deflate,
    /// Unrecognized coding, bytes are left untouched
    Passthrough,
}

impl Encoding {
    /// Parse a Content-Encoding / Accept-Encoding token; empty means identity
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | IDENTITY => Self::Identity,
            GZIP | "x-gzip" => Self::Gzip,
            DEFLATE => Self::Deflate,
            _ => Self::Passthrough,
        }
    }

    /// Canonical token, `None` for unrecognized codings
    pub fn name(&self) -> Option<&'static str> {
        match self {
            Self::Identity => Some(IDENTITY),
            Self::Gzip => Some(GZIP),
            Self::Deflate => Some(DEFLATE),
            Self::Passthrough => None,
        }
    }

    /// Whether content in this coding can be decoded and re-encoded
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Passthrough)
    }

    /// Compress `data` with this coding at the default level
    pub fn encode(&self, data: &[u8]) -> Result<Bytes, CodecError> {
        match self {
            Self::Gzip => Compressor::compress_gzip(data),
            Self::Deflate => Compressor::compress_deflate(data),
            Self::Identity | Self::Passthrough => Ok(Bytes::copy_from_slice(data)),
        }
    }

    /// Fully drain `reader`, decoding it with this coding
    pub fn decode<R: Read>(&self, reader: R) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Gzip => drain(flate2::read::MultiGzDecoder::new(reader), GZIP),
            Self::Deflate => drain(flate2::read::DeflateDecoder::new(reader), DEFLATE),
            Self::Identity | Self::Passthrough => drain(reader, IDENTITY),
        }
    }
}

/// Compress `data` according to the `encoding` token
pub fn encode(data: &[u8], encoding: &str) -> Result<Bytes, CodecError> {
    Encoding::from_name(encoding).encode(data)
}

/// Decode everything `reader` yields according to the `encoding` token
pub fn decode<R: Read>(reader: R, encoding: &str) -> Result<Vec<u8>, CodecError> {
    Encoding::from_name(encoding).decode(reader)
}

fn drain<R: Read>(mut reader: R, encoding: &'static str) -> Result<Vec<u8>, CodecError> {
    let mut data = Vec::new();
    reader
        .read_to_end(&mut data)
        .map_err(|source| CodecError::Reader { encoding, source })?;
    Ok(data)
}

/// Compressor for response bodies
struct Compressor;

impl Compressor {
    /// Compress using gzip
    fn compress_gzip(data: &[u8]) -> Result<Bytes, CodecError> {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let writer_error = |source: io::Error| {
            tracing::error!(error = %source, "unable to gzip rewritten body");
            CodecError::Writer {
                encoding: GZIP,
                source,
            }
        };

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).map_err(writer_error)?;
        let compressed = encoder.finish().map_err(writer_error)?;
        Ok(Bytes::from(compressed))
    }

    /// Compress using raw deflate
    fn compress_deflate(data: &[u8]) -> Result<Bytes, CodecError> {
        use flate2::write::DeflateEncoder;
        use flate2::Compression;

        let writer_error = |source: io::Error| {
            tracing::error!(error = %source, "unable to deflate rewritten body");
            CodecError::Writer {
                encoding: DEFLATE,
                source,
            }
        };

        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).map_err(writer_error)?;
        let compressed = encoder.finish().map_err(writer_error)?;
        Ok(Bytes::from(compressed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PLAIN: &[u8] = b"foo is the new bar";

    #[test]
    fn test_encoding_from_name() {
        assert_eq!(Encoding::from_name("gzip"), Encoding::Gzip);
        assert_eq!(Encoding::from_name(" GZIP "), Encoding::Gzip);
        assert_eq!(Encoding::from_name("deflate"), Encoding::Deflate);
        assert_eq!(Encoding::from_name("identity"), Encoding::Identity);
        assert_eq!(Encoding::from_name(""), Encoding::Identity);
        assert_eq!(Encoding::from_name("br"), Encoding::Passthrough);
        assert!(!Encoding::from_name("zstd").is_supported());
        assert_eq!(Encoding::Passthrough.name(), None);
    }

    #[test]
    fn test_identity_is_noop() {
        assert_eq!(&encode(PLAIN, IDENTITY).unwrap()[..], PLAIN);
        assert_eq!(decode(PLAIN, IDENTITY).unwrap(), PLAIN);
    }

    #[test]
    fn test_unsupported_is_noop() {
        assert_eq!(&encode(PLAIN, "br").unwrap()[..], PLAIN);
        assert_eq!(decode(PLAIN, "br").unwrap(), PLAIN);
        assert_eq!(&encode(PLAIN, "").unwrap()[..], PLAIN);
    }

    #[test]
    fn test_gzip_changes_bytes() {
        let compressed = encode(PLAIN, GZIP).unwrap();
        assert_ne!(&compressed[..], PLAIN);
        // gzip magic
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);
        assert_eq!(decode(&compressed[..], GZIP).unwrap(), PLAIN);
    }

    #[test]
    fn test_deflate_is_raw() {
        let compressed = encode(PLAIN, DEFLATE).unwrap();
        assert_ne!(&compressed[..], PLAIN);

        let mut decoder = flate2::read::DeflateDecoder::new(&compressed[..]);
        let mut plain = Vec::new();
        decoder.read_to_end(&mut plain).unwrap();
        assert_eq!(plain, PLAIN);
    }

    #[test]
    fn test_compresses_repetitive_data() {
        let data = "<div class=\"row\">theme</div>".repeat(200);
        let compressed = encode(data.as_bytes(), GZIP).unwrap();
        assert!(compressed.len() < data.len());
    }

    #[test]
    fn test_corrupt_gzip_is_reader_error() {
        let mut compressed = encode(PLAIN, GZIP).unwrap().to_vec();
        // break the CRC32 trailer
        let crc = compressed.len() - 8;
        compressed[crc] ^= 0xff;

        let err = decode(&compressed[..], GZIP).unwrap_err();
        assert!(err.is_reader_error());
        assert!(err.to_string().contains("gzip"));
    }

    #[test]
    fn test_garbage_gzip_header_is_reader_error() {
        let err = decode(&b"definitely not gzip"[..], GZIP).unwrap_err();
        assert!(matches!(err, CodecError::Reader { encoding: GZIP, .. }));
    }

    #[test]
    fn test_multi_member_gzip() {
        let mut joined = encode(b"first ", GZIP).unwrap().to_vec();
        joined.extend_from_slice(&encode(b"second", GZIP).unwrap());

        assert_eq!(decode(&joined[..], GZIP).unwrap(), b"first second");
    }

    proptest! {
        #[test]
        fn prop_round_trip(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
            for encoding in [Encoding::Identity, Encoding::Gzip, Encoding::Deflate] {
                let encoded = encoding.encode(&data).unwrap();
                let decoded = encoding.decode(&encoded[..]).unwrap();
                prop_assert_eq!(&decoded, &data);
            }
        }
    }
}
