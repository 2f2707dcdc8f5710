//! Content-coding support for the theme-park proxy
//!
//! Provides the codecs the rewriting pipeline can round-trip:
//! - identity (no-op)
//! - gzip
//! - deflate (raw DEFLATE stream)
//!
//! Unrecognized codings are never an error: they transcode as a no-op so the
//! caller can detect them with [`Encoding::is_supported`] and pass content
//! through untouched.

pub mod compressor;
pub mod negotiation;

pub use compressor::{decode, encode, CodecError, Encoding, DEFLATE, GZIP, IDENTITY};
pub use negotiation::{filter_supported, EncodingPreference, EncodingSpec};
