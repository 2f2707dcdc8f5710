//! Accept-Encoding parsing and negotiation

use crate::compressor::{Encoding, GZIP};
use std::cmp::Ordering;

/// One `coding;q=value` entry of an Accept-Encoding header
#[derive(Debug, Clone, PartialEq)]
pub struct EncodingSpec {
    /// Content-coding token as sent (a `*` wildcard is stored as `gzip`)
    pub value: String,
    /// Quality value, `1.0` when absent or unparsable
    pub quality: f32,
}

impl EncodingSpec {
    fn parse(item: &str) -> Option<Self> {
        let mut params = item.trim().split(';');
        let name = params.next()?.trim();
        if name.is_empty() {
            return None;
        }

        let quality = params
            .filter_map(|param| {
                let (key, value) = param.split_once('=')?;
                key.trim()
                    .eq_ignore_ascii_case("q")
                    .then(|| value.trim().parse::<f32>().unwrap_or(1.0))
            })
            .next()
            .unwrap_or(1.0);

        // The wildcard stands for "any coding"; gzip is the canonical pick.
        let value = if name == "*" { GZIP } else { name };

        Some(Self {
            value: value.to_string(),
            quality,
        })
    }

    /// Coding this entry names
    pub fn encoding(&self) -> Encoding {
        Encoding::from_name(&self.value)
    }
}

/// Parsed Accept-Encoding header, in the order the client listed codings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodingPreference {
    specs: Vec<EncodingSpec>,
}

impl EncodingPreference {
    /// Parse a (possibly comma-joined multi-line) Accept-Encoding value
    pub fn parse(header: &str) -> Self {
        Self {
            specs: header.split(',').filter_map(EncodingSpec::parse).collect(),
        }
    }

    /// All entries, in header order
    pub fn specs(&self) -> &[EncodingSpec] {
        &self.specs
    }

    /// Highest-quality coding this crate can produce.
    ///
    /// Ties keep header order; entries with `q=0` are refused codings and
    /// never win. Falls back to identity when nothing supported is listed.
    pub fn preferred(&self) -> Encoding {
        let mut candidates: Vec<&EncodingSpec> = self
            .specs
            .iter()
            .filter(|spec| spec.quality > 0.0 && spec.encoding().is_supported())
            .collect();

        candidates.sort_by(|a, b| b.quality.partial_cmp(&a.quality).unwrap_or(Ordering::Equal));

        candidates
            .first()
            .map(|spec| spec.encoding())
            .unwrap_or(Encoding::Identity)
    }
}

/// Keep only the Accept-Encoding entries naming supported codings.
///
/// Entries are kept verbatim (quality annotations included) and in their
/// original order; everything else, wildcards included, is dropped. The
/// result is empty when no supported coding remains.
pub fn filter_supported(header: &str) -> String {
    header
        .split(',')
        .map(str::trim)
        .filter(|item| {
            let name = item.split(';').next().unwrap_or_default().trim();
            !name.is_empty() && Encoding::from_name(name).is_supported()
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preferred(header: &str) -> Encoding {
        EncodingPreference::parse(header).preferred()
    }

    #[test]
    fn test_preferred_single() {
        assert_eq!(preferred("gzip"), Encoding::Gzip);
        assert_eq!(preferred("deflate"), Encoding::Deflate);
        assert_eq!(preferred("identity"), Encoding::Identity);
    }

    #[test]
    fn test_preferred_ignores_brotli() {
        assert_eq!(preferred("br, gzip"), Encoding::Gzip);
        assert_eq!(preferred("br"), Encoding::Identity);
        assert_eq!(preferred(""), Encoding::Identity);
    }

    #[test]
    fn test_preferred_wildcard_is_gzip() {
        assert_eq!(preferred("*"), Encoding::Gzip);
    }

    #[test]
    fn test_preferred_respects_quality() {
        assert_eq!(preferred("gzip;q=0.8, deflate;q=0.6"), Encoding::Gzip);
        assert_eq!(preferred("gzip;q=0.8, deflate;q=0.9"), Encoding::Deflate);
        assert_eq!(preferred("gzip; q=0.5, deflate"), Encoding::Deflate);
    }

    #[test]
    fn test_preferred_ties_keep_order() {
        assert_eq!(preferred("deflate, gzip"), Encoding::Deflate);
        assert_eq!(preferred("gzip;q=0.5, deflate;q=0.5"), Encoding::Gzip);
    }

    #[test]
    fn test_preferred_skips_refused() {
        assert_eq!(preferred("gzip;q=0, deflate;q=0.1"), Encoding::Deflate);
        assert_eq!(preferred("gzip;q=0"), Encoding::Identity);
    }

    #[test]
    fn test_bad_quality_defaults_to_one() {
        let preference = EncodingPreference::parse("gzip;q=abc");
        assert_eq!(preference.specs()[0].quality, 1.0);
    }

    #[test]
    fn test_filter_supported() {
        assert_eq!(filter_supported("gzip"), "gzip");
        assert_eq!(filter_supported("deflate"), "deflate");
        assert_eq!(filter_supported("identity"), "identity");
        assert_eq!(filter_supported("br, gzip"), "gzip");
        assert_eq!(filter_supported("*"), "");
        assert_eq!(filter_supported("br"), "");
        assert_eq!(
            filter_supported("gzip;q=0.8, deflate;q=0.6"),
            "gzip;q=0.8, deflate;q=0.6"
        );
        assert_eq!(
            filter_supported("br;q=1.0, gzip;q=0.8, zstd, identity;q=0.1"),
            "gzip;q=0.8, identity;q=0.1"
        );
    }
}
