//! Character encoding resolution shared by the fetcher and the content
//! extractor.

use std::borrow::Cow;
use std::fmt;

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

lazy_static! {
    static ref META_CHARSET: Regex =
        Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?([A-Za-z0-9_\-]+)"#).expect("valid regex");
}

/// Which step of the chain produced the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DecodeStage {
    /// Byte order mark, Content-Type charset or `<meta charset>`.
    Declared,
    /// Statistical detection with a confident assessment.
    Detected,
    /// First candidate that decoded without errors.
    Candidate,
    /// UTF-8 with invalid sequences replaced.
    Lossy,
}

impl fmt::Display for DecodeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DecodeStage::Declared => "declared",
            DecodeStage::Detected => "detected",
            DecodeStage::Candidate => "candidate",
            DecodeStage::Lossy => "lossy",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct Decoded {
    pub text: String,
    pub encoding: &'static Encoding,
    pub stage: DecodeStage,
}

/// Ordered fallback chain: declared charset, detection, candidate list,
/// then lossy UTF-8. Never fails.
#[derive(Debug, Clone)]
pub struct FallbackDecoder {
    candidates: Vec<&'static Encoding>,
}

impl Default for FallbackDecoder {
    fn default() -> Self {
        Self::with_candidates(&["utf-8", "gb2312", "gbk", "big5"])
    }
}

impl FallbackDecoder {
    /// Labels are resolved WHATWG-style, so `gb2312` and `gbk` collapse to
    /// one encoding. Unknown labels are dropped.
    pub fn with_candidates(labels: &[&str]) -> Self {
        let mut candidates: Vec<&'static Encoding> = Vec::new();
        for label in labels {
            match normalize_label(label) {
                Some(encoding) if !candidates.contains(&encoding) => candidates.push(encoding),
                Some(_) => {}
                None => debug!(label, "Ignoring unknown encoding label"),
            }
        }
        Self { candidates }
    }

    #[cfg(test)]
    fn candidates(&self) -> &[&'static Encoding] {
        &self.candidates
    }

    /// `declared` is the charset from the transport, if any. `tld` helps
    /// the detector (`cn`, `tw`, ...).
    pub fn decode(&self, bytes: &[u8], declared: Option<&str>, tld: Option<&str>) -> Decoded {
        if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
            if let Some(text) = strict(encoding, &bytes[bom_len..]) {
                return Decoded::new(text, encoding, DecodeStage::Declared);
            }
        }

        let declared = declared
            .and_then(normalize_label)
            .or_else(|| meta_charset(bytes));
        if let Some(encoding) = declared {
            match strict(encoding, bytes) {
                Some(text) => return Decoded::new(text, encoding, DecodeStage::Declared),
                None => debug!(encoding = encoding.name(), "Declared charset failed to decode"),
            }
        }

        let mut detector = EncodingDetector::new();
        detector.feed(bytes, true);
        let (detected, confident) = detector.guess_assess(tld.map(str::as_bytes), true);
        if confident {
            if let Some(text) = strict(detected, bytes) {
                return Decoded::new(text, detected, DecodeStage::Detected);
            }
        }

        for &candidate in &self.candidates {
            if let Some(text) = strict(candidate, bytes) {
                return Decoded::new(text, candidate, DecodeStage::Candidate);
            }
        }

        Decoded::new(String::from_utf8_lossy(bytes).into_owned(), UTF_8, DecodeStage::Lossy)
    }
}

impl Decoded {
    fn new(text: String, encoding: &'static Encoding, stage: DecodeStage) -> Self {
        Self { text, encoding, stage }
    }
}

/// Map a charset label onto its canonical encoding (`GB2312` and `gbk`
/// both become GBK, `utf8` becomes UTF-8).
pub fn normalize_label(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.trim().trim_matches('"').as_bytes())
}

/// Charset parameter of a Content-Type header value.
pub fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

fn meta_charset(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(2048)]);
    META_CHARSET
        .captures(&head)
        .and_then(|c| c.get(1))
        .and_then(|m| normalize_label(m.as_str()))
}

fn strict(encoding: &'static Encoding, bytes: &[u8]) -> Option<String> {
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(Cow::into_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::{BIG5, GBK};

    const SAMPLE: &str = "国务院总理主持召开国务院常务会议，研究部署进一步优化营商环境的政策措施，讨论通过相关法规草案。";

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("GB2312"), Some(GBK));
        assert_eq!(normalize_label("gbk"), Some(GBK));
        assert_eq!(normalize_label("utf8"), Some(UTF_8));
        assert_eq!(normalize_label("UTF-8"), Some(UTF_8));
        assert_eq!(normalize_label("no-such-charset"), None);
    }

    #[test]
    fn test_candidate_list_is_deduplicated() {
        let decoder = FallbackDecoder::default();
        assert_eq!(decoder.candidates(), &[UTF_8, GBK, BIG5]);
    }

    #[test]
    fn test_declared_charset_wins() {
        let (bytes, _, _) = GBK.encode(SAMPLE);
        let decoded = FallbackDecoder::default().decode(&bytes, Some("gb2312"), None);
        assert_eq!(decoded.text, SAMPLE);
        assert_eq!(decoded.encoding, GBK);
        assert_eq!(decoded.stage, DecodeStage::Declared);
    }

    #[test]
    fn test_meta_charset_counts_as_declared() {
        let html = format!(r#"<html><head><meta charset="gbk"></head><body>{}</body></html>"#, SAMPLE);
        let (bytes, _, _) = GBK.encode(&html);
        let decoded = FallbackDecoder::default().decode(&bytes, None, None);
        assert_eq!(decoded.stage, DecodeStage::Declared);
        assert!(decoded.text.contains(SAMPLE));
    }

    #[test]
    fn test_wrong_declaration_falls_through() {
        let (bytes, _, _) = GBK.encode(SAMPLE);
        let decoded = FallbackDecoder::default().decode(&bytes, Some("utf-8"), Some("cn"));
        assert_ne!(decoded.stage, DecodeStage::Declared);
        assert_ne!(decoded.stage, DecodeStage::Lossy);
        assert_eq!(decoded.text, SAMPLE);
    }

    #[test]
    fn test_undeclared_utf8() {
        let decoded = FallbackDecoder::default().decode(SAMPLE.as_bytes(), None, Some("cn"));
        assert_eq!(decoded.text, SAMPLE);
        assert_eq!(decoded.encoding, UTF_8);
    }

    #[test]
    fn test_bom_is_honoured() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(SAMPLE.as_bytes());
        let decoded = FallbackDecoder::default().decode(&bytes, Some("gbk"), None);
        assert_eq!(decoded.text, SAMPLE);
        assert_eq!(decoded.stage, DecodeStage::Declared);
    }

    #[test]
    fn test_garbage_never_panics() {
        let garbage: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let decoder = FallbackDecoder::with_candidates(&["utf-8"]);
        let decoded = decoder.decode(&garbage, Some("utf-8"), None);
        assert!(!decoded.text.is_empty());

        let empty = decoder.decode(&[], None, None);
        assert!(empty.text.is_empty());
    }

    #[test]
    fn test_lossy_is_last_resort() {
        let decoder = FallbackDecoder::with_candidates(&["utf-8"]);
        let decoded = decoder.decode(b"ok \xff\xfe\xfd", Some("utf-8"), None);
        // The detector may still claim a single-byte encoding; either way
        // the ASCII survives.
        assert!(decoded.text.starts_with("ok "));
    }

    #[test]
    fn test_charset_from_content_type() {
        assert_eq!(
            charset_from_content_type("text/html; charset=GB2312"),
            Some("GB2312".to_string())
        );
        assert_eq!(
            charset_from_content_type(r#"text/html;charset="utf-8""#),
            Some("utf-8".to_string())
        );
        assert_eq!(charset_from_content_type("text/html"), None);
    }
}
