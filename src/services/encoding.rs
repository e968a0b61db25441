use std::fs;
use std::path::Path;

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use serde::Serialize;

use crate::error::{Error, Result};

#[derive(Debug, Serialize)]
pub struct EncodingDetectionResult {
    pub best: String,
    pub confidence: f32,
}

/// Decoded file contents plus the encoding they were read with.
#[derive(Debug)]
pub struct DecodedText {
    pub text: String,
    pub encoding: &'static str,
    pub had_bom: bool,
}

impl DecodedText {
    pub fn is_utf8(&self) -> bool {
        self.encoding == UTF_8.name()
    }
}

pub fn read_text(path: &Path) -> Result<DecodedText> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    Ok(decode(&bytes))
}

pub fn decode(bytes: &[u8]) -> DecodedText {
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        let (text, _) = UTF_8.decode_without_bom_handling(rest);
        return DecodedText {
            text: text.into_owned(),
            encoding: UTF_8.name(),
            had_bom: true,
        };
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return DecodedText {
            text: text.to_string(),
            encoding: UTF_8.name(),
            had_bom: false,
        };
    }

    let encoding = guess(bytes);
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        tracing::warn!("decoding as {} replaced invalid bytes", encoding.name());
    }

    DecodedText {
        text: text.into_owned(),
        encoding: encoding.name(),
        had_bom: false,
    }
}

fn guess(bytes: &[u8]) -> &'static Encoding {
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    detector.guess(None, true)
}

pub fn detect_from_file(path: &Path) -> Result<EncodingDetectionResult> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;

    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return Ok(EncodingDetectionResult {
            best: "utf-8-sig".into(),
            confidence: 0.99,
        });
    }

    if std::str::from_utf8(&bytes).is_ok() {
        return Ok(EncodingDetectionResult {
            best: "utf-8".into(),
            confidence: estimate_confidence(&bytes, UTF_8),
        });
    }

    let encoding = guess(&bytes);
    Ok(EncodingDetectionResult {
        best: encoding.name().to_lowercase(),
        confidence: estimate_confidence(&bytes, encoding),
    })
}

fn estimate_confidence(bytes: &[u8], encoding: &'static Encoding) -> f32 {
    let (text, _, had_errors) = encoding.decode(bytes);

    if had_errors {
        return 0.35;
    }

    let len = text.len();
    if len < 64 {
        0.55
    } else if len < 512 {
        0.70
    } else if len < 4096 {
        0.82
    } else {
        0.90
    }
}
