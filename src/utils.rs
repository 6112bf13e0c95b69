//! Utility functions shared across modules

use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Check if content appears to be binary (contains null bytes or high ratio of non-printable chars).
///
/// This checks the first 8KB of content for binary indicators:
/// - Null bytes are a strong indicator of binary content
/// - More than 10% non-printable characters suggests binary content
pub fn is_binary_content(content: &str) -> bool {
    let sample = &content.as_bytes()[..content.len().min(8192)];

    let mut non_text_count = 0;
    for &byte in sample {
        if byte == 0 {
            return true;
        }
        // Count non-printable, non-whitespace characters (excluding common control chars)
        if byte < 32 && !matches!(byte, b'\t' | b'\n' | b'\r' | 0x0c) {
            non_text_count += 1;
        }
    }

    non_text_count > sample.len() / 10
}

/// Decode raw file bytes into text.
///
/// Returns `None` for binary content, and for non-UTF-8 content when transcoding is
/// disabled or the detected encoding cannot decode it cleanly.
pub fn decode_text(bytes: Vec<u8>, transcode_non_utf8: bool) -> Option<String> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(&bytes) {
        let (text, had_errors) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return (!had_errors && !is_binary_content(&text)).then(|| text.into_owned());
    }

    match String::from_utf8(bytes) {
        Ok(text) => (!is_binary_content(&text)).then_some(text),
        Err(e) => {
            if !transcode_non_utf8 {
                return None;
            }
            let bytes = e.into_bytes();
            if bytes.contains(&0) {
                return None;
            }
            let mut detector = EncodingDetector::new();
            detector.feed(&bytes, true);
            let encoding = detector.guess(None, true);
            let (text, _, had_errors) = encoding.decode(&bytes);
            (!had_errors && !is_binary_content(&text)).then(|| text.into_owned())
        }
    }
}

/// Read a file and decode it with [`decode_text`].
pub fn read_text_file(path: &Path, transcode_non_utf8: bool) -> std::io::Result<Option<String>> {
    let bytes = std::fs::read(path)?;
    Ok(decode_text(bytes, transcode_non_utf8))
}

/// Last-write time of a file as nanoseconds since the Unix epoch.
pub fn file_timestamp(path: &Path) -> std::io::Result<i64> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos() as i64,
        Err(e) => -(e.duration().as_nanos() as i64),
    })
}

/// Lines that add index bulk without search value: blank lines and lone braces.
pub fn is_trivial_line(line: &str) -> bool {
    matches!(line.trim(), "" | "{" | "}")
}

/// Lower-cased maximal runs of alphanumeric characters, the way the line index
/// tokenizes text. Underscores and punctuation separate tokens.
pub fn index_tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|run| !run.is_empty())
        .map(|run| run.to_lowercase())
        .collect()
}

/// Format a number with underscore separators for readability (e.g., 89210 -> "89_210")
pub fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push('_');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}
