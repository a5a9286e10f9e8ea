//! Base64 decoding for subscription feeds and key payloads

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;

/// Decode a string that may be base64 in either the URL-safe or the standard
/// alphabet, with or without padding.
///
/// Embedded ASCII whitespace is stripped and missing padding is repaired
/// before decoding. Returns an empty string when neither alphabet yields
/// valid UTF-8.
pub fn decode_base64(data: &str) -> String {
    let cleaned: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if cleaned.is_empty() {
        return String::new();
    }

    let padded = match cleaned.len() % 4 {
        0 => cleaned,
        rem => {
            let mut padded = cleaned;
            padded.push_str(&"=".repeat(4 - rem));
            padded
        }
    };

    for engine in [&URL_SAFE, &STANDARD] {
        if let Ok(bytes) = engine.decode(&padded) {
            if let Ok(text) = String::from_utf8(bytes) {
                return text;
            }
        }
    }

    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_standard_alphabet() {
        assert_eq!(decode_base64("aGVsbG8="), "hello");
    }

    #[test]
    fn test_decode_repairs_missing_padding() {
        assert_eq!(decode_base64("aGVsbG8"), "hello");
    }

    #[test]
    fn test_decode_url_safe_alphabet() {
        // "????" encodes to "Pz8_Pw==" in the URL-safe alphabet
        assert_eq!(decode_base64("Pz8_Pw"), "????");
    }

    #[test]
    fn test_decode_strips_whitespace() {
        assert_eq!(decode_base64("aGVs\nbG8g\nd29ybGQ="), "hello world");
    }

    #[test]
    fn test_decode_invalid_input() {
        assert_eq!(decode_base64("!!!not base64!!!"), "");
    }

    #[test]
    fn test_decode_empty_input() {
        assert_eq!(decode_base64(""), "");
    }

    #[test]
    fn test_decode_rejects_non_utf8() {
        // 0xff 0xfe is not valid UTF-8
        assert_eq!(decode_base64("//4="), "");
    }
}
