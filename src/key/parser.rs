//! Feed parser for extracting keys from subscription content

use crate::key::decode::decode_base64;
use crate::Result;
use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use url::Url;

/// URI prefixes recognized as proxy keys in feeds
pub const KEY_PREFIXES: [&str; 8] = [
    "vless://",
    "vmess://",
    "ss://",
    "trojan://",
    "hysteria2://",
    "hy2://",
    "hysteria://",
    "tuic://",
];

/// Below this many line-scanned keys, token extraction kicks in for feeds
/// that pack several keys on one line
const MIN_LINE_SCAN_KEYS: usize = 10;

/// Longest display name produced for a key
const MAX_NAME_LEN: usize = 35;

/// Matches key URIs embedded in arbitrary text, up to the next whitespace
static KEY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:vless|vmess|trojan|hysteria2|hy2|hysteria|tuic|ss)://\S+")
        .expect("Invalid key regex")
});

/// Parser for extracting keys from subscription feeds
pub struct FeedParser;

impl FeedParser {
    /// Extract keys from raw feed content
    ///
    /// The whole body may be base64-encoded; it is decoded first when the
    /// decoded form contains a recognized prefix. Keys are then collected
    /// line by line, falling back to token extraction when line scanning
    /// finds suspiciously few. Duplicates are dropped, keeping the first
    /// occurrence.
    pub fn parse_string(content: &str) -> Vec<String> {
        let decoded = decode_base64(content);
        let content = if !decoded.is_empty() && Self::contains_key_prefix(&decoded) {
            decoded
        } else {
            content.to_string()
        };

        let mut keys: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| Self::is_key_line(line))
            .map(String::from)
            .collect();

        if keys.len() < MIN_LINE_SCAN_KEYS && Self::contains_key_prefix(&content) {
            keys = KEY_REGEX
                .find_iter(&content)
                .map(|m| m.as_str().to_string())
                .collect();
        }

        let mut seen = HashSet::new();
        keys.retain(|key| seen.insert(key.clone()));
        keys
    }

    /// Parse keys from a file
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse_string(&content))
    }

    /// Save keys to a file, one per line
    pub fn save_to_file<P: AsRef<Path>>(keys: &[String], path: P) -> Result<()> {
        fs::write(path, keys.join("\n"))?;
        Ok(())
    }

    /// Human-readable display name for a key
    ///
    /// Uses the percent-decoded fragment after the last '#' when one is
    /// present, the host:port otherwise, truncated to 35 characters.
    pub fn key_name(key: &str) -> String {
        if let Some((_, fragment)) = key.rsplit_once('#') {
            let name = percent_decode_str(fragment).decode_utf8_lossy();
            let name = name.trim();
            if !name.is_empty() {
                return name.chars().take(MAX_NAME_LEN).collect();
            }
        }

        if let Ok(url) = Url::parse(key) {
            if let Some(host) = url.host_str() {
                let name = match url.port() {
                    Some(port) => format!("{}:{}", host, port),
                    None => host.to_string(),
                };
                return name.chars().take(MAX_NAME_LEN).collect();
            }
        }

        key.chars().take(MAX_NAME_LEN).collect()
    }

    fn contains_key_prefix(content: &str) -> bool {
        KEY_PREFIXES.iter().any(|prefix| content.contains(prefix))
    }

    fn is_key_line(line: &str) -> bool {
        KEY_PREFIXES.iter().any(|prefix| line.starts_with(prefix))
    }
}
