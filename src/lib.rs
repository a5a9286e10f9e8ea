//! Keycheck - VPN Key Parser and Checker
//!
//! This is a VPN subscription key parser and checker with multi-threading
//! support. It parses keys from subscription feeds, translates them into
//! sing-box outbound configurations and checks their validity through a
//! local sing-box process.

pub mod key;
pub mod tui;

pub use key::*;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
