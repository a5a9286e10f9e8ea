//! Key module for VPN subscription key operations
//!
//! This module provides functionality for:
//! - Parsing subscription feeds into individual keys
//! - Translating keys into engine outbound configurations
//! - Launching the proxy engine and probing keys through it
//! - Geolocating exit IPs
//! - Ranking working keys and exporting subscription files

pub mod config;
pub mod decode;
pub mod engine;
pub mod export;
pub mod fetch;
pub mod geo;
pub mod models;
pub mod parser;
pub mod probes;
pub mod rank;
pub mod translator;
pub mod verifier;

pub use config::LaunchConfig;
pub use decode::decode_base64;
pub use engine::{locate_engine, EngineProcess};
pub use export::{ExportConfig, Exporter};
pub use fetch::{FetchResult, FetcherConfig, SubscriptionFetcher};
pub use geo::{GeoInfo, GeoLocator};
pub use models::{CheckError, Protocol, Verdict};
pub use parser::FeedParser;
pub use translator::{translate, Outbound, TranslateError};
pub use verifier::{KeyChecker, VerifierConfig};
