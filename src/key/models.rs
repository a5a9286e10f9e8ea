//! Data models for keys and check results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Supported proxy protocol families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Vless,
    Vmess,
    Trojan,
    Shadowsocks,
    Hysteria2,
}

impl Protocol {
    /// Detect the protocol family from a key URI prefix
    ///
    /// Returns None for schemes that are recognized in feeds but cannot be
    /// checked, such as tuic:// and hysteria://.
    pub fn from_key(key: &str) -> Option<Protocol> {
        if key.starts_with("vless://") {
            Some(Protocol::Vless)
        } else if key.starts_with("vmess://") {
            Some(Protocol::Vmess)
        } else if key.starts_with("trojan://") {
            Some(Protocol::Trojan)
        } else if key.starts_with("ss://") {
            Some(Protocol::Shadowsocks)
        } else if key.starts_with("hysteria2://") || key.starts_with("hy2://") {
            Some(Protocol::Hysteria2)
        } else {
            None
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Vless => write!(f, "vless"),
            Protocol::Vmess => write!(f, "vmess"),
            Protocol::Trojan => write!(f, "trojan"),
            Protocol::Shadowsocks => write!(f, "shadowsocks"),
            Protocol::Hysteria2 => write!(f, "hysteria2"),
        }
    }
}

/// Classification of why a key failed its check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum CheckError {
    /// The key could not be translated into an outbound configuration
    #[error("parse_error")]
    Parse,
    /// The server did not accept a TCP connection within the limits
    #[error("unreachable")]
    Unreachable,
    /// The local engine process exited during startup
    #[error("engine_crash: {0}")]
    EngineCrash(String),
    /// The tunnel carried no traffic to any test endpoint
    #[error("no_connectivity: {0}")]
    Connectivity(String),
}

/// Result of checking a single key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    /// The original key string
    pub key: String,
    /// Overall result: reachable, usable and actually proxying traffic
    pub working: bool,
    /// TCP connection to the server succeeded within the latency ceiling
    pub tcp_reachable: bool,
    /// The tunnel reached at least one connectivity endpoint
    pub proxy_usable: bool,
    /// The egress IP differs from the direct one
    pub ip_changed: bool,
    /// The test file download through the tunnel succeeded
    pub download_ok: bool,
    /// TCP connect latency in milliseconds
    pub latency_ms: u64,
    /// Download speed in KB/s
    pub speed_kbps: f64,
    /// Egress IP as seen by remote services
    pub exit_ip: String,
    /// Country name of the egress IP
    pub country: String,
    /// ISO country code of the egress IP
    pub country_code: String,
    /// ISP of the egress IP
    pub isp: String,
    /// Failure classification when the key is not working
    pub error: Option<CheckError>,
    /// When the check ran
    pub checked_at: DateTime<Utc>,
}

impl Verdict {
    /// Create a fresh verdict for a key with every stage unchecked
    pub fn new(key: String) -> Self {
        Self {
            key,
            working: false,
            tcp_reachable: false,
            proxy_usable: false,
            ip_changed: false,
            download_ok: false,
            latency_ms: 0,
            speed_kbps: 0.0,
            exit_ip: String::new(),
            country: "Unknown".to_string(),
            country_code: "XX".to_string(),
            isp: "Unknown".to_string(),
            error: None,
            checked_at: Utc::now(),
        }
    }

    /// Derive the overall working flag from the stage flags
    ///
    /// A key works when its server is reachable, the tunnel carries traffic,
    /// and at least one of the IP-change or download probes succeeded.
    pub fn finalize(&mut self) {
        self.working =
            self.tcp_reachable && self.proxy_usable && (self.ip_changed || self.download_ok);
    }

    /// Check if the key is working
    pub fn is_working(&self) -> bool {
        self.working
    }
}
