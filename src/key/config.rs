//! Launch configuration files for the local proxy engine

use crate::key::translator::Outbound;
use serde::{Deserialize, Serialize};

/// Log section of an engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogOptions {
    pub level: String,
}

/// Local SOCKS inbound bound to a loopback port
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocksInbound {
    #[serde(rename = "type")]
    pub kind: String,
    pub tag: String,
    pub listen: String,
    pub listen_port: u16,
}

/// Direct (non-proxied) fallback outbound
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectOutbound {
    #[serde(rename = "type")]
    pub kind: String,
    pub tag: String,
}

/// One entry of the outbounds section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigOutbound {
    Proxy(Outbound),
    Direct(DirectOutbound),
}

/// Complete engine configuration for checking one key
///
/// Serializes to the JSON config passed to `sing-box run -c`: quiet logging,
/// a single loopback SOCKS inbound, the key's outbound plus a direct
/// fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchConfig {
    pub log: LogOptions,
    pub inbounds: Vec<SocksInbound>,
    pub outbounds: Vec<ConfigOutbound>,
}

impl LaunchConfig {
    /// Build the configuration for one outbound with a SOCKS inbound on the
    /// given local port
    pub fn new(outbound: Outbound, local_port: u16) -> Self {
        Self {
            log: LogOptions {
                level: "error".to_string(),
            },
            inbounds: vec![SocksInbound {
                kind: "socks".to_string(),
                tag: "socks-in".to_string(),
                listen: "127.0.0.1".to_string(),
                listen_port: local_port,
            }],
            outbounds: vec![
                ConfigOutbound::Proxy(outbound),
                ConfigOutbound::Direct(DirectOutbound {
                    kind: "direct".to_string(),
                    tag: "direct".to_string(),
                }),
            ],
        }
    }
}
