//! Geolocation of egress IPs

use crate::Result;
use maxminddb::{geoip2, Reader};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// ISP names longer than this are truncated for display
const MAX_ISP_LEN: usize = 25;

/// Corporate suffixes removed from ISP names
const ISP_NOISE: [&str; 6] = ["LLC", "Ltd.", "Ltd", "Limited", "Corporation", "Inc."];

/// Country and ISP information for an egress IP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoInfo {
    /// Country name
    pub country: String,
    /// ISO country code
    pub country_code: String,
    /// ISP or organization name
    pub isp: String,
}

impl Default for GeoInfo {
    fn default() -> Self {
        Self {
            country: "Unknown".to_string(),
            country_code: "XX".to_string(),
            isp: "Unknown".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    #[serde(default)]
    country: String,
    #[serde(rename = "countryCode", default)]
    country_code: String,
    #[serde(default)]
    isp: String,
    #[serde(default)]
    org: String,
}

/// Look up country and ISP for an IP address via ip-api.com
///
/// The request goes through the given client; passing the proxied client
/// reports how the egress IP is classified from outside the tunnel. Any
/// failure degrades to the default GeoInfo.
pub async fn ip_info(client: &Client, ip: &str) -> GeoInfo {
    let url = format!(
        "http://ip-api.com/json/{}?fields=country,countryCode,isp,org",
        ip
    );

    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(e) => {
            debug!("geo lookup for {} failed: {}", ip, e);
            return GeoInfo::default();
        }
    };

    let data: IpApiResponse = match response.json().await {
        Ok(data) => data,
        Err(e) => {
            debug!("geo response for {} unreadable: {}", ip, e);
            return GeoInfo::default();
        }
    };

    let mut info = GeoInfo::default();
    if !data.country.is_empty() {
        info.country = data.country;
    }
    if !data.country_code.is_empty() {
        info.country_code = data.country_code;
    }
    let isp = if data.isp.is_empty() { data.org } else { data.isp };
    if !isp.is_empty() {
        info.isp = clean_isp(&isp);
    }
    info
}

/// Cosmetic cleanup of ISP names for display
pub fn clean_isp(isp: &str) -> String {
    let mut name = isp.to_string();
    for noise in ISP_NOISE {
        name = name.replace(noise, "");
    }
    let name = name
        .trim_matches(|c: char| c.is_whitespace() || c == ',' || c == '.')
        .to_string();

    if name.chars().count() > MAX_ISP_LEN {
        let short: String = name.chars().take(22).collect();
        format!("{}...", short)
    } else {
        name
    }
}

/// Offline country lookup backed by an MMDB database
///
/// Used as a fallback when the online lookup reports nothing for an IP.
pub struct GeoLocator {
    reader: Arc<Reader<Vec<u8>>>,
}

impl GeoLocator {
    /// Open an MMDB database file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = Reader::open_readfile(path)?;
        Ok(Self {
            reader: Arc::new(reader),
        })
    }

    /// Look up country information for an IP address string
    pub fn lookup(&self, ip_str: &str) -> Result<GeoInfo> {
        let ip: IpAddr = ip_str.parse()?;
        self.lookup_ip(ip)
    }

    /// Look up country information for an IP address
    pub fn lookup_ip(&self, ip: IpAddr) -> Result<GeoInfo> {
        let lookup_result = self.reader.lookup(ip)?;
        let city: Option<geoip2::City> = lookup_result.decode()?;

        let Some(city) = city else {
            return Ok(GeoInfo::default());
        };

        let mut info = GeoInfo::default();
        if let Some(code) = city.country.iso_code {
            info.country_code = code.to_string();
        }
        if let Some(name) = city.country.names.english {
            info.country = name.to_string();
        }
        Ok(info)
    }
}

impl Clone for GeoLocator {
    fn clone(&self) -> Self {
        Self {
            reader: Arc::clone(&self.reader),
        }
    }
}
