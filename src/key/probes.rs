//! Network probes used while checking a key

use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::debug;

/// Endpoints that prove upstream connectivity through the tunnel
pub const CONNECTIVITY_URLS: [&str; 3] = [
    "https://www.google.com/generate_204",
    "https://cp.cloudflare.com/",
    "https://connectivitycheck.gstatic.com/generate_204",
];

/// HTTP statuses accepted as proof of upstream connectivity
///
/// Redirects and 403 still prove the tunnel carries traffic; the probe
/// client does not follow redirects.
const CONNECTIVITY_OK_STATUS: [u16; 5] = [200, 204, 301, 302, 403];

/// Endpoints that echo the caller's IP address
pub const IP_CHECK_URLS: [&str; 3] = [
    "https://api.ipify.org?format=json",
    "https://ifconfig.me/ip",
    "https://icanhazip.com",
];

/// Small file fetched for the throughput probe
pub const TEST_FILE_URL: &str = "https://www.google.com/favicon.ico";

/// Download speeds below this are flagged as slow in summaries (KB/s)
pub const MIN_SPEED_KBPS: f64 = 50.0;

/// Timeout for resolving the caller's own IP
const OWN_IP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct IpEcho {
    ip: String,
}

/// Check raw TCP reachability of host:port
///
/// Returns whether the connection succeeded and the connect latency in
/// milliseconds. Any failure, including DNS errors and timeouts, yields
/// (false, 0).
pub async fn check_tcp(host: &str, port: u16, timeout: Duration) -> (bool, u64) {
    let start = Instant::now();
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_)) => (true, start.elapsed().as_millis() as u64),
        Ok(Err(e)) => {
            debug!("tcp connect to {}:{} failed: {}", host, port, e);
            (false, 0)
        }
        Err(_) => {
            debug!("tcp connect to {}:{} timed out", host, port);
            (false, 0)
        }
    }
}

/// Check whether the tunnel reaches any well-known endpoint
///
/// Tries each URL in order and accepts the first response with an expected
/// status. Returns a short description of the last failure otherwise.
pub async fn check_connectivity(client: &Client, urls: &[String]) -> Result<(), String> {
    let mut last_error = String::from("no endpoints");

    for url in urls {
        match client.get(url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                if CONNECTIVITY_OK_STATUS.contains(&status) {
                    return Ok(());
                }
                last_error = format!("status={}", status);
            }
            Err(e) => {
                last_error = classify_request_error(&e);
            }
        }
    }

    Err(last_error)
}

/// Look up the egress IP through the tunnel
///
/// Returns the first echoed IP that differs from the caller's own, or None
/// when no endpoint reports a changed IP. Endpoints with "json" in the URL
/// answer JSON, the rest plain text. Non-success answers are skipped, so a
/// block page never counts as an echoed IP.
pub async fn check_ip(client: &Client, own_ip: &str, urls: &[String]) -> Option<String> {
    for url in urls {
        let response = match client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("ip check via {} failed: {}", url, e);
                continue;
            }
        };
        if !response.status().is_success() {
            debug!("ip check via {} answered {}", url, response.status());
            continue;
        }

        let ip = if url.contains("json") {
            match response.json::<IpEcho>().await {
                Ok(echo) => echo.ip.trim().to_string(),
                Err(_) => continue,
            }
        } else {
            match response.text().await {
                Ok(text) => text.trim().to_string(),
                Err(_) => continue,
            }
        };

        if !ip.is_empty() && ip != own_ip {
            return Some(ip);
        }
    }

    None
}

/// Download the test file through the tunnel and measure throughput
///
/// Returns the speed in KB/s, or None when the download fails or carries
/// no data.
pub async fn check_download(client: &Client, url: &str) -> Option<f64> {
    let start = Instant::now();
    let response = client.get(url).send().await.ok()?;
    if !response.status().is_success() {
        return None;
    }
    let bytes = response.bytes().await.ok()?;
    if bytes.is_empty() {
        return None;
    }
    let elapsed = start.elapsed().as_secs_f64().max(0.001);
    Some(bytes.len() as f64 / 1024.0 / elapsed)
}

/// Resolve the caller's own egress IP without a proxy
///
/// Returns an empty string when the lookup fails; IP-change detection then
/// counts any echoed IP as changed.
pub async fn own_ip() -> String {
    let client = match Client::builder().timeout(OWN_IP_TIMEOUT).no_proxy().build() {
        Ok(client) => client,
        Err(_) => return String::new(),
    };

    match client.get("https://api.ipify.org").send().await {
        Ok(response) => response
            .text()
            .await
            .map(|text| text.trim().to_string())
            .unwrap_or_default(),
        Err(e) => {
            debug!("own ip lookup failed: {}", e);
            String::new()
        }
    }
}

/// Map a request error to a short classification string
fn classify_request_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "timeout".to_string()
    } else if error.is_connect() {
        "connect_error".to_string()
    } else {
        "request_error".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_check_tcp_open_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (ok, _latency) = check_tcp("127.0.0.1", port, Duration::from_secs(5)).await;
        assert!(ok);
    }

    #[tokio::test]
    async fn test_check_tcp_closed_port() {
        // Bind then drop to get a port that is very likely closed
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let start = Instant::now();
        let (ok, latency) = check_tcp("127.0.0.1", port, Duration::from_secs(2)).await;
        assert!(!ok);
        assert_eq!(latency, 0);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_check_tcp_unresolvable_host() {
        let (ok, latency) = check_tcp("no-such-host.invalid", 443, Duration::from_secs(2)).await;
        assert!(!ok);
        assert_eq!(latency, 0);
    }

    #[tokio::test]
    async fn test_check_connectivity_accepts_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = Client::new();
        let urls = vec![format!("{}/generate_204", server.uri())];
        assert!(check_connectivity(&client, &urls).await.is_ok());
    }

    #[tokio::test]
    async fn test_check_connectivity_reports_bad_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = Client::new();
        let urls = vec![server.uri()];
        let err = check_connectivity(&client, &urls).await.unwrap_err();
        assert_eq!(err, "status=503");
    }

    #[tokio::test]
    async fn test_check_connectivity_falls_through_to_next_url() {
        let bad = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&bad)
            .await;
        let good = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&good)
            .await;

        let client = Client::new();
        let urls = vec![bad.uri(), good.uri()];
        assert!(check_connectivity(&client, &urls).await.is_ok());
    }

    #[tokio::test]
    async fn test_check_ip_json_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ip":"9.9.9.9"}"#))
            .mount(&server)
            .await;

        let client = Client::new();
        let urls = vec![format!("{}/json", server.uri())];
        let ip = check_ip(&client, "1.1.1.1", &urls).await;
        assert_eq!(ip.as_deref(), Some("9.9.9.9"));
    }

    #[tokio::test]
    async fn test_check_ip_text_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("9.9.9.9\n"))
            .mount(&server)
            .await;

        let client = Client::new();
        let urls = vec![server.uri()];
        let ip = check_ip(&client, "1.1.1.1", &urls).await;
        assert_eq!(ip.as_deref(), Some("9.9.9.9"));
    }

    #[tokio::test]
    async fn test_check_ip_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(403).set_body_string("<html>Access denied</html>"),
            )
            .mount(&server)
            .await;

        let client = Client::new();
        let urls = vec![server.uri()];
        assert!(check_ip(&client, "1.2.3.4", &urls).await.is_none());
    }

    #[tokio::test]
    async fn test_check_ip_falls_through_past_blocked_endpoint() {
        let blocked = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("blocked"))
            .mount(&blocked)
            .await;
        let good = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("9.9.9.9"))
            .mount(&good)
            .await;

        let client = Client::new();
        let urls = vec![blocked.uri(), good.uri()];
        let ip = check_ip(&client, "1.1.1.1", &urls).await;
        assert_eq!(ip.as_deref(), Some("9.9.9.9"));
    }

    #[tokio::test]
    async fn test_check_ip_ignores_unchanged_ip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("1.1.1.1"))
            .mount(&server)
            .await;

        let client = Client::new();
        let urls = vec![server.uri()];
        assert!(check_ip(&client, "1.1.1.1", &urls).await.is_none());
    }

    #[tokio::test]
    async fn test_check_download_measures_speed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 64 * 1024]))
            .mount(&server)
            .await;

        let client = Client::new();
        let speed = check_download(&client, &server.uri()).await.unwrap();
        assert!(speed > 0.0);
    }

    #[tokio::test]
    async fn test_check_download_rejects_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = Client::new();
        assert!(check_download(&client, &server.uri()).await.is_none());
    }

    #[tokio::test]
    async fn test_check_download_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = Client::new();
        assert!(check_download(&client, &server.uri()).await.is_none());
    }
}
