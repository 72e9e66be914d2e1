//! Egress guard for payer requests.
//!
//! A payer following 402 challenges is an attractive SSRF vector: a hostile
//! challenge or URL could point it at link-local metadata services or
//! internal hosts. Every outbound request URL passes through
//! [`check_url`] before any socket is opened. Literal addresses are
//! classified directly; other hostnames are resolved and every resolved
//! address must be public.

use std::net::IpAddr;
use url::{Host, Url};

use crate::errors::ClientError;

/// Validates a request target before any network I/O.
///
/// Rejects non-http(s) schemes always. With `allow_local = false` also
/// rejects loopback, RFC 1918, link-local, unique-local, and `localhost`
/// targets.
pub async fn check_url(url: &Url, allow_local: bool) -> Result<(), ClientError> {
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ClientError::EgressBlocked {
                url: url.to_string(),
                reason: format!("scheme {other:?} is not allowed"),
            });
        }
    }

    if allow_local {
        return Ok(());
    }

    let host = url.host().ok_or_else(|| ClientError::EgressBlocked {
        url: url.to_string(),
        reason: "URL has no host".to_string(),
    })?;

    match host {
        Host::Ipv4(addr) => reject_local(url, IpAddr::V4(addr))?,
        Host::Ipv6(addr) => reject_local(url, IpAddr::V6(addr))?,
        Host::Domain(domain) => {
            let lowered = domain.to_ascii_lowercase();
            if lowered == "localhost" || lowered.ends_with(".localhost") {
                return Err(ClientError::EgressBlocked {
                    url: url.to_string(),
                    reason: "localhost is not allowed".to_string(),
                });
            }
            let port = url.port_or_known_default().unwrap_or(443);
            let resolved = tokio::net::lookup_host((lowered.as_str(), port))
                .await
                .map_err(|e| ClientError::EgressBlocked {
                    url: url.to_string(),
                    reason: format!("failed to resolve host: {e}"),
                })?;
            for addr in resolved {
                reject_local(url, addr.ip())?;
            }
        }
    }

    Ok(())
}

fn reject_local(url: &Url, ip: IpAddr) -> Result<(), ClientError> {
    if is_local_address(ip) {
        return Err(ClientError::EgressBlocked {
            url: url.to_string(),
            reason: format!("{ip} is a loopback, private, or link-local address"),
        });
    }
    Ok(())
}

fn is_local_address(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_local_address(IpAddr::V4(mapped));
            }
            let segments = v6.segments();
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local
                || (segments[0] & 0xfe00) == 0xfc00
                // fe80::/10 link local
                || (segments[0] & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn blocked(url: &str) -> bool {
        let url = Url::parse(url).unwrap();
        matches!(
            check_url(&url, false).await,
            Err(ClientError::EgressBlocked { .. })
        )
    }

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        assert!(blocked("ftp://example.com/file").await);
        assert!(blocked("file:///etc/passwd").await);
    }

    #[tokio::test]
    async fn rejects_loopback_and_private_ranges() {
        assert!(blocked("http://127.0.0.1:8080/x").await);
        assert!(blocked("http://127.1.2.3/").await);
        assert!(blocked("http://10.0.0.7/").await);
        assert!(blocked("http://192.168.1.1/").await);
        assert!(blocked("http://172.16.0.1/").await);
        assert!(blocked("http://172.31.255.255/").await);
        assert!(blocked("http://169.254.169.254/latest/meta-data").await);
        assert!(blocked("http://[::1]/").await);
        assert!(blocked("http://[fe80::1]/").await);
        assert!(blocked("http://[fc00::1]/").await);
        assert!(blocked("http://localhost:3000/").await);
        assert!(blocked("http://api.localhost/").await);
    }

    #[tokio::test]
    async fn public_literals_pass() {
        let url = Url::parse("https://1.1.1.1/resource").unwrap();
        assert!(check_url(&url, false).await.is_ok());
        // 172.32.0.0 is just past the 172.16.0.0/12 block
        let url = Url::parse("http://172.32.0.1/").unwrap();
        assert!(check_url(&url, false).await.is_ok());
    }

    #[tokio::test]
    async fn allow_local_opts_in() {
        let url = Url::parse("http://127.0.0.1:8080/x").unwrap();
        assert!(check_url(&url, true).await.is_ok());
        // Scheme check still applies
        let url = Url::parse("gopher://127.0.0.1/").unwrap();
        assert!(matches!(
            check_url(&url, true).await,
            Err(ClientError::EgressBlocked { .. })
        ));
    }
}
