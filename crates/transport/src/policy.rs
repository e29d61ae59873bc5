//! Endpoint security policy for remote tool providers.
//!
//! `https` is always accepted. Plain `http` is accepted only in developer
//! mode, and only for loopback hosts (`localhost`, `127.0.0.0/8`, `::1`).

use std::net::IpAddr;

use toolrelay_core::error::TransportError;
use url::{Host, Url};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointPolicy {
    pub developer_mode: bool,
}

impl EndpointPolicy {
    pub fn strict() -> Self {
        Self { developer_mode: false }
    }

    pub fn developer() -> Self {
        Self { developer_mode: true }
    }

    /// Parse and check a tool endpoint.
    pub fn check(&self, endpoint: &str) -> Result<Url, TransportError> {
        let url = Url::parse(endpoint.trim())
            .map_err(|e| TransportError::InsecureEndpoint(format!("invalid URL '{endpoint}': {e}")))?;

        match url.scheme() {
            "https" => Ok(url),
            "http" if self.developer_mode && is_loopback(&url) => Ok(url),
            "http" if self.developer_mode => Err(TransportError::InsecureEndpoint(format!(
                "plain http is only allowed for loopback hosts in developer mode: {endpoint}"
            ))),
            "http" => Err(TransportError::InsecureEndpoint(format!(
                "tool endpoints must use https: {endpoint}"
            ))),
            other => Err(TransportError::InsecureEndpoint(format!(
                "unsupported scheme '{other}': {endpoint}"
            ))),
        }
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
        Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_always_allowed() {
        assert!(EndpointPolicy::strict().check("https://tools.example.com/mcp").is_ok());
    }

    #[test]
    fn http_rejected_outside_developer_mode() {
        let err = EndpointPolicy::strict().check("http://127.0.0.1:8080/mcp").unwrap_err();
        assert!(matches!(err, TransportError::InsecureEndpoint(_)));
    }

    #[test]
    fn developer_mode_allows_loopback_only() {
        let policy = EndpointPolicy::developer();
        assert!(policy.check("http://localhost:3000/rpc").is_ok());
        assert!(policy.check("http://127.0.0.5/rpc").is_ok());
        assert!(policy.check("http://[::1]:9000/rpc").is_ok());
        assert!(policy.check("http://tools.internal.example.com/rpc").is_err());
        assert!(policy.check("http://10.0.0.4/rpc").is_err());
    }

    #[test]
    fn other_schemes_and_garbage_rejected() {
        let policy = EndpointPolicy::developer();
        assert!(policy.check("ftp://localhost/x").is_err());
        assert!(policy.check("not a url").is_err());
    }
}
