/// Endpoint string normalization
///
/// Endpoints arrive from two places: configuration files and the
/// cluster's advertised coordinator list. Both use scheme-prefixed
/// notations that normalize to the same (address, port) description.
use thiserror::Error;

use crate::host::HostDescription;

/// Schemes accepted in endpoint notation
const SCHEMES: &[&str] = &["tcp://", "ssl://", "http://", "https://"];

#[derive(Debug, Error)]
pub enum EndpointParseError {
    #[error("endpoint is empty")]
    Empty,

    #[error("unsupported endpoint scheme in {0:?}")]
    UnsupportedScheme(String),

    #[error("endpoint {0:?} is missing a port")]
    MissingPort(String),

    #[error("endpoint {0:?} has an invalid port")]
    InvalidPort(String),
}

/// Parse an endpoint string into a host description
///
/// Accepts `tcp://host:port`, `ssl://host:port`, `http(s)://host:port`,
/// bare `host:port`, and bracketed IPv6 forms like `tcp://[::1]:8529`.
/// A trailing slash is tolerated.
pub fn parse_endpoint(endpoint: &str) -> Result<HostDescription, EndpointParseError> {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        return Err(EndpointParseError::Empty);
    }

    let rest = match trimmed.find("://") {
        Some(_) => SCHEMES
            .iter()
            .find_map(|scheme| trimmed.strip_prefix(scheme))
            .ok_or_else(|| EndpointParseError::UnsupportedScheme(endpoint.to_string()))?,
        None => trimmed,
    };
    let rest = rest.trim_end_matches('/');

    // Bracketed IPv6: [addr]:port
    if let Some(after_bracket) = rest.strip_prefix('[') {
        let (address, tail) = after_bracket
            .split_once(']')
            .ok_or_else(|| EndpointParseError::MissingPort(endpoint.to_string()))?;
        let port = tail
            .strip_prefix(':')
            .ok_or_else(|| EndpointParseError::MissingPort(endpoint.to_string()))?;
        return build(address, port, endpoint);
    }

    let (address, port) = rest
        .rsplit_once(':')
        .ok_or_else(|| EndpointParseError::MissingPort(endpoint.to_string()))?;
    if address.is_empty() || address.contains(':') {
        // More than one colon without brackets: ambiguous IPv6 notation
        return Err(EndpointParseError::MissingPort(endpoint.to_string()));
    }
    build(address, port, endpoint)
}

fn build(address: &str, port: &str, endpoint: &str) -> Result<HostDescription, EndpointParseError> {
    let port: u16 = port
        .parse()
        .map_err(|_| EndpointParseError::InvalidPort(endpoint.to_string()))?;
    Ok(HostDescription::new(address, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scheme_prefixed_endpoints() {
        assert_eq!(
            parse_endpoint("tcp://db1.internal:8529").unwrap(),
            HostDescription::new("db1.internal", 8529)
        );
        assert_eq!(
            parse_endpoint("ssl://db1.internal:8530").unwrap(),
            HostDescription::new("db1.internal", 8530)
        );
        assert_eq!(
            parse_endpoint("https://127.0.0.1:443").unwrap(),
            HostDescription::new("127.0.0.1", 443)
        );
    }

    #[test]
    fn test_parse_bare_host_port() {
        assert_eq!(
            parse_endpoint("127.0.0.1:8529").unwrap(),
            HostDescription::new("127.0.0.1", 8529)
        );
    }

    #[test]
    fn test_parse_tolerates_trailing_slash_and_whitespace() {
        assert_eq!(
            parse_endpoint(" tcp://db1.internal:8529/ ").unwrap(),
            HostDescription::new("db1.internal", 8529)
        );
    }

    #[test]
    fn test_parse_bracketed_ipv6() {
        assert_eq!(
            parse_endpoint("tcp://[::1]:8529").unwrap(),
            HostDescription::new("::1", 8529)
        );
        assert_eq!(
            parse_endpoint("[2001:db8::2]:8529").unwrap(),
            HostDescription::new("2001:db8::2", 8529)
        );
    }

    #[test]
    fn test_parse_rejects_bad_endpoints() {
        assert!(matches!(parse_endpoint(""), Err(EndpointParseError::Empty)));
        assert!(matches!(
            parse_endpoint("unix:///tmp/sock"),
            Err(EndpointParseError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            parse_endpoint("tcp://no-port"),
            Err(EndpointParseError::MissingPort(_))
        ));
        assert!(matches!(
            parse_endpoint("tcp://host:not-a-port"),
            Err(EndpointParseError::InvalidPort(_))
        ));
        assert!(matches!(
            parse_endpoint("::1:8529"),
            Err(EndpointParseError::MissingPort(_))
        ));
    }
}
