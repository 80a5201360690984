//! Request-line parsing and URL extraction (tinyproxy
//! `process_request`/`extract_http_url`/`extract_ssl_url`).

use crate::error::ProxyError;

/// Parsed view of the request line. Lives only until headers are emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    /// Normalized to uppercase `HTTP` prefix, e.g. `HTTP/1.1`.
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub connect_method: bool,
    pub major: u32,
    pub minor: u32,
}

/// Splits a request line into exactly its first three whitespace-separated
/// tokens, mirroring tinyproxy's `sscanf(line, "%[^ ] %[^ ] %[^ ]", ...)`:
/// anything after the third token (extra whitespace, trailing garbage) is
/// ignored rather than rejected.
fn split_request_line(line: &str) -> Vec<&str> {
    line.split_ascii_whitespace().take(3).collect()
}

/// Parses the first non-blank client line into a [`Request`].
///
/// Gates that depend on configuration (filter, stathost) are applied by
/// the caller after this returns; this function only knows about request
/// syntax.
pub fn parse_request_line(line: &str) -> Result<Request, ProxyError> {
    let tokens = split_request_line(line);
    if tokens.len() < 2 {
        return Err(ProxyError::Parse("no request found".to_string()));
    }

    let method = tokens[0].to_ascii_uppercase();
    let url = tokens[1];
    let raw_protocol = tokens.get(2).copied().unwrap_or("HTTP/0.9");

    let (host, port, path, connect_method) = if url.len() >= 7 && url[..7].eq_ignore_ascii_case("http://") {
        let (host, port, path) = extract_http_url(url)?;
        (host, port, path, false)
    } else if method == "CONNECT" {
        let (host, port) = extract_authority(url)?;
        (host, port, String::new(), true)
    } else {
        return Err(ProxyError::Parse(format!("unknown URL type: {}", url)));
    };

    let (protocol, major, minor) = normalize_protocol(raw_protocol);

    Ok(Request {
        method,
        protocol,
        host,
        port,
        path,
        connect_method,
        major,
        minor,
    })
}

/// Accepts `http://H:P/Pa`, `http://H/Pa`, `http://H:P`, `http://H`.
fn extract_http_url(url: &str) -> Result<(String, u16, String), ProxyError> {
    let rest = &url[7..]; // past "http://", case already verified
    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], rest[idx..].to_string()),
        None => (rest, "/".to_string()),
    };
    if authority.is_empty() {
        return Err(ProxyError::Parse("empty host in URL".to_string()));
    }
    let (host, port) = match authority.rsplit_once(':') {
        Some((h, p)) if !h.is_empty() => {
            let port: u16 = p
                .parse()
                .map_err(|_| ProxyError::Parse(format!("invalid port in URL: {}", authority)))?;
            (h.to_string(), port)
        }
        _ => (authority.to_string(), 80),
    };
    Ok((host, port, path))
}

/// Accepts CONNECT authority form `H:P`, defaulting port to 443.
fn extract_authority(url: &str) -> Result<(String, u16), ProxyError> {
    match url.rsplit_once(':') {
        Some((host, port_str)) if !host.is_empty() => {
            let port: u16 = port_str
                .parse()
                .map_err(|_| ProxyError::Parse(format!("invalid port in CONNECT authority: {}", url)))?;
            Ok((host.to_string(), port))
        }
        _ => {
            if url.is_empty() {
                Err(ProxyError::Parse("empty CONNECT authority".to_string()))
            } else {
                Ok((url.to_string(), 443))
            }
        }
    }
}

/// Uppercases a leading `http` prefix and scans `HTTP/%u.%u`; on scan
/// failure the version stays `(0, 0)`, but the uppercased
/// string (or the original token, if it didn't start with `http`) is
/// still returned so a malformed version doesn't abort the request.
fn normalize_protocol(raw: &str) -> (String, u32, u32) {
    if raw.len() >= 4 && raw[..4].eq_ignore_ascii_case("http") {
        let mut upper = raw.to_string();
        upper.replace_range(0..4, "HTTP");
        let (major, minor) = scan_version(&upper).unwrap_or((0, 0));
        (upper, major, minor)
    } else {
        (raw.to_string(), 0, 0)
    }
}

fn scan_version(protocol: &str) -> Option<(u32, u32)> {
    let rest = protocol.strip_prefix("HTTP/")?;
    let (major_str, minor_str) = rest.split_once('.')?;
    let major: u32 = major_str.parse().ok()?;
    let minor_digits: String = minor_str.chars().take_while(|c| c.is_ascii_digit()).collect();
    let minor: u32 = minor_digits.parse().ok()?;
    Some((major, minor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_url_with_host_port_path() {
        let req = parse_request_line("GET http://x.test:8080/a?b HTTP/1.0").unwrap();
        assert_eq!(req.host, "x.test");
        assert_eq!(req.port, 8080);
        assert_eq!(req.path, "/a?b");
        assert_eq!(req.protocol, "HTTP/1.0");
        assert_eq!((req.major, req.minor), (1, 0));
        assert!(!req.connect_method);
    }

    #[test]
    fn absolute_url_host_path_defaults_to_port_80() {
        let req = parse_request_line("GET http://example.org/ HTTP/1.1").unwrap();
        assert_eq!(req.host, "example.org");
        assert_eq!(req.port, 80);
        assert_eq!(req.path, "/");
    }

    #[test]
    fn absolute_url_host_port_only_defaults_path() {
        let req = parse_request_line("GET http://example.org:8000 HTTP/1.0").unwrap();
        assert_eq!(req.port, 8000);
        assert_eq!(req.path, "/");
    }

    #[test]
    fn absolute_url_host_only_defaults_both() {
        let req = parse_request_line("GET http://example.org HTTP/1.0").unwrap();
        assert_eq!(req.port, 80);
        assert_eq!(req.path, "/");
    }

    #[test]
    fn connect_authority_form() {
        let req = parse_request_line("CONNECT secure.test:443 HTTP/1.1").unwrap();
        assert_eq!(req.host, "secure.test");
        assert_eq!(req.port, 443);
        assert!(req.connect_method);
    }

    #[test]
    fn connect_without_port_defaults_to_443() {
        let req = parse_request_line("CONNECT secure.test HTTP/1.1").unwrap();
        assert_eq!(req.port, 443);
    }

    #[test]
    fn relative_target_without_connect_is_rejected() {
        let err = parse_request_line("GET / HTTP/1.0").unwrap_err();
        assert!(matches!(err, ProxyError::Parse(_)));
    }

    #[test]
    fn too_few_tokens_is_rejected() {
        let err = parse_request_line("GET").unwrap_err();
        assert!(matches!(err, ProxyError::Parse(_)));
    }

    #[test]
    fn scheme_case_is_normalized() {
        let req = parse_request_line("GET HTTP://example.org/ HTTP/1.0").unwrap();
        assert_eq!(req.host, "example.org");
    }
}
