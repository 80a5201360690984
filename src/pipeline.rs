//! Header collection and the header rewriting policy.
//!
//! Grounded on tinyproxy's `get_all_headers`/`add_header_to_connection`
//! (collection) and `process_client_headers` (rewriting + emission),
//! reworked into pure, independently testable functions that
//! `Connection::drive` sequences.

use std::net::IpAddr;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::anonymity::Anonymity;
use crate::error::ProxyError;
use crate::headers::HeaderMap;
use crate::lines::LineReader;
use crate::request::Request;

/// Hop-by-hop headers dropped unconditionally.
const FIXED_HOP_BY_HOP: &[&str] = &[
    "host",
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Separator class used to tokenize the `Connection` header's value
///.
const CONNECTION_TOKEN_SEPARATORS: &[char] =
    &['(', ')', ',', ';', ':', '<', '>', '@', '"', '/', '[', ']', '?', '=', '{', '}', ' ', '\t', '\\'];

/// Reads client headers until a bare CRLF terminator line.
pub async fn collect_headers<S>(reader: &mut LineReader<S>, max_len: usize) -> Result<HeaderMap, ProxyError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut map = HeaderMap::new();
    loop {
        let line = reader.read_line(max_len).await?;
        if is_terminator(&line) {
            break;
        }
        add_header_line(&mut map, &line)?;
    }
    Ok(map)
}

fn is_terminator(line: &[u8]) -> bool {
    matches!(line, b"\n" | b"\r\n")
}

/// Splits one header line at the first `:`, overwriting the separator
/// run (colon, spaces, tabs) that follows so the remaining bytes become
/// the value untouched.
fn add_header_line(map: &mut HeaderMap, line: &[u8]) -> Result<(), ProxyError> {
    let content = strip_terminator(line);
    let colon = content
        .iter()
        .position(|&b| b == b':')
        .ok_or_else(|| ProxyError::Parse("header line has no ':'".to_string()))?;

    let name = std::str::from_utf8(&content[..colon])
        .map_err(|_| ProxyError::Parse("header name is not valid UTF-8".to_string()))?;

    let mut idx = colon;
    while idx < content.len() && matches!(content[idx], b':' | b' ' | b'\t') {
        idx += 1;
    }
    map.insert(name, content[idx..].to_vec());
    Ok(())
}

fn strip_terminator(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r\n")
        .or_else(|| line.strip_suffix(b"\n"))
        .unwrap_or(line)
}

/// True once a line read from a header stream is the bare terminator.
pub fn is_header_terminator(line: &[u8]) -> bool {
    is_terminator(line)
}

/// Builds the request line sent to the next hop, mirroring tinyproxy's
/// `establish_http_connection`: a direct-origin request keeps the
/// client's path as-is, while a request routed through an upstream proxy
/// gets rewritten into an absolute form the upstream can itself route
/// (`http://host:port/path`, or `host:port` for a tunneled `CONNECT`).
pub fn build_request_line(request: &Request, via_upstream: bool) -> Vec<u8> {
    let target = if via_upstream {
        if request.connect_method {
            format!("{}:{}", request.host, request.port)
        } else {
            format!("http://{}:{}{}", request.host, request.port, request.path)
        }
    } else {
        request.path.clone()
    };

    format!(
        "{} {} HTTP/1.0\r\nHost: {}\r\nConnection: close\r\n",
        request.method, target, request.host
    )
    .into_bytes()
}

/// Everything the rewriting policy needs besides the collected headers.
pub struct EmitContext<'a> {
    pub major: u32,
    pub minor: u32,
    pub hostname: &'a str,
    pub anonymity: &'a Anonymity,
    pub my_domain: Option<&'a str>,
    pub client_ip: Option<IpAddr>,
}

/// Result of applying the rewriting policy: the bytes to write to the
/// upstream socket (headers plus the terminating blank line) and the
/// `Content-Length` captured along the way, if any.
pub struct EmitOutcome {
    pub bytes: Vec<u8>,
    pub content_length: Option<u64>,
}

/// Applies the rewriting policy to `headers` and returns the bytes to send.
pub fn build_forward_headers(mut headers: HeaderMap, ctx: &EmitContext) -> EmitOutcome {
    // Step 1: hop-by-hop removal driven by the Connection header's tokens.
    if let Some((value, _)) = headers.get("connection") {
        let text = String::from_utf8_lossy(value).into_owned();
        for token in text.split(CONNECTION_TOKEN_SEPARATORS).filter(|t| !t.is_empty()) {
            headers.remove(token);
        }
        headers.remove("connection");
    }

    // Step 2: capture Content-Length for the later body pump.
    let content_length = headers
        .get("content-length")
        .and_then(|(v, _)| std::str::from_utf8(v).ok())
        .and_then(|s| s.trim().parse::<u64>().ok());

    let mut out = Vec::new();

    // Step 3: Via header, appended to any existing chain.
    let existing_via = headers.get("via").map(|(v, _)| v.to_vec());
    headers.remove("via");
    let via_suffix = format!(
        "{}.{} {} ({}/{})",
        ctx.major,
        ctx.minor,
        ctx.hostname,
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );
    match existing_via {
        Some(old) => {
            out.extend_from_slice(b"Via: ");
            out.extend_from_slice(&old);
            out.extend_from_slice(b", ");
            out.extend_from_slice(via_suffix.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        None => {
            out.extend_from_slice(format!("Via: {}\r\n", via_suffix).as_bytes());
        }
    }

    // Step 4: unconditional removal of the fixed hop-by-hop set.
    for name in FIXED_HOP_BY_HOP {
        headers.remove(name);
    }

    // Step 5: emit remaining headers, honoring anonymity mode.
    let remaining_keys: Vec<String> = headers.keys().map(|k| k.to_string()).collect();
    for key in remaining_keys {
        if ctx.anonymity.is_enabled() && !ctx.anonymity.is_allowed(&key) {
            continue;
        }
        for value in headers.get_all(&key) {
            out.extend_from_slice(key.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value);
            out.extend_from_slice(b"\r\n");
        }
    }

    // Step 6: optional X-Tinyproxy client-IP header.
    if let (Some(_), Some(ip)) = (ctx.my_domain, ctx.client_ip) {
        out.extend_from_slice(format!("X-Tinyproxy: {}\r\n", ip).as_bytes());
    }

    // Step 7: terminating blank line.
    out.extend_from_slice(b"\r\n");

    EmitOutcome {
        bytes: out,
        content_length,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn ctx<'a>(anon: &'a Anonymity) -> EmitContext<'a> {
        EmitContext {
            major: 1,
            minor: 1,
            hostname: "proxyhost",
            anonymity: anon,
            my_domain: None,
            client_ip: None,
        }
    }

    #[tokio::test]
    async fn collect_headers_splits_at_first_colon_and_strips_separators() {
        let mut reader = LineReader::new(Cursor::new(
            b"Host: example.org\r\nX-Custom:\t  value: with colon\r\n\r\n".to_vec(),
        ));
        let headers = collect_headers(&mut reader, 4096).await.unwrap();
        assert_eq!(headers.get("host").unwrap().0, b"example.org");
        assert_eq!(headers.get("x-custom").unwrap().0, b"value: with colon");
    }

    #[tokio::test]
    async fn header_without_colon_is_an_error() {
        let mut reader = LineReader::new(Cursor::new(b"not-a-header-line\r\n\r\n".to_vec()));
        let err = collect_headers(&mut reader, 4096).await.unwrap_err();
        assert!(matches!(err, ProxyError::Parse(_)));
    }

    #[test]
    fn connection_token_removal_drops_named_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("Connection", b"keep-alive, X-Session".to_vec());
        headers.insert("X-Session", b"abc".to_vec());
        headers.insert("Accept", b"*/*".to_vec());

        let anon = Anonymity::new(false, &[]);
        let outcome = build_forward_headers(headers, &ctx(&anon));
        let text = String::from_utf8_lossy(&outcome.bytes);
        assert!(!text.contains("X-Session"));
        assert!(!text.contains("Connection:"));
        assert!(text.contains("Accept: */*"));
    }

    #[test]
    fn via_is_appended_to_existing_chain() {
        let mut headers = HeaderMap::new();
        headers.insert("Via", b"1.0 otherproxy".to_vec());
        let anon = Anonymity::new(false, &[]);
        let outcome = build_forward_headers(headers, &ctx(&anon));
        let text = String::from_utf8_lossy(&outcome.bytes);
        assert!(text.starts_with("Via: 1.0 otherproxy, 1.1 proxyhost ("));
    }

    #[test]
    fn via_is_created_fresh_when_absent() {
        let headers = HeaderMap::new();
        let anon = Anonymity::new(false, &[]);
        let outcome = build_forward_headers(headers, &ctx(&anon));
        let text = String::from_utf8_lossy(&outcome.bytes);
        assert!(text.starts_with("Via: 1.1 proxyhost ("));
    }

    #[test]
    fn fixed_hop_by_hop_headers_never_survive() {
        let mut headers = HeaderMap::new();
        headers.insert("Host", b"example.org".to_vec());
        headers.insert("Transfer-Encoding", b"chunked".to_vec());
        headers.insert("Accept", b"*/*".to_vec());
        let anon = Anonymity::new(false, &[]);
        let outcome = build_forward_headers(headers, &ctx(&anon));
        let text = String::from_utf8_lossy(&outcome.bytes);
        assert!(!text.contains("Host:"));
        assert!(!text.contains("Transfer-Encoding"));
        assert!(text.contains("Accept:"));
    }

    #[test]
    fn anonymity_mode_suppresses_headers_outside_allow_list() {
        let mut headers = HeaderMap::new();
        headers.insert("Accept", b"*/*".to_vec());
        headers.insert("Cookie", b"secret=1".to_vec());
        let anon = Anonymity::new(true, &["accept".to_string()]);
        let outcome = build_forward_headers(headers, &ctx(&anon));
        let text = String::from_utf8_lossy(&outcome.bytes);
        assert!(text.contains("Accept:"));
        assert!(!text.contains("Cookie"));
    }

    #[test]
    fn content_length_is_captured_and_still_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Length", b"42".to_vec());
        let anon = Anonymity::new(false, &[]);
        let outcome = build_forward_headers(headers, &ctx(&anon));
        assert_eq!(outcome.content_length, Some(42));
        assert!(String::from_utf8_lossy(&outcome.bytes).contains("Content-Length: 42"));
    }

    #[test]
    fn x_tinyproxy_header_requires_both_domain_and_ip() {
        let headers = HeaderMap::new();
        let anon = Anonymity::new(false, &[]);
        let mut context = ctx(&anon);
        context.my_domain = Some("example.net");
        context.client_ip = Some("203.0.113.9".parse().unwrap());
        let outcome = build_forward_headers(headers, &context);
        assert!(String::from_utf8_lossy(&outcome.bytes).contains("X-Tinyproxy: 203.0.113.9"));
    }
}
