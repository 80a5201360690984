//! Renders the short HTML error bodies sent to the client, the same
//! shape as tinyproxy's `httperr`/`HTTP400ERROR`/`HTTP500ERROR` family.

/// Builds a complete `HTTP/1.0` error response: status line, a
/// `Content-Length`-framed HTML body, and `Connection: close`.
pub fn render(code: u16, message: &str) -> Vec<u8> {
    let reason = reason_phrase(code);
    let body = format!(
        "<html><head><title>{code} {reason}</title></head>\
         <body><h1>{reason}</h1><p>{message}</p></body></html>\r\n"
    );
    format!(
        "HTTP/1.0 {code} {reason}\r\n\
         Content-Type: text/html\r\n\
         Content-Length: {len}\r\n\
         Connection: close\r\n\r\n\
         {body}",
        len = body.len()
    )
    .into_bytes()
}

fn reason_phrase(code: u16) -> &'static str {
    match code {
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_status_line_and_framed_body() {
        let response = render(404, "Connection to filtered domain is now allowed.");
        let text = String::from_utf8(response).unwrap();
        assert!(text.starts_with("HTTP/1.0 404 Not Found\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.contains("Connection to filtered domain is now allowed."));
    }
}
