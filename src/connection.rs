//! Per-connection state machine: accept, gate, parse, connect, forward,
//! relay, close. Grounded on tinyproxy's `connmethod.c`/`reqs.c`
//! (`handle_connection`/`process_client_headers`/`pull_client_data`),
//! reorganized as a single `drive` function that sequences the smaller,
//! independently-tested pieces in `request`, `pipeline`, `connector`,
//! and `relay`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::acl::Acl;
use crate::anonymity::Anonymity;
use crate::common::config::Config;
use crate::error::ProxyError;
use crate::filter::Filter;
use crate::httperr;
use crate::lines::LineReader;
use crate::pipeline::{self, EmitContext};
use crate::relay::{self, RelayOutcome};
use crate::request;
use crate::stats::{Stats, StatKind};

/// Everything a connection needs that outlives it, shared read-mostly
/// across every concurrently served connection via `Arc`.
pub struct Shared {
    pub config: Arc<Config>,
    pub stats: Arc<Stats>,
    pub acl: Arc<Acl>,
    pub filter: Arc<Filter>,
    pub anonymity: Arc<Anonymity>,
    pub hostname: Arc<str>,
}

/// How a connection ended, for logging at the call site.
pub enum Outcome {
    Relayed(RelayOutcome),
    ErrorResponseSent,
    StatsPageServed,
    SilentClose,
}

/// Drives one accepted client connection to completion. Never returns
/// an `Err`: every failure path is translated into an `Outcome` plus the
/// corresponding stats bump, so the caller only needs to log.
pub async fn drive(stream: TcpStream, peer: SocketAddr, shared: &Shared) -> Outcome {
    shared.stats.update(StatKind::Open);
    let outcome = run(stream, peer, shared).await;
    shared.stats.update(StatKind::Close);
    outcome
}

async fn run(stream: TcpStream, peer: SocketAddr, shared: &Shared) -> Outcome {
    let config = &shared.config;

    if !shared.acl.check(peer.ip()) {
        shared.stats.update(StatKind::Denied);
        deny(stream, ProxyError::AclDenied).await;
        return Outcome::ErrorResponseSent;
    }

    // Opaque-tunnel redirect: skip HTTP parsing entirely and relay
    // straight to the configured target.
    if let Some(tunnel) = &config.tunnel {
        let dial = crate::connector::open_socket(
            &tunnel.name,
            tunnel.port,
            Duration::from_secs(config.connect_timeout),
        )
        .await;
        return match dial {
            Ok(server) => Outcome::Relayed(
                relay::relay(
                    stream,
                    server,
                    config.buffer_size,
                    Duration::from_secs(config.idletimeout),
                )
                .await,
            ),
            Err(source) => {
                let err = ProxyError::UpstreamFailure {
                    host: tunnel.name.clone(),
                    port: tunnel.port,
                    source,
                };
                shared.stats.update(err.stat_kind());
                deny(stream, err).await;
                Outcome::ErrorResponseSent
            }
        };
    }

    let max_len = config.max_line_length();
    let mut client = LineReader::new(stream);

    let line = match client.read_nonblank_line(max_len).await {
        Ok(line) => line,
        Err(ProxyError::PeerClose) => return Outcome::SilentClose,
        Err(err) => {
            shared.stats.update(err.stat_kind());
            return respond_and_close(client, err).await;
        }
    };

    let line = match String::from_utf8(line) {
        Ok(line) => line,
        Err(_) => {
            let err = ProxyError::Parse("request line is not valid UTF-8".to_string());
            shared.stats.update(err.stat_kind());
            return respond_and_close(client, err).await;
        }
    };

    let request = match request::parse_request_line(line.trim_end_matches(['\r', '\n'])) {
        Ok(request) => request,
        Err(err) => {
            shared.stats.update(err.stat_kind());
            return respond_and_close(client, err).await;
        }
    };

    if shared.filter.is_denied(&request.host) {
        let err = ProxyError::FilterDenied(request.host.clone());
        shared.stats.update(err.stat_kind());
        return respond_and_close(client, err).await;
    }

    if config.stathost.as_deref() == Some(request.host.as_str()) {
        let page = shared.stats.render_page(config);
        let response = format!(
            "HTTP/1.0 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            page.len(),
            page
        );
        let _ = client.write_all(response.as_bytes()).await;
        return Outcome::StatsPageServed;
    }

    let (dial_host, dial_port) = match &config.upstream {
        Some(up) => (up.name.as_str(), up.port),
        None => (request.host.as_str(), request.port),
    };
    let dial = crate::connector::open_socket(
        dial_host,
        dial_port,
        Duration::from_secs(config.connect_timeout),
    )
    .await;
    let server_stream = match dial {
        Ok(stream) => stream,
        Err(source) => {
            let err = if config.upstream.is_some() {
                ProxyError::UpstreamFailure {
                    host: dial_host.to_string(),
                    port: dial_port,
                    source,
                }
            } else {
                ProxyError::ConnectFailure {
                    host: dial_host.to_string(),
                    port: dial_port,
                    source,
                }
            };
            shared.stats.update(err.stat_kind());
            return respond_and_close(client, err).await;
        }
    };
    let mut server = LineReader::new(server_stream);

    // Whether this request is forwarded to the next hop as HTTP at all:
    // a direct (no upstream) CONNECT is an opaque tunnel and bypasses
    // request-line emission, header rewriting, and the body pump.
    let forward_as_http = !request.connect_method || config.upstream.is_some();

    if forward_as_http {
        let request_line = pipeline::build_request_line(&request, config.upstream.is_some());
        if server.write_all(&request_line).await.is_err() {
            shared.stats.update(StatKind::BadConn);
            return Outcome::SilentClose;
        }
    }

    let headers = match pipeline::collect_headers(&mut client, max_len).await {
        Ok(headers) => headers,
        Err(ProxyError::PeerClose) => return Outcome::SilentClose,
        Err(err) => {
            shared.stats.update(err.stat_kind());
            return Outcome::SilentClose;
        }
    };

    let mut content_length = None;
    if forward_as_http {
        let ctx = EmitContext {
            major: request.major,
            minor: request.minor,
            hostname: &shared.hostname,
            anonymity: &shared.anonymity,
            my_domain: config.my_domain.as_deref(),
            client_ip: Some(peer.ip()),
        };
        let emitted = pipeline::build_forward_headers(headers, &ctx);
        if server.write_all(&emitted.bytes).await.is_err() {
            shared.stats.update(StatKind::BadConn);
            return Outcome::SilentClose;
        }
        content_length = emitted.content_length;
    }

    if let Some(len) = content_length {
        if pump_body(&mut client, &mut server, len).await.is_err() {
            shared.stats.update(StatKind::BadConn);
            return Outcome::SilentClose;
        }
    }

    let ready = if forward_as_http {
        copy_response_headers(&mut server, &mut client, max_len).await
    } else {
        let greeting = format!(
            "HTTP/1.0 200 Connection established\r\nProxy-agent: {}/{}\r\n\r\n",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        );
        client.write_all(greeting.as_bytes()).await
    };
    if ready.is_err() {
        shared.stats.update(StatKind::BadConn);
        return Outcome::SilentClose;
    }

    // Either side's read-ahead buffer may already hold bytes read past
    // the line/header boundary (e.g. a response's first body bytes
    // arriving in the same segment as its headers, or pipelined CONNECT
    // tunnel data). Flush each into its destination before the raw
    // relay takes over, or those bytes would be silently dropped.
    let (mut client_stream, client_carry) = client.into_parts();
    let (mut server_stream, server_carry) = server.into_parts();
    if !client_carry.is_empty() && server_stream.write_all(&client_carry).await.is_err() {
        shared.stats.update(StatKind::BadConn);
        return Outcome::SilentClose;
    }
    if !server_carry.is_empty() && client_stream.write_all(&server_carry).await.is_err() {
        shared.stats.update(StatKind::BadConn);
        return Outcome::SilentClose;
    }

    Outcome::Relayed(
        relay::relay(
            client_stream,
            server_stream,
            config.buffer_size,
            Duration::from_secs(config.idletimeout),
        )
        .await,
    )
}

/// Copies the server's response headers to the client verbatim, line by
/// line, up to and including the terminating blank line. No rewriting:
/// only the client-facing request side is subject to the header policy.
async fn copy_response_headers(
    server: &mut LineReader<TcpStream>,
    client: &mut LineReader<TcpStream>,
    max_len: usize,
) -> Result<(), ProxyError> {
    loop {
        let line = server.read_line(max_len).await?;
        client.write_all(&line).await?;
        if pipeline::is_header_terminator(&line) {
            return Ok(());
        }
    }
}

/// Streams exactly `len` request-body bytes from client to server,
/// mirroring tinyproxy's `pull_client_data`.
async fn pump_body(
    client: &mut LineReader<TcpStream>,
    server: &mut LineReader<TcpStream>,
    len: u64,
) -> Result<(), ProxyError> {
    const CHUNK: u64 = 65536;
    let mut remaining = len;
    while remaining > 0 {
        let take = remaining.min(CHUNK) as usize;
        let chunk = client.read_exact_bytes(take).await?;
        server.write_all(&chunk).await?;
        remaining -= take as u64;
    }
    Ok(())
}

/// Sends the response body for an error, when one is defined, and drops
/// the connection either way.
async fn deny(stream: TcpStream, err: ProxyError) {
    let _ = respond_and_close(LineReader::new(stream), err).await;
}

async fn respond_and_close<S>(mut client: LineReader<S>, err: ProxyError) -> Outcome
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    if let Some((code, message)) = err.http_response() {
        let _ = client.write_all(&httperr::render(code, message)).await;
        Outcome::ErrorResponseSent
    } else {
        Outcome::SilentClose
    }
}
