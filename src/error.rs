//! Error taxonomy for the per-connection pipeline
//!
//! Each variant maps to exactly one disposition: an HTTP status to send
//! the client (gated by `response_message_sent`), a stats counter to
//! bump, and whether the failure is worth logging at `warn`/`error` or
//! merely `info`. `Connection::drive` is the only place that inspects
//! this mapping; everything else just propagates with `?`.

use thiserror::Error;

use crate::stats::StatKind;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("malformed request line or URL: {0}")]
    Parse(String),

    #[error("peer not permitted by ACL")]
    AclDenied,

    #[error("host \"{0}\" is blacklisted")]
    FilterDenied(String),

    #[error("cannot reach origin {host}:{port}: {source}")]
    ConnectFailure {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot reach upstream proxy {host}:{port}: {source}")]
    UpstreamFailure {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("idle timeout during relay")]
    ProtocolTimeout,

    #[error("peer closed the connection")]
    PeerClose,

    #[error("header line exceeded the maximum line length")]
    HeaderOverflow,

    #[error("buffer allocation denied")]
    AllocFailure,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// `(status_code, message)` to send the client, or `None` when the
    /// error occurs mid-relay and must stay silent.
    pub fn http_response(&self) -> Option<(u16, &'static str)> {
        match self {
            ProxyError::Parse(_) => Some((400, "Unrecognizable request. Only HTTP is allowed.")),
            ProxyError::AclDenied => {
                Some((403, "You do not have authorization for using this service."))
            }
            ProxyError::FilterDenied(_) => {
                Some((404, "Connection to filtered domain is now allowed."))
            }
            ProxyError::ConnectFailure { .. } => {
                Some((500, "Unable to connect to remote server."))
            }
            ProxyError::UpstreamFailure { .. } => {
                Some((404, "Unable to connect to upstream proxy."))
            }
            ProxyError::ProtocolTimeout
            | ProxyError::PeerClose
            | ProxyError::HeaderOverflow
            | ProxyError::AllocFailure
            | ProxyError::Io(_) => None,
        }
    }

    pub fn stat_kind(&self) -> StatKind {
        match self {
            ProxyError::AclDenied | ProxyError::FilterDenied(_) => StatKind::Denied,
            ProxyError::ProtocolTimeout => StatKind::Close,
            _ => StatKind::BadConn,
        }
    }
}
