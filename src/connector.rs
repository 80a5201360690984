//! Outbound TCP connection establishment (tinyproxy
//! `sock.c`). Name resolution is delegated to `tokio::net::TcpStream`,
//! which resolves `host:port` directly, wrapped in a dial timeout.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

/// Dials `host:port`, bounded by `connect_timeout`. A timed-out dial is
/// surfaced as a `TimedOut` io::Error so callers can map it the same way
/// as a direct connection refusal.
pub async fn open_socket(host: &str, port: u16, connect_timeout: Duration) -> std::io::Result<TcpStream> {
    let addr = format!("{}:{}", host, port);
    match timeout(connect_timeout, TcpStream::connect(&addr)).await {
        Ok(result) => result,
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("connecting to {} timed out after {:?}", addr, connect_timeout),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connects_to_a_live_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await });

        let stream = open_socket("127.0.0.1", addr.port(), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(stream.peer_addr().is_ok());
        accept.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn refused_connection_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = open_socket("127.0.0.1", addr.port(), Duration::from_secs(1)).await;
        assert!(result.is_err());
    }
}
