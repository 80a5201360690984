//! The accept loop: binds the listener, bounds concurrency with a
//! `Semaphore`, and spawns one task per connection, dispatching each
//! to `connection::drive`, the single state machine this proxy needs.

use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task;

use crate::connection::{self, Shared};
use crate::stats::StatKind;

pub struct Server {
    shared: Arc<Shared>,
    semaphore: Arc<Semaphore>,
}

impl Server {
    pub fn new(shared: Arc<Shared>) -> Self {
        let max_connections = shared.config.max_connections;
        Server {
            shared,
            semaphore: Arc::new(Semaphore::new(max_connections)),
        }
    }

    /// Accepts connections until Ctrl-C / SIGINT is received.
    pub async fn run(&self, listener: TcpListener) {
        info!("listening on {}", listener.local_addr().unwrap());

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.spawn(stream, addr),
                        Err(e) => {
                            error!("accept error: {}", e);
                            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("received shutdown signal");
                    break;
                }
            }
        }

        info!("stopped accepting new connections");
    }

    fn spawn(&self, stream: TcpStream, addr: SocketAddr) {
        let permit = match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("max connections reached, rejecting {}", addr);
                self.shared.stats.update(StatKind::Refused);
                drop(stream);
                return;
            }
        };

        let shared = self.shared.clone();
        task::spawn(async move {
            let _ = stream.set_nodelay(true);
            match connection::drive(stream, addr, &shared).await {
                connection::Outcome::Relayed(outcome) => {
                    info!("connection from {} ended: {:?}", addr, outcome);
                }
                connection::Outcome::ErrorResponseSent => {
                    info!("connection from {} rejected with an error response", addr);
                }
                connection::Outcome::StatsPageServed => {
                    info!("served stats page to {}", addr);
                }
                connection::Outcome::SilentClose => {
                    info!("connection from {} closed without a response", addr);
                }
            }
            drop(permit);
        });
    }
}
