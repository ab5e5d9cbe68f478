//! TCP Server
//!
//! Accepts connections and spawns one [`handle_connection`] task per client.
//! The [`Extension`] is passed in explicitly and shared through an `Arc`;
//! there is no process-wide registry.

use crate::commands::Extension;
use crate::connection::{handle_connection, ConnectionStats};
use crate::protocol::reader::DEFAULT_MAX_BUFFER_SIZE;
use crate::shutdown::Shutdown;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Cap on buffered bytes for one incomplete request
    pub max_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: crate::DEFAULT_HOST.to_string(),
            port: crate::DEFAULT_PORT,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
        }
    }
}

impl ServerConfig {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Accepts connections until `shutdown` fires.
///
/// Connection tasks receive their own copy of `shutdown` and stop reading
/// once it fires.
pub async fn run(
    listener: TcpListener,
    extension: Arc<Extension>,
    stats: Arc<ConnectionStats>,
    config: &ServerConfig,
    mut shutdown: Shutdown,
) {
    info!(
        extension = %extension.name(),
        commands = extension.len(),
        "Accepting connections"
    );

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    tokio::spawn(handle_connection(
                        stream,
                        addr,
                        Arc::clone(&extension),
                        Arc::clone(&stats),
                        shutdown.clone(),
                        config.max_buffer_size,
                    ));
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            },
            _ = shutdown.recv() => {
                info!("Shutdown signal received, no longer accepting connections");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use crate::protocol::{RespReader, RespValue};
    use crate::shutdown;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address(), "127.0.0.1:6380");
    }

    #[tokio::test]
    async fn test_run_serves_many_clients_and_stops() {
        let extension = Extension::new("test");
        extension
            .register(Command::new("PING").arity(1, 1).handler(|ctx| Ok(ctx.reply("PONG")?)))
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stats = Arc::new(ConnectionStats::new());
        let (trigger, receiver) = shutdown::channel();

        let server = tokio::spawn({
            let stats = Arc::clone(&stats);
            async move {
                run(
                    listener,
                    Arc::new(extension),
                    stats,
                    &ServerConfig::default(),
                    receiver,
                )
                .await
            }
        });

        let clients: Vec<_> = (0..8)
            .map(|_| {
                tokio::spawn(async move {
                    let stream = TcpStream::connect(addr).await.unwrap();
                    let (read_half, mut write_half) = stream.into_split();
                    let mut reader = RespReader::new(read_half);
                    for _ in 0..10 {
                        write_half.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
                        assert_eq!(
                            reader.read_value().await.unwrap(),
                            RespValue::bulk_string("PONG")
                        );
                    }
                })
            })
            .collect();

        for client in clients {
            client.await.unwrap();
        }

        assert_eq!(
            stats
                .commands_processed
                .load(std::sync::atomic::Ordering::Relaxed),
            80
        );

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .unwrap()
            .unwrap();
    }
}
