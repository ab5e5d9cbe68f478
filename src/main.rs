//! respext server
//!
//! Registers the bundled extensions and serves them over TCP until Ctrl+C.

use respext::commands::Extension;
use respext::connection::ConnectionStats;
use respext::extensions::{hello, ratelimit};
use respext::server::{self, ServerConfig};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Parse configuration from command-line arguments
fn config_from_args() -> ServerConfig {
    let mut config = ServerConfig::default();
    let args: Vec<String> = std::env::args().collect();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--host" | "-h" => {
                if i + 1 < args.len() {
                    config.host = args[i + 1].clone();
                    i += 2;
                } else {
                    eprintln!("Error: --host requires a value");
                    std::process::exit(1);
                }
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    config.port = args[i + 1].parse().unwrap_or_else(|_| {
                        eprintln!("Error: invalid port number");
                        std::process::exit(1);
                    });
                    i += 2;
                } else {
                    eprintln!("Error: --port requires a value");
                    std::process::exit(1);
                }
            }
            "--help" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-v" => {
                println!("respext version {}", respext::VERSION);
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
    }

    config
}

fn print_help() {
    println!(
        r#"
respext - Redis-compatible command extension server

USAGE:
    respext [OPTIONS]

OPTIONS:
    -h, --host <HOST>    Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>    Port to listen on (default: 6380)
    -v, --version        Print version information
        --help           Print this help message

LOGGING:
    Set RUST_LOG to change verbosity, e.g. RUST_LOG=respext=debug

CONNECTING:
    $ redis-cli -p 6380
    127.0.0.1:6380> HELLO.WORLD Ferris
    "Hello, Ferris!"
    127.0.0.1:6380> RATELIMIT.ALLOW api 10 60
    "1"
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config_from_args();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let extension = Extension::new("respext");
    hello::register(&extension)?;
    ratelimit::register(&extension)?;
    info!(commands = ?extension.command_names(), "Extensions registered");

    let stats = Arc::new(ConnectionStats::new());

    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("respext v{} listening on {}", respext::VERSION, config.bind_address());

    let (trigger, shutdown) = respext::shutdown::channel();
    let server_task = tokio::spawn({
        let extension = Arc::new(extension);
        let stats = Arc::clone(&stats);
        let config = config.clone();
        async move { server::run(listener, extension, stats, &config, shutdown).await }
    });

    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, stopping server..."),
        Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
    }
    trigger.trigger();
    server_task.await?;

    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        "Server shutdown complete"
    );
    Ok(())
}
