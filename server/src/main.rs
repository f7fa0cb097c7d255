use clap::Parser;
use log::{error, info, warn};
use server::connection::ConnectionOptions;
use server::network::{Server, ServerConfig};
use shared::{DEFAULT_LOG_DIR, DEFAULT_PORT};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Directory the conversation transcript is saved to on shutdown
    #[arg(short, long, default_value = DEFAULT_LOG_DIR)]
    log_dir: PathBuf,

    /// How long a broadcast may wait on one slow client, in milliseconds
    #[arg(long, default_value = "500")]
    send_timeout_ms: u64,

    /// Lines queued per client before sends start waiting
    #[arg(long, default_value = "256")]
    queue_capacity: usize,

    /// Longest line accepted from a client, in bytes
    #[arg(long, default_value = "65536")]
    max_line_length: usize,
}

/// Main-method of the application.
/// Parses command-line arguments, then runs the chat relay until it is told to stop.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ServerConfig {
        address: format!("{}:{}", args.host, args.port),
        log_dir: args.log_dir,
        connection: ConnectionOptions {
            send_timeout: Duration::from_millis(args.send_timeout_ms),
            queue_capacity: args.queue_capacity,
            max_line_length: args.max_line_length,
        },
    };

    info!("Server starting on {}...", config.address);
    let server = Server::bind(config).await?;
    server.run(shutdown_signal()).await?;

    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on Unix
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down gracefully...");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down gracefully...");
                    }
                }
                return;
            }
            Err(e) => warn!("Failed to install SIGTERM handler: {}", e),
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
        Err(e) => {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
