use clap::Parser;
use client::network::Client;
use log::{debug, info};
use shared::{DEFAULT_LOG_DIR, DEFAULT_PORT};
use std::io::BufRead;
use std::path::PathBuf;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value_t = format!("127.0.0.1:{}", DEFAULT_PORT))]
    server: String,

    /// Directory the conversation transcript is saved to
    #[arg(short, long, default_value = DEFAULT_LOG_DIR)]
    log_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let client = match Client::connect(&args.server, args.log_dir).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    client.run(spawn_stdin_reader(), tokio::io::stdout()).await?;

    Ok(())
}

/// Forwards stdin lines from a dedicated thread
///
/// Blocking reads live on their own OS thread so a pending read never keeps
/// the runtime from shutting down once the chat is over.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(64);

    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
        debug!("Input closed");
    });

    rx
}
