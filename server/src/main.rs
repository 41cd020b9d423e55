use clap::Parser;
use env_logger::Env;
use log::{error, info};
use server::network::{Server, ServerConfig, ServerEvent};
use server::words::WordBank;
use shared::{DEFAULT_PORT, ROUND_DURATION_SECS};
use std::path::PathBuf;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,
    /// Port to listen on
    #[clap(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Seconds per round
    #[clap(short, long, default_value_t = ROUND_DURATION_SECS)]
    round_secs: u32,
    /// Word list file, one word per line
    #[clap(short, long)]
    words: Option<PathBuf>,
}

/// Parses arguments, binds the listener and runs until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let words = match &args.words {
        Some(path) => WordBank::from_file(path)?,
        None => WordBank::default(),
    };

    let config = ServerConfig {
        addr: format!("{}:{}", args.host, args.port),
        round_duration: args.round_secs,
        words,
    };

    let server = Server::bind(config).await?;
    let events = server.events();
    let mut server_handle = tokio::spawn(server.run());

    tokio::select! {
        result = &mut server_handle => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task panicked: {}", e),
                Ok(Ok(())) => {}
            }
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    let _ = events.send(ServerEvent::Shutdown);
    if let Err(e) = server_handle.await {
        error!("Server task panicked: {}", e);
    }

    Ok(())
}
