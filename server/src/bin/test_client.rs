//! Terminal client for poking at a running server by hand.
//!
//! Type raw protocol lines (`CHAT:hi`, `START`, `CLEAR`, `DRAW:PRESS:1:2:0,0,0`);
//! anything else is sent as chat. Server lines are printed as they arrive.

use clap::Parser;
use shared::ClientMessage;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:12345")]
    server: String,
    /// Display name
    #[arg(short, long, default_value = "tester")]
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let stream = TcpStream::connect(&args.server).await?;
    println!("Connected to {} as {}", args.server, args.name);

    let (reader, mut writer) = stream.into_split();
    writer.write_all(format!("{}\n", args.name).as_bytes()).await?;

    let printer = tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            println!("< {}", line);
        }
        println!("Server closed the connection");
    });

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    while let Some(input) = stdin.next_line().await? {
        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        let message = match ClientMessage::decode(input) {
            Ok(message) => message,
            Err(_) => ClientMessage::Chat {
                text: input.to_string(),
            },
        };

        if writer
            .write_all(format!("{}\n", message.encode()).as_bytes())
            .await
            .is_err()
        {
            break;
        }
        if printer.is_finished() {
            break;
        }
    }

    printer.abort();
    Ok(())
}
