//! Ad-hoc client for poking the server by hand.
//!
//! Prints every server line as it arrives and forwards stdin lines. An
//! empty input line is sent as the signal token, so hitting Enter is
//! enough to "press space".

use shared::SIGNAL_TOKEN;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:31337".to_string());

    let stream = TcpStream::connect(&addr).await?;
    println!("Connected to {}", addr);
    let (read_half, mut write_half) = stream.into_split();

    tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            println!("< {}", line);
        }
        println!("Server closed the connection");
        std::process::exit(0);
    });

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = stdin.next_line().await? {
        let payload = if line.is_empty() {
            SIGNAL_TOKEN
        } else {
            line.as_str()
        };
        write_half.write_all(payload.as_bytes()).await?;
        write_half.write_all(b"\n").await?;
    }

    Ok(())
}
