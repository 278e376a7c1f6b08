use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::network::Server;
use std::net::SocketAddr;
use std::time::Duration;

/// Reaction-timing duel server: pairs clients over TCP and races their
/// reflexes against each other.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Address to listen on
    #[clap(default_value = "127.0.0.1:31337")]
    address: SocketAddr,
    /// Game timeout in seconds; games wait forever when omitted
    #[clap(long)]
    timeout: Option<f64>,
    /// Send the optional hint/farewell lines not required by the protocol
    #[clap(long)]
    custom_messages: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let game_timeout = args.timeout.map(Duration::from_secs_f64);
    let config = ServerConfig::new(args.address, game_timeout, args.custom_messages);

    let server = Server::bind(config).await?;
    let registry = server.registry();

    // Serve until interrupted, then close whatever games are in flight.
    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            registry.shutdown_all().await;
        }
    }

    Ok(())
}
