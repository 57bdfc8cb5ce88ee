//! Example: Echo Server
//!
//! Listens on the address given as the first argument (default
//! `127.0.0.1:7000`) and writes every byte it receives back to the sender.
//!
//! Run with: `cargo run --example echo_server -- 127.0.0.1:7000`
//! Try it with: `nc 127.0.0.1 7000`

use stnet::config::NetworkConfig;
use stnet::protocol::echo::EchoService;
use stnet::service::Server;
use stnet::transport::NetContext;
use stnet::utils::logging::init_logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:7000".to_string());

    let config = NetworkConfig::from_env()?;
    init_logging(&config.logging)?;

    let server = Server::with_context("echo_server", NetContext::new(config));
    let service = server.add_service("echo", &addr, EchoService, 0).await?;
    server.start()?;
    println!("Echoing on {} (Ctrl+C to stop)", service.local_addr());

    tokio::signal::ctrl_c().await?;
    server.stop().await;

    let stats = server.context().metrics().snapshot();
    println!(
        "Served {} sessions, {} bytes in, {} bytes out",
        stats.sessions_total, stats.bytes_received, stats.bytes_sent
    );
    Ok(())
}
