//! Example: RPC Server and Client in One Process
//!
//! Registers a small `calc` service on an ephemeral port, points an RPC client
//! at it, and makes a few calls in each style.
//!
//! Run with: `cargo run --example rpc_pair`

use std::time::Duration;
use stnet::config::NetworkConfig;
use stnet::protocol::rpc::{status, RpcServer};
use stnet::service::Server;
use stnet::transport::NetContext;
use stnet::utils::logging::init_logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = NetworkConfig::from_env()?;
    init_logging(&config.logging)?;

    let mut calc = RpcServer::new("calc");
    calc.register("add", |(a, b): (i64, i64)| (a + b,))?;
    calc.register("divmod", |(a, b): (u32, u32)| {
        if b == 0 {
            (0, 0)
        } else {
            (a / b, a % b)
        }
    })?;
    calc.register("greet", |(name,): (String,)| (format!("hello, {name}"),))?;

    let server = Server::with_context("rpc_pair", NetContext::new(config));
    // server and client on separate shards so replies never wait on requests
    let service = server.add_rpc_service("127.0.0.1:0", calc, 0).await?;
    let client = server.add_rpc_client("calc_client", "calc", service.local_addr().to_string(), 1)?;
    server.start()?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !client.is_connected() {
        if tokio::time::Instant::now() > deadline {
            return Err("client never connected".into());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let (sum,): (i64,) = client.invoke("add", (40i64, 2i64)).await?;
    println!("add(40, 2) = {sum}");

    let (q, r): (u32, u32) = client.invoke("divmod", (17u32, 5u32)).await?;
    println!("divmod(17, 5) = ({q}, {r})");

    let (greeting,): (String,) = client.invoke("greet", ("stnet".to_string(),)).await?;
    println!("greet = {greeting:?}");

    client.call_with_callback_and_exception(
        "greet",
        ("callback".to_string(),),
        |(text,): (String,)| println!("callback got {text:?}"),
        |code| println!("callback failed: {}", status::describe(code)),
    )?;

    match client.invoke::<(), ()>("missing", ()).await {
        Ok(()) => println!("missing() unexpectedly succeeded"),
        Err(e) => println!("missing() failed as expected: {e}"),
    }

    // one-way: no reply and no pending entry
    client.notify("add", (1i64, 1i64))?;

    tokio::time::sleep(Duration::from_millis(50)).await;
    server.stop().await;

    let stats = server.context().metrics().snapshot();
    println!(
        "{} calls, {} timeouts, {} late responses",
        stats.rpc_calls, stats.rpc_timeouts, stats.rpc_late_responses
    );
    Ok(())
}
