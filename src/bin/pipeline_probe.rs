//! Pipelining probe: sends one slow request followed by several fast ones on a
//! single connection and prints the order the responses come back in.
//!
//! Usage: pipeline_probe [ADDR] [FAST_COUNT]
//! ADDR defaults to RPC_HOST:RPC_PORT.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use rpcframe::handler::SleepResponse;
use rpcframe::{Config, RpcClient};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const SLOW_SECS: f64 = 1.0;
const FAST_SECS: f64 = 0.05;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let mut args = std::env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| Config::global().server.addr());
    let fast_count: u32 = args.next().and_then(|s| s.parse().ok()).unwrap_or(5);

    let client = match RpcClient::connect(&addr).await {
        Ok(client) => Arc::new(client),
        Err(err) => {
            error!(address = %addr, error = %err, "Failed to connect");
            std::process::exit(1);
        }
    };
    info!(address = %addr, fast_count, "Connected, pipelining requests");

    let start = Instant::now();
    let calls = std::iter::once(SLOW_SECS)
        .chain(std::iter::repeat(FAST_SECS).take(fast_count as usize))
        .map(|secs| {
            let client = Arc::clone(&client);
            async move {
                let body = serde_json::json!({ "sleep": secs }).to_string();
                let result = client.call(body).await;
                (start.elapsed(), result)
            }
        });

    let mut finished = join_all(calls).await;
    finished.sort_by_key(|(elapsed, _)| *elapsed);

    for (elapsed, result) in finished {
        match result.map(|body| serde_json::from_slice::<SleepResponse>(&body)) {
            Ok(Ok(resp)) => info!(
                request_id = resp.request_id,
                slept = resp.slept,
                elapsed_ms = elapsed.as_millis() as u64,
                "Response"
            ),
            Ok(Err(err)) => error!(error = %err, "Malformed response body"),
            Err(err) => error!(error = %err, "Request failed"),
        }
    }

    info!(total = ?start.elapsed(), expected_at_least = ?Duration::from_secs_f64(SLOW_SECS), "Done");

    if let Err(err) = client.finish().await {
        error!(error = %err, "Failed to close connection");
    }
}
