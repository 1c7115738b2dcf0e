#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rpcframe::config::ServerConfig;
use rpcframe::handler::RequestHandler;
use rpcframe::server::{ConnectionSession, ServerStats, SessionContext, SessionOutcome, ShutdownReport};
use rpcframe::{encode_frame, Frame, FrameBuffer, Server};
use tokio::io::{AsyncReadExt, DuplexStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub fn frame_bytes(request_id: u32, body: &[u8]) -> Vec<u8> {
    encode_frame(request_id, body).unwrap().to_vec()
}

pub fn sleep_body(secs: f64) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({ "sleep": secs })).unwrap()
}

pub fn decode_all(bytes: &[u8]) -> Vec<Frame> {
    let mut buffer = FrameBuffer::new();
    let frames = buffer.feed(bytes).unwrap();
    assert!(buffer.is_empty(), "trailing partial frame in server output");
    frames
}

pub fn ids(frames: &[Frame]) -> Vec<u32> {
    frames.iter().map(|f| f.request_id).collect()
}

pub async fn read_to_end<R: tokio::io::AsyncRead + Unpin>(reader: &mut R) -> Vec<u8> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes).await.unwrap();
    bytes
}

// --- IN-MEMORY SESSIONS ---

pub struct TestSession {
    pub client: DuplexStream,
    pub stats: Arc<ServerStats>,
    pub task: JoinHandle<SessionOutcome>,
}

/// Runs one session over an in-memory pipe; the test drives `client`.
pub fn spawn_session<H: RequestHandler>(handler: H) -> TestSession {
    spawn_session_with(handler, SessionContext::default())
}

pub fn spawn_session_with<H: RequestHandler>(handler: H, ctx: SessionContext) -> TestSession {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (reader, writer) = tokio::io::split(server);
    let stats = Arc::clone(&ctx.stats);
    let task = tokio::spawn(ConnectionSession::new(reader, writer, Arc::new(handler), ctx).run());
    TestSession {
        client,
        stats,
        task,
    }
}

// --- TCP SERVER ---

pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: CancellationToken,
    pub stats: Arc<ServerStats>,
    pub task: JoinHandle<ShutdownReport>,
}

impl TestServer {
    /// Cancels the shutdown token and waits for every open session to end.
    /// Clients must close their connections for this to return.
    pub async fn stop(self) -> ShutdownReport {
        self.shutdown.cancel();
        self.wait().await
    }

    pub async fn wait(self) -> ShutdownReport {
        tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("server did not shut down in time")
            .unwrap()
    }
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..ServerConfig::default()
    }
}

pub async fn spawn_server<H: RequestHandler>(handler: H) -> TestServer {
    spawn_server_with(test_config(), handler).await
}

pub async fn spawn_server_with<H: RequestHandler>(config: ServerConfig, handler: H) -> TestServer {
    let server = Server::new(config, handler);
    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = server.shutdown_token();
    let stats = server.stats();
    let task = tokio::spawn(async move { server.run(listener).await });
    TestServer {
        addr,
        shutdown,
        stats,
        task,
    }
}

// --- BENCHMARK ---

pub struct Benchmark {
    pub name: String,
    pub start: Instant,
    pub count: usize,
    pub samples: Vec<Duration>,
}

impl Benchmark {
    pub fn start(name: &str, count: usize) -> Self {
        Self {
            name: name.to_string(),
            start: Instant::now(),
            count,
            samples: Vec::with_capacity(count),
        }
    }

    pub fn record(&mut self, duration: Duration) {
        self.samples.push(duration);
    }

    pub fn stop(mut self) {
        let total_duration = self.start.elapsed();
        let ops_sec = self.count as f64 / total_duration.as_secs_f64();

        self.samples.sort();
        let len = self.samples.len();
        let pct = |p: usize| self.samples.get(len * p / 100).unwrap_or(&Duration::ZERO).as_micros();

        println!("\n{}", self.name);
        println!(" Throughput:   {:.0} req/sec", ops_sec);
        println!(" Total Time:   {:.2?}", total_duration);
        println!(
            " Latency (us): p50: {} | p95: {} | p99: {} | MAX: {}",
            pct(50),
            pct(95),
            pct(99),
            self.samples.last().unwrap_or(&Duration::ZERO).as_micros()
        );
        println!(" Count:        {}\n", self.count);
    }
}
