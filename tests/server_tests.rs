use bytes::Bytes;
use rpcframe::handler::{EchoHandler, SleepHandler, SleepResponse};
use rpcframe::{ClientError, RpcClient};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

mod helpers;
use helpers::{
    decode_all, frame_bytes, ids, read_to_end, sleep_body, spawn_server, spawn_server_with, test_config,
    Benchmark,
};

#[cfg(test)]
mod server_tests {
    use super::*;

    // =========================================================================================
    // 1. TCP ROUND TRIPS
    // =========================================================================================

    mod round_trips {
        use super::*;

        #[tokio::test]
        async fn test_raw_socket_echo() {
            let server = spawn_server(EchoHandler).await;

            let mut socket = TcpStream::connect(server.addr).await.unwrap();
            socket.write_all(&frame_bytes(42, b"hello world")).await.unwrap();
            socket.shutdown().await.unwrap();

            let bytes = read_to_end(&mut socket).await;
            assert_eq!(bytes.len(), 12 + 11);
            assert_eq!(&bytes[..4], &[0x4D, 0x59, 0x52, 0x43]);
            assert_eq!(&bytes[4..8], &42u32.to_be_bytes());
            assert_eq!(&bytes[8..12], &11u32.to_be_bytes());
            assert_eq!(&bytes[12..], b"hello world");

            assert!(server.stop().await.is_clean());
        }

        #[tokio::test]
        async fn test_client_pipelines_on_one_connection() {
            let server = spawn_server(SleepHandler::default()).await;
            let client = Arc::new(RpcClient::connect(server.addr).await.unwrap());
            let start = Instant::now();

            let slow = {
                let client = Arc::clone(&client);
                tokio::spawn(async move {
                    let body = client.call(sleep_body(0.4)).await.unwrap();
                    (start.elapsed(), body)
                })
            };
            tokio::time::sleep(Duration::from_millis(20)).await;

            let mut fast = Vec::new();
            for _ in 0..5 {
                let client = Arc::clone(&client);
                fast.push(tokio::spawn(async move {
                    client.call(sleep_body(0.02)).await.unwrap();
                    start.elapsed()
                }));
            }

            for task in fast {
                assert!(task.await.unwrap() < Duration::from_millis(300), "fast call waited behind slow one");
            }
            let (slow_elapsed, body) = slow.await.unwrap();
            assert!(slow_elapsed >= Duration::from_millis(400));

            let resp: SleepResponse = serde_json::from_slice(&body).unwrap();
            assert_eq!(resp.status, "completed");
            assert_eq!(client.in_flight(), 0);

            drop(client);
            assert!(server.stop().await.is_clean());
        }

        #[tokio::test]
        async fn test_client_rejects_duplicate_in_flight_id() {
            let server = spawn_server(SleepHandler::default()).await;
            let client = Arc::new(RpcClient::connect(server.addr).await.unwrap());

            let first = {
                let client = Arc::clone(&client);
                tokio::spawn(async move { client.call_with_id(7, sleep_body(0.2)).await })
            };
            tokio::time::sleep(Duration::from_millis(50)).await;

            let dup = client.call_with_id(7, sleep_body(0.0)).await;
            assert!(matches!(dup, Err(ClientError::DuplicateRequestId(7))));
            assert!(first.await.unwrap().is_ok());

            drop(client);
            server.stop().await;
        }

        #[tokio::test]
        async fn test_finish_still_delivers_sent_calls() {
            let server = spawn_server(EchoHandler).await;
            let client = Arc::new(RpcClient::connect(server.addr).await.unwrap());

            let reply = client.call(Bytes::from_static(b"before finish")).await.unwrap();
            assert_eq!(reply, Bytes::from_static(b"before finish"));

            client.finish().await.unwrap();
            // Server saw EOF and closed: later calls fail instead of hanging.
            let after = tokio::time::timeout(Duration::from_secs(2), client.call(&b"late"[..])).await.unwrap();
            assert!(after.is_err());

            drop(client);
            server.stop().await;
        }

        #[tokio::test]
        async fn test_malformed_frame_closes_only_that_connection() {
            let server = spawn_server(EchoHandler).await;

            let mut bad = TcpStream::connect(server.addr).await.unwrap();
            // Exactly one header's worth of garbage, so the server leaves nothing unread.
            bad.write_all(b"GET / HTTP/1").await.unwrap();
            assert!(read_to_end(&mut bad).await.is_empty());

            let good = RpcClient::connect(server.addr).await.unwrap();
            assert_eq!(good.call(&b"ok"[..]).await.unwrap(), Bytes::from_static(b"ok"));

            drop(good);
            let stats = Arc::clone(&server.stats);
            assert!(server.stop().await.is_clean());
            assert_eq!(stats.snapshot().protocol_errors, 1);
        }
    }

    // =========================================================================================
    // 2. LIFECYCLE (graceful shutdown + limits)
    // =========================================================================================

    mod lifecycle {
        use super::*;

        #[tokio::test]
        async fn test_shutdown_keeps_serving_open_connection() {
            let server = spawn_server(SleepHandler::default()).await;
            let addr = server.addr;
            let stats = Arc::clone(&server.stats);
            let shutdown = server.shutdown.clone();

            let mut socket = TcpStream::connect(addr).await.unwrap();
            socket.write_all(&frame_bytes(5, &sleep_body(0.3))).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;

            shutdown.cancel();
            let stopping = tokio::spawn(server.wait());
            tokio::time::sleep(Duration::from_millis(50)).await;

            // New connections are refused once the signal is in.
            assert!(TcpStream::connect(addr).await.is_err());

            // The accepted connection is unaffected: a request sent after the signal is still answered.
            socket.write_all(&frame_bytes(6, &sleep_body(0.0))).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(!stopping.is_finished(), "server exited with a session still open");

            socket.shutdown().await.unwrap();
            let frames = decode_all(&read_to_end(&mut socket).await);
            assert_eq!(ids(&frames), vec![6, 5]);

            let report = stopping.await.unwrap();
            assert!(report.is_clean());
            assert_eq!(report.sessions_drained, 1);
            assert_eq!(stats.snapshot().active_sessions, 0);
            assert_eq!(stats.snapshot().responses_written, 2);
        }

        #[tokio::test]
        async fn test_shutdown_waits_for_idle_connections_to_close() {
            let server = spawn_server(EchoHandler).await;
            let idle_a = TcpStream::connect(server.addr).await.unwrap();
            let idle_b = TcpStream::connect(server.addr).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;

            server.shutdown.cancel();
            let stopping = tokio::spawn(server.wait());
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert!(!stopping.is_finished());

            drop(idle_a);
            drop(idle_b);
            let report = stopping.await.unwrap();
            assert!(report.is_clean());
            assert_eq!(report.sessions_drained, 2);
        }

        #[tokio::test]
        async fn test_connection_limit_refuses_extra_clients() {
            let config = rpcframe::config::ServerConfig {
                max_connections: 1,
                ..test_config()
            };
            let server = spawn_server_with(config, EchoHandler).await;

            let first = RpcClient::connect(server.addr).await.unwrap();
            assert_eq!(first.call(&b"one"[..]).await.unwrap(), Bytes::from_static(b"one"));

            let mut second = TcpStream::connect(server.addr).await.unwrap();
            let _ = second.write_all(&frame_bytes(1, b"two")).await;
            let mut buf = [0u8; 64];
            let refused = tokio::time::timeout(Duration::from_secs(2), second.read(&mut buf)).await.unwrap();
            // Dropped by the server: EOF, or a reset if our frame landed after the close.
            assert!(matches!(refused, Ok(0) | Err(_)));
            assert_eq!(server.stats.snapshot().connections_refused, 1);

            drop(first);
            server.stop().await;
        }
    }

    // =========================================================================================
    // 3. THROUGHPUT
    // =========================================================================================

    mod throughput {
        use super::*;

        #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
        async fn test_pipelined_echo_throughput() {
            const COUNT: usize = 2_000;
            let server = spawn_server(EchoHandler).await;
            let client = Arc::new(RpcClient::connect(server.addr).await.unwrap());

            let mut bench = Benchmark::start("PIPELINED ECHO", COUNT);
            let mut tasks = Vec::with_capacity(COUNT);
            for i in 0..COUNT {
                let client = Arc::clone(&client);
                tasks.push(tokio::spawn(async move {
                    let t = Instant::now();
                    let body = Bytes::from(format!("payload-{i}"));
                    let reply = client.call(body.clone()).await.unwrap();
                    assert_eq!(reply, body);
                    t.elapsed()
                }));
            }
            for task in tasks {
                bench.record(task.await.unwrap());
            }
            bench.stop();

            drop(client);
            assert!(server.stop().await.is_clean());
        }
    }
}
