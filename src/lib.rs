//! rpcframe: a pipelined RPC server over a length-prefixed binary TCP protocol.
//!
//! Wire frame: `[magic u32][request_id u32][body_len u32][body]`, all big-endian.
//! Requests on one connection are handled concurrently and answered as soon as
//! they complete, so responses may come back in a different order than requests.

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod server;

pub use client::{ClientError, RpcClient};
pub use config::Config;
pub use error::{Result, RpcError};
pub use handler::{EchoHandler, HandlerError, RequestHandler, SleepHandler};
pub use server::protocol::{decode_header, encode_frame, encode_header, Frame, FrameBuffer, MAGIC_NUMBER};
pub use server::Server;
