pub mod connection_session;
pub mod dispatcher;
pub mod network;
pub mod protocol;
pub mod response_writer;
pub mod shutdown;
pub mod stats;

pub use connection_session::{handle_connection, CloseReason, ConnectionSession, SessionContext, SessionOutcome, SessionState};
pub use network::{Server, ShutdownReport};
pub use response_writer::ResponseWriter;
pub use stats::{ServerStats, StatsSnapshot};
