//! Live file streaming.
//!
//! - [`socket`]: the shared connection writer and the peer liveness probe
//! - [`tail`]: the follow-the-file loop used by the `stream` operation

pub mod socket;
pub mod tail;

pub use socket::{PeerProbe, SocketWriter};
pub use tail::{TailConfig, TailOutcome, TailStreamer, TailSummary};
