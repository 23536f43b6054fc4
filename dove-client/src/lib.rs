//! Dove Client - session wiring for front ends
//!
//! Ties the cache registry and the ledger to a remote accessor: the JSON-RPC
//! accessor for live endpoints, or an offline one in mock mode.

pub mod rpc;
pub mod session;
pub mod telemetry;

pub use rpc::{RpcAccessor, TransactionSigner};
pub use session::{OfflineAccessor, Session};
pub use telemetry::{init_tracing, TelemetryConfig};
