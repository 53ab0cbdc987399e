//! Transactional core.
//!
//! Layering, leaves first: `xid` and `mutation` are plain values; `sql`
//! turns statements into mutations; `codec` and `recovery` make mutations
//! durable; `worker` runs one backend transaction per session; `bridge`
//! maps connection and XA semantics onto workers.

pub mod backend;
pub mod bridge;
pub mod codec;
pub mod keepalive;
pub mod mutation;
pub mod recovery;
pub mod sql;
pub mod worker;
pub mod xid;

// re-exports
pub use backend::{Backend, Catalog, MemoryBackend, TableSchema};
pub use bridge::{Connection, Driver, ExecuteOutcome, XaVote};
pub use worker::{TransactionWorker, WorkerStatus};
