//! Record destinations.
//!
//! - [`jsonl`]: the per-run JSON-lines file. Mandatory; a failure aborts the run.
//! - [`remote`]: upserts into the remote tables. Optional and best effort.
//! - [`memory`]: an in-process [`RemoteStore`] for tests and dry runs.

pub mod jsonl;
pub mod memory;
pub mod remote;

pub use jsonl::LocalFileSink;
pub use memory::MemoryStore;
pub use remote::{RemoteSink, RemoteStore, SupabaseStore};
