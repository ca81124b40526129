//! Worker node: holds collection shards and reports host resources
//!
//! A worker is the dispatch target of the coordinator. In standalone mode
//! the coordinator embeds a `LocalShard` directly instead of reaching one
//! over HTTP.

pub mod http;
pub mod local;
pub mod server;

pub use local::LocalShard;
pub use server::WorkerServer;
