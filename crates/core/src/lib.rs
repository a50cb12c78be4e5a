#![deny(missing_docs)]
//! SeqGate sequence-data serving gateway core.
//!
//! The core is the per-request resolution-and-fetch pipeline: a request is
//! dispatched by kind, its identifier resolved cache-first with an
//! asynchronous database fallback, the blobs it needs planned (including
//! split-object expansion), and the results streamed back as a framed,
//! self-terminating reply. The transport, the cache storage engine, and
//! the database driver are collaborator traits from the seqgate_api crate;
//! this crate ships in-memory implementations of each under [factories]
//! for tests and embeddings.

use seqgate_api::builder::Builder;
use seqgate_api::config::Config;

pub mod factories;

mod fetch;
mod reply;
mod seqid;

pub mod gateway;
pub use gateway::*;

pub mod pipeline;
pub use pipeline::{PipelineState, RequestPipeline};

pub mod plan;
pub mod resolve;

/// Construct a default builder.
///
/// - `cache` - The default cache store is
///   [factories::MemCacheFactory].
/// - `db` - The default database client is
///   [factories::MemDbFactory].
/// - `counters` - The default counter store is
///   [factories::AtomicCountersFactory].
///
/// The mem modules back tests and embeddings; a production deployment
/// keeps the counters and swaps the cache and database factories for ones
/// bound to its cache files and its cluster.
pub fn default_builder() -> Builder {
    Builder {
        config: Config::default(),
        cache: factories::MemCacheFactory::create(),
        db: factories::MemDbFactory::create(),
        counters: factories::AtomicCountersFactory::create(),
    }
}
