//! Factories for generating instances of SeqGate modules.

pub mod mem_cache;
pub use mem_cache::*;

pub mod mem_db;
pub use mem_db::*;

mod mem_transport;
pub use mem_transport::*;

mod atomic_counters;
pub use atomic_counters::*;
