//! The observability port: process-wide event counters.

use crate::{builder, config, SgResult};
use futures::future::BoxFuture;
use std::sync::Arc;

/// Everything the pipeline counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterEvent {
    /// A resolve request was started.
    RequestResolve,
    /// A blob-by-seq-id request was started.
    RequestBlobBySeqId,
    /// A blob-by-locator request was started.
    RequestBlobById,
    /// An annotation request was started.
    RequestAnnotation,
    /// A cache lookup hit.
    CacheHit,
    /// A resolution attempt exhausted the cache tier without a hit.
    CacheMiss,
    /// A cache lookup failed (distinct from a miss).
    CacheError,
    /// A resolution fell through to the database tier.
    DbResolution,
    /// A database read timed out.
    DbTimeout,
    /// A database read failed for an unknown reason.
    DbUnknownError,
    /// A server-side data inconsistency was detected.
    DataInconsistency,
    /// A request's subject was not found.
    NotFound,
    /// A request carried a malformed parameter.
    MalformedRequest,
    /// A blob fetch was skipped because the client already holds it.
    ExcludedBlob,
    /// A request was cancelled before completing.
    Cancelled,
}

impl CounterEvent {
    /// Every event, in index order.
    pub const ALL: [CounterEvent; 15] = [
        CounterEvent::RequestResolve,
        CounterEvent::RequestBlobBySeqId,
        CounterEvent::RequestBlobById,
        CounterEvent::RequestAnnotation,
        CounterEvent::CacheHit,
        CounterEvent::CacheMiss,
        CounterEvent::CacheError,
        CounterEvent::DbResolution,
        CounterEvent::DbTimeout,
        CounterEvent::DbUnknownError,
        CounterEvent::DataInconsistency,
        CounterEvent::NotFound,
        CounterEvent::MalformedRequest,
        CounterEvent::ExcludedBlob,
        CounterEvent::Cancelled,
    ];

    /// Stable snake_case name, for export surfaces.
    pub fn name(&self) -> &'static str {
        match self {
            CounterEvent::RequestResolve => "request_resolve",
            CounterEvent::RequestBlobBySeqId => "request_blob_by_seq_id",
            CounterEvent::RequestBlobById => "request_blob_by_id",
            CounterEvent::RequestAnnotation => "request_annotation",
            CounterEvent::CacheHit => "cache_hit",
            CounterEvent::CacheMiss => "cache_miss",
            CounterEvent::CacheError => "cache_error",
            CounterEvent::DbResolution => "db_resolution",
            CounterEvent::DbTimeout => "db_timeout",
            CounterEvent::DbUnknownError => "db_unknown_error",
            CounterEvent::DataInconsistency => "data_inconsistency",
            CounterEvent::NotFound => "not_found",
            CounterEvent::MalformedRequest => "malformed_request",
            CounterEvent::ExcludedBlob => "excluded_blob",
            CounterEvent::Cancelled => "cancelled",
        }
    }

    /// Dense index of this event within [CounterEvent::ALL].
    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Trait for implementing the counter store.
///
/// The concrete store is process-wide state, initialized at startup and
/// never torn down; pipelines only ever increment through this port.
pub trait Counters: 'static + Send + Sync + std::fmt::Debug {
    /// To aid in concrete downcasting.
    fn as_any(&self) -> &dyn std::any::Any;

    /// Count one occurrence of an event.
    fn increment(&self, event: CounterEvent);
}

/// Trait object [Counters].
pub type DynCounters = Arc<dyn Counters>;

/// A factory for creating Counters instances.
pub trait CountersFactory: 'static + Send + Sync + std::fmt::Debug {
    /// Help the builder construct a default config from the chosen
    /// module factories.
    fn default_config(&self, config: &mut config::Config) -> SgResult<()>;

    /// Construct a Counters instance.
    fn create(
        &self,
        builder: Arc<builder::Builder>,
    ) -> BoxFuture<'static, SgResult<DynCounters>>;
}

/// Trait object [CountersFactory].
pub type DynCountersFactory = Arc<dyn CountersFactory>;
