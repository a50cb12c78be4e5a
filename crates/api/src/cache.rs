//! The read-only key-value cache collaborator.

use crate::{
    builder, config, BioseqInfo, BlobId, BlobProps, SecondaryIdRecord,
    SgResult,
};
use futures::future::BoxFuture;
use std::sync::Arc;

/// Result of a single cache lookup.
///
/// A lookup that fails (storage-layer exception) returns `Err` instead; the
/// pipeline treats that as distinct from [CacheHit::NotFound] and never
/// retries it against the cache tier.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheHit<T> {
    /// The record was found.
    Found(T),
    /// The record is not in the cache.
    NotFound,
}

/// A full bioseq record as stored by the cache tier: the decoded record
/// plus the raw stored payload for zero-copy passthrough.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedBioseq {
    /// The decoded record.
    pub info: BioseqInfo,
    /// The raw stored payload.
    pub raw: bytes::Bytes,
}

/// Trait for implementing the local read-only cache tier.
///
/// Lookups are synchronous: the backing store is a local ordered key-value
/// file, and the pipeline consults it inline before considering the
/// database tier.
pub trait CacheStore: 'static + Send + Sync + std::fmt::Debug {
    /// Look up the key fields of the record a secondary id maps to.
    fn lookup_secondary_id(
        &self,
        sec_seq_id: &str,
        sec_seq_id_type: Option<i16>,
    ) -> SgResult<CacheHit<SecondaryIdRecord>>;

    /// Look up a full bioseq record by its primary key fields. Omitted
    /// fields match the most recent record for the accession.
    fn lookup_bioseq_info(
        &self,
        accession: &str,
        version: Option<i16>,
        seq_id_type: Option<i16>,
    ) -> SgResult<CacheHit<CachedBioseq>>;

    /// Look up blob properties by locator.
    fn lookup_blob_props(
        &self,
        blob_id: BlobId,
    ) -> SgResult<CacheHit<BlobProps>>;
}

/// Trait object [CacheStore].
pub type DynCacheStore = Arc<dyn CacheStore>;

/// A factory for creating CacheStore instances.
pub trait CacheStoreFactory: 'static + Send + Sync + std::fmt::Debug {
    /// Help the builder construct a default config from the chosen
    /// module factories.
    fn default_config(&self, config: &mut config::Config) -> SgResult<()>;

    /// Construct a CacheStore instance.
    fn create(
        &self,
        builder: Arc<builder::Builder>,
    ) -> BoxFuture<'static, SgResult<DynCacheStore>>;
}

/// Trait object [CacheStoreFactory].
pub type DynCacheStoreFactory = Arc<dyn CacheStoreFactory>;
