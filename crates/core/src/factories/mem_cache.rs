//! The mem cache store implementation provided by SeqGate.
//!
//! Backs tests and embeddings: records are seeded through the insert
//! methods, lookups behave like the real read-only tier (including a
//! switchable failure mode and per-operation call counting so tier
//! ordering can be asserted).

use futures::future::BoxFuture;
use seqgate_api::builder::Builder;
use seqgate_api::cache::{
    CacheHit, CacheStore, CacheStoreFactory, CachedBioseq, DynCacheStore,
    DynCacheStoreFactory,
};
use seqgate_api::config::Config;
use seqgate_api::{
    BioseqInfo, BlobId, BlobProps, SecondaryIdRecord, SgError, SgResult,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};


/// The mem cache store implementation provided by SeqGate.
#[derive(Debug)]
pub struct MemCacheFactory {
    instance: Mutex<Option<Arc<MemCache>>>,
}

impl MemCacheFactory {
    /// Construct a new MemCacheFactory creating an empty store.
    pub fn create() -> DynCacheStoreFactory {
        Arc::new(MemCacheFactory {
            instance: Mutex::new(None),
        })
    }

    /// Construct a MemCacheFactory handing out a pre-seeded store.
    pub fn with_instance(cache: Arc<MemCache>) -> DynCacheStoreFactory {
        Arc::new(MemCacheFactory {
            instance: Mutex::new(Some(cache)),
        })
    }
}

impl CacheStoreFactory for MemCacheFactory {
    fn default_config(&self, _config: &mut Config) -> SgResult<()> {
        Ok(())
    }

    fn create(
        &self,
        _builder: Arc<Builder>,
    ) -> BoxFuture<'static, SgResult<DynCacheStore>> {
        let out: DynCacheStore = self
            .instance
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(MemCache::create);
        Box::pin(async move { Ok(out) })
    }
}

/// Per-operation lookup counts.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemCacheLookups {
    /// Secondary-id lookups made.
    pub secondary: u64,
    /// Full-record lookups made.
    pub bioseq: u64,
    /// Blob-property lookups made.
    pub blob_props: u64,
}

#[derive(Debug, Default)]
struct MemCacheInner {
    secondary: HashMap<String, SecondaryIdRecord>,
    bioseq: Vec<CachedBioseq>,
    blob_props: HashMap<BlobId, BlobProps>,
    failing: bool,
    lookups: MemCacheLookups,
}

/// An in-memory rendition of the local read-only cache tier.
#[derive(Debug, Default)]
pub struct MemCache {
    inner: Mutex<MemCacheInner>,
}

impl MemCache {
    /// Construct a new, empty MemCache.
    pub fn create() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Seed a full bioseq record. The stored raw payload is the record's
    /// JSON rendering, standing in for the real tier's binary encoding.
    pub fn insert_bioseq(&self, info: BioseqInfo) {
        let raw = bytes::Bytes::from(
            serde_json::to_vec(&info)
                .expect("failed to serialize BioseqInfo to bytes"),
        );
        self.inner
            .lock()
            .unwrap()
            .bioseq
            .push(CachedBioseq { info, raw });
    }

    /// Seed a secondary-id index entry.
    pub fn insert_secondary(
        &self,
        sec_seq_id: impl Into<String>,
        rec: SecondaryIdRecord,
    ) {
        self.inner
            .lock()
            .unwrap()
            .secondary
            .insert(sec_seq_id.into(), rec);
    }

    /// Seed blob properties.
    pub fn insert_blob_props(&self, props: BlobProps) {
        self.inner
            .lock()
            .unwrap()
            .blob_props
            .insert(props.blob_id, props);
    }

    /// Make every subsequent lookup fail, the way a broken cache file
    /// would, until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().unwrap().failing = failing;
    }

    /// How many lookups of each kind were made.
    pub fn lookup_counts(&self) -> MemCacheLookups {
        self.inner.lock().unwrap().lookups
    }

    fn check_failing(inner: &MemCacheInner) -> SgResult<()> {
        if inner.failing {
            return Err(SgError::other("cache failure injected"));
        }
        Ok(())
    }
}

impl CacheStore for MemCache {
    fn lookup_secondary_id(
        &self,
        sec_seq_id: &str,
        _sec_seq_id_type: Option<i16>,
    ) -> SgResult<CacheHit<SecondaryIdRecord>> {
        let mut inner = self.inner.lock().unwrap();
        inner.lookups.secondary += 1;
        Self::check_failing(&inner)?;
        Ok(match inner.secondary.get(sec_seq_id) {
            Some(rec) => CacheHit::Found(rec.clone()),
            None => CacheHit::NotFound,
        })
    }

    fn lookup_bioseq_info(
        &self,
        accession: &str,
        version: Option<i16>,
        seq_id_type: Option<i16>,
    ) -> SgResult<CacheHit<CachedBioseq>> {
        let mut inner = self.inner.lock().unwrap();
        inner.lookups.bioseq += 1;
        Self::check_failing(&inner)?;
        let best = inner
            .bioseq
            .iter()
            .filter(|e| {
                e.info.accession == accession
                    && version.map(|v| e.info.version == v).unwrap_or(true)
                    && seq_id_type
                        .map(|t| e.info.seq_id_type == t)
                        .unwrap_or(true)
            })
            .max_by_key(|e| e.info.version);
        Ok(match best {
            Some(e) => CacheHit::Found(e.clone()),
            None => CacheHit::NotFound,
        })
    }

    fn lookup_blob_props(
        &self,
        blob_id: BlobId,
    ) -> SgResult<CacheHit<BlobProps>> {
        let mut inner = self.inner.lock().unwrap();
        inner.lookups.blob_props += 1;
        Self::check_failing(&inner)?;
        Ok(match inner.blob_props.get(&blob_id) {
            Some(props) => CacheHit::Found(props.clone()),
            None => CacheHit::NotFound,
        })
    }
}
