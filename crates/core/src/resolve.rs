//! Tiered identifier resolution.
//!
//! An identifier resolves to its bioseq record by consulting the cache
//! tier first and the database tier second, subject to the request's tier
//! policy. The cache phase is synchronous; falling through to the database
//! suspends the request until the read delivers. A secondary-id hit in
//! either tier only yields key fields and must be promoted to a full record
//! (again cache first) before it is usable; a key that cannot be promoted
//! is a data inconsistency, not a miss, because the key existed.

use crate::fetch::{FetchHandle, FetchKind, FetchPurpose};
use crate::pipeline::ResumePoint;
use crate::seqid::{self, ParsedSeqId};
use seqgate_api::cache::{CacheHit, DynCacheStore};
use seqgate_api::counters::{CounterEvent, DynCounters};
use seqgate_api::db::DynDbClient;
use seqgate_api::protocol::{codes, status, ReplyIssue};
use seqgate_api::{
    BioseqResolution, CacheUse, ResolutionOutcome, SecondaryIdRecord, SgError,
};

/// TieredResolver configuration types.
pub mod config {
    /// Name of the [TieredResolver](super::TieredResolver) module config.
    pub const MOD_NAME: &str = "resolver";

    /// Configuration parameters for the resolver.
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    #[serde(default)]
    pub struct ResolverConfig {
        /// Whether unresolved identifiers fall back to literal-string cache
        /// lookups (including the trailing-separator toggle). These exist
        /// for ids produced by older client generations. Default: true.
        pub literal_fallback: bool,
    }

    impl Default for ResolverConfig {
        fn default() -> Self {
            Self {
                literal_fallback: true,
            }
        }
    }

    impl seqgate_api::config::ModConfig for ResolverConfig {}
}

use config::ResolverConfig;

/// Which read of a resolution chain a handle is driving.
#[derive(Debug, Clone)]
pub(crate) enum ResolveStage {
    /// The secondary-id key lookup.
    SecondaryId,
    /// The chained full-record lookup; the tag records where the key
    /// came from.
    FullRecord { outcome: ResolutionOutcome },
}

/// What one resolution step produced.
#[derive(Debug)]
pub(crate) enum ResolveOutput {
    /// The attempt finished synchronously.
    Done(BioseqResolution),
    /// A database read is in flight; the handle must be tracked and the
    /// request suspended.
    Postponed(FetchHandle),
}

#[derive(Debug)]
pub(crate) struct TieredResolver {
    cache: DynCacheStore,
    db: DynDbClient,
    counters: DynCounters,
    config: ResolverConfig,
}

impl TieredResolver {
    pub fn new(
        cache: DynCacheStore,
        db: DynDbClient,
        counters: DynCounters,
        config: ResolverConfig,
    ) -> Self {
        Self {
            cache,
            db,
            counters,
            config,
        }
    }

    /// Resolve an identifier under the given tier policy.
    ///
    /// Ordering: composed primary id before secondary spellings, literal
    /// fallbacks last, and the cache before the database wherever both are
    /// allowed.
    pub fn resolve(
        &self,
        seq_id: &str,
        seq_id_type: Option<i16>,
        cache_use: CacheUse,
        point: ResumePoint,
    ) -> ResolveOutput {
        let parsed = seqid::parse(seq_id, seq_id_type);
        if parsed.is_none() {
            tracing::debug!(seq_id, "identifier has no structured form");
        }

        if cache_use.allows_cache() {
            if let Some(out) = self.try_cache(
                seq_id,
                seq_id_type,
                parsed.as_ref(),
                cache_use,
                point,
            ) {
                return out;
            }
            self.counters.increment(CounterEvent::CacheMiss);
        }

        if cache_use.allows_db() {
            let target = parsed
                .as_ref()
                .map(|p| p.primary())
                .unwrap_or_else(|| seq_id.to_string());
            let ty = parsed.as_ref().and_then(|p| p.seq_id_type);
            return self.submit_secondary_id(&target, ty, point);
        }

        ResolveOutput::Done(BioseqResolution::not_resolved())
    }

    /// The synchronous cache phase. `None` means the cache had nothing and
    /// the caller may try the database.
    fn try_cache(
        &self,
        seq_id: &str,
        seq_id_type: Option<i16>,
        parsed: Option<&ParsedSeqId>,
        cache_use: CacheUse,
        point: ResumePoint,
    ) -> Option<ResolveOutput> {
        let mut tried: Vec<String> = Vec::new();

        if let Some(p) = parsed {
            // a direct full-record lookup needs a concrete version
            if let Some(ver) = p.version {
                match self.cache.lookup_bioseq_info(
                    &p.accession,
                    Some(ver),
                    p.seq_id_type,
                ) {
                    Ok(CacheHit::Found(hit)) => {
                        self.counters.increment(CounterEvent::CacheHit);
                        return Some(ResolveOutput::Done(
                            BioseqResolution::resolved(
                                ResolutionOutcome::FromCachePrimary,
                                hit.info,
                                Some(hit.raw),
                            ),
                        ));
                    }
                    Ok(CacheHit::NotFound) => {}
                    Err(e) => return Some(self.cache_failure(e)),
                }
            }

            for cand in p.lookup_ids() {
                match self.secondary_in_cache(
                    &cand,
                    p.seq_id_type,
                    cache_use,
                    point,
                ) {
                    Ok(Some(out)) => return Some(out),
                    Ok(None) => tried.push(cand),
                    Err(e) => return Some(self.cache_failure(e)),
                }
            }
        }

        if self.config.literal_fallback {
            for cand in
                [seq_id.to_string(), seqid::toggle_trailing_bars(seq_id)]
            {
                if tried.contains(&cand) {
                    continue;
                }
                match self.secondary_in_cache(
                    &cand,
                    seq_id_type,
                    cache_use,
                    point,
                ) {
                    Ok(Some(out)) => return Some(out),
                    Ok(None) => tried.push(cand),
                    Err(e) => return Some(self.cache_failure(e)),
                }
            }
        }

        None
    }

    fn secondary_in_cache(
        &self,
        sec_id: &str,
        sec_type: Option<i16>,
        cache_use: CacheUse,
        point: ResumePoint,
    ) -> Result<Option<ResolveOutput>, SgError> {
        match self.cache.lookup_secondary_id(sec_id, sec_type)? {
            CacheHit::Found(rec) => {
                self.counters.increment(CounterEvent::CacheHit);
                Ok(Some(self.promote_secondary(
                    &rec,
                    cache_use,
                    ResolutionOutcome::FromCacheSecondary,
                    point,
                )))
            }
            CacheHit::NotFound => Ok(None),
        }
    }

    /// Promote a secondary-id hit's key fields to a full record, cache
    /// first, database fallback. The outcome tag keeps recording where the
    /// key itself was found.
    pub fn promote_secondary(
        &self,
        rec: &SecondaryIdRecord,
        cache_use: CacheUse,
        outcome: ResolutionOutcome,
        point: ResumePoint,
    ) -> ResolveOutput {
        if cache_use.allows_cache() {
            match self.cache.lookup_bioseq_info(
                &rec.accession,
                Some(rec.version),
                Some(rec.seq_id_type),
            ) {
                Ok(CacheHit::Found(hit)) => {
                    self.counters.increment(CounterEvent::CacheHit);
                    return ResolveOutput::Done(BioseqResolution::resolved(
                        outcome,
                        hit.info,
                        Some(hit.raw),
                    ));
                }
                Ok(CacheHit::NotFound) => {}
                Err(e) => return self.cache_failure(e),
            }
        }

        if cache_use.allows_db() {
            self.counters.increment(CounterEvent::DbResolution);
            let mut handle = FetchHandle::new(
                FetchKind::BioseqInfo,
                FetchPurpose::Resolution {
                    point,
                    stage: ResolveStage::FullRecord { outcome },
                },
                self.db.bioseq_info_query(
                    &rec.accession,
                    Some(rec.version),
                    Some(rec.seq_id_type),
                ),
            );
            return match handle.submit() {
                Ok(()) => ResolveOutput::Postponed(handle),
                Err(e) => self.submit_failure(e),
            };
        }

        // the key existed, the record backing it does not
        self.counters.increment(CounterEvent::DataInconsistency);
        ResolveOutput::Done(BioseqResolution::failed(ReplyIssue::error(
            status::SERVER_ERROR,
            codes::NO_RECORD_FOR_KEY,
            format!(
                "no bioseq record for {}.{} (type {})",
                rec.accession, rec.version, rec.seq_id_type
            ),
        )))
    }

    fn submit_secondary_id(
        &self,
        sec_id: &str,
        sec_type: Option<i16>,
        point: ResumePoint,
    ) -> ResolveOutput {
        self.counters.increment(CounterEvent::DbResolution);
        let mut handle = FetchHandle::new(
            FetchKind::SecondaryId,
            FetchPurpose::Resolution {
                point,
                stage: ResolveStage::SecondaryId,
            },
            self.db.secondary_id_query(sec_id, sec_type),
        );
        match handle.submit() {
            Ok(()) => ResolveOutput::Postponed(handle),
            Err(e) => self.submit_failure(e),
        }
    }

    fn cache_failure(&self, e: SgError) -> ResolveOutput {
        self.counters.increment(CounterEvent::CacheError);
        tracing::warn!(error = %e, "cache lookup failed");
        ResolveOutput::Done(BioseqResolution::failed(ReplyIssue::error(
            status::SERVER_ERROR,
            codes::CACHE_ERROR,
            format!("cache failure: {e}"),
        )))
    }

    fn submit_failure(&self, e: SgError) -> ResolveOutput {
        self.counters.increment(CounterEvent::DbUnknownError);
        tracing::warn!(error = %e, "could not submit resolution query");
        ResolveOutput::Done(BioseqResolution::failed(ReplyIssue::error(
            status::SERVER_ERROR,
            codes::DB_ERROR,
            format!("query submission failed: {e}"),
        )))
    }
}
