//! Blob fetch planning.
//!
//! Given a storage locator and a retrieval depth, the planner decides which
//! blob reads must happen: properties first, and depending on the depth and
//! on whether the properties carry a split descriptor, the original body
//! chunks or the split companion blobs. Every planned blob repeats the
//! cache-then-database policy for its own properties, so a companion whose
//! properties sit in the cache costs no database round trip.

use crate::fetch::{FetchHandle, FetchKind, FetchPurpose};
use crate::reply::{raise_status, ReplyFramer};
use seqgate_api::cache::{CacheHit, DynCacheStore};
use seqgate_api::counters::{CounterEvent, DynCounters};
use seqgate_api::db::DynDbClient;
use seqgate_api::protocol::{codes, status, ItemType, ReplyIssue};
use seqgate_api::{
    BlobId, BlobProps, CacheUse, LocatorOrigin, SatMap, SplitInfo, TseOption,
};
use std::sync::Arc;

/// BlobFetchPlanner configuration types.
pub mod config {
    /// Name of the [BlobFetchPlanner](super::BlobFetchPlanner) module
    /// config.
    pub const MOD_NAME: &str = "planner";

    /// Configuration parameters for the planner.
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    #[serde(default)]
    pub struct PlannerConfig {
        /// Upper bound on the chunk count a split descriptor may claim.
        /// A descriptor above it is treated as malformed. Default: 100000.
        pub max_split_chunks: i32,
    }

    impl Default for PlannerConfig {
        fn default() -> Self {
            Self {
                max_split_chunks: 100_000,
            }
        }
    }

    impl seqgate_api::config::ModConfig for PlannerConfig {}
}

use config::PlannerConfig;

/// The per-request knobs planning runs under.
#[derive(Debug, Clone)]
pub(crate) struct PlanParams {
    pub tse: TseOption,
    pub cache_use: CacheUse,
    pub exclude: Vec<BlobId>,
    pub send_blob_if_small: Option<u64>,
}

/// Per-blob planning context, carried by a pending properties read so the
/// depth branching can run when the properties arrive.
#[derive(Debug, Clone)]
pub(crate) struct BlobCtx {
    pub blob_id: BlobId,
    pub keyspace: Arc<str>,
    pub origin: LocatorOrigin,
    /// False for split companions: their own descriptors are not expanded.
    pub expand_split: bool,
    pub prop_item: u64,
}

/// Where planning writes: the framer, the request's fetch list, and the
/// request's overall status.
pub(crate) struct PlanSink<'a> {
    pub framer: &'a mut ReplyFramer,
    pub fetches: &'a mut Vec<FetchHandle>,
    pub status: &'a mut u16,
}

#[derive(Debug)]
pub(crate) struct BlobFetchPlanner {
    cache: DynCacheStore,
    db: DynDbClient,
    counters: DynCounters,
    sat_map: Arc<SatMap>,
    config: PlannerConfig,
}

impl BlobFetchPlanner {
    pub fn new(
        cache: DynCacheStore,
        db: DynDbClient,
        counters: DynCounters,
        sat_map: Arc<SatMap>,
        config: PlannerConfig,
    ) -> Self {
        Self {
            cache,
            db,
            counters,
            sat_map,
            config,
        }
    }

    /// Plan the reads for one blob.
    ///
    /// `expand_split` is false for split companions, whose own descriptors
    /// are left alone.
    pub fn plan(
        &self,
        blob_id: BlobId,
        origin: LocatorOrigin,
        expand_split: bool,
        params: &PlanParams,
        sink: &mut PlanSink<'_>,
    ) {
        if params.exclude.contains(&blob_id) {
            self.counters.increment(CounterEvent::ExcludedBlob);
            let item = sink.framer.new_item();
            sink.framer.message(
                item,
                ItemType::Blob,
                &ReplyIssue::info(
                    codes::EXCLUDED_BLOB,
                    format!("blob {blob_id} excluded by client"),
                ),
            );
            sink.framer.item_complete(item, ItemType::Blob);
            return;
        }

        if !blob_id.is_valid() {
            self.report_bad_locator(
                origin,
                ReplyIssue::error(
                    status::SERVER_ERROR,
                    codes::MALFORMED_PARAMETER,
                    format!("invalid blob id {blob_id}"),
                ),
                sink,
            );
            return;
        }

        let Some(keyspace) = self.sat_map.keyspace(blob_id.sat) else {
            self.report_bad_locator(
                origin,
                ReplyIssue::error(
                    status::SERVER_ERROR,
                    codes::UNKNOWN_SATELLITE,
                    format!("no keyspace for satellite {}", blob_id.sat),
                ),
                sink,
            );
            return;
        };

        let ctx = BlobCtx {
            blob_id,
            keyspace,
            origin,
            expand_split,
            prop_item: sink.framer.new_item(),
        };

        if params.cache_use.allows_cache() {
            match self.cache.lookup_blob_props(blob_id) {
                Ok(CacheHit::Found(props)) => {
                    self.counters.increment(CounterEvent::CacheHit);
                    self.apply_props(&ctx, props, params, sink);
                    return;
                }
                Ok(CacheHit::NotFound) => {
                    self.counters.increment(CounterEvent::CacheMiss);
                    if !params.cache_use.allows_db() {
                        self.report_missing_props(&ctx, sink);
                        return;
                    }
                }
                Err(e) => {
                    self.counters.increment(CounterEvent::CacheError);
                    tracing::warn!(error = %e, blob_id = %blob_id,
                        "blob props cache lookup failed");
                    if !params.cache_use.allows_db() {
                        self.report_prop_issue(
                            &ctx,
                            ReplyIssue::error(
                                status::SERVER_ERROR,
                                codes::CACHE_ERROR,
                                format!("cache failure: {e}"),
                            ),
                            sink,
                        );
                        return;
                    }
                }
            }
        }

        let mut handle = FetchHandle::new(
            FetchKind::Blob,
            FetchPurpose::BlobProps {
                ctx: ctx.clone(),
                params: params.clone(),
            },
            self.db.blob_props_query(&ctx.keyspace, blob_id),
        );
        match handle.submit() {
            Ok(()) => sink.fetches.push(handle),
            Err(e) => {
                self.counters.increment(CounterEvent::DbUnknownError);
                self.report_prop_issue(
                    &ctx,
                    ReplyIssue::error(
                        status::SERVER_ERROR,
                        codes::DB_ERROR,
                        format!("query submission failed: {e}"),
                    ),
                    sink,
                );
            }
        }
    }

    /// Continue planning once a blob's properties are known: report them,
    /// then branch on the retrieval depth.
    pub fn apply_props(
        &self,
        ctx: &BlobCtx,
        props: BlobProps,
        params: &PlanParams,
        sink: &mut PlanSink<'_>,
    ) {
        tracing::debug!(blob_id = %ctx.blob_id, size = props.size,
            "blob props resolved");
        match serde_json::to_vec(&props) {
            Ok(payload) => {
                sink.framer.blob_props_data(
                    ctx.prop_item,
                    &ctx.blob_id,
                    &payload,
                );
                sink.framer.item_complete(ctx.prop_item, ItemType::BlobProp);
            }
            Err(e) => {
                self.report_prop_issue(
                    ctx,
                    ReplyIssue::error(
                        status::MALFUNCTION,
                        codes::MALFUNCTION,
                        format!("could not serialize blob props: {e}"),
                    ),
                    sink,
                );
                return;
            }
        }

        if matches!(params.tse, TseOption::None) {
            return;
        }
        if let Some(limit) = params.send_blob_if_small {
            if props.size > limit {
                tracing::debug!(blob_id = %ctx.blob_id, size = props.size,
                    limit, "blob data withheld by size gate");
                return;
            }
        }

        let split_raw = match params.tse {
            TseOption::Orig | TseOption::None => None,
            TseOption::Slim | TseOption::Smart | TseOption::Whole => {
                if ctx.expand_split {
                    props.id2_info.as_deref()
                } else {
                    None
                }
            }
        };

        if let Some(raw) = split_raw {
            match self.decode_split(raw) {
                Ok(split) => self.expand_split(&split, params, sink),
                Err(issue) => {
                    // only the expansion is cancelled; the properties
                    // already reported above stand
                    self.counters.increment(CounterEvent::DataInconsistency);
                    let item = sink.framer.new_item();
                    raise_status(sink.status, issue.status);
                    sink.framer.message(item, ItemType::Blob, &issue);
                    sink.framer.item_complete(item, ItemType::Blob);
                }
            }
            return;
        }

        match params.tse {
            TseOption::None | TseOption::Slim => {}
            TseOption::Smart | TseOption::Whole | TseOption::Orig => {
                self.fetch_chunks(ctx, &props, sink)
            }
        }
    }

    fn decode_split(&self, raw: &str) -> Result<SplitInfo, ReplyIssue> {
        let split = SplitInfo::parse(raw).map_err(|e| {
            ReplyIssue::error(
                status::SERVER_ERROR,
                codes::BAD_SPLIT_INFO,
                e.to_string(),
            )
        })?;
        if split.n_chunks > self.config.max_split_chunks {
            return Err(ReplyIssue::error(
                status::SERVER_ERROR,
                codes::BAD_SPLIT_INFO,
                format!(
                    "split descriptor claims {} chunks, limit is {}",
                    split.n_chunks, self.config.max_split_chunks
                ),
            ));
        }
        Ok(split)
    }

    /// Plan the companion blobs a split descriptor names: the info blob
    /// always, the numbered chunk blobs only for full-depth retrieval.
    fn expand_split(
        &self,
        split: &SplitInfo,
        params: &PlanParams,
        sink: &mut PlanSink<'_>,
    ) {
        let inner = PlanParams {
            tse: TseOption::Orig,
            ..params.clone()
        };
        self.plan(
            split.info_blob_id(),
            LocatorOrigin::Derived,
            false,
            &inner,
            sink,
        );
        if matches!(params.tse, TseOption::Whole) {
            for chunk_no in 1..=split.n_chunks {
                self.plan(
                    split.chunk_blob_id(chunk_no),
                    LocatorOrigin::Derived,
                    false,
                    &inner,
                    sink,
                );
            }
        }
    }

    fn fetch_chunks(
        &self,
        ctx: &BlobCtx,
        props: &BlobProps,
        sink: &mut PlanSink<'_>,
    ) {
        let data_item = sink.framer.new_item();
        if props.n_chunks <= 0 {
            sink.framer.item_complete(data_item, ItemType::Blob);
            return;
        }
        let mut handle = FetchHandle::new(
            FetchKind::Blob,
            FetchPurpose::BlobChunks {
                blob_id: ctx.blob_id,
                data_item,
            },
            self.db.blob_chunks_query(
                &ctx.keyspace,
                ctx.blob_id,
                props.n_chunks,
            ),
        );
        match handle.submit() {
            Ok(()) => sink.fetches.push(handle),
            Err(e) => {
                self.counters.increment(CounterEvent::DbUnknownError);
                raise_status(sink.status, status::SERVER_ERROR);
                sink.framer.message(
                    data_item,
                    ItemType::Blob,
                    &ReplyIssue::error(
                        status::SERVER_ERROR,
                        codes::DB_ERROR,
                        format!("query submission failed: {e}"),
                    ),
                );
                sink.framer.item_complete(data_item, ItemType::Blob);
            }
        }
    }

    /// A missing-properties outcome: not-found when the client asserted
    /// the locator, a data inconsistency when the gateway derived it.
    pub fn report_missing_props(
        &self,
        ctx: &BlobCtx,
        sink: &mut PlanSink<'_>,
    ) {
        let issue = match ctx.origin {
            LocatorOrigin::Client => {
                self.counters.increment(CounterEvent::NotFound);
                ReplyIssue::error(
                    status::NOT_FOUND,
                    codes::NO_BLOB_PROPS,
                    format!("no properties for blob {}", ctx.blob_id),
                )
            }
            LocatorOrigin::Derived => {
                self.counters.increment(CounterEvent::DataInconsistency);
                ReplyIssue::error(
                    status::SERVER_ERROR,
                    codes::NO_BLOB_PROPS,
                    format!(
                        "no properties for derived blob {}",
                        ctx.blob_id
                    ),
                )
            }
        };
        self.report_prop_issue(ctx, issue, sink);
    }

    /// Fold an issue into the properties item of a blob.
    pub fn report_prop_issue(
        &self,
        ctx: &BlobCtx,
        issue: ReplyIssue,
        sink: &mut PlanSink<'_>,
    ) {
        raise_status(sink.status, issue.status);
        sink.framer.message(ctx.prop_item, ItemType::BlobProp, &issue);
        sink.framer.item_complete(ctx.prop_item, ItemType::BlobProp);
    }

    /// A locator-level failure before any item-producing read existed.
    fn report_bad_locator(
        &self,
        origin: LocatorOrigin,
        mut issue: ReplyIssue,
        sink: &mut PlanSink<'_>,
    ) {
        match origin {
            LocatorOrigin::Client => {
                self.counters.increment(CounterEvent::MalformedRequest);
                issue.status = status::BAD_REQUEST;
            }
            LocatorOrigin::Derived => {
                self.counters.increment(CounterEvent::DataInconsistency);
            }
        }
        raise_status(sink.status, issue.status);
        let item = sink.framer.new_item();
        sink.framer.message(item, ItemType::Blob, &issue);
        sink.framer.item_complete(item, ItemType::Blob);
    }
}
