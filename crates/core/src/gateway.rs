//! Gateway construction and request entry.

use crate::pipeline::RequestPipeline;
use crate::plan::{config::PlannerConfig, BlobFetchPlanner};
use crate::resolve::{config::ResolverConfig, TieredResolver};
use seqgate_api::builder::Builder;
use seqgate_api::cache::DynCacheStore;
use seqgate_api::counters::DynCounters;
use seqgate_api::db::DynDbClient;
use seqgate_api::transport::DynTransport;
use seqgate_api::{Request, SatMap, SgResult};
use std::sync::Arc;

/// Gateway-level configuration types.
pub mod config {
    /// Name of the satellite-map module config.
    pub const SAT_MAP_MOD_NAME: &str = "satMap";

    /// One satellite-to-keyspace mapping entry.
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct SatKeyspace {
        /// The satellite id.
        pub sat: i32,
        /// The keyspace its blobs live in.
        pub keyspace: String,
    }

    /// Configuration for the process-wide satellite map.
    #[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    #[serde(default)]
    pub struct SatMapConfig {
        /// The mapping entries. Later entries win on duplicates.
        pub satellites: Vec<SatKeyspace>,
    }

    impl seqgate_api::config::ModConfig for SatMapConfig {}
}

/// One gateway instance: the shared collaborators plus the resolver and
/// planner every request pipeline runs against.
///
/// A gateway is built once from a [Builder] and shared across all
/// event-loop contexts; pipelines it mints are each owned by exactly one.
#[derive(Debug)]
pub struct Gateway {
    cache: DynCacheStore,
    db: DynDbClient,
    counters: DynCounters,
    sat_map: Arc<SatMap>,
    resolver: TieredResolver,
    planner: BlobFetchPlanner,
}

impl Gateway {
    /// Contribute the gateway-level module defaults to a config template.
    pub fn default_config(
        config: &mut seqgate_api::config::Config,
    ) -> SgResult<()> {
        config.add_default_module_config::<ResolverConfig>(
            crate::resolve::config::MOD_NAME.into(),
        )?;
        config.add_default_module_config::<PlannerConfig>(
            crate::plan::config::MOD_NAME.into(),
        )?;
        config.add_default_module_config::<config::SatMapConfig>(
            config::SAT_MAP_MOD_NAME.into(),
        )?;
        Ok(())
    }

    /// Build a gateway from a frozen builder.
    pub async fn create(builder: Arc<Builder>) -> SgResult<Arc<Gateway>> {
        let cache = builder.cache.create(builder.clone()).await?;
        let db = builder.db.create(builder.clone()).await?;
        let counters = builder.counters.create(builder.clone()).await?;

        let sat_cfg: config::SatMapConfig = builder
            .config
            .get_module_config(config::SAT_MAP_MOD_NAME)?;
        let sat_map = Arc::new(SatMap::from_pairs(
            sat_cfg
                .satellites
                .iter()
                .map(|e| (e.sat, e.keyspace.as_str())),
        ));
        let resolver_cfg: ResolverConfig = builder
            .config
            .get_module_config(crate::resolve::config::MOD_NAME)?;
        let planner_cfg: PlannerConfig = builder
            .config
            .get_module_config(crate::plan::config::MOD_NAME)?;

        let resolver = TieredResolver::new(
            cache.clone(),
            db.clone(),
            counters.clone(),
            resolver_cfg,
        );
        let planner = BlobFetchPlanner::new(
            cache.clone(),
            db.clone(),
            counters.clone(),
            sat_map.clone(),
            planner_cfg,
        );

        Ok(Arc::new(Self {
            cache,
            db,
            counters,
            sat_map,
            resolver,
            planner,
        }))
    }

    /// Mint the pipeline for one request. The caller owns driving it:
    /// `start()` once, then `peek()` on readiness or timer signals, and it
    /// should register a transport wake that schedules a `peek`.
    pub fn new_pipeline(
        gateway: &Arc<Gateway>,
        request: Request,
        transport: DynTransport,
    ) -> RequestPipeline {
        RequestPipeline::new(gateway.clone(), request, transport)
    }

    /// The counter store, for export surfaces.
    pub fn counters(&self) -> &DynCounters {
        &self.counters
    }

    /// The cache tier instance.
    pub fn cache(&self) -> &DynCacheStore {
        &self.cache
    }

    /// The satellite-to-keyspace table.
    pub fn sat_map(&self) -> &Arc<SatMap> {
        &self.sat_map
    }

    pub(crate) fn resolver(&self) -> &TieredResolver {
        &self.resolver
    }

    pub(crate) fn planner(&self) -> &BlobFetchPlanner {
        &self.planner
    }

    pub(crate) fn db(&self) -> &DynDbClient {
        &self.db
    }
}
