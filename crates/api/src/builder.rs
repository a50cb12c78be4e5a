//! Builder-related types.

use crate::*;
use std::sync::Arc;

/// The general SeqGate builder.
/// This contains both configuration and factory instances,
/// allowing construction of a runtime gateway instance.
#[derive(Debug)]
pub struct Builder {
    /// The module configuration to be used when building modules.
    /// This can be loaded from disk or modified before freezing the builder.
    pub config: config::Config,

    /// The [cache::CacheStoreFactory] to be used for creating the
    /// cache tier instance.
    pub cache: cache::DynCacheStoreFactory,

    /// The [db::DbClientFactory] to be used for creating the
    /// database tier instance.
    pub db: db::DynDbClientFactory,

    /// The [counters::CountersFactory] to be used for creating the
    /// counter store.
    pub counters: counters::DynCountersFactory,
}

impl Builder {
    /// Construct a default config given the configured module factories.
    /// Note, this should be called before freezing the Builder instance
    /// in an Arc<>.
    pub fn set_default_config(&mut self) -> SgResult<()> {
        let Self {
            config,
            cache,
            db,
            counters,
        } = self;

        cache.default_config(config)?;
        db.default_config(config)?;
        counters.default_config(config)?;

        Ok(())
    }

    /// Freeze the builder so module factories can be invoked against it.
    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }
}
