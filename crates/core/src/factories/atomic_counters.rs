//! The atomic counter store implementation provided by SeqGate.

use futures::future::BoxFuture;
use seqgate_api::builder::Builder;
use seqgate_api::config::Config;
use seqgate_api::counters::{
    CounterEvent, Counters, CountersFactory, DynCounters, DynCountersFactory,
};
use seqgate_api::SgResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The atomic counter store implementation provided by SeqGate.
#[derive(Debug)]
pub struct AtomicCountersFactory {}

impl AtomicCountersFactory {
    /// Construct a new AtomicCountersFactory.
    pub fn create() -> DynCountersFactory {
        Arc::new(AtomicCountersFactory {})
    }
}

impl CountersFactory for AtomicCountersFactory {
    fn default_config(&self, _config: &mut Config) -> SgResult<()> {
        Ok(())
    }

    fn create(
        &self,
        _builder: Arc<Builder>,
    ) -> BoxFuture<'static, SgResult<DynCounters>> {
        Box::pin(async move {
            let out: DynCounters = AtomicCounters::create();
            Ok(out)
        })
    }
}

/// A fixed array of relaxed atomics, one per [CounterEvent].
#[derive(Debug, Default)]
pub struct AtomicCounters {
    counts: [AtomicU64; CounterEvent::ALL.len()],
}

impl AtomicCounters {
    /// Construct a new AtomicCounters store.
    pub fn create() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The current count of one event.
    pub fn get(&self, event: CounterEvent) -> u64 {
        self.counts[event.index()].load(Ordering::Relaxed)
    }

    /// All counts as (name, value) pairs, for export surfaces.
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        CounterEvent::ALL
            .iter()
            .map(|ev| (ev.name(), self.get(*ev)))
            .collect()
    }
}

impl Counters for AtomicCounters {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn increment(&self, event: CounterEvent) {
        self.counts[event.index()].fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn increments_are_isolated_per_event() {
        let c = AtomicCounters::create();
        c.increment(CounterEvent::CacheHit);
        c.increment(CounterEvent::CacheHit);
        c.increment(CounterEvent::NotFound);
        assert_eq!(2, c.get(CounterEvent::CacheHit));
        assert_eq!(1, c.get(CounterEvent::NotFound));
        assert_eq!(0, c.get(CounterEvent::Cancelled));
    }

    #[test]
    fn snapshot_covers_every_event() {
        let c = AtomicCounters::create();
        assert_eq!(CounterEvent::ALL.len(), c.snapshot().len());
    }

    #[test]
    fn downcast_through_the_port() {
        let c: DynCounters = AtomicCounters::create();
        c.increment(CounterEvent::DbTimeout);
        let concrete = c
            .as_any()
            .downcast_ref::<AtomicCounters>()
            .expect("should downcast");
        assert_eq!(1, concrete.get(CounterEvent::DbTimeout));
    }
}
