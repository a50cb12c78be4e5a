//! Tracking of outstanding asynchronous sub-fetches.
//!
//! A [FetchHandle] is the uniform wrapper around one outstanding read
//! against the database tier. The owning pipeline submits it, polls it
//! whenever the transport or a timer says to, and cancels it when the
//! request goes away. Deliveries from the underlying loader land in an
//! event sink shared with its callbacks, so the loader may complete on any
//! thread while events are only ever consumed on the owning thread.

use crate::pipeline::ResumePoint;
use crate::plan::{BlobCtx, PlanParams};
use crate::resolve::ResolveStage;
use seqgate_api::db::{DbError, DbQuery, DbRecord, QueryCallbacks};
use seqgate_api::{BlobId, SgResult};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// The kind of sub-fetch a handle drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchKind {
    /// Blob properties or body chunks.
    Blob,
    /// A full bioseq record.
    BioseqInfo,
    /// Secondary-id key fields.
    SecondaryId,
    /// Named-annotation records.
    NamedAnnot,
}

/// What the pipeline should do with a handle's deliveries.
#[derive(Debug, Clone)]
pub(crate) enum FetchPurpose {
    /// An identifier-resolution read; completion resumes the request at
    /// the recorded interrupt point.
    Resolution {
        point: ResumePoint,
        stage: ResolveStage,
    },
    /// A blob-properties read; arrival continues blob planning.
    BlobProps { ctx: BlobCtx, params: PlanParams },
    /// A blob body chunk stream feeding one reply item.
    BlobChunks { blob_id: BlobId, data_item: u64 },
    /// A named-annotation record stream.
    NamedAnnot,
}

/// One delivery drained from a handle.
#[derive(Debug)]
pub(crate) enum FetchEvent {
    Record(DbRecord),
    Error(DbError),
}

#[derive(Debug, Default)]
struct SinkInner {
    events: Mutex<VecDeque<FetchEvent>>,
    ready: AtomicBool,
}

/// The queue a loader's callbacks deliver into.
#[derive(Debug, Clone, Default)]
struct EventSink {
    inner: Arc<SinkInner>,
}

impl EventSink {
    fn push(&self, ev: FetchEvent) {
        self.inner.events.lock().unwrap().push_back(ev);
        self.inner.ready.store(true, Ordering::SeqCst);
    }

    fn mark_ready(&self) {
        self.inner.ready.store(true, Ordering::SeqCst);
    }

    fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::SeqCst)
    }

    fn drain(&self) -> Vec<FetchEvent> {
        self.inner.ready.store(false, Ordering::SeqCst);
        self.inner.events.lock().unwrap().drain(..).collect()
    }
}

/// One outstanding sub-fetch owned by a request.
#[derive(Debug)]
pub(crate) struct FetchHandle {
    kind: FetchKind,
    purpose: FetchPurpose,
    query: Box<dyn DbQuery>,
    sink: EventSink,
    finished: bool,
    cancel_requested: bool,
}

impl FetchHandle {
    pub fn new(
        kind: FetchKind,
        purpose: FetchPurpose,
        query: Box<dyn DbQuery>,
    ) -> Self {
        Self {
            kind,
            purpose,
            query,
            sink: EventSink::default(),
            finished: false,
            cancel_requested: false,
        }
    }

    /// Attach sink-routing callbacks to the loader and start it.
    pub fn submit(&mut self) -> SgResult<()> {
        let record_sink = self.sink.clone();
        let error_sink = self.sink.clone();
        let ready_sink = self.sink.clone();
        self.query.submit(QueryCallbacks {
            on_record: Box::new(move |r| {
                record_sink.push(FetchEvent::Record(r))
            }),
            on_error: Box::new(move |e| error_sink.push(FetchEvent::Error(e))),
            on_ready: Box::new(move || ready_sink.mark_ready()),
        })
    }

    /// True iff the loader signalled that polling is worthwhile.
    pub fn is_ready(&self) -> bool {
        self.sink.is_ready()
    }

    /// Poll the loader and drain whatever it delivered.
    ///
    /// After a cancel the drain still runs, so a terminal delivery that
    /// raced the cancel is consumed rather than left dangling, but nothing
    /// is handed to the caller and the handle counts as finished.
    pub fn poll(&mut self) -> Vec<FetchEvent> {
        if self.finished {
            return Vec::new();
        }
        self.query.poll();
        let events = self.sink.drain();
        if self.cancel_requested {
            self.finished = true;
            return Vec::new();
        }
        events
    }

    /// Ask the loader to stop and detach its callbacks. Safe to call
    /// multiple times; only the first call reaches the loader.
    pub fn cancel(&mut self) {
        if self.finished || self.cancel_requested {
            return;
        }
        self.query.cancel();
        self.cancel_requested = true;
    }

    pub fn purpose(&self) -> &FetchPurpose {
        &self.purpose
    }

    pub fn kind(&self) -> FetchKind {
        self.kind
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn mark_finished(&mut self) {
        self.finished = true;
    }
}
