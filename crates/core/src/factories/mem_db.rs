//! The mem database client implementation provided by SeqGate.
//!
//! Reads resolve against seeded in-memory tables. By default a read
//! delivers on its first poll after submission, which keeps unit tests
//! synchronous and deterministic; with [MemDb::set_delay] the delivery
//! happens from a spawned task after the delay instead, exercising the
//! cross-thread callback path the way a real cluster driver would
//! (the delayed mode therefore needs a tokio runtime).
//!
//! Failures are scripted per read kind or per blob, and every submission
//! and cancel is counted so tests can assert tier ordering and clean
//! cancellation.

use futures::future::BoxFuture;
use seqgate_api::builder::Builder;
use seqgate_api::config::Config;
use seqgate_api::db::{
    DbClient, DbClientFactory, DbError, DbQuery, DbRecord, DynDbClient,
    DynDbClientFactory, QueryCallbacks,
};
use seqgate_api::{
    BioseqInfo, BlobId, BlobProps, NamedAnnotRecord, SecondaryIdRecord,
    SgResult,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[cfg(test)]
mod test;

/// The mem database client implementation provided by SeqGate.
#[derive(Debug)]
pub struct MemDbFactory {
    instance: Mutex<Option<Arc<MemDb>>>,
}

impl MemDbFactory {
    /// Construct a new MemDbFactory creating an empty client.
    pub fn create() -> DynDbClientFactory {
        Arc::new(MemDbFactory {
            instance: Mutex::new(None),
        })
    }

    /// Construct a MemDbFactory handing out a pre-seeded client.
    pub fn with_instance(db: Arc<MemDb>) -> DynDbClientFactory {
        Arc::new(MemDbFactory {
            instance: Mutex::new(Some(db)),
        })
    }
}

impl DbClientFactory for MemDbFactory {
    fn default_config(&self, _config: &mut Config) -> SgResult<()> {
        Ok(())
    }

    fn create(
        &self,
        _builder: Arc<Builder>,
    ) -> BoxFuture<'static, SgResult<DynDbClient>> {
        let out: DynDbClient = self
            .instance
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(MemDb::create);
        Box::pin(async move { Ok(out) })
    }
}

/// The read kinds the client serves, for failure scripting and call
/// counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbOp {
    /// Secondary-id key lookups.
    SecondaryId,
    /// Full bioseq record lookups.
    BioseqInfo,
    /// Blob property lookups.
    BlobProps,
    /// Blob body chunk streams.
    BlobChunks,
    /// Named-annotation streams.
    NamedAnnot,
}

#[derive(Debug, Clone)]
enum QuerySpec {
    SecondaryId { sec_seq_id: String },
    BioseqInfo {
        accession: String,
        version: Option<i16>,
        seq_id_type: Option<i16>,
    },
    BlobProps { blob_id: BlobId },
    BlobChunks { blob_id: BlobId },
    NamedAnnot {
        accession: String,
        names: Vec<String>,
    },
}

impl QuerySpec {
    fn op(&self) -> DbOp {
        match self {
            QuerySpec::SecondaryId { .. } => DbOp::SecondaryId,
            QuerySpec::BioseqInfo { .. } => DbOp::BioseqInfo,
            QuerySpec::BlobProps { .. } => DbOp::BlobProps,
            QuerySpec::BlobChunks { .. } => DbOp::BlobChunks,
            QuerySpec::NamedAnnot { .. } => DbOp::NamedAnnot,
        }
    }

    fn blob_id(&self) -> Option<BlobId> {
        match self {
            QuerySpec::BlobProps { blob_id }
            | QuerySpec::BlobChunks { blob_id } => Some(*blob_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
enum Step {
    Rec(DbRecord),
    Err(DbError),
}

#[derive(Debug, Default)]
struct MemDbInner {
    secondary: HashMap<String, SecondaryIdRecord>,
    bioseq: Vec<(BioseqInfo, bytes::Bytes)>,
    blob_props: HashMap<BlobId, BlobProps>,
    blob_chunks: HashMap<BlobId, Vec<bytes::Bytes>>,
    annots: HashMap<String, Vec<NamedAnnotRecord>>,
    op_errors: HashMap<DbOp, DbError>,
    blob_errors: HashMap<BlobId, DbError>,
    delay: Option<Duration>,
    calls: HashMap<DbOp, u64>,
    cancels: u64,
}

impl MemDbInner {
    fn script(&self, spec: &QuerySpec) -> Vec<Step> {
        let scripted_error = spec
            .blob_id()
            .and_then(|id| self.blob_errors.get(&id))
            .or_else(|| self.op_errors.get(&spec.op()))
            .cloned();
        if let Some(e) = scripted_error {
            // sub-error severities precede the normal result instead of
            // replacing it
            if e.severity
                < seqgate_api::protocol::Severity::Error
            {
                let mut out = vec![Step::Err(e)];
                out.extend(self.result_steps(spec));
                return out;
            }
            return vec![Step::Err(e)];
        }
        self.result_steps(spec)
    }

    fn result_steps(&self, spec: &QuerySpec) -> Vec<Step> {
        match spec {
            QuerySpec::SecondaryId { sec_seq_id } => {
                match self.secondary.get(sec_seq_id) {
                    Some(rec) => {
                        vec![Step::Rec(DbRecord::SecondaryId(rec.clone()))]
                    }
                    None => vec![Step::Rec(DbRecord::NotFound)],
                }
            }
            QuerySpec::BioseqInfo {
                accession,
                version,
                seq_id_type,
            } => {
                let best = self
                    .bioseq
                    .iter()
                    .filter(|(info, _)| {
                        info.accession == *accession
                            && version
                                .map(|v| info.version == v)
                                .unwrap_or(true)
                            && seq_id_type
                                .map(|t| info.seq_id_type == t)
                                .unwrap_or(true)
                    })
                    .max_by_key(|(info, _)| info.version);
                match best {
                    Some((info, raw)) => vec![Step::Rec(DbRecord::BioseqInfo {
                        info: info.clone(),
                        raw: raw.clone(),
                    })],
                    None => vec![Step::Rec(DbRecord::NotFound)],
                }
            }
            QuerySpec::BlobProps { blob_id } => {
                match self.blob_props.get(blob_id) {
                    Some(props) => {
                        vec![Step::Rec(DbRecord::BlobProps(props.clone()))]
                    }
                    None => vec![Step::Rec(DbRecord::NotFound)],
                }
            }
            QuerySpec::BlobChunks { blob_id } => {
                match self.blob_chunks.get(blob_id) {
                    Some(chunks) => {
                        let mut out: Vec<Step> = chunks
                            .iter()
                            .enumerate()
                            .map(|(i, data)| {
                                Step::Rec(DbRecord::BlobChunk {
                                    chunk_no: i as i32,
                                    data: data.clone(),
                                })
                            })
                            .collect();
                        out.push(Step::Rec(DbRecord::Complete));
                        out
                    }
                    None => vec![Step::Rec(DbRecord::NotFound)],
                }
            }
            QuerySpec::NamedAnnot { accession, names } => {
                let mut out: Vec<Step> = self
                    .annots
                    .get(accession)
                    .map(|records| {
                        records
                            .iter()
                            .filter(|r| {
                                names.is_empty()
                                    || names.contains(&r.annot_name)
                            })
                            .map(|r| {
                                Step::Rec(DbRecord::NamedAnnot(r.clone()))
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                out.push(Step::Rec(DbRecord::Complete));
                out
            }
        }
    }
}

/// An in-memory rendition of the asynchronous database tier.
#[derive(Debug, Default)]
pub struct MemDb {
    inner: Arc<Mutex<MemDbInner>>,
}

impl MemDb {
    /// Construct a new, empty MemDb.
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
        self.inner.lock().unwrap().bioseq.push((info, raw));
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

    /// Seed a blob's body chunks.
    pub fn insert_blob_chunks(
        &self,
        blob_id: BlobId,
        chunks: Vec<bytes::Bytes>,
    ) {
        self.inner.lock().unwrap().blob_chunks.insert(blob_id, chunks);
    }

    /// Seed a named annotation for an accession.
    pub fn insert_annot(
        &self,
        accession: impl Into<String>,
        rec: NamedAnnotRecord,
    ) {
        self.inner
            .lock()
            .unwrap()
            .annots
            .entry(accession.into())
            .or_default()
            .push(rec);
    }

    /// Script every read of one kind to deliver an error.
    pub fn set_op_error(&self, op: DbOp, error: DbError) {
        self.inner.lock().unwrap().op_errors.insert(op, error);
    }

    /// Script the property and chunk reads of one blob to deliver an
    /// error, leaving sibling blobs untouched.
    pub fn set_blob_error(&self, blob_id: BlobId, error: DbError) {
        self.inner.lock().unwrap().blob_errors.insert(blob_id, error);
    }

    /// Deliver from a spawned task after `delay` instead of on the first
    /// poll. Needs a tokio runtime.
    pub fn set_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().delay = Some(delay);
    }

    /// How many reads of one kind were submitted.
    pub fn call_count(&self, op: DbOp) -> u64 {
        *self.inner.lock().unwrap().calls.get(&op).unwrap_or(&0)
    }

    /// How many reads were submitted in total.
    pub fn total_calls(&self) -> u64 {
        self.inner.lock().unwrap().calls.values().sum()
    }

    /// How many cancels were received.
    pub fn cancel_count(&self) -> u64 {
        self.inner.lock().unwrap().cancels
    }

    fn query(&self, spec: QuerySpec) -> Box<dyn DbQuery> {
        Box::new(MemDbQuery {
            inner: self.inner.clone(),
            spec,
            slot: Arc::new(Mutex::new(None)),
            script: None,
            detached: false,
        })
    }
}

impl DbClient for MemDb {
    fn secondary_id_query(
        &self,
        sec_seq_id: &str,
        _sec_seq_id_type: Option<i16>,
    ) -> Box<dyn DbQuery> {
        self.query(QuerySpec::SecondaryId {
            sec_seq_id: sec_seq_id.into(),
        })
    }

    fn bioseq_info_query(
        &self,
        accession: &str,
        version: Option<i16>,
        seq_id_type: Option<i16>,
    ) -> Box<dyn DbQuery> {
        self.query(QuerySpec::BioseqInfo {
            accession: accession.into(),
            version,
            seq_id_type,
        })
    }

    fn blob_props_query(
        &self,
        _keyspace: &str,
        blob_id: BlobId,
    ) -> Box<dyn DbQuery> {
        self.query(QuerySpec::BlobProps { blob_id })
    }

    fn blob_chunks_query(
        &self,
        _keyspace: &str,
        blob_id: BlobId,
        _n_chunks: i32,
    ) -> Box<dyn DbQuery> {
        self.query(QuerySpec::BlobChunks { blob_id })
    }

    fn named_annot_query(
        &self,
        accession: &str,
        _version: i16,
        _seq_id_type: i16,
        names: &[String],
    ) -> Box<dyn DbQuery> {
        self.query(QuerySpec::NamedAnnot {
            accession: accession.into(),
            names: names.to_vec(),
        })
    }
}

fn fire(callbacks: &mut QueryCallbacks, script: Vec<Step>) {
    for step in script {
        match step {
            Step::Rec(rec) => (callbacks.on_record)(rec),
            Step::Err(e) => (callbacks.on_error)(e),
        }
    }
}

#[derive(Debug)]
struct MemDbQuery {
    inner: Arc<Mutex<MemDbInner>>,
    spec: QuerySpec,
    /// Callbacks live here between submit and delivery; cancel empties the
    /// slot, so nothing can be delivered afterwards.
    slot: Arc<Mutex<Option<QueryCallbacks>>>,
    script: Option<Vec<Step>>,
    detached: bool,
}

impl DbQuery for MemDbQuery {
    fn submit(&mut self, callbacks: QueryCallbacks) -> SgResult<()> {
        let (script, delay) = {
            let mut inner = self.inner.lock().unwrap();
            *inner.calls.entry(self.spec.op()).or_insert(0) += 1;
            (inner.script(&self.spec), inner.delay)
        };
        *self.slot.lock().unwrap() = Some(callbacks);

        match delay {
            None => {
                self.script = Some(script);
                if let Some(cbs) = self.slot.lock().unwrap().as_mut() {
                    (cbs.on_ready)();
                }
            }
            Some(delay) => {
                // delivery belongs to the task now; poll becomes a no-op
                self.detached = true;
                let slot = self.slot.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(mut cbs) = slot.lock().unwrap().take() {
                        fire(&mut cbs, script);
                    }
                });
            }
        }
        Ok(())
    }

    fn poll(&mut self) {
        if self.detached {
            return;
        }
        if let Some(script) = self.script.take() {
            if let Some(mut cbs) = self.slot.lock().unwrap().take() {
                fire(&mut cbs, script);
            }
        }
    }

    fn cancel(&mut self) {
        self.inner.lock().unwrap().cancels += 1;
        self.slot.lock().unwrap().take();
        self.script = None;
    }
}
