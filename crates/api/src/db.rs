//! The asynchronous database collaborator.
//!
//! One [DbQuery] is one logical read. The pipeline submits it with three
//! callbacks (record, error, ready), polls it cooperatively whenever the
//! transport or a timer says to, and cancels it when the request goes away.
//! Exactly one of the record-terminal/error deliveries ends a read; the
//! ready callback only signals that polling again is worthwhile, so owners
//! never busy-wait.
//!
//! Operation timeouts and retry counts live in the implementation's own
//! configuration; a timeout is delivered through the normal error callback.

use crate::{
    builder, config, protocol::Severity, BioseqInfo, BlobId, BlobProps,
    NamedAnnotRecord, SecondaryIdRecord, SgResult,
};
use futures::future::BoxFuture;
use std::sync::Arc;

/// One delivery on a query's record callback.
///
/// Single-record reads (secondary id, bioseq info, blob properties) deliver
/// exactly one of their record variant or [DbRecord::NotFound] and are then
/// finished. Streaming reads (blob chunks, named annotations) deliver any
/// number of their record variant followed by one [DbRecord::Complete] (or
/// [DbRecord::NotFound] when the stream's subject is absent entirely).
#[derive(Debug, Clone)]
pub enum DbRecord {
    /// Key fields for a secondary-id read.
    SecondaryId(SecondaryIdRecord),
    /// A full bioseq record plus its stored payload.
    BioseqInfo {
        /// The decoded record.
        info: BioseqInfo,
        /// The raw stored payload.
        raw: bytes::Bytes,
    },
    /// Blob properties.
    BlobProps(BlobProps),
    /// One blob body chunk.
    BlobChunk {
        /// 0-based chunk number.
        chunk_no: i32,
        /// The chunk payload.
        data: bytes::Bytes,
    },
    /// One named-annotation record.
    NamedAnnot(NamedAnnotRecord),
    /// Terminal: the subject of the read does not exist. A normal result,
    /// not an error.
    NotFound,
    /// Terminal: a streaming read delivered everything.
    Complete,
}

impl DbRecord {
    /// True iff this delivery ends the read.
    pub fn is_terminal(&self) -> bool {
        match self {
            DbRecord::NotFound | DbRecord::Complete => true,
            DbRecord::SecondaryId(_)
            | DbRecord::BioseqInfo { .. }
            | DbRecord::BlobProps(_) => true,
            DbRecord::BlobChunk { .. } | DbRecord::NamedAnnot(_) => false,
        }
    }
}

/// What went wrong with a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// The read exceeded the driver's operation timeout.
    Timeout,
    /// Anything else.
    Unknown,
}

/// An error delivered on a query's error callback.
///
/// Severities below [Severity::Error] are recorded by the owner but do not
/// end the read or fail the request.
#[derive(Debug, Clone)]
pub struct DbError {
    /// The error kind.
    pub kind: DbErrorKind,
    /// The severity.
    pub severity: Severity,
    /// Human-readable detail.
    pub message: String,
}

impl DbError {
    /// Construct an error-severity error.
    pub fn new(kind: DbErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

/// The callbacks a query is submitted with.
///
/// Implementations may invoke these from any thread; owners route them into
/// a queue drained on the owning thread's poll.
pub struct QueryCallbacks {
    /// Invoked for every record delivery.
    pub on_record: Box<dyn FnMut(DbRecord) + Send>,
    /// Invoked for error deliveries.
    pub on_error: Box<dyn FnMut(DbError) + Send>,
    /// Invoked when polling again is worthwhile.
    pub on_ready: Box<dyn FnMut() + Send>,
}

impl std::fmt::Debug for QueryCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("QueryCallbacks")
    }
}

/// One outstanding logical read against the database tier.
pub trait DbQuery: 'static + Send + std::fmt::Debug {
    /// Attach the callbacks and start the read. Non-blocking; must be
    /// called exactly once.
    fn submit(&mut self, callbacks: QueryCallbacks) -> SgResult<()>;

    /// Give the read a chance to deliver. A no-op on a finished or
    /// cancelled read.
    fn poll(&mut self);

    /// Detach the callbacks so nothing further is delivered, and ask the
    /// read to stop. Safe to call multiple times.
    fn cancel(&mut self);
}

/// Trait for implementing the database tier: a constructor per read kind.
pub trait DbClient: 'static + Send + Sync + std::fmt::Debug {
    /// A read of the key fields a secondary id maps to.
    fn secondary_id_query(
        &self,
        sec_seq_id: &str,
        sec_seq_id_type: Option<i16>,
    ) -> Box<dyn DbQuery>;

    /// A read of a full bioseq record by primary key fields.
    fn bioseq_info_query(
        &self,
        accession: &str,
        version: Option<i16>,
        seq_id_type: Option<i16>,
    ) -> Box<dyn DbQuery>;

    /// A read of blob properties.
    fn blob_props_query(
        &self,
        keyspace: &str,
        blob_id: BlobId,
    ) -> Box<dyn DbQuery>;

    /// A streaming read of a blob's body chunks.
    fn blob_chunks_query(
        &self,
        keyspace: &str,
        blob_id: BlobId,
        n_chunks: i32,
    ) -> Box<dyn DbQuery>;

    /// A streaming read of named-annotation records. An empty `names`
    /// filter returns all annotations for the bioseq.
    fn named_annot_query(
        &self,
        accession: &str,
        version: i16,
        seq_id_type: i16,
        names: &[String],
    ) -> Box<dyn DbQuery>;
}

/// Trait object [DbClient].
pub type DynDbClient = Arc<dyn DbClient>;

/// A factory for creating DbClient instances.
pub trait DbClientFactory: 'static + Send + Sync + std::fmt::Debug {
    /// Help the builder construct a default config from the chosen
    /// module factories.
    fn default_config(&self, config: &mut config::Config) -> SgResult<()>;

    /// Construct a DbClient instance.
    fn create(
        &self,
        builder: Arc<builder::Builder>,
    ) -> BoxFuture<'static, SgResult<DynDbClient>>;
}

/// Trait object [DbClientFactory].
pub type DynDbClientFactory = Arc<dyn DbClientFactory>;
