//! Client request types.
//!
//! A [Request] is immutable after creation and exclusively owned by the
//! pipeline driving it for the whole of its lifetime.

use crate::BlobId;

/// Which storage tiers a request allows.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum CacheUse {
    /// Only the local cache tier may be consulted.
    CacheOnly,
    /// Only the database tier may be consulted.
    DbOnly,
    /// Cache first, database on miss.
    #[default]
    CacheAndDb,
}

impl CacheUse {
    /// True iff the cache tier may be consulted.
    pub fn allows_cache(&self) -> bool {
        !matches!(self, CacheUse::DbOnly)
    }

    /// True iff the database tier may be consulted.
    pub fn allows_db(&self) -> bool {
        !matches!(self, CacheUse::CacheOnly)
    }
}

/// Retrieval depth selector for (possibly split) stored objects.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum TseOption {
    /// Properties only, never any data.
    None,
    /// The split "info" blob when the object is split, nothing otherwise.
    Slim,
    /// The split "info" blob when the object is split, the original blob's
    /// data otherwise.
    #[default]
    Smart,
    /// The split "info" blob plus every numbered chunk blob when the object
    /// is split, the original blob's data otherwise.
    Whole,
    /// Always the original blob's data, ignoring any split descriptor.
    Orig,
}

/// Output encoding for resolved records.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum OutputFormat {
    /// JSON rendering of the record.
    #[default]
    Json,
    /// The stored binary encoding, passed through unmodified.
    Protobuf,
}

/// Resolve an identifier to its bioseq record.
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    /// The identifier to resolve.
    pub seq_id: String,
    /// Optional seq-id-type hint.
    pub seq_id_type: Option<i16>,
    /// Tier policy.
    pub cache_use: CacheUse,
    /// Output encoding for the resolved record.
    pub output_format: OutputFormat,
}

/// Fetch a sequence blob starting from an identifier.
#[derive(Debug, Clone)]
pub struct BlobBySeqIdRequest {
    /// The identifier to resolve to a locator.
    pub seq_id: String,
    /// Optional seq-id-type hint.
    pub seq_id_type: Option<i16>,
    /// Tier policy.
    pub cache_use: CacheUse,
    /// Retrieval depth.
    pub tse: TseOption,
    /// Locators the client already holds; hits produce a skipped
    /// notification instead of a fetch.
    pub exclude_blobs: Vec<BlobId>,
    /// When set, blob data is only sent for blobs at most this many bytes;
    /// larger blobs deliver properties only.
    pub send_blob_if_small: Option<u64>,
}

/// Fetch a sequence blob by an explicit client-supplied locator.
#[derive(Debug, Clone)]
pub struct BlobByIdRequest {
    /// The locator in its external `"<sat>.<sat_key>"` form, parsed (and
    /// rejected) by the pipeline rather than at construction so that a
    /// malformed value still produces a well-formed framed reply.
    pub blob_id: String,
    /// Tier policy.
    pub cache_use: CacheUse,
    /// Retrieval depth.
    pub tse: TseOption,
    /// Locators the client already holds.
    pub exclude_blobs: Vec<BlobId>,
    /// Size gate for blob data, see [BlobBySeqIdRequest::send_blob_if_small].
    pub send_blob_if_small: Option<u64>,
}

/// Fetch named annotations for an identifier.
#[derive(Debug, Clone)]
pub struct AnnotationRequest {
    /// The identifier to resolve.
    pub seq_id: String,
    /// Optional seq-id-type hint.
    pub seq_id_type: Option<i16>,
    /// Tier policy for the resolution step.
    pub cache_use: CacheUse,
    /// Annotation names to return; empty means all.
    pub names: Vec<String>,
}

/// One client request.
#[derive(Debug, Clone)]
pub enum Request {
    /// Resolve an identifier.
    Resolve(ResolveRequest),
    /// Fetch a blob by identifier.
    BlobBySeqId(BlobBySeqIdRequest),
    /// Fetch a blob by locator.
    BlobById(BlobByIdRequest),
    /// Fetch named annotations.
    Annotation(AnnotationRequest),
}

/// Discriminant of [Request], used for dispatch and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// [Request::Resolve].
    Resolve,
    /// [Request::BlobBySeqId].
    BlobBySeqId,
    /// [Request::BlobById].
    BlobById,
    /// [Request::Annotation].
    Annotation,
}

impl Request {
    /// The discriminant of this request.
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::Resolve(_) => RequestKind::Resolve,
            Request::BlobBySeqId(_) => RequestKind::BlobBySeqId,
            Request::BlobById(_) => RequestKind::BlobById,
            Request::Annotation(_) => RequestKind::Annotation,
        }
    }

    /// The tier policy of this request.
    pub fn cache_use(&self) -> CacheUse {
        match self {
            Request::Resolve(r) => r.cache_use,
            Request::BlobBySeqId(r) => r.cache_use,
            Request::BlobById(r) => r.cache_use,
            Request::Annotation(r) => r.cache_use,
        }
    }

    /// Whether the framed reply may be flushed to the transport before all
    /// sub-fetches finish. Blob data streams; resolution and annotation
    /// results are delivered atomically.
    pub fn streams(&self) -> bool {
        matches!(self, Request::BlobBySeqId(_) | Request::BlobById(_))
    }
}
