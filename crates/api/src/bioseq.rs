//! Bioseq identity types and the result of identifier resolution.

use crate::protocol::ReplyIssue;
use crate::BlobId;

/// The full bioseq record an identifier resolves to.
///
/// This is the unit stored in the cache tier under
/// (accession, version, seq_id_type) and in the database tier's bioseq
/// table; `sat`/`sat_key` locate the sequence blob itself.
#[derive(
    Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, Default,
)]
pub struct BioseqInfo {
    /// Normalized accession, without version.
    pub accession: String,
    /// Accession version.
    pub version: i16,
    /// Sequence id type.
    pub seq_id_type: i16,
    /// Molecule type.
    pub mol: i8,
    /// Sequence length.
    pub length: i64,
    /// Sequence state.
    pub state: i8,
    /// Taxonomy id.
    pub tax_id: i32,
    /// Sequence hash.
    pub hash: i32,
    /// Last-changed timestamp, milliseconds since the epoch.
    pub date_changed: i64,
    /// Satellite id of the sequence blob, negative when there is none.
    pub sat: i32,
    /// Satellite key of the sequence blob, negative when there is none.
    pub sat_key: i32,
    /// Equivalent secondary spellings as (seq_id_type, seq_id) pairs.
    pub seq_ids: Vec<(i16, String)>,
}

impl BioseqInfo {
    /// Storage locator of the sequence blob described by this record.
    pub fn locator(&self) -> BlobId {
        BlobId::new(self.sat, self.sat_key)
    }
}

/// The key fields a secondary-id lookup yields; they identify a full
/// [BioseqInfo] record without carrying its body.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SecondaryIdRecord {
    /// Normalized accession of the primary record.
    pub accession: String,
    /// Version of the primary record.
    pub version: i16,
    /// Sequence id type of the primary record.
    pub seq_id_type: i16,
}

/// How (and whether) an identifier was resolved.
///
/// Exactly one tag applies to any finished resolution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// The identifier did not resolve anywhere it was allowed to be
    /// looked for.
    NotResolved,
    /// Resolved via a secondary-id hit in the cache tier.
    FromCacheSecondary,
    /// Resolved via a secondary-id hit in the database tier.
    FromDbSecondary,
    /// Resolved via a direct full-record hit in the cache tier.
    FromCachePrimary,
    /// Resolved via a direct full-record hit in the database tier.
    FromDbPrimary,
    /// An asynchronous database read is in flight; the attempt will be
    /// resumed when it delivers.
    PostponedForDb,
    /// The attempt degraded to an error (cache failure, database error,
    /// or a key that could not be promoted to a full record).
    Error,
}

/// Result of one identifier resolution attempt.
#[derive(Debug, Clone)]
pub struct BioseqResolution {
    /// The outcome tag.
    pub outcome: ResolutionOutcome,
    /// The resolved record, present for the four resolved outcomes.
    pub info: Option<BioseqInfo>,
    /// The raw serialized payload the cache tier stored for this record,
    /// retained for zero-copy passthrough to clients asking for the
    /// stored encoding.
    pub raw: Option<bytes::Bytes>,
    /// The issue to report when the outcome is [ResolutionOutcome::Error].
    pub issue: Option<ReplyIssue>,
}

impl BioseqResolution {
    /// An unresolved result.
    pub fn not_resolved() -> Self {
        Self {
            outcome: ResolutionOutcome::NotResolved,
            info: None,
            raw: None,
            issue: None,
        }
    }

    /// A resolved result.
    pub fn resolved(
        outcome: ResolutionOutcome,
        info: BioseqInfo,
        raw: Option<bytes::Bytes>,
    ) -> Self {
        Self {
            outcome,
            info: Some(info),
            raw,
            issue: None,
        }
    }

    /// A degraded-to-error result.
    pub fn failed(issue: ReplyIssue) -> Self {
        Self {
            outcome: ResolutionOutcome::Error,
            info: None,
            raw: None,
            issue: Some(issue),
        }
    }

    /// True iff a record was resolved.
    pub fn is_resolved(&self) -> bool {
        self.info.is_some()
    }
}
