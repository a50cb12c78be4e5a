//! Named-annotation record types.

use crate::BlobId;

/// One named annotation attached to a resolved bioseq.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NamedAnnotRecord {
    /// The annotation name, e.g. a track name.
    pub annot_name: String,
    /// Satellite id of the annotation blob.
    pub sat: i32,
    /// Satellite key of the annotation blob.
    pub sat_key: i32,
    /// Last-modified timestamp, milliseconds since the epoch.
    pub last_modified: i64,
    /// First sequence position the annotation covers.
    pub start: i64,
    /// Last sequence position the annotation covers.
    pub stop: i64,
}

impl NamedAnnotRecord {
    /// Storage locator of the annotation blob.
    pub fn locator(&self) -> BlobId {
        BlobId::new(self.sat, self.sat_key)
    }
}
