//! Types identifying and describing stored sequence blobs.

use crate::{SgError, SgResult};

/// The two-part storage locator of a blob: satellite id plus satellite key,
/// analogous to (table, row-key).
///
/// The external textual form is `"<sat>.<sat_key>"`. A locator is valid iff
/// both parts are non-negative.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct BlobId {
    /// The satellite id.
    pub sat: i32,
    /// The satellite key.
    pub sat_key: i32,
}

impl BlobId {
    /// Construct a locator from its parts.
    pub fn new(sat: i32, sat_key: i32) -> Self {
        Self { sat, sat_key }
    }

    /// True iff both parts are non-negative.
    pub fn is_valid(&self) -> bool {
        self.sat >= 0 && self.sat_key >= 0
    }

    /// Parse the external `"<sat>.<sat_key>"` form.
    ///
    /// Fails if either part is missing, non-numeric, or negative.
    pub fn parse(raw: &str) -> SgResult<Self> {
        let err = || SgError::other(format!("malformed blob id: {raw:?}"));
        let (sat, sat_key) = raw.split_once('.').ok_or_else(err)?;
        let sat: i32 = sat.parse().map_err(|_| err())?;
        let sat_key: i32 = sat_key.parse().map_err(|_| err())?;
        let out = Self { sat, sat_key };
        if !out.is_valid() {
            return Err(err());
        }
        Ok(out)
    }
}

impl std::fmt::Display for BlobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.sat, self.sat_key)
    }
}

/// Where a locator came from. Determines whether a failure around it is the
/// client's fault (4xx) or a server-side data inconsistency (5xx).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorOrigin {
    /// Supplied verbatim by the client.
    Client,
    /// Derived server-side, e.g. from identifier resolution or a split
    /// descriptor.
    Derived,
}

/// Properties of a stored blob.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BlobProps {
    /// The locator these properties belong to.
    pub blob_id: BlobId,
    /// Last-modified timestamp, milliseconds since the epoch.
    pub last_modified: i64,
    /// Total payload size in bytes.
    pub size: u64,
    /// Number of storage chunks the blob body is stored as.
    pub n_chunks: i32,
    /// Raw split descriptor (`"<sat>.<info>.<nchunks>[.<splitversion>]"`)
    /// when the blob is stored split, as found in the blob properties.
    pub id2_info: Option<String>,
}

/// Decoded split-blob descriptor.
///
/// A split object is stored as one "info" blob plus `n_chunks` numbered
/// chunk blobs, all in the satellite named by `sat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitInfo {
    /// Satellite holding the companion blobs.
    pub sat: i32,
    /// Satellite key of the "info" blob.
    pub info: i32,
    /// Number of numbered chunk blobs.
    pub n_chunks: i32,
    /// Optional split version.
    pub split_version: Option<i32>,
}

impl SplitInfo {
    /// Parse a `"<sat>.<info>.<nchunks>[.<splitversion>]"` descriptor.
    ///
    /// Parsing fails closed: any non-integer or non-positive field in the
    /// first three positions is an error. Descriptors only ever come out of
    /// otherwise-valid blob properties, so a failure here is a data
    /// inconsistency, not a user error.
    pub fn parse(raw: &str) -> SgResult<Self> {
        let err =
            || SgError::other(format!("malformed split descriptor: {raw:?}"));
        let mut parts = raw.split('.');
        let mut next_pos = || -> SgResult<i32> {
            let v: i32 =
                parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
            if v <= 0 {
                return Err(err());
            }
            Ok(v)
        };
        let sat = next_pos()?;
        let info = next_pos()?;
        let n_chunks = next_pos()?;
        let split_version = match parts.next() {
            None => None,
            Some(v) => Some(v.parse().map_err(|_| err())?),
        };
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(Self {
            sat,
            info,
            n_chunks,
            split_version,
        })
    }

    /// Locator of the companion "info" blob.
    pub fn info_blob_id(&self) -> BlobId {
        BlobId::new(self.sat, self.info)
    }

    /// Locator of numbered chunk blob `chunk_no` (1-based).
    ///
    /// Chunk keys precede the info key: chunk `k` lives at
    /// `info - n_chunks - 1 + k`.
    pub fn chunk_blob_id(&self, chunk_no: i32) -> BlobId {
        BlobId::new(self.sat, self.info - self.n_chunks - 1 + chunk_no)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn blob_id_parse_fixtures() {
        const OK: &[(&str, i32, i32)] =
            &[("4.12345", 4, 12345), ("0.0", 0, 0), ("25.1", 25, 1)];
        for (raw, sat, sat_key) in OK {
            let id = BlobId::parse(raw).unwrap();
            assert_eq!(*sat, id.sat);
            assert_eq!(*sat_key, id.sat_key);
            assert_eq!(*raw, id.to_string());
        }

        const BAD: &[&str] =
            &["", "4", "4.", ".5", "4.x", "x.5", "-1.5", "4.-5", "4.5.6"];
        for raw in BAD {
            assert!(BlobId::parse(raw).is_err(), "should reject {raw:?}");
        }
    }

    #[test]
    fn split_info_parse() {
        let s = SplitInfo::parse("5.1001.3").unwrap();
        assert_eq!(5, s.sat);
        assert_eq!(1001, s.info);
        assert_eq!(3, s.n_chunks);
        assert_eq!(None, s.split_version);
        assert_eq!(BlobId::new(5, 1001), s.info_blob_id());
        assert_eq!(BlobId::new(5, 998), s.chunk_blob_id(1));
        assert_eq!(BlobId::new(5, 999), s.chunk_blob_id(2));
        assert_eq!(BlobId::new(5, 1000), s.chunk_blob_id(3));

        let s = SplitInfo::parse("5.1001.3.7").unwrap();
        assert_eq!(Some(7), s.split_version);
    }

    #[test]
    fn split_info_fails_closed() {
        const BAD: &[&str] = &[
            "",
            "5",
            "5.1001",
            "0.5.3",
            "5.0.3",
            "5.1.0",
            "-5.1001.3",
            "5.-1.3",
            "5.1001.-3",
            "5.x.3",
            "5.1001.3.x",
            "5.1001.3.7.9",
        ];
        for raw in BAD {
            assert!(SplitInfo::parse(raw).is_err(), "should reject {raw:?}");
        }
    }
}
