//! The wire reply protocol.
//!
//! A reply is an ordered stream of framed chunks. Every chunk starts with a
//! fixed marker followed by `key=value` pairs joined by `&` and a newline;
//! chunks carrying a payload state its length in a `size` pair and append
//! the payload plus a trailing newline. Item id 0 is reserved for
//! reply-level chunks.
//!
//! This module only encodes single chunks; the accounting that makes a
//! whole reply self-terminating (per-item and reply-level completion
//! counts) lives with the framer in seqgate_core.

use bytes::{BufMut, BytesMut};

/// The marker every reply chunk starts with.
pub const CHUNK_MARKER: &str = "SG-Reply-Chunk: ";

/// The reserved item id for reply-level chunks.
pub const REPLY_ITEM_ID: u64 = 0;

/// What a chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    /// A resolved bioseq record.
    BioseqInfo,
    /// Blob properties.
    BlobProp,
    /// Blob data.
    Blob,
    /// A named-annotation record.
    NamedAnnot,
    /// The reply itself.
    Reply,
}

impl ItemType {
    /// The wire name of this item type.
    pub fn wire_name(&self) -> &'static str {
        match self {
            ItemType::BioseqInfo => "bioseq_info",
            ItemType::BlobProp => "blob_prop",
            ItemType::Blob => "blob",
            ItemType::NamedAnnot => "na",
            ItemType::Reply => "reply",
        }
    }
}

/// What role a chunk plays within its item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkType {
    /// Payload-bearing data.
    Data,
    /// Completion accounting.
    Meta,
    /// An error or warning folded into the stream.
    Message,
}

impl ChunkType {
    /// The wire name of this chunk type.
    pub fn wire_name(&self) -> &'static str {
        match self {
            ChunkType::Data => "data",
            ChunkType::Meta => "meta",
            ChunkType::Message => "message",
        }
    }
}

/// Severity of a message chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational, never affects the request status.
    Info,
    /// Worth surfacing, does not fail anything.
    Warning,
    /// Failed the item (or the request) it is attached to.
    Error,
}

impl Severity {
    /// The wire name of this severity.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// Reply status values, HTTP-class.
pub mod status {
    /// Everything delivered.
    pub const OK: u16 = 200;
    /// Malformed client input.
    pub const BAD_REQUEST: u16 = 400;
    /// A client-asserted thing does not exist.
    pub const NOT_FOUND: u16 = 404;
    /// Server-side failure, including data inconsistencies.
    pub const SERVER_ERROR: u16 = 500;
    /// Last-resort malfunction at the request boundary.
    pub const MALFUNCTION: u16 = 503;
}

/// Fine-grained message codes carried next to the status.
pub mod codes {
    /// A request parameter did not parse.
    pub const MALFORMED_PARAMETER: u32 = 100;
    /// The identifier did not resolve.
    pub const UNRESOLVED_SEQ_ID: u32 = 200;
    /// Blob properties were not found.
    pub const NO_BLOB_PROPS: u32 = 201;
    /// A blob was skipped because the client already holds it.
    pub const EXCLUDED_BLOB: u32 = 202;
    /// A split descriptor found in blob properties did not decode.
    pub const BAD_SPLIT_INFO: u32 = 300;
    /// A secondary-id key existed but no full record backs it.
    pub const NO_RECORD_FOR_KEY: u32 = 301;
    /// A satellite id has no keyspace mapping.
    pub const UNKNOWN_SATELLITE: u32 = 302;
    /// A blob body chunk was missing from storage.
    pub const MISSING_BLOB_CHUNK: u32 = 303;
    /// The database tier timed out.
    pub const DB_TIMEOUT: u32 = 400;
    /// The database tier failed for an unknown reason.
    pub const DB_ERROR: u32 = 401;
    /// The cache tier failed (distinct from a miss).
    pub const CACHE_ERROR: u32 = 402;
    /// Catch-all for the request-boundary malfunction guard.
    pub const MALFUNCTION: u32 = 503;
}

/// An error or warning to be folded into the reply as a message chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyIssue {
    /// HTTP-class status, see [status].
    pub status: u16,
    /// Fine-grained code, see [codes].
    pub code: u32,
    /// Severity.
    pub severity: Severity,
    /// Human-readable text, sent as the chunk payload.
    pub message: String,
}

impl ReplyIssue {
    /// Construct an error-severity issue.
    pub fn error(status: u16, code: u32, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            severity: Severity::Error,
            message: message.into(),
        }
    }

    /// Construct an info-severity issue.
    pub fn info(code: u32, message: impl Into<String>) -> Self {
        Self {
            status: status::OK,
            code,
            severity: Severity::Info,
            message: message.into(),
        }
    }
}

fn put_header_start(
    out: &mut BytesMut,
    item_id: u64,
    item_type: ItemType,
    chunk_type: ChunkType,
) {
    out.put_slice(CHUNK_MARKER.as_bytes());
    out.put_slice(
        format!(
            "item_id={}&item_type={}&chunk_type={}",
            item_id,
            item_type.wire_name(),
            chunk_type.wire_name()
        )
        .as_bytes(),
    );
}

fn put_payload(out: &mut BytesMut, payload: &[u8]) {
    out.put_slice(format!("&size={}\n", payload.len()).as_bytes());
    out.put_slice(payload);
    out.put_u8(b'\n');
}

/// Encode one data chunk. `extra` pairs land between the fixed triple and
/// the trailing `size` pair, in the order given.
pub fn encode_data_chunk(
    out: &mut BytesMut,
    item_id: u64,
    item_type: ItemType,
    extra: &[(&str, String)],
    payload: &[u8],
) {
    put_header_start(out, item_id, item_type, ChunkType::Data);
    for (k, v) in extra {
        out.put_slice(format!("&{k}={v}").as_bytes());
    }
    put_payload(out, payload);
}

/// Encode one completion (meta) chunk stating how many chunks, including
/// this one, belong to the item.
pub fn encode_meta_chunk(
    out: &mut BytesMut,
    item_id: u64,
    item_type: ItemType,
    n_chunks: u64,
) {
    put_header_start(out, item_id, item_type, ChunkType::Meta);
    out.put_slice(format!("&n_chunks={n_chunks}\n").as_bytes());
}

/// Encode one message chunk carrying an issue.
pub fn encode_message_chunk(
    out: &mut BytesMut,
    item_id: u64,
    item_type: ItemType,
    issue: &ReplyIssue,
) {
    put_header_start(out, item_id, item_type, ChunkType::Message);
    out.put_slice(
        format!(
            "&status={}&code={}&severity={}",
            issue.status,
            issue.code,
            issue.severity.wire_name()
        )
        .as_bytes(),
    );
    put_payload(out, issue.message.as_bytes());
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn data_chunk_fixture() {
        let mut out = BytesMut::new();
        encode_data_chunk(
            &mut out,
            3,
            ItemType::Blob,
            &[("blob_id", "4.77".into()), ("blob_chunk", "0".into())],
            b"PAYLOAD",
        );
        assert_eq!(
            "SG-Reply-Chunk: item_id=3&item_type=blob&chunk_type=data\
             &blob_id=4.77&blob_chunk=0&size=7\nPAYLOAD\n",
            String::from_utf8(out.to_vec()).unwrap(),
        );
    }

    #[test]
    fn meta_chunk_fixture() {
        let mut out = BytesMut::new();
        encode_meta_chunk(&mut out, REPLY_ITEM_ID, ItemType::Reply, 5);
        assert_eq!(
            "SG-Reply-Chunk: item_id=0&item_type=reply&chunk_type=meta\
             &n_chunks=5\n",
            String::from_utf8(out.to_vec()).unwrap(),
        );
    }

    #[test]
    fn message_chunk_fixture() {
        let mut out = BytesMut::new();
        encode_message_chunk(
            &mut out,
            2,
            ItemType::BlobProp,
            &ReplyIssue::error(
                status::NOT_FOUND,
                codes::NO_BLOB_PROPS,
                "no props for 4.77",
            ),
        );
        assert_eq!(
            "SG-Reply-Chunk: item_id=2&item_type=blob_prop&chunk_type=message\
             &status=404&code=201&severity=error&size=17\nno props for 4.77\n",
            String::from_utf8(out.to_vec()).unwrap(),
        );
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
    }
}
