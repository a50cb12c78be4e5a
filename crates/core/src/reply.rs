//! Reply framing and completion accounting.
//!
//! The framer owns the item-id counter and the chunk counts that make a
//! reply self-terminating: every item's completion chunk states how many
//! chunks belonged to that item (itself included), and the reply-level
//! completion states one more than everything emitted before it. Encoding
//! is deterministic, so replaying the same deliveries yields byte-identical
//! output.

use bytes::{Bytes, BytesMut};
use seqgate_api::protocol::{
    encode_data_chunk, encode_message_chunk, encode_meta_chunk, ItemType,
    ReplyIssue, REPLY_ITEM_ID,
};
use seqgate_api::{BlobId, OutputFormat};
use std::collections::HashMap;

/// Raise `cur` to `status` when the new status is worse.
pub(crate) fn raise_status(cur: &mut u16, status: u16) {
    if status > *cur {
        *cur = status;
    }
}

#[derive(Debug, Default)]
pub(crate) struct ReplyFramer {
    next_item_id: u64,
    total_chunks: u64,
    per_item: HashMap<u64, u64>,
    buf: BytesMut,
    completed: bool,
}

impl ReplyFramer {
    pub fn new() -> Self {
        Self {
            // item id 0 is the reply itself
            next_item_id: 1,
            ..Default::default()
        }
    }

    /// Allocate the item id for the next logical deliverable.
    pub fn new_item(&mut self) -> u64 {
        let id = self.next_item_id;
        self.next_item_id += 1;
        id
    }

    fn note_chunk(&mut self, item_id: u64) {
        self.total_chunks += 1;
        *self.per_item.entry(item_id).or_insert(0) += 1;
    }

    /// One resolved bioseq record.
    pub fn bioseq_info_data(
        &mut self,
        item_id: u64,
        fmt: OutputFormat,
        payload: &[u8],
    ) {
        let fmt = match fmt {
            OutputFormat::Json => "json",
            OutputFormat::Protobuf => "protobuf",
        };
        encode_data_chunk(
            &mut self.buf,
            item_id,
            ItemType::BioseqInfo,
            &[("fmt", fmt.into())],
            payload,
        );
        self.note_chunk(item_id);
    }

    /// One blob's properties.
    pub fn blob_props_data(
        &mut self,
        item_id: u64,
        blob_id: &BlobId,
        payload: &[u8],
    ) {
        encode_data_chunk(
            &mut self.buf,
            item_id,
            ItemType::BlobProp,
            &[("blob_id", blob_id.to_string())],
            payload,
        );
        self.note_chunk(item_id);
    }

    /// One blob body chunk. All chunks of one blob share one item id.
    pub fn blob_chunk_data(
        &mut self,
        item_id: u64,
        blob_id: &BlobId,
        chunk_no: i32,
        payload: &[u8],
    ) {
        encode_data_chunk(
            &mut self.buf,
            item_id,
            ItemType::Blob,
            &[
                ("blob_id", blob_id.to_string()),
                ("blob_chunk", chunk_no.to_string()),
            ],
            payload,
        );
        self.note_chunk(item_id);
    }

    /// One named-annotation record.
    pub fn named_annot_data(&mut self, item_id: u64, payload: &[u8]) {
        encode_data_chunk(
            &mut self.buf,
            item_id,
            ItemType::NamedAnnot,
            &[],
            payload,
        );
        self.note_chunk(item_id);
    }

    /// An error or warning attached to one item. Never replaces data: both
    /// can be emitted for the same item.
    pub fn message(
        &mut self,
        item_id: u64,
        item_type: ItemType,
        issue: &ReplyIssue,
    ) {
        encode_message_chunk(&mut self.buf, item_id, item_type, issue);
        self.note_chunk(item_id);
    }

    /// An error or warning attached to the reply itself.
    pub fn reply_message(&mut self, issue: &ReplyIssue) {
        encode_message_chunk(
            &mut self.buf,
            REPLY_ITEM_ID,
            ItemType::Reply,
            issue,
        );
        self.total_chunks += 1;
    }

    /// Complete one item: its meta chunk counts the item's own chunks plus
    /// itself.
    pub fn item_complete(&mut self, item_id: u64, item_type: ItemType) {
        let n = self.per_item.remove(&item_id).unwrap_or(0) + 1;
        encode_meta_chunk(&mut self.buf, item_id, item_type, n);
        self.total_chunks += 1;
    }

    /// Complete the reply. Emitted exactly once; the count equals one more
    /// than every chunk emitted before it.
    pub fn reply_complete(&mut self) {
        if self.completed {
            tracing::warn!("duplicate reply completion suppressed");
            return;
        }
        encode_meta_chunk(
            &mut self.buf,
            REPLY_ITEM_ID,
            ItemType::Reply,
            self.total_chunks + 1,
        );
        self.completed = true;
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn has_pending(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Hand the pending bytes to the transport.
    pub fn take_output(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}
