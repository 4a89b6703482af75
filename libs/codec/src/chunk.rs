//! Payload chunking for large fan-out lists
//!
//! Full inventories (orphan reports, purge lists) can exceed the transport's
//! maximum message size. Chunk boundaries depend only on the configured
//! `max_payload`, never on the data.

use crate::requests::{NodeHandlesReport, PurgeOrphanRequest};
use types::Credentials;

/// Bytes reserved for the envelope around the items
pub const ENVELOPE_OVERHEAD: usize = 1024;

/// Budgeted wire size of one list item
pub const MAX_ITEM_BYTES: usize = 512;

/// Smallest `max_payload` that still fits one item per chunk
pub const MIN_MAX_PAYLOAD: usize = ENVELOPE_OVERHEAD + MAX_ITEM_BYTES;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    items_per_chunk: usize,
}

impl Chunker {
    pub fn new(max_payload: usize) -> Self {
        let items_per_chunk = (max_payload.saturating_sub(ENVELOPE_OVERHEAD) / MAX_ITEM_BYTES).max(1);
        Self { items_per_chunk }
    }

    pub fn items_per_chunk(&self) -> usize {
        self.items_per_chunk
    }

    /// Split `items`; an empty list still yields one empty chunk
    pub fn chunk<T: Clone>(&self, items: &[T]) -> Vec<Vec<T>> {
        if items.is_empty() {
            return vec![Vec::new()];
        }
        items.chunks(self.items_per_chunk).map(<[T]>::to_vec).collect()
    }

    /// Inventory reports for `node_id`, at least one
    pub fn reports(
        &self,
        node_id: &str,
        instances: &[String],
        bindings: &[Credentials],
    ) -> Vec<NodeHandlesReport> {
        self.zip(instances, bindings)
            .into_iter()
            .map(|(instances, bindings)| NodeHandlesReport {
                node_id: node_id.to_string(),
                instances,
                bindings,
            })
            .collect()
    }

    /// Purge requests for one node, at least one
    pub fn purge_requests(&self, instances: &[String], bindings: &[Credentials]) -> Vec<PurgeOrphanRequest> {
        self.zip(instances, bindings)
            .into_iter()
            .map(|(instances, bindings)| PurgeOrphanRequest { instances, bindings })
            .collect()
    }

    fn zip(&self, instances: &[String], bindings: &[Credentials]) -> Vec<(Vec<String>, Vec<Credentials>)> {
        let mut instance_chunks = self.chunk(instances).into_iter();
        let mut binding_chunks = self.chunk(bindings).into_iter();
        let mut pairs = Vec::new();
        loop {
            match (instance_chunks.next(), binding_chunks.next()) {
                (None, None) => break,
                (i, b) => pairs.push((i.unwrap_or_default(), b.unwrap_or_default())),
            }
        }
        pairs
    }
}
