//! Thin adapter over the CRDT engine (`yrs`).
//!
//! Everything the binding layer needs from the engine flows through this
//! module: root container handles, full-state encodings, incremental diffs
//! and update merging. The engine's merge algorithm, tombstone handling and
//! binary update format are consumed as a black box; buffers crossing this
//! boundary are opaque byte sequences.

use thiserror::Error;
use yrs::updates::decoder::Decode as _;
use yrs::updates::encoder::Encode as _;
use yrs::{
    ArrayRef, Doc, MapRef, Out, ReadTxn as _, Snapshot, StateVector, TextRef, Transact as _,
    Transaction, TransactionMut, Update,
};

use crate::value::ContainerKind;

/// Canonical v1 encoding of an update that carries no structs and no
/// deletions. Diffs equal to this sentinel are never delivered.
pub const EMPTY_UPDATE: [u8; 2] = [0, 0];

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("malformed engine payload: {0}")]
    Decode(String),
    #[error("update apply failed: {0}")]
    Apply(String),
    #[error("unknown sync message tag {0}")]
    UnknownSyncTag(u64),
}

pub(crate) struct Engine {
    doc: Doc,
}

impl Engine {
    pub fn new() -> Self {
        Self { doc: Doc::new() }
    }

    pub fn with_client_id(client_id: u64) -> Self {
        Self {
            doc: Doc::with_client_id(client_id),
        }
    }

    pub fn client_id(&self) -> u64 {
        self.doc.client_id()
    }

    pub fn transact(&self) -> Transaction<'_> {
        self.doc.transact()
    }

    pub fn transact_mut(&self) -> TransactionMut<'_> {
        self.doc.transact_mut()
    }

    pub fn get_or_create_array(&self, key: &str) -> ArrayRef {
        self.doc.get_or_insert_array(key)
    }

    pub fn get_or_create_map(&self, key: &str) -> MapRef {
        self.doc.get_or_insert_map(key)
    }

    pub fn get_or_create_text(&self, key: &str) -> TextRef {
        self.doc.get_or_insert_text(key)
    }

    /// Full-state v1 encoding of the whole document.
    pub fn encode_state_as_update(&self) -> Vec<u8> {
        self.doc
            .transact()
            .encode_state_as_update_v1(&StateVector::default())
    }

    pub fn encode_state_vector(&self) -> Vec<u8> {
        self.doc.transact().state_vector().encode_v1()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.doc.transact().snapshot()
    }

    /// Incremental diff between a previously observed full-state encoding
    /// and the current document state.
    ///
    /// The previous snapshot is an opaque update buffer, so the state vector
    /// it covers is recovered by replaying it into a scratch document.
    pub fn diff(&self, previous_update: &[u8]) -> Result<Vec<u8>, EngineError> {
        let scratch = Doc::new();
        {
            let update = Update::decode_v1(previous_update)
                .map_err(|err| EngineError::Decode(err.to_string()))?;
            let mut txn = scratch.transact_mut();
            txn.apply_update(update)
                .map_err(|err| EngineError::Apply(err.to_string()))?;
        }
        let state_vector = scratch.transact().state_vector();
        Ok(self.doc.transact().encode_diff_v1(&state_vector))
    }

    /// Diff against an encoded remote state vector (sync step 2 payload).
    pub fn diff_for_state_vector(&self, state_vector: &[u8]) -> Result<Vec<u8>, EngineError> {
        let state_vector = StateVector::decode_v1(state_vector)
            .map_err(|err| EngineError::Decode(err.to_string()))?;
        Ok(self.doc.transact().encode_diff_v1(&state_vector))
    }

    pub fn apply_update(&self, update: &[u8]) -> Result<(), EngineError> {
        let update =
            Update::decode_v1(update).map_err(|err| EngineError::Decode(err.to_string()))?;
        self.doc
            .transact_mut()
            .apply_update(update)
            .map_err(|err| EngineError::Apply(err.to_string()))
    }

    /// Names of all instantiated root containers.
    pub fn keys(&self) -> Vec<String> {
        self.doc
            .transact()
            .root_refs()
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Instantiated root containers with their kinds.
    pub fn roots(&self) -> Vec<(String, ContainerKind)> {
        self.doc
            .transact()
            .root_refs()
            .filter_map(|(name, out)| container_kind(&out).map(|kind| (name.to_string(), kind)))
            .collect()
    }

    /// Kind of an already instantiated root container, if any.
    pub fn root_kind(&self, key: &str) -> Option<ContainerKind> {
        self.doc
            .transact()
            .root_refs()
            .find(|(name, _)| *name == key)
            .and_then(|(_, out)| container_kind(&out))
    }
}

fn container_kind(out: &Out) -> Option<ContainerKind> {
    match out {
        Out::YArray(_) => Some(ContainerKind::List),
        Out::YMap(_) => Some(ContainerKind::Map),
        Out::YText(_) => Some(ContainerKind::Text),
        _ => None,
    }
}

/// Merges a sequence of v1 update buffers into one equivalent update.
pub fn merge_updates(updates: &[Vec<u8>]) -> Result<Vec<u8>, EngineError> {
    if updates.is_empty() {
        return Ok(EMPTY_UPDATE.to_vec());
    }
    let mut decoded = Vec::with_capacity(updates.len());
    for update in updates {
        decoded.push(
            Update::decode_v1(update).map_err(|err| EngineError::Decode(err.to_string()))?,
        );
    }
    Ok(Update::merge_updates(decoded).encode_v1())
}
