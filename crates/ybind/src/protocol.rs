//! Sync message framing and the step handler.
//!
//! Messages are a varuint tag followed by one var-length-prefixed payload:
//! step 1 carries a state vector, step 2 and update messages carry update
//! buffers. The handler broadcasts the document diff after every inbound
//! message, even when applying it fails.

use yrs::encoding::read::{Cursor, Read as _};
use yrs::encoding::write::Write as _;

use crate::doc::{Document, Origin};
use crate::engine::EngineError;
use crate::error::DocError;

const MSG_SYNC_STEP1: u64 = 0;
const MSG_SYNC_STEP2: u64 = 1;
const MSG_SYNC_UPDATE: u64 = 2;

/// A decoded sync message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
    /// A state vector announcing what the sender already has.
    Step1(Vec<u8>),
    /// The update filling the gap announced by a step 1.
    Step2(Vec<u8>),
    /// A standalone incremental update.
    Update(Vec<u8>),
}

pub fn encode_sync_step1(state_vector: &[u8]) -> Vec<u8> {
    encode_tagged(MSG_SYNC_STEP1, state_vector)
}

pub fn encode_sync_step2(update: &[u8]) -> Vec<u8> {
    encode_tagged(MSG_SYNC_STEP2, update)
}

pub fn encode_sync_update(update: &[u8]) -> Vec<u8> {
    encode_tagged(MSG_SYNC_UPDATE, update)
}

fn encode_tagged(tag: u64, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload.len() + 8);
    buf.write_var(tag);
    buf.write_buf(payload);
    buf
}

pub fn decode_sync_message(message: &[u8]) -> Result<SyncMessage, EngineError> {
    let mut cursor = Cursor::new(message);
    let tag: u64 = cursor
        .read_var()
        .map_err(|err| EngineError::Decode(err.to_string()))?;
    let payload = cursor
        .read_buf()
        .map_err(|err| EngineError::Decode(err.to_string()))?
        .to_vec();
    match tag {
        MSG_SYNC_STEP1 => Ok(SyncMessage::Step1(payload)),
        MSG_SYNC_STEP2 => Ok(SyncMessage::Step2(payload)),
        MSG_SYNC_UPDATE => Ok(SyncMessage::Update(payload)),
        other => Err(EngineError::UnknownSyncTag(other)),
    }
}

/// Stateless handler binding the sync handshake to one document.
///
/// Every subscriber notification produced while handling a message carries
/// this handler's origin, so a connector feeding messages in can recognize
/// its own traffic.
pub struct SyncProtocol {
    doc: Document,
    origin: Origin,
}

impl SyncProtocol {
    pub fn new(doc: Document) -> Self {
        let origin = Origin::Document(doc.client_id());
        Self { doc, origin }
    }

    pub fn with_origin(doc: Document, origin: Origin) -> Self {
        Self { doc, origin }
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    /// Handles one inbound sync message.
    ///
    /// Step 1 answers with a step 2 reply; step 2 and update messages merge
    /// their payload and produce no reply. The diff broadcast runs on every
    /// exit path, including decode and apply failures.
    pub fn apply_sync_step(&self, message: &[u8]) -> Result<Option<Vec<u8>>, DocError> {
        self.doc.transact(Some(self.origin), || {
            match decode_sync_message(message)? {
                SyncMessage::Step1(state_vector) => {
                    let reply = self.doc.diff_for_state_vector(&state_vector)?;
                    Ok(Some(encode_sync_step2(&reply)))
                }
                SyncMessage::Step2(update) | SyncMessage::Update(update) => {
                    self.doc.engine_apply(&update)?;
                    Ok(None)
                }
            }
        })
    }

    /// The step 1 announcement for this document's current state.
    pub fn start_sync(&self) -> Vec<u8> {
        encode_sync_step1(&self.doc.encode_state_vector())
    }
}
