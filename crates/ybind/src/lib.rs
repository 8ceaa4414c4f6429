//! Deferred-integration value proxies and diff broadcasting over a
//! Yjs-compatible CRDT engine.
//!
//! The crate wraps an engine document with three container proxies
//! ([`List`], [`KeyedMap`], [`Text`]) that buffer edits while detached and
//! forward them once integrated, a [`Document`] that converts state changes
//! into incremental update broadcasts, and a [`SyncProtocol`] implementing
//! the two-step state-vector handshake plus standalone updates.

pub mod doc;
pub mod engine;
pub mod error;
pub mod list;
pub mod map;
pub mod protocol;
pub mod text;
pub mod value;

pub use doc::{ClientId, Document, Origin};
pub use engine::{merge_updates, EngineError, EMPTY_UPDATE};
pub use error::DocError;
pub use list::List;
pub use map::KeyedMap;
pub use protocol::{
    decode_sync_message, encode_sync_step1, encode_sync_step2, encode_sync_update, SyncMessage,
    SyncProtocol,
};
pub use text::Text;
pub use value::{ContainerKind, Value};

pub use yrs;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
