use thiserror::Error;

use crate::engine::EngineError;
use crate::value::ContainerKind;

#[derive(Debug, Error)]
pub enum DocError {
    #[error("not supported on an unattached value")]
    Detached,
    #[error("index {index} out of bounds (len {len})")]
    OutOfBounds { index: usize, len: usize },
    #[error("value is already attached to a document")]
    AlreadyAttached,
    #[error("root {key:?} already exists as a {existing:?} container")]
    RootKindMismatch {
        key: String,
        existing: ContainerKind,
    },
    #[error("root {key:?} already has a live proxy instance")]
    RootOccupied { key: String },
    #[error("document was destroyed")]
    DocumentGone,
    #[error(transparent)]
    Engine(#[from] EngineError),
}
