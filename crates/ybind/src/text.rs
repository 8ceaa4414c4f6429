//! Text proxy with deferred integration.
//!
//! Offsets are byte offsets into UTF-8 and must land on character
//! boundaries, matching what the engine container expects.

use std::cell::RefCell;
use std::rc::Rc;

use yrs::types::text::TextEvent;
use yrs::{GetString as _, Subscription, Text as _, TransactionMut};

use crate::doc::{DocRef, Document};
use crate::error::DocError;

#[derive(Debug, Clone)]
pub(crate) struct AttachedText {
    pub doc: DocRef,
    pub handle: yrs::TextRef,
}

#[derive(Debug)]
enum TextState {
    Detached(String),
    Attached(AttachedText),
}

/// A collaborative text value, detached or bound to a document root.
#[derive(Debug, Clone)]
pub struct Text {
    state: Rc<RefCell<TextState>>,
}

impl Text {
    pub fn new() -> Self {
        Self::from_string(String::new())
    }

    pub fn from_string(content: impl Into<String>) -> Self {
        Self {
            state: Rc::new(RefCell::new(TextState::Detached(content.into()))),
        }
    }

    pub(crate) fn from_handle(doc: DocRef, handle: yrs::TextRef) -> Self {
        Self {
            state: Rc::new(RefCell::new(TextState::Attached(AttachedText {
                doc,
                handle,
            }))),
        }
    }

    pub fn is_attached(&self) -> bool {
        matches!(&*self.state.borrow(), TextState::Attached(_))
    }

    pub fn is_same_instance(&self, other: &Text) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    fn attached(&self) -> Option<AttachedText> {
        match &*self.state.borrow() {
            TextState::Attached(attached) => Some(attached.clone()),
            TextState::Detached(_) => None,
        }
    }

    /// Length in bytes of the UTF-8 content.
    pub fn len(&self) -> Result<usize, DocError> {
        Ok(self.get_string()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, DocError> {
        Ok(self.len()? == 0)
    }

    pub fn get_string(&self) -> Result<String, DocError> {
        match self.attached() {
            Some(attached) => {
                let doc = attached.doc.upgrade()?;
                Ok(doc.enter(|txn| attached.handle.get_string(txn)))
            }
            None => match &*self.state.borrow() {
                TextState::Detached(buffer) => Ok(buffer.clone()),
                TextState::Attached(_) => unreachable!(),
            },
        }
    }

    /// Inserts `chunk` at byte offset `index`.
    pub fn insert(&self, index: usize, chunk: &str) -> Result<(), DocError> {
        if chunk.is_empty() {
            return Ok(());
        }
        match self.attached() {
            Some(attached) => {
                let doc = attached.doc.upgrade()?;
                doc.transact(None, || {
                    doc.enter_mut(|txn| {
                        let current = attached.handle.get_string(txn);
                        if index > current.len() || !current.is_char_boundary(index) {
                            return Err(DocError::OutOfBounds {
                                index,
                                len: current.len(),
                            });
                        }
                        attached.handle.insert(txn, index as u32, chunk);
                        Ok(())
                    })
                })
            }
            None => {
                let mut state = self.state.borrow_mut();
                match &mut *state {
                    TextState::Detached(buffer) => {
                        if index > buffer.len() || !buffer.is_char_boundary(index) {
                            return Err(DocError::OutOfBounds {
                                index,
                                len: buffer.len(),
                            });
                        }
                        buffer.insert_str(index, chunk);
                        Ok(())
                    }
                    TextState::Attached(_) => unreachable!(),
                }
            }
        }
    }

    pub fn push(&self, chunk: &str) -> Result<(), DocError> {
        self.insert(self.len()?, chunk)
    }

    /// Removes `len` bytes starting at byte offset `index`. Both range ends
    /// must land on character boundaries.
    pub fn remove_range(&self, index: usize, len: usize) -> Result<(), DocError> {
        if len == 0 {
            return Ok(());
        }
        match self.attached() {
            Some(attached) => {
                let doc = attached.doc.upgrade()?;
                doc.transact(None, || {
                    doc.enter_mut(|txn| {
                        let current = attached.handle.get_string(txn);
                        check_range(&current, index, len)?;
                        attached.handle.remove_range(txn, index as u32, len as u32);
                        Ok(())
                    })
                })
            }
            None => {
                let mut state = self.state.borrow_mut();
                match &mut *state {
                    TextState::Detached(buffer) => {
                        check_range(buffer, index, len)?;
                        buffer.drain(index..index + len);
                        Ok(())
                    }
                    TextState::Attached(_) => unreachable!(),
                }
            }
        }
    }

    /// Binds this text to the root container `key` of `doc`, creating the
    /// root if needed and pushing any buffered content. Integrating an
    /// already attached text is a no-op. A key whose root already has a
    /// live proxy is refused; the cached proxy stays the only instance for
    /// that root.
    pub fn integrate(&self, doc: &Document, key: &str) -> Result<(), DocError> {
        if self.is_attached() {
            return Ok(());
        }
        if doc.has_cached_text(key) {
            return Err(DocError::RootOccupied {
                key: key.to_owned(),
            });
        }
        let handle = doc.root_text_handle(key)?;
        doc.transact(None, || {
            doc.enter_mut(|txn| self.attach(&doc.downgrade(), handle, txn))
        })?;
        doc.cache_text(key, self);
        Ok(())
    }

    /// Swaps the state to attached and pushes the buffered content into
    /// `handle` as one chunk. Runs inside the caller's transaction.
    pub(crate) fn attach(
        &self,
        doc: &DocRef,
        handle: yrs::TextRef,
        txn: &mut TransactionMut,
    ) -> Result<(), DocError> {
        let buffer = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                TextState::Attached(_) => return Err(DocError::AlreadyAttached),
                TextState::Detached(buffer) => {
                    let buffer = std::mem::take(buffer);
                    *state = TextState::Attached(AttachedText {
                        doc: doc.clone(),
                        handle: handle.clone(),
                    });
                    buffer
                }
            }
        };
        if !buffer.is_empty() {
            let offset = handle.get_string(txn).len() as u32;
            handle.insert(txn, offset, &buffer);
        }
        Ok(())
    }

    /// Observes changes to the attached container.
    pub fn observe<F>(&self, callback: F) -> Result<Subscription, DocError>
    where
        F: Fn(&TransactionMut, &TextEvent) + Send + Sync + 'static,
    {
        use yrs::Observable as _;
        match self.attached() {
            Some(attached) => Ok(attached.handle.observe(callback)),
            None => Err(DocError::Detached),
        }
    }
}

impl Default for Text {
    fn default() -> Self {
        Self::new()
    }
}

fn check_range(content: &str, index: usize, len: usize) -> Result<(), DocError> {
    let end = index.checked_add(len).unwrap_or(usize::MAX);
    if index >= content.len()
        || end > content.len()
        || !content.is_char_boundary(index)
        || !content.is_char_boundary(end)
    {
        return Err(DocError::OutOfBounds {
            index,
            len: content.len(),
        });
    }
    Ok(())
}
