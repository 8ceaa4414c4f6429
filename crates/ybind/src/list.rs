//! Ordered-list proxy with deferred integration.
//!
//! A freshly constructed [`List`] buffers edits locally; once integrated into
//! a document it forwards every operation to the engine container and the
//! buffer is replayed and discarded. Cloned proxies share one state cell, so
//! integrating any clone integrates them all.

use std::cell::RefCell;
use std::rc::Rc;

use yrs::types::array::ArrayEvent;
use yrs::{Any, Array as _, ArrayPrelim, MapPrelim, Subscription, TextPrelim, TransactionMut};

use crate::doc::{DocRef, Document};
use crate::error::DocError;
use crate::value::{out_to_value, Value};

#[derive(Debug, Clone)]
pub(crate) struct AttachedList {
    pub doc: DocRef,
    pub handle: yrs::ArrayRef,
}

#[derive(Debug)]
enum ListState {
    Detached(Vec<Value>),
    Attached(AttachedList),
}

/// An ordered sequence of values, detached or bound to a document root.
#[derive(Debug, Clone)]
pub struct List {
    state: Rc<RefCell<ListState>>,
}

impl List {
    /// An empty detached list buffering edits until integration.
    pub fn new() -> Self {
        Self::from_values(Vec::new())
    }

    pub fn from_values(values: Vec<Value>) -> Self {
        Self {
            state: Rc::new(RefCell::new(ListState::Detached(values))),
        }
    }

    pub(crate) fn from_handle(doc: DocRef, handle: yrs::ArrayRef) -> Self {
        Self {
            state: Rc::new(RefCell::new(ListState::Attached(AttachedList {
                doc,
                handle,
            }))),
        }
    }

    pub fn is_attached(&self) -> bool {
        matches!(&*self.state.borrow(), ListState::Attached(_))
    }

    /// Whether two proxies share the same state cell.
    pub fn is_same_instance(&self, other: &List) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    fn attached(&self) -> Option<AttachedList> {
        match &*self.state.borrow() {
            ListState::Attached(attached) => Some(attached.clone()),
            ListState::Detached(_) => None,
        }
    }

    pub fn len(&self) -> Result<usize, DocError> {
        match self.attached() {
            Some(attached) => {
                let doc = attached.doc.upgrade()?;
                Ok(doc.enter(|txn| attached.handle.len(txn)) as usize)
            }
            None => match &*self.state.borrow() {
                ListState::Detached(buffer) => Ok(buffer.len()),
                ListState::Attached(_) => unreachable!(),
            },
        }
    }

    pub fn is_empty(&self) -> Result<bool, DocError> {
        Ok(self.len()? == 0)
    }

    pub fn get(&self, index: usize) -> Result<Option<Value>, DocError> {
        match self.attached() {
            Some(attached) => {
                let doc = attached.doc.upgrade()?;
                Ok(doc.enter(|txn| {
                    attached
                        .handle
                        .get(txn, index as u32)
                        .map(|out| out_to_value(&attached.doc, out))
                }))
            }
            None => match &*self.state.borrow() {
                ListState::Detached(buffer) => Ok(buffer.get(index).cloned()),
                ListState::Attached(_) => unreachable!(),
            },
        }
    }

    /// Materializes the whole list.
    pub fn to_vec(&self) -> Result<Vec<Value>, DocError> {
        match self.attached() {
            Some(attached) => {
                let doc = attached.doc.upgrade()?;
                Ok(doc.enter(|txn| {
                    attached
                        .handle
                        .iter(txn)
                        .map(|out| out_to_value(&attached.doc, out))
                        .collect()
                }))
            }
            None => match &*self.state.borrow() {
                ListState::Detached(buffer) => Ok(buffer.clone()),
                ListState::Attached(_) => unreachable!(),
            },
        }
    }

    /// Values in `[start, end)`, with both ends clamped to the list length.
    pub fn slice(&self, start: usize, end: usize) -> Result<Vec<Value>, DocError> {
        let len = self.len()?;
        let start = start.min(len);
        let end = end.min(len).max(start);
        let mut values = self.to_vec()?;
        values.truncate(end);
        Ok(values.split_off(start))
    }

    pub fn iter(&self) -> Result<impl Iterator<Item = Value>, DocError> {
        Ok(self.to_vec()?.into_iter())
    }

    /// Plain-data rendering of the list contents.
    pub fn to_json(&self) -> Result<Any, DocError> {
        let mut rendered = Vec::new();
        for value in self.to_vec()? {
            rendered.push(value.to_json()?);
        }
        Ok(Any::Array(rendered.into()))
    }

    /// Inserts `value` at `index`; `index == len` appends.
    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<(), DocError> {
        let value = value.into();
        match self.attached() {
            Some(attached) => {
                let doc = attached.doc.upgrade()?;
                doc.transact(None, || {
                    doc.enter_mut(|txn| {
                        let len = attached.handle.len(txn) as usize;
                        if index > len {
                            return Err(DocError::OutOfBounds { index, len });
                        }
                        insert_value(&attached, txn, index as u32, value)
                    })
                })
            }
            None => {
                let mut state = self.state.borrow_mut();
                match &mut *state {
                    ListState::Detached(buffer) => {
                        if index > buffer.len() {
                            return Err(DocError::OutOfBounds {
                                index,
                                len: buffer.len(),
                            });
                        }
                        buffer.insert(index, value);
                        Ok(())
                    }
                    ListState::Attached(_) => unreachable!(),
                }
            }
        }
    }

    pub fn push_back(&self, value: impl Into<Value>) -> Result<(), DocError> {
        self.insert(self.len()?, value)
    }

    pub fn push_front(&self, value: impl Into<Value>) -> Result<(), DocError> {
        self.insert(0, value)
    }

    /// Removes `len` values starting at `index`. The whole range must be in
    /// bounds; nothing is removed otherwise.
    pub fn remove(&self, index: usize, len: usize) -> Result<(), DocError> {
        if len == 0 {
            return Ok(());
        }
        match self.attached() {
            Some(attached) => {
                let doc = attached.doc.upgrade()?;
                doc.transact(None, || {
                    doc.enter_mut(|txn| {
                        let current = attached.handle.len(txn) as usize;
                        if index >= current || index + len > current {
                            return Err(DocError::OutOfBounds {
                                index,
                                len: current,
                            });
                        }
                        attached.handle.remove_range(txn, index as u32, len as u32);
                        Ok(())
                    })
                })
            }
            None => {
                let mut state = self.state.borrow_mut();
                match &mut *state {
                    ListState::Detached(buffer) => {
                        if index >= buffer.len() || index + len > buffer.len() {
                            return Err(DocError::OutOfBounds {
                                index,
                                len: buffer.len(),
                            });
                        }
                        buffer.drain(index..index + len);
                        Ok(())
                    }
                    ListState::Attached(_) => unreachable!(),
                }
            }
        }
    }

    /// Binds this list to the root container `key` of `doc`, creating the
    /// root if needed and replaying any buffered edits. Integrating an
    /// already attached list is a no-op. A key whose root already has a
    /// live proxy is refused; the cached proxy stays the only instance for
    /// that root.
    pub fn integrate(&self, doc: &Document, key: &str) -> Result<(), DocError> {
        if self.is_attached() {
            return Ok(());
        }
        if doc.has_cached_array(key) {
            return Err(DocError::RootOccupied {
                key: key.to_owned(),
            });
        }
        let handle = doc.root_array_handle(key)?;
        doc.transact(None, || {
            doc.enter_mut(|txn| self.attach(&doc.downgrade(), handle, txn))
        })?;
        doc.cache_array(key, self);
        Ok(())
    }

    /// Swaps the state to attached and replays the buffer into `handle`.
    /// Runs inside the caller's transaction.
    pub(crate) fn attach(
        &self,
        doc: &DocRef,
        handle: yrs::ArrayRef,
        txn: &mut TransactionMut,
    ) -> Result<(), DocError> {
        let buffer = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                ListState::Attached(_) => return Err(DocError::AlreadyAttached),
                ListState::Detached(buffer) => {
                    let buffer = std::mem::take(buffer);
                    *state = ListState::Attached(AttachedList {
                        doc: doc.clone(),
                        handle: handle.clone(),
                    });
                    buffer
                }
            }
        };
        let attached = AttachedList {
            doc: doc.clone(),
            handle,
        };
        for (offset, value) in buffer.into_iter().enumerate() {
            insert_value(&attached, txn, offset as u32, value)?;
        }
        Ok(())
    }

    /// Observes shallow changes to the attached container.
    pub fn observe<F>(&self, callback: F) -> Result<Subscription, DocError>
    where
        F: Fn(&TransactionMut, &ArrayEvent) + Send + Sync + 'static,
    {
        use yrs::Observable as _;
        match self.attached() {
            Some(attached) => Ok(attached.handle.observe(callback)),
            None => Err(DocError::Detached),
        }
    }

    /// Observes changes to the attached container and everything nested
    /// below it.
    pub fn observe_deep<F>(&self, callback: F) -> Result<Subscription, DocError>
    where
        F: Fn(&TransactionMut, &yrs::types::Events) + Send + Sync + 'static,
    {
        use yrs::DeepObservable as _;
        match self.attached() {
            Some(attached) => Ok(attached.handle.observe_deep(callback)),
            None => Err(DocError::Detached),
        }
    }
}

impl Default for List {
    fn default() -> Self {
        Self::new()
    }
}

/// Inserts one value at `index`, creating nested engine containers for
/// container values and attaching their proxies in place.
pub(crate) fn insert_value(
    attached: &AttachedList,
    txn: &mut TransactionMut,
    index: u32,
    value: Value,
) -> Result<(), DocError> {
    match value {
        Value::Scalar(any) => {
            attached.handle.insert(txn, index, any);
            Ok(())
        }
        Value::List(child) => {
            if child.is_attached() {
                return Err(DocError::AlreadyAttached);
            }
            let child_ref = attached.handle.insert(txn, index, ArrayPrelim::default());
            child.attach(&attached.doc, child_ref, txn)
        }
        Value::Map(child) => {
            if child.is_attached() {
                return Err(DocError::AlreadyAttached);
            }
            let child_ref = attached.handle.insert(txn, index, MapPrelim::default());
            child.attach(&attached.doc, child_ref, txn)
        }
        Value::Text(child) => {
            if child.is_attached() {
                return Err(DocError::AlreadyAttached);
            }
            let child_ref = attached.handle.insert(txn, index, TextPrelim::new(""));
            child.attach(&attached.doc, child_ref, txn)
        }
    }
}
