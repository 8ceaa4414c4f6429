//! Keyed-map proxy with deferred integration.
//!
//! Mirrors the list proxy: a detached map buffers entries in insertion order,
//! an attached map forwards every operation to the engine container.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use yrs::types::map::MapEvent;
use yrs::{Any, ArrayPrelim, Map as _, MapPrelim, Subscription, TextPrelim, TransactionMut};

use crate::doc::{DocRef, Document};
use crate::error::DocError;
use crate::value::{out_to_value, Value};

#[derive(Debug, Clone)]
pub(crate) struct AttachedMap {
    pub doc: DocRef,
    pub handle: yrs::MapRef,
}

#[derive(Debug)]
enum MapState {
    Detached(IndexMap<String, Value>),
    Attached(AttachedMap),
}

/// A string-keyed collection of values, detached or bound to a document root.
#[derive(Debug, Clone)]
pub struct KeyedMap {
    state: Rc<RefCell<MapState>>,
}

impl KeyedMap {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(MapState::Detached(IndexMap::new()))),
        }
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            state: Rc::new(RefCell::new(MapState::Detached(
                entries.into_iter().collect(),
            ))),
        }
    }

    pub(crate) fn from_handle(doc: DocRef, handle: yrs::MapRef) -> Self {
        Self {
            state: Rc::new(RefCell::new(MapState::Attached(AttachedMap {
                doc,
                handle,
            }))),
        }
    }

    pub fn is_attached(&self) -> bool {
        matches!(&*self.state.borrow(), MapState::Attached(_))
    }

    pub fn is_same_instance(&self, other: &KeyedMap) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    fn attached(&self) -> Option<AttachedMap> {
        match &*self.state.borrow() {
            MapState::Attached(attached) => Some(attached.clone()),
            MapState::Detached(_) => None,
        }
    }

    pub fn len(&self) -> Result<usize, DocError> {
        match self.attached() {
            Some(attached) => {
                let doc = attached.doc.upgrade()?;
                Ok(doc.enter(|txn| attached.handle.len(txn)) as usize)
            }
            None => match &*self.state.borrow() {
                MapState::Detached(buffer) => Ok(buffer.len()),
                MapState::Attached(_) => unreachable!(),
            },
        }
    }

    pub fn is_empty(&self) -> Result<bool, DocError> {
        Ok(self.len()? == 0)
    }

    pub fn contains_key(&self, key: &str) -> Result<bool, DocError> {
        Ok(self.get(key)?.is_some())
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>, DocError> {
        match self.attached() {
            Some(attached) => {
                let doc = attached.doc.upgrade()?;
                Ok(doc.enter(|txn| {
                    attached
                        .handle
                        .get(txn, key)
                        .map(|out| out_to_value(&attached.doc, out))
                }))
            }
            None => match &*self.state.borrow() {
                MapState::Detached(buffer) => Ok(buffer.get(key).cloned()),
                MapState::Attached(_) => unreachable!(),
            },
        }
    }

    /// Sets `key` to `value`, replacing any previous entry.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<(), DocError> {
        let value = value.into();
        match self.attached() {
            Some(attached) => {
                let doc = attached.doc.upgrade()?;
                doc.transact(None, || {
                    doc.enter_mut(|txn| set_value(&attached, txn, key, value))
                })
            }
            None => {
                let mut state = self.state.borrow_mut();
                match &mut *state {
                    MapState::Detached(buffer) => {
                        buffer.insert(key.to_owned(), value);
                        Ok(())
                    }
                    MapState::Attached(_) => unreachable!(),
                }
            }
        }
    }

    /// Removes `key`; absent keys are a no-op.
    pub fn remove(&self, key: &str) -> Result<(), DocError> {
        match self.attached() {
            Some(attached) => {
                let doc = attached.doc.upgrade()?;
                doc.transact(None, || {
                    doc.enter_mut(|txn| {
                        attached.handle.remove(txn, key);
                        Ok(())
                    })
                })
            }
            None => {
                let mut state = self.state.borrow_mut();
                match &mut *state {
                    MapState::Detached(buffer) => {
                        buffer.shift_remove(key);
                        Ok(())
                    }
                    MapState::Attached(_) => unreachable!(),
                }
            }
        }
    }

    /// Removes every entry in a single broadcast.
    pub fn clear(&self) -> Result<(), DocError> {
        match self.attached() {
            Some(attached) => {
                let doc = attached.doc.upgrade()?;
                doc.transact(None, || {
                    doc.enter_mut(|txn| {
                        let keys: Vec<String> = attached
                            .handle
                            .keys(txn)
                            .map(|key| key.to_string())
                            .collect();
                        for key in keys {
                            attached.handle.remove(txn, &key);
                        }
                        Ok(())
                    })
                })
            }
            None => {
                let mut state = self.state.borrow_mut();
                match &mut *state {
                    MapState::Detached(buffer) => {
                        buffer.clear();
                        Ok(())
                    }
                    MapState::Attached(_) => unreachable!(),
                }
            }
        }
    }

    pub fn keys(&self) -> Result<Vec<String>, DocError> {
        Ok(self.entries()?.into_iter().map(|(key, _)| key).collect())
    }

    pub fn values(&self) -> Result<Vec<Value>, DocError> {
        Ok(self.entries()?.into_iter().map(|(_, value)| value).collect())
    }

    /// Materializes all entries. Attached maps yield engine iteration order,
    /// detached maps yield insertion order.
    pub fn entries(&self) -> Result<Vec<(String, Value)>, DocError> {
        match self.attached() {
            Some(attached) => {
                let doc = attached.doc.upgrade()?;
                Ok(doc.enter(|txn| {
                    attached
                        .handle
                        .iter(txn)
                        .map(|(key, out)| (key.to_string(), out_to_value(&attached.doc, out)))
                        .collect()
                }))
            }
            None => match &*self.state.borrow() {
                MapState::Detached(buffer) => Ok(buffer
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()),
                MapState::Attached(_) => unreachable!(),
            },
        }
    }

    /// Plain-data rendering of the map contents.
    pub fn to_json(&self) -> Result<Any, DocError> {
        let mut rendered = HashMap::new();
        for (key, value) in self.entries()? {
            rendered.insert(key, value.to_json()?);
        }
        Ok(Any::Map(Arc::new(rendered)))
    }

    /// Binds this map to the root container `key` of `doc`, creating the
    /// root if needed and replaying any buffered entries. Integrating an
    /// already attached map is a no-op. A key whose root already has a
    /// live proxy is refused; the cached proxy stays the only instance for
    /// that root.
    pub fn integrate(&self, doc: &Document, key: &str) -> Result<(), DocError> {
        if self.is_attached() {
            return Ok(());
        }
        if doc.has_cached_map(key) {
            return Err(DocError::RootOccupied {
                key: key.to_owned(),
            });
        }
        let handle = doc.root_map_handle(key)?;
        doc.transact(None, || {
            doc.enter_mut(|txn| self.attach(&doc.downgrade(), handle, txn))
        })?;
        doc.cache_map(key, self);
        Ok(())
    }

    /// Swaps the state to attached and replays the buffer into `handle`.
    /// Runs inside the caller's transaction.
    pub(crate) fn attach(
        &self,
        doc: &DocRef,
        handle: yrs::MapRef,
        txn: &mut TransactionMut,
    ) -> Result<(), DocError> {
        let buffer = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                MapState::Attached(_) => return Err(DocError::AlreadyAttached),
                MapState::Detached(buffer) => {
                    let buffer = std::mem::take(buffer);
                    *state = MapState::Attached(AttachedMap {
                        doc: doc.clone(),
                        handle: handle.clone(),
                    });
                    buffer
                }
            }
        };
        let attached = AttachedMap {
            doc: doc.clone(),
            handle,
        };
        for (key, value) in buffer {
            set_value(&attached, txn, &key, value)?;
        }
        Ok(())
    }

    /// Observes shallow changes to the attached container.
    pub fn observe<F>(&self, callback: F) -> Result<Subscription, DocError>
    where
        F: Fn(&TransactionMut, &MapEvent) + Send + Sync + 'static,
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

impl Default for KeyedMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes one entry, creating nested engine containers for container values
/// and attaching their proxies in place.
pub(crate) fn set_value(
    attached: &AttachedMap,
    txn: &mut TransactionMut,
    key: &str,
    value: Value,
) -> Result<(), DocError> {
    match value {
        Value::Scalar(any) => {
            attached.handle.insert(txn, key.to_owned(), any);
            Ok(())
        }
        Value::List(child) => {
            if child.is_attached() {
                return Err(DocError::AlreadyAttached);
            }
            let child_ref = attached
                .handle
                .insert(txn, key.to_owned(), ArrayPrelim::default());
            child.attach(&attached.doc, child_ref, txn)
        }
        Value::Map(child) => {
            if child.is_attached() {
                return Err(DocError::AlreadyAttached);
            }
            let child_ref = attached
                .handle
                .insert(txn, key.to_owned(), MapPrelim::default());
            child.attach(&attached.doc, child_ref, txn)
        }
        Value::Text(child) => {
            if child.is_attached() {
                return Err(DocError::AlreadyAttached);
            }
            let child_ref = attached
                .handle
                .insert(txn, key.to_owned(), TextPrelim::new(""));
            child.attach(&attached.doc, child_ref, txn)
        }
    }
}
