//! Document: root container identity and diff broadcasting.
//!
//! The document owns the engine document, a cache guaranteeing one proxy
//! instance per (kind, key) root, the last observed full-state snapshot and
//! the subscriber table. Every local mutation path ends in [`Document::trigger_diff`],
//! which turns full-state snapshots into incremental update broadcasts and
//! suppresses no-op notifications.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

use yrs::{Snapshot, Transaction, TransactionMut};

use crate::engine::{Engine, EMPTY_UPDATE};
use crate::error::DocError;
use crate::list::List;
use crate::map::KeyedMap;
use crate::text::Text;
use crate::value::ContainerKind;

pub type ClientId = u64;

/// Token identifying where a change came from. It is handed through to every
/// subscriber unchanged so multi-hop propagation can avoid echo loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The document itself (the default for local mutations).
    Document(ClientId),
    /// A transport or test connector redistributing remote updates.
    Connector(u64),
    /// A caller-supplied token.
    Application(u64),
}

type UpdateCallback = Box<dyn FnMut(&[u8], Origin)>;

struct DocumentInner {
    engine: Engine,
    arrays: HashMap<String, List>,
    maps: HashMap<String, KeyedMap>,
    texts: HashMap<String, Text>,
    last_snapshot: Option<Vec<u8>>,
    origin_stack: Vec<Origin>,
    next_subscriber_id: u64,
    subscribers: BTreeMap<u64, UpdateCallback>,
    notifying: bool,
    queued_notifications: VecDeque<(Vec<u8>, Origin)>,
}

impl DocumentInner {
    fn with_engine(engine: Engine) -> Self {
        Self {
            engine,
            arrays: HashMap::new(),
            maps: HashMap::new(),
            texts: HashMap::new(),
            last_snapshot: None,
            origin_stack: Vec::new(),
            next_subscriber_id: 1,
            subscribers: BTreeMap::new(),
            notifying: false,
            queued_notifications: VecDeque::new(),
        }
    }
}

/// Cheap-clone handle to a shared document; clones refer to the same state.
#[derive(Clone)]
pub struct Document {
    inner: Rc<RefCell<DocumentInner>>,
}

/// Weak back-reference held by attached proxies. Proxies borrow the
/// document, they never keep it alive.
#[derive(Clone)]
pub(crate) struct DocRef(Weak<RefCell<DocumentInner>>);

impl DocRef {
    pub fn upgrade(&self) -> Result<Document, DocError> {
        self.0
            .upgrade()
            .map(|inner| Document { inner })
            .ok_or(DocError::DocumentGone)
    }
}

impl fmt::Debug for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DocRef")
    }
}

impl Document {
    pub fn new() -> Self {
        Self::with_engine(Engine::new())
    }

    pub fn with_client_id(client_id: ClientId) -> Self {
        Self::with_engine(Engine::with_client_id(client_id))
    }

    fn with_engine(engine: Engine) -> Self {
        Self {
            inner: Rc::new(RefCell::new(DocumentInner::with_engine(engine))),
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.inner.borrow().engine.client_id()
    }

    pub(crate) fn downgrade(&self) -> DocRef {
        DocRef(Rc::downgrade(&self.inner))
    }

    fn check_root_kind(&self, key: &str, wanted: ContainerKind) -> Result<(), DocError> {
        match self.inner.borrow().engine.root_kind(key) {
            Some(existing) if existing != wanted => Err(DocError::RootKindMismatch {
                key: key.to_owned(),
                existing,
            }),
            _ => Ok(()),
        }
    }

    pub(crate) fn root_array_handle(&self, key: &str) -> Result<yrs::ArrayRef, DocError> {
        self.check_root_kind(key, ContainerKind::List)?;
        Ok(self.inner.borrow().engine.get_or_create_array(key))
    }

    pub(crate) fn root_map_handle(&self, key: &str) -> Result<yrs::MapRef, DocError> {
        self.check_root_kind(key, ContainerKind::Map)?;
        Ok(self.inner.borrow().engine.get_or_create_map(key))
    }

    pub(crate) fn root_text_handle(&self, key: &str) -> Result<yrs::TextRef, DocError> {
        self.check_root_kind(key, ContainerKind::Text)?;
        Ok(self.inner.borrow().engine.get_or_create_text(key))
    }

    pub(crate) fn has_cached_array(&self, key: &str) -> bool {
        self.inner.borrow().arrays.contains_key(key)
    }

    pub(crate) fn has_cached_map(&self, key: &str) -> bool {
        self.inner.borrow().maps.contains_key(key)
    }

    pub(crate) fn has_cached_text(&self, key: &str) -> bool {
        self.inner.borrow().texts.contains_key(key)
    }

    pub(crate) fn cache_array(&self, key: &str, list: &List) {
        self.inner
            .borrow_mut()
            .arrays
            .entry(key.to_owned())
            .or_insert_with(|| list.clone());
    }

    pub(crate) fn cache_map(&self, key: &str, map: &KeyedMap) {
        self.inner
            .borrow_mut()
            .maps
            .entry(key.to_owned())
            .or_insert_with(|| map.clone());
    }

    pub(crate) fn cache_text(&self, key: &str, text: &Text) {
        self.inner
            .borrow_mut()
            .texts
            .entry(key.to_owned())
            .or_insert_with(|| text.clone());
    }

    /// Returns the root list for `key`, creating it if needed. Repeated
    /// calls for the same key return the same proxy instance.
    pub fn get_or_create_array(&self, key: &str) -> Result<List, DocError> {
        if let Some(list) = self.inner.borrow().arrays.get(key) {
            return Ok(list.clone());
        }
        let handle = self.root_array_handle(key)?;
        let list = List::from_handle(self.downgrade(), handle);
        self.cache_array(key, &list);
        self.trigger_diff(None);
        Ok(list)
    }

    /// Map counterpart of [`Document::get_or_create_array`].
    pub fn get_or_create_map(&self, key: &str) -> Result<KeyedMap, DocError> {
        if let Some(map) = self.inner.borrow().maps.get(key) {
            return Ok(map.clone());
        }
        let handle = self.root_map_handle(key)?;
        let map = KeyedMap::from_handle(self.downgrade(), handle);
        self.cache_map(key, &map);
        self.trigger_diff(None);
        Ok(map)
    }

    /// Text counterpart of [`Document::get_or_create_array`]. Materializing
    /// a text root does not broadcast on its own; the first insert does.
    pub fn get_or_create_text(&self, key: &str) -> Result<Text, DocError> {
        if let Some(text) = self.inner.borrow().texts.get(key) {
            return Ok(text.clone());
        }
        let handle = self.root_text_handle(key)?;
        let text = Text::from_handle(self.downgrade(), handle);
        self.cache_text(key, &text);
        Ok(text)
    }

    /// Computes the diff against the last observed snapshot and delivers it
    /// to every subscriber.
    ///
    /// The first call establishes the baseline and notifies nothing. A
    /// byte-identical snapshot, an empty diff, or the 2-byte empty-update
    /// sentinel are all treated as "no change" and never delivered. `origin`
    /// defaults to the innermost enclosing [`Document::transact`] origin, or
    /// this document when there is none.
    pub fn trigger_diff(&self, origin: Option<Origin>) {
        let origin = match origin {
            Some(origin) => origin,
            None => {
                let inner = self.inner.borrow();
                inner
                    .origin_stack
                    .last()
                    .copied()
                    .unwrap_or(Origin::Document(inner.engine.client_id()))
            }
        };
        let diff = {
            let mut inner = self.inner.borrow_mut();
            let state = inner.engine.encode_state_as_update();
            match inner.last_snapshot.take() {
                None => {
                    inner.last_snapshot = Some(state);
                    return;
                }
                Some(previous) => {
                    if previous == state {
                        inner.last_snapshot = Some(previous);
                        return;
                    }
                    // The previous snapshot is a buffer this engine produced;
                    // it always decodes back.
                    let diff = match inner.engine.diff(&previous) {
                        Ok(diff) => diff,
                        Err(err) => {
                            inner.last_snapshot = Some(state);
                            debug_assert!(false, "own snapshot failed to diff: {err}");
                            return;
                        }
                    };
                    inner.last_snapshot = Some(state);
                    diff
                }
            }
        };
        if diff.is_empty() || diff == EMPTY_UPDATE {
            return;
        }
        self.notify(&diff, origin);
    }

    /// Delivers a diff to every subscriber. Diffs triggered from inside a
    /// subscriber callback are queued and drained afterwards, so every
    /// subscriber sees every diff, in the order the diffs were produced.
    fn notify(&self, diff: &[u8], origin: Origin) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.notifying {
                inner.queued_notifications.push_back((diff.to_vec(), origin));
                return;
            }
            inner.notifying = true;
        }
        let mut next = Some((diff.to_vec(), origin));
        while let Some((diff, origin)) = next {
            let mut current = {
                let mut inner = self.inner.borrow_mut();
                mem::take(&mut inner.subscribers)
            };
            for callback in current.values_mut() {
                callback(&diff, origin);
            }
            {
                let mut inner = self.inner.borrow_mut();
                // Subscribers registered during notification keep their
                // slots.
                let added = mem::take(&mut inner.subscribers);
                inner.subscribers = current;
                inner.subscribers.extend(added);
            }
            next = {
                let mut inner = self.inner.borrow_mut();
                match inner.queued_notifications.pop_front() {
                    Some(queued) => Some(queued),
                    None => {
                        inner.notifying = false;
                        None
                    }
                }
            };
        }
    }

    /// Runs `mutator` and broadcasts the resulting diff on every exit path,
    /// including when the mutator fails. No rollback of partial mutations is
    /// performed; the broadcast reflects whatever state was reached.
    ///
    /// An explicit `origin` also becomes the default origin for every
    /// broadcast nested operations produce while `mutator` runs.
    pub fn transact<T>(
        &self,
        origin: Option<Origin>,
        mutator: impl FnOnce() -> Result<T, DocError>,
    ) -> Result<T, DocError> {
        let _broadcast = DiffGuard::new(self.clone(), origin);
        mutator()
    }

    /// Merges an inbound update, broadcasting the net effect afterwards.
    pub fn apply_update(&self, update: &[u8]) -> Result<(), DocError> {
        self.transact(None, || {
            self.inner
                .borrow()
                .engine
                .apply_update(update)
                .map_err(DocError::from)
        })
    }

    /// Registers an update subscriber; returns its id.
    pub fn on_update<F>(&self, callback: F) -> u64
    where
        F: FnMut(&[u8], Origin) + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_subscriber_id;
        inner.next_subscriber_id = inner.next_subscriber_id.saturating_add(1);
        inner.subscribers.insert(id, Box::new(callback));
        id
    }

    /// Removes all subscribers unconditionally.
    pub fn off_update(&self) {
        self.inner.borrow_mut().subscribers.clear();
    }

    pub fn encode_state_as_update(&self) -> Vec<u8> {
        self.inner.borrow().engine.encode_state_as_update()
    }

    pub fn encode_state_vector(&self) -> Vec<u8> {
        self.inner.borrow().engine.encode_state_vector()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.borrow().engine.snapshot()
    }

    /// Names of all instantiated root containers.
    pub fn keys(&self) -> Vec<String> {
        self.inner.borrow().engine.keys()
    }

    /// Instantiated root containers with their kinds.
    pub fn roots(&self) -> Vec<(String, ContainerKind)> {
        self.inner.borrow().engine.roots()
    }

    /// Clears the proxy caches and subscriber table. The engine document
    /// itself is dropped with the last handle.
    pub fn destroy(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.arrays.clear();
        inner.maps.clear();
        inner.texts.clear();
        inner.subscribers.clear();
        inner.origin_stack.clear();
        inner.queued_notifications.clear();
        inner.last_snapshot = None;
    }

    pub(crate) fn enter<T>(&self, f: impl FnOnce(&Transaction) -> T) -> T {
        let inner = self.inner.borrow();
        let txn = inner.engine.transact();
        f(&txn)
    }

    pub(crate) fn enter_mut<T>(
        &self,
        f: impl FnOnce(&mut TransactionMut) -> Result<T, DocError>,
    ) -> Result<T, DocError> {
        let inner = self.inner.borrow();
        let mut txn = inner.engine.transact_mut();
        f(&mut txn)
    }

    pub(crate) fn engine_apply(&self, update: &[u8]) -> Result<(), DocError> {
        self.inner
            .borrow()
            .engine
            .apply_update(update)
            .map_err(DocError::from)
    }

    pub(crate) fn diff_for_state_vector(&self, state_vector: &[u8]) -> Result<Vec<u8>, DocError> {
        self.inner
            .borrow()
            .engine
            .diff_for_state_vector(state_vector)
            .map_err(DocError::from)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("client_id", &self.client_id())
            .finish()
    }
}

/// Broadcast guard: triggers the owning document's diff when dropped, so the
/// broadcast runs on every exit path of the scope that created it.
pub(crate) struct DiffGuard {
    doc: Document,
    origin: Option<Origin>,
}

impl DiffGuard {
    pub fn new(doc: Document, origin: Option<Origin>) -> Self {
        if let Some(origin) = origin {
            doc.inner.borrow_mut().origin_stack.push(origin);
        }
        Self { doc, origin }
    }
}

impl Drop for DiffGuard {
    fn drop(&mut self) {
        if self.origin.is_some() {
            self.doc.inner.borrow_mut().origin_stack.pop();
        }
        self.doc.trigger_diff(self.origin);
    }
}
