//! Seeded multi-replica simulator.
//!
//! Each replica is a full document plus sync handler wired to a shared
//! message bus. Local edits are broadcast as framed update messages,
//! reconnects run the full state-vector handshake, and every random choice
//! flows through one seeded generator so failures replay exactly.

use std::cell::RefCell;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng as _, SeedableRng as _};
use ybind::yrs::Any;
use ybind::{
    encode_sync_update, merge_updates, ContainerKind, DocError, Document, Origin, SyncProtocol,
};

use crate::bus::Bus;

/// Wire format for framed messages. Only the v1 binary encoding is spoken;
/// the variant exists so a second encoding slots in without touching the
/// simulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EncodingMode {
    #[default]
    V1,
}

/// Explicit simulator configuration. The seed drives every random decision,
/// so two runs with the same seed and the same call sequence are identical.
#[derive(Debug, Clone, Copy)]
pub struct ConnectorConfig {
    pub seed: u64,
    pub encoding: EncodingMode,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            encoding: EncodingMode::V1,
        }
    }
}

/// One simulated peer: a document, its sync handler and the log of every
/// update its document ever broadcast.
pub struct Replica {
    id: usize,
    doc: Document,
    protocol: SyncProtocol,
    updates: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl Replica {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn protocol(&self) -> &SyncProtocol {
        &self.protocol
    }

    /// Every update this replica's document has broadcast, local and remote.
    pub fn updates(&self) -> Vec<Vec<u8>> {
        self.updates.borrow().clone()
    }
}

pub struct TestConnector {
    config: ConnectorConfig,
    replicas: Vec<Replica>,
    bus: Rc<RefCell<Bus>>,
    rng: StdRng,
    origin: Origin,
}

impl TestConnector {
    pub fn new(config: ConnectorConfig) -> Self {
        Self {
            config,
            replicas: Vec::new(),
            bus: Rc::new(RefCell::new(Bus::new())),
            rng: StdRng::seed_from_u64(config.seed),
            origin: Origin::Connector(0),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(ConnectorConfig {
            seed,
            ..ConnectorConfig::default()
        })
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    pub fn replica(&self, id: usize) -> &Replica {
        &self.replicas[id]
    }

    /// Spawns a replica with the given engine client id, wires its update
    /// broadcasts to the bus and connects it.
    pub fn create_replica(&mut self, client_id: u64) -> usize {
        let id = self.replicas.len();
        let doc = Document::with_client_id(client_id);
        // Establish the diff baseline so the very first change, local or
        // remote, is observable.
        doc.trigger_diff(None);

        let updates = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&updates);
        let bus = Rc::clone(&self.bus);
        let connector_origin = self.origin;
        let encoding = self.config.encoding;
        doc.on_update(move |update, origin| {
            log.borrow_mut().push(update.to_vec());
            if origin != connector_origin {
                let framed = match encoding {
                    EncodingMode::V1 => encode_sync_update(update),
                };
                bus.borrow_mut().broadcast(id, framed);
            }
        });

        let protocol = SyncProtocol::with_origin(doc.clone(), connector_origin);
        self.replicas.push(Replica {
            id,
            doc,
            protocol,
            updates,
        });
        self.connect(id);
        id
    }

    pub fn is_online(&self, id: usize) -> bool {
        self.bus.borrow().is_online(id)
    }

    /// Brings a replica online and exchanges state-vector announcements with
    /// every peer already online. Connecting a connected replica is a no-op.
    pub fn connect(&mut self, id: usize) {
        if !self.bus.borrow_mut().set_online(id) {
            return;
        }
        let own_step1 = self.replicas[id].protocol.start_sync();
        let peers = self.bus.borrow().online_ids();
        for peer in peers {
            if peer == id {
                continue;
            }
            let peer_step1 = self.replicas[peer].protocol.start_sync();
            let mut bus = self.bus.borrow_mut();
            bus.enqueue(id, peer, own_step1.clone());
            bus.enqueue(peer, id, peer_step1);
        }
    }

    /// Takes a replica offline and drops everything queued for it.
    /// Disconnecting a disconnected replica is a no-op.
    pub fn disconnect(&mut self, id: usize) {
        let mut bus = self.bus.borrow_mut();
        if bus.set_offline(id) {
            bus.clear_inbox(id);
        }
    }

    pub fn reconnect_all(&mut self) {
        for id in 0..self.replicas.len() {
            self.connect(id);
        }
    }

    pub fn disconnect_all(&mut self) {
        for id in 0..self.replicas.len() {
            self.disconnect(id);
        }
    }

    /// Disconnects one randomly chosen online replica, if any.
    pub fn disconnect_random(&mut self) -> Option<usize> {
        let online = self.bus.borrow().online_ids();
        if online.is_empty() {
            return None;
        }
        let id = online[self.rng.gen_range(0..online.len())];
        self.disconnect(id);
        Some(id)
    }

    /// Reconnects one randomly chosen offline replica, if any.
    pub fn reconnect_random(&mut self) -> Option<usize> {
        let offline: Vec<usize> = (0..self.replicas.len())
            .filter(|&id| !self.bus.borrow().is_online(id))
            .collect();
        if offline.is_empty() {
            return None;
        }
        let id = offline[self.rng.gen_range(0..offline.len())];
        self.connect(id);
        Some(id)
    }

    /// Delivers one randomly chosen pending message. Returns false when no
    /// online replica has anything queued.
    ///
    /// Panics if the receiving replica rejects the message; in a simulated
    /// network every queued message is well formed.
    pub fn flush_random_message(&mut self) -> bool {
        let popped = self.bus.borrow_mut().pop_random(&mut self.rng);
        let Some((from, to, message)) = popped else {
            return false;
        };
        let reply = self.replicas[to]
            .protocol
            .apply_sync_step(&message)
            .unwrap_or_else(|err| panic!("replica {to} rejected message from {from}: {err}"));
        if let Some(reply) = reply {
            self.bus.borrow_mut().enqueue(to, from, reply);
        }
        true
    }

    /// Drains every deliverable message, replies included. Returns how many
    /// messages were delivered.
    pub fn flush_all_messages(&mut self) -> usize {
        let mut delivered = 0;
        while self.flush_random_message() {
            delivered += 1;
        }
        delivered
    }

    /// Reconnects everyone and drains the bus, leaving all replicas with the
    /// same document state.
    pub fn sync_all(&mut self) {
        self.reconnect_all();
        self.flush_all_messages();
    }

    /// Syncs everyone, then asserts full convergence: every replica's
    /// document must equal its neighbours in rendered content, state vector
    /// and snapshot, and must be reconstructible from its own update log.
    pub fn assert_converged(&mut self) {
        self.sync_all();
        assert!(
            !self.bus.borrow().has_pending(),
            "bus still has pending messages after sync"
        );
        for replica in &self.replicas {
            let merged = merge_updates(&replica.updates())
                .unwrap_or_else(|err| panic!("replica {} log does not merge: {err}", replica.id));
            let reconstructed = Document::new();
            reconstructed
                .apply_update(&merged)
                .unwrap_or_else(|err| panic!("replica {} log does not apply: {err}", replica.id));
            assert_eq!(
                render_document(replica.doc()),
                render_document(&reconstructed),
                "replica {} diverges from its own update log",
                replica.id
            );
            assert_eq!(
                replica.doc().encode_state_vector(),
                reconstructed.encode_state_vector(),
                "replica {} state vector diverges from its update log",
                replica.id
            );
            assert_eq!(
                replica.doc().snapshot(),
                reconstructed.snapshot(),
                "replica {} snapshot diverges from its update log",
                replica.id
            );
        }
        for pair in self.replicas.windows(2) {
            let (left, right) = (&pair[0], &pair[1]);
            assert_eq!(
                render_document(left.doc()),
                render_document(right.doc()),
                "replicas {} and {} render differently",
                left.id,
                right.id
            );
            assert_eq!(
                left.doc().encode_state_vector(),
                right.doc().encode_state_vector(),
                "replicas {} and {} have different state vectors",
                left.id,
                right.id
            );
            assert_eq!(
                left.doc().snapshot(),
                right.doc().snapshot(),
                "replicas {} and {} have different snapshots",
                left.id,
                right.id
            );
        }
    }
}

/// Plain-data rendering of every root container, sorted by root name.
///
/// Roots that render empty are skipped: a root that was instantiated but
/// never written carries no engine content, so it exists only on replicas
/// that happened to instantiate it locally.
fn render_document(doc: &Document) -> Vec<(String, ContainerKind, Any)> {
    try_render(doc).unwrap_or_else(|err| panic!("failed to render document: {err}"))
}

fn try_render(doc: &Document) -> Result<Vec<(String, ContainerKind, Any)>, DocError> {
    let mut roots = doc.roots();
    roots.sort_by(|a, b| a.0.cmp(&b.0));
    let mut rendered = Vec::with_capacity(roots.len());
    for (key, kind) in roots {
        let json = match kind {
            ContainerKind::List => doc.get_or_create_array(&key)?.to_json()?,
            ContainerKind::Map => doc.get_or_create_map(&key)?.to_json()?,
            ContainerKind::Text => Any::String(doc.get_or_create_text(&key)?.get_string()?.into()),
        };
        let is_empty = match &json {
            Any::Array(values) => values.is_empty(),
            Any::Map(entries) => entries.is_empty(),
            Any::String(content) => content.is_empty(),
            _ => false,
        };
        if !is_empty {
            rendered.push((key, kind, json));
        }
    }
    Ok(rendered)
}
