//! In-memory message bus with per-(sender, receiver) FIFO queues.
//!
//! Delivery order across different senders is randomized by the connector,
//! but messages from one sender to one receiver always arrive in the order
//! they were enqueued.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use rand::rngs::StdRng;
use rand::Rng as _;

pub(crate) struct Bus {
    online: BTreeSet<usize>,
    // receiver -> sender -> queued messages
    inboxes: BTreeMap<usize, BTreeMap<usize, VecDeque<Vec<u8>>>>,
}

impl Bus {
    pub fn new() -> Self {
        Self {
            online: BTreeSet::new(),
            inboxes: BTreeMap::new(),
        }
    }

    pub fn is_online(&self, id: usize) -> bool {
        self.online.contains(&id)
    }

    pub fn set_online(&mut self, id: usize) -> bool {
        self.online.insert(id)
    }

    pub fn set_offline(&mut self, id: usize) -> bool {
        self.online.remove(&id)
    }

    pub fn online_ids(&self) -> Vec<usize> {
        self.online.iter().copied().collect()
    }

    pub fn enqueue(&mut self, from: usize, to: usize, message: Vec<u8>) {
        self.inboxes
            .entry(to)
            .or_default()
            .entry(from)
            .or_default()
            .push_back(message);
    }

    /// Queues `message` for every online replica except the sender. Offline
    /// senders produce no traffic.
    pub fn broadcast(&mut self, from: usize, message: Vec<u8>) {
        if !self.is_online(from) {
            return;
        }
        let receivers: Vec<usize> = self
            .online
            .iter()
            .copied()
            .filter(|&id| id != from)
            .collect();
        for to in receivers {
            self.enqueue(from, to, message.clone());
        }
    }

    /// Drops everything queued for `to`, whatever the sender.
    pub fn clear_inbox(&mut self, to: usize) {
        self.inboxes.remove(&to);
    }

    /// Pops one message for a random online receiver from a random sender
    /// queue, preserving per-sender FIFO order. Returns `(from, to, message)`.
    pub fn pop_random(&mut self, rng: &mut StdRng) -> Option<(usize, usize, Vec<u8>)> {
        let candidates: Vec<usize> = self
            .inboxes
            .iter()
            .filter(|(to, senders)| {
                self.online.contains(to) && senders.values().any(|queue| !queue.is_empty())
            })
            .map(|(to, _)| *to)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let to = candidates[rng.gen_range(0..candidates.len())];
        let senders = self.inboxes.get_mut(&to)?;
        let froms: Vec<usize> = senders
            .iter()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(from, _)| *from)
            .collect();
        let from = froms[rng.gen_range(0..froms.len())];
        let queue = senders.get_mut(&from)?;
        let message = queue.pop_front()?;
        if queue.is_empty() {
            senders.remove(&from);
            if senders.is_empty() {
                self.inboxes.remove(&to);
            }
        }
        Some((from, to, message))
    }

    /// Whether any online receiver still has queued messages.
    pub fn has_pending(&self) -> bool {
        self.inboxes.iter().any(|(to, senders)| {
            self.online.contains(to) && senders.values().any(|queue| !queue.is_empty())
        })
    }
}
