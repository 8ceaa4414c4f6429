//! Seeded multi-replica network simulator for convergence testing.
//!
//! A [`TestConnector`] owns a set of replicas (document plus sync handler)
//! and an in-memory bus with per-(sender, receiver) FIFO queues. Tests drive
//! it with connects, disconnects and randomized message flushes, then call
//! [`TestConnector::assert_converged`] to verify all replicas agree.

mod bus;
mod connector;

pub use connector::{ConnectorConfig, EncodingMode, Replica, TestConnector};
