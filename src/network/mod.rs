//! Connection endpoints as seen by the session layer.
//!
//! The session logic never touches sockets. Each live connection is
//! represented by a link handle (client side or server side) backed by an
//! unbounded event queue; an I/O task owned by the transport drains the
//! queue onto the wire. Killing a link enqueues a close event, so the
//! session layer can terminate connections without blocking.

mod client;
mod connector;
mod irc;
mod listener;

pub use client::ClientLink;
pub use connector::{ConnectRequest, IrcConnector, TcpConnector};
pub use irc::{ChannelState, IrcLink};
pub use listener::run_listener;

use std::sync::atomic::{AtomicU64, Ordering};

use ironbnc_proto::Message;

/// Event queued for a link's I/O task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Write one IRC line.
    Line(Message),
    /// Flush and close the connection with a reason.
    Close(String),
}

/// Byte/message accumulators for one direction pair of an account.
#[derive(Debug, Default)]
pub struct TrafficStats {
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    messages_in: AtomicU64,
    messages_out: AtomicU64,
}

impl TrafficStats {
    pub fn new() -> TrafficStats {
        TrafficStats::default()
    }

    pub fn record_in(&self, bytes: usize) {
        self.bytes_in.fetch_add(bytes as u64, Ordering::Relaxed);
        self.messages_in.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_out(&self, bytes: usize) {
        self.bytes_out.fetch_add(bytes as u64, Ordering::Relaxed);
        self.messages_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_in(&self) -> u64 {
        self.bytes_in.load(Ordering::Relaxed)
    }

    pub fn bytes_out(&self) -> u64 {
        self.bytes_out.load(Ordering::Relaxed)
    }

    pub fn messages_in(&self) -> u64 {
        self.messages_in.load(Ordering::Relaxed)
    }

    pub fn messages_out(&self) -> u64 {
        self.messages_out.load(Ordering::Relaxed)
    }
}
