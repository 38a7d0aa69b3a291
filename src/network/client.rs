//! Handle for one attached IRC client connection.

use std::net::SocketAddr;
use std::sync::Arc;

use ironbnc_proto::Message;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{LinkEvent, TrafficStats};

/// Session-layer view of a client socket.
///
/// Queued events are drained by the listener's writer task; once the
/// task has gone away sends become silent no-ops, which is the behavior
/// the session layer wants for a connection that is already dying.
pub struct ClientLink {
    peer: SocketAddr,
    tx: mpsc::UnboundedSender<LinkEvent>,
    nick: Mutex<Option<String>>,
    /// Account name, set once authentication succeeds. A name instead of
    /// an `Arc<User>` so a lingering link never keeps an account alive.
    owner: Mutex<Option<String>>,
    stats: Mutex<Option<Arc<TrafficStats>>>,
}

impl ClientLink {
    /// Create a link plus the receiver its I/O task drains.
    pub fn channel(peer: SocketAddr) -> (Arc<ClientLink>, mpsc::UnboundedReceiver<LinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let link = Arc::new(ClientLink {
            peer,
            tx,
            nick: Mutex::new(None),
            owner: Mutex::new(None),
            stats: Mutex::new(None),
        });
        (link, rx)
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn nick(&self) -> Option<String> {
        self.nick.lock().clone()
    }

    pub fn set_nick(&self, nick: &str) {
        *self.nick.lock() = Some(nick.to_string());
    }

    pub fn owner(&self) -> Option<String> {
        self.owner.lock().clone()
    }

    pub fn set_owner(&self, account: &str) {
        *self.owner.lock() = Some(account.to_string());
    }

    /// Attach the account's client-side traffic counters.
    pub fn set_traffic_stats(&self, stats: Arc<TrafficStats>) {
        *self.stats.lock() = Some(stats);
    }

    /// Queue one line for the client.
    pub fn send(&self, msg: Message) {
        if let Some(stats) = self.stats.lock().as_ref() {
            stats.record_out(msg.to_string().len() + 2);
        }
        let _ = self.tx.send(LinkEvent::Line(msg));
    }

    /// Count one inbound line from this client.
    pub fn note_received(&self, msg: &Message) {
        if let Some(stats) = self.stats.lock().as_ref() {
            stats.record_in(msg.to_string().len() + 2);
        }
    }

    /// Flush pending lines and close the connection.
    pub fn kill(&self, reason: &str) {
        let _ = self.tx.send(LinkEvent::Close(reason.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironbnc_proto::Command;

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    #[tokio::test]
    async fn send_queues_lines_in_order() {
        let (link, mut rx) = ClientLink::channel(peer());
        link.send(Message::from_command(Command::PING("a".into())));
        link.send(Message::from_command(Command::PING("b".into())));

        assert_eq!(
            rx.recv().await,
            Some(LinkEvent::Line(Message::from_command(Command::PING(
                "a".into()
            ))))
        );
        assert_eq!(
            rx.recv().await,
            Some(LinkEvent::Line(Message::from_command(Command::PING(
                "b".into()
            ))))
        );
    }

    #[tokio::test]
    async fn kill_queues_a_close_event() {
        let (link, mut rx) = ClientLink::channel(peer());
        link.kill("superseded");
        assert_eq!(rx.recv().await, Some(LinkEvent::Close("superseded".into())));
    }

    #[tokio::test]
    async fn send_after_receiver_drop_is_a_noop() {
        let (link, rx) = ClientLink::channel(peer());
        drop(rx);
        link.send(Message::from_command(Command::PING("x".into())));
        link.kill("late");
    }

    #[test]
    fn traffic_counters_track_wire_bytes() {
        let (link, _rx) = ClientLink::channel(peer());
        let stats = Arc::new(TrafficStats::new());
        link.set_traffic_stats(stats.clone());

        let msg = Message::from_command(Command::PING("x".into()));
        let wire_len = (msg.to_string().len() + 2) as u64;
        link.send(msg.clone());
        link.note_received(&msg);

        assert_eq!(stats.bytes_out(), wire_len);
        assert_eq!(stats.bytes_in(), wire_len);
    }
}
