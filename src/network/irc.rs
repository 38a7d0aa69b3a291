//! Handle for the outbound server connection, with just enough protocol
//! tracking to replay channel state to a reattaching client.

use std::collections::BTreeMap;
use std::sync::Arc;

use ironbnc_proto::{Command, Message, Prefix};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{LinkEvent, TrafficStats};

/// Tracked state of one joined channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelState {
    /// Channel name as the server spelled it.
    pub name: String,
    pub topic: Option<String>,
}

#[derive(Debug, Default)]
struct IrcState {
    current_nick: Option<String>,
    /// Server-reported name, taken from the welcome numeric's prefix.
    server_name: Option<String>,
    /// Keyed by lowercased channel name.
    channels: BTreeMap<String, ChannelState>,
}

/// Session-layer view of the server socket.
pub struct IrcLink {
    /// Configured server host this connection was opened against.
    server: String,
    tx: mpsc::UnboundedSender<LinkEvent>,
    state: Mutex<IrcState>,
    stats: Mutex<Option<Arc<TrafficStats>>>,
}

impl IrcLink {
    pub fn channel(server: &str) -> (Arc<IrcLink>, mpsc::UnboundedReceiver<LinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let link = Arc::new(IrcLink {
            server: server.to_string(),
            tx,
            state: Mutex::new(IrcState::default()),
            stats: Mutex::new(None),
        });
        (link, rx)
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// The name the server introduced itself with, else the configured
    /// host.
    pub fn server_name(&self) -> String {
        self.state
            .lock()
            .server_name
            .clone()
            .unwrap_or_else(|| self.server.clone())
    }

    pub fn current_nick(&self) -> Option<String> {
        self.state.lock().current_nick.clone()
    }

    /// Record the nick sent during registration, before the server has
    /// confirmed anything.
    pub fn set_initial_nick(&self, nick: &str) {
        *self.state.lock() = IrcState {
            current_nick: Some(nick.to_string()),
            ..IrcState::default()
        };
    }

    /// Joined channels, sorted by name.
    pub fn channels(&self) -> Vec<ChannelState> {
        self.state.lock().channels.values().cloned().collect()
    }

    /// Attach the account's server-side traffic counters.
    pub fn set_traffic_stats(&self, stats: Arc<TrafficStats>) {
        *self.stats.lock() = Some(stats);
    }

    /// Update tracked state from one server-to-client line.
    pub fn observe(&self, msg: &Message) {
        if let Some(stats) = self.stats.lock().as_ref() {
            stats.record_in(msg.to_string().len() + 2);
        }

        let mut state = self.state.lock();
        let from_self = match (msg.source_nickname(), &state.current_nick) {
            (Some(source), Some(nick)) => source.eq_ignore_ascii_case(nick),
            _ => false,
        };

        match &msg.command {
            Command::Response(1, params) => {
                if let Some(nick) = params.first() {
                    state.current_nick = Some(nick.clone());
                }
                if let Some(Prefix::ServerName(name)) = &msg.prefix {
                    state.server_name = Some(name.clone());
                }
            }
            Command::JOIN(chan) if from_self => {
                state.channels.insert(
                    chan.to_ascii_lowercase(),
                    ChannelState {
                        name: chan.clone(),
                        topic: None,
                    },
                );
            }
            Command::PART(chan, _) if from_self => {
                state.channels.remove(&chan.to_ascii_lowercase());
            }
            Command::KICK(chan, victim, _) => {
                let kicked_me = state
                    .current_nick
                    .as_deref()
                    .is_some_and(|nick| victim.eq_ignore_ascii_case(nick));
                if kicked_me {
                    state.channels.remove(&chan.to_ascii_lowercase());
                }
            }
            Command::NICK(new_nick) if from_self => {
                state.current_nick = Some(new_nick.clone());
            }
            Command::TOPIC(chan, topic) => {
                if let Some(entry) = state.channels.get_mut(&chan.to_ascii_lowercase()) {
                    entry.topic = topic.clone();
                }
            }
            // RPL_TOPIC: <nick> <channel> :<topic>
            Command::Response(332, params) if params.len() >= 3 => {
                if let Some(entry) = state.channels.get_mut(&params[1].to_ascii_lowercase()) {
                    entry.topic = Some(params[2].clone());
                }
            }
            _ => {}
        }
    }

    /// Queue one line for the server.
    pub fn send(&self, msg: Message) {
        if let Some(stats) = self.stats.lock().as_ref() {
            stats.record_out(msg.to_string().len() + 2);
        }
        let _ = self.tx.send(LinkEvent::Line(msg));
    }

    /// Quit the network and close the socket.
    pub fn kill(&self, reason: &str) {
        let _ = self.tx.send(LinkEvent::Line(Message::from_command(
            Command::QUIT(Some(reason.to_string())),
        )));
        let _ = self.tx.send(LinkEvent::Close(reason.to_string()));
    }
}
