//! The account session: one [`User`] per registered account.
//!
//! A user owns at most one attached client connection and at most one
//! outbound server connection, and is the sole authority on which link
//! is current. Everything persistent about the account lives in its
//! property store; the session layer holds no state of its own beyond
//! the live links, the reconnect schedule and the in-memory bad-login
//! table.
//!
//! Locking discipline: the link and scheduler mutexes are held only for
//! the structural mutation itself. Notices, hook fan-out and global
//! announcements all happen after the locks are released, since those
//! paths may re-enter the session (a global notice walks every user).

pub mod reconnect;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Local, Utc};
use ironbnc_proto::{Command, Message, Prefix};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_rustls::rustls::pki_types::CertificateDer;
use tracing::{debug, info, warn};

use crate::bouncer::NoticeHub;
use crate::config::{Config, PropertyStore};
use crate::error::{LoginError, StoreError};
use crate::hooks::HookRegistry;
use crate::log::MessageLog;
use crate::network::{ClientLink, ConnectRequest, IrcConnector, IrcLink, TrafficStats};
use crate::security::certs::ClientCertStore;
use crate::security::{self, BadLoginThrottle, HostAllowList};

use reconnect::{ACCOUNT_COOLDOWN, ReconnectGate, effective_delay};

/// Delay requested after losing the server connection; the effective
/// delay still honors the global gate and the account cooldown.
const DISCONNECT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Default IRC port when the account has none configured.
const DEFAULT_PORT: u16 = 6667;

/// Source identity of bouncer-generated notices.
const SERVICE_NICK: &str = "-bnc";

/// Dependencies shared by every account session.
#[derive(Clone)]
pub struct UserShared {
    pub config: Arc<Config>,
    pub hooks: Arc<HookRegistry>,
    pub gate: Arc<ReconnectGate>,
    pub connector: Arc<dyn IrcConnector>,
    pub hub: Arc<NoticeHub>,
}

#[derive(Default)]
struct LinkState {
    client: Option<Arc<ClientLink>>,
    irc: Option<Arc<IrcLink>>,
}

#[derive(Default)]
struct SchedState {
    /// Target of the armed timer; only ever moved forward.
    reconnect_at: Option<Instant>,
    /// When this account last attempted an outbound connection.
    last_attempt: Option<Instant>,
    timer: Option<JoinHandle<()>>,
    /// A reconnect attempt is in flight; suppresses re-entry and the
    /// auto-reschedule of the teardown it performs.
    connecting: bool,
}

/// One registered account and its live session state.
pub struct User {
    name: String,
    store: PropertyStore,
    shared: UserShared,
    log: MessageLog,
    links: Mutex<LinkState>,
    sched: Mutex<SchedState>,
    badlogins: Mutex<BadLoginThrottle>,
    host_allows: Mutex<HostAllowList>,
    certs: Mutex<Box<dyn ClientCertStore>>,
    admin_cache: Mutex<Option<bool>>,
    client_stats: Arc<TrafficStats>,
    irc_stats: Arc<TrafficStats>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User").field("name", &self.name).finish_non_exhaustive()
    }
}

impl User {
    /// Load an account from its property store, firing the load hook and
    /// scheduling an immediate reconnect when the account wants one.
    pub fn load(name: &str, shared: UserShared) -> Result<Arc<User>, StoreError> {
        let users_dir = shared.config.users_dir();
        let store = PropertyStore::open(users_dir.join(format!("{name}.conf")))?;
        let host_allows = HostAllowList::from_store(&store);
        let certs = security::open_store(
            shared.config.system.certificates,
            users_dir.join(format!("{name}.pem")),
        )?;
        let log = MessageLog::new(users_dir.join(format!("{name}.log")));

        let user = Arc::new(User {
            name: name.to_string(),
            store,
            shared,
            log,
            links: Mutex::new(LinkState::default()),
            sched: Mutex::new(SchedState::default()),
            badlogins: Mutex::new(BadLoginThrottle::new()),
            host_allows: Mutex::new(host_allows),
            certs: Mutex::new(certs),
            admin_cache: Mutex::new(None),
            client_stats: Arc::new(TrafficStats::new()),
            irc_stats: Arc::new(TrafficStats::new()),
        });

        user.shared.hooks.user_load(name);
        if user.get_server().is_some() && !user.is_quitted() {
            user.schedule_reconnect(Duration::ZERO);
        }
        Ok(user)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &PropertyStore {
        &self.store
    }

    pub fn has_client(&self) -> bool {
        self.links.lock().client.is_some()
    }

    pub fn has_server(&self) -> bool {
        self.links.lock().irc.is_some()
    }

    /// Whether the offline message log has unread content.
    pub fn log_is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn client_stats(&self) -> &Arc<TrafficStats> {
        &self.client_stats
    }

    pub fn irc_stats(&self) -> &Arc<TrafficStats> {
        &self.irc_stats
    }

    // ---- attach / detach ------------------------------------------------

    /// Bind a freshly authenticated client to this account and replay
    /// session state to it.
    pub fn attach(self: &Arc<Self>, client: Arc<ClientLink>) -> Result<(), LoginError> {
        if self.is_locked() {
            let err = LoginError::Locked {
                reason: self.suspend_reason(),
            };
            warn!(user = %self.name, peer = %client.peer(), "attach rejected, account locked");
            client.kill(&err.kill_line());
            return Err(err);
        }

        client.set_traffic_stats(self.client_stats.clone());
        self.set_client_connection(Some(client.clone()), true);

        info!(user = %self.name, peer = %client.peer(), "client attached");
        self.shared
            .hub
            .global_notice(&format!("User {} logged on from {}.", self.name, client.peer()));

        let irc = self.links.lock().irc.clone();
        match &irc {
            Some(irc) => {
                self.replay_session(&client, irc);
                if self.delay_join() {
                    self.join_configured_channels();
                }
            }
            None => {
                self.replay_offline_log();
                self.schedule_reconnect(Duration::ZERO);
            }
        }

        if let Some(motd) = &self.shared.config.system.motd {
            self.notice(motd);
        }

        self.shared.hooks.attach_client(&self.name);

        if irc.is_none() && self.get_server().is_none() {
            self.notice("You haven't set a server yet. Use /msg -bnc set server <host> <port> to set one.");
        }
        if irc.is_some() && !self.log.is_empty() {
            self.notice("You have new messages. Use /msg -bnc read to read them.");
        }
        Ok(())
    }

    /// Replay the live server session to a newly attached client so its
    /// state converges with the server's.
    fn replay_session(&self, client: &Arc<ClientLink>, irc: &Arc<IrcLink>) {
        // Undo the detached-state presence before the client sees anything.
        irc.send(Message::from_command(Command::AWAY(None)));
        if let Some(automodes) = self.get_automodes() {
            if let Some(nick) = irc.current_nick() {
                irc.send(Message::from_command(Command::MODE(nick, vec![automodes])));
            }
        }

        let client_nick = client.nick().unwrap_or_else(|| self.name.clone());
        let server_nick = irc.current_nick().unwrap_or_else(|| client_nick.clone());
        if server_nick != client_nick {
            // Synthetic rename so the client adopts the server-side nick.
            client.send(Message::new(
                Some(Prefix::Nickname(
                    client_nick,
                    self.get_ident(),
                    "bouncer".to_string(),
                )),
                Command::NICK(server_nick.clone()),
            ));
            client.set_nick(&server_nick);
        }

        let server_name = irc.server_name();
        client.send(Message::response(
            &server_name,
            1,
            &server_nick,
            &["Welcome back to your session"],
        ));

        let motd = std::fs::read_to_string(self.shared.config.motd_path()).unwrap_or_default();
        if motd.trim().is_empty() {
            client.send(Message::response(
                &server_name,
                422,
                &server_nick,
                &["MOTD File is missing"],
            ));
        } else {
            client.send(Message::response(
                &server_name,
                375,
                &server_nick,
                &[&format!("- {server_name} Message of the Day -")],
            ));
            for line in motd.lines() {
                client.send(Message::response(
                    &server_name,
                    372,
                    &server_nick,
                    &[&format!("- {line}")],
                ));
            }
            client.send(Message::response(
                &server_name,
                376,
                &server_nick,
                &["End of /MOTD command."],
            ));
        }

        for channel in irc.channels() {
            client.send(Message::new(
                Some(Prefix::Nickname(
                    server_nick.clone(),
                    self.get_ident(),
                    "bouncer".to_string(),
                )),
                Command::JOIN(channel.name.clone()),
            ));
            // Let the server answer straight at the client.
            irc.send(Message::from_command(Command::TOPIC(
                channel.name.clone(),
                None,
            )));
            irc.send(Message::from_command(Command::NAMES(channel.name)));
        }
    }

    /// Join the account's configured auto-join channels, skipping any the
    /// session is already in.
    fn join_configured_channels(&self) {
        let Some(irc) = self.links.lock().irc.clone() else {
            return;
        };
        let joined: Vec<String> = irc
            .channels()
            .into_iter()
            .map(|c| c.name.to_ascii_lowercase())
            .collect();
        for channel in self.get_channels() {
            if !joined.contains(&channel.to_ascii_lowercase()) {
                irc.send(Message::from_command(Command::JOIN(channel)));
            }
        }
    }

    /// Play and drain the offline message log.
    fn replay_offline_log(&self) {
        let lines = match self.log.lines() {
            Ok(lines) => lines,
            Err(e) => {
                warn!(user = %self.name, error = %e, "could not read offline log");
                return;
            }
        };
        if lines.is_empty() {
            return;
        }
        self.notice("Replaying messages you missed:");
        for line in &lines {
            self.notice(line);
        }
        self.notice("End of messages.");
        if let Err(e) = self.log.clear() {
            warn!(user = %self.name, error = %e, "could not truncate offline log");
        }
    }

    /// Swap the attached client. `seamless` suppresses the logoff side
    /// effects when an old client is being superseded by a new one.
    pub fn set_client_connection(self: &Arc<Self>, client: Option<Arc<ClientLink>>, seamless: bool) {
        let old = {
            let mut links = self.links.lock();
            if links.client.is_none() && client.is_none() {
                return;
            }
            let old = links.client.take();
            links.client.clone_from(&client);
            old
        };

        let Some(old) = old else {
            return;
        };
        if let Some(new) = &client {
            if Arc::ptr_eq(&old, new) {
                return;
            }
        }

        if seamless && client.is_some() {
            // Handoff: close the superseded client without touching the
            // server-side presence.
            old.kill("Another client has connected.");
            info!(user = %self.name, old_peer = %old.peer(), "seamless client takeover");
            self.shared.hooks.detach_client(&self.name);
            return;
        }

        info!(user = %self.name, peer = %old.peer(), "client detached");
        self.shared
            .hub
            .global_notice(&format!("User {} logged off.", self.name));
        if let Err(e) = self.stamp_seen() {
            warn!(user = %self.name, error = %e, "could not stamp last-seen time");
        }
        self.shared.hooks.detach_client(&self.name);
        self.push_away_state();
    }

    /// Apply the configured detached-state presence to the live server
    /// session: drop modes, away nick, away message.
    fn push_away_state(&self) {
        let Some(irc) = self.links.lock().irc.clone() else {
            return;
        };

        if let Some(dropmodes) = self.get_dropmodes() {
            if let Some(nick) = irc.current_nick() {
                irc.send(Message::from_command(Command::MODE(nick, vec![dropmodes])));
            }
        }
        if let Some(awaynick) = self.get_awaynick() {
            irc.send(Message::from_command(Command::NICK(awaynick)));
        }
        if let Some(mut away) = self.get_away_text() {
            if self.append_away_timestamp() {
                let stamp = Local::now().format("%a %b %e %H:%M:%S %Y");
                away = format!("{away} (Away since {stamp})");
            }
            irc.send(Message::from_command(Command::AWAY(Some(away))));
        }
    }

    /// Transport callback: a client socket went away. Only detaches if
    /// that socket is still the current client.
    pub fn client_connection_lost(self: &Arc<Self>, link: &Arc<ClientLink>) {
        let is_current = {
            let links = self.links.lock();
            links.client.as_ref().is_some_and(|c| Arc::ptr_eq(c, link))
        };
        if is_current {
            self.set_client_connection(None, false);
        }
    }

    // ---- server connection ----------------------------------------------

    /// Bind or clear the outbound server connection.
    pub fn set_irc_connection(self: &Arc<Self>, irc: Option<Arc<IrcLink>>) {
        let had_old = {
            let mut links = self.links.lock();
            let had_old = links.irc.is_some();
            if !had_old && irc.is_none() {
                return;
            }
            links.irc.clone_from(&irc);
            had_old
        };

        match irc {
            Some(link) => {
                {
                    let mut sched = self.sched.lock();
                    if let Some(timer) = sched.timer.take() {
                        timer.abort();
                    }
                    sched.reconnect_at = None;
                    sched.last_attempt = Some(Instant::now());
                }
                link.set_traffic_stats(self.irc_stats.clone());
                info!(user = %self.name, server = %link.server(), "server connection bound");
                self.shared.hooks.server_connect(&self.name);
            }
            None => {
                if !had_old {
                    return;
                }
                warn!(user = %self.name, "server connection cleared");
                self.shared.hooks.server_disconnect(&self.name);

                if self.has_client() {
                    self.notice("Disconnected from the server.");
                } else if let Err(e) = self.log.write_line("Disconnected from the server.") {
                    warn!(user = %self.name, error = %e, "could not write offline log");
                }
                self.shared
                    .hub
                    .global_notice(&format!("User {} was disconnected from the server.", self.name));

                let reconnecting = self.sched.lock().connecting;
                if !reconnecting && !self.is_quitted() {
                    self.schedule_reconnect(DISCONNECT_RETRY_DELAY);
                }
            }
        }
    }

    /// Transport callback: the server socket went away.
    pub fn server_connection_lost(self: &Arc<Self>, link: &Arc<IrcLink>) {
        let is_current = {
            let links = self.links.lock();
            links.irc.as_ref().is_some_and(|c| Arc::ptr_eq(c, link))
        };
        if is_current {
            self.set_irc_connection(None);
        }
    }

    /// One line arrived from the server. Forwarded verbatim when a
    /// client is attached; private messages are buffered otherwise.
    pub fn handle_server_message(&self, msg: Message) {
        let (client, irc_nick) = {
            let links = self.links.lock();
            (
                links.client.clone(),
                links.irc.as_ref().and_then(|i| i.current_nick()),
            )
        };

        if let Command::Response(1, _) = &msg.command {
            // Registered with the server; join the configured channels
            // now unless the account defers that to the next attach.
            if !self.delay_join() {
                self.join_configured_channels();
            }
        }

        if let Some(client) = client {
            client.send(msg);
            return;
        }

        if let Command::PRIVMSG(target, text) = &msg.command {
            let to_me = irc_nick.is_some_and(|nick| target.eq_ignore_ascii_case(&nick));
            if to_me {
                let from = msg.source_nickname().unwrap_or("server");
                if let Err(e) = self.log.write_line(&format!("{from}: {text}")) {
                    warn!(user = %self.name, error = %e, "could not write offline log");
                }
            }
        }
    }

    /// One line arrived from the attached client.
    pub fn forward_from_client(&self, msg: Message) {
        let irc = self.links.lock().irc.clone();
        match irc {
            Some(irc) => irc.send(msg),
            None => self.notice("You are not connected to a server."),
        }
    }

    // ---- reconnect scheduling -------------------------------------------

    /// Arm (or push back) the reconnect timer.
    pub fn schedule_reconnect(self: &Arc<Self>, requested: Duration) {
        if self.has_server() {
            return;
        }
        if self.is_quitted() {
            if !requested.is_zero() {
                return;
            }
            // An immediate reconnect request is explicit intent to wake
            // a dormant account.
            if let Err(e) = self.mark_quitted(false) {
                warn!(user = %self.name, error = %e, "could not clear quitted flag");
            }
        }

        let since_last = self.sched.lock().last_attempt.map(|t| t.elapsed());
        let delay = effective_delay(
            requested,
            self.shared.gate.remaining(),
            since_last,
            self.is_admin(),
        );
        let target = Instant::now() + delay;

        {
            let mut sched = self.sched.lock();
            if let Some(at) = sched.reconnect_at {
                // Never pull a scheduled attempt earlier.
                if target <= at {
                    return;
                }
            }
            if let Some(timer) = sched.timer.take() {
                timer.abort();
            }
            sched.reconnect_at = Some(target);

            let weak = Arc::downgrade(self);
            sched.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Some(user) = weak.upgrade() {
                    user.reconnect_timer_fired().await;
                }
            }));
        }

        debug!(user = %self.name, delay_secs = delay.as_secs(), "reconnect scheduled");
        if self.get_server().is_some() {
            self.notice(&format!(
                "Scheduled reconnect in {} seconds.",
                delay.as_secs()
            ));
        }
    }

    async fn reconnect_timer_fired(self: Arc<Self>) {
        self.sched.lock().timer = None;
        // The timer may race a successful bind; cancellation is not
        // instantaneous.
        if self.has_server() {
            return;
        }
        self.sched.lock().reconnect_at = None;
        self.reconnect().await;
    }

    /// Whether a scheduler pulse should attempt a reconnect now.
    pub fn should_reconnect(&self) -> bool {
        if self.has_server() || self.is_quitted() || self.get_server().is_none() {
            return false;
        }
        let sched = self.sched.lock();
        if sched.connecting {
            return false;
        }
        let due = sched
            .reconnect_at
            .is_some_and(|at| at <= Instant::now());
        if !due {
            return false;
        }
        if let Some(last) = sched.last_attempt {
            if !self.is_admin() && last.elapsed() < ACCOUNT_COOLDOWN {
                return false;
            }
        }
        self.shared.gate.is_open()
    }

    /// Scheduler pulse entry point: attempt a reconnect if one is due.
    pub async fn poll_reconnect(self: &Arc<Self>) {
        if !self.should_reconnect() {
            return;
        }
        self.sched.lock().reconnect_at = None;
        self.reconnect().await;
    }

    /// Open a fresh server connection, tearing down any existing one.
    pub async fn reconnect(self: &Arc<Self>) {
        {
            let mut sched = self.sched.lock();
            if sched.connecting {
                return;
            }
            sched.connecting = true;
        }
        self.do_reconnect().await;
        self.sched.lock().connecting = false;
    }

    async fn do_reconnect(self: &Arc<Self>) {
        let existing = self.links.lock().irc.clone();
        if let Some(irc) = existing {
            irc.kill("Reconnecting");
            self.set_irc_connection(None);
        }
        {
            let mut sched = self.sched.lock();
            if let Some(timer) = sched.timer.take() {
                timer.abort();
            }
            sched.reconnect_at = None;
        }

        let Some(server) = self.get_server() else {
            warn!(user = %self.name, "cannot reconnect, no server configured");
            self.notice("You haven't set a server yet. Use /msg -bnc set server <host> <port> to set one.");
            self.schedule_reconnect(ACCOUNT_COOLDOWN);
            return;
        };
        let port = self.get_port();

        // Claim the process-wide gate; losing the race just means waiting
        // for it to reopen.
        if let Err(remaining) = self.shared.gate.try_pass() {
            self.schedule_reconnect(remaining + Duration::from_secs(1));
            return;
        }

        self.notice(&format!("Trying to reconnect to {server}:{port}"));
        info!(user = %self.name, server = %server, port, "connecting to server");
        self.shared
            .hub
            .global_notice(&format!("Trying to reconnect {} to {server}:{port}.", self.name));

        self.sched.lock().last_attempt = Some(Instant::now());

        let request = ConnectRequest {
            host: server.clone(),
            port,
            ssl: self.uses_ssl(),
            bind_addr: self.get_bind_addr(),
            nick: self.get_nick(),
            ident: self.get_ident(),
            realname: self.get_realname(),
            server_password: self.get_server_password(),
        };

        match self.shared.connector.connect(request, self.clone()).await {
            Ok(link) => self.set_irc_connection(Some(link)),
            Err(e) => {
                warn!(user = %self.name, server = %server, error = %e, "connection failed");
                self.notice(&format!("Failed to connect to {server}:{port}: {e}"));
                self.shared
                    .hub
                    .global_notice(&format!("User {} failed to connect: {e}", self.name));
                // Leave the attempt due; the next scheduler pulse retries
                // once the cooldowns allow it.
                self.sched.lock().reconnect_at = Some(Instant::now());
            }
        }
    }

    // ---- notices ---------------------------------------------------------

    /// Send an in-band notice to the attached client, if any.
    pub fn notice(&self, text: &str) {
        let client = self.links.lock().client.clone();
        let Some(client) = client else {
            return;
        };
        let nick = client.nick().unwrap_or_else(|| self.name.clone());
        client.send(Message::new(
            Some(Prefix::Nickname(
                SERVICE_NICK.to_string(),
                "bouncer".to_string(),
                "ironbnc".to_string(),
            )),
            Command::NOTICE(nick, text.to_string()),
        ));
    }

    // ---- access control ---------------------------------------------------

    pub fn log_bad_login(&self, addr: IpAddr) {
        self.badlogins.lock().log_bad_login(addr);
    }

    pub fn is_ip_blocked(&self, addr: IpAddr) -> bool {
        self.badlogins.lock().is_blocked(addr)
    }

    pub fn decay_bad_logins(&self) {
        self.badlogins.lock().decay_pulse();
    }

    pub fn can_host_connect(&self, host: &str) -> bool {
        self.host_allows.lock().can_connect(host)
    }

    pub fn add_host_allow(&self, mask: &str) -> Result<bool, StoreError> {
        let mut list = self.host_allows.lock();
        if !list.add(mask) {
            return Ok(false);
        }
        list.persist(&self.store)?;
        Ok(true)
    }

    pub fn remove_host_allow(&self, mask: &str) -> Result<bool, StoreError> {
        let mut list = self.host_allows.lock();
        if !list.remove(mask) {
            return Ok(false);
        }
        list.persist(&self.store)?;
        Ok(true)
    }

    pub fn host_allows(&self) -> Vec<String> {
        self.host_allows.lock().masks().to_vec()
    }

    pub fn add_client_certificate(&self, cert: CertificateDer<'static>) -> Result<bool, StoreError> {
        Ok(self.certs.lock().add(cert)?)
    }

    pub fn remove_client_certificate(&self, cert: &CertificateDer<'_>) -> Result<bool, StoreError> {
        Ok(self.certs.lock().remove(cert)?)
    }

    pub fn find_client_certificate(&self, cert: &CertificateDer<'_>) -> bool {
        self.certs.lock().contains(cert)
    }

    /// Check a supplied password against the stored credential.
    pub fn validate_password(&self, supplied: Option<&str>) -> bool {
        security::password::validate(
            self.store.read_str("user.password").as_deref(),
            supplied,
            self.shared.config.system.md5,
        )
    }

    pub fn set_password(&self, password: &str) -> Result<(), StoreError> {
        let stored = if self.shared.config.system.md5 {
            security::password::hash_password(password)
        } else {
            password.to_string()
        };
        self.store.write_str("user.password", &stored)
    }

    // ---- persistent settings ---------------------------------------------

    pub fn get_server(&self) -> Option<String> {
        self.store.read_str("user.server").filter(|s| !s.is_empty())
    }

    pub fn set_server(&self, server: &str) -> Result<(), StoreError> {
        self.store.write_str("user.server", server)
    }

    pub fn get_port(&self) -> u16 {
        match self.store.read_int("user.port") {
            port @ 1..=65535 => port as u16,
            _ => DEFAULT_PORT,
        }
    }

    pub fn set_port(&self, port: u16) -> Result<(), StoreError> {
        self.store.write_int("user.port", i64::from(port))
    }

    /// The nick for the next registration: live client nick, then the
    /// server session's nick, then the configured away nick, the
    /// configured nick, and finally the account name.
    pub fn get_nick(&self) -> String {
        let links = self.links.lock();
        if let Some(nick) = links.client.as_ref().and_then(|c| c.nick()) {
            return nick;
        }
        if let Some(nick) = links.irc.as_ref().and_then(|i| i.current_nick()) {
            return nick;
        }
        drop(links);
        self.get_awaynick()
            .or_else(|| self.store.read_str("user.nick").filter(|s| !s.is_empty()))
            .unwrap_or_else(|| self.name.clone())
    }

    pub fn set_nick(&self, nick: &str) -> Result<(), StoreError> {
        self.store.write_str("user.nick", nick)
    }

    pub fn get_awaynick(&self) -> Option<String> {
        self.store.read_str("user.awaynick").filter(|s| !s.is_empty())
    }

    pub fn set_awaynick(&self, nick: &str) -> Result<(), StoreError> {
        self.store.write_str("user.awaynick", nick)
    }

    pub fn get_away_text(&self) -> Option<String> {
        self.store.read_str("user.away").filter(|s| !s.is_empty())
    }

    pub fn set_away_text(&self, text: &str) -> Result<(), StoreError> {
        self.store.write_str("user.away", text)
    }

    /// Append an "Away since" timestamp to the away message on detach.
    pub fn append_away_timestamp(&self) -> bool {
        self.store.read_int("user.ts") != 0
    }

    pub fn get_realname(&self) -> String {
        self.store
            .read_str("user.realname")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.shared.config.system.realname.clone())
    }

    pub fn set_realname(&self, realname: &str) -> Result<(), StoreError> {
        self.store.write_str("user.realname", realname)
    }

    pub fn get_ident(&self) -> String {
        self.store
            .read_str("user.ident")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.name.clone())
    }

    pub fn get_bind_addr(&self) -> Option<String> {
        self.store
            .read_str("user.ip")
            .filter(|s| !s.is_empty())
            .or_else(|| self.shared.config.system.vhost.clone())
    }

    pub fn get_server_password(&self) -> Option<String> {
        self.store.read_str("user.spass").filter(|s| !s.is_empty())
    }

    pub fn get_automodes(&self) -> Option<String> {
        self.store.read_str("user.automodes").filter(|s| !s.is_empty())
    }

    pub fn get_dropmodes(&self) -> Option<String> {
        self.store.read_str("user.dropmodes").filter(|s| !s.is_empty())
    }

    pub fn get_channels(&self) -> Vec<String> {
        self.store
            .read_str("user.channels")
            .map(|value| {
                value
                    .split(',')
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn delay_join(&self) -> bool {
        self.store.read_int("user.delayjoin") != 0
    }

    pub fn uses_ssl(&self) -> bool {
        self.store.read_int("user.ssl") != 0
    }

    pub fn is_locked(&self) -> bool {
        self.store.read_int("user.lock") != 0 || self.suspend_reason().is_some()
    }

    pub fn set_locked(&self, locked: bool) -> Result<(), StoreError> {
        self.store.write_int("user.lock", i64::from(locked))
    }

    pub fn suspend_reason(&self) -> Option<String> {
        self.store.read_str("user.suspend").filter(|s| !s.is_empty())
    }

    pub fn set_suspend_reason(&self, reason: Option<&str>) -> Result<(), StoreError> {
        match reason {
            Some(reason) => self.store.write_str("user.suspend", reason),
            None => self.store.remove("user.suspend"),
        }
    }

    pub fn is_quitted(&self) -> bool {
        self.store.read_int("user.quitted") != 0
    }

    pub fn mark_quitted(&self, quitted: bool) -> Result<(), StoreError> {
        self.store.write_int("user.quitted", i64::from(quitted))
    }

    /// Administrator flag, cached after the first read and invalidated
    /// on write.
    pub fn is_admin(&self) -> bool {
        let mut cache = self.admin_cache.lock();
        match *cache {
            Some(admin) => admin,
            None => {
                let admin = self.store.read_int("user.admin") != 0;
                *cache = Some(admin);
                admin
            }
        }
    }

    pub fn set_admin(&self, admin: bool) -> Result<(), StoreError> {
        self.store.write_int("user.admin", i64::from(admin))?;
        *self.admin_cache.lock() = Some(admin);
        Ok(())
    }

    pub fn last_seen(&self) -> i64 {
        self.store.read_int("user.seen")
    }

    fn stamp_seen(&self) -> Result<(), StoreError> {
        self.store.write_int("user.seen", Utc::now().timestamp())
    }

    /// Tear down the session: kill both links and cancel the timer.
    /// Used on account deletion and process shutdown.
    pub fn shutdown(&self, reason: &str) {
        {
            let mut sched = self.sched.lock();
            if let Some(timer) = sched.timer.take() {
                timer.abort();
            }
            sched.reconnect_at = None;
            sched.connecting = true;
        }
        let (client, irc) = {
            let mut links = self.links.lock();
            (links.client.take(), links.irc.take())
        };
        if let Some(client) = client {
            client.kill(reason);
        }
        if let Some(irc) = irc {
            irc.kill(reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::net::SocketAddr;
    use tempfile::{TempDir, tempdir};
    use tokio::sync::mpsc;

    use crate::error::ConnectError;
    use crate::network::LinkEvent;

    /// Connector that hands out dead links without any I/O.
    struct FakeConnector;

    #[async_trait]
    impl IrcConnector for FakeConnector {
        async fn connect(
            &self,
            request: ConnectRequest,
            _user: Arc<User>,
        ) -> Result<Arc<IrcLink>, ConnectError> {
            let (link, _rx) = IrcLink::channel(&request.host);
            link.set_initial_nick(&request.nick);
            Ok(link)
        }
    }

    fn test_shared(dir: &TempDir) -> UserShared {
        let mut config = Config::default();
        config.server.data_dir = dir.path().to_path_buf();
        UserShared {
            config: Arc::new(config),
            hooks: Arc::new(HookRegistry::new()),
            gate: Arc::new(ReconnectGate::new(Duration::ZERO)),
            connector: Arc::new(FakeConnector),
            hub: Arc::new(NoticeHub::new()),
        }
    }

    fn peer(last: u8) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, last], 50000))
    }

    fn client(last: u8) -> (Arc<ClientLink>, mpsc::UnboundedReceiver<LinkEvent>) {
        let (link, rx) = ClientLink::channel(peer(last));
        link.set_nick("alice");
        (link, rx)
    }

    /// A server link whose outbound queue the test can inspect.
    fn server_link() -> (Arc<IrcLink>, mpsc::UnboundedReceiver<LinkEvent>) {
        let (link, rx) = IrcLink::channel("irc.example.net");
        link.set_initial_nick("alice");
        link.observe(&":hub.example.net 001 alice :Welcome".parse().unwrap());
        (link, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<LinkEvent>) -> Vec<LinkEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn at_most_one_client_is_bound() {
        let dir = tempdir().unwrap();
        let user = User::load("alice", test_shared(&dir)).unwrap();

        let (first, mut first_rx) = client(1);
        let (second, _second_rx) = client(2);

        user.attach(first).unwrap();
        assert!(user.has_client());

        user.attach(second).unwrap();
        assert!(user.has_client());

        // The superseded client was closed, not left dangling.
        let events = drain(&mut first_rx);
        assert!(
            events
                .iter()
                .any(|e| matches!(e, LinkEvent::Close(reason) if reason.contains("Another client"))),
            "first client was not superseded: {events:?}"
        );
    }

    #[tokio::test]
    async fn locked_account_rejects_attach() {
        let dir = tempdir().unwrap();
        let user = User::load("alice", test_shared(&dir)).unwrap();
        user.store().write_str("user.suspend", "abuse").unwrap();

        let (link, mut rx) = client(1);
        let err = user.attach(link).unwrap_err();
        assert!(matches!(err, LoginError::Locked { reason: Some(_) }));
        assert!(!user.has_client());

        let events = drain(&mut rx);
        assert!(
            events
                .iter()
                .any(|e| matches!(e, LinkEvent::Close(reason) if reason.contains("abuse")))
        );
    }

    #[tokio::test]
    async fn genuine_detach_pushes_away_state_but_handoff_does_not() {
        let dir = tempdir().unwrap();
        let user = User::load("alice", test_shared(&dir)).unwrap();
        user.store().write_str("user.awaynick", "alice_off").unwrap();
        user.store().write_str("user.away", "gone").unwrap();

        let (irc, mut irc_rx) = server_link();
        user.set_irc_connection(Some(irc));

        let (first, _first_rx) = client(1);
        user.attach(first).unwrap();
        let (second, _second_rx) = client(2);
        user.attach(second.clone()).unwrap();
        let handoff = drain(&mut irc_rx);
        assert!(
            handoff
                .iter()
                .all(|e| !matches!(e, LinkEvent::Line(m) if matches!(&m.command, Command::AWAY(Some(_))))),
            "handoff pushed an away message: {handoff:?}"
        );

        user.client_connection_lost(&second);
        assert!(!user.has_client());
        let logoff = drain(&mut irc_rx);
        assert!(
            logoff
                .iter()
                .any(|e| matches!(e, LinkEvent::Line(m) if matches!(&m.command, Command::NICK(n) if n == "alice_off")))
        );
        assert!(
            logoff
                .iter()
                .any(|e| matches!(e, LinkEvent::Line(m) if matches!(&m.command, Command::AWAY(Some(text)) if text == "gone")))
        );
    }

    #[tokio::test]
    async fn stale_client_loss_does_not_detach_the_replacement() {
        let dir = tempdir().unwrap();
        let user = User::load("alice", test_shared(&dir)).unwrap();

        let (first, _first_rx) = client(1);
        let (second, _second_rx) = client(2);
        user.attach(first.clone()).unwrap();
        user.attach(second).unwrap();

        // The transport reporting the old socket's death must not touch
        // the current client.
        user.client_connection_lost(&first);
        assert!(user.has_client());
    }

    #[tokio::test]
    async fn server_messages_forward_when_attached_and_buffer_when_not() {
        let dir = tempdir().unwrap();
        let user = User::load("alice", test_shared(&dir)).unwrap();

        let (irc, _irc_rx) = server_link();
        user.set_irc_connection(Some(irc));

        let (link, mut rx) = client(1);
        user.attach(link).unwrap();
        drain(&mut rx);

        let privmsg: Message = ":bob!b@h PRIVMSG alice :hi".parse().unwrap();
        user.handle_server_message(privmsg.clone());
        let events = drain(&mut rx);
        assert!(
            events
                .iter()
                .any(|e| matches!(e, LinkEvent::Line(m) if *m == privmsg))
        );

        user.set_client_connection(None, false);
        user.handle_server_message(privmsg);
        assert!(
            !user.log_is_empty(),
            "offline private message was not buffered"
        );
    }

    #[tokio::test]
    async fn welcome_numeric_joins_configured_channels() {
        let dir = tempdir().unwrap();
        let user = User::load("alice", test_shared(&dir)).unwrap();
        user.store().write_str("user.channels", "#a,#b").unwrap();

        let (irc, mut irc_rx) = server_link();
        user.set_irc_connection(Some(irc));
        user.handle_server_message(":hub.example.net 001 alice :Welcome".parse().unwrap());

        let joins: Vec<String> = drain(&mut irc_rx)
            .into_iter()
            .filter_map(|e| match e {
                LinkEvent::Line(m) => match m.command {
                    Command::JOIN(chan) => Some(chan),
                    _ => None,
                },
                _ => None,
            })
            .collect();
        assert_eq!(joins, vec!["#a", "#b"]);
    }

    #[tokio::test]
    async fn binding_a_server_cancels_the_pending_timer() {
        let dir = tempdir().unwrap();
        let user = User::load("alice", test_shared(&dir)).unwrap();
        user.store().write_str("user.server", "irc.example.net").unwrap();

        user.schedule_reconnect(Duration::from_secs(300));
        assert!(user.sched.lock().reconnect_at.is_some());

        let (irc, _irc_rx) = server_link();
        user.set_irc_connection(Some(irc));
        assert!(user.sched.lock().reconnect_at.is_none());
        assert!(!user.should_reconnect());
    }

    #[tokio::test]
    async fn scheduled_time_only_moves_forward() {
        let dir = tempdir().unwrap();
        let user = User::load("alice", test_shared(&dir)).unwrap();
        user.store().write_str("user.server", "irc.example.net").unwrap();

        user.schedule_reconnect(Duration::from_secs(300));
        let first = user.sched.lock().reconnect_at.unwrap();

        // A smaller request must not pull the attempt earlier.
        user.schedule_reconnect(Duration::from_secs(10));
        assert_eq!(user.sched.lock().reconnect_at.unwrap(), first);

        user.schedule_reconnect(Duration::from_secs(600));
        assert!(user.sched.lock().reconnect_at.unwrap() > first);
    }

    #[tokio::test]
    async fn quitted_accounts_only_wake_for_immediate_requests() {
        let dir = tempdir().unwrap();
        let user = User::load("alice", test_shared(&dir)).unwrap();
        user.store().write_str("user.server", "irc.example.net").unwrap();
        user.mark_quitted(true).unwrap();

        user.schedule_reconnect(Duration::from_secs(30));
        assert!(user.sched.lock().reconnect_at.is_none());
        assert!(user.is_quitted());

        user.schedule_reconnect(Duration::ZERO);
        assert!(user.sched.lock().reconnect_at.is_some());
        assert!(!user.is_quitted());
    }
}
