//! Process-level account registry: loads accounts, authenticates login
//! attempts, and runs the periodic maintenance pulses.

use std::net::IpAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio_rustls::rustls::pki_types::CertificateDer;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{LoginError, StoreError};
use crate::hooks::{HookRegistry, TraceHook};
use crate::network::IrcConnector;
use crate::security::DECAY_INTERVAL;
use crate::user::reconnect::ReconnectGate;
use crate::user::{User, UserShared};

/// Cadence of the reconnect sweep consuming [`User::should_reconnect`].
const RECONNECT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Broadcast channel for operator-visible announcements.
///
/// Holds weak references so a deleted account disappears from the
/// audience instead of being kept alive by it.
#[derive(Default)]
pub struct NoticeHub {
    users: RwLock<Vec<Weak<User>>>,
}

impl NoticeHub {
    pub fn new() -> NoticeHub {
        NoticeHub::default()
    }

    pub fn register(&self, user: &Arc<User>) {
        let mut users = self.users.write();
        users.retain(|weak| weak.strong_count() > 0);
        users.push(Arc::downgrade(user));
    }

    /// Announce to the process log and to every attached administrator.
    pub fn global_notice(&self, text: &str) {
        info!("{text}");
        let users = self.users.read().clone();
        for weak in users {
            if let Some(user) = weak.upgrade() {
                if user.is_admin() && user.has_client() {
                    user.notice(text);
                }
            }
        }
    }
}

/// The bouncer process: all accounts plus their shared dependencies.
pub struct Bouncer {
    config: Arc<Config>,
    shared: UserShared,
    /// Keyed by lowercased account name.
    users: DashMap<String, Arc<User>>,
}

impl Bouncer {
    pub fn new(config: Arc<Config>, connector: Arc<dyn IrcConnector>) -> Arc<Bouncer> {
        let hooks = Arc::new(HookRegistry::new());
        hooks.register(Arc::new(TraceHook));

        let shared = UserShared {
            config: config.clone(),
            hooks,
            gate: Arc::new(ReconnectGate::new(Duration::from_secs(
                config.system.interval,
            ))),
            connector,
            hub: Arc::new(NoticeHub::new()),
        };

        Arc::new(Bouncer {
            config,
            shared,
            users: DashMap::new(),
        })
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn shared(&self) -> &UserShared {
        &self.shared
    }

    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.shared.hooks
    }

    /// Load every account with a `.conf` file under the users directory.
    pub fn load_users(&self) -> Result<usize, StoreError> {
        let dir = self.config.users_dir();
        let read_err = |source| StoreError::Read {
            path: dir.clone(),
            source,
        };
        std::fs::create_dir_all(&dir).map_err(read_err)?;

        let mut loaded = 0;
        for entry in std::fs::read_dir(&dir).map_err(read_err)? {
            let entry = entry.map_err(read_err)?;
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "conf") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            self.insert(User::load(name, self.shared.clone())?);
            loaded += 1;
        }
        Ok(loaded)
    }

    fn insert(&self, user: Arc<User>) {
        self.shared.hub.register(&user);
        self.users.insert(user.name().to_lowercase(), user);
    }

    /// Register a new account with the given password.
    pub fn create_user(&self, name: &str, password: &str) -> anyhow::Result<Arc<User>> {
        let key = name.to_lowercase();
        if self.users.contains_key(&key) {
            anyhow::bail!("user {name} already exists");
        }
        let user = User::load(name, self.shared.clone())?;
        user.set_password(password)?;
        self.insert(user.clone());
        info!(user = %name, "account created");
        Ok(user)
    }

    /// Delete an account: tear down its session and forget it. The
    /// on-disk files are left for the operator to archive or remove.
    pub fn remove_user(&self, name: &str) -> Option<Arc<User>> {
        let (_, user) = self.users.remove(&name.to_lowercase())?;
        user.shutdown("User deleted");
        info!(user = %name, "account removed");
        Some(user)
    }

    pub fn get_user(&self, name: &str) -> Option<Arc<User>> {
        self.users
            .get(&name.to_lowercase())
            .map(|u| u.value().clone())
    }

    pub fn users(&self) -> Vec<Arc<User>> {
        self.users.iter().map(|u| u.value().clone()).collect()
    }

    /// The login pipeline gating the attach path: account lookup, IP
    /// throttle, host allow list, then certificate or password.
    pub fn login(
        &self,
        account: &str,
        password: Option<&str>,
        addr: IpAddr,
        cert: Option<&CertificateDer<'_>>,
    ) -> Result<Arc<User>, LoginError> {
        let user = self.get_user(account).ok_or(LoginError::UnknownUser)?;

        if user.is_ip_blocked(addr) {
            warn!(user = %account, peer = %addr, "login blocked by throttle");
            return Err(LoginError::IpBlocked);
        }
        if !user.can_host_connect(&addr.to_string()) {
            warn!(user = %account, peer = %addr, "host not on allow list");
            return Err(LoginError::HostNotAllowed);
        }

        let cert_ok = cert.is_some_and(|c| user.find_client_certificate(c));
        if !cert_ok && !user.validate_password(password) {
            user.log_bad_login(addr);
            warn!(user = %account, peer = %addr, "bad credentials");
            return Err(LoginError::BadCredentials);
        }

        Ok(user)
    }

    /// Start the periodic pulses: bad-login decay and the reconnect
    /// sweep.
    pub fn spawn_maintenance(self: &Arc<Self>) -> JoinHandle<()> {
        let bouncer = self.clone();
        tokio::spawn(async move {
            let mut decay = tokio::time::interval(DECAY_INTERVAL);
            let mut sweep = tokio::time::interval(RECONNECT_SWEEP_INTERVAL);
            // Both tick once immediately; harmless for either pulse.
            loop {
                tokio::select! {
                    _ = decay.tick() => {
                        for user in bouncer.users() {
                            user.decay_bad_logins();
                        }
                    }
                    _ = sweep.tick() => {
                        for user in bouncer.users() {
                            if user.should_reconnect() {
                                tokio::spawn(async move { user.poll_reconnect().await });
                            }
                        }
                    }
                }
            }
        })
    }

    /// Tear down every session, e.g. on process shutdown.
    pub fn shutdown(&self, reason: &str) {
        for user in self.users() {
            user.shutdown(reason);
        }
    }
}
