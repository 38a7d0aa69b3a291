//! Session lifecycle hook fan-out.
//!
//! Observers register once at startup and are called synchronously, in
//! registration order, exactly once per transition. The session layer
//! only ever calls the registry; it never knows which observers exist.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

/// Observer of account session transitions. All methods default to no-op
/// so implementors only handle the events they care about.
pub trait SessionHook: Send + Sync {
    /// A client successfully attached to the account.
    fn attach_client(&self, _user: &str) {}

    /// The attached client went away (including seamless handoffs).
    fn detach_client(&self, _user: &str) {}

    /// An outbound server connection was bound to the account.
    fn server_connect(&self, _user: &str) {}

    /// The account's server connection was cleared.
    fn server_disconnect(&self, _user: &str) {}

    /// The account was loaded from disk.
    fn user_load(&self, _user: &str) {}
}

/// Registry of hooks, fanned out in registration order.
#[derive(Default)]
pub struct HookRegistry {
    hooks: RwLock<Vec<Arc<dyn SessionHook>>>,
}

impl HookRegistry {
    pub fn new() -> HookRegistry {
        HookRegistry::default()
    }

    pub fn register(&self, hook: Arc<dyn SessionHook>) {
        self.hooks.write().push(hook);
    }

    pub fn attach_client(&self, user: &str) {
        for hook in self.hooks.read().iter() {
            hook.attach_client(user);
        }
    }

    pub fn detach_client(&self, user: &str) {
        for hook in self.hooks.read().iter() {
            hook.detach_client(user);
        }
    }

    pub fn server_connect(&self, user: &str) {
        for hook in self.hooks.read().iter() {
            hook.server_connect(user);
        }
    }

    pub fn server_disconnect(&self, user: &str) {
        for hook in self.hooks.read().iter() {
            hook.server_disconnect(user);
        }
    }

    pub fn user_load(&self, user: &str) {
        for hook in self.hooks.read().iter() {
            hook.user_load(user);
        }
    }
}

/// Built-in observer that mirrors every transition into the process log.
pub struct TraceHook;

impl SessionHook for TraceHook {
    fn attach_client(&self, user: &str) {
        info!(user = %user, "client attached");
    }

    fn detach_client(&self, user: &str) {
        info!(user = %user, "client detached");
    }

    fn server_connect(&self, user: &str) {
        info!(user = %user, "server connection established");
    }

    fn server_disconnect(&self, user: &str) {
        info!(user = %user, "server connection lost");
    }

    fn user_load(&self, user: &str) {
        info!(user = %user, "user loaded");
    }
}
