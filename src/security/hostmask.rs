//! Host-mask allow list gating which hosts may attach to an account.
//!
//! Empty list means default-open: any host may connect. A non-empty list
//! is the exclusive allow set. Masks use `*`/`?` globbing and compare
//! case-insensitively.
//!
//! The list persists to the account's property store as numbered keys
//! (`user.hosts.host0`, `user.hosts.host1`, ...); the sequence is
//! rewritten in full on every change and terminated by the first missing
//! index.

use ironbnc_proto::util::wildcard_match;

use crate::config::PropertyStore;
use crate::error::StoreError;

const HOST_KEY_PREFIX: &str = "user.hosts.host";

/// Ordered list of allowed host masks.
#[derive(Debug, Default)]
pub struct HostAllowList {
    masks: Vec<String>,
}

impl HostAllowList {
    pub fn new() -> HostAllowList {
        HostAllowList::default()
    }

    /// Load the numbered-key sequence from an account's store.
    pub fn from_store(store: &PropertyStore) -> HostAllowList {
        let mut list = HostAllowList::new();
        for index in 0.. {
            match store.read_str(&format!("{HOST_KEY_PREFIX}{index}")) {
                Some(mask) => {
                    list.add(&mask);
                }
                None => break,
            }
        }
        list
    }

    /// Whether `host` may connect: default-open when empty, otherwise at
    /// least one mask must match.
    pub fn can_connect(&self, host: &str) -> bool {
        if self.masks.is_empty() {
            return true;
        }
        self.masks.iter().any(|mask| wildcard_match(mask, host))
    }

    /// Append a mask unless an existing entry already matches it.
    ///
    /// Returns whether the list changed.
    pub fn add(&mut self, mask: &str) -> bool {
        if mask.is_empty() {
            return false;
        }
        if self.masks.iter().any(|m| wildcard_match(m, mask)) {
            return false;
        }
        self.masks.push(mask.to_string());
        true
    }

    /// Remove the first case-insensitive exact match.
    ///
    /// Returns whether the list changed.
    pub fn remove(&mut self, mask: &str) -> bool {
        if let Some(pos) = self
            .masks
            .iter()
            .position(|m| m.eq_ignore_ascii_case(mask))
        {
            self.masks.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn masks(&self) -> &[String] {
        &self.masks
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    /// Rewrite the numbered-key sequence: clear, then write entry 0..N.
    pub fn persist(&self, store: &PropertyStore) -> Result<(), StoreError> {
        store.remove_prefix(HOST_KEY_PREFIX)?;
        for (index, mask) in self.masks.iter().enumerate() {
            store.write_str(&format!("{HOST_KEY_PREFIX}{index}"), mask)?;
        }
        Ok(())
    }
}
