//! Failed-login throttle, one table per account.
//!
//! Each source address accumulates a strike per failed login; three
//! strikes without an intervening decay pulse block the address. The
//! decay pulse runs on a fixed cadence and erodes every record by one,
//! deleting records that reach zero, so blocks lift on their own. The
//! table is in-memory only and does not survive a restart.

use std::net::IpAddr;
use std::time::Duration;

use tracing::debug;

/// Strikes above this value block the address.
pub const BLOCK_THRESHOLD: u8 = 2;

/// Cadence of [`BadLoginThrottle::decay_pulse`].
pub const DECAY_INTERVAL: Duration = Duration::from_secs(200);

#[derive(Debug, Clone)]
struct BadLogin {
    addr: IpAddr,
    count: u8,
}

/// Per-account table of (source address, strike count) records.
#[derive(Debug, Default)]
pub struct BadLoginThrottle {
    records: Vec<BadLogin>,
}

impl BadLoginThrottle {
    pub fn new() -> BadLoginThrottle {
        BadLoginThrottle::default()
    }

    /// Record a failed login from `addr`.
    ///
    /// An existing record below saturation is incremented; otherwise a
    /// fresh record with one strike is appended. (A saturated record is
    /// left untouched and shadows the fresh one for blocking decisions —
    /// the lookup stops at the first record for the address.)
    pub fn log_bad_login(&mut self, addr: IpAddr) {
        for record in &mut self.records {
            if record.addr == addr && record.count <= BLOCK_THRESHOLD {
                record.count += 1;
                return;
            }
        }

        self.records.push(BadLogin { addr, count: 1 });
    }

    /// Whether `addr` is currently blocked (first record above threshold).
    pub fn is_blocked(&self, addr: IpAddr) -> bool {
        for record in &self.records {
            if record.addr == addr {
                return record.count > BLOCK_THRESHOLD;
            }
        }
        false
    }

    /// Erode every record by one strike, dropping records that hit zero.
    pub fn decay_pulse(&mut self) {
        for record in &mut self.records {
            record.count -= 1;
        }
        let before = self.records.len();
        self.records.retain(|r| r.count > 0);
        if self.records.len() != before {
            debug!(
                expired = before - self.records.len(),
                "bad-login records decayed away"
            );
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
