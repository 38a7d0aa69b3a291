//! Reconnect pacing: the process-wide connection gate and the delay
//! arithmetic that spaces attempts out.
//!
//! Two clocks cooperate. The [`ReconnectGate`] is shared by every
//! account and enforces a minimum interval between any two outbound
//! connection attempts, so a process restart does not burst-connect
//! every account at once. The per-account cooldown lives in the
//! account's own scheduler state and backs off repeat attempts for a
//! single account without punishing the others.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Minimum spacing between two attempts of the same account, unless the
/// account is an administrator.
pub const ACCOUNT_COOLDOWN: Duration = Duration::from_secs(120);

/// Process-wide rate limiter over outbound connection attempts.
#[derive(Debug)]
pub struct ReconnectGate {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl ReconnectGate {
    pub fn new(interval: Duration) -> ReconnectGate {
        ReconnectGate {
            interval,
            last: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time until the next attempt is allowed; zero when the gate is
    /// open.
    pub fn remaining(&self) -> Duration {
        match *self.last.lock() {
            Some(last) => self.interval.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    pub fn is_open(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Record that an attempt is happening now.
    pub fn mark(&self) {
        *self.last.lock() = Some(Instant::now());
    }

    /// Atomically claim the gate. Marks it and returns `Ok` when open,
    /// otherwise the time until it reopens. Two concurrent claimants can
    /// never both pass.
    pub fn try_pass(&self) -> Result<(), Duration> {
        let mut last = self.last.lock();
        if let Some(prev) = *last {
            let remaining = self.interval.saturating_sub(prev.elapsed());
            if !remaining.is_zero() {
                return Err(remaining);
            }
        }
        *last = Some(Instant::now());
        Ok(())
    }
}

/// The delay actually applied to a reconnect request.
///
/// The largest of the requested delay, the time until the process-wide
/// gate reopens, and the remainder of the account's own cooldown
/// (administrators skip the last one).
pub fn effective_delay(
    requested: Duration,
    gate_remaining: Duration,
    since_last_attempt: Option<Duration>,
    is_admin: bool,
) -> Duration {
    let mut delay = requested.max(gate_remaining);
    if !is_admin {
        if let Some(since) = since_last_attempt {
            delay = delay.max(ACCOUNT_COOLDOWN.saturating_sub(since));
        }
    }
    delay
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn fresh_gate_is_open() {
        let gate = ReconnectGate::new(secs(15));
        assert!(gate.is_open());
        assert_eq!(gate.remaining(), Duration::ZERO);
    }

    #[test]
    fn marked_gate_closes_for_the_interval() {
        let gate = ReconnectGate::new(secs(15));
        gate.mark();
        assert!(!gate.is_open());
        assert!(gate.remaining() <= secs(15));
        assert!(gate.remaining() > secs(14));
    }

    #[test]
    fn zero_interval_gate_never_closes() {
        let gate = ReconnectGate::new(Duration::ZERO);
        gate.mark();
        assert!(gate.is_open());
    }

    #[test]
    fn only_one_claimant_passes() {
        let gate = ReconnectGate::new(secs(15));
        assert!(gate.try_pass().is_ok());
        let second = gate.try_pass();
        assert!(second.is_err());
        assert!(second.unwrap_err() > secs(14));
    }

    #[test]
    fn requested_delay_wins_when_largest() {
        assert_eq!(
            effective_delay(secs(300), secs(10), None, false),
            secs(300)
        );
    }

    #[test]
    fn gate_remainder_wins_over_small_requests() {
        assert_eq!(effective_delay(Duration::ZERO, secs(12), None, false), secs(12));
    }

    #[test]
    fn account_cooldown_applies_to_recent_attempts() {
        // Last attempt 10s ago leaves 110s of the 120s cooldown.
        let delay = effective_delay(Duration::ZERO, Duration::ZERO, Some(secs(10)), false);
        assert_eq!(delay, secs(110));
    }

    #[test]
    fn admins_skip_the_account_cooldown() {
        let delay = effective_delay(Duration::ZERO, secs(5), Some(secs(10)), true);
        assert_eq!(delay, secs(5));
    }

    #[test]
    fn elapsed_cooldown_adds_nothing() {
        let delay = effective_delay(secs(1), Duration::ZERO, Some(secs(600)), false);
        assert_eq!(delay, secs(1));
    }
}
