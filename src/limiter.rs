//! Zone Rate Limiter
//!
//! Per-zone admission control: decides whether a new request, network call,
//! or execution may proceed, and tracks the counters the decision depends
//! on. Denials are plain decision values, never errors — they are expected,
//! frequent outcomes.
//!
//! The counting window is a fixed 60 s window reset lazily on the next
//! check, not a true sliding window: a burst straddling a window boundary
//! can see up to twice the per-minute budget. This approximation is kept
//! deliberately from the original design.
//!
//! Penalty policy: exhausting the *request* budget triggers an automatic
//! 5 s cooldown — a flood of admission attempts locks the zone out briefly.
//! Exhausting the *network-call* budget does not: that budget back-pressures
//! a payload that is already admitted and running, and a cooldown there
//! would let one long execution lock out the tenant's unrelated traffic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::event::{EventSink, ZoneEvent};
use crate::registry::ZoneRegistry;
use crate::zone::{ZoneId, ZoneStatus};

/// Length of the fixed counting window
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Cooldown applied automatically when the request budget is exhausted
pub const COOLDOWN_PENALTY: Duration = Duration::from_secs(5);

/// Result of an admission check
#[derive(Debug, Clone)]
pub struct RateDecision {
    /// Whether the request is allowed
    pub allowed: bool,

    /// Reason for denial (if not allowed)
    pub reason: Option<String>,

    /// Time until a retry may succeed (if estimable)
    pub retry_after: Option<Duration>,

    /// Current usage for the check that decided
    pub current: u32,

    /// Configured limit for the check that decided
    pub limit: u32,
}

impl RateDecision {
    /// Create an allowed decision
    pub fn allowed(current: u32, limit: u32) -> Self {
        Self {
            allowed: true,
            reason: None,
            retry_after: None,
            current,
            limit,
        }
    }

    /// Create a denied decision
    pub fn denied(reason: impl Into<String>, retry_after: Option<Duration>, current: u32, limit: u32) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            retry_after,
            current,
            limit,
        }
    }
}

/// Zone rate limiter
///
/// Owns the per-zone cooldown state (disjoint from the zone records) and
/// consults the registry for configuration and counters.
pub struct ZoneRateLimiter {
    registry: Arc<ZoneRegistry>,
    cooldowns: Mutex<HashMap<ZoneId, Instant>>,
    window: Duration,
    penalty: Duration,
    events: Arc<dyn EventSink>,
}

impl ZoneRateLimiter {
    /// Create a limiter with the default window and penalty
    pub fn new(registry: Arc<ZoneRegistry>) -> Self {
        Self::with_timing(registry, RATE_WINDOW, COOLDOWN_PENALTY)
    }

    /// Create a limiter with custom timing (for tests)
    pub fn with_timing(registry: Arc<ZoneRegistry>, window: Duration, penalty: Duration) -> Self {
        let events = registry.event_sink();
        Self {
            registry,
            cooldowns: Mutex::new(HashMap::new()),
            window,
            penalty,
            events,
        }
    }

    /// Check whether a new request may enter the zone
    ///
    /// Denies, in order: unknown zone, zone not active, cooldown active,
    /// request window at its limit (which also triggers a fresh cooldown
    /// penalty), in-flight executions at the concurrency cap.
    pub fn check_request(&self, zone_id: &ZoneId) -> RateDecision {
        self.evaluate_request(zone_id, true, false)
    }

    /// Side-effect-free twin of [`check_request`](Self::check_request)
    ///
    /// Same evaluation, but a rate denial applies no cooldown penalty and
    /// emits no event; its retry-after hint is the window remainder, since
    /// no penalty clock is running. Backs `ZoneExecutor::can_execute`.
    pub fn peek_request(&self, zone_id: &ZoneId) -> RateDecision {
        self.evaluate_request(zone_id, false, false)
    }

    /// Atomically admit a request into the zone
    ///
    /// Same checks as [`check_request`](Self::check_request), but when the
    /// decision is allowed the budget is consumed in the same lock
    /// acquisition: the request counts against the window and an execution
    /// slot is claimed. Two concurrent admissions can never both pass on the
    /// last free slot. The claimed slot is released with
    /// [`record_execution_end`](Self::record_execution_end).
    pub fn admit_request(&self, zone_id: &ZoneId) -> RateDecision {
        self.evaluate_request(zone_id, true, true)
    }

    fn evaluate_request(&self, zone_id: &ZoneId, apply_penalty: bool, commit: bool) -> RateDecision {
        let Some(entry) = self.registry.entry(zone_id) else {
            return RateDecision::denied("zone not found", None, 0, 0);
        };

        let now = Instant::now();
        let mut state = entry.state.lock().unwrap();

        if state.status != ZoneStatus::Active {
            return RateDecision::denied(
                format!("zone is {}", state.status),
                None,
                state.counters.requests_in_window,
                state.config.max_requests_per_minute,
            );
        }

        state.counters.maybe_reset_window(now, self.window);

        if let Some(remaining) = self.cooldown_remaining_at(zone_id, now) {
            return RateDecision::denied(
                "cooldown active",
                Some(remaining),
                state.counters.requests_in_window,
                state.config.max_requests_per_minute,
            );
        }

        let limit = state.config.max_requests_per_minute;
        if state.counters.requests_in_window >= limit {
            let retry_after = if apply_penalty {
                self.set_cooldown(zone_id, now + self.penalty);
                warn!(zone_id = %zone_id, "request budget exhausted, cooldown applied");
                self.penalty
            } else {
                state.counters.window_remaining(now, self.window)
            };
            return RateDecision::denied(
                "rate limit exceeded",
                Some(retry_after),
                state.counters.requests_in_window,
                limit,
            );
        }

        let cap = state.config.max_concurrent_executions;
        if state.counters.current_executions >= cap {
            return RateDecision::denied(
                "concurrency limit reached",
                None,
                state.counters.current_executions,
                cap,
            );
        }

        if commit {
            state.counters.requests_in_window += 1;
            state.counters.current_executions += 1;
            state.counters.total_executions += 1;
            state.counters.touch();
        }

        RateDecision::allowed(state.counters.requests_in_window, limit)
    }

    /// Check whether an outbound network call may proceed
    ///
    /// Evaluated against the independent network-call window counter.
    /// Exceeding it does not trigger a cooldown (see module docs); the
    /// retry-after hint is the remainder of the current window.
    pub fn check_network_call(&self, zone_id: &ZoneId) -> RateDecision {
        let Some(entry) = self.registry.entry(zone_id) else {
            return RateDecision::denied("zone not found", None, 0, 0);
        };

        let now = Instant::now();
        let mut state = entry.state.lock().unwrap();
        state.counters.maybe_reset_window(now, self.window);

        let limit = state.config.max_network_calls_per_minute;
        if state.counters.network_calls_in_window >= limit {
            return RateDecision::denied(
                "network call limit exceeded",
                Some(state.counters.window_remaining(now, self.window)),
                state.counters.network_calls_in_window,
                limit,
            );
        }

        RateDecision::allowed(state.counters.network_calls_in_window, limit)
    }

    /// Count an admitted request against the zone's window
    pub fn record_request(&self, zone_id: &ZoneId) {
        if let Some(entry) = self.registry.entry(zone_id) {
            let mut state = entry.state.lock().unwrap();
            state.counters.maybe_reset_window(Instant::now(), self.window);
            state.counters.requests_in_window += 1;
            state.counters.touch();
        }
    }

    /// Count an execution entering the zone
    pub fn record_execution_start(&self, zone_id: &ZoneId) {
        if let Some(entry) = self.registry.entry(zone_id) {
            let mut state = entry.state.lock().unwrap();
            state.counters.current_executions += 1;
            state.counters.total_executions += 1;
            state.counters.touch();
        }
    }

    /// Count an execution leaving the zone
    ///
    /// Floored at zero: excess end calls cannot drive the in-flight counter
    /// negative.
    pub fn record_execution_end(&self, zone_id: &ZoneId) {
        if let Some(entry) = self.registry.entry(zone_id) {
            let mut state = entry.state.lock().unwrap();
            state.counters.current_executions = state.counters.current_executions.saturating_sub(1);
            state.counters.touch();
        }
    }

    /// Count a network call against the zone's window
    pub fn record_network_call(&self, zone_id: &ZoneId) {
        if let Some(entry) = self.registry.entry(zone_id) {
            let mut state = entry.state.lock().unwrap();
            state.counters.maybe_reset_window(Instant::now(), self.window);
            state.counters.network_calls_in_window += 1;
            state.counters.touch();
        }
    }

    /// Record a denied attempt against the zone
    ///
    /// Observability only; never gates admission.
    pub fn record_blocked(&self, zone_id: &ZoneId, reason: &str) {
        if let Some(entry) = self.registry.entry(zone_id) {
            let mut state = entry.state.lock().unwrap();
            state.counters.blocked_attempts += 1;
        }
        debug!(zone_id = %zone_id, reason, "request blocked");
        self.events.emit(ZoneEvent::RequestBlocked {
            zone_id: zone_id.clone(),
            reason: reason.to_string(),
        });
    }

    /// Reject all admission checks for the zone until the duration elapses
    pub fn trigger_cooldown(&self, zone_id: &ZoneId, duration: Duration) {
        self.set_cooldown(zone_id, Instant::now() + duration);
    }

    /// Lift any active cooldown for the zone
    pub fn clear_cooldown(&self, zone_id: &ZoneId) {
        self.cooldowns.lock().unwrap().remove(zone_id);
    }

    /// Time left on the zone's cooldown, if one is active
    pub fn cooldown_remaining(&self, zone_id: &ZoneId) -> Option<Duration> {
        self.cooldown_remaining_at(zone_id, Instant::now())
    }

    /// Number of zones currently under a cooldown
    ///
    /// Expired entries are dropped on the way, so the map cannot
    /// accumulate cooldowns for zones that are never checked again.
    pub fn active_cooldowns(&self) -> usize {
        let now = Instant::now();
        let mut cooldowns = self.cooldowns.lock().unwrap();
        cooldowns.retain(|_, expiry| *expiry > now);
        cooldowns.len()
    }

    fn cooldown_remaining_at(&self, zone_id: &ZoneId, now: Instant) -> Option<Duration> {
        let mut cooldowns = self.cooldowns.lock().unwrap();
        match cooldowns.get(zone_id) {
            Some(&expiry) if expiry > now => Some(expiry - now),
            Some(_) => {
                // Expired: drop the stale entry
                cooldowns.remove(zone_id);
                None
            }
            None => None,
        }
    }

    fn set_cooldown(&self, zone_id: &ZoneId, expiry: Instant) {
        let now = Instant::now();
        let duration = expiry.saturating_duration_since(now);
        {
            let mut cooldowns = self.cooldowns.lock().unwrap();
            // Sweep stale entries so terminated zones do not linger
            cooldowns.retain(|_, e| *e > now);
            cooldowns.insert(zone_id.clone(), expiry);
        }
        self.events.emit(ZoneEvent::CooldownTriggered {
            zone_id: zone_id.clone(),
            duration_ms: duration.as_millis() as u64,
        });
    }
}
