//! Zone Types
//!
//! The isolation unit for exactly one tenant: typed identifiers, the
//! 3-state status machine, per-zone counters, and the cloneable `Zone`
//! snapshot handed to callers. Mutable zone state lives behind a per-entry
//! lock inside the registry; no caller ever holds a reference into the
//! store itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::ZoneConfig;

/// Identifier of a tenant
///
/// Tenant context is a required, explicit parameter on every interface in
/// this crate; the newtype keeps it from being swapped with other strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TenantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a zone
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(String);

impl ZoneId {
    /// Generate a fresh zone id
    pub fn generate() -> Self {
        Self(format!("zone-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ZoneId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Zone lifecycle status
///
/// `active ⇄ suspended`, `active|suspended → terminated`. `terminated` is
/// terminal: no transition leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneStatus {
    Active,
    Suspended,
    Terminated,
}

impl ZoneStatus {
    /// Whether the transition `self → to` is legal
    pub fn can_transition(self, to: ZoneStatus) -> bool {
        matches!(
            (self, to),
            (ZoneStatus::Active, ZoneStatus::Suspended)
                | (ZoneStatus::Suspended, ZoneStatus::Active)
                | (ZoneStatus::Active, ZoneStatus::Terminated)
                | (ZoneStatus::Suspended, ZoneStatus::Terminated)
        )
    }
}

impl fmt::Display for ZoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ZoneStatus::Active => "active",
            ZoneStatus::Suspended => "suspended",
            ZoneStatus::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Snapshot of a zone's counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneMetrics {
    /// Executions currently in flight
    pub current_executions: u32,

    /// Lifetime execution count
    pub total_executions: u64,

    /// Admitted requests in the current counting window
    pub requests_in_window: u32,

    /// Network calls in the current counting window
    pub network_calls_in_window: u32,

    /// Denied attempts recorded against this zone
    pub blocked_attempts: u64,

    /// Age of the current counting window (ms)
    pub window_age_ms: u64,
}

/// Public snapshot of a zone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub tenant: TenantId,
    pub name: String,
    pub status: ZoneStatus,
    pub suspend_reason: Option<String>,
    pub config: ZoneConfig,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub metrics: ZoneMetrics,
}

/// Mutable per-zone counters
///
/// Window counters use a fixed window reset lazily on the next check once
/// the window has elapsed. This is a deliberate approximation of a sliding
/// window: a burst straddling a window boundary can see up to twice the
/// per-window budget.
#[derive(Debug)]
pub(crate) struct ZoneCounters {
    pub current_executions: u32,
    pub total_executions: u64,
    pub requests_in_window: u32,
    pub network_calls_in_window: u32,
    pub blocked_attempts: u64,
    pub window_started: Instant,
    pub last_activity: DateTime<Utc>,
}

impl ZoneCounters {
    pub fn new() -> Self {
        Self {
            current_executions: 0,
            total_executions: 0,
            requests_in_window: 0,
            network_calls_in_window: 0,
            blocked_attempts: 0,
            window_started: Instant::now(),
            last_activity: Utc::now(),
        }
    }

    /// Reset window counters if the window has elapsed
    pub fn maybe_reset_window(&mut self, now: Instant, window: Duration) {
        if now.duration_since(self.window_started) >= window {
            self.requests_in_window = 0;
            self.network_calls_in_window = 0;
            self.window_started = now;
        }
    }

    /// Time left until the current window elapses
    pub fn window_remaining(&self, now: Instant, window: Duration) -> Duration {
        window.saturating_sub(now.duration_since(self.window_started))
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn snapshot(&self) -> ZoneMetrics {
        ZoneMetrics {
            current_executions: self.current_executions,
            total_executions: self.total_executions,
            requests_in_window: self.requests_in_window,
            network_calls_in_window: self.network_calls_in_window,
            blocked_attempts: self.blocked_attempts,
            window_age_ms: self.window_started.elapsed().as_millis() as u64,
        }
    }
}

/// Mutable state of one zone, guarded by the entry lock
#[derive(Debug)]
pub(crate) struct ZoneState {
    pub status: ZoneStatus,
    pub suspend_reason: Option<String>,
    pub config: ZoneConfig,
    pub counters: ZoneCounters,
}

/// One zone in the registry store
///
/// Immutable identity plus a single lock over all mutable state, so every
/// check-then-act sequence against one zone happens under one acquisition.
#[derive(Debug)]
pub(crate) struct ZoneEntry {
    pub id: ZoneId,
    pub tenant: TenantId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub state: Mutex<ZoneState>,
}

impl ZoneEntry {
    pub fn new(tenant: TenantId, name: String, config: ZoneConfig) -> Self {
        Self {
            id: ZoneId::generate(),
            tenant,
            name,
            created_at: Utc::now(),
            state: Mutex::new(ZoneState {
                status: ZoneStatus::Active,
                suspend_reason: None,
                config,
                counters: ZoneCounters::new(),
            }),
        }
    }

    pub fn snapshot(&self) -> Zone {
        let state = self.state.lock().unwrap();
        Zone {
            id: self.id.clone(),
            tenant: self.tenant.clone(),
            name: self.name.clone(),
            status: state.status,
            suspend_reason: state.suspend_reason.clone(),
            config: state.config.clone(),
            created_at: self.created_at,
            last_activity: state.counters.last_activity,
            metrics: state.counters.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_id_generation_is_unique() {
        let a = ZoneId::generate();
        let b = ZoneId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("zone-"));
    }

    #[test]
    fn test_status_transitions() {
        use ZoneStatus::*;

        assert!(Active.can_transition(Suspended));
        assert!(Suspended.can_transition(Active));
        assert!(Active.can_transition(Terminated));
        assert!(Suspended.can_transition(Terminated));

        // Terminated is terminal
        assert!(!Terminated.can_transition(Active));
        assert!(!Terminated.can_transition(Suspended));
        assert!(!Terminated.can_transition(Terminated));

        // Self-transitions are not legal
        assert!(!Active.can_transition(Active));
        assert!(!Suspended.can_transition(Suspended));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ZoneStatus::Active.to_string(), "active");
        assert_eq!(ZoneStatus::Suspended.to_string(), "suspended");
        assert_eq!(ZoneStatus::Terminated.to_string(), "terminated");
    }

    #[test]
    fn test_window_reset_only_after_elapse() {
        let mut counters = ZoneCounters::new();
        counters.requests_in_window = 7;
        counters.network_calls_in_window = 3;

        let window = Duration::from_secs(60);
        let start = counters.window_started;

        // Within the window: nothing resets
        counters.maybe_reset_window(start + Duration::from_secs(59), window);
        assert_eq!(counters.requests_in_window, 7);

        // At the boundary: both window counters reset, window advances
        counters.maybe_reset_window(start + Duration::from_secs(60), window);
        assert_eq!(counters.requests_in_window, 0);
        assert_eq!(counters.network_calls_in_window, 0);
        assert!(counters.window_started > start);
    }

    #[test]
    fn test_entry_snapshot_is_detached() {
        let entry = ZoneEntry::new(
            TenantId::from("acme"),
            "acme zone".to_string(),
            ZoneConfig::default(),
        );

        let before = entry.snapshot();
        entry.state.lock().unwrap().counters.total_executions = 9;
        let after = entry.snapshot();

        assert_eq!(before.metrics.total_executions, 0);
        assert_eq!(after.metrics.total_executions, 9);
        assert_eq!(before.id, after.id);
    }
}
