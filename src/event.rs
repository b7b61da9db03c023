//! Zone Events
//!
//! Structured events emitted by the zone engine to an external audit /
//! observability collaborator. Emission is synchronous and non-blocking;
//! this is the subsystem's only side channel. The sink is injected so
//! embedding kernels decide where events go (audit log, event bus, tests).

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{info, warn};

use crate::zone::{TenantId, ZoneId};

/// Events emitted by the zone engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ZoneEvent {
    /// A zone was created for a tenant
    ZoneCreated { zone_id: ZoneId, tenant: TenantId },

    /// A zone was suspended
    ZoneSuspended {
        zone_id: ZoneId,
        tenant: TenantId,
        reason: String,
    },

    /// A suspended zone was resumed
    ZoneResumed { zone_id: ZoneId, tenant: TenantId },

    /// A zone was terminated and its state erased
    ZoneTerminated { zone_id: ZoneId, tenant: TenantId },

    /// A request was blocked by admission control
    RequestBlocked { zone_id: ZoneId, reason: String },

    /// An admission cooldown penalty was applied to a zone
    CooldownTriggered { zone_id: ZoneId, duration_ms: u64 },

    /// A cross-zone access attempt was denied
    CrossZoneBlocked {
        source_tenant: TenantId,
        target_tenant: TenantId,
        resource_type: String,
        resource_id: String,
        action: String,
    },

    /// An ownership check failed
    OwnershipViolation {
        tenant: TenantId,
        owner_tenant: TenantId,
        resource_type: String,
    },

    /// Hard isolation enforcement tripped
    IsolationViolation {
        source_tenant: TenantId,
        target_tenant: TenantId,
        action: String,
    },

    /// Tenant logic completed successfully
    ExecutionSucceeded {
        zone_id: ZoneId,
        label: String,
        duration_ms: u64,
    },

    /// Tenant logic failed, timed out, or was denied after admission
    ExecutionFailed {
        zone_id: ZoneId,
        label: String,
        reason: String,
        duration_ms: u64,
    },
}

/// Sink for zone events
///
/// Implementations must not block: `emit` is called from admission and
/// lifecycle paths that hold per-zone locks.
pub trait EventSink: Send + Sync {
    /// Emit a single event
    fn emit(&self, event: ZoneEvent);
}

/// Default sink that forwards events to `tracing`
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: ZoneEvent) {
        match &event {
            ZoneEvent::CrossZoneBlocked { .. }
            | ZoneEvent::OwnershipViolation { .. }
            | ZoneEvent::IsolationViolation { .. }
            | ZoneEvent::RequestBlocked { .. }
            | ZoneEvent::CooldownTriggered { .. } => {
                warn!(event = ?event, "zone event");
            }
            _ => {
                info!(event = ?event, "zone event");
            }
        }
    }
}

/// In-memory sink that buffers events for later inspection
///
/// Keeps at most the last 10_000 events.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ZoneEvent>>,
}

const MAX_BUFFERED_EVENTS: usize = 10_000;

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all buffered events
    pub fn events(&self) -> Vec<ZoneEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Drain and return all buffered events
    pub fn take(&self) -> Vec<ZoneEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    /// Number of buffered events
    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: ZoneEvent) {
        let mut events = self.events.lock().unwrap();
        events.push(event);
        if events.len() > MAX_BUFFERED_EVENTS {
            let excess = events.len() - MAX_BUFFERED_EVENTS;
            events.drain(0..excess);
        }
    }
}
