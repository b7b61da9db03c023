//! Zone Registry
//!
//! Owns zone lifecycle and configuration; the single source of truth for
//! "does this zone exist, and what is it allowed to do." The registry is an
//! injected instance, not a global: tests and embedding kernels can hold
//! any number of isolated registries.
//!
//! Concurrency: the zone map and the tenant index live under one `RwLock`
//! so check-then-act sequences (duplicate-tenant check + insert,
//! remove + unmap) are single-acquisition. Zone-local mutable state sits
//! behind each entry's own lock, so counter traffic on one zone never
//! blocks another.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::config::{ZoneConfig, ZoneConfigPatch};
use crate::error::ZoneError;
use crate::event::{EventSink, TracingSink, ZoneEvent};
use crate::zone::{TenantId, Zone, ZoneEntry, ZoneId, ZoneStatus};

#[derive(Default)]
struct Inner {
    zones: HashMap<ZoneId, Arc<ZoneEntry>>,
    by_tenant: HashMap<TenantId, ZoneId>,
}

/// Zone registry
///
/// At most one zone per tenant at any time; the tenant→zone mapping is 1:1
/// while the zone exists. All state is in memory only and is rebuilt on
/// restart — a design property, not a gap.
pub struct ZoneRegistry {
    inner: RwLock<Inner>,
    defaults: ZoneConfig,
    events: Arc<dyn EventSink>,
}

impl ZoneRegistry {
    /// Create a registry with the given default zone configuration
    pub fn new(defaults: ZoneConfig) -> Self {
        Self::with_event_sink(defaults, Arc::new(TracingSink))
    }

    /// Create a registry emitting events to the given sink
    pub fn with_event_sink(defaults: ZoneConfig, events: Arc<dyn EventSink>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            defaults,
            events,
        }
    }

    /// The sink this registry emits to
    pub(crate) fn event_sink(&self) -> Arc<dyn EventSink> {
        Arc::clone(&self.events)
    }

    /// Create a zone for a tenant
    ///
    /// Fails with [`ZoneError::DuplicateZone`] if the tenant already owns a
    /// zone. The zone starts `active` with zero metrics and the default
    /// configuration merged with the optional per-tenant override.
    pub fn create_zone(
        &self,
        tenant: &TenantId,
        name: &str,
        overrides: Option<ZoneConfigPatch>,
    ) -> Result<Zone, ZoneError> {
        let entry = {
            let mut inner = self.inner.write().unwrap();

            if inner.by_tenant.contains_key(tenant) {
                return Err(ZoneError::DuplicateZone(tenant.clone()));
            }

            self.insert_locked(&mut inner, tenant, name, overrides)
        };

        info!(zone_id = %entry.id, tenant = %tenant, "zone created");
        self.events.emit(ZoneEvent::ZoneCreated {
            zone_id: entry.id.clone(),
            tenant: tenant.clone(),
        });

        Ok(entry.snapshot())
    }

    /// Return the tenant's zone, creating it if absent
    ///
    /// Idempotent: two calls for the same tenant return the same zone. The
    /// lookup and the create run under one write-lock acquisition, so two
    /// concurrent `ensure_zone` calls cannot both create.
    pub fn ensure_zone(&self, tenant: &TenantId, overrides: Option<ZoneConfigPatch>) -> Zone {
        let (entry, created) = {
            let mut inner = self.inner.write().unwrap();

            if let Some(zone_id) = inner.by_tenant.get(tenant) {
                let entry = Arc::clone(&inner.zones[zone_id]);
                (entry, false)
            } else {
                let name = format!("{} zone", tenant);
                let entry = self.insert_locked(&mut inner, tenant, &name, overrides);
                (entry, true)
            }
        };

        if created {
            info!(zone_id = %entry.id, tenant = %tenant, "zone created");
            self.events.emit(ZoneEvent::ZoneCreated {
                zone_id: entry.id.clone(),
                tenant: tenant.clone(),
            });
        }

        entry.snapshot()
    }

    /// Allocate and index a zone; caller holds the write lock
    fn insert_locked(
        &self,
        inner: &mut Inner,
        tenant: &TenantId,
        name: &str,
        overrides: Option<ZoneConfigPatch>,
    ) -> Arc<ZoneEntry> {
        let config = match overrides {
            Some(patch) => self.defaults.merged(patch),
            None => self.defaults.clone(),
        };

        let entry = Arc::new(ZoneEntry::new(tenant.clone(), name.to_string(), config));
        inner.by_tenant.insert(tenant.clone(), entry.id.clone());
        inner.zones.insert(entry.id.clone(), Arc::clone(&entry));
        entry
    }

    /// Snapshot of a zone by id
    pub fn get(&self, zone_id: &ZoneId) -> Option<Zone> {
        self.entry(zone_id).map(|e| e.snapshot())
    }

    /// Snapshot of a tenant's zone
    pub fn get_by_tenant(&self, tenant: &TenantId) -> Option<Zone> {
        self.entry_by_tenant(tenant).map(|e| e.snapshot())
    }

    /// Suspend an active zone
    pub fn suspend(&self, zone_id: &ZoneId, reason: &str) -> Result<(), ZoneError> {
        let entry = self
            .entry(zone_id)
            .ok_or_else(|| ZoneError::ZoneNotFound(zone_id.clone()))?;

        {
            let mut state = entry.state.lock().unwrap();
            if !state.status.can_transition(ZoneStatus::Suspended) {
                return Err(ZoneError::InvalidTransition {
                    zone_id: zone_id.clone(),
                    from: state.status,
                    to: ZoneStatus::Suspended,
                });
            }
            state.status = ZoneStatus::Suspended;
            state.suspend_reason = Some(reason.to_string());
        }

        info!(zone_id = %zone_id, reason, "zone suspended");
        self.events.emit(ZoneEvent::ZoneSuspended {
            zone_id: zone_id.clone(),
            tenant: entry.tenant.clone(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Resume a suspended zone
    ///
    /// Fails with [`ZoneError::InvalidTransition`] if the zone is not
    /// currently suspended.
    pub fn resume(&self, zone_id: &ZoneId) -> Result<(), ZoneError> {
        let entry = self
            .entry(zone_id)
            .ok_or_else(|| ZoneError::ZoneNotFound(zone_id.clone()))?;

        {
            let mut state = entry.state.lock().unwrap();
            if state.status != ZoneStatus::Suspended {
                return Err(ZoneError::InvalidTransition {
                    zone_id: zone_id.clone(),
                    from: state.status,
                    to: ZoneStatus::Active,
                });
            }
            state.status = ZoneStatus::Active;
            state.suspend_reason = None;
        }

        info!(zone_id = %zone_id, "zone resumed");
        self.events.emit(ZoneEvent::ZoneResumed {
            zone_id: zone_id.clone(),
            tenant: entry.tenant.clone(),
        });
        Ok(())
    }

    /// Terminate a zone, erasing its record and the tenant mapping
    ///
    /// Always succeeds if the zone exists. No soft delete: a later
    /// `ensure_zone` for the tenant allocates a brand-new zone.
    pub fn terminate(&self, zone_id: &ZoneId) -> Result<(), ZoneError> {
        let entry = {
            let mut inner = self.inner.write().unwrap();
            let entry = inner
                .zones
                .remove(zone_id)
                .ok_or_else(|| ZoneError::ZoneNotFound(zone_id.clone()))?;
            inner.by_tenant.remove(&entry.tenant);
            entry
        };

        // Mark the entry terminal for anyone still holding a snapshot path.
        entry.state.lock().unwrap().status = ZoneStatus::Terminated;

        info!(zone_id = %zone_id, tenant = %entry.tenant, "zone terminated");
        self.events.emit(ZoneEvent::ZoneTerminated {
            zone_id: zone_id.clone(),
            tenant: entry.tenant.clone(),
        });
        Ok(())
    }

    /// Merge a partial configuration into a zone
    ///
    /// Field merge only; cross-field consistency is the caller's job.
    pub fn update_config(
        &self,
        zone_id: &ZoneId,
        patch: ZoneConfigPatch,
    ) -> Result<Zone, ZoneError> {
        let entry = self
            .entry(zone_id)
            .ok_or_else(|| ZoneError::ZoneNotFound(zone_id.clone()))?;

        entry.state.lock().unwrap().config.apply(patch);
        Ok(entry.snapshot())
    }

    /// Whether the zone may target the given execution engine
    ///
    /// `false` (not an error) if the zone does not exist.
    pub fn is_engine_allowed(&self, zone_id: &ZoneId, engine: &str) -> bool {
        match self.entry(zone_id) {
            Some(entry) => entry.state.lock().unwrap().config.allowed_engines.allows(engine),
            None => false,
        }
    }

    /// Whether the zone may call the given MCP integration target
    ///
    /// `false` (not an error) if the zone does not exist.
    pub fn is_mcp_allowed(&self, zone_id: &ZoneId, target: &str) -> bool {
        match self.entry(zone_id) {
            Some(entry) => entry
                .state
                .lock()
                .unwrap()
                .config
                .allowed_mcp_targets
                .allows(target),
            None => false,
        }
    }

    /// Snapshots of all zones
    pub fn list(&self) -> Vec<Zone> {
        let inner = self.inner.read().unwrap();
        inner.zones.values().map(|e| e.snapshot()).collect()
    }

    /// Number of live zones
    pub fn count(&self) -> usize {
        self.inner.read().unwrap().zones.len()
    }

    pub(crate) fn entry(&self, zone_id: &ZoneId) -> Option<Arc<ZoneEntry>> {
        self.inner.read().unwrap().zones.get(zone_id).cloned()
    }

    pub(crate) fn entry_by_tenant(&self, tenant: &TenantId) -> Option<Arc<ZoneEntry>> {
        let inner = self.inner.read().unwrap();
        let zone_id = inner.by_tenant.get(tenant)?;
        inner.zones.get(zone_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PermissionSet;
    use crate::event::MemorySink;

    fn registry() -> ZoneRegistry {
        ZoneRegistry::new(ZoneConfig::default())
    }

    #[test]
    fn test_create_zone() {
        let registry = registry();
        let tenant = TenantId::from("acme");

        let zone = registry.create_zone(&tenant, "acme zone", None).unwrap();
        assert_eq!(zone.tenant, tenant);
        assert_eq!(zone.status, ZoneStatus::Active);
        assert_eq!(zone.metrics.total_executions, 0);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_duplicate_create_fails() {
        let registry = registry();
        let tenant = TenantId::from("acme");

        registry.create_zone(&tenant, "first", None).unwrap();
        let err = registry.create_zone(&tenant, "second", None).unwrap_err();
        assert!(matches!(err, ZoneError::DuplicateZone(t) if t == tenant));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_ensure_zone_is_idempotent() {
        let registry = registry();
        let tenant = TenantId::from("acme");

        let first = registry.ensure_zone(&tenant, None);
        let second = registry.ensure_zone(&tenant, None);
        assert_eq!(first.id, second.id);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_create_merges_overrides() {
        let registry = registry();
        let tenant = TenantId::from("acme");

        let zone = registry
            .create_zone(
                &tenant,
                "acme zone",
                Some(ZoneConfigPatch {
                    max_requests_per_minute: Some(3),
                    ..Default::default()
                }),
            )
            .unwrap();

        assert_eq!(zone.config.max_requests_per_minute, 3);
        // Unpatched fields keep the registry defaults
        assert_eq!(
            zone.config.max_memory_mb,
            ZoneConfig::default().max_memory_mb
        );
    }

    #[test]
    fn test_suspend_resume_cycle() {
        let registry = registry();
        let zone = registry.ensure_zone(&TenantId::from("acme"), None);

        registry.suspend(&zone.id, "payment overdue").unwrap();
        let suspended = registry.get(&zone.id).unwrap();
        assert_eq!(suspended.status, ZoneStatus::Suspended);
        assert_eq!(suspended.suspend_reason.as_deref(), Some("payment overdue"));

        // Suspending again is an invalid transition
        assert!(matches!(
            registry.suspend(&zone.id, "again"),
            Err(ZoneError::InvalidTransition { .. })
        ));

        registry.resume(&zone.id).unwrap();
        let resumed = registry.get(&zone.id).unwrap();
        assert_eq!(resumed.status, ZoneStatus::Active);
        assert!(resumed.suspend_reason.is_none());

        // Resuming an active zone fails
        assert!(matches!(
            registry.resume(&zone.id),
            Err(ZoneError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_terminate_erases_zone_and_mapping() {
        let registry = registry();
        let tenant = TenantId::from("acme");
        let zone = registry.ensure_zone(&tenant, None);

        registry.terminate(&zone.id).unwrap();
        assert!(registry.get(&zone.id).is_none());
        assert!(registry.get_by_tenant(&tenant).is_none());
        assert_eq!(registry.count(), 0);

        // A later ensure allocates a brand-new zone id
        let fresh = registry.ensure_zone(&tenant, None);
        assert_ne!(fresh.id, zone.id);
    }

    #[test]
    fn test_terminate_succeeds_from_suspended() {
        let registry = registry();
        let zone = registry.ensure_zone(&TenantId::from("acme"), None);

        registry.suspend(&zone.id, "abuse").unwrap();
        registry.terminate(&zone.id).unwrap();
        assert!(registry.get(&zone.id).is_none());
    }

    #[test]
    fn test_terminate_unknown_zone() {
        let registry = registry();
        let err = registry.terminate(&ZoneId::from("zone-missing")).unwrap_err();
        assert!(matches!(err, ZoneError::ZoneNotFound(_)));
    }

    #[test]
    fn test_update_config_merges() {
        let registry = registry();
        let zone = registry.ensure_zone(&TenantId::from("acme"), None);

        let updated = registry
            .update_config(
                &zone.id,
                ZoneConfigPatch {
                    max_concurrent_executions: Some(1),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.config.max_concurrent_executions, 1);
        assert_eq!(
            updated.config.max_requests_per_minute,
            zone.config.max_requests_per_minute
        );
    }

    #[test]
    fn test_engine_permissions() {
        let registry = registry();
        let zone = registry
            .create_zone(
                &TenantId::from("acme"),
                "acme zone",
                Some(ZoneConfigPatch {
                    allowed_engines: Some(PermissionSet::only(["billing"])),
                    ..Default::default()
                }),
            )
            .unwrap();

        assert!(registry.is_engine_allowed(&zone.id, "billing"));
        assert!(!registry.is_engine_allowed(&zone.id, "accounting"));

        // Wildcard zone allows everything
        let open = registry.ensure_zone(&TenantId::from("globex"), None);
        assert!(registry.is_engine_allowed(&open.id, "billing"));
        assert!(registry.is_engine_allowed(&open.id, "accounting"));

        // Unknown zone: false, not an error
        assert!(!registry.is_engine_allowed(&ZoneId::from("zone-missing"), "billing"));
    }

    #[test]
    fn test_mcp_permissions() {
        let registry = registry();
        let zone = registry
            .create_zone(
                &TenantId::from("acme"),
                "acme zone",
                Some(ZoneConfigPatch {
                    allowed_mcp_targets: Some(PermissionSet::only(["supabase"])),
                    ..Default::default()
                }),
            )
            .unwrap();

        assert!(registry.is_mcp_allowed(&zone.id, "supabase"));
        assert!(!registry.is_mcp_allowed(&zone.id, "stripe"));
        assert!(!registry.is_mcp_allowed(&ZoneId::from("zone-missing"), "supabase"));
    }

    #[test]
    fn test_lifecycle_events_emitted() {
        let sink = Arc::new(MemorySink::new());
        let registry = ZoneRegistry::with_event_sink(ZoneConfig::default(), sink.clone());
        let tenant = TenantId::from("acme");

        let zone = registry.ensure_zone(&tenant, None);
        registry.suspend(&zone.id, "audit").unwrap();
        registry.resume(&zone.id).unwrap();
        registry.terminate(&zone.id).unwrap();

        let events = sink.take();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], ZoneEvent::ZoneCreated { .. }));
        assert!(matches!(events[1], ZoneEvent::ZoneSuspended { .. }));
        assert!(matches!(events[2], ZoneEvent::ZoneResumed { .. }));
        assert!(matches!(events[3], ZoneEvent::ZoneTerminated { .. }));
    }

    #[test]
    fn test_list_zones() {
        let registry = registry();
        registry.ensure_zone(&TenantId::from("acme"), None);
        registry.ensure_zone(&TenantId::from("globex"), None);

        let zones = registry.list();
        assert_eq!(zones.len(), 2);
    }
}
