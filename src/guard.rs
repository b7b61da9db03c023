//! Zone Guard
//!
//! Defense-in-depth boundary enforcement, independent of the executor and
//! usable by any code path. The rule has no exceptions: a request is
//! allowed if and only if the acting tenant and the owning tenant are the
//! same. There is no allowlist and no privileged tenant.
//!
//! Tenant context is a required, compile-time-checked parameter on the
//! downstream service seam ([`TenantService`]); the scoped wrapper exists
//! as a convenience net for "forgot to pass tenant id" bugs, not as the
//! sole enforcement point.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

use crate::error::ZoneError;
use crate::event::{EventSink, ZoneEvent};
use crate::registry::ZoneRegistry;
use crate::zone::TenantId;

/// A cross-zone access request to validate
#[derive(Debug, Clone)]
pub struct AccessRequest {
    /// Tenant performing the access
    pub source_tenant: TenantId,

    /// Tenant owning the targeted resource
    pub target_tenant: TenantId,

    /// Kind of resource targeted (e.g. "invoice", "ledger")
    pub resource_type: String,

    /// Identifier of the targeted resource
    pub resource_id: String,

    /// Action attempted (e.g. "read", "write")
    pub action: String,
}

/// Result of a boundary check
#[derive(Debug, Clone)]
pub struct AccessDecision {
    /// Whether the access is allowed
    pub allowed: bool,

    /// Reason for denial (if not allowed)
    pub reason: Option<String>,
}

impl AccessDecision {
    fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn denied(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// A downstream service that requires tenant context on every call
///
/// The tenant is an explicit parameter, so a call site cannot compile
/// without supplying it.
#[async_trait]
pub trait TenantService: Send + Sync {
    /// Handle one request on behalf of the given tenant
    async fn call(&self, tenant: &TenantId, request: Value) -> anyhow::Result<Value>;
}

/// A service pinned to one tenant
///
/// Every invocation supplies the pinned tenant to the underlying service
/// and stamps a missing `tenant_id` field into JSON-object requests before
/// the call executes.
pub struct TenantScoped<S> {
    inner: S,
    tenant: TenantId,
}

impl<S: TenantService> TenantScoped<S> {
    /// The tenant this wrapper is pinned to
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Invoke the underlying service as the pinned tenant
    pub async fn call(&self, mut request: Value) -> anyhow::Result<Value> {
        if let Value::Object(ref mut fields) = request {
            fields
                .entry("tenant_id")
                .or_insert_with(|| Value::String(self.tenant.as_str().to_string()));
        }
        self.inner.call(&self.tenant, request).await
    }
}

/// Zone guard
///
/// Holds the process-wide violation counter (observability only; it never
/// gates a decision) and emits audit events for every denial.
pub struct ZoneGuard {
    registry: Arc<ZoneRegistry>,
    events: Arc<dyn EventSink>,
    violations: AtomicU64,
}

impl ZoneGuard {
    /// Create a guard over the given registry
    pub fn new(registry: Arc<ZoneRegistry>) -> Self {
        let events = registry.event_sink();
        Self {
            registry,
            events,
            violations: AtomicU64::new(0),
        }
    }

    /// Validate a cross-zone access request
    ///
    /// Same tenant on both sides is always allowed with no further checks;
    /// any distinct pair is unconditionally denied.
    pub fn check_cross_zone_access(&self, request: &AccessRequest) -> AccessDecision {
        if request.source_tenant == request.target_tenant {
            return AccessDecision::allowed();
        }

        self.violations.fetch_add(1, Ordering::SeqCst);
        let source_zone = self.registry.get_by_tenant(&request.source_tenant);
        warn!(
            source_tenant = %request.source_tenant,
            target_tenant = %request.target_tenant,
            source_zone = ?source_zone.map(|z| z.id),
            resource_type = %request.resource_type,
            resource_id = %request.resource_id,
            action = %request.action,
            "cross-zone access blocked"
        );
        self.events.emit(ZoneEvent::CrossZoneBlocked {
            source_tenant: request.source_tenant.clone(),
            target_tenant: request.target_tenant.clone(),
            resource_type: request.resource_type.clone(),
            resource_id: request.resource_id.clone(),
            action: request.action.clone(),
        });

        AccessDecision::denied("cross-zone access denied")
    }

    /// Boolean form of the ownership rule, for call sites that branch
    pub fn validate_ownership(
        &self,
        tenant: &TenantId,
        resource_owner: &TenantId,
        resource_type: &str,
    ) -> bool {
        if tenant == resource_owner {
            return true;
        }

        self.violations.fetch_add(1, Ordering::SeqCst);
        warn!(
            tenant = %tenant,
            owner_tenant = %resource_owner,
            resource_type,
            "ownership violation"
        );
        self.events.emit(ZoneEvent::OwnershipViolation {
            tenant: tenant.clone(),
            owner_tenant: resource_owner.clone(),
            resource_type: resource_type.to_string(),
        });
        false
    }

    /// Hard-fail form: returns an isolation-violation fault on mismatch
    ///
    /// For call sites where continuing after a mismatch would itself be a
    /// bug.
    pub fn enforce_isolation(
        &self,
        source: &TenantId,
        target: &TenantId,
        action: &str,
    ) -> Result<(), ZoneError> {
        if source == target {
            return Ok(());
        }

        self.violations.fetch_add(1, Ordering::SeqCst);
        warn!(
            source_tenant = %source,
            target_tenant = %target,
            action,
            "isolation enforcement tripped"
        );
        self.events.emit(ZoneEvent::IsolationViolation {
            source_tenant: source.clone(),
            target_tenant: target.clone(),
            action: action.to_string(),
        });

        Err(ZoneError::IsolationViolation {
            source_tenant: source.clone(),
            target_tenant: target.clone(),
            action: action.to_string(),
        })
    }

    /// Pin a service to a tenant so every call carries tenant context
    pub fn scope_to_tenant<S: TenantService>(&self, service: S, tenant: &TenantId) -> TenantScoped<S> {
        TenantScoped {
            inner: service,
            tenant: tenant.clone(),
        }
    }

    /// Denied cross-tenant/ownership attempts seen by this guard
    pub fn violation_count(&self) -> u64 {
        self.violations.load(Ordering::SeqCst)
    }

    /// Reset the violation counter
    pub fn reset_violation_count(&self) {
        self.violations.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ZoneConfig;
    use crate::event::MemorySink;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn guard() -> ZoneGuard {
        ZoneGuard::new(Arc::new(ZoneRegistry::new(ZoneConfig::default())))
    }

    fn access(source: &str, target: &str) -> AccessRequest {
        AccessRequest {
            source_tenant: TenantId::from(source),
            target_tenant: TenantId::from(target),
            resource_type: "invoice".to_string(),
            resource_id: "inv-1".to_string(),
            action: "read".to_string(),
        }
    }

    #[test]
    fn test_same_tenant_allowed() {
        let guard = guard();
        let decision = guard.check_cross_zone_access(&access("acme", "acme"));
        assert!(decision.allowed);
        assert_eq!(guard.violation_count(), 0);
    }

    #[test]
    fn test_distinct_tenants_denied_and_counted() {
        let guard = guard();

        let decision = guard.check_cross_zone_access(&access("acme", "globex"));
        assert!(!decision.allowed);
        assert_eq!(decision.reason.as_deref(), Some("cross-zone access denied"));
        assert_eq!(guard.violation_count(), 1);

        guard.check_cross_zone_access(&access("globex", "acme"));
        assert_eq!(guard.violation_count(), 2);

        guard.reset_violation_count();
        assert_eq!(guard.violation_count(), 0);
    }

    #[test]
    fn test_validate_ownership() {
        let guard = guard();
        let acme = TenantId::from("acme");
        let globex = TenantId::from("globex");

        assert!(guard.validate_ownership(&acme, &acme, "invoice"));
        assert!(!guard.validate_ownership(&acme, &globex, "invoice"));
        assert_eq!(guard.violation_count(), 1);
    }

    #[test]
    fn test_enforce_isolation() {
        let guard = guard();
        let acme = TenantId::from("acme");
        let globex = TenantId::from("globex");

        assert!(guard.enforce_isolation(&acme, &acme, "write").is_ok());

        let err = guard.enforce_isolation(&acme, &globex, "write").unwrap_err();
        assert!(matches!(err, ZoneError::IsolationViolation { .. }));
        assert_eq!(guard.violation_count(), 1);
    }

    #[test]
    fn test_denials_emit_audit_events() {
        let sink = Arc::new(MemorySink::new());
        let registry = Arc::new(ZoneRegistry::with_event_sink(
            ZoneConfig::default(),
            sink.clone(),
        ));
        let guard = ZoneGuard::new(registry);
        let acme = TenantId::from("acme");
        let globex = TenantId::from("globex");

        guard.check_cross_zone_access(&access("acme", "globex"));
        guard.validate_ownership(&acme, &globex, "invoice");
        let _ = guard.enforce_isolation(&acme, &globex, "write");

        let events = sink.take();
        assert!(events
            .iter()
            .any(|e| matches!(e, ZoneEvent::CrossZoneBlocked { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, ZoneEvent::OwnershipViolation { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, ZoneEvent::IsolationViolation { .. })));
    }

    /// Records what the underlying service observes
    struct RecordingService {
        seen: Mutex<Vec<(TenantId, Value)>>,
    }

    #[async_trait]
    impl TenantService for &RecordingService {
        async fn call(&self, tenant: &TenantId, request: Value) -> anyhow::Result<Value> {
            self.seen.lock().unwrap().push((tenant.clone(), request));
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn test_scoped_service_stamps_tenant() {
        let guard = guard();
        let service = RecordingService {
            seen: Mutex::new(Vec::new()),
        };
        let tenant = TenantId::from("acme");

        let scoped = guard.scope_to_tenant(&service, &tenant);

        // Request lacking a tenant field gets it injected
        scoped.call(json!({"amount": 100})).await.unwrap();
        // A tenant field already present is left alone
        scoped
            .call(json!({"amount": 50, "tenant_id": "acme"}))
            .await
            .unwrap();

        let seen = service.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);

        let (observed_tenant, observed_request) = &seen[0];
        assert_eq!(observed_tenant, &tenant);
        assert_eq!(observed_request["tenant_id"], json!("acme"));
        assert_eq!(observed_request["amount"], json!(100));
    }

    proptest! {
        /// Allowed if and only if the tenant ids are equal, for all inputs.
        #[test]
        fn prop_cross_zone_allow_iff_same_tenant(source in "[a-z0-9-]{1,16}", target in "[a-z0-9-]{1,16}") {
            let guard = guard();
            let decision = guard.check_cross_zone_access(&access(&source, &target));
            prop_assert_eq!(decision.allowed, source == target);
        }
    }
}
