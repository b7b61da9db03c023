//! Zone Engine Error Types
//!
//! This module defines the typed error values for zone operations. Admission
//! denials are deliberately *not* errors — they are returned as decision
//! values by the rate limiter and executor. `ZoneError` covers configuration
//! faults and the hard isolation-violation fault only.

use crate::zone::{TenantId, ZoneId, ZoneStatus};

/// Error types for zone operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum ZoneError {
    /// Tenant already owns a zone
    #[error("tenant '{0}' already owns a zone")]
    DuplicateZone(TenantId),

    /// Zone does not exist
    #[error("zone not found: {0}")]
    ZoneNotFound(ZoneId),

    /// Illegal status transition
    #[error("zone {zone_id} cannot transition from {from} to {to}")]
    InvalidTransition {
        zone_id: ZoneId,
        from: ZoneStatus,
        to: ZoneStatus,
    },

    /// Cross-tenant isolation breach caught by hard enforcement
    #[error("isolation violation: tenant '{source_tenant}' attempted '{action}' against tenant '{target_tenant}'")]
    IsolationViolation {
        source_tenant: TenantId,
        target_tenant: TenantId,
        action: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ZoneError::DuplicateZone(TenantId::from("acme"));
        assert_eq!(err.to_string(), "tenant 'acme' already owns a zone");

        let err = ZoneError::InvalidTransition {
            zone_id: ZoneId::from("zone-1"),
            from: ZoneStatus::Terminated,
            to: ZoneStatus::Active,
        };
        assert!(err.to_string().contains("terminated"));
        assert!(err.to_string().contains("active"));
    }

    #[test]
    fn test_isolation_violation_names_both_tenants() {
        let err = ZoneError::IsolationViolation {
            source_tenant: TenantId::from("acme"),
            target_tenant: TenantId::from("globex"),
            action: "read_invoice".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("acme"));
        assert!(msg.contains("globex"));
        assert!(msg.contains("read_invoice"));
    }

    // Field name must not collide with thiserror's implicit source-field
    // handling, which would require TenantId: std::error::Error.
    #[test]
    fn test_isolation_violation_has_no_error_source() {
        use std::error::Error;
        let err = ZoneError::IsolationViolation {
            source_tenant: TenantId::from("acme"),
            target_tenant: TenantId::from("globex"),
            action: "read".to_string(),
        };
        assert!(err.source().is_none());
    }
}
