//! Isozone
//!
//! Tenant isolation engine for a multi-tenant backend: every tenant gets
//! exactly one isolation zone, and all execution, rate limiting, and
//! cross-tenant access control flows through it.
//!
//! The crate is built from four cooperating components:
//!
//! - [`ZoneRegistry`] owns the zones: lifecycle (active, suspended,
//!   terminated), per-zone configuration, and permission checks.
//! - [`ZoneRateLimiter`] admits or denies work against per-zone budgets
//!   over a fixed counting window, with a short cooldown penalty on
//!   request-rate denials.
//! - [`ZoneExecutor`] runs tenant workloads inside their zone: admission,
//!   permission checks, a timeout race, and a capability-restricted
//!   [`ZoneContext`] handed to the workload.
//! - [`ZoneGuard`] enforces the hard tenant boundary everywhere else:
//!   cross-tenant access is denied unconditionally.
//!
//! # Example
//!
//! ```no_run
//! use isozone::{ExecutionRequest, TenantId, ZoneConfig, ZoneExecutor, ZoneRateLimiter, ZoneRegistry};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn run() {
//! let registry = Arc::new(ZoneRegistry::new(ZoneConfig::default()));
//! let limiter = Arc::new(ZoneRateLimiter::new(Arc::clone(&registry)));
//! let executor = ZoneExecutor::new(registry, limiter);
//!
//! let request = ExecutionRequest::new(TenantId::from("acme"), "monthly-report");
//! let outcome = executor
//!     .execute(request, |ctx| async move {
//!         ctx.log("generating report");
//!         Ok(json!({"rows": 42}))
//!     })
//!     .await;
//! assert!(outcome.success);
//! # }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod executor;
pub mod guard;
pub mod limiter;
pub mod registry;
pub mod zone;

pub use config::{IsolationLevel, PermissionSet, ZoneConfig, ZoneConfigPatch};
pub use error::ZoneError;
pub use event::{EventSink, MemorySink, TracingSink, ZoneEvent};
pub use executor::{ExecutionOutcome, ExecutionRequest, ZoneContext, ZoneExecutor};
pub use guard::{AccessDecision, AccessRequest, TenantScoped, TenantService, ZoneGuard};
pub use limiter::{RateDecision, ZoneRateLimiter};
pub use registry::ZoneRegistry;
pub use zone::{TenantId, Zone, ZoneId, ZoneMetrics, ZoneStatus};
