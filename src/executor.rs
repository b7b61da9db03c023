//! Zone Executor
//!
//! Runs one tenant-supplied unit of logic end-to-end under all applicable
//! limits: validate zone → check permission → atomically admit (budget
//! consumed with the decision) → execute under timeout → record end
//! (always) → return outcome.
//!
//! The payload runs as a spawned task handed only the [`ZoneContext`]
//! capability surface. On timeout the task is aborted; abort lands at the
//! task's next await point, so a payload that never yields keeps running
//! until it finishes. Cancellation is cooperative — this is an allow-list
//! scope, not an OS-level security boundary.
//!
//! Every denial and failure comes back as an [`ExecutionOutcome`] value;
//! nothing escapes uncaught, including payload panics.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::event::{EventSink, ZoneEvent};
use crate::limiter::ZoneRateLimiter;
use crate::registry::ZoneRegistry;
use crate::zone::{TenantId, ZoneId, ZoneStatus};

/// Timeout applied when a request does not specify one
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(30);

/// One "run this tenant logic" request
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Acting tenant
    pub tenant: TenantId,

    /// Context label for logs and events
    pub label: String,

    /// Execution engine the payload targets, if any
    pub engine: Option<String>,

    /// MCP integration target the payload uses, if any
    pub mcp_target: Option<String>,

    /// Time budget; the default applies if omitted
    pub timeout: Option<Duration>,
}

impl ExecutionRequest {
    pub fn new(tenant: TenantId, label: impl Into<String>) -> Self {
        Self {
            tenant,
            label: label.into(),
            engine: None,
            mcp_target: None,
            timeout: None,
        }
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    pub fn with_mcp_target(mut self, target: impl Into<String>) -> Self {
        self.mcp_target = Some(target.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Result of one execution attempt
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// Whether the payload ran to completion successfully
    pub success: bool,

    /// Zone the attempt was routed to
    pub zone_id: Option<ZoneId>,

    /// Payload result on success
    pub output: Option<Value>,

    /// Denial or failure reason otherwise
    pub error: Option<String>,

    /// Wall time spent in the executor
    pub duration: Duration,

    /// Process resident memory at return time (MB), where readable
    pub memory_used_mb: Option<f64>,
}

impl ExecutionOutcome {
    fn succeeded(zone_id: ZoneId, output: Value, duration: Duration) -> Self {
        Self {
            success: true,
            zone_id: Some(zone_id),
            output: Some(output),
            error: None,
            duration,
            memory_used_mb: current_rss_mb(),
        }
    }

    fn failed(zone_id: ZoneId, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: false,
            zone_id: Some(zone_id),
            output: None,
            error: Some(error.into()),
            duration,
            memory_used_mb: current_rss_mb(),
        }
    }
}

/// Capability surface handed to tenant logic
///
/// The payload gets exactly this: a zone-stamped log sink, a network-call
/// function that re-checks and records the zone's network budget on every
/// invocation, a clock, and a serialization helper. Everything else —
/// process control, dynamic loading, ambient timers — is withheld.
#[derive(Clone)]
pub struct ZoneContext {
    zone_id: ZoneId,
    tenant: TenantId,
    limiter: Arc<ZoneRateLimiter>,
}

impl ZoneContext {
    /// Zone this execution runs in
    pub fn zone_id(&self) -> &ZoneId {
        &self.zone_id
    }

    /// Tenant this execution acts for
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Log a message, stamped with the zone id
    pub fn log(&self, message: &str) {
        info!(zone_id = %self.zone_id, tenant = %self.tenant, "{}", message);
    }

    /// Request one outbound network call
    ///
    /// Re-checks the zone's network budget and records the call on success.
    /// Returns the denial reason when the budget is exhausted.
    pub fn network_call(&self, target: &str) -> Result<(), String> {
        let decision = self.limiter.check_network_call(&self.zone_id);
        if !decision.allowed {
            let reason = decision
                .reason
                .unwrap_or_else(|| "network call denied".to_string());
            self.limiter.record_blocked(&self.zone_id, &reason);
            return Err(reason);
        }
        self.limiter.record_network_call(&self.zone_id);
        info!(zone_id = %self.zone_id, target, "network call");
        Ok(())
    }

    /// Current wall-clock time
    pub fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    /// Serialize a value into the payload value type
    pub fn to_value<T: Serialize>(&self, value: &T) -> anyhow::Result<Value> {
        Ok(serde_json::to_value(value)?)
    }
}

/// Zone executor
pub struct ZoneExecutor {
    registry: Arc<ZoneRegistry>,
    limiter: Arc<ZoneRateLimiter>,
    events: Arc<dyn EventSink>,
    default_timeout: Duration,
}

impl ZoneExecutor {
    /// Create an executor over the given registry and limiter
    pub fn new(registry: Arc<ZoneRegistry>, limiter: Arc<ZoneRateLimiter>) -> Self {
        let events = registry.event_sink();
        Self {
            registry,
            limiter,
            events,
            default_timeout: DEFAULT_EXECUTION_TIMEOUT,
        }
    }

    /// Override the default execution timeout
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Run one unit of tenant logic under the zone's limits
    ///
    /// The tenant's zone is created lazily if absent. Permission checks run
    /// before admission, so a permission-denied request consumes no budget;
    /// the admission decision and the budget consumption then happen in one
    /// lock acquisition, so concurrent executes cannot over-admit past the
    /// concurrency cap. Denials are returned with the limiter's reason
    /// forwarded verbatim; a blocked attempt is recorded for each denial.
    /// Execution-end is recorded on every exit path so the in-flight
    /// counter stays accurate.
    pub async fn execute<F, Fut>(&self, request: ExecutionRequest, logic: F) -> ExecutionOutcome
    where
        F: FnOnce(ZoneContext) -> Fut,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let started = Instant::now();
        let zone = self.registry.ensure_zone(&request.tenant, None);
        let zone_id = zone.id.clone();

        if zone.status != ZoneStatus::Active {
            let reason = format!("zone is {}", zone.status);
            self.limiter.record_blocked(&zone_id, &reason);
            return ExecutionOutcome::failed(zone_id, reason, started.elapsed());
        }

        if let Some(engine) = &request.engine {
            if !self.registry.is_engine_allowed(&zone_id, engine) {
                let reason = format!("engine '{}' not allowed in this zone", engine);
                self.limiter.record_blocked(&zone_id, &reason);
                return ExecutionOutcome::failed(zone_id, reason, started.elapsed());
            }
        }

        if let Some(target) = &request.mcp_target {
            if !self.registry.is_mcp_allowed(&zone_id, target) {
                let reason = format!("mcp target '{}' not allowed in this zone", target);
                self.limiter.record_blocked(&zone_id, &reason);
                return ExecutionOutcome::failed(zone_id, reason, started.elapsed());
            }
        }

        // Decision and budget consumption are one compound; the claimed
        // slot is released by record_execution_end below.
        let admission = self.limiter.admit_request(&zone_id);
        if !admission.allowed {
            let reason = admission
                .reason
                .unwrap_or_else(|| "admission denied".to_string());
            self.limiter.record_blocked(&zone_id, &reason);
            return ExecutionOutcome::failed(zone_id, reason, started.elapsed());
        }

        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let context = ZoneContext {
            zone_id: zone_id.clone(),
            tenant: request.tenant.clone(),
            limiter: Arc::clone(&self.limiter),
        };

        let handle = tokio::spawn(logic(context));
        let abort = handle.abort_handle();

        let result = match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(err))) => Err(err.to_string()),
            Ok(Err(join_err)) if join_err.is_panic() => Err("execution panicked".to_string()),
            Ok(Err(_)) => Err("execution cancelled".to_string()),
            Err(_) => {
                // Abort lands at the payload's next await point; a payload
                // that never yields keeps running until it finishes.
                abort.abort();
                Err(format!(
                    "execution timed out after {}ms",
                    timeout.as_millis()
                ))
            }
        };

        self.limiter.record_execution_end(&zone_id);
        let duration = started.elapsed();

        match result {
            Ok(value) => {
                self.events.emit(ZoneEvent::ExecutionSucceeded {
                    zone_id: zone_id.clone(),
                    label: request.label.clone(),
                    duration_ms: duration.as_millis() as u64,
                });
                ExecutionOutcome::succeeded(zone_id, value, duration)
            }
            Err(reason) => {
                self.events.emit(ZoneEvent::ExecutionFailed {
                    zone_id: zone_id.clone(),
                    label: request.label.clone(),
                    reason: reason.clone(),
                    duration_ms: duration.as_millis() as u64,
                });
                ExecutionOutcome::failed(zone_id, reason, duration)
            }
        }
    }

    /// Side-effect-free pre-check: would an execute attempt be admitted?
    ///
    /// A tenant without a zone yet is executable (the zone is created
    /// lazily on the first execute).
    pub fn can_execute(&self, tenant: &TenantId) -> bool {
        match self.registry.get_by_tenant(tenant) {
            None => true,
            Some(zone) => {
                zone.status == ZoneStatus::Active && self.limiter.peek_request(&zone.id).allowed
            }
        }
    }
}

/// Resident set size of this process in MB, from procfs
fn current_rss_mb() -> Option<f64> {
    let status = fs::read_to_string("/proc/self/status").ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb: f64 = rest.trim().trim_end_matches(" kB").trim().parse().ok()?;
            return Some(kb / 1024.0);
        }
    }
    None
}
