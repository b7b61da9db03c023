//! Zone Configuration
//!
//! Policy attached to a zone: resource ceilings, per-minute budgets, the
//! isolation strictness level, and the two permission sets (execution
//! engines and MCP integration targets). A default configuration is merged
//! with an optional per-tenant override (e.g. from a subscription tier) at
//! zone-creation time.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default zone limits
pub const DEFAULT_MAX_MEMORY_MB: u32 = 512;
pub const DEFAULT_MAX_CPU_PERCENT: u32 = 50;
pub const DEFAULT_MAX_CONCURRENT_EXECUTIONS: u32 = 5;
pub const DEFAULT_MAX_REQUESTS_PER_MINUTE: u32 = 100;
pub const DEFAULT_MAX_NETWORK_CALLS_PER_MINUTE: u32 = 30;

/// Wildcard entry meaning "all ids allowed"
pub const WILDCARD: &str = "*";

/// Isolation strictness level for a zone
///
/// A policy label consumed by external collaborators (dispatcher, watchdog);
/// the engine carries and reports it but does not branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationLevel {
    /// Relaxed isolation for trusted internal tenants
    Shared,
    /// Default isolation
    Standard,
    /// Hardened isolation for untrusted tenants
    Strict,
}

impl Default for IsolationLevel {
    fn default() -> Self {
        IsolationLevel::Standard
    }
}

/// A permission set: either an explicit set of ids or a wildcard
///
/// The wildcard is the literal entry `"*"`; a set containing it allows
/// every id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(HashSet<String>);

impl PermissionSet {
    /// Allow every id
    pub fn all() -> Self {
        Self(HashSet::from([WILDCARD.to_string()]))
    }

    /// Allow only the given ids
    pub fn only<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(ids.into_iter().map(Into::into).collect())
    }

    /// Whether the set allows the given id
    pub fn allows(&self, id: &str) -> bool {
        self.0.contains(WILDCARD) || self.0.contains(id)
    }

    /// Whether the set is the wildcard
    pub fn is_wildcard(&self) -> bool {
        self.0.contains(WILDCARD)
    }
}

impl Default for PermissionSet {
    fn default() -> Self {
        Self::all()
    }
}

/// Per-zone policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    /// Maximum memory for tenant logic (MB)
    pub max_memory_mb: u32,

    /// Maximum CPU share (percent)
    pub max_cpu_percent: u32,

    /// Maximum concurrent executions
    pub max_concurrent_executions: u32,

    /// Maximum admitted requests per minute
    pub max_requests_per_minute: u32,

    /// Maximum outbound network calls per minute
    pub max_network_calls_per_minute: u32,

    /// Isolation strictness level
    pub isolation_level: IsolationLevel,

    /// Execution engines this zone may target
    pub allowed_engines: PermissionSet,

    /// MCP integration targets this zone may call
    pub allowed_mcp_targets: PermissionSet,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            max_memory_mb: DEFAULT_MAX_MEMORY_MB,
            max_cpu_percent: DEFAULT_MAX_CPU_PERCENT,
            max_concurrent_executions: DEFAULT_MAX_CONCURRENT_EXECUTIONS,
            max_requests_per_minute: DEFAULT_MAX_REQUESTS_PER_MINUTE,
            max_network_calls_per_minute: DEFAULT_MAX_NETWORK_CALLS_PER_MINUTE,
            isolation_level: IsolationLevel::default(),
            allowed_engines: PermissionSet::all(),
            allowed_mcp_targets: PermissionSet::all(),
        }
    }
}

impl ZoneConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load defaults with environment variable overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("ISOZONE_MAX_MEMORY_MB") {
            if let Ok(mb) = val.parse() {
                config.max_memory_mb = mb;
            }
        }

        if let Ok(val) = std::env::var("ISOZONE_MAX_CPU_PERCENT") {
            if let Ok(pct) = val.parse() {
                config.max_cpu_percent = pct;
            }
        }

        if let Ok(val) = std::env::var("ISOZONE_MAX_CONCURRENT_EXECUTIONS") {
            if let Ok(n) = val.parse() {
                config.max_concurrent_executions = n;
            }
        }

        if let Ok(val) = std::env::var("ISOZONE_MAX_REQUESTS_PER_MINUTE") {
            if let Ok(n) = val.parse() {
                config.max_requests_per_minute = n;
            }
        }

        if let Ok(val) = std::env::var("ISOZONE_MAX_NETWORK_CALLS_PER_MINUTE") {
            if let Ok(n) = val.parse() {
                config.max_network_calls_per_minute = n;
            }
        }

        config
    }

    /// Merge a partial override into this configuration
    ///
    /// Field-by-field: `Some` wins, `None` keeps the current value. No
    /// cross-field validation is performed (a concurrency cap of zero is
    /// accepted); callers are responsible for sane values.
    pub fn apply(&mut self, patch: ZoneConfigPatch) {
        if let Some(mb) = patch.max_memory_mb {
            self.max_memory_mb = mb;
        }
        if let Some(pct) = patch.max_cpu_percent {
            self.max_cpu_percent = pct;
        }
        if let Some(n) = patch.max_concurrent_executions {
            self.max_concurrent_executions = n;
        }
        if let Some(n) = patch.max_requests_per_minute {
            self.max_requests_per_minute = n;
        }
        if let Some(n) = patch.max_network_calls_per_minute {
            self.max_network_calls_per_minute = n;
        }
        if let Some(level) = patch.isolation_level {
            self.isolation_level = level;
        }
        if let Some(engines) = patch.allowed_engines {
            self.allowed_engines = engines;
        }
        if let Some(targets) = patch.allowed_mcp_targets {
            self.allowed_mcp_targets = targets;
        }
    }

    /// A copy of this configuration with a patch applied
    pub fn merged(&self, patch: ZoneConfigPatch) -> Self {
        let mut config = self.clone();
        config.apply(patch);
        config
    }
}

/// Partial zone configuration for per-tenant overrides and updates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneConfigPatch {
    pub max_memory_mb: Option<u32>,
    pub max_cpu_percent: Option<u32>,
    pub max_concurrent_executions: Option<u32>,
    pub max_requests_per_minute: Option<u32>,
    pub max_network_calls_per_minute: Option<u32>,
    pub isolation_level: Option<IsolationLevel>,
    pub allowed_engines: Option<PermissionSet>,
    pub allowed_mcp_targets: Option<PermissionSet>,
}
