//! Engine configuration: defaults, environment overlay and YAML file.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use cutover_classify::RouteAdmission;
use cutover_ops::{PollSpec, RetryPolicy};

/// Namespace the migration controller watches by default.
pub const DEFAULT_NAMESPACE: &str = "openshift-migration";

/// Poll cadence and tick budget for each loop family.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollSettings {
    pub migration: PollSpec,
    pub plan_validate: PollSpec,
    pub pv_discovery: PollSpec,
    pub plan_status: PollSpec,
    pub plan_close: PollSpec,
    pub analytic: PollSpec,
    pub hook: PollSpec,
    pub refresh: PollSpec,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            migration: PollSpec::every(5_000),
            plan_validate: PollSpec::every(5_000).with_max_ticks(240),
            pv_discovery: PollSpec::every(1_000).with_max_ticks(240),
            plan_status: PollSpec::every(5_000).with_max_ticks(10),
            plan_close: PollSpec::every(5_000).with_max_ticks(16),
            analytic: PollSpec::every(1_000).with_max_ticks(240),
            hook: PollSpec::every(2_000).with_max_ticks(30),
            refresh: PollSpec::every(5_000),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    pub namespace: String,
    pub retry: RetryPolicy,
    pub polls: PollSettings,
    /// Capacity of the broadcast bus behind `Orchestrator::subscribe`.
    pub event_buffer: usize,
    pub route_admission: RouteAdmission,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            retry: RetryPolicy::default(),
            polls: PollSettings::default(),
            event_buffer: 256,
            route_admission: RouteAdmission::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl EngineConfig {
    /// Defaults overlaid with `CUTOVER_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().overlay_env()
    }

    /// Load a YAML file, then apply the environment overlay.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        let cfg: EngineConfig =
            serde_yaml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg.overlay_env())
    }

    /// Unset or unparsable variables leave the current value in place.
    /// `CUTOVER_POLL_INTERVAL_MS` sets the migration and list-refresh cadence.
    pub fn overlay_env(mut self) -> Self {
        if let Ok(ns) = std::env::var("CUTOVER_NAMESPACE") {
            if !ns.trim().is_empty() {
                self.namespace = ns.trim().to_string();
            }
        }
        self.retry.max_attempts = env_parse("CUTOVER_RETRY_ATTEMPTS").unwrap_or(self.retry.max_attempts);
        self.retry.delay_ms = env_parse("CUTOVER_RETRY_DELAY_MS").unwrap_or(self.retry.delay_ms);
        if let Some(ms) = env_parse::<u64>("CUTOVER_POLL_INTERVAL_MS") {
            self.polls.migration.interval_ms = ms;
            self.polls.refresh.interval_ms = ms;
        }
        if let Some(ticks) = env_parse::<u32>("CUTOVER_PLAN_STATUS_TICKS") {
            self.polls.plan_status.max_ticks = Some(ticks);
        }
        self.event_buffer = env_parse("CUTOVER_EVENT_BUFFER").unwrap_or(self.event_buffer);
        self
    }
}
