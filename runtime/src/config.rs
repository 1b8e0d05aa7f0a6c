//! Harvest configuration: timing budgets, retry policies and the selector
//! catalog.
//!
//! Every duration is stored in milliseconds and read through
//! [`HarvestConfig::scaled`], which applies `timing_scale`. Slow networks get
//! a larger scale here instead of a process-wide multiplier.

use crate::catalog::SelectorCatalog;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Which class of operation a retry policy governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationClass {
    /// Page navigation.
    Navigation,
    /// Locating elements and acting on them (scroll, click, batch lookup).
    LocateAndAct,
    /// Parsing or formatting a resolved value. Never retried.
    Parse,
}

/// Bounded attempts with an increasing backoff schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay before retry n is `backoff_ms[n-1]`; the last entry repeats.
    pub backoff_ms: Vec<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_ms: vec![1000, 2000, 4000],
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            backoff_ms: vec![0],
        }
    }

    /// Unscaled delay after the `failures`-th failed attempt (1-based).
    pub fn delay_after(&self, failures: u32) -> Duration {
        let idx = (failures.max(1) - 1) as usize;
        let ms = self
            .backoff_ms
            .get(idx)
            .or_else(|| self.backoff_ms.last())
            .copied()
            .unwrap_or(0);
        Duration::from_millis(ms)
    }
}

/// Retry policies per operation class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicies {
    pub navigation: RetryPolicy,
    pub locate: RetryPolicy,
}

impl RetryPolicies {
    /// The policy for `class`, or `None` when the class is never retried.
    pub fn for_class(&self, class: OperationClass) -> Option<&RetryPolicy> {
        match class {
            OperationClass::Navigation => Some(&self.navigation),
            OperationClass::LocateAndAct => Some(&self.locate),
            OperationClass::Parse => None,
        }
    }
}

/// Complete configuration for one harvest. Read-only while harvesting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarvestConfig {
    pub max_reveal_steps: usize,
    pub reveal_step_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Consecutive unchanged counts before discovery is declared stable.
    pub stability_window: usize,
    pub min_item_threshold: usize,
    pub overall_deadline_ms: u64,
    pub discovery_budget_ms: u64,
    pub navigation_timeout_ms: u64,
    pub initial_ready_timeout_ms: u64,
    /// How long to wait for the gallery container after clicking its trigger.
    pub gallery_open_timeout_ms: u64,
    /// Multiplier applied to every timeout, interval and backoff.
    pub timing_scale: f64,
    /// Copy deferred `data-*` references into `src` before each extraction.
    pub force_lazy_attributes: bool,
    pub retry: RetryPolicies,
    pub catalog: SelectorCatalog,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_reveal_steps: 5,
            reveal_step_timeout_ms: 1000,
            poll_interval_ms: 250,
            stability_window: 2,
            min_item_threshold: 5,
            overall_deadline_ms: 15_000,
            discovery_budget_ms: 10_000,
            navigation_timeout_ms: 10_000,
            initial_ready_timeout_ms: 5_000,
            gallery_open_timeout_ms: 3_000,
            timing_scale: 1.0,
            force_lazy_attributes: false,
            retry: RetryPolicies::default(),
            catalog: SelectorCatalog::listing(),
        }
    }
}

impl HarvestConfig {
    /// Load a JSON config file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: HarvestConfig = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the harvester spin or never retry.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be > 0");
        }
        if !(self.timing_scale.is_finite() && self.timing_scale > 0.0) {
            bail!("timing_scale must be a positive number");
        }
        for (name, policy) in [
            ("navigation", &self.retry.navigation),
            ("locate", &self.retry.locate),
        ] {
            if policy.attempts == 0 {
                bail!("retry.{name}.attempts must be >= 1");
            }
            if policy.backoff_ms.is_empty() {
                bail!("retry.{name}.backoff_ms must not be empty");
            }
        }
        self.catalog
            .validate()
            .map_err(|e| anyhow::anyhow!("catalog: {e}"))?;
        Ok(())
    }

    /// Apply `timing_scale` to a millisecond budget.
    pub fn scaled(&self, ms: u64) -> Duration {
        Duration::from_secs_f64(ms as f64 * self.timing_scale / 1000.0)
    }

    /// Apply `timing_scale` to a duration.
    pub fn scale(&self, d: Duration) -> Duration {
        d.mul_f64(self.timing_scale)
    }

    pub fn poll_interval(&self) -> Duration {
        self.scaled(self.poll_interval_ms)
    }

    pub fn reveal_step_timeout(&self) -> Duration {
        self.scaled(self.reveal_step_timeout_ms)
    }

    pub fn overall_deadline(&self) -> Duration {
        self.scaled(self.overall_deadline_ms)
    }

    pub fn discovery_budget(&self) -> Duration {
        self.scaled(self.discovery_budget_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        self.scaled(self.navigation_timeout_ms)
    }

    pub fn initial_ready_timeout(&self) -> Duration {
        self.scaled(self.initial_ready_timeout_ms)
    }

    pub fn gallery_open_timeout(&self) -> Duration {
        self.scaled(self.gallery_open_timeout_ms)
    }

    /// Stability window with the `K >= 2` floor applied.
    pub fn effective_stability_window(&self) -> usize {
        self.stability_window.max(2)
    }
}
