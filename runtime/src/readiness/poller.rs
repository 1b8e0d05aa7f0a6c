//! Bounded-time polling of a readiness condition.

use super::predicates::{Observation, ReadinessCondition};
use crate::error::HarvestError;
use crate::renderer::RenderContext;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Outcome of one poll. A timeout is `satisfied == false`, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct PollResult {
    pub satisfied: bool,
    pub elapsed: Duration,
    pub last_observation: Observation,
    /// Number of evaluations performed.
    pub checks: u32,
}

/// Evaluate `condition` every `interval` until it holds or `timeout` elapses.
///
/// Returns as soon as the condition is satisfied. Lookup failures are
/// recorded as [`Observation::LookupFailed`] and polling continues; only an
/// unavailable context aborts with `Err`. A single evaluation is cut off at
/// the remaining budget, so the call returns within `timeout + interval`.
pub async fn poll(
    ctx: &dyn RenderContext,
    condition: &dyn ReadinessCondition,
    timeout: Duration,
    interval: Duration,
) -> Result<PollResult, HarvestError> {
    let interval = interval.max(Duration::from_millis(1));
    let start = Instant::now();
    let deadline = start + timeout;
    let mut last_observation = Observation::NotEvaluated;
    let mut checks = 0u32;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let budget = if remaining.is_zero() { interval } else { remaining };
        checks += 1;

        match tokio::time::timeout(budget, condition.observe(ctx)).await {
            Ok(Ok(observation)) => {
                let satisfied = condition.is_satisfied(&observation);
                last_observation = observation;
                if satisfied {
                    debug!(
                        condition = %condition.describe(),
                        checks,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "readiness satisfied"
                    );
                    return Ok(PollResult {
                        satisfied: true,
                        elapsed: start.elapsed(),
                        last_observation,
                        checks,
                    });
                }
            }
            Ok(Err(e)) if e.is_unavailable() => return Err(e),
            Ok(Err(e)) => {
                debug!(condition = %condition.describe(), "lookup failed: {e}");
                last_observation = Observation::LookupFailed {
                    message: e.to_string(),
                };
            }
            Err(_) => {
                last_observation = Observation::LookupFailed {
                    message: format!("evaluation exceeded {}ms", budget.as_millis()),
                };
            }
        }

        let now = Instant::now();
        if now >= deadline {
            debug!(
                condition = %condition.describe(),
                checks,
                "readiness not reached within {}ms",
                timeout.as_millis()
            );
            return Ok(PollResult {
                satisfied: false,
                elapsed: start.elapsed(),
                last_observation,
                checks,
            });
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}
