//! The progressive discovery loop: reveal, wait, extract, check stability.

use super::items::{DiscoveredItem, DiscoveredSet, ItemFilter};
use super::stability::StabilityTracker;
use crate::catalog::GallerySpec;
use crate::config::{HarvestConfig, OperationClass};
use crate::error::HarvestError;
use crate::events::{self, EventBus, HarvestEvent};
use crate::readiness::{poll, ElementPresent, MinItemsLoaded, ReadinessCondition};
use crate::renderer::RenderContext;
use crate::resilience::retry::Retrier;
use crate::reveal::{RevealController, RevealStep};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// States of the discovery loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    Planning,
    Revealing,
    Extracting,
    StabilityCheck,
    Done,
}

/// Why discovery stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Content fit in one view; extracted once.
    SinglePass,
    /// The count stopped changing and the item threshold was met.
    Stable,
    /// Every planned step was applied.
    StepBudgetExhausted,
    /// The wall-clock budget ran out.
    Deadline,
}

/// Summary of one discovery run, reported on the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub steps_applied: usize,
    pub termination: Termination,
    /// The whole-document fallback region was used.
    pub fallback: bool,
    /// The gallery trigger was clicked.
    pub triggered: bool,
    pub elapsed_ms: u64,
}

/// Items plus the errors discovery recovered from.
#[derive(Debug, Clone)]
pub struct DiscoveryOutcome {
    pub items: Vec<DiscoveredItem>,
    pub report: DiscoveryReport,
    /// Non-fatal failures, in the order they happened.
    pub errors: Vec<HarvestError>,
}

/// Mutable state threaded through the loop.
struct Run<'a> {
    controller: RevealController<'a>,
    steps: VecDeque<RevealStep>,
    tracker: StabilityTracker,
    set: DiscoveredSet,
    filter: ItemFilter,
    current_step: usize,
    steps_applied: usize,
    loaded_hint: usize,
    single_pass: bool,
    triggered: bool,
    termination: Option<Termination>,
    errors: Vec<HarvestError>,
}

impl Run<'_> {
    /// Record a recoverable failure; hand back an unavailable context.
    fn absorb(&mut self, what: &str, err: HarvestError) -> Result<(), HarvestError> {
        if err.is_unavailable() {
            return Err(err);
        }
        warn!(what, "discovery continuing after failure: {err}");
        self.errors.push(err);
        Ok(())
    }
}

/// Drives discovery of one gallery on one page.
pub struct DiscoveryEngine<'a> {
    ctx: &'a dyn RenderContext,
    gallery: &'a GallerySpec,
    config: &'a HarvestConfig,
    events: Option<&'a EventBus>,
    url: &'a str,
}

impl<'a> DiscoveryEngine<'a> {
    pub fn new(ctx: &'a dyn RenderContext, gallery: &'a GallerySpec, config: &'a HarvestConfig) -> Self {
        Self {
            ctx,
            gallery,
            config,
            events: None,
            url: "",
        }
    }

    /// Emit progress events for `url` on `bus`.
    pub fn with_events(mut self, bus: Option<&'a EventBus>, url: &'a str) -> Self {
        self.events = bus;
        self.url = url;
        self
    }

    /// Run until stable, out of steps, or out of time.
    ///
    /// `deadline` is the harvest's overall deadline; discovery also stops at
    /// its own `discovery_budget`, whichever comes first. Every failure short
    /// of an unavailable context is absorbed into the outcome.
    pub async fn run(&self, deadline: Instant) -> Result<DiscoveryOutcome, HarvestError> {
        let started = Instant::now();
        let deadline = deadline.min(started + self.config.discovery_budget());
        let retrier = Retrier::new(self.config, deadline);
        let mut run = Run {
            controller: RevealController::new(self.ctx, self.gallery, self.config.max_reveal_steps),
            steps: VecDeque::new(),
            tracker: StabilityTracker::new(self.config.effective_stability_window()),
            set: DiscoveredSet::new(),
            filter: ItemFilter::from_gallery(self.gallery),
            current_step: 0,
            steps_applied: 0,
            loaded_hint: 0,
            single_pass: false,
            triggered: false,
            termination: None,
            errors: Vec::new(),
        };

        let mut state = DiscoveryState::Planning;
        while state != DiscoveryState::Done {
            if Instant::now() >= deadline {
                run.termination = Some(Termination::Deadline);
                break;
            }
            debug!(?state, items = run.set.len(), "discovery");
            match tokio::time::timeout_at(deadline, self.advance(state, &mut run, &retrier)).await {
                Ok(Ok(next)) => state = next,
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    run.termination = Some(Termination::Deadline);
                    state = DiscoveryState::Done;
                }
            }
        }

        let termination = run.termination.unwrap_or(Termination::Deadline);
        if termination == Termination::Deadline {
            warn!(
                items = run.set.len(),
                steps = run.steps_applied,
                "discovery deadline reached, keeping what was found"
            );
        }
        let report = DiscoveryReport {
            steps_applied: run.steps_applied,
            termination,
            fallback: run.controller.is_fallback(),
            triggered: run.triggered,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            items = run.set.len(),
            steps = report.steps_applied,
            ?termination,
            fallback = report.fallback,
            "discovery finished"
        );
        events::emit(self.events, || HarvestEvent::DiscoveryFinished {
            url: self.url.to_string(),
            items: run.set.len(),
            steps_applied: report.steps_applied,
            termination,
            elapsed_ms: report.elapsed_ms,
        });

        Ok(DiscoveryOutcome {
            items: run.set.into_items(),
            report,
            errors: run.errors,
        })
    }

    async fn advance(
        &self,
        state: DiscoveryState,
        run: &mut Run<'a>,
        retrier: &Retrier<'_>,
    ) -> Result<DiscoveryState, HarvestError> {
        match state {
            DiscoveryState::Planning => self.plan(run, retrier).await,
            DiscoveryState::Revealing => self.reveal(run, retrier).await,
            DiscoveryState::Extracting => self.extract(run, retrier).await,
            DiscoveryState::StabilityCheck => Ok(self.check_stability(run)),
            DiscoveryState::Done => Ok(DiscoveryState::Done),
        }
    }

    async fn plan(&self, run: &mut Run<'a>, retrier: &Retrier<'_>) -> Result<DiscoveryState, HarvestError> {
        if !self.gallery.trigger.is_empty() {
            self.open_gallery(run, retrier).await?;
        }

        let located = retrier
            .run(OperationClass::LocateAndAct, "locate region", || run.controller.locate_region())
            .await;
        let located = match located {
            Ok(located) => located,
            Err(e) => {
                run.absorb("locate region", e)?;
                None
            }
        };
        run.controller.use_region(located);
        if run.controller.is_fallback() {
            events::emit(self.events, || HarvestEvent::RegionFallback {
                url: self.url.to_string(),
                locator: self.gallery.container.to_string(),
                max_steps: run.controller.max_steps(),
            });
        }

        let dims = retrier
            .run(OperationClass::LocateAndAct, "measure region", || run.controller.dimensions())
            .await;
        match dims {
            Ok(dims) => run.steps = run.controller.plan(dims).into(),
            Err(e) => run.absorb("measure region", e)?,
        }

        // Items already loaded must not satisfy the first step's wait.
        if !run.steps.is_empty() {
            let baseline = MinItemsLoaded::for_gallery(self.gallery, run.controller.region().locator(), 0);
            match baseline.observe(self.ctx).await {
                Ok(observation) => run.loaded_hint = observation.loaded_count().unwrap_or(0),
                Err(e) if e.is_unavailable() => return Err(e),
                Err(e) => debug!("no baseline item count: {e}"),
            }
        }

        info!(
            region = ?run.controller.region(),
            steps = run.steps.len(),
            loaded = run.loaded_hint,
            "discovery planned"
        );
        if run.steps.is_empty() {
            run.single_pass = true;
            Ok(DiscoveryState::Extracting)
        } else {
            Ok(DiscoveryState::Revealing)
        }
    }

    /// Click the gallery trigger and wait for the container. A missing
    /// trigger is not an error.
    async fn open_gallery(&self, run: &mut Run<'a>, retrier: &Retrier<'_>) -> Result<(), HarvestError> {
        let trigger = RevealStep::trigger();
        let clicked = retrier
            .run(OperationClass::LocateAndAct, "open gallery", || {
                run.controller.apply_step(&trigger)
            })
            .await;
        match clicked {
            Ok(()) => {
                run.triggered = true;
                let condition = ElementPresent::new(self.gallery.container.clone());
                let timeout = self
                    .config
                    .gallery_open_timeout()
                    .min(remaining(retrier.deadline()));
                let opened = poll(self.ctx, &condition, timeout, self.config.poll_interval()).await?;
                if !opened.satisfied {
                    debug!("gallery container did not appear after trigger");
                }
                Ok(())
            }
            Err(e) if e.is_unavailable() => Err(e),
            Err(e) => {
                info!("gallery trigger not clicked, continuing without it: {e}");
                Ok(())
            }
        }
    }

    async fn reveal(&self, run: &mut Run<'a>, retrier: &Retrier<'_>) -> Result<DiscoveryState, HarvestError> {
        let Some(step) = run.steps.pop_front() else {
            run.termination = Some(Termination::StepBudgetExhausted);
            return Ok(DiscoveryState::Done);
        };
        run.current_step = step.index;

        let applied = retrier
            .run(OperationClass::LocateAndAct, "apply reveal step", || {
                run.controller.apply_step(&step)
            })
            .await;
        match applied {
            Ok(()) => run.steps_applied += 1,
            Err(e) => run.absorb("apply reveal step", e)?,
        }

        // Proceed whether or not new content shows up in time.
        let condition = MinItemsLoaded::for_gallery(
            self.gallery,
            run.controller.region().locator(),
            run.loaded_hint + 1,
        );
        let timeout = self
            .config
            .reveal_step_timeout()
            .min(remaining(retrier.deadline()));
        let polled = poll(self.ctx, &condition, timeout, self.config.poll_interval()).await?;
        if let Some(loaded) = polled.last_observation.loaded_count() {
            run.loaded_hint = loaded;
        }

        debug!(
            index = step.index,
            offset = step.target_offset,
            content_ready = polled.satisfied,
            "reveal step done"
        );
        events::emit(self.events, || HarvestEvent::StepApplied {
            url: self.url.to_string(),
            index: step.index,
            action: step.action.as_str().to_string(),
            target_offset: step.target_offset,
            content_ready: polled.satisfied,
        });
        Ok(DiscoveryState::Extracting)
    }

    async fn extract(&self, run: &mut Run<'a>, retrier: &Retrier<'_>) -> Result<DiscoveryState, HarvestError> {
        if self.config.force_lazy_attributes {
            match run.controller.prime_deferred().await {
                Ok(primed) => debug!(primed, "deferred references primed"),
                Err(e) => run.absorb("prime deferred references", e)?,
            }
        }

        let collected = retrier
            .run(OperationClass::LocateAndAct, "collect references", || {
                run.controller.collect_references()
            })
            .await;
        match collected {
            Ok(references) => {
                let seen = references.len();
                let added = run.set.merge(references, &run.filter, run.current_step);
                debug!(step = run.current_step, seen, added, total = run.set.len(), "items merged");
                events::emit(self.events, || HarvestEvent::ItemsMerged {
                    url: self.url.to_string(),
                    step: run.current_step,
                    added,
                    total: run.set.len(),
                });
            }
            Err(e) => run.absorb("collect references", e)?,
        }

        if run.single_pass {
            run.termination = Some(Termination::SinglePass);
            Ok(DiscoveryState::Done)
        } else {
            Ok(DiscoveryState::StabilityCheck)
        }
    }

    fn check_stability(&self, run: &mut Run<'a>) -> DiscoveryState {
        let count = run.set.len();
        let stable = run.tracker.record(count);
        debug!(count, stable, unchanged = run.tracker.unchanged_run(), "stability check");

        if stable && count >= self.config.min_item_threshold {
            run.termination = Some(Termination::Stable);
            DiscoveryState::Done
        } else if run.steps.is_empty() {
            run.termination = Some(Termination::StepBudgetExhausted);
            DiscoveryState::Done
        } else {
            DiscoveryState::Revealing
        }
    }
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}
