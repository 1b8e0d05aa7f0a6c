//! One harvest end to end: navigate, wait, extract fields, discover items.

use super::result::ExtractionResult;
use super::retry::Retrier;
use crate::catalog::SelectorCatalog;
use crate::config::{HarvestConfig, OperationClass};
use crate::discovery::{DiscoveryEngine, Termination};
use crate::error::{ErrorKind, FieldError, HarvestError, CONTEXT_FIELD};
use crate::events::{self, EventBus, HarvestEvent};
use crate::extract::extract_all;
use crate::readiness::{poll, DocumentReady, ElementPresent, ReadinessCondition};
use crate::renderer::RenderContext;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Runs harvests with one configuration.
///
/// Holds no per-page state; one harvester can serve many concurrent
/// harvests on distinct contexts.
#[derive(Clone, Copy)]
pub struct Harvester<'a> {
    config: &'a HarvestConfig,
    events: Option<&'a EventBus>,
}

impl<'a> Harvester<'a> {
    pub fn new(config: &'a HarvestConfig) -> Self {
        Self {
            config,
            events: None,
        }
    }

    pub fn with_events(mut self, bus: &'a EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    /// Harvest `url` in `ctx`.
    ///
    /// Always returns a result. Failures inside the harvest are recorded per
    /// field; an unreachable context yields a result whose only error is
    /// [`ErrorKind::Unavailable`] with completeness 0. The context is not
    /// closed.
    pub async fn harvest(&self, ctx: &mut dyn RenderContext, url: &str) -> ExtractionResult {
        let ctx: &dyn RenderContext = ctx;
        let started = Instant::now();
        let deadline = started + self.config.overall_deadline();
        info!(url, "harvest started");
        events::emit(self.events, || HarvestEvent::HarvestStarted {
            url: url.to_string(),
            deadline_ms: self.config.overall_deadline().as_millis() as u64,
        });

        match self.run(ctx, url, deadline).await {
            Ok(result) => self.finish(result, started),
            Err(e) => self.unavailable(url, &e, started),
        }
    }

    /// The result for a context that is gone: every field empty, no items
    /// and a single `Unavailable` error.
    pub fn unavailable(&self, url: &str, err: &HarvestError, started: Instant) -> ExtractionResult {
        warn!(url, "rendering context unavailable: {err}");
        let mut result = seeded(url, &self.config.catalog);
        result
            .errors
            .push(FieldError::new(CONTEXT_FIELD, ErrorKind::Unavailable, err.to_string()));
        self.finish(result, started)
    }

    /// The harvest proper. `Err` only for an unavailable context.
    async fn run(&self, ctx: &dyn RenderContext, url: &str, deadline: Instant) -> Result<ExtractionResult, HarvestError> {
        let catalog = &self.config.catalog;
        let retrier = Retrier::new(self.config, deadline);
        let mut result = seeded(url, catalog);

        // Navigation
        let (navigated, attempts) = retrier
            .run_counted(OperationClass::Navigation, "navigate", || {
                let timeout = self.config.navigation_timeout().min(remaining(deadline));
                let attempt = ctx.navigate(url, timeout.as_millis() as u64);
                // The context may not honour its own timeout.
                async move {
                    tokio::time::timeout_at(deadline, attempt)
                        .await
                        .unwrap_or_else(|_| {
                            Err(HarvestError::Timeout {
                                what: "navigation".into(),
                                elapsed_ms: timeout.as_millis() as u64,
                            })
                        })
                }
            })
            .await;
        match navigated {
            Ok(nav) => {
                info!(url, final_url = %nav.final_url, attempts, load_time_ms = nav.load_time_ms, "navigated");
                events::emit(self.events, || HarvestEvent::Navigated {
                    url: url.to_string(),
                    final_url: nav.final_url.clone(),
                    attempts,
                    load_time_ms: nav.load_time_ms,
                });
            }
            Err(e) if e.is_unavailable() => return Err(e),
            Err(e) => {
                warn!(url, attempts, "navigation failed: {e}");
                result.errors.push(FieldError::from_error(CONTEXT_FIELD, &e));
                return Ok(result);
            }
        }

        // Initial readiness
        self.await_initial_readiness(ctx, catalog, deadline).await?;

        // Fields
        let extracted = tokio::time::timeout_at(
            deadline,
            retrier.run(OperationClass::LocateAndAct, "extract fields", || {
                extract_all(ctx, &catalog.fields)
            }),
        )
        .await
        .unwrap_or_else(|_| {
            Err(HarvestError::Timeout {
                what: "field extraction".into(),
                elapsed_ms: self.config.overall_deadline().as_millis() as u64,
            })
        });
        match extracted {
            Ok(raw) => {
                for spec in &catalog.fields {
                    let value = match raw.get(&spec.name).cloned().flatten() {
                        Some(raw_value) => match retrier
                            .run(OperationClass::Parse, "parse field", || {
                                std::future::ready(spec.parse(&raw_value))
                            })
                            .await
                        {
                            Ok(parsed) => Some(parsed),
                            Err(e) => {
                                debug!(field = %spec.name, "parse failed: {e}");
                                result.errors.push(FieldError::from_error(&spec.name, &e));
                                None
                            }
                        },
                        None => {
                            result.errors.push(FieldError::new(
                                &spec.name,
                                ErrorKind::NotFound,
                                format!("no match for {}", spec.locator),
                            ));
                            None
                        }
                    };
                    let slot = if spec.required {
                        &mut result.required_fields
                    } else {
                        &mut result.optional_fields
                    };
                    slot.insert(spec.name.clone(), value);
                }
            }
            Err(e) if e.is_unavailable() => return Err(e),
            Err(e) => {
                warn!(url, "field extraction failed: {e}");
                for spec in &catalog.fields {
                    result.errors.push(FieldError::from_error(&spec.name, &e));
                }
            }
        }
        let present = result
            .required_fields
            .values()
            .chain(result.optional_fields.values())
            .filter(|v| v.is_some())
            .count();
        events::emit(self.events, || HarvestEvent::FieldsExtracted {
            url: url.to_string(),
            present,
            total: catalog.fields.len(),
        });

        // Items
        if let Some(gallery) = &catalog.gallery {
            let outcome = DiscoveryEngine::new(ctx, gallery, self.config)
                .with_events(self.events, url)
                .run(deadline)
                .await?;
            if outcome.report.fallback {
                result.errors.push(FieldError::new(
                    &gallery.field,
                    ErrorKind::NotFound,
                    format!("region {} not found, whole document used", gallery.container),
                ));
            }
            if outcome.report.termination == Termination::Deadline {
                result.errors.push(FieldError::new(
                    &gallery.field,
                    ErrorKind::Timeout,
                    format!(
                        "discovery cut off after {} steps ({}ms)",
                        outcome.report.steps_applied, outcome.report.elapsed_ms
                    ),
                ));
            }
            for e in &outcome.errors {
                result.errors.push(FieldError::from_error(&gallery.field, e));
            }
            result.items = outcome.items;
            result.discovery = Some(outcome.report);
        }

        Ok(result)
    }

    /// Wait for the document and the catalog's ready marker. Never fatal
    /// unless the context is gone.
    async fn await_initial_readiness(
        &self,
        ctx: &dyn RenderContext,
        catalog: &SelectorCatalog,
        deadline: Instant,
    ) -> Result<(), HarvestError> {
        let budget_end = (Instant::now() + self.config.initial_ready_timeout()).min(deadline);
        let document = DocumentReady;
        let marker = ElementPresent::new(catalog.ready.clone());
        let mut conditions: Vec<&dyn ReadinessCondition> = vec![&document];
        if !catalog.ready.is_empty() {
            conditions.push(&marker);
        }
        for condition in conditions {
            let polled = poll(ctx, condition, remaining(budget_end), self.config.poll_interval()).await?;
            if !polled.satisfied {
                warn!(
                    condition = %condition.describe(),
                    elapsed_ms = polled.elapsed.as_millis() as u64,
                    "page not ready in time, extracting anyway"
                );
                break;
            }
        }
        Ok(())
    }

    fn finish(&self, mut result: ExtractionResult, started: Instant) -> ExtractionResult {
        let items_field = self.config.catalog.gallery.as_ref().map(|g| g.field.as_str());
        result.finalize(items_field);
        if result.is_unavailable() {
            result.completeness = 0.0;
            result.partial = true;
        }
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            url = %result.source_url,
            completeness = result.completeness,
            items = result.items.len(),
            errors = result.errors.len(),
            elapsed_ms,
            "harvest finished"
        );
        events::emit(self.events, || HarvestEvent::HarvestFinished {
            url: result.source_url.clone(),
            completeness: result.completeness,
            partial: result.partial,
            errors: result.errors.len(),
            elapsed_ms,
        });
        result
    }
}

/// Harvest `url` with `config` and no event stream.
pub async fn harvest(ctx: &mut dyn RenderContext, url: &str, config: &HarvestConfig) -> ExtractionResult {
    Harvester::new(config).harvest(ctx, url).await
}

/// A result with every catalog field present as a key and no values.
fn seeded(url: &str, catalog: &SelectorCatalog) -> ExtractionResult {
    let mut result = ExtractionResult::empty(url);
    for spec in &catalog.fields {
        let slot = if spec.required {
            &mut result.required_fields
        } else {
            &mut result.optional_fields
        };
        slot.insert(spec.name.clone(), None);
    }
    result
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}
