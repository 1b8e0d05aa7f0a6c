// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Concurrent harvests over many URLs, one rendering context each.

use crate::config::HarvestConfig;
use crate::events::EventBus;
use crate::renderer::Renderer;
use crate::resilience::{ExtractionResult, Harvester};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};

/// Harvest every URL with at most `concurrency` contexts open at once.
///
/// Results come back in input order. Harvests share nothing but the
/// read-only configuration and the event bus. A context that cannot be
/// opened yields an `Unavailable` result for its URL.
pub async fn harvest_many(
    renderer: &dyn Renderer,
    urls: &[String],
    config: Arc<HarvestConfig>,
    concurrency: usize,
    events: Option<&EventBus>,
) -> Vec<ExtractionResult> {
    let concurrency = concurrency.max(1);
    info!(urls = urls.len(), concurrency, "batch harvest started");

    let results: Vec<ExtractionResult> = stream::iter(urls)
        .map(|url| {
            let config = Arc::clone(&config);
            async move { harvest_one(renderer, url, &config, events).await }
        })
        .buffered(concurrency)
        .collect()
        .await;

    let complete = results.iter().filter(|r| !r.partial).count();
    info!(total = results.len(), complete, "batch harvest finished");
    results
}

async fn harvest_one(
    renderer: &dyn Renderer,
    url: &str,
    config: &HarvestConfig,
    events: Option<&EventBus>,
) -> ExtractionResult {
    let mut harvester = Harvester::new(config);
    if let Some(bus) = events {
        harvester = harvester.with_events(bus);
    }

    let mut ctx = match renderer.new_context().await {
        Ok(ctx) => ctx,
        Err(e) => return harvester.unavailable(url, &e, Instant::now()),
    };
    let result = harvester.harvest(ctx.as_mut(), url).await;
    if let Err(e) = ctx.close().await {
        debug!(url, "closing context failed: {e}");
    }
    result
}
