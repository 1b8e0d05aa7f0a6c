//! Readiness polling against a scripted page.
//!
//! Time is paused, so elapsed durations are exact.

mod common;

use async_trait::async_trait;
use common::{photos, FakePage, WALL};
use harvester_runtime::catalog::{GallerySpec, Locator};
use harvester_runtime::error::HarvestError;
use harvester_runtime::readiness::{
    poll, DocumentReady, ElementPresent, ElementVisible, MinItemsLoaded, Observation,
    ReadinessCondition,
};
use harvester_runtime::renderer::{scripts, RenderContext};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;

const INTERVAL: Duration = Duration::from_millis(250);

// ── Immediate and bounded outcomes ──

#[tokio::test(start_paused = true)]
async fn returns_the_moment_the_condition_holds() {
    let page = FakePage::new();
    let start = Instant::now();
    let result = poll(
        &page,
        &ElementPresent::new(Locator::css("main")),
        Duration::from_secs(5),
        INTERVAL,
    )
    .await
    .unwrap();

    assert!(result.satisfied);
    assert_eq!(result.checks, 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(result.last_observation, Observation::Element { visible: true });
}

#[tokio::test(start_paused = true)]
async fn absent_target_times_out_without_error() {
    let page = FakePage::new();
    let start = Instant::now();
    let result = poll(
        &page,
        &ElementVisible::new(Locator::css("#never")),
        Duration::from_secs(2),
        INTERVAL,
    )
    .await
    .unwrap();

    assert!(!result.satisfied);
    assert_eq!(result.last_observation, Observation::Absent);
    assert_eq!(start.elapsed(), Duration::from_secs(2));
    // one check at t=0 and one per interval up to and including t=2s
    assert_eq!(result.checks, 9);
}

#[tokio::test(start_paused = true)]
async fn hanging_lookup_is_cut_off_at_the_timeout() {
    let page = FakePage::new().hanging_on(scripts::LOCATE);
    let start = Instant::now();
    let timeout = Duration::from_secs(1);
    let result = poll(
        &page,
        &ElementPresent::new(Locator::css("main")),
        timeout,
        INTERVAL,
    )
    .await
    .unwrap();

    assert!(!result.satisfied);
    assert!(start.elapsed() <= timeout + INTERVAL);
    assert!(matches!(
        result.last_observation,
        Observation::LookupFailed { .. }
    ));
}

// ── Failure handling ──

/// Fails its first `failures` lookups with a transient error.
struct Flaky {
    failures: u32,
    calls: AtomicU32,
}

#[async_trait]
impl ReadinessCondition for Flaky {
    fn describe(&self) -> String {
        "flaky".into()
    }

    async fn observe(&self, _ctx: &dyn RenderContext) -> Result<Observation, HarvestError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            Err(HarvestError::Transient("node detached".into()))
        } else {
            Ok(Observation::Element { visible: true })
        }
    }

    fn is_satisfied(&self, observation: &Observation) -> bool {
        matches!(observation, Observation::Element { visible: true })
    }
}

#[tokio::test(start_paused = true)]
async fn transient_lookup_failures_keep_polling() {
    let page = FakePage::new();
    let flaky = Flaky {
        failures: 2,
        calls: AtomicU32::new(0),
    };
    let start = Instant::now();
    let result = poll(&page, &flaky, Duration::from_secs(5), INTERVAL)
        .await
        .unwrap();

    assert!(result.satisfied);
    assert_eq!(result.checks, 3);
    assert_eq!(start.elapsed(), INTERVAL * 2);
}

#[tokio::test(start_paused = true)]
async fn unavailable_context_aborts_the_poll() {
    let page = FakePage::new().unavailable_on(scripts::LOCATE);
    let err = poll(
        &page,
        &ElementPresent::new(Locator::css("main")),
        Duration::from_secs(5),
        INTERVAL,
    )
    .await
    .unwrap_err();
    assert!(err.is_unavailable());
}

// ── Built-in conditions on a page ──

#[tokio::test(start_paused = true)]
async fn min_items_loaded_counts_resolved_items() {
    let page = FakePage::new()
        .with_container(4800.0, 800.0)
        .with_batches(vec![photos(0..4)]);
    let gallery = GallerySpec::new(Locator::css(WALL));

    let enough = MinItemsLoaded::for_gallery(&gallery, Some(Locator::css(WALL)), 3);
    let result = poll(&page, &enough, Duration::from_secs(1), INTERVAL).await.unwrap();
    assert!(result.satisfied);
    assert_eq!(result.last_observation.loaded_count(), Some(4));

    let too_many = MinItemsLoaded::for_gallery(&gallery, Some(Locator::css(WALL)), 10);
    let result = poll(&page, &too_many, Duration::from_secs(1), INTERVAL).await.unwrap();
    assert!(!result.satisfied);
}

#[tokio::test(start_paused = true)]
async fn min_items_in_missing_container_is_absent() {
    let page = FakePage::new().with_batches(vec![photos(0..4)]);
    let gallery = GallerySpec::new(Locator::css(WALL));
    let condition = MinItemsLoaded::for_gallery(&gallery, Some(Locator::css(WALL)), 1);
    let result = poll(&page, &condition, Duration::from_millis(500), INTERVAL)
        .await
        .unwrap();
    assert!(!result.satisfied);
    assert_eq!(result.last_observation, Observation::Absent);
}

#[tokio::test(start_paused = true)]
async fn document_still_loading_is_not_ready() {
    let page = FakePage::new().with_ready_state("interactive");
    let result = poll(&page, &DocumentReady, Duration::from_secs(1), INTERVAL)
        .await
        .unwrap();
    assert!(!result.satisfied);

    let page = FakePage::new();
    let result = poll(&page, &DocumentReady, Duration::from_secs(1), INTERVAL)
        .await
        .unwrap();
    assert!(result.satisfied);
}
