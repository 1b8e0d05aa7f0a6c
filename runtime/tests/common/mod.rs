//! Scripted fake page for driving the harvester without a browser.
//!
//! `FakePage` answers each page script by identity. Items are revealed in
//! batches: batch 0 is visible on load and batch n appears after the n-th
//! scroll.

#![allow(dead_code)]

use async_trait::async_trait;
use harvester_runtime::catalog::{FieldSpec, GallerySpec, Locator, PostProcess, SelectorCatalog};
use harvester_runtime::config::HarvestConfig;
use harvester_runtime::error::HarvestError;
use harvester_runtime::renderer::{scripts, NavigationResult, RenderContext, Renderer};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::ops::Range;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

pub const WALL: &str = "ul.wall";
pub const TRIGGER: &str = "button.see-all";

// ── Fixtures ──

pub fn photo(n: usize) -> String {
    format!("https://img.example.com/photo/{n:03}.jpg")
}

pub fn photos(range: Range<usize>) -> Vec<String> {
    range.map(photo).collect()
}

/// Address and price required, bedrooms optional, images in `ul.wall`.
pub fn test_catalog() -> SelectorCatalog {
    let mut gallery = GallerySpec::new(Locator::css(WALL));
    gallery.include = vec!["img.example.com".into()];
    SelectorCatalog {
        ready: Locator::css("main"),
        fields: vec![
            FieldSpec::new("address", Locator::any(["h1.address", "h1"])).required(),
            FieldSpec::new("price", Locator::css("span.price"))
                .required()
                .with_post(PostProcess::Capture {
                    pattern: r"\$?([\d,]+)".into(),
                    group: 1,
                }),
            FieldSpec::new("bedrooms", Locator::css("span.fact"))
                .at_index(0)
                .with_post(PostProcess::Capture {
                    pattern: r"(\d+)".into(),
                    group: 1,
                }),
        ],
        gallery: Some(gallery),
    }
}

pub fn test_config() -> HarvestConfig {
    HarvestConfig {
        catalog: test_catalog(),
        ..HarvestConfig::default()
    }
}

pub fn listing_fields() -> Vec<(&'static str, &'static str)> {
    vec![
        ("address", "12 Elm Street, Springfield, IL 62704"),
        ("price", "$450,000"),
        ("bedrooms", "3 bd"),
    ]
}

/// Items revealed as `[1,2,3]` after step 1 and `[4,5]` after step 2.
pub fn two_step_batches() -> Vec<Vec<String>> {
    vec![vec![], photos(1..4), photos(4..6)]
}

// ── Fake page ──

struct PageState {
    url: String,
    nav_calls: u32,
    nav_failures: VecDeque<HarvestError>,
    navigation_hangs: bool,
    ready_state: &'static str,
    present: HashSet<String>,
    fields: HashMap<String, String>,
    extract_calls: u32,
    extract_failures: VecDeque<HarvestError>,
    batches: Vec<Vec<String>>,
    container_extent: (f64, f64),
    document_extent: (f64, f64),
    scrolls: Vec<(Option<String>, f64, bool)>,
    scroll_times: Vec<Instant>,
    reveal_delay: Duration,
    has_trigger: bool,
    trigger_clicks: u32,
    unavailable_on: HashSet<&'static str>,
    hanging_on: HashSet<&'static str>,
    script_calls: HashMap<&'static str, u32>,
}

/// A rendering context whose page is described up front.
pub struct FakePage {
    state: Mutex<PageState>,
}

impl Default for FakePage {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePage {
    /// A loaded page with a `main` element and nothing else.
    pub fn new() -> Self {
        let present = ["main", "body"].iter().map(|s| s.to_string()).collect();
        Self {
            state: Mutex::new(PageState {
                url: "about:blank".into(),
                nav_calls: 0,
                nav_failures: VecDeque::new(),
                navigation_hangs: false,
                ready_state: "complete",
                present,
                fields: HashMap::new(),
                extract_calls: 0,
                extract_failures: VecDeque::new(),
                batches: vec![vec![]],
                container_extent: (800.0, 800.0),
                document_extent: (1600.0, 800.0),
                scrolls: Vec::new(),
                scroll_times: Vec::new(),
                reveal_delay: Duration::ZERO,
                has_trigger: false,
                trigger_clicks: 0,
                unavailable_on: HashSet::new(),
                hanging_on: HashSet::new(),
                script_calls: HashMap::new(),
            }),
        }
    }

    fn with(self, f: impl FnOnce(&mut PageState)) -> Self {
        let mut state = self.state.into_inner().unwrap();
        f(&mut state);
        Self {
            state: Mutex::new(state),
        }
    }

    /// The typical listing: all fields, a media wall of 4800/800 and two
    /// reveal batches.
    pub fn listing() -> Self {
        Self::new()
            .with_fields(&listing_fields())
            .with_container(4800.0, 800.0)
            .with_batches(two_step_batches())
    }

    pub fn with_fields(self, fields: &[(&str, &str)]) -> Self {
        let fields: Vec<(String, String)> = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.with(|s| s.fields.extend(fields))
    }

    pub fn with_container(self, scroll_height: f64, client_height: f64) -> Self {
        self.with(|s| {
            s.present.insert(WALL.to_string());
            s.container_extent = (scroll_height, client_height);
        })
    }

    /// The container exists only after the trigger is clicked.
    pub fn with_trigger(self, scroll_height: f64, client_height: f64) -> Self {
        self.with(|s| {
            s.has_trigger = true;
            s.present.insert(TRIGGER.to_string());
            s.container_extent = (scroll_height, client_height);
        })
    }

    pub fn with_document_extent(self, scroll_height: f64, client_height: f64) -> Self {
        self.with(|s| s.document_extent = (scroll_height, client_height))
    }

    pub fn with_batches(self, batches: Vec<Vec<String>>) -> Self {
        self.with(|s| s.batches = batches)
    }

    /// Batch n appears `delay` after the n-th scroll.
    pub fn with_reveal_delay(self, delay: Duration) -> Self {
        self.with(|s| s.reveal_delay = delay)
    }

    /// `navigate` never returns.
    pub fn hanging_navigation(self) -> Self {
        self.with(|s| s.navigation_hangs = true)
    }

    pub fn with_ready_state(self, ready_state: &'static str) -> Self {
        self.with(|s| s.ready_state = ready_state)
    }

    pub fn failing_navigation(self, errors: Vec<HarvestError>) -> Self {
        self.with(|s| s.nav_failures.extend(errors))
    }

    pub fn failing_extraction(self, errors: Vec<HarvestError>) -> Self {
        self.with(|s| s.extract_failures.extend(errors))
    }

    /// Every call of `script` fails with `Unavailable`.
    pub fn unavailable_on(self, script: &'static str) -> Self {
        self.with(|s| {
            s.unavailable_on.insert(script);
        })
    }

    /// Every call of `script` never returns.
    pub fn hanging_on(self, script: &'static str) -> Self {
        self.with(|s| {
            s.hanging_on.insert(script);
        })
    }

    pub fn nav_calls(&self) -> u32 {
        self.state.lock().unwrap().nav_calls
    }

    pub fn extract_calls(&self) -> u32 {
        self.state.lock().unwrap().extract_calls
    }

    pub fn scroll_count(&self) -> usize {
        self.state.lock().unwrap().scrolls.len()
    }

    /// Region selector of every scroll (`None` = document).
    pub fn scroll_regions(&self) -> Vec<Option<String>> {
        self.state
            .lock()
            .unwrap()
            .scrolls
            .iter()
            .map(|(region, _, _)| region.clone())
            .collect()
    }

    pub fn scroll_offsets(&self) -> Vec<(f64, bool)> {
        self.state
            .lock()
            .unwrap()
            .scrolls
            .iter()
            .map(|(_, offset, to_end)| (*offset, *to_end))
            .collect()
    }

    pub fn trigger_clicks(&self) -> u32 {
        self.state.lock().unwrap().trigger_clicks
    }

    pub fn calls_of(&self, script: &'static str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .script_calls
            .get(script)
            .copied()
            .unwrap_or(0)
    }
}

/// The page script constants, for identity lookup.
const KNOWN_SCRIPTS: &[&str] = &[
    scripts::READY_STATE,
    scripts::LOCATE,
    scripts::REGION_EXTENT,
    scripts::SCROLL_REGION,
    scripts::CLICK_FIRST,
    scripts::COUNT_LOADED,
    scripts::COLLECT_REFERENCES,
    scripts::READ_ATTRIBUTE,
    scripts::EXTRACT_FIELDS,
    scripts::PRIME_DEFERRED,
];

impl PageState {
    fn revealed(&self) -> Vec<String> {
        let now = Instant::now();
        let landed = self
            .scroll_times
            .iter()
            .filter(|at| **at + self.reveal_delay <= now)
            .count();
        self.batches
            .iter()
            .take(landed + 1)
            .flatten()
            .cloned()
            .collect()
    }

    fn region_exists(&self, selector: &Value) -> bool {
        match selector.as_str() {
            None => true,
            Some(sel) => self.present.contains(sel),
        }
    }

    fn extent_of(&self, selector: &Value) -> (f64, f64) {
        if selector.is_null() {
            self.document_extent
        } else {
            self.container_extent
        }
    }

    fn respond(&mut self, script: &str, args: &[Value]) -> Result<Value, HarvestError> {
        if script == scripts::READY_STATE {
            Ok(Value::from(self.ready_state))
        } else if script == scripts::LOCATE {
            let selector = args[0].as_str().unwrap_or_default();
            if !self.present.contains(selector) {
                return Ok(Value::Null);
            }
            let (scroll_height, client_height) = if selector == WALL {
                self.container_extent
            } else {
                (100.0, 100.0)
            };
            Ok(json!({
                "tag": "div",
                "visible": true,
                "scroll_height": scroll_height,
                "client_height": client_height,
            }))
        } else if script == scripts::REGION_EXTENT {
            if !self.region_exists(&args[0]) {
                return Ok(Value::Null);
            }
            let (scroll_height, client_height) = self.extent_of(&args[0]);
            Ok(json!({ "scroll_height": scroll_height, "client_height": client_height }))
        } else if script == scripts::SCROLL_REGION {
            if !self.region_exists(&args[0]) {
                return Ok(Value::Bool(false));
            }
            let region = args[0].as_str().map(str::to_string);
            let offset = args[1].as_f64().unwrap_or_default();
            let to_end = args[2].as_bool().unwrap_or_default();
            self.scrolls.push((region, offset, to_end));
            self.scroll_times.push(Instant::now());
            Ok(Value::Bool(true))
        } else if script == scripts::CLICK_FIRST {
            let wanted: Vec<&str> = args[0]
                .as_array()
                .map(|a| a.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            if self.has_trigger && wanted.contains(&TRIGGER) {
                self.trigger_clicks += 1;
                self.present.insert(WALL.to_string());
                return Ok(Value::from(TRIGGER));
            }
            Ok(Value::Null)
        } else if script == scripts::COUNT_LOADED {
            if !self.region_exists(&args[0]) {
                return Ok(Value::Null);
            }
            Ok(Value::from(self.revealed().len()))
        } else if script == scripts::COLLECT_REFERENCES {
            if !self.region_exists(&args[0]) {
                return Ok(Value::Null);
            }
            Ok(Value::from(self.revealed()))
        } else if script == scripts::EXTRACT_FIELDS {
            self.extract_calls += 1;
            if let Some(err) = self.extract_failures.pop_front() {
                return Err(err);
            }
            let mut out = serde_json::Map::new();
            for spec in args[0].as_array().into_iter().flatten() {
                let name = spec["name"].as_str().unwrap_or_default().to_string();
                let value = self
                    .fields
                    .get(&name)
                    .map(|v| Value::from(v.as_str()))
                    .unwrap_or(Value::Null);
                out.insert(name, value);
            }
            Ok(Value::Object(out))
        } else if script == scripts::READ_ATTRIBUTE {
            Ok(json!({ "found": false, "value": null }))
        } else if script == scripts::PRIME_DEFERRED {
            Ok(Value::from(0))
        } else {
            Err(HarvestError::Transient("unknown script".into()))
        }
    }
}

#[async_trait]
impl RenderContext for FakePage {
    async fn navigate(&self, url: &str, _timeout_ms: u64) -> Result<NavigationResult, HarvestError> {
        let hang = {
            let mut state = self.state.lock().unwrap();
            state.nav_calls += 1;
            if let Some(err) = state.nav_failures.pop_front() {
                return Err(err);
            }
            state.url = url.to_string();
            state.navigation_hangs
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(NavigationResult {
            final_url: url.to_string(),
            status: 200,
            load_time_ms: 12,
        })
    }

    async fn evaluate(&self, script: &str, args: &[Value]) -> Result<Value, HarvestError> {
        let (hang, response) = {
            let mut state = self.state.lock().unwrap();
            if let Some(known) = KNOWN_SCRIPTS.iter().find(|k| **k == script) {
                *state.script_calls.entry(*known).or_insert(0) += 1;
            }
            if state.unavailable_on.contains(script) {
                (false, Err(HarvestError::Unavailable("target closed".into())))
            } else if state.hanging_on.contains(script) {
                (true, Ok(Value::Null))
            } else {
                (false, state.respond(script, args))
            }
        };
        if hang {
            std::future::pending::<()>().await;
        }
        response
    }

    async fn get_url(&self) -> Result<String, HarvestError> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn close(self: Box<Self>) -> Result<(), HarvestError> {
        Ok(())
    }
}

// ── Fake renderer ──

/// Hands out queued pages in order; `None` fails the context request.
pub struct FakeRenderer {
    pages: Mutex<VecDeque<Option<FakePage>>>,
    opened: Mutex<u32>,
}

impl FakeRenderer {
    pub fn new(pages: Vec<Option<FakePage>>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            opened: Mutex::new(0),
        }
    }

    pub fn opened(&self) -> u32 {
        *self.opened.lock().unwrap()
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>, HarvestError> {
        let next = self.pages.lock().unwrap().pop_front().flatten();
        match next {
            Some(page) => {
                *self.opened.lock().unwrap() += 1;
                Ok(Box::new(page))
            }
            None => Err(HarvestError::Unavailable("no browser".into())),
        }
    }

    async fn shutdown(&self) -> Result<(), HarvestError> {
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        0
    }
}
