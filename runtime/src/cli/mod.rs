//! CLI subcommand implementations for the `harvester` binary.

pub mod batch_cmd;
pub mod config_cmd;
pub mod doctor;
pub mod harvest_cmd;
pub mod output;

use crate::config::HarvestConfig;
use crate::events::{EventBus, HarvestEvent};
use anyhow::Result;
use std::path::Path;
use tokio::sync::broadcast::error::RecvError;

/// Load the config at `path`, or the defaults.
pub fn load_config(path: Option<&Path>) -> Result<HarvestConfig> {
    match path {
        Some(path) => HarvestConfig::from_file(path),
        None => Ok(HarvestConfig::default()),
    }
}

/// Print every event on `bus` to stderr as one JSON line.
pub fn stream_events(bus: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => eprintln!("{{\"type\":\"Lagged\",\"skipped\":{skipped}}}"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn print_event(event: &HarvestEvent) {
    if let Ok(line) = serde_json::to_string(event) {
        eprintln!("{line}");
    }
}
