//! Output helpers shared by CLI commands.
//!
//! Result JSON goes to stdout (or a file); human-readable summaries go to
//! stderr and are suppressed by `--quiet`.

use crate::resilience::ExtractionResult;
use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Whether `--quiet` was given.
pub fn is_quiet() -> bool {
    std::env::var("HARVESTER_QUIET").is_ok()
}

/// Serialize a value as JSON text.
pub fn to_json<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<String> {
    let text = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    text.context("failed to serialize output")
}

/// Write JSON to `path`, or to stdout when no path is given.
pub fn write_json<T: Serialize + ?Sized>(value: &T, path: Option<&Path>, pretty: bool) -> Result<()> {
    let text = to_json(value, pretty)?;
    match path {
        Some(path) => std::fs::write(path, format!("{text}\n"))
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{text}").context("failed to write to stdout")
        }
    }
}

/// One-line summary of a harvest for stderr.
pub fn summary(result: &ExtractionResult) -> String {
    let status = if result.is_unavailable() {
        "UNAVAILABLE"
    } else if result.partial {
        "PARTIAL"
    } else {
        "OK"
    };
    format!(
        "[{status}] {} completeness={:.2} items={} errors={}",
        result.source_url,
        result.completeness,
        result.items.len(),
        result.errors.len()
    )
}

/// Print a summary line to stderr unless quiet.
pub fn print_summary(result: &ExtractionResult) {
    if !is_quiet() {
        eprintln!("  {}", summary(result));
    }
}
