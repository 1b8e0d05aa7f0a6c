//! `harvester batch <file>`: harvest every URL listed in a file.

use crate::batch::harvest_many;
use crate::cli::{load_config, output, stream_events};
use crate::events::EventBus;
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::Renderer;
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;

/// Read one URL per line. Blank lines and `#` comments are skipped.
pub fn read_url_list(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read URL list {}", path.display()))?;
    parse_url_list(&raw)
}

fn parse_url_list(raw: &str) -> Result<Vec<String>> {
    let mut urls = Vec::new();
    for (lineno, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        url::Url::parse(line).with_context(|| format!("line {}: invalid URL '{line}'", lineno + 1))?;
        urls.push(line.to_string());
    }
    Ok(urls)
}

/// Run the batch command.
pub async fn run(
    file: &Path,
    config_path: Option<&Path>,
    output_path: Option<&Path>,
    concurrency: usize,
    pretty: bool,
    events: bool,
) -> Result<()> {
    let urls = read_url_list(file)?;
    if urls.is_empty() {
        bail!("no URLs in {}", file.display());
    }
    let config = Arc::new(load_config(config_path)?);

    let renderer = ChromiumRenderer::new()
        .await
        .context("failed to start Chromium (run `harvester doctor`)")?;

    let bus = EventBus::default();
    let printer = events.then(|| stream_events(&bus));

    let results = harvest_many(&renderer, &urls, config, concurrency, Some(&bus)).await;
    drop(bus);
    if let Some(printer) = printer {
        let _ = printer.await;
    }
    renderer.shutdown().await.ok();

    output::write_json(&results, output_path, pretty)?;
    for result in &results {
        output::print_summary(result);
    }

    if results.iter().all(|r| r.is_unavailable()) {
        bail!("rendering context unavailable for every URL");
    }
    Ok(())
}
