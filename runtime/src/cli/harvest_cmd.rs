//! `harvester harvest <url>`: harvest a single page.

use crate::batch::harvest_many;
use crate::cli::{load_config, output, stream_events};
use crate::events::EventBus;
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::Renderer;
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;

/// Run the harvest command.
pub async fn run(
    url: &str,
    config_path: Option<&Path>,
    output_path: Option<&Path>,
    pretty: bool,
    events: bool,
) -> Result<()> {
    url::Url::parse(url).with_context(|| format!("invalid URL '{url}'"))?;
    let config = Arc::new(load_config(config_path)?);

    let renderer = ChromiumRenderer::new()
        .await
        .context("failed to start Chromium (run `harvester doctor`)")?;

    let bus = EventBus::default();
    let printer = events.then(|| stream_events(&bus));

    let mut results = harvest_many(&renderer, &[url.to_string()], config, 1, Some(&bus)).await;
    drop(bus);
    if let Some(printer) = printer {
        let _ = printer.await;
    }
    renderer.shutdown().await.ok();

    let Some(result) = results.pop() else {
        bail!("no result produced for {url}");
    };
    output::write_json(&result, output_path, pretty)?;
    output::print_summary(&result);

    if result.is_unavailable() {
        bail!("rendering context unavailable for {url}");
    }
    Ok(())
}
