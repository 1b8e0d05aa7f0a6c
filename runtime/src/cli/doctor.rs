//! Environment readiness check.

use crate::cli::load_config;
use crate::renderer::chromium::{chromium_candidates, find_chromium, ChromiumRenderer, CHROMIUM_PATH_ENV};
use crate::renderer::{RenderContext, Renderer};
use anyhow::Result;
use std::path::Path;

/// Check Chromium availability and the configuration; with `launch`, also
/// start the browser and load a blank page.
pub async fn run(config_path: Option<&Path>, launch: bool) -> Result<()> {
    println!("Harvester Doctor");
    println!("================");
    println!();

    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    let mut ready = true;

    // Chromium
    if let Ok(p) = std::env::var(CHROMIUM_PATH_ENV) {
        if Path::new(&p).exists() {
            println!("[OK] {CHROMIUM_PATH_ENV} set: {p}");
        } else {
            println!("[!!] {CHROMIUM_PATH_ENV} points to a missing file: {p}");
        }
    }
    let chromium = find_chromium();
    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => {
            ready = false;
            println!("[!!] Chromium NOT found. Install Chrome or set {CHROMIUM_PATH_ENV}.");
            for candidate in chromium_candidates() {
                println!("     searched {}", candidate.display());
            }
        }
    }

    // Configuration
    match load_config(config_path) {
        Ok(config) => {
            let gallery = match &config.catalog.gallery {
                Some(g) => format!("gallery '{}' in {}", g.field, g.container),
                None => "no gallery".to_string(),
            };
            println!(
                "[OK] Config valid: {} fields, {gallery}",
                config.catalog.fields.len()
            );
        }
        Err(e) => {
            ready = false;
            println!("[!!] Config invalid: {e:#}");
        }
    }

    // Optional live check
    if launch && chromium.is_some() {
        match launch_check().await {
            Ok(state) => println!("[OK] Browser launched, blank page readyState={state:?}"),
            Err(e) => {
                ready = false;
                println!("[!!] Browser launch failed: {e}");
            }
        }
    }

    println!();
    if ready {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }
    Ok(())
}

async fn launch_check() -> Result<crate::renderer::ReadyState, crate::error::HarvestError> {
    let renderer = ChromiumRenderer::new().await?;
    let ctx = renderer.new_context().await?;
    ctx.navigate("about:blank", 10_000).await?;
    let state = ctx.ready_state().await;
    ctx.close().await.ok();
    renderer.shutdown().await.ok();
    state
}
