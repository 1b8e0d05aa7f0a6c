//! `harvester config`: print the effective configuration.

use crate::cli::{load_config, output};
use anyhow::Result;
use std::path::Path;

/// Print the defaults, or `path` merged over them, as JSON.
pub async fn run(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    output::write_json(&config, None, true)
}
