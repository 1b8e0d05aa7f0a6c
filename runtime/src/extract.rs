//! Batch field extraction in one page round trip.

use crate::catalog::{FieldSource, FieldSpec};
use crate::error::HarvestError;
use crate::renderer::{scripts, RenderContext};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Raw values keyed by field name. `None` means the locator resolved to
/// nothing usable.
pub type RawFields = BTreeMap<String, Option<String>>;

/// Encode field specs as the argument of [`scripts::EXTRACT_FIELDS`].
pub fn encode_specs<'a>(specs: impl IntoIterator<Item = &'a FieldSpec>) -> Value {
    let encoded: Vec<Value> = specs
        .into_iter()
        .map(|spec| {
            let attribute = match &spec.source {
                FieldSource::Text => Value::Null,
                FieldSource::Attribute(name) => Value::from(name.as_str()),
            };
            json!({
                "name": spec.name,
                "selectors": spec.locator.alternatives(),
                "attribute": attribute,
                "index": spec.index,
                "min_length": spec.min_length,
            })
        })
        .collect();
    Value::from(encoded)
}

/// Resolve every field with a single evaluation.
///
/// A field missing from the page is `None`; only a failure of the
/// evaluation as a whole is an error. Post-processing is left to the caller
/// so that parse failures can be told apart from missing values.
pub async fn extract_all(ctx: &dyn RenderContext, specs: &[FieldSpec]) -> Result<RawFields, HarvestError> {
    if specs.is_empty() {
        return Ok(RawFields::new());
    }
    let value = ctx
        .evaluate(scripts::EXTRACT_FIELDS, &[encode_specs(specs)])
        .await?;
    let object = value.as_object().ok_or_else(|| {
        HarvestError::Transient(format!("field extraction returned {value}, expected an object"))
    })?;

    let fields: RawFields = specs
        .iter()
        .map(|spec| {
            let raw = object
                .get(&spec.name)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            (spec.name.clone(), raw)
        })
        .collect();
    debug!(
        present = fields.values().filter(|v| v.is_some()).count(),
        total = fields.len(),
        "fields extracted"
    );
    Ok(fields)
}
