//! Page scripts evaluated through [`super::RenderContext::evaluate`].
//!
//! Each script is a function body that reads its inputs from `arguments[n]`
//! and returns a JSON-serializable value. Lookups never throw for a missing
//! element: absence comes back as `null` (or `-1` for counts).
//!
//! Scripts are public constants so that alternative context implementations
//! can recognise them by identity.

/// `[] -> "loading" | "interactive" | "complete"`
pub const READY_STATE: &str = "return document.readyState;";

/// `[selector] -> null | { tag, visible, scroll_height, client_height }`
pub const LOCATE: &str = r#"
let el = null;
try { el = document.querySelector(arguments[0]); } catch (e) { return null; }
if (!el) return null;
const rect = el.getBoundingClientRect();
const style = window.getComputedStyle(el);
const visible = rect.width > 0 && rect.height > 0
    && style.visibility !== 'hidden' && style.display !== 'none';
return {
    tag: el.tagName.toLowerCase(),
    visible: visible,
    scroll_height: el.scrollHeight,
    client_height: el.clientHeight
};
"#;

/// `[selector | null] -> null | { scroll_height, client_height }`
///
/// A non-scrollable container reports its own height against the viewport,
/// matching how [`SCROLL_REGION`] moves through it.
pub const REGION_EXTENT: &str = r#"
const sel = arguments[0];
if (!sel) {
    return {
        scroll_height: Math.max(document.body.scrollHeight, document.documentElement.scrollHeight),
        client_height: window.innerHeight
    };
}
let el = null;
try { el = document.querySelector(sel); } catch (e) { return null; }
if (!el) return null;
if (el.scrollHeight > el.clientHeight + 1) {
    return { scroll_height: el.scrollHeight, client_height: el.clientHeight };
}
return { scroll_height: el.getBoundingClientRect().height, client_height: window.innerHeight };
"#;

/// `[selector | null, offset, to_end] -> bool`
pub const SCROLL_REGION: &str = r#"
const sel = arguments[0];
const offset = arguments[1];
const toEnd = arguments[2];
if (!sel) {
    const end = Math.max(document.body.scrollHeight, document.documentElement.scrollHeight);
    window.scrollTo(0, toEnd ? end : offset);
    return true;
}
let el = null;
try { el = document.querySelector(sel); } catch (e) { return false; }
if (!el) return false;
if (el.scrollHeight > el.clientHeight + 1) {
    el.scrollTop = toEnd ? el.scrollHeight : offset;
} else {
    const top = el.getBoundingClientRect().top + window.scrollY;
    const height = el.getBoundingClientRect().height;
    window.scrollTo(0, top + (toEnd ? height : offset));
}
return true;
"#;

/// `[selectors[]] -> null | selector clicked`
pub const CLICK_FIRST: &str = r#"
for (const sel of arguments[0]) {
    let el = null;
    try { el = document.querySelector(sel); } catch (e) { continue; }
    if (el) { el.click(); return sel; }
}
return null;
"#;

/// Shared item walk for [`COUNT_LOADED`] and [`COLLECT_REFERENCES`].
macro_rules! item_walk {
    ($tail:literal) => {
        concat!(
            r#"
const sel = arguments[0];
let root = document;
if (sel) {
    try { root = document.querySelector(sel); } catch (e) { root = null; }
    if (!root) return null;
}
const attrs = arguments[2];
const markers = arguments[3].map(m => m.toLowerCase());
const refs = [];
for (const item of root.querySelectorAll(arguments[1])) {
    let value = null;
    for (const a of attrs) {
        const v = item.getAttribute(a);
        if (v && v.trim()) { value = v.trim(); break; }
    }
    if (!value) continue;
    const lower = value.toLowerCase();
    if (markers.some(m => lower.includes(m))) continue;
    if (value.startsWith('//')) value = window.location.protocol + value;
    refs.push(value);
}
"#,
            $tail
        )
    };
}

/// `[selector | null, item_selector, attrs[], markers[]] -> null | count`
pub const COUNT_LOADED: &str = item_walk!("return refs.length;");

/// `[selector | null, item_selector, attrs[], markers[]] -> null | string[]`
///
/// References come back in document order.
pub const COLLECT_REFERENCES: &str = item_walk!("return refs;");

/// `[selectors[], attribute] -> { found, value }`
pub const READ_ATTRIBUTE: &str = r#"
for (const sel of arguments[0]) {
    let el = null;
    try { el = document.querySelector(sel); } catch (e) { continue; }
    if (el) return { found: true, value: el.getAttribute(arguments[1]) };
}
return { found: false, value: null };
"#;

/// `[specs[{ name, selectors[], attribute | null, index | null, min_length }]] -> { name: string | null }`
///
/// Resolves every field in one evaluation. A failing lookup yields `null`
/// for that field only.
pub const EXTRACT_FIELDS: &str = r#"
const out = {};
for (const spec of arguments[0]) {
    out[spec.name] = null;
    try {
        for (const sel of spec.selectors) {
            const matches = document.querySelectorAll(sel);
            const el = matches[spec.index === null ? 0 : spec.index];
            if (!el) continue;
            let value = spec.attribute === null ? el.textContent : el.getAttribute(spec.attribute);
            value = value === null ? '' : value.trim();
            if (value.length === 0 || value.length < spec.min_length) continue;
            out[spec.name] = value;
            break;
        }
    } catch (e) {
        out[spec.name] = null;
    }
}
return out;
"#;

/// `[selector | null, item_selector, deferred_attrs[]] -> count primed`
///
/// Copies the first deferred reference into `src` where `src` is empty.
pub const PRIME_DEFERRED: &str = r#"
const sel = arguments[0];
let root = document;
if (sel) {
    try { root = document.querySelector(sel); } catch (e) { root = null; }
    if (!root) return 0;
}
let primed = 0;
for (const item of root.querySelectorAll(arguments[1])) {
    const src = item.getAttribute('src');
    if (src && src.startsWith('http')) continue;
    for (const a of arguments[2]) {
        const v = item.getAttribute(a);
        if (v && v.startsWith('http')) { item.setAttribute('src', v); primed++; break; }
    }
}
return primed;
"#;

/// Wrap a function body and its arguments into one self-contained
/// expression whose value is the JSON text of the body's result.
pub fn wrap(body: &str, args: &[serde_json::Value]) -> String {
    let args_json = serde_json::Value::from(args.to_vec()).to_string();
    format!(
        "(() => {{ const __args = {args_json}; \
         const __fn = function() {{ {body} }}; \
         const __r = __fn.apply(null, __args); \
         return JSON.stringify(__r === undefined ? null : __r); }})()"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wrap_embeds_args_as_json() {
        let js = wrap("return arguments[0];", &[json!("a'b"), json!(3)]);
        assert!(js.contains(r#"["a'b",3]"#));
        assert!(js.contains("JSON.stringify"));
    }

    #[test]
    fn test_item_walk_scripts_differ_only_in_tail() {
        assert!(COUNT_LOADED.ends_with("return refs.length;"));
        assert!(COLLECT_REFERENCES.ends_with("return refs;"));
        assert_ne!(COUNT_LOADED, COLLECT_REFERENCES);
    }
}
