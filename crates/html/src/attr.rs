//! Attribute values and their serialization rules.
//!
//! Rules, in priority order (see `write_attr`):
//! 1. `style` with a `Style` value becomes `prop:value` pairs joined by `; `,
//!    camelCase keys converted to kebab-case. A `Style` value under any
//!    other name is stringified as `key:value` pairs and escaped (rule 7).
//! 2. `bind:html` / `dangerouslySetInnerHTML` are not attributes; the element
//!    consumes them as raw inner markup.
//! 3. `Null` is omitted.
//! 4. Numbers and safe values are written without escaping.
//! 5. Booleans on a boolean attribute name write `name=""` when true and are
//!    omitted when false.
//! 6. Pending values open a buffer frontier inside the quotes.
//! 7. Everything else is stringified and escaped.

use crate::buffer::StringBuffer;
use crate::node::{PendingNode, format_number};
use crate::safe::SafeString;

pub(crate) const RAW_HTML_ATTRS: [&str; 2] = ["bind:html", "dangerouslySetInnerHTML"];

const BOOLEAN_ATTRS: [&str; 25] = [
    "allowfullscreen",
    "async",
    "autofocus",
    "autoplay",
    "checked",
    "controls",
    "default",
    "defer",
    "disabled",
    "formnovalidate",
    "hidden",
    "inert",
    "ismap",
    "itemscope",
    "loop",
    "multiple",
    "muted",
    "nomodule",
    "novalidate",
    "open",
    "playsinline",
    "readonly",
    "required",
    "reversed",
    "selected",
];

pub fn is_boolean_attribute(name: &str) -> bool {
    BOOLEAN_ATTRS.binary_search(&name).is_ok()
}

pub(crate) fn is_raw_html_attr(name: &str) -> bool {
    RAW_HTML_ATTRS.contains(&name)
}

#[derive(Debug)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Style(Vec<(String, String)>),
    Safe(SafeString),
    Pending(PendingNode),
}

impl AttrValue {
    pub fn style<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        AttrValue::Style(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn pending(value: PendingNode) -> Self {
        AttrValue::Pending(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Number(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Number(value as f64)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        AttrValue::Number(f64::from(value))
    }
}

impl From<u32> for AttrValue {
    fn from(value: u32) -> Self {
        AttrValue::Number(f64::from(value))
    }
}

impl From<usize> for AttrValue {
    fn from(value: usize) -> Self {
        AttrValue::Number(value as f64)
    }
}

impl From<SafeString> for AttrValue {
    fn from(value: SafeString) -> Self {
        AttrValue::Safe(value)
    }
}

impl<T: Into<AttrValue>> From<Option<T>> for AttrValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(AttrValue::Null, Into::into)
    }
}

/// `backgroundColor` -> `background-color`. Already-kebab keys pass through.
pub fn kebab_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            out.push('-');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

fn flatten_style(entries: &[(String, String)]) -> String {
    let mut out = String::new();
    for (i, (key, value)) in entries.iter().enumerate() {
        if i > 0 {
            out.push_str("; ");
        }
        out.push_str(&kebab_case(key));
        out.push(':');
        out.push_str(value);
    }
    out
}

/// Plain `key:value` text for a map held by a name other than `style`.
fn stringify_entries(entries: &[(String, String)]) -> String {
    entries
        .iter()
        .map(|(key, value)| format!("{key}:{value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Write one attribute (with its leading space) per the rules above.
///
/// Raw-HTML directives must be filtered out by the caller.
pub(crate) fn write_attr(name: &str, value: AttrValue, buf: &mut StringBuffer) {
    match value {
        AttrValue::Style(entries) if name == "style" => {
            write_escaped(name, &flatten_style(&entries), buf)
        }
        AttrValue::Style(entries) => write_escaped(name, &stringify_entries(&entries), buf),
        AttrValue::Null => {}
        AttrValue::Number(n) => write_quoted(name, &format_number(n), buf),
        AttrValue::Safe(safe) => {
            buf.push_str(" ");
            buf.push_str(name);
            buf.push_str("=\"");
            buf.push_safe(safe);
            buf.push_str("\"");
        }
        AttrValue::Bool(flag) if is_boolean_attribute(name) => {
            if flag {
                write_quoted(name, "", buf);
            }
        }
        AttrValue::Pending(value) => {
            buf.push_str(" ");
            buf.push_str(name);
            buf.push_str("=\"");
            buf.push_pending(value);
            buf.push_str("\"");
        }
        AttrValue::Bool(flag) => write_escaped(name, if flag { "true" } else { "false" }, buf),
        AttrValue::Str(text) => write_escaped(name, &text, buf),
    }
}

fn write_escaped(name: &str, text: &str, buf: &mut StringBuffer) {
    buf.push_str(" ");
    buf.push_str(name);
    buf.push_str("=\"");
    buf.push_escaped(text);
    buf.push_str("\"");
}

fn write_quoted(name: &str, verbatim: &str, buf: &mut StringBuffer) {
    buf.push_str(" ");
    buf.push_str(name);
    buf.push_str("=\"");
    buf.push_str(verbatim);
    buf.push_str("\"");
}
