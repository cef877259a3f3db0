//! Placeholder and patch markup shared with the client patch script.
//!
//! Invariants:
//! - Markup here must match the bootstrap script byte for byte; the client
//!   locates nodes by these exact `id` and `data-*` patterns.
//! - A suspense placeholder is a `div` whose subtree is balanced; the
//!   scanner relies on that to find its end.
//! - A patch for run `n` is only useful once the placeholder `B:n` has been
//!   written; the session enforces that ordering.

use core_types::{BoundaryIndex, RunId};
use memchr::memmem;
use std::ops::Range;

/// Name of the client function defined by `BOOTSTRAP_SCRIPT`.
pub const PATCH_FN: &str = "$RC";

pub const BOOTSTRAP_SCRIPT: &str = concat!(
    "<script id=\"rivulet-suspense\">",
    "function $RC(i){var d=document,q=d.querySelector.bind(d),",
    "v=q('div[id=\"B:'+i+'\"][data-sf]'),",
    "t=q('template[id=\"N:'+i+'\"][data-sr]'),",
    "s=q('script[id=\"S:'+i+'\"][data-ss]'),",
    "f=d.createDocumentFragment(),c,j,r;",
    "if(t&&v&&s){while(c=t.content.firstChild)f.appendChild(c);",
    "v.parentNode.replaceChild(f,v);t.remove();s.remove();",
    "r=d.querySelectorAll('template[id][data-sr]');",
    "do{j=0;for(c=0;c<r.length;c++)if(r[c]!=t)j=$RC(r[c].id.slice(2))?!0:j}while(j);",
    "return!0}}",
    "</script>"
);

const SUSPENSE_OPEN_PREFIX: &[u8] = b"<div id=\"B:";
pub const SUSPENSE_CLOSE: &str = "</div>";

pub fn suspense_open(run: RunId) -> String {
    format!("<div id=\"B:{run}\" data-sf>")
}

/// `<template id="N:n" data-sr>html</template><script id="S:n" data-ss>$RC(n)</script>`
pub fn suspense_patch(run: RunId, html: &str) -> String {
    format!(
        "<template id=\"N:{run}\" data-sr>{html}</template><script id=\"S:{run}\" data-ss>{PATCH_FN}({run})</script>"
    )
}

pub fn error_placeholder(index: BoundaryIndex) -> String {
    format!("<template id=\"E:{index}\"></template><!--E:{index}-->")
}

/// Replace everything from the `E:i` template to the `E:i` comment with the
/// template content preceding the script.
pub fn error_boundary_patch(index: BoundaryIndex, html: &str) -> String {
    format!(
        "<template data-eb>{html}</template><script>\
((d,c,n)=>{{c=d.currentScript.previousSibling;d=d.getElementById('E:{index}');\
if(!d)return;do{{n=d.nextSibling;n.remove()}}while(n.nodeType!=8||n.nodeValue!='E:{index}');\
d.replaceWith(c.content)}})(document)</script>"
    )
}

pub fn find_error_placeholder(text: &str, index: BoundaryIndex) -> Option<Range<usize>> {
    let needle = error_placeholder(index);
    let start = memmem::find(text.as_bytes(), needle.as_bytes())?;
    Some(start..start + needle.len())
}

/// Span of the whole `<div id="B:n" data-sf>…</div>` placeholder.
pub fn find_suspense_placeholder(text: &str, run: RunId) -> Option<Range<usize>> {
    let open = suspense_open(run);
    let start = memmem::find(text.as_bytes(), open.as_bytes())?;
    let end = balanced_div_end(text.as_bytes(), start + open.len())?;
    Some(start..end)
}

/// Byte offset just past the `</div>` closing a `div` opened before `from`.
pub fn balanced_div_end(bytes: &[u8], from: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut at = from;
    while depth > 0 {
        let rel = memmem::find(&bytes[at..], b"div")?;
        let pos = at + rel;
        at = pos + 3;
        let boundary = matches!(
            bytes.get(at),
            Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'/')
        );
        if !boundary {
            continue;
        }
        if pos >= 2 && &bytes[pos - 2..pos] == b"</" {
            depth -= 1;
            if depth == 0 {
                let close = memchr::memchr(b'>', &bytes[at..])?;
                return Some(at + close + 1);
            }
        } else if pos >= 1 && bytes[pos - 1] == b'<' {
            depth += 1;
        }
    }
    None
}

/// Run ids of every suspense placeholder opened in `text`.
pub fn placeholder_runs(text: &str) -> Vec<RunId> {
    let bytes = text.as_bytes();
    memmem::find_iter(bytes, SUSPENSE_OPEN_PREFIX)
        .filter_map(|start| {
            let digits = &bytes[start + SUSPENSE_OPEN_PREFIX.len()..];
            let len = digits.iter().take_while(|b| b.is_ascii_digit()).count();
            if digits.get(len) != Some(&b'"') {
                return None;
            }
            std::str::from_utf8(&digits[..len]).ok()?.parse().ok()
        })
        .collect()
}
