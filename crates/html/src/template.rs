//! Tagged-template style composition.
//!
//! `html(parts, values)` writes `parts[0]`, then each value followed by the
//! next part. Parts are trusted markup; values follow the child rules, so
//! text is escaped once and safe strings are kept verbatim.

use crate::buffer::StringBuffer;
use crate::context::RenderContext;
use crate::error::RenderResult;
use crate::node::Node;

pub fn html(
    parts: &[&str],
    values: impl IntoIterator<Item = Node>,
    cx: &RenderContext,
) -> RenderResult<Node> {
    let mut buf = StringBuffer::new();
    let mut parts = parts.iter();
    if let Some(first) = parts.next() {
        buf.push_str(first);
    }
    for value in values {
        value.write_to(&mut buf, cx)?;
        if let Some(part) = parts.next() {
            buf.push_str(part);
        }
    }
    for rest in parts {
        buf.push_str(rest);
    }
    Ok(ready_or_pending(buf, cx))
}

/// A ready buffer becomes `Node::Safe`; otherwise a pending node that
/// resolves the buffer.
pub fn ready_or_pending(buf: StringBuffer, cx: &RenderContext) -> Node {
    match buf.into_ready() {
        Ok(ready) => Node::Safe(ready),
        Err(buf) => {
            let cx = cx.clone();
            Node::pending(async move { Ok(Node::Safe(buf.resolve(&cx).await?)) })
        }
    }
}
