//! The escaping buffer: literal markup interleaved with pending values.
//!
//! Layout:
//! - `frontier` is the open literal slice; every synchronous write lands
//!   there.
//! - `sealed` holds closed literals and pending values, newest at the front.
//!   Opening a pending value seals the frontier, pushes it and then the
//!   pending value onto the front, and starts a fresh frontier.
//!
//! Invariants:
//! - Walking `sealed` from the back and finishing with `frontier` yields
//!   document order, whatever order the pending values settle in.
//! - Text pushed through `push_escaped` is escaped exactly once; safe
//!   strings are copied verbatim with their callbacks.

use crate::context::RenderContext;
use crate::error::RenderResult;
use crate::escape::escape_to_buffer;
use crate::node::PendingNode;
use crate::safe::SafeString;
use futures::future::{LocalBoxFuture, try_join_all};
use std::collections::VecDeque;
use std::fmt;

enum Segment {
    Literal(SafeString),
    Pending(PendingNode),
}

#[derive(Default)]
pub struct StringBuffer {
    frontier: SafeString,
    sealed: VecDeque<Segment>,
}

impl StringBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append trusted markup.
    pub fn push_str(&mut self, text: &str) {
        self.frontier.text_mut().push_str(text);
    }

    pub fn push_escaped(&mut self, text: &str) {
        escape_to_buffer(text, self.frontier.text_mut());
    }

    pub fn push_safe(&mut self, safe: SafeString) {
        self.frontier.append(safe);
    }

    /// Queue `pending` behind the current frontier and open a new one.
    pub fn push_pending(&mut self, pending: PendingNode) {
        let sealed = std::mem::take(&mut self.frontier);
        self.sealed.push_front(Segment::Literal(sealed));
        self.sealed.push_front(Segment::Pending(pending));
        log::trace!(
            target: "html.buffer",
            "opened frontier; pending={}",
            self.pending_count()
        );
    }

    pub fn pending_count(&self) -> usize {
        self.sealed
            .iter()
            .filter(|segment| matches!(segment, Segment::Pending(_)))
            .count()
    }

    pub fn is_ready(&self) -> bool {
        self.pending_count() == 0
    }

    /// The whole buffer as one safe string, if nothing is pending.
    pub fn into_ready(self) -> Result<SafeString, Self> {
        if !self.is_ready() {
            return Err(self);
        }
        let StringBuffer {
            frontier,
            mut sealed,
        } = self;
        let mut out = SafeString::default();
        while let Some(segment) = sealed.pop_back() {
            if let Segment::Literal(text) = segment {
                out.append(text);
            }
        }
        out.append(frontier);
        Ok(out)
    }

    /// Split into the leading literal and, for each pending value in
    /// document order, the value plus the literal that follows it.
    pub(crate) fn into_slots(self) -> (SafeString, Vec<(PendingNode, SafeString)>) {
        let StringBuffer {
            frontier,
            mut sealed,
        } = self;
        let mut lead = SafeString::default();
        let mut slots: Vec<(PendingNode, SafeString)> = Vec::new();
        let literals = std::iter::from_fn(|| sealed.pop_back()).chain(std::iter::once(
            Segment::Literal(frontier),
        ));
        for segment in literals {
            match segment {
                Segment::Pending(pending) => slots.push((pending, SafeString::default())),
                Segment::Literal(text) => match slots.last_mut() {
                    Some((_, tail)) => tail.append(text),
                    None => lead.append(text),
                },
            }
        }
        (lead, slots)
    }

    /// Await every pending value and merge the results by position.
    ///
    /// A settled node is serialized with the usual child rules, so text is
    /// escaped, safe strings keep their callbacks and nested pending values
    /// are resolved recursively.
    pub fn resolve(self, cx: &RenderContext) -> LocalBoxFuture<'_, RenderResult<SafeString>> {
        Box::pin(async move {
            let buffer = match self.into_ready() {
                Ok(ready) => return Ok(ready),
                Err(buffer) => buffer,
            };
            let StringBuffer {
                frontier,
                mut sealed,
            } = buffer;

            let mut order = Vec::with_capacity(sealed.len());
            let mut pending = Vec::new();
            while let Some(segment) = sealed.pop_back() {
                match segment {
                    Segment::Literal(text) => order.push(Some(text)),
                    Segment::Pending(value) => {
                        order.push(None);
                        pending.push(value.into_future());
                    }
                }
            }
            log::trace!(target: "html.buffer", "resolving {} pending values", pending.len());
            let mut settled = try_join_all(pending).await?.into_iter();

            let mut out = SafeString::default();
            for part in order {
                match part {
                    Some(text) => out.append(text),
                    None => {
                        let Some(node) = settled.next() else {
                            continue;
                        };
                        let nested = node.render(cx)?;
                        out.append(nested.resolve(cx).await?);
                    }
                }
            }
            out.append(frontier);
            Ok(out)
        })
    }
}

impl fmt::Debug for StringBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StringBuffer")
            .field("frontier", &self.frontier)
            .field("sealed", &self.sealed.len())
            .field("pending", &self.pending_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use crate::node::Node;
    use futures::channel::oneshot;
    use futures::executor::LocalPool;
    use futures::task::LocalSpawnExt;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tools::rng::LcgRng;

    const DEFAULT_SEEDS: usize = 64;

    fn seed_count() -> usize {
        if let Ok(value) = std::env::var("RIVULET_PERMUTATION_SEEDS")
            && let Ok(parsed) = value.parse::<usize>()
            && parsed > 0
        {
            return parsed;
        }
        DEFAULT_SEEDS
    }

    fn oneshot_pending() -> (oneshot::Sender<Node>, PendingNode) {
        let (tx, rx) = oneshot::channel::<Node>();
        let pending = PendingNode::new(async move {
            rx.await.map_err(|_| RenderError::child("sender dropped"))
        });
        (tx, pending)
    }

    #[test]
    fn ready_buffer_concatenates_in_order() {
        let mut buf = StringBuffer::new();
        buf.push_str("<p>");
        buf.push_escaped("a & b");
        buf.push_safe(SafeString::new("<br/>"));
        buf.push_str("</p>");
        assert!(buf.is_ready());
        let out = buf.into_ready().unwrap();
        assert_eq!(out, "<p>a &amp; b<br/></p>");
    }

    #[test]
    fn frontier_is_sealed_behind_pending_value() {
        let mut buf = StringBuffer::new();
        buf.push_str("a");
        buf.push_pending(PendingNode::ready(Node::text("b")));
        buf.push_str("c");
        assert_eq!(buf.pending_count(), 1);
        assert!(matches!(buf.sealed.front(), Some(Segment::Pending(_))));
        assert!(matches!(buf.sealed.back(), Some(Segment::Literal(_))));
        assert_eq!(buf.frontier, "c");
    }

    #[test]
    fn into_slots_pairs_pending_values_with_following_literal() {
        let mut buf = StringBuffer::new();
        buf.push_str("head");
        buf.push_pending(PendingNode::ready(Node::text("x")));
        buf.push_str("mid");
        buf.push_pending(PendingNode::ready(Node::text("y")));
        buf.push_pending(PendingNode::ready(Node::text("z")));
        buf.push_str("tail");

        let (lead, slots) = buf.into_slots();
        assert_eq!(lead, "head");
        let tails: Vec<String> = slots
            .into_iter()
            .map(|(_, tail)| tail.into_string())
            .collect();
        assert_eq!(tails, vec!["mid", "", "tail"]);
    }

    #[test]
    fn resolve_escapes_text_and_keeps_safe_values() {
        let cx = RenderContext::default();
        let mut buf = StringBuffer::new();
        buf.push_str("<p>");
        buf.push_pending(PendingNode::ready(Node::text("<x>")));
        buf.push_pending(PendingNode::ready(Node::Safe(SafeString::new("<y/>"))));
        buf.push_pending(PendingNode::ready(Node::Number(3.0)));
        buf.push_str("</p>");
        let out = pollster::block_on(buf.resolve(&cx)).unwrap();
        assert_eq!(out, "<p>&lt;x&gt;<y/>3</p>");
    }

    #[test]
    fn nested_pending_values_resolve_in_place() {
        let cx = RenderContext::default();
        let inner = Node::fragment(vec![
            Node::text("1"),
            Node::Pending(PendingNode::ready(Node::text("2"))),
            Node::text("3"),
        ]);
        let mut buf = StringBuffer::new();
        buf.push_str("[");
        buf.push_pending(PendingNode::ready(inner));
        buf.push_str("]");
        let out = pollster::block_on(buf.resolve(&cx)).unwrap();
        assert_eq!(out, "[123]");
    }

    #[test]
    fn rejected_value_fails_resolution() {
        let cx = RenderContext::default();
        let mut buf = StringBuffer::new();
        buf.push_pending(PendingNode::new(async { Err(RenderError::child("boom")) }));
        let err = pollster::block_on(buf.resolve(&cx)).unwrap_err();
        assert_eq!(err, RenderError::child("boom"));
    }

    #[test]
    fn settlement_order_does_not_change_output() {
        const N: usize = 6;
        let mut expected = None;
        let mut rng = LcgRng::new(0x5eed);

        for _ in 0..seed_count() {
            let mut pool = LocalPool::new();
            let mut senders = Vec::with_capacity(N);
            let mut buf = StringBuffer::new();
            for i in 0..N {
                buf.push_str(&format!("<i{i}>"));
                let (tx, pending) = oneshot_pending();
                senders.push(Some(tx));
                buf.push_pending(pending);
            }
            buf.push_str("<end>");

            let out = Rc::new(RefCell::new(None));
            let slot = out.clone();
            pool.spawner()
                .spawn_local(async move {
                    let cx = RenderContext::default();
                    *slot.borrow_mut() = Some(buf.resolve(&cx).await);
                })
                .unwrap();
            pool.run_until_stalled();

            for i in rng.permutation(N) {
                let tx = senders[i].take().unwrap();
                tx.send(Node::text(format!("v{i}&"))).unwrap();
                pool.run_until_stalled();
            }

            let text = out.borrow_mut().take().unwrap().unwrap().into_string();
            match &expected {
                None => expected = Some(text),
                Some(first) => assert_eq!(&text, first),
            }
        }
        assert_eq!(
            expected.unwrap(),
            "<i0>v0&amp;<i1>v1&amp;<i2>v2&amp;<i3>v3&amp;<i4>v4&amp;<i5>v5&amp;<end>"
        );
    }
}
