//! The suspense boundary component.
//!
//! States: fallback emitted -> pending -> settled (success or failure) ->
//! finalized. Children that serialize without pending values are written
//! inline with no placeholder; a boundary without children renders its
//! fallback. The fallback is written synchronously inside a placeholder
//! `div` tagged with the boundary's run id; the children are rendered on a
//! task of the request's driver and delivered through the session, which
//! picks the in-place or out-of-band encoding.
//!
//! Cleanup (`end_boundary`) runs on every path, so a failing boundary never
//! blocks completion accounting of its siblings.

use crate::buffer::StringBuffer;
use crate::callback::{Phase, resolve_callbacks};
use crate::context::RenderContext;
use crate::error::{RenderError, RenderResult};
use crate::node::{Component, Node};
use crate::patch::{SUSPENSE_CLOSE, suspense_open};
use crate::safe::SafeString;
use std::fmt;

/// Recovery for a boundary whose children fail.
pub enum Catch {
    Static(Node),
    Handler(Box<dyn FnOnce(RenderError) -> Node>),
}

impl Catch {
    fn into_node(self, error: RenderError) -> Node {
        match self {
            Catch::Static(node) => node,
            Catch::Handler(handler) => handler(error),
        }
    }
}

impl fmt::Debug for Catch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Catch::Static(node) => f.debug_tuple("Static").field(node).finish(),
            Catch::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

#[derive(Debug, Default)]
pub struct Suspense {
    fallback: Vec<Node>,
    children: Vec<Node>,
    catch: Option<Catch>,
}

impl Suspense {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fallback(mut self, node: impl Into<Node>) -> Self {
        self.fallback.push(node.into());
        self
    }

    pub fn child(mut self, node: impl Into<Node>) -> Self {
        self.children.push(node.into());
        self
    }

    pub fn children(mut self, nodes: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(nodes);
        self
    }

    pub fn catch(mut self, node: impl Into<Node>) -> Self {
        self.catch = Some(Catch::Static(node.into()));
        self
    }

    pub fn catch_with(mut self, handler: impl FnOnce(RenderError) -> Node + 'static) -> Self {
        self.catch = Some(Catch::Handler(Box::new(handler)));
        self
    }

    pub fn render(self, cx: &RenderContext) -> RenderResult<Node> {
        let enabled = cx.suspense_root().is_some_and(|root| root.is_enabled());
        if !enabled {
            return Err(RenderError::Usage(
                "Suspense requires a streaming render (suspense is not enabled)",
            ));
        }
        let Some(session) = cx.session().cloned() else {
            return Err(RenderError::Usage(
                "Suspense requires a streaming render (no request session)",
            ));
        };
        let Suspense {
            fallback,
            children,
            catch,
        } = self;
        if children.is_empty() {
            return Ok(Node::Fragment(fallback));
        }

        // Walk errors are synchronous; only settled failures reach `catch`.
        let walked = match Node::Fragment(children).render(cx)?.into_ready() {
            Ok(ready) if !ready.has_callbacks() => return Ok(Node::Safe(ready)),
            Ok(ready) => {
                let mut buf = StringBuffer::new();
                buf.push_safe(ready);
                buf
            }
            Err(buf) => buf,
        };
        let run = session.begin_boundary();
        let task_cx = cx.clone();
        let task_session = session.clone();
        session.spawn(async move {
            let cx = task_cx;
            let content = walked.resolve(&cx).await;
            let content = match (content, catch) {
                (Ok(content), _) => Ok(content),
                (Err(err), Some(catch)) => {
                    log::warn!(
                        target: "html.suspense",
                        "request {}: boundary {run} recovered: {err}",
                        task_session.id()
                    );
                    recover(catch, err, &cx).await
                }
                (Err(err), None) => Err(err),
            };
            let settled = match content {
                Ok(content) => resolve_callbacks(content, Phase::Stringify, false, &cx).await,
                Err(err) => Err(err),
            };
            match settled {
                Ok(html) => task_session.settle_boundary(run, html.into_string()),
                Err(err) => task_session.report_error(&err),
            }
            task_session.end_boundary(run);
        });

        Ok(Node::Fragment(
            std::iter::once(Node::Safe(SafeString::new(suspense_open(run))))
                .chain(fallback)
                .chain(std::iter::once(Node::raw(SUSPENSE_CLOSE)))
                .collect(),
        ))
    }
}

async fn recover(catch: Catch, error: RenderError, cx: &RenderContext) -> RenderResult<SafeString> {
    let buf = catch.into_node(error).render(cx)?;
    buf.resolve(cx).await
}

impl From<Suspense> for Node {
    fn from(suspense: Suspense) -> Self {
        Node::Component(Component::new(move |_, cx| suspense.render(cx)))
    }
}
