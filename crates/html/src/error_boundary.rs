//! The error boundary component.
//!
//! Children that render synchronously are written inline. Children with
//! pending content leave a placeholder `<template id="E:i"></template><!--E:i-->`
//! carrying a deferred callback:
//! - `Stringify`: the settled content (or fallback) replaces the placeholder
//!   span inside the supplied buffer.
//! - `BeforeStream`: nothing; the chunk leaves with the placeholder.
//! - `Stream`: an out-of-band chunk swaps the placeholder client-side.
//!
//! A boundary settles once; later invocations of its callback are no-ops.

use crate::buffer::StringBuffer;
use crate::callback::{Continuation, DeferredCallback, Phase, resolve_callbacks};
use crate::context::RenderContext;
use crate::error::{RenderError, RenderResult};
use crate::node::{Component, Node};
use crate::patch::{error_boundary_patch, error_placeholder, find_error_placeholder};
use crate::safe::SafeString;
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub enum Fallback {
    Static(Node),
    Render(Box<dyn FnOnce(RenderError) -> Node>),
}

impl Fallback {
    fn into_node(self, error: RenderError) -> Node {
        match self {
            Fallback::Static(node) => node,
            Fallback::Render(render) => render(error),
        }
    }
}

type ErrorHook = Rc<dyn Fn(&RenderError)>;

#[derive(Default)]
pub struct ErrorBoundary {
    children: Vec<Node>,
    fallback: Option<Fallback>,
    on_error: Option<ErrorHook>,
}

impl ErrorBoundary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(mut self, node: impl Into<Node>) -> Self {
        self.children.push(node.into());
        self
    }

    pub fn children(mut self, nodes: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(nodes);
        self
    }

    pub fn fallback(mut self, node: impl Into<Node>) -> Self {
        self.fallback = Some(Fallback::Static(node.into()));
        self
    }

    pub fn fallback_render(mut self, render: impl FnOnce(RenderError) -> Node + 'static) -> Self {
        self.fallback = Some(Fallback::Render(Box::new(render)));
        self
    }

    pub fn on_error(mut self, hook: impl Fn(&RenderError) + 'static) -> Self {
        self.on_error = Some(Rc::new(hook));
        self
    }

    pub fn render(self, cx: &RenderContext) -> RenderResult<Node> {
        let ErrorBoundary {
            children,
            fallback,
            on_error,
        } = self;

        let buf = match Node::Fragment(children).render(cx) {
            Ok(buf) => buf,
            Err(err) => {
                if let Some(hook) = &on_error {
                    hook(&err);
                }
                return match fallback {
                    Some(fallback) => Ok(fallback.into_node(err)),
                    None => Err(err),
                };
            }
        };
        let buf = match buf.into_ready() {
            Ok(ready) if !ready.has_callbacks() => return Ok(Node::Safe(ready)),
            Ok(ready) => {
                let mut buf = StringBuffer::new();
                buf.push_safe(ready);
                buf
            }
            Err(buf) => buf,
        };

        let index = cx.next_error_boundary();
        let content_cx = cx.clone();
        let content = async move {
            let content = buf.resolve(&content_cx).await?;
            resolve_callbacks(content, Phase::Stringify, false, &content_cx).await
        }
        .boxed_local();
        let pending = Rc::new(RefCell::new(Some(PendingBoundary {
            content,
            fallback,
            on_error,
            cx: cx.clone(),
        })));

        let callback = DeferredCallback::new(move |args| {
            if args.phase == Phase::BeforeStream {
                return Continuation::Done;
            }
            let Some(boundary) = pending.borrow_mut().take() else {
                return Continuation::Done;
            };
            match args.buffer {
                Some(buffer) => {
                    let buffer = buffer.clone();
                    Continuation::later(async move {
                        let html = boundary.settle().await?;
                        buffer.replace_span(|text| find_error_placeholder(text, index), &html);
                        Ok(SafeString::default())
                    })
                }
                None => Continuation::later(async move {
                    let html = boundary.settle().await?;
                    Ok(SafeString::new(error_boundary_patch(index, &html)))
                }),
            }
        });

        Ok(Node::Safe(SafeString::with_callbacks(
            error_placeholder(index),
            vec![callback],
        )))
    }
}

impl fmt::Debug for ErrorBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorBoundary")
            .field("children", &self.children.len())
            .field("fallback", &self.fallback.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl From<ErrorBoundary> for Node {
    fn from(boundary: ErrorBoundary) -> Self {
        Node::Component(Component::new(move |_, cx| boundary.render(cx)))
    }
}

struct PendingBoundary {
    content: LocalBoxFuture<'static, RenderResult<SafeString>>,
    fallback: Option<Fallback>,
    on_error: Option<ErrorHook>,
    cx: RenderContext,
}

impl PendingBoundary {
    async fn settle(self) -> RenderResult<String> {
        let PendingBoundary {
            content,
            fallback,
            on_error,
            cx,
        } = self;
        let err = match content.await {
            Ok(html) => return Ok(html.into_string()),
            Err(err) => err,
        };
        if let Some(hook) = &on_error {
            hook(&err);
        }
        let Some(fallback) = fallback else {
            return Err(err);
        };
        let rendered = fallback.into_node(err).render(&cx)?.resolve(&cx).await?;
        Ok(resolve_callbacks(rendered, Phase::Stringify, false, &cx)
            .await?
            .into_string())
    }
}
