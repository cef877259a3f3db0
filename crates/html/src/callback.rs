//! Deferred callbacks and the phases that resolve them.
//!
//! A callback rides on a `SafeString` and is invoked at one of three phases:
//! - `Stringify`: a whole-document render; a buffer holding the document is
//!   supplied and the callback may rewrite spans of it in place.
//! - `BeforeStream`: once per streamed chunk, right before it leaves for the
//!   sink, with that chunk as the buffer.
//! - `Stream`: after the chunk carrying the callback has been written; no
//!   buffer, so any content must be delivered out of band.
//!
//! Invariants:
//! - A phase drains completely: every `Continue` is awaited, its content is
//!   appended to the buffer in callback order, and the callbacks it carries
//!   are invoked in the same phase until a round produces no more work.
//! - In-buffer rewrites locate their target by marker text, never by offset,
//!   so output does not depend on which continuation settles first.

use crate::context::RenderContext;
use crate::error::RenderResult;
use crate::safe::SafeString;
use futures::FutureExt;
use futures::future::{LocalBoxFuture, try_join_all};
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::ops::Range;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Stringify,
    BeforeStream,
    Stream,
}

/// What a callback asks the resolver to do next.
pub enum Continuation {
    /// Nothing further at this phase.
    Done,
    /// Await more content; it may carry further callbacks.
    Continue(LocalBoxFuture<'static, RenderResult<SafeString>>),
}

impl Continuation {
    pub fn later(future: impl Future<Output = RenderResult<SafeString>> + 'static) -> Self {
        Continuation::Continue(future.boxed_local())
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Continuation::Done => f.write_str("Done"),
            Continuation::Continue(_) => f.write_str("Continue(..)"),
        }
    }
}

/// Markup that has not left the process yet, shared with callbacks so they
/// can rewrite it after their own work settles.
#[derive(Clone, Debug, Default)]
pub struct OutputBuffer(Rc<RefCell<String>>);

impl OutputBuffer {
    pub fn new(text: String) -> Self {
        Self(Rc::new(RefCell::new(text)))
    }

    pub fn push_str(&self, text: &str) {
        self.0.borrow_mut().push_str(text);
    }

    pub fn contents(&self) -> String {
        self.0.borrow().clone()
    }

    /// Replace the span located by `locate` with `with`.
    ///
    /// Returns false, leaving the buffer untouched, when nothing was found.
    pub fn replace_span(
        &self,
        locate: impl FnOnce(&str) -> Option<Range<usize>>,
        with: &str,
    ) -> bool {
        let mut text = self.0.borrow_mut();
        let Some(span) = locate(&text) else {
            return false;
        };
        text.replace_range(span, with);
        true
    }

    fn take(&self) -> String {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

pub struct CallbackArgs<'a> {
    pub phase: Phase,
    pub buffer: Option<&'a OutputBuffer>,
    pub context: &'a RenderContext,
}

/// A callback invoked at later pipeline phases.
///
/// It may be invoked more than once (for example `Done` at `BeforeStream`,
/// then `Continue` at `Stream`).
pub struct DeferredCallback {
    f: Box<dyn FnMut(CallbackArgs<'_>) -> Continuation>,
}

impl DeferredCallback {
    pub fn new(f: impl FnMut(CallbackArgs<'_>) -> Continuation + 'static) -> Self {
        Self { f: Box::new(f) }
    }

    pub fn invoke(&mut self, args: CallbackArgs<'_>) -> Continuation {
        (self.f)(args)
    }
}

impl fmt::Debug for DeferredCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeferredCallback")
    }
}

pub(crate) fn invoke_all(
    callbacks: &mut [DeferredCallback],
    phase: Phase,
    buffer: Option<&OutputBuffer>,
    context: &RenderContext,
) -> Vec<LocalBoxFuture<'static, RenderResult<SafeString>>> {
    callbacks
        .iter_mut()
        .filter_map(|callback| {
            match callback.invoke(CallbackArgs {
                phase,
                buffer,
                context,
            }) {
                Continuation::Done => None,
                Continuation::Continue(next) => Some(next),
            }
        })
        .collect()
}

/// Run `content`'s callbacks at `phase` until no more work is produced.
///
/// With `preserve`, the top-level callbacks are handed back on the result
/// so a later phase can invoke them again; callbacks produced during this
/// phase are consumed by it.
pub async fn resolve_callbacks(
    content: SafeString,
    phase: Phase,
    preserve: bool,
    cx: &RenderContext,
) -> RenderResult<SafeString> {
    let (text, mut callbacks) = content.into_parts();
    if callbacks.is_empty() {
        return Ok(SafeString::new(text));
    }

    let buffer = OutputBuffer::new(text);
    let mut round = invoke_all(&mut callbacks, phase, Some(&buffer), cx);
    while !round.is_empty() {
        let settled = try_join_all(round).await?;
        round = Vec::new();
        for piece in settled {
            let (text, mut nested) = piece.into_parts();
            buffer.push_str(&text);
            round.extend(invoke_all(&mut nested, phase, Some(&buffer), cx));
        }
    }

    let text = buffer.take();
    if preserve {
        Ok(SafeString::with_callbacks(text, callbacks))
    } else {
        Ok(SafeString::new(text))
    }
}
