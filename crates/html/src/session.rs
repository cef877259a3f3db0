//! Per-request streaming state.
//!
//! A render's synchronous output is cut into document slots: slot 0 is the
//! markup before the first pending value, slot `k + 1` is pending value `k`
//! plus the literal markup after it. Slots are written to the sink strictly
//! in order; a slot that is not yet written is "held".
//!
//! Settling a suspense boundary picks one encoding, uniformly:
//! 1. its placeholder is in a held slot (or in another parked patch): the
//!    placeholder is replaced in place and no client patch is needed;
//! 2. its placeholder has already been written: an out-of-band patch is
//!    written, preceded once per request by the bootstrap script;
//! 3. otherwise the patch is parked until its placeholder is written or a
//!    settling ancestor absorbs it.
//!
//! Invariants:
//! - `running` equals the number of boundaries that emitted a fallback and
//!   have not finished cleanup.
//! - The sink is closed exactly once, when the lead slot has been started,
//!   every slot is written, nothing is in flight and `running` is zero. The
//!   registry entry is removed at the same moment.
//! - Writes after the sink is closed or cancelled are dropped silently.

use crate::callback::{DeferredCallback, Phase, invoke_all, resolve_callbacks};
use crate::config::RenderConfig;
use crate::context::RenderContext;
use crate::error::RenderError;
use crate::patch::{BOOTSTRAP_SCRIPT, find_suspense_placeholder, placeholder_runs, suspense_patch};
use crate::registry::{SuspenseRoot, WeakRoot};
use crate::safe::SafeString;
use crate::sink::SinkHandle;
use core_types::{ChunkKind, RequestId, RunId};
use futures::FutureExt;
use futures::channel::mpsc::UnboundedSender;
use futures::future::LocalBoxFuture;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

pub(crate) type Task = LocalBoxFuture<'static, ()>;

enum Slot {
    /// The pending value has not settled; only the trailing literal is known.
    Waiting(SafeString),
    /// Taken by its task for `BeforeStream`.
    Working,
    Ready(SafeString),
    Flushed,
}

struct Parked {
    run: RunId,
    html: String,
}

struct SessionState {
    running: usize,
    sent: bool,
    next_run: RunId,
    in_flight: usize,
    started: bool,
    finished: bool,
    slots: Vec<Slot>,
    next_flush: usize,
    parked: Vec<Parked>,
    flushed_runs: HashSet<RunId>,
}

pub struct RequestSession {
    id: RequestId,
    config: RenderConfig,
    sink: RefCell<SinkHandle>,
    state: RefCell<SessionState>,
    root: WeakRoot,
    spawner: UnboundedSender<Task>,
}

impl RequestSession {
    pub(crate) fn new(
        id: RequestId,
        config: RenderConfig,
        sink: SinkHandle,
        root: WeakRoot,
        spawner: UnboundedSender<Task>,
    ) -> Self {
        Self {
            id,
            config,
            sink: RefCell::new(sink),
            state: RefCell::new(SessionState {
                running: 0,
                sent: false,
                next_run: 1,
                in_flight: 0,
                started: false,
                finished: false,
                slots: Vec::new(),
                next_flush: 0,
                parked: Vec::new(),
                flushed_runs: HashSet::new(),
            }),
            root,
            spawner,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn config(&self) -> RenderConfig {
        self.config
    }

    /// Suspense boundaries that emitted a fallback and have not finished.
    pub fn running(&self) -> usize {
        self.state.borrow().running
    }

    pub fn in_flight(&self) -> usize {
        self.state.borrow().in_flight
    }

    pub fn bootstrap_sent(&self) -> bool {
        self.state.borrow().sent
    }

    pub fn is_finished(&self) -> bool {
        self.state.borrow().finished
    }

    pub(crate) fn cancel(&self) {
        self.sink.borrow_mut().cancel();
    }

    /// Queue `task` on the request's driver; it counts as in flight until
    /// it completes.
    pub(crate) fn spawn(self: &Rc<Self>, task: impl Future<Output = ()> + 'static) {
        self.state.borrow_mut().in_flight += 1;
        let session = Rc::clone(self);
        let wrapped = async move {
            task.await;
            session.state.borrow_mut().in_flight -= 1;
            session.try_finish();
        }
        .boxed_local();
        if self.spawner.unbounded_send(wrapped).is_err() {
            log::warn!(target: "html.stream", "request {}: driver is gone, task dropped", self.id);
            self.state.borrow_mut().in_flight -= 1;
        }
    }

    pub(crate) fn begin_boundary(&self) -> RunId {
        let mut state = self.state.borrow_mut();
        let run = state.next_run;
        state.next_run += 1;
        state.running += 1;
        log::debug!(
            target: "html.suspense",
            "request {}: boundary {run} started; running={}",
            self.id,
            state.running
        );
        run
    }

    pub(crate) fn end_boundary(&self, run: RunId) {
        {
            let mut state = self.state.borrow_mut();
            state.running = state.running.saturating_sub(1);
            log::debug!(
                target: "html.suspense",
                "request {}: boundary {run} finished; running={}",
                self.id,
                state.running
            );
        }
        self.try_finish();
    }

    pub(crate) fn install_slots(&self, lead: SafeString, tails: Vec<SafeString>) {
        let mut state = self.state.borrow_mut();
        state.slots = std::iter::once(Slot::Ready(lead))
            .chain(tails.into_iter().map(Slot::Waiting))
            .collect();
    }

    /// Take a held slot's current content for processing.
    pub(crate) fn take_slot(&self, index: usize) -> SafeString {
        let mut state = self.state.borrow_mut();
        let Some(slot) = state.slots.get_mut(index) else {
            return SafeString::default();
        };
        match std::mem::replace(slot, Slot::Working) {
            Slot::Waiting(text) | Slot::Ready(text) => text,
            other => {
                *slot = other;
                SafeString::default()
            }
        }
    }

    pub(crate) fn fill_slot(
        self: &Rc<Self>,
        index: usize,
        mut content: SafeString,
        cx: &RenderContext,
    ) {
        self.absorb_parked(content.text_mut());
        if let Some(slot) = self.state.borrow_mut().slots.get_mut(index) {
            *slot = Slot::Ready(content);
        }
        self.flush(cx);
    }

    /// Allow slots to be written, starting with the lead.
    pub(crate) fn start(self: &Rc<Self>, cx: &RenderContext) {
        self.state.borrow_mut().started = true;
        self.flush(cx);
    }

    /// Run `BeforeStream` on a chunk about to leave; callbacks are kept for
    /// the `Stream` phase. On failure the chunk goes out as it was.
    pub(crate) async fn before_stream(
        &self,
        content: SafeString,
        cx: &RenderContext,
    ) -> SafeString {
        if !content.has_callbacks() {
            return content;
        }
        let fallback = content.as_str().to_string();
        match resolve_callbacks(content, Phase::BeforeStream, true, cx).await {
            Ok(content) => content,
            Err(err) => {
                self.report_error(&err);
                SafeString::new(fallback)
            }
        }
    }

    fn flush(self: &Rc<Self>, cx: &RenderContext) {
        loop {
            let piece = {
                let mut state = self.state.borrow_mut();
                let index = state.next_flush;
                if !state.started || index >= state.slots.len() {
                    break;
                }
                if !matches!(state.slots[index], Slot::Ready(_)) {
                    break;
                }
                state.next_flush += 1;
                match std::mem::replace(&mut state.slots[index], Slot::Flushed) {
                    Slot::Ready(piece) => piece,
                    _ => break,
                }
            };
            let (text, callbacks) = piece.into_parts();
            self.write(ChunkKind::Document, &text);
            self.invoke_stream(callbacks, cx);
        }
        self.try_finish();
    }

    /// Invoke `Stream` callbacks of a chunk that has been written; each
    /// continuation becomes an in-flight task writing a patch chunk.
    fn invoke_stream(self: &Rc<Self>, mut callbacks: Vec<DeferredCallback>, cx: &RenderContext) {
        if callbacks.is_empty() {
            return;
        }
        for next in invoke_all(&mut callbacks, Phase::Stream, None, cx) {
            let session = Rc::clone(self);
            let cx = cx.clone();
            self.spawn(async move {
                let piece = match next.await {
                    Ok(piece) => piece,
                    Err(err) => {
                        session.report_error(&err);
                        return;
                    }
                };
                let piece = session.before_stream(piece, &cx).await;
                let (text, callbacks) = piece.into_parts();
                session.write(ChunkKind::Patch, &text);
                session.invoke_stream(callbacks, &cx);
            });
        }
    }

    pub(crate) fn settle_boundary(&self, run: RunId, mut html: String) {
        self.absorb_parked(&mut html);
        {
            let mut state = self.state.borrow_mut();
            for slot in state.slots.iter_mut() {
                if let Slot::Waiting(text) | Slot::Ready(text) = slot
                    && let Some(span) = find_suspense_placeholder(text.as_str(), run)
                {
                    text.replace_span(span, &html);
                    log::debug!(target: "html.suspense", "request {}: boundary {run} inlined", self.id);
                    return;
                }
            }
            for parked in state.parked.iter_mut() {
                if let Some(span) = find_suspense_placeholder(&parked.html, run) {
                    parked.html.replace_range(span, &html);
                    return;
                }
            }
            if !state.flushed_runs.contains(&run) {
                log::debug!(target: "html.suspense", "request {}: boundary {run} parked", self.id);
                state.parked.push(Parked { run, html });
                return;
            }
        }
        self.write_patch(run, &html);
    }

    /// Move parked patches whose placeholder occurs in `text` into it.
    fn absorb_parked(&self, text: &mut String) {
        loop {
            let found = {
                let mut state = self.state.borrow_mut();
                let hit = state.parked.iter().enumerate().find_map(|(i, parked)| {
                    find_suspense_placeholder(text.as_str(), parked.run).map(|span| (i, span))
                });
                hit.map(|(i, span)| (state.parked.remove(i), span))
            };
            let Some((parked, span)) = found else {
                break;
            };
            text.replace_range(span, &parked.html);
        }
    }

    fn write_patch(&self, run: RunId, html: &str) {
        let bootstrap = {
            let mut state = self.state.borrow_mut();
            let first = self.config.auto_script && !state.sent;
            if first {
                state.sent = true;
            }
            first
        };
        if bootstrap {
            self.write(ChunkKind::Bootstrap, BOOTSTRAP_SCRIPT);
        }
        self.write(ChunkKind::Patch, &suspense_patch(run, html));
    }

    fn write(&self, kind: ChunkKind, text: &str) {
        self.sink.borrow_mut().write(text, kind);
        let runs = placeholder_runs(text);
        if runs.is_empty() {
            return;
        }
        self.state.borrow_mut().flushed_runs.extend(runs);
        self.release_parked();
    }

    fn release_parked(&self) {
        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                let flushed = &state.flushed_runs;
                let at = state.parked.iter().position(|p| flushed.contains(&p.run));
                at.map(|i| state.parked.remove(i))
            };
            let Some(parked) = next else {
                break;
            };
            self.write_patch(parked.run, &parked.html);
        }
    }

    pub(crate) fn report_error(&self, error: &RenderError) {
        let observed = self.sink.borrow_mut().report_error(error);
        if !observed {
            log::error!(
                target: "html.stream",
                "request {}: {error}; subtree dropped",
                self.id
            );
        }
    }

    fn try_finish(&self) {
        let orphans = {
            let mut state = self.state.borrow_mut();
            if state.finished
                || !state.started
                || state.running > 0
                || state.in_flight > 0
                || state.next_flush < state.slots.len()
            {
                return;
            }
            state.finished = true;
            std::mem::take(&mut state.parked)
        };
        for parked in orphans {
            log::warn!(
                target: "html.suspense",
                "request {}: boundary {} settled but its placeholder never left; dropped",
                self.id,
                parked.run
            );
        }
        self.sink.borrow_mut().close();
        SuspenseRoot::remove_from(&self.root, self.id);
        log::debug!(target: "html.stream", "request {} closed", self.id);
    }

    /// Close without writing anything further. The caller owns registry
    /// cleanup.
    pub(crate) fn abort(&self) {
        self.state.borrow_mut().finished = true;
        self.sink.borrow_mut().close();
        self.spawner.close_channel();
    }
}

impl fmt::Debug for RequestSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("RequestSession")
            .field("id", &self.id)
            .field("running", &state.running)
            .field("in_flight", &state.in_flight)
            .field("sent", &state.sent)
            .field("finished", &state.finished)
            .finish_non_exhaustive()
    }
}
