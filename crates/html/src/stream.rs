//! Whole-document and streaming serialization entry points.

use crate::callback::{Phase, resolve_callbacks};
use crate::config::RenderConfig;
use crate::context::RenderContext;
use crate::error::{RenderError, RenderResult};
use crate::node::{Node, PendingNode};
use crate::registry::SuspenseRoot;
use crate::safe::SafeString;
use crate::session::{RequestSession, Task};
use crate::sink::{OutputSink, SinkHandle};
use core_types::RequestId;
use futures::StreamExt;
use futures::channel::mpsc::{self, UnboundedReceiver};
use futures::future::poll_fn;
use futures::stream::FuturesUnordered;
use std::fmt;
use std::rc::Rc;
use std::task::Poll;

/// Render `node` to one fully inlined string.
///
/// Pending values are awaited and `Stringify` callbacks resolved in place.
/// Suspense boundaries need a streaming render and fail with
/// `RenderError::Usage` here.
pub async fn render_to_string(node: Node, cx: &RenderContext) -> RenderResult<SafeString> {
    let buf = node.render(cx)?;
    let content = buf.resolve(cx).await?;
    resolve_callbacks(content, Phase::Stringify, false, cx).await
}

/// Start streaming `node` to `sink` for one request.
///
/// The tree is walked synchronously here; a synchronous failure closes the
/// sink, removes the request from `root` and is returned. Nothing is written
/// until `StreamRender::run` drives the render.
pub fn render_to_stream(
    node: Node,
    root: &SuspenseRoot,
    config: RenderConfig,
    request_id: Option<RequestId>,
    sink: impl OutputSink + 'static,
) -> RenderResult<StreamRender> {
    root.enable();
    let id = request_id.unwrap_or_else(|| root.next_request_id());
    let (spawner, receiver) = mpsc::unbounded();
    let session = Rc::new(RequestSession::new(
        id,
        config,
        SinkHandle::new(Box::new(sink)),
        root.downgrade(),
        spawner,
    ));
    if !root.insert(id, Rc::clone(&session)) {
        session.abort();
        return Err(RenderError::Usage("request id is already streaming"));
    }

    let cx = RenderContext::for_request(root, Rc::clone(&session), config);
    let buf = match node.render(&cx) {
        Ok(buf) => buf,
        Err(err) => {
            log::debug!(target: "html.stream", "request {id}: walk failed: {err}");
            root.remove(id);
            session.abort();
            return Err(err);
        }
    };

    let (lead, segments) = buf.into_slots();
    let mut tails = Vec::with_capacity(segments.len());
    let mut pending = Vec::with_capacity(segments.len());
    for (value, tail) in segments {
        pending.push(value);
        tails.push(tail);
    }
    log::debug!(
        target: "html.stream",
        "request {id}: walk complete; segments={} running={}",
        pending.len(),
        session.running()
    );
    session.install_slots(lead, tails);
    for (i, value) in pending.into_iter().enumerate() {
        session.spawn(run_segment(Rc::clone(&session), i + 1, value, cx.clone()));
    }
    session.spawn(run_lead(Rc::clone(&session), cx));

    Ok(StreamRender { session, receiver })
}

/// A streaming render that has been walked but not yet driven.
pub struct StreamRender {
    session: Rc<RequestSession>,
    receiver: UnboundedReceiver<Task>,
}

impl StreamRender {
    pub fn request_id(&self) -> RequestId {
        self.session.id()
    }

    pub fn session(&self) -> &Rc<RequestSession> {
        &self.session
    }

    /// Drive every task of the request until the sink is closed.
    pub async fn run(self) {
        let StreamRender {
            session,
            mut receiver,
        } = self;
        let mut tasks: FuturesUnordered<Task> = FuturesUnordered::new();

        poll_fn(|task_cx| {
            loop {
                let mut queued = false;
                while let Ok(task) = receiver.try_recv() {
                    tasks.push(task);
                    queued = true;
                }
                match tasks.poll_next_unpin(task_cx) {
                    Poll::Ready(Some(())) => continue,
                    Poll::Ready(None) if queued => continue,
                    Poll::Ready(None) => {
                        // Tasks only spawn while being polled; an empty set
                        // with an empty queue is final.
                        if let Ok(task) = receiver.try_recv() {
                            tasks.push(task);
                            continue;
                        }
                        return Poll::Ready(());
                    }
                    Poll::Pending => {
                        if let Ok(task) = receiver.try_recv() {
                            tasks.push(task);
                            continue;
                        }
                        return Poll::Pending;
                    }
                }
            }
        })
        .await;

        if !session.is_finished() {
            log::warn!(
                target: "html.stream",
                "request {}: driver idle before completion; closing",
                session.id()
            );
            session.abort();
        }
    }
}

impl fmt::Debug for StreamRender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRender")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

async fn run_lead(session: Rc<RequestSession>, cx: RenderContext) {
    // Let work that is already settled land in the lead before it leaves.
    yield_now().await;
    let lead = session.take_slot(0);
    let lead = session.before_stream(lead, &cx).await;
    session.fill_slot(0, lead, &cx);
    session.start(&cx);
}

async fn run_segment(
    session: Rc<RequestSession>,
    index: usize,
    value: PendingNode,
    cx: RenderContext,
) {
    let settled = async {
        let node = value.into_future().await?;
        node.render(&cx)?.resolve(&cx).await
    }
    .await;
    let mut content = match settled {
        Ok(content) => content,
        Err(err) => {
            session.report_error(&err);
            SafeString::default()
        }
    };
    content.append(session.take_slot(index));
    let content = session.before_stream(content, &cx).await;
    session.fill_slot(index, content, &cx);
}

async fn yield_now() {
    let mut yielded = false;
    poll_fn(move |task_cx| {
        if yielded {
            return Poll::Ready(());
        }
        yielded = true;
        task_cx.waker().wake_by_ref();
        Poll::Pending
    })
    .await
}
