use core_types::{ChunkKind, RequestId};
use futures::channel::mpsc::{self as async_mpsc, UnboundedReceiver, UnboundedSender};
use html::{Node, OutputSink, RenderError};
use std::collections::HashMap;
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use tools::utf8::ChunkDecoder;

/// Builds a page on the render thread. Nodes are not `Send`; the builder is.
pub type PageBuilder = Box<dyn FnOnce() -> Node + Send>;

pub enum RenderCommand {
    Render {
        request_id: RequestId,
        page: PageBuilder,
    },
    Cancel {
        request_id: RequestId,
    },
}

impl RenderCommand {
    pub fn render(request_id: RequestId, page: impl FnOnce() -> Node + Send + 'static) -> Self {
        RenderCommand::Render {
            request_id,
            page: Box::new(page),
        }
    }
}

impl fmt::Debug for RenderCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderCommand::Render { request_id, .. } => f
                .debug_struct("Render")
                .field("request_id", request_id)
                .finish_non_exhaustive(),
            RenderCommand::Cancel { request_id } => f
                .debug_struct("Cancel")
                .field("request_id", request_id)
                .finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEvent {
    // Render runtime -> host
    Chunk {
        request_id: RequestId,
        kind: ChunkKind,
        bytes: Vec<u8>,
    },
    Error {
        request_id: RequestId,
        error: String,
    },
    Closed {
        request_id: RequestId,
    },
}

impl RenderEvent {
    pub fn request_id(&self) -> RequestId {
        match self {
            RenderEvent::Chunk { request_id, .. }
            | RenderEvent::Error { request_id, .. }
            | RenderEvent::Closed { request_id } => *request_id,
        }
    }
}

pub struct Bus {
    pub cmd_tx: UnboundedSender<RenderCommand>,
    pub evt_rx: Receiver<RenderEvent>,
    pub evt_tx: Sender<RenderEvent>, // shareable for runtimes
}

impl Bus {
    /// A bus plus the command receiver to hand to a runtime.
    pub fn new() -> (Self, UnboundedReceiver<RenderCommand>) {
        let (cmd_tx, cmd_rx) = async_mpsc::unbounded();
        let (evt_tx, evt_rx) = mpsc::channel();
        (
            Self {
                cmd_tx,
                evt_rx,
                evt_tx,
            },
            cmd_rx,
        )
    }
}

/// Forwards one request's chunks as `RenderEvent`s.
///
/// Once the receiving side hangs up the sink reports itself closed, so the
/// session stops producing output for it.
#[derive(Debug)]
pub struct ChannelSink {
    request_id: RequestId,
    evt_tx: Sender<RenderEvent>,
    disconnected: bool,
}

impl ChannelSink {
    pub fn new(request_id: RequestId, evt_tx: Sender<RenderEvent>) -> Self {
        Self {
            request_id,
            evt_tx,
            disconnected: false,
        }
    }

    fn send(&mut self, event: RenderEvent) -> bool {
        if self.disconnected {
            return false;
        }
        if self.evt_tx.send(event).is_err() {
            log::debug!(
                target: "runtime.render",
                "request {}: event receiver gone",
                self.request_id
            );
            self.disconnected = true;
            return false;
        }
        true
    }
}

impl OutputSink for ChannelSink {
    fn write_chunk(&mut self, chunk: &str, kind: ChunkKind) {
        let request_id = self.request_id;
        self.send(RenderEvent::Chunk {
            request_id,
            kind,
            bytes: chunk.as_bytes().to_vec(),
        });
    }

    fn report_error(&mut self, error: &RenderError) -> bool {
        let request_id = self.request_id;
        self.send(RenderEvent::Error {
            request_id,
            error: error.to_string(),
        })
    }

    fn close(&mut self) {
        let request_id = self.request_id;
        self.send(RenderEvent::Closed { request_id });
    }

    fn is_closed(&self) -> bool {
        self.disconnected
    }
}

/// What a host has received for one request.
#[derive(Debug, Default)]
pub struct Response {
    pub chunks: Vec<(ChunkKind, String)>,
    pub errors: Vec<String>,
    pub closed: bool,
    decoder: ChunkDecoder,
}

impl Response {
    /// Concatenation of every chunk in arrival order.
    pub fn body(&self) -> String {
        self.chunks.iter().map(|(_, text)| text.as_str()).collect()
    }
}

/// Reassembles per-request text from `RenderEvent`s.
///
/// Chunk bytes may be split anywhere (a transport is free to re-chunk), so
/// each request keeps its own incremental decoder.
#[derive(Debug, Default)]
pub struct ResponseCollector {
    responses: HashMap<RequestId, Response>,
}

impl ResponseCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the event closed its request.
    pub fn apply(&mut self, event: RenderEvent) -> bool {
        let response = self.responses.entry(event.request_id()).or_default();
        match event {
            RenderEvent::Chunk { kind, bytes, .. } => {
                let mut text = String::new();
                response.decoder.push(&mut text, &bytes);
                if !text.is_empty() {
                    response.chunks.push((kind, text));
                }
                false
            }
            RenderEvent::Error { error, .. } => {
                response.errors.push(error);
                false
            }
            RenderEvent::Closed { .. } => {
                let mut tail = String::new();
                response.decoder.finish(&mut tail);
                if !tail.is_empty() {
                    response.chunks.push((ChunkKind::Document, tail));
                }
                response.closed = true;
                true
            }
        }
    }

    pub fn get(&self, request_id: RequestId) -> Option<&Response> {
        self.responses.get(&request_id)
    }

    pub fn take(&mut self, request_id: RequestId) -> Option<Response> {
        self.responses.remove(&request_id)
    }

    pub fn is_closed(&self, request_id: RequestId) -> bool {
        self.get(request_id).is_some_and(|response| response.closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sink_forwards_chunks_errors_and_close() {
        let (tx, rx) = mpsc::channel();
        let mut sink = ChannelSink::new(9, tx);
        sink.write_chunk("<p>", ChunkKind::Document);
        assert!(sink.report_error(&RenderError::child("boom")));
        sink.close();

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                RenderEvent::Chunk {
                    request_id: 9,
                    kind: ChunkKind::Document,
                    bytes: b"<p>".to_vec(),
                },
                RenderEvent::Error {
                    request_id: 9,
                    error: "child render failed: boom".to_string(),
                },
                RenderEvent::Closed { request_id: 9 },
            ]
        );
    }

    #[test]
    fn channel_sink_reports_closed_after_hangup() {
        let (tx, rx) = mpsc::channel();
        let mut sink = ChannelSink::new(1, tx);
        drop(rx);
        assert!(!sink.is_closed());
        sink.write_chunk("x", ChunkKind::Document);
        assert!(sink.is_closed());
        assert!(!sink.report_error(&RenderError::child("late")));
    }

    #[test]
    fn collector_decodes_split_chunks_per_request() {
        let mut collector = ResponseCollector::new();
        let text = "héllo";
        let bytes = text.as_bytes();
        // Split inside the two-byte 'é'.
        collector.apply(RenderEvent::Chunk {
            request_id: 1,
            kind: ChunkKind::Document,
            bytes: bytes[..2].to_vec(),
        });
        collector.apply(RenderEvent::Chunk {
            request_id: 2,
            kind: ChunkKind::Document,
            bytes: b"other".to_vec(),
        });
        collector.apply(RenderEvent::Chunk {
            request_id: 1,
            kind: ChunkKind::Document,
            bytes: bytes[2..].to_vec(),
        });
        assert!(collector.apply(RenderEvent::Closed { request_id: 1 }));

        assert_eq!(collector.get(1).unwrap().body(), text);
        assert_eq!(collector.get(2).unwrap().body(), "other");
        assert!(collector.is_closed(1));
        assert!(!collector.is_closed(2));
    }

    #[test]
    fn commands_debug_without_page() {
        let cmd = RenderCommand::render(4, || Node::text("x"));
        assert_eq!(format!("{cmd:?}"), "Render { request_id: 4, .. }");
    }
}
