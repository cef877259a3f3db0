//! Output sinks.
//!
//! The session owns exactly one `SinkHandle` per request. The handle tracks
//! closure itself, so writes after close (or after the consumer went away)
//! are dropped silently and `close` reaches the sink at most once.

use crate::error::RenderError;
use core_types::ChunkKind;
use std::cell::RefCell;
use std::rc::Rc;

pub trait OutputSink {
    fn write_chunk(&mut self, chunk: &str, kind: ChunkKind);

    /// Deliver a stream-level error. Returns false when nobody observes
    /// errors on this sink; the caller then logs and drops the error.
    fn report_error(&mut self, _error: &RenderError) -> bool {
        false
    }

    fn close(&mut self);

    /// True once the consumer has gone away.
    fn is_closed(&self) -> bool {
        false
    }
}

pub struct SinkHandle {
    inner: Box<dyn OutputSink>,
    cancelled: bool,
    closed: bool,
}

impl SinkHandle {
    pub fn new(inner: Box<dyn OutputSink>) -> Self {
        Self {
            inner,
            cancelled: false,
            closed: false,
        }
    }

    pub fn is_writable(&self) -> bool {
        !self.closed && !self.cancelled && !self.inner.is_closed()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Stop delivering chunks; `close` still reaches the sink.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Returns false when the chunk was dropped.
    pub fn write(&mut self, chunk: &str, kind: ChunkKind) -> bool {
        if !self.is_writable() {
            log::trace!(target: "html.stream", "dropped {kind:?} chunk ({} bytes)", chunk.len());
            return false;
        }
        if chunk.is_empty() {
            return true;
        }
        log::trace!(target: "html.stream", "write {kind:?} chunk ({} bytes)", chunk.len());
        self.inner.write_chunk(chunk, kind);
        true
    }

    pub fn report_error(&mut self, error: &RenderError) -> bool {
        if !self.is_writable() {
            return false;
        }
        self.inner.report_error(error)
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.inner.close();
    }
}

/// Everything a `RecordingSink` has seen.
#[derive(Clone, Debug, Default)]
pub struct SinkRecord {
    pub chunks: Vec<(ChunkKind, String)>,
    pub errors: Vec<RenderError>,
    pub close_count: usize,
    pub externally_closed: bool,
}

impl SinkRecord {
    /// All chunks in write order.
    pub fn concat(&self) -> String {
        self.chunks.iter().map(|(_, text)| text.as_str()).collect()
    }

    /// Only the in-order document chunks.
    pub fn document(&self) -> String {
        self.chunks
            .iter()
            .filter(|(kind, _)| *kind == ChunkKind::Document)
            .map(|(_, text)| text.as_str())
            .collect()
    }

    pub fn count(&self, kind: ChunkKind) -> usize {
        self.chunks.iter().filter(|(k, _)| *k == kind).count()
    }
}

/// In-memory sink; clones share one record.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    record: Rc<RefCell<SinkRecord>>,
    observe_errors: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observing_errors() -> Self {
        Self {
            record: Rc::default(),
            observe_errors: true,
        }
    }

    pub fn record(&self) -> SinkRecord {
        self.record.borrow().clone()
    }

    /// Simulate the consumer disconnecting.
    pub fn close_externally(&self) {
        self.record.borrow_mut().externally_closed = true;
    }
}

impl OutputSink for RecordingSink {
    fn write_chunk(&mut self, chunk: &str, kind: ChunkKind) {
        self.record
            .borrow_mut()
            .chunks
            .push((kind, chunk.to_string()));
    }

    fn report_error(&mut self, error: &RenderError) -> bool {
        if !self.observe_errors {
            return false;
        }
        self.record.borrow_mut().errors.push(error.clone());
        true
    }

    fn close(&mut self) {
        self.record.borrow_mut().close_count += 1;
    }

    fn is_closed(&self) -> bool {
        self.record.borrow().externally_closed
    }
}
