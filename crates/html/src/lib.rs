//! Streaming, suspense-aware HTML serialization.
//!
//! A `Node` tree is serialized into a `StringBuffer`, which keeps literal
//! markup interleaved with pending values. `render_to_string` awaits
//! everything and inlines it; `render_to_stream` writes ready markup
//! immediately and delivers suspense boundaries as they settle.

pub mod attr;
pub mod buffer;
pub mod callback;
pub mod config;
pub mod context;
pub mod error;
pub mod error_boundary;
pub mod escape;
pub mod node;
pub mod patch;
pub mod registry;
pub mod safe;
pub mod session;
pub mod sink;
pub mod stream;
pub mod suspense;
pub mod template;

pub use crate::attr::AttrValue;
pub use crate::buffer::StringBuffer;
pub use crate::callback::{
    CallbackArgs, Continuation, DeferredCallback, OutputBuffer, Phase, resolve_callbacks,
};
pub use crate::config::RenderConfig;
pub use crate::context::RenderContext;
pub use crate::error::{RenderError, RenderResult};
pub use crate::error_boundary::ErrorBoundary;
pub use crate::escape::{escape_html, escape_to_buffer};
pub use crate::node::{Component, Element, Node, PendingNode, Props};
pub use crate::registry::SuspenseRoot;
pub use crate::safe::SafeString;
pub use crate::session::RequestSession;
pub use crate::sink::{OutputSink, RecordingSink, SinkHandle, SinkRecord};
pub use crate::stream::{StreamRender, render_to_stream, render_to_string};
pub use crate::suspense::Suspense;
pub use crate::template::html;
pub use core_types::{BoundaryIndex, ChunkKind, RequestId, RunId};
