//! Render failures.
//!
//! `Usage` and `Conflict` are raised synchronously while a tree is walked.
//! `ChildRender` is the settled failure of an asynchronous child or
//! component; it is recovered by a boundary's catch handler when one exists
//! and otherwise surfaces as a stream-level error.

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("usage error: {0}")]
    Usage(&'static str),
    #[error("<{tag}> can only set one of `children` or `bind:html`")]
    Conflict { tag: String },
    #[error("child render failed: {0}")]
    ChildRender(String),
}

impl RenderError {
    pub fn child(message: impl Into<String>) -> Self {
        RenderError::ChildRender(message.into())
    }
}

pub type RenderResult<T> = Result<T, RenderError>;
