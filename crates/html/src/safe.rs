//! Already-escaped markup.
//!
//! Invariants:
//! - The text of a `SafeString` is never escaped again.
//! - Unescaped text is a `Node::Text`; it is escaped exactly once when it is
//!   merged into a buffer.
//! - Callbacks are kept in document order and travel with the text until a
//!   resolution phase consumes them.

use crate::callback::DeferredCallback;
use crate::escape::escape_to_buffer;
use std::fmt;
use std::ops::Range;

#[derive(Default)]
pub struct SafeString {
    text: String,
    callbacks: Vec<DeferredCallback>,
}

impl SafeString {
    /// Mark `text` as already escaped.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callbacks: Vec::new(),
        }
    }

    pub fn with_callbacks(text: impl Into<String>, callbacks: Vec<DeferredCallback>) -> Self {
        Self {
            text: text.into(),
            callbacks,
        }
    }

    /// Escape `text` once and mark the result safe.
    pub fn escaped(text: &str) -> Self {
        let mut out = String::with_capacity(text.len());
        escape_to_buffer(text, &mut out);
        Self::new(out)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn callbacks(&self) -> &[DeferredCallback] {
        &self.callbacks
    }

    pub fn has_callbacks(&self) -> bool {
        !self.callbacks.is_empty()
    }

    pub fn push_callback(&mut self, callback: DeferredCallback) {
        self.callbacks.push(callback);
    }

    /// Concatenate `other` after `self`, keeping callback order.
    pub fn append(&mut self, other: SafeString) {
        self.text.push_str(&other.text);
        self.callbacks.extend(other.callbacks);
    }

    pub(crate) fn text_mut(&mut self) -> &mut String {
        &mut self.text
    }

    pub(crate) fn replace_span(&mut self, span: Range<usize>, with: &str) {
        self.text.replace_range(span, with);
    }

    pub fn into_parts(self) -> (String, Vec<DeferredCallback>) {
        (self.text, self.callbacks)
    }

    /// Drop any callbacks and keep the text.
    pub fn into_string(self) -> String {
        self.text
    }
}

impl fmt::Debug for SafeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafeString")
            .field("text", &self.text)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl fmt::Display for SafeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl PartialEq<&str> for SafeString {
    fn eq(&self, other: &&str) -> bool {
        self.text == *other
    }
}
