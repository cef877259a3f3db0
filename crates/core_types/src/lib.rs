/// Per-request identifier supplied by the host (one per streamed response).
pub type RequestId = u64;

/// Per-request, monotonically increasing id of a suspense boundary instance.
///
/// Starts at 1 so that 0 can mean "no boundary has run yet".
pub type RunId = u32;

/// Per-render index of an error boundary placeholder.
pub type BoundaryIndex = u32;

/// What a chunk written to an output sink carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkKind {
    /// Document markup in source order.
    Document,
    /// The one-time client bootstrap script.
    Bootstrap,
    /// An out-of-band `<template>` + `<script>` patch.
    Patch,
}
