//! The render runtime: one thread owning a suspense root and a local
//! executor. Pages arrive as `Send` builders and are built, walked and
//! streamed on that thread; output leaves as `RenderEvent`s.

use std::io;
use std::thread::{self, JoinHandle};
use std::sync::mpsc::Sender;

use bus::{ChannelSink, PageBuilder, RenderCommand, RenderEvent};
use core_types::RequestId;
use futures::StreamExt;
use futures::channel::mpsc::UnboundedReceiver;
use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;
use html::{RenderConfig, SuspenseRoot, render_to_stream};

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub render: RenderConfig,
    pub thread_name: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            render: RenderConfig::default(),
            thread_name: "rivulet-render".to_string(),
        }
    }
}

/// Spawn the render thread. It runs until every command sender is dropped
/// and the streams it started have closed.
///
/// A page whose synchronous walk fails is closed at once; its `Closed`
/// event is followed by a single `Error` event.
pub fn start_render_runtime(
    cmd_rx: UnboundedReceiver<RenderCommand>,
    evt_tx: Sender<RenderEvent>,
    config: RuntimeConfig,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(config.thread_name.clone())
        .spawn(move || run_runtime(cmd_rx, evt_tx, config))
}

fn run_runtime(
    mut cmd_rx: UnboundedReceiver<RenderCommand>,
    evt_tx: Sender<RenderEvent>,
    config: RuntimeConfig,
) {
    let mut pool = LocalPool::new();
    let spawner = pool.spawner();
    let root = SuspenseRoot::new();
    root.enable();

    pool.run_until(async {
        while let Some(cmd) = cmd_rx.next().await {
            match cmd {
                RenderCommand::Render { request_id, page } => {
                    start_request(&root, &spawner, &evt_tx, config.render, request_id, page);
                }
                RenderCommand::Cancel { request_id } => {
                    let found = root.cancel(request_id);
                    log::debug!(
                        target: "runtime.render",
                        "request {request_id}: cancel (active={found})"
                    );
                }
            }
        }
    });
    // Commands are gone; let in-flight streams finish.
    pool.run();
    log::debug!(target: "runtime.render", "runtime stopped; {} requests left", root.len());
}

fn start_request(
    root: &SuspenseRoot,
    spawner: &LocalSpawner,
    evt_tx: &Sender<RenderEvent>,
    render: RenderConfig,
    request_id: RequestId,
    page: PageBuilder,
) {
    log::debug!(target: "runtime.render", "request {request_id}: render");
    let sink = ChannelSink::new(request_id, evt_tx.clone());
    let stream = match render_to_stream(page(), root, render, Some(request_id), sink) {
        Ok(stream) => stream,
        Err(err) => {
            log::debug!(target: "runtime.render", "request {request_id}: rejected: {err}");
            let _ = evt_tx.send(RenderEvent::Error {
                request_id,
                error: err.to_string(),
            });
            return;
        }
    };
    if let Err(err) = spawner.spawn_local(stream.run()) {
        log::error!(target: "runtime.render", "request {request_id}: spawn failed: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_streams_with_bootstrap() {
        let config = RuntimeConfig::default();
        assert!(config.render.auto_script);
        assert_eq!(config.thread_name, "rivulet-render");
    }
}
