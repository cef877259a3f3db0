use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use bus::{Bus, RenderCommand, RenderEvent};
use core_types::RequestId;
use futures::channel::oneshot;
use html::{Element, ErrorBoundary, Node, RenderError, Suspense};
use mimalloc::MiMalloc;
use runtime_render::{RuntimeConfig, start_render_runtime};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const REQUEST: RequestId = 1;

/// A value that shows up after `delay`, produced on a helper thread.
fn later(delay: Duration, text: &'static str) -> oneshot::Receiver<String> {
    let (tx, rx) = oneshot::channel();
    thread::spawn(move || {
        thread::sleep(delay);
        let _ = tx.send(text.to_string());
    });
    rx
}

fn awaited(rx: oneshot::Receiver<String>) -> Node {
    Node::pending(async move {
        let text = rx
            .await
            .map_err(|_| RenderError::child("producer went away"))?;
        Ok(Element::new("p").child(text).into())
    })
}

fn page(
    profile: oneshot::Receiver<String>,
    feed: oneshot::Receiver<String>,
    ads: oneshot::Receiver<String>,
) -> Node {
    Element::new("html")
        .child(Element::new("head").child(Element::new("title").child("rivulet demo")))
        .child(
            Element::new("body")
                .child(Element::new("h1").child("Streaming <demo>"))
                .child(
                    Suspense::new()
                        .fallback(Element::new("p").child("loading profile…"))
                        .child(awaited(profile))
                        .child(
                            Suspense::new()
                                .fallback(Element::new("p").child("loading feed…"))
                                .child(awaited(feed)),
                        ),
                )
                .child(
                    ErrorBoundary::new()
                        .child(Node::pending(async move {
                            let _ = ads.await;
                            Err::<Node, _>(RenderError::child("ad server unavailable"))
                        }))
                        .fallback(Element::new("aside").child("no ads today")),
                ),
        )
        .into()
}

fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (bus, cmd_rx) = Bus::new();
    let runtime = start_render_runtime(cmd_rx, bus.evt_tx.clone(), RuntimeConfig::default())?;

    let profile = later(Duration::from_millis(300), "Ada, since 1815");
    let feed = later(Duration::from_millis(100), "3 new posts");
    let ads = later(Duration::from_millis(200), "");
    if bus
        .cmd_tx
        .unbounded_send(RenderCommand::render(REQUEST, move || page(profile, feed, ads)))
        .is_err()
    {
        log::error!("render runtime is not accepting commands");
        return Ok(());
    }

    let mut stdout = io::stdout().lock();
    while let Ok(event) = bus.evt_rx.recv() {
        match event {
            RenderEvent::Chunk { kind, bytes, .. } => {
                log::debug!("{kind:?} chunk, {} bytes", bytes.len());
                stdout.write_all(&bytes)?;
                stdout.write_all(b"\n")?;
                stdout.flush()?;
            }
            RenderEvent::Error { request_id, error } => {
                log::error!("request {request_id}: {error}");
            }
            RenderEvent::Closed { request_id } => {
                log::info!("request {request_id} complete");
                break;
            }
        }
    }

    drop(bus.cmd_tx);
    if runtime.join().is_err() {
        log::error!("render runtime panicked");
    }
    Ok(())
}
