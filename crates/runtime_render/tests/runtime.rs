use std::sync::mpsc::Receiver;
use std::time::Duration;

use bus::{Bus, RenderCommand, RenderEvent, Response, ResponseCollector};
use core_types::{ChunkKind, RequestId};
use futures::channel::oneshot;
use html::{Element, Node, RenderError, Suspense};
use html_test_support::ClientDocument;
use runtime_render::{RuntimeConfig, start_render_runtime};

const WAIT: Duration = Duration::from_secs(5);

fn start() -> Bus {
    let (bus, cmd_rx) = Bus::new();
    start_render_runtime(cmd_rx, bus.evt_tx.clone(), RuntimeConfig::default())
        .expect("spawn render thread");
    bus
}

fn next_event(evt_rx: &Receiver<RenderEvent>) -> RenderEvent {
    evt_rx.recv_timeout(WAIT).expect("render event")
}

/// Pump events until `request_id` has received at least `chunks` chunks.
fn wait_for_chunks(
    evt_rx: &Receiver<RenderEvent>,
    collector: &mut ResponseCollector,
    request_id: RequestId,
    chunks: usize,
) {
    while collector.get(request_id).map_or(0, |r| r.chunks.len()) < chunks {
        collector.apply(next_event(evt_rx));
    }
}

fn wait_for_close(
    evt_rx: &Receiver<RenderEvent>,
    collector: &mut ResponseCollector,
    request_id: RequestId,
) -> Response {
    while !collector.is_closed(request_id) {
        collector.apply(next_event(evt_rx));
    }
    collector.take(request_id).expect("closed response")
}

/// A page whose single suspense boundary waits on the returned sender.
fn deferred_page(
    label: &'static str,
) -> (
    oneshot::Sender<String>,
    impl FnOnce() -> Node + Send + 'static,
) {
    let (tx, rx) = oneshot::channel::<String>();
    let page = move || -> Node {
        let body = Node::pending(async move {
            rx.await
                .map(Node::text)
                .map_err(|_| RenderError::child("sender dropped"))
        });
        Element::new("article")
            .attr("id", label)
            .child(Suspense::new().fallback("loading").child(body))
            .into()
    };
    (tx, page)
}

fn replayed(response: &Response) -> String {
    let doc = ClientDocument::replay(&response.chunks);
    assert!(doc.violations().is_empty(), "{:?}", doc.violations());
    doc.html().to_string()
}

#[test]
fn streams_a_page_across_the_thread_boundary() {
    let bus = start();
    let mut collector = ResponseCollector::new();
    let (tx, page) = deferred_page("a");
    bus.cmd_tx
        .unbounded_send(RenderCommand::render(1, page))
        .unwrap();

    wait_for_chunks(&bus.evt_rx, &mut collector, 1, 1);
    assert_eq!(
        collector.get(1).unwrap().body(),
        "<article id=\"a\"><div id=\"B:1\" data-sf>loading</div></article>"
    );

    tx.send("ready & done".to_string()).unwrap();
    let response = wait_for_close(&bus.evt_rx, &mut collector, 1);
    assert!(response.errors.is_empty());
    assert_eq!(
        response.chunks.iter().map(|(kind, _)| *kind).collect::<Vec<_>>(),
        vec![ChunkKind::Document, ChunkKind::Bootstrap, ChunkKind::Patch]
    );
    assert_eq!(
        replayed(&response),
        "<article id=\"a\">ready &amp; done</article>"
    );
}

#[test]
fn concurrent_requests_close_independently() {
    let bus = start();
    let mut collector = ResponseCollector::new();
    let (tx_a, page_a) = deferred_page("a");
    let (tx_b, page_b) = deferred_page("b");
    bus.cmd_tx.unbounded_send(RenderCommand::render(1, page_a)).unwrap();
    bus.cmd_tx.unbounded_send(RenderCommand::render(2, page_b)).unwrap();
    wait_for_chunks(&bus.evt_rx, &mut collector, 1, 1);
    wait_for_chunks(&bus.evt_rx, &mut collector, 2, 1);

    tx_b.send("second".to_string()).unwrap();
    let b = wait_for_close(&bus.evt_rx, &mut collector, 2);
    assert_eq!(replayed(&b), "<article id=\"b\">second</article>");
    assert!(!collector.is_closed(1));

    tx_a.send("first".to_string()).unwrap();
    let a = wait_for_close(&bus.evt_rx, &mut collector, 1);
    assert_eq!(replayed(&a), "<article id=\"a\">first</article>");
}

#[test]
fn cancel_drops_later_output() {
    let bus = start();
    let mut collector = ResponseCollector::new();
    let (tx, page) = deferred_page("c");
    bus.cmd_tx.unbounded_send(RenderCommand::render(7, page)).unwrap();
    wait_for_chunks(&bus.evt_rx, &mut collector, 7, 1);

    bus.cmd_tx
        .unbounded_send(RenderCommand::Cancel { request_id: 7 })
        .unwrap();
    // Commands are handled in order; settle after the cancel lands.
    bus.cmd_tx
        .unbounded_send(RenderCommand::render(8, || Node::text("marker")))
        .unwrap();
    wait_for_close(&bus.evt_rx, &mut collector, 8);
    tx.send("too late".to_string()).unwrap();

    let response = wait_for_close(&bus.evt_rx, &mut collector, 7);
    assert_eq!(response.chunks.len(), 1);
    assert!(response.chunks.iter().all(|(kind, _)| *kind == ChunkKind::Document));
}

#[test]
fn walk_failure_closes_then_reports() {
    let bus = start();
    bus.cmd_tx
        .unbounded_send(RenderCommand::render(3, || {
            Element::new("div")
                .attr("bind:html", "<b>raw</b>")
                .child("and children")
                .into()
        }))
        .unwrap();

    assert_eq!(next_event(&bus.evt_rx), RenderEvent::Closed { request_id: 3 });
    match next_event(&bus.evt_rx) {
        RenderEvent::Error { request_id, error } => {
            assert_eq!(request_id, 3);
            assert!(error.contains("<div>"), "{error}");
        }
        other => panic!("expected error event, got {other:?}"),
    }
}

#[test]
fn failing_boundary_reaches_the_host_as_an_error_event() {
    let bus = start();
    let mut collector = ResponseCollector::new();
    let (tx, page) = deferred_page("e");
    bus.cmd_tx.unbounded_send(RenderCommand::render(4, page)).unwrap();
    wait_for_chunks(&bus.evt_rx, &mut collector, 4, 1);
    drop(tx);

    let response = wait_for_close(&bus.evt_rx, &mut collector, 4);
    assert_eq!(response.errors, vec!["child render failed: sender dropped".to_string()]);
    assert_eq!(
        replayed(&response),
        "<article id=\"e\"><div id=\"B:1\" data-sf>loading</div></article>"
    );
}

#[test]
fn runtime_exits_after_senders_drop() {
    let (bus, cmd_rx) = Bus::new();
    let handle = start_render_runtime(
        cmd_rx,
        bus.evt_tx.clone(),
        RuntimeConfig {
            thread_name: "render-test".to_string(),
            ..RuntimeConfig::default()
        },
    )
    .unwrap();
    bus.cmd_tx
        .unbounded_send(RenderCommand::render(1, || Node::text("bye")))
        .unwrap();
    drop(bus.cmd_tx);
    handle.join().unwrap();

    let events: Vec<_> = bus.evt_rx.try_iter().collect();
    assert_eq!(events.last(), Some(&RenderEvent::Closed { request_id: 1 }));
}
