//! Connection manager behaviour against a scripted transport.
//!
//! Every test runs on a paused clock, so backoff delays elapse instantly
//! and can be measured exactly.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mira_common::error::TransportError;
use mira_common::types::{ConnectionState, ContainerEvent};
use mira_events::pipeline::NotificationPipeline;
use mira_events::sink::{DeliverySink, Notification};
use mira_stream::backoff::Backoff;
use mira_stream::manager::{ConnectionManager, Timeouts};
use mira_stream::transport::{Transport, TransportSession};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

type FrameResult = Result<Option<String>, TransportError>;

enum Attempt {
    Refuse,
    Accept {
        frames: mpsc::UnboundedReceiver<FrameResult>,
        answers_pings: bool,
    },
}

#[derive(Default)]
struct ScriptState {
    attempts: VecDeque<Attempt>,
    connects: usize,
    live: usize,
    max_live: usize,
    pings: usize,
}

/// Transport whose connect outcomes are queued up front. Once the queue is
/// empty, connect attempts hang forever.
#[derive(Clone, Default)]
struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    fn refuse(&self) {
        self.state.lock().unwrap().attempts.push_back(Attempt::Refuse);
    }

    fn accept(&self) -> mpsc::UnboundedSender<FrameResult> {
        self.accept_with(false)
    }

    /// Accepts a session whose peer answers every ping.
    fn accept_responsive(&self) -> mpsc::UnboundedSender<FrameResult> {
        self.accept_with(true)
    }

    fn accept_with(&self, answers_pings: bool) -> mpsc::UnboundedSender<FrameResult> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state
            .lock()
            .unwrap()
            .attempts
            .push_back(Attempt::Accept {
                frames: rx,
                answers_pings,
            });
        tx
    }

    fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    fn live(&self) -> usize {
        self.state.lock().unwrap().live
    }

    fn max_live(&self) -> usize {
        self.state.lock().unwrap().max_live
    }

    fn pings(&self) -> usize {
        self.state.lock().unwrap().pings
    }

    fn take_attempt(&self) -> Option<Attempt> {
        let mut state = self.state.lock().unwrap();
        state.connects += 1;
        let attempt = state.attempts.pop_front();
        if matches!(attempt, Some(Attempt::Accept { .. })) {
            state.live += 1;
            state.max_live = state.max_live.max(state.live);
        }
        attempt
    }
}

struct ScriptedSession {
    frames: mpsc::UnboundedReceiver<FrameResult>,
    state: Arc<Mutex<ScriptState>>,
    open: bool,
    answers_pings: bool,
    last_seen: Instant,
}

impl Transport for ScriptedTransport {
    type Session = ScriptedSession;

    async fn connect(&self, url: &str) -> Result<ScriptedSession, TransportError> {
        match self.take_attempt() {
            Some(Attempt::Accept {
                frames,
                answers_pings,
            }) => Ok(ScriptedSession {
                frames,
                state: Arc::clone(&self.state),
                open: true,
                answers_pings,
                last_seen: Instant::now(),
            }),
            Some(Attempt::Refuse) => Err(TransportError::Connect {
                url: url.to_string(),
                message: "connection refused".to_string(),
            }),
            None => std::future::pending().await,
        }
    }
}

impl TransportSession for ScriptedSession {
    async fn next_frame(&mut self) -> FrameResult {
        loop {
            let frame = self.frames.recv().await.unwrap_or(Ok(None));
            if matches!(frame, Ok(Some(_))) {
                self.last_seen = Instant::now();
            }
            match frame {
                Ok(Some(text)) if text == PONG => {}
                other => return other,
            }
        }
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.state.lock().unwrap().pings += 1;
        if self.answers_pings {
            self.last_seen = Instant::now();
        }
        Ok(())
    }

    fn last_seen(&self) -> Instant {
        self.last_seen
    }

    async fn close(&mut self) {
        if self.open {
            self.open = false;
            self.state.lock().unwrap().live -= 1;
        }
    }
}

/// Control traffic the session consumes itself, like a WebSocket pong.
const PONG: &str = "\u{0}pong";

const URL: &str = "ws://backend.test/api/v1/events/stream";

fn frame(id: &str, kind: &str, status: &str) -> String {
    format!(
        r#"{{"type":"{kind}","id":"{id}","name":"","image":"nginx","status":"{status}","time":"2024-01-01T00:00:00Z"}}"#
    )
}

fn no_jitter() -> f64 {
    0.0
}

/// Connect timeout long enough to stay out of the way, keepalive off.
fn relaxed() -> Timeouts {
    Timeouts::new(Duration::from_secs(10), None)
}

fn backoff(base_ms: u64) -> Backoff {
    Backoff::new(
        Duration::from_millis(base_ms),
        Duration::from_secs(30),
        0.2,
    )
    .with_jitter_source(no_jitter)
}

type EventManager =
    ConnectionManager<ScriptedTransport, Box<dyn FnMut(ContainerEvent) + Send>>;

fn scripted_manager(
    transport: &ScriptedTransport,
    base_ms: u64,
) -> (EventManager, mpsc::UnboundedReceiver<ContainerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler: Box<dyn FnMut(ContainerEvent) + Send> = Box::new(move |event| {
        let _ = tx.send(event);
    });
    let manager = ConnectionManager::new(transport.clone(), URL, handler)
        .with_backoff(backoff(base_ms))
        .with_timeouts(relaxed());
    (manager, rx)
}

async fn wait_for(rx: &mut watch::Receiver<ConnectionState>, state: ConnectionState) {
    let _ = rx
        .wait_for(|current| *current == state)
        .await
        .expect("manager dropped");
}

#[tokio::test(start_paused = true)]
async fn new_manager_is_idle() {
    let transport = ScriptedTransport::default();
    let (manager, _events) = scripted_manager(&transport, 100);
    assert_eq!(manager.state(), ConnectionState::Idle);
    assert!(!manager.is_running());
    assert_eq!(manager.url(), URL);
}

#[tokio::test(start_paused = true)]
async fn delivers_decoded_events_in_order() {
    let transport = ScriptedTransport::default();
    let frames = transport.accept();
    let (mut manager, mut events) = scripted_manager(&transport, 100);
    let mut states = manager.subscribe();

    manager.start();
    wait_for(&mut states, ConnectionState::Open).await;

    frames.send(Ok(Some(frame("c1", "created", "created")))).unwrap();
    frames.send(Ok(Some(frame("c1", "status_change", "running")))).unwrap();
    frames.send(Ok(Some(frame("c2", "removed", "removed")))).unwrap();

    let ids: Vec<_> = [
        events.recv().await.unwrap(),
        events.recv().await.unwrap(),
        events.recv().await.unwrap(),
    ]
    .iter()
    .map(|e| (e.container_id.to_string(), e.kind.wire_name()))
    .collect();
    assert_eq!(
        ids,
        vec![
            ("c1".to_string(), "created"),
            ("c1".to_string(), "status_change"),
            ("c2".to_string(), "removed"),
        ]
    );

    manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn malformed_frame_is_dropped_and_connection_stays_open() {
    let transport = ScriptedTransport::default();
    let frames = transport.accept();
    let (mut manager, mut events) = scripted_manager(&transport, 100);
    let mut states = manager.subscribe();

    manager.start();
    wait_for(&mut states, ConnectionState::Open).await;

    frames.send(Ok(Some("{not json".to_string()))).unwrap();
    frames
        .send(Ok(Some(r#"{"type":"exploded","id":"c1","status":"x","time":"2024-01-01T00:00:00Z"}"#.to_string())))
        .unwrap();
    frames.send(Ok(Some(frame("c1", "created", "created")))).unwrap();

    let event = events.recv().await.unwrap();
    assert_eq!(event.container_id.as_str(), "c1");
    assert_eq!(manager.state(), ConnectionState::Open);
    assert_eq!(transport.connects(), 1);

    manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn abrupt_close_fails_then_reconnects_after_base_delay() {
    let transport = ScriptedTransport::default();
    let first = transport.accept();
    let second = transport.accept();
    let (mut manager, mut events) = scripted_manager(&transport, 500);
    let mut states = manager.subscribe();

    manager.start();
    wait_for(&mut states, ConnectionState::Open).await;

    first
        .send(Err(TransportError::AbruptClose {
            message: "reset by peer".to_string(),
        }))
        .unwrap();
    wait_for(&mut states, ConnectionState::Failed).await;
    let failed_at = Instant::now();

    wait_for(&mut states, ConnectionState::Open).await;
    let waited = failed_at.elapsed();
    assert!(waited >= Duration::from_millis(500), "waited {waited:?}");
    assert!(waited < Duration::from_millis(1_000), "waited {waited:?}");
    assert_eq!(transport.connects(), 2);

    second.send(Ok(Some(frame("c1", "created", "created")))).unwrap();
    assert_eq!(events.recv().await.unwrap().container_id.as_str(), "c1");

    manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn graceful_close_reports_closed_and_reconnects() {
    let transport = ScriptedTransport::default();
    let first = transport.accept();
    let _second = transport.accept();
    let (mut manager, _events) = scripted_manager(&transport, 100);
    let mut states = manager.subscribe();

    manager.start();
    wait_for(&mut states, ConnectionState::Open).await;

    first.send(Ok(None)).unwrap();
    wait_for(&mut states, ConnectionState::Closed).await;
    wait_for(&mut states, ConnectionState::Open).await;
    assert_eq!(transport.connects(), 2);

    manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failed_connects_back_off_and_reset_after_open() {
    let transport = ScriptedTransport::default();
    transport.refuse();
    transport.refuse();
    let first = transport.accept();
    let _second = transport.accept();
    let (mut manager, _events) = scripted_manager(&transport, 100);
    let mut states = manager.subscribe();

    let started = Instant::now();
    manager.start();
    wait_for(&mut states, ConnectionState::Open).await;
    // 100ms after the first refusal, 200ms after the second.
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(300), "waited {waited:?}");
    assert!(waited < Duration::from_millis(700), "waited {waited:?}");
    assert_eq!(transport.connects(), 3);

    first
        .send(Err(TransportError::AbruptClose {
            message: "gone".to_string(),
        }))
        .unwrap();
    wait_for(&mut states, ConnectionState::Failed).await;
    let failed_at = Instant::now();
    wait_for(&mut states, ConnectionState::Open).await;
    let waited = failed_at.elapsed();
    assert!(waited >= Duration::from_millis(100), "waited {waited:?}");
    assert!(waited < Duration::from_millis(200), "waited {waited:?}");

    manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_discards_queued_frames() {
    let transport = ScriptedTransport::default();
    let frames = transport.accept();
    let (mut manager, mut events) = scripted_manager(&transport, 100);
    let mut states = manager.subscribe();

    manager.start();
    wait_for(&mut states, ConnectionState::Open).await;

    for id in ["c1", "c2", "c3"] {
        frames.send(Ok(Some(frame(id, "created", "created")))).unwrap();
    }
    manager.stop().await;

    assert!(events.try_recv().is_err());
    assert_eq!(manager.state(), ConnectionState::Closed);
    assert!(!manager.is_running());
    assert_eq!(transport.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn stop_during_backoff_cancels_the_reconnect() {
    let transport = ScriptedTransport::default();
    transport.refuse();
    let (mut manager, _events) = scripted_manager(&transport, 1_000);
    let mut states = manager.subscribe();

    manager.start();
    wait_for(&mut states, ConnectionState::Failed).await;
    manager.stop().await;

    tokio::time::advance(Duration::from_secs(3_600)).await;
    assert_eq!(transport.connects(), 1);
    assert_eq!(manager.state(), ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn start_is_idempotent() {
    let transport = ScriptedTransport::default();
    let _frames = transport.accept();
    let (mut manager, _events) = scripted_manager(&transport, 100);
    let mut states = manager.subscribe();

    manager.start();
    manager.start();
    wait_for(&mut states, ConnectionState::Open).await;
    manager.start();
    tokio::task::yield_now().await;

    assert_eq!(transport.connects(), 1);
    assert_eq!(transport.live(), 1);
    manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn start_after_stop_begins_a_fresh_lifecycle() {
    let transport = ScriptedTransport::default();
    let _first = transport.accept();
    let second = transport.accept();
    let (mut manager, mut events) = scripted_manager(&transport, 100);
    let mut states = manager.subscribe();

    manager.start();
    wait_for(&mut states, ConnectionState::Open).await;
    manager.stop().await;
    assert_eq!(manager.state(), ConnectionState::Closed);

    manager.start();
    wait_for(&mut states, ConnectionState::Open).await;
    second.send(Ok(Some(frame("c7", "removed", "removed")))).unwrap();
    assert_eq!(events.recv().await.unwrap().container_id.as_str(), "c7");
    assert_eq!(transport.connects(), 2);

    manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn at_most_one_session_is_live() {
    let transport = ScriptedTransport::default();
    let senders: Vec<_> = (0..4).map(|_| transport.accept()).collect();
    let (mut manager, _events) = scripted_manager(&transport, 50);
    let mut states = manager.subscribe();

    manager.start();
    for sender in &senders[..3] {
        wait_for(&mut states, ConnectionState::Open).await;
        sender
            .send(Err(TransportError::Protocol {
                message: "bad frame header".to_string(),
            }))
            .unwrap();
        wait_for(&mut states, ConnectionState::Failed).await;
    }
    wait_for(&mut states, ConnectionState::Open).await;

    assert_eq!(transport.connects(), 4);
    assert_eq!(transport.max_live(), 1);
    manager.stop().await;
    assert_eq!(transport.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn hung_connect_times_out_and_retries() {
    // Nothing scripted: every connect attempt hangs.
    let transport = ScriptedTransport::default();
    let (manager, _events) = scripted_manager(&transport, 100);
    let mut manager = manager.with_timeouts(Timeouts::new(Duration::from_secs(5), None));
    let mut states = manager.subscribe();

    let started = Instant::now();
    manager.start();
    wait_for(&mut states, ConnectionState::Failed).await;
    assert_eq!(started.elapsed(), Duration::from_secs(5));
    assert_eq!(transport.connects(), 1);

    // 100ms backoff, then a second attempt that also times out.
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(transport.connects() >= 2, "connects: {}", transport.connects());

    manager.stop().await;
    assert_eq!(manager.state(), ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn silent_session_is_pinged_then_dropped() {
    let transport = ScriptedTransport::default();
    let _silent = transport.accept();
    let _next = transport.accept();
    let (manager, _events) = scripted_manager(&transport, 100);
    let keepalive = Duration::from_secs(15);
    let mut manager =
        manager.with_timeouts(Timeouts::new(Duration::from_secs(10), Some(keepalive)));
    let mut states = manager.subscribe();

    manager.start();
    wait_for(&mut states, ConnectionState::Open).await;
    let opened = Instant::now();

    wait_for(&mut states, ConnectionState::Failed).await;
    assert_eq!(opened.elapsed(), keepalive * 2);
    assert_eq!(transport.pings(), 1);

    wait_for(&mut states, ConnectionState::Open).await;
    assert_eq!(transport.connects(), 2);
    assert_eq!(transport.max_live(), 1);

    manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn answered_pings_keep_an_idle_session_open() {
    let transport = ScriptedTransport::default();
    let _frames = transport.accept_responsive();
    let (manager, _events) = scripted_manager(&transport, 100);
    let mut manager = manager.with_timeouts(Timeouts::new(
        Duration::from_secs(10),
        Some(Duration::from_secs(15)),
    ));
    let mut states = manager.subscribe();

    manager.start();
    wait_for(&mut states, ConnectionState::Open).await;
    tokio::time::sleep(Duration::from_secs(100)).await;

    assert_eq!(manager.state(), ConnectionState::Open);
    assert_eq!(transport.connects(), 1);
    assert!(transport.pings() >= 5, "pings: {}", transport.pings());

    manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn late_pong_keeps_the_session_open() {
    let transport = ScriptedTransport::default();
    let frames = transport.accept();
    let (manager, _events) = scripted_manager(&transport, 100);
    let mut manager = manager.with_timeouts(Timeouts::new(
        Duration::from_secs(10),
        Some(Duration::from_secs(15)),
    ));
    let mut states = manager.subscribe();

    manager.start();
    wait_for(&mut states, ConnectionState::Open).await;

    // Ping at 15s, pong at 20s: no failure at 30s, next ping at 35s.
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(transport.pings(), 1);
    frames.send(Ok(Some(PONG.to_string()))).unwrap();

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(manager.state(), ConnectionState::Open);
    assert_eq!(transport.pings(), 1);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(transport.pings(), 2);
    assert_eq!(transport.connects(), 1);

    manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn steady_traffic_needs_no_pings() {
    let transport = ScriptedTransport::default();
    let frames = transport.accept();
    let (manager, mut events) = scripted_manager(&transport, 100);
    let mut manager = manager.with_timeouts(Timeouts::new(
        Duration::from_secs(10),
        Some(Duration::from_secs(15)),
    ));
    let mut states = manager.subscribe();

    manager.start();
    wait_for(&mut states, ConnectionState::Open).await;
    for n in 0..6 {
        tokio::time::sleep(Duration::from_secs(10)).await;
        frames
            .send(Ok(Some(frame(&format!("c{n}"), "created", "created"))))
            .unwrap();
        let _ = events.recv().await.unwrap();
    }

    assert_eq!(manager.state(), ConnectionState::Open);
    assert_eq!(transport.pings(), 0);
    manager.stop().await;
}

#[derive(Clone, Default)]
struct ChannelSink {
    delivered: Arc<Mutex<Vec<String>>>,
    notify: Option<mpsc::UnboundedSender<String>>,
}

impl DeliverySink for ChannelSink {
    fn deliver(&mut self, notification: &Notification) {
        self.delivered.lock().unwrap().push(notification.text.clone());
        if let Some(notify) = &self.notify {
            let _ = notify.send(notification.text.clone());
        }
    }
}

#[tokio::test(start_paused = true)]
async fn pipeline_announces_each_logical_event_once() {
    let transport = ScriptedTransport::default();
    let frames = transport.accept();
    let (notify, mut announced) = mpsc::unbounded_channel();
    let sink = ChannelSink {
        delivered: Arc::default(),
        notify: Some(notify),
    };
    let mut manager = ConnectionManager::new(
        transport.clone(),
        URL,
        NotificationPipeline::new(sink),
    )
    .with_backoff(backoff(100))
    .with_timeouts(relaxed());
    let mut states = manager.subscribe();

    manager.start();
    wait_for(&mut states, ConnectionState::Open).await;

    let running = frame("abc123456789", "status_change", "running");
    frames.send(Ok(Some(running.clone()))).unwrap();
    frames.send(Ok(Some(running))).unwrap();
    frames
        .send(Ok(Some(frame("abc123456789", "status_change", "exited"))))
        .unwrap();

    assert_eq!(
        announced.recv().await.unwrap(),
        "Container abc123456789 is now running."
    );
    assert_eq!(
        announced.recv().await.unwrap(),
        "Container abc123456789 has stopped."
    );
    let delivered = manager.with_handler(|pipeline| pipeline.sink().delivered.lock().unwrap().len());
    assert_eq!(delivered, 2);

    manager.stop().await;
}
