use std::sync::{Arc, Mutex};
use std::time::Duration;

use durable_ws::core::{
    Command, ConnectionController, ConnectionState, DisconnectReason, ErrorKind, EventKind,
    FixedAddress, OriginResolver, SendCallbacks, SendOptions, SendOutcome, SessionConfig,
    SessionEvent, TransportEvent, WebSocketError, listener,
};
use durable_ws::testing::{MockConnector, VirtualTimers, deliver};

type Controller = ConnectionController<MockConnector, VirtualTimers>;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn config() -> SessionConfig {
    SessionConfig::default().with_url("ws://session.test/ws")
}

fn harness(config: SessionConfig) -> (Controller, MockConnector) {
    let connector = MockConnector::new();
    let controller = ConnectionController::new(config, connector.clone(), VirtualTimers::new());
    (controller, connector)
}

fn record(controller: &mut Controller) -> Arc<Mutex<Vec<SessionEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let recorder = listener(move |event| sink.lock().expect("lock").push(event.clone()));
    for kind in EventKind::ALL {
        controller.on(kind, recorder.clone());
    }
    events
}

fn open(controller: &mut Controller) {
    controller.connect().expect("connect");
    deliver(controller, TransportEvent::Opened);
    assert_eq!(controller.state(), ConnectionState::Connected);
}

fn of_kind(events: &Arc<Mutex<Vec<SessionEvent>>>, kind: EventKind) -> Vec<SessionEvent> {
    events
        .lock()
        .expect("lock")
        .iter()
        .filter(|event| event.kind() == kind)
        .cloned()
        .collect()
}

fn transitions(events: &Arc<Mutex<Vec<SessionEvent>>>) -> Vec<(ConnectionState, ConnectionState)> {
    of_kind(events, EventKind::StateChange)
        .into_iter()
        .map(|event| match event {
            SessionEvent::StateChange {
                previous, current, ..
            } => (previous, current),
            other => panic!("expected state change, got {other:?}"),
        })
        .collect()
}

fn errors(events: &Arc<Mutex<Vec<SessionEvent>>>) -> Vec<(ErrorKind, Option<DisconnectReason>)> {
    of_kind(events, EventKind::Error)
        .into_iter()
        .map(|event| match event {
            SessionEvent::Error { kind, reason, .. } => (kind, reason),
            other => panic!("expected error, got {other:?}"),
        })
        .collect()
}

fn disconnect_reasons(events: &Arc<Mutex<Vec<SessionEvent>>>) -> Vec<(DisconnectReason, u16)> {
    of_kind(events, EventKind::Disconnected)
        .into_iter()
        .map(|event| match event {
            SessionEvent::Disconnected { reason, code, .. } => (reason, code),
            other => panic!("expected disconnected, got {other:?}"),
        })
        .collect()
}

fn recording_callbacks(
    label: &str,
    log: &Arc<Mutex<Vec<String>>>,
) -> SendCallbacks {
    let ok_log = log.clone();
    let err_log = log.clone();
    let ok_label = label.to_string();
    let err_label = label.to_string();
    SendCallbacks::new()
        .on_success(move || ok_log.lock().expect("lock").push(format!("{ok_label}:ok")))
        .on_error(move |err| {
            let tag = match err {
                WebSocketError::QueueOverflow => "overflow".to_string(),
                WebSocketError::QueueCleared => "cleared".to_string(),
                WebSocketError::NotQueued(_) => "not_queued".to_string(),
                other => format!("error({other})"),
            };
            err_log.lock().expect("lock").push(format!("{err_label}:{tag}"));
        })
}

#[test]
fn three_failed_opens_schedule_100_200_400_then_exhaust() {
    let (mut controller, connector) = harness(
        config().with_reconnect(3, ms(100), ms(1_000), 2.0),
    );
    let events = record(&mut controller);
    connector.refuse_next_opens(4);

    assert!(controller.connect().is_err());
    controller.advance(ms(100));
    controller.advance(ms(200));
    controller.advance(ms(400));

    let delays: Vec<Duration> = of_kind(&events, EventKind::ReconnectAttempt)
        .into_iter()
        .map(|event| match event {
            SessionEvent::ReconnectAttempt {
                delay,
                max_attempts,
                ..
            } => {
                assert_eq!(max_attempts, 3);
                delay
            }
            other => panic!("expected reconnect attempt, got {other:?}"),
        })
        .collect();
    assert_eq!(delays, vec![ms(100), ms(200), ms(400)]);

    let errs = errors(&events);
    assert_eq!(
        errs.last(),
        Some(&(
            ErrorKind::ReconnectExhausted,
            Some(DisconnectReason::MaxRetriesExceeded)
        ))
    );
    assert_eq!(
        errs.iter()
            .filter(|(kind, _)| *kind == ErrorKind::ConnectFailure)
            .count(),
        4
    );
    assert_eq!(controller.state(), ConnectionState::Closed);
    assert_eq!(controller.timers().pending(), 0);
    assert_eq!(controller.metrics().reconnect_attempts, 3);

    // A manual connect starts a fresh cycle.
    controller.connect().expect("connect after exhaustion");
    assert_eq!(controller.reconnect_attempts(), 0);
    assert_eq!(controller.metrics().reconnect_attempts, 0);
    deliver(&mut controller, TransportEvent::Opened);
    assert!(controller.is_connected());
}

#[test]
fn successful_reconnect_resets_attempts_and_counts_success() {
    let (mut controller, connector) = harness(config());
    let events = record(&mut controller);
    open(&mut controller);

    deliver(
        &mut controller,
        TransportEvent::Closed {
            code: 1006,
            reason: String::new(),
        },
    );
    assert_eq!(controller.state(), ConnectionState::Reconnecting);
    assert_eq!(controller.reconnect_attempts(), 1);
    assert_eq!(controller.metrics().current_reconnect_delay, ms(1_000));

    controller.advance(ms(999));
    assert_eq!(connector.open_count(), 1);
    controller.advance(ms(1));
    assert_eq!(connector.open_count(), 2);
    assert_eq!(controller.state(), ConnectionState::Connecting);

    deliver(&mut controller, TransportEvent::Opened);
    let connected = of_kind(&events, EventKind::Connected);
    assert!(matches!(
        connected.last(),
        Some(SessionEvent::Connected { attempts: 1, .. })
    ));
    assert_eq!(controller.reconnect_attempts(), 0);
    let metrics = controller.metrics();
    assert_eq!(metrics.successful_reconnects, 1);
    assert_eq!(metrics.reconnect_attempts, 0);
    assert_eq!(metrics.current_reconnect_delay, Duration::ZERO);
    assert_eq!(
        disconnect_reasons(&events),
        vec![(DisconnectReason::NetworkError, 1006)]
    );
}

#[test]
fn state_changes_are_ordered_and_never_skip_connecting() {
    let (mut controller, _connector) = harness(config().with_auto_reconnect(false));
    let events = record(&mut controller);
    open(&mut controller);
    controller.connect().expect("connect is a no-op while connected");

    deliver(
        &mut controller,
        TransportEvent::Closed {
            code: 1000,
            reason: "bye".to_string(),
        },
    );

    assert_eq!(
        transitions(&events),
        vec![
            (ConnectionState::Closed, ConnectionState::Connecting),
            (ConnectionState::Connecting, ConnectionState::Connected),
            (ConnectionState::Connected, ConnectionState::Closed),
        ]
    );
    assert_eq!(
        disconnect_reasons(&events),
        vec![(DisconnectReason::ServerClosed, 1000)]
    );
    assert_eq!(controller.timers().pending(), 0);
}

#[test]
fn close_codes_classify_disconnect_reason() {
    for (code, expected) in [
        (1006, DisconnectReason::NetworkError),
        (1011, DisconnectReason::NetworkError),
        (1001, DisconnectReason::ServerClosed),
        (4003, DisconnectReason::ServerClosed),
        (1008, DisconnectReason::Unknown),
    ] {
        let (mut controller, _connector) = harness(config().with_auto_reconnect(false));
        let events = record(&mut controller);
        open(&mut controller);
        deliver(
            &mut controller,
            TransportEvent::Closed {
                code,
                reason: String::new(),
            },
        );
        assert_eq!(disconnect_reasons(&events), vec![(expected, code)]);
    }
}

#[test]
fn queue_at_capacity_drops_oldest_with_overflow_error() {
    let (mut controller, connector) = harness(config().with_max_queue_size(2));
    let events = record(&mut controller);
    let log = Arc::new(Mutex::new(Vec::new()));

    for name in ["A", "B", "C"] {
        let outcome = controller.send(
            Command::bare(name),
            SendOptions::default().with_callbacks(recording_callbacks(name, &log)),
        );
        assert_eq!(outcome, SendOutcome::Queued);
    }

    assert_eq!(controller.queue_len(), 2);
    assert_eq!(*log.lock().expect("lock"), vec!["A:overflow"]);
    assert_eq!(errors(&events), vec![(ErrorKind::QueueOverflow, None)]);
    assert_eq!(controller.metrics().queue_size, 2);

    open(&mut controller);
    assert_eq!(
        connector.sent(),
        vec![r#"{"type":"B"}"#.to_string(), r#"{"type":"C"}"#.to_string()]
    );
    assert_eq!(*log.lock().expect("lock"), vec!["A:overflow", "B:ok", "C:ok"]);
    assert_eq!(controller.queue_len(), 0);
    assert_eq!(of_kind(&events, EventKind::MessageSent).len(), 2);
}

#[test]
fn send_while_closed_is_queued_then_flushed_in_order() {
    let (mut controller, connector) = harness(config());
    let events = record(&mut controller);

    let first = controller.send(
        Command::custom(sonic_rs::json!({"n": 1})),
        SendOptions::default(),
    );
    let second = controller.send(
        Command::custom(sonic_rs::json!({"n": 2})),
        SendOptions::default(),
    );
    assert!(first.is_queued() && !first.is_success());
    assert!(second.is_queued());
    assert_eq!(controller.queue_len(), 2);
    assert!(connector.sent().is_empty());

    open(&mut controller);
    assert_eq!(
        connector.sent(),
        vec![
            r#"{"type":"custom","data":{"n":1}}"#.to_string(),
            r#"{"type":"custom","data":{"n":2}}"#.to_string(),
        ]
    );
    assert_eq!(controller.metrics().messages_sent, 2);

    // Connected precedes the flushed sends.
    let kinds: Vec<EventKind> = events
        .lock()
        .expect("lock")
        .iter()
        .map(SessionEvent::kind)
        .filter(|kind| matches!(kind, EventKind::Connected | EventKind::MessageSent))
        .collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::Connected,
            EventKind::MessageSent,
            EventKind::MessageSent
        ]
    );
}

#[test]
fn send_without_queueing_is_rejected_synchronously() {
    let (mut controller, _connector) = harness(config());
    let log = Arc::new(Mutex::new(Vec::new()));

    let outcome = controller.send(
        Command::bare("PING_APP"),
        SendOptions::no_queue().with_callbacks(recording_callbacks("X", &log)),
    );
    assert!(matches!(outcome, SendOutcome::Rejected { .. }));
    assert_eq!(*log.lock().expect("lock"), vec!["X:not_queued"]);
    assert_eq!(controller.queue_len(), 0);

    let (mut zero, _connector) = harness(config().with_max_queue_size(0));
    let outcome = zero.send(
        Command::bare("A"),
        SendOptions::default().with_callbacks(recording_callbacks("Z", &log)),
    );
    assert!(matches!(outcome, SendOutcome::Rejected { .. }));
    assert_eq!(log.lock().expect("lock").last().map(String::as_str), Some("Z:not_queued"));
}

#[test]
fn send_while_connected_transmits_and_emits_message_sent() {
    let (mut controller, connector) = harness(config());
    let events = record(&mut controller);
    open(&mut controller);

    let command = Command::new("JOIN", sonic_rs::json!({"room": "lobby"}));
    assert_eq!(
        controller.send(command.clone(), SendOptions::default()),
        SendOutcome::Sent
    );

    match of_kind(&events, EventKind::MessageSent).as_slice() {
        [SessionEvent::MessageSent {
            command: sent,
            serialized,
            ..
        }] => {
            assert_eq!(sent, &command);
            assert_eq!(serialized, r#"{"type":"JOIN","data":{"room":"lobby"}}"#);
        }
        other => panic!("expected one message_sent, got {other:?}"),
    }
    assert_eq!(connector.sent().len(), 1);
    assert_eq!(controller.metrics().messages_sent, 1);
}

#[test]
fn transmit_failure_while_connected_is_reported() {
    let (mut controller, connector) = harness(config());
    let events = record(&mut controller);
    let log = Arc::new(Mutex::new(Vec::new()));
    open(&mut controller);
    connector.fail_sends(true);

    let outcome = controller.send(
        Command::bare("A"),
        SendOptions::default().with_callbacks(recording_callbacks("A", &log)),
    );
    assert!(matches!(outcome, SendOutcome::Rejected { .. }));
    assert_eq!(errors(&events), vec![(ErrorKind::SendFailure, None)]);
    assert_eq!(controller.metrics().errors, 1);
    assert_eq!(log.lock().expect("lock").len(), 1);
    assert!(log.lock().expect("lock")[0].starts_with("A:error("));
}

// Queued messages get a single retry on flush; failures are reported, not re-queued.
#[test]
fn flush_failures_are_not_requeued() {
    let (mut controller, connector) = harness(config());
    let log = Arc::new(Mutex::new(Vec::new()));
    for name in ["A", "B"] {
        controller.send(
            Command::bare(name),
            SendOptions::default().with_callbacks(recording_callbacks(name, &log)),
        );
    }
    connector.fail_sends(true);
    open(&mut controller);

    assert_eq!(controller.queue_len(), 0);
    let log = log.lock().expect("lock");
    assert_eq!(log.len(), 2);
    assert!(log[0].starts_with("A:error("));
    assert!(log[1].starts_with("B:error("));
}

#[test]
fn unanswered_heartbeat_closes_with_timeout() {
    let (mut controller, connector) =
        harness(config().with_heartbeat(ms(100), ms(50)));
    let events = record(&mut controller);
    open(&mut controller);
    let first = connector.last_connection().expect("connection");

    controller.advance(ms(100));
    assert_eq!(connector.sent(), vec![r#"{"type":"PING","timestamp":100}"#]);

    controller.advance(ms(50));
    assert_eq!(
        errors(&events),
        vec![(ErrorKind::HeartbeatTimeout, Some(DisconnectReason::Timeout))]
    );
    assert_eq!(
        disconnect_reasons(&events),
        vec![(DisconnectReason::Timeout, 4000)]
    );
    let closed = connector.closed();
    assert_eq!(closed.len(), 1);
    assert_eq!((closed[0].0, closed[0].1), (first, 4000));
    assert_eq!(controller.state(), ConnectionState::Reconnecting);

    // A late close from the dead socket changes nothing.
    controller.handle_transport_event(
        first,
        TransportEvent::Closed {
            code: 1006,
            reason: String::new(),
        },
    );
    assert_eq!(disconnect_reasons(&events).len(), 1);
    assert_eq!(controller.state(), ConnectionState::Reconnecting);
}

#[test]
fn heartbeat_ack_records_latency_and_is_not_surfaced() {
    let (mut controller, connector) =
        harness(config().with_heartbeat(ms(100), ms(50)));
    let events = record(&mut controller);
    open(&mut controller);

    controller.advance(ms(100));
    controller.advance(ms(30));
    deliver(
        &mut controller,
        TransportEvent::Frame(r#"{"type":"PONG","timestamp":100}"#.to_string()),
    );
    controller.advance(ms(50));

    assert!(controller.is_connected());
    assert!(errors(&events).is_empty());
    assert!(of_kind(&events, EventKind::Message).is_empty());
    let metrics = controller.metrics();
    assert_eq!(metrics.last_latency, Some(ms(30)));
    assert_eq!(metrics.average_latency, Some(ms(30)));
    assert_eq!(metrics.messages_received, 0);

    // Next tick probes again.
    controller.advance(ms(20));
    assert_eq!(connector.sent().len(), 2);
}

#[test]
fn failed_probe_skips_the_timeout() {
    let (mut controller, connector) =
        harness(config().with_heartbeat(ms(100), ms(50)));
    let events = record(&mut controller);
    open(&mut controller);
    connector.fail_sends(true);

    controller.advance(ms(400));
    assert!(controller.is_connected());
    assert!(errors(&events).is_empty());
}

#[test]
fn heartbeat_disabled_by_default() {
    let (mut controller, connector) = harness(config());
    open(&mut controller);
    assert_eq!(controller.timers().pending(), 0);
    controller.advance(ms(60_000));
    assert!(connector.sent().is_empty());
    assert!(controller.is_connected());
}

#[test]
fn connect_timeout_closes_and_ignores_late_open() {
    let (mut controller, connector) =
        harness(config().with_connect_timeout(ms(500)));
    let events = record(&mut controller);
    controller.connect().expect("connect");
    let first = connector.last_connection().expect("connection");

    controller.advance(ms(500));
    assert_eq!(
        errors(&events),
        vec![(ErrorKind::ConnectTimeout, Some(DisconnectReason::Timeout))]
    );
    assert_eq!(
        disconnect_reasons(&events),
        vec![(DisconnectReason::Timeout, 4000)]
    );
    assert_eq!(connector.closed()[0].1, 4000);

    controller.handle_transport_event(first, TransportEvent::Opened);
    assert_eq!(controller.state(), ConnectionState::Reconnecting);
    assert!(of_kind(&events, EventKind::Connected).is_empty());
}

#[test]
fn manual_disconnect_never_reconnects() {
    let (mut controller, connector) = harness(config().with_heartbeat(ms(100), ms(50)));
    let events = record(&mut controller);
    open(&mut controller);

    controller.disconnect();
    assert_eq!(controller.state(), ConnectionState::Closed);
    assert_eq!(
        disconnect_reasons(&events),
        vec![(DisconnectReason::Manual, 1000)]
    );
    assert_eq!(connector.closed()[0].1, 1000);
    assert_eq!(controller.timers().pending(), 0);

    controller.advance(ms(120_000));
    assert_eq!(connector.open_count(), 1);
    assert!(of_kind(&events, EventKind::ReconnectAttempt).is_empty());
}

#[test]
fn disconnect_during_backoff_cancels_retry() {
    let (mut controller, connector) = harness(config());
    let events = record(&mut controller);
    open(&mut controller);
    deliver(
        &mut controller,
        TransportEvent::Closed {
            code: 1006,
            reason: String::new(),
        },
    );
    assert_eq!(controller.state(), ConnectionState::Reconnecting);

    controller.disconnect();
    assert_eq!(controller.state(), ConnectionState::Closed);
    assert_eq!(controller.timers().pending(), 0);
    controller.advance(ms(60_000));
    assert_eq!(connector.open_count(), 1);
    assert_eq!(disconnect_reasons(&events).len(), 1);
}

#[test]
fn connect_during_backoff_opens_immediately() {
    let (mut controller, connector) = harness(config());
    open(&mut controller);
    deliver(
        &mut controller,
        TransportEvent::Closed {
            code: 1006,
            reason: String::new(),
        },
    );

    controller.connect().expect("connect");
    assert_eq!(connector.open_count(), 2);
    assert_eq!(controller.state(), ConnectionState::Connecting);
    // Only the connect timeout remains armed.
    assert_eq!(controller.timers().pending(), 1);
}

#[test]
fn inbound_frames_surface_messages_and_parse_failures() {
    let (mut controller, _connector) = harness(config());
    let events = record(&mut controller);
    open(&mut controller);

    deliver(
        &mut controller,
        TransportEvent::Frame(r#"{"type":"CHAT","text":"hi"}"#.to_string()),
    );
    deliver(&mut controller, TransportEvent::Frame("not json".to_string()));

    match of_kind(&events, EventKind::Message).as_slice() {
        [SessionEvent::Message { data, raw, .. }] => {
            assert_eq!(raw, r#"{"type":"CHAT","text":"hi"}"#);
            assert_eq!(data, &sonic_rs::json!({"type": "CHAT", "text": "hi"}));
        }
        other => panic!("expected one message, got {other:?}"),
    }
    assert_eq!(errors(&events), vec![(ErrorKind::ParseFailure, None)]);
    let metrics = controller.metrics();
    assert_eq!(metrics.messages_received, 1);
    assert_eq!(metrics.errors, 1);
    assert!(controller.is_connected());
}

#[test]
fn auth_flag_is_orthogonal_and_only_emits_on_change() {
    let (mut controller, _connector) = harness(config().with_auto_reconnect(false));
    let events = record(&mut controller);
    open(&mut controller);

    controller.set_authenticated(true);
    controller.set_authenticated(true);
    assert_eq!(of_kind(&events, EventKind::AuthChange).len(), 1);

    deliver(
        &mut controller,
        TransportEvent::Closed {
            code: 1001,
            reason: String::new(),
        },
    );
    assert!(matches!(
        of_kind(&events, EventKind::Disconnected).as_slice(),
        [SessionEvent::Disconnected {
            was_authenticated: true,
            ..
        }]
    ));
    assert!(controller.is_authenticated());

    controller.set_authenticated(false);
    assert_eq!(of_kind(&events, EventKind::AuthChange).len(), 2);
}

#[test]
fn destroy_is_terminal() {
    let (mut controller, connector) = harness(config());
    let events = record(&mut controller);
    let log = Arc::new(Mutex::new(Vec::new()));
    controller.send(
        Command::bare("A"),
        SendOptions::default().with_callbacks(recording_callbacks("A", &log)),
    );

    open(&mut controller);
    controller.send(Command::bare("B"), SendOptions::default());
    deliver(
        &mut controller,
        TransportEvent::Closed {
            code: 1006,
            reason: String::new(),
        },
    );
    controller.send(
        Command::bare("C"),
        SendOptions::default().with_callbacks(recording_callbacks("C", &log)),
    );

    controller.destroy();
    assert!(controller.is_destroyed());
    assert_eq!(controller.state(), ConnectionState::Closed);
    assert_eq!(controller.timers().pending(), 0);
    assert_eq!(*log.lock().expect("lock"), vec!["A:ok", "C:cleared"]);

    let before = events.lock().expect("lock").len();
    assert!(matches!(
        controller.connect(),
        Err(WebSocketError::InvalidState(_))
    ));
    assert!(matches!(
        controller.send(Command::bare("D"), SendOptions::default()),
        SendOutcome::Rejected { .. }
    ));
    controller.set_authenticated(true);
    assert!(!controller.is_authenticated());
    assert_eq!(events.lock().expect("lock").len(), before);
    assert_eq!(connector.open_count(), 1);
}

#[test]
fn panicking_listener_does_not_break_the_engine() {
    let (mut controller, _connector) = harness(config());
    controller.on(
        EventKind::StateChange,
        listener(|_event| panic!("listener bug")),
    );
    let events = record(&mut controller);
    open(&mut controller);
    assert_eq!(transitions(&events).len(), 2);
}

#[test]
fn once_listener_fires_for_first_event_only() {
    let (mut controller, _connector) = harness(config());
    let hits = Arc::new(Mutex::new(0usize));
    let counter = hits.clone();
    controller.once(
        EventKind::StateChange,
        listener(move |_event| *counter.lock().expect("lock") += 1),
    );
    open(&mut controller);
    assert_eq!(*hits.lock().expect("lock"), 1);
}

#[test]
fn off_stops_delivery() {
    let (mut controller, _connector) = harness(config());
    let hits = Arc::new(Mutex::new(0usize));
    let counter = hits.clone();
    let counting = listener(move |_event| *counter.lock().expect("lock") += 1);
    controller.on(EventKind::StateChange, counting.clone());
    assert!(controller.off(EventKind::StateChange, &counting));
    open(&mut controller);
    assert_eq!(*hits.lock().expect("lock"), 0);
}

#[test]
fn clear_queue_discards_silently() {
    let (mut controller, _connector) = harness(config());
    let log = Arc::new(Mutex::new(Vec::new()));
    for name in ["A", "B", "C"] {
        controller.send(
            Command::bare(name),
            SendOptions::default().with_callbacks(recording_callbacks(name, &log)),
        );
    }
    assert_eq!(controller.clear_queue(), 3);
    assert_eq!(controller.queue_len(), 0);
    assert!(log.lock().expect("lock").is_empty());
}

#[test]
fn target_comes_from_resolver_when_config_has_none() {
    let connector = MockConnector::new();
    let mut controller = ConnectionController::new(
        SessionConfig::default(),
        connector.clone(),
        VirtualTimers::new(),
    )
    .with_resolver(OriginResolver::new("https://app.example.com", "/api/ws"));
    controller.connect().expect("connect");
    assert_eq!(connector.opened()[0].1, "wss://app.example.com/api/ws");

    let connector = MockConnector::new();
    let mut fixed = ConnectionController::new(
        SessionConfig::default(),
        connector.clone(),
        VirtualTimers::new(),
    )
    .with_resolver(FixedAddress("ws://fixed:9000".to_string()));
    fixed.connect().expect("connect");
    assert_eq!(connector.opened()[0].1, "ws://fixed:9000");
}

#[test]
fn missing_target_is_a_connect_failure() {
    let (mut controller, connector) = harness(SessionConfig::default().with_auto_reconnect(false));
    let events = record(&mut controller);
    assert!(matches!(
        controller.connect(),
        Err(WebSocketError::InvalidState(_))
    ));
    assert_eq!(connector.open_count(), 0);
    assert_eq!(errors(&events), vec![(ErrorKind::ConnectFailure, None)]);
    assert_eq!(controller.state(), ConnectionState::Closed);
}
