//! Signaling channel connection management

mod common;

use common::*;
use rvoip_dialer_core::{
    ChannelConfig, ChannelEvent, ChannelManager, DialerError, DialerEvent, DisconnectReason, EventEmitter,
};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;

fn channel() -> (Arc<ChannelManager>, Arc<FakeTransport>, broadcast::Receiver<DialerEvent>) {
    init_tracing();
    let events = EventEmitter::new(1000);
    let rx = events.subscribe();
    let transport = FakeTransport::new();
    let manager = ChannelManager::new(ChannelConfig::default(), events, transport.clone());
    (manager, transport, rx)
}

fn reconnect_delays(events: &[DialerEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            DialerEvent::ChannelReconnecting { delay_ms, .. } => Some(*delay_ms),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_connect_registers_operator() {
    let (channel, transport, mut rx) = channel();
    channel.connect("alice").await.expect("connect");

    assert!(channel.is_connected());
    let status = channel.status();
    assert_eq!(status.operator.as_deref(), Some("alice"));
    assert_eq!(status.reconnect_attempts, 0);
    assert_eq!(
        transport.last_link().find("register-client"),
        Some(json!({ "clientName": "alice" }))
    );
    assert!(drain_events(&mut rx)
        .iter()
        .any(|e| matches!(e, DialerEvent::ChannelConnected)));
}

#[tokio::test(start_paused = true)]
async fn test_server_disconnect_backs_off_until_exhausted() {
    let (channel, transport, mut rx) = channel();
    channel.connect("alice").await.unwrap();
    drain_events(&mut rx);

    transport.set_behavior(LinkBehavior::Refuse);
    transport.last_link().push(ChannelEvent::Disconnected {
        reason: DisconnectReason::from_wire("io server disconnect"),
    });
    sleep(Duration::from_secs(60)).await;

    let events = drain_events(&mut rx);
    assert_eq!(reconnect_delays(&events), vec![1000, 2000, 4000, 8000, 16000]);
    let exhausted = events
        .iter()
        .filter(|e| matches!(e, DialerEvent::ChannelReconnectExhausted { attempts: 5 }))
        .count();
    assert_eq!(exhausted, 1);
    assert!(activity_messages(&events).contains(&"Maximum reconnection attempts reached".to_string()));
    assert!(activity_messages(&events).contains(&"Attempting to reconnect... (3/5)".to_string()));
    assert_eq!(transport.opens(), 6);
    assert!(channel.status().exhausted);

    // no sixth attempt
    sleep(Duration::from_secs(300)).await;
    assert_eq!(transport.opens(), 6);

    transport.set_behavior(LinkBehavior::Accept);
    channel.force_reconnect().await.expect("manual reconnect");
    let status = channel.status();
    assert!(status.connected);
    assert_eq!(status.reconnect_attempts, 0);
    assert!(!status.exhausted);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_recovers_after_outage() {
    let (channel, transport, mut rx) = channel();
    channel.connect("alice").await.unwrap();

    transport.set_behavior(LinkBehavior::Refuse);
    transport.last_link().push(ChannelEvent::Disconnected {
        reason: DisconnectReason::ServerDisconnect,
    });
    sleep(Duration::from_millis(3500)).await;
    assert_eq!(transport.opens(), 3);

    transport.set_behavior(LinkBehavior::Accept);
    sleep(Duration::from_secs(4)).await;

    assert!(channel.is_connected());
    assert_eq!(transport.opens(), 4);
    assert_eq!(channel.status().reconnect_attempts, 0);
    assert_eq!(
        transport.last_link().find("register-client"),
        Some(json!({ "clientName": "alice" }))
    );
    assert_eq!(reconnect_delays(&drain_events(&mut rx)), vec![1000, 2000, 4000]);
}

#[tokio::test(start_paused = true)]
async fn test_client_side_close_does_not_reconnect() {
    let (channel, transport, mut rx) = channel();
    channel.connect("alice").await.unwrap();

    transport.last_link().push(ChannelEvent::Disconnected {
        reason: DisconnectReason::TransportClose,
    });
    sleep(Duration::from_secs(30)).await;

    assert!(!channel.is_connected());
    assert_eq!(transport.opens(), 1);
    assert!(reconnect_delays(&drain_events(&mut rx)).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_schedules_retry() {
    let (channel, transport, mut rx) = channel();
    transport.set_behavior(LinkBehavior::Silent);

    let err = channel.connect("alice").await.unwrap_err();
    assert_eq!(err, DialerError::ConnectionTimeout { timeout_ms: 15_000 });
    assert_eq!(reconnect_delays(&drain_events(&mut rx)), vec![1000]);

    transport.set_behavior(LinkBehavior::Accept);
    sleep(Duration::from_secs(2)).await;
    assert!(channel.is_connected());
    assert_eq!(transport.opens(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_second_connect_rejected_while_in_flight() {
    let (channel, transport, _rx) = channel();
    transport.set_behavior(LinkBehavior::Silent);

    let first = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.connect("alice").await })
    };
    settle().await;

    assert_eq!(channel.connect("alice").await, Err(DialerError::ConnectInProgress));
    assert!(channel.status().connecting);

    let outcome = first.await.expect("connect task");
    assert!(matches!(outcome, Err(DialerError::ConnectionTimeout { .. })));
    channel.disconnect();
}

#[tokio::test(start_paused = true)]
async fn test_stale_channel_is_replaced() {
    let (channel, transport, mut rx) = channel();
    transport.set_auto_pong(false);
    channel.connect("alice").await.unwrap();
    let first = transport.last_link();

    // ping at 30s, pong check at 35s, retry one second later
    sleep(Duration::from_secs(37)).await;

    let events = drain_events(&mut rx);
    assert!(events.iter().any(|e| matches!(e, DialerEvent::ChannelStale { .. })));
    assert!(activity_messages(&events).contains(&"Socket connection appears stale - checking...".to_string()));
    assert!(first.emitted_names().contains(&"ping".to_string()));
    assert!(first.closed.load(Ordering::SeqCst));
    assert_eq!(transport.opens(), 2);
    assert!(channel.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_healthy_keepalive() {
    let (channel, transport, mut rx) = channel();
    channel.connect("alice").await.unwrap();

    sleep(Duration::from_secs(95)).await;

    let pings = transport
        .last_link()
        .emitted_names()
        .iter()
        .filter(|name| name.as_str() == "ping")
        .count();
    assert_eq!(pings, 3);
    assert!(!drain_events(&mut rx)
        .iter()
        .any(|e| matches!(e, DialerEvent::ChannelStale { .. })));
    assert_eq!(transport.opens(), 1);
    assert!(channel.status().last_pong_age.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_emit_requires_connection() {
    let (channel, transport, mut rx) = channel();

    assert!(!channel.emit("call-ended", json!({ "clientName": "alice" })));
    assert!(activity_messages(&drain_events(&mut rx)).contains(&"Cannot emit - socket not connected".to_string()));

    channel.connect("alice").await.unwrap();
    assert!(channel.emit("call-ended", json!({ "clientName": "alice", "reason": "user_hangup" })));
    assert_eq!(
        transport.last_link().find("call-ended"),
        Some(json!({ "clientName": "alice", "reason": "user_hangup" }))
    );
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_is_idempotent() {
    let (channel, transport, mut rx) = channel();
    channel.connect("alice").await.unwrap();
    let link = transport.last_link();

    channel.disconnect();
    channel.disconnect();

    let status = channel.status();
    assert!(!status.connected);
    assert!(status.operator.is_none());
    assert_eq!(status.reconnect_attempts, 0);
    assert!(link.closed.load(Ordering::SeqCst));

    let disconnects = drain_events(&mut rx)
        .into_iter()
        .filter(|e| {
            matches!(
                e,
                DialerEvent::ChannelDisconnected {
                    reason: DisconnectReason::ClientDisconnect
                }
            )
        })
        .count();
    assert_eq!(disconnects, 1);

    // the old link is no longer heard
    link.push(ChannelEvent::Disconnected {
        reason: DisconnectReason::ServerDisconnect,
    });
    sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_server_notices_are_published() {
    let (channel, transport, mut rx) = channel();
    channel.connect("alice").await.unwrap();
    drain_events(&mut rx);

    let link = transport.last_link();
    link.push(ChannelEvent::IncomingCall(json!({ "callSid": "CA9" })));
    link.push(ChannelEvent::RegistrationError(json!({ "message": "unknown client" })));
    settle().await;

    let events = drain_events(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        DialerEvent::InboundCallNotice { from, call_sid: Some(sid) } if from == "Unknown Number" && sid == "CA9"
    )));
    assert!(events
        .iter()
        .any(|e| matches!(e, DialerEvent::OperatorRegistrationFailed { .. })));
    assert!(activity_messages(&events).contains(&"Operator registration failed".to_string()));
}
