//! Call lifecycle against an in-memory telephony device

mod common;

use common::*;
use rvoip_dialer_core::quality::WarningSample;
use rvoip_dialer_core::{
    CallConfig, CallEvent, CallManager, CallStatus, DeferredOp, DialerError, DialerEvent, EndReason, EventEmitter,
    TelephonyDevice,
};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

async fn call_manager() -> (Arc<CallManager>, Arc<FakeDeviceFactory>, EventEmitter) {
    init_tracing();
    let events = EventEmitter::new(1000);
    let factory = Arc::new(FakeDeviceFactory::default());
    let calls = CallManager::new(CallConfig::default(), events.clone(), factory.clone());
    calls.initialize_device("token-1").await.expect("device");
    (calls, factory, events)
}

fn ended_reasons(events: &[DialerEvent]) -> Vec<EndReason> {
    events
        .iter()
        .filter_map(|e| match e {
            DialerEvent::CallEnded { reason, .. } => Some(*reason),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_operator_answers_incoming_call() {
    let h = harness();
    h.activate_as("alice").await;
    assert!(h.dialer.channel().is_connected());

    let link = h.transport.last_link();
    let registration = link.find("register-client").expect("operator registered on the channel");
    assert_eq!(registration["clientName"], "alice");

    let mut rx = h.dialer.subscribe();
    let call = h.ring("+15550001111").await;
    sleep(Duration::from_secs(1)).await;

    h.dialer.answer(None).expect("answer");
    assert!(call.accepted.load(Ordering::SeqCst));
    assert_eq!(h.dialer.call_status(), CallStatus::Active);
    settle().await;

    let statuses: Vec<CallStatus> = drain_events(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            DialerEvent::CallStateChanged { status, .. } => Some(status),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, vec![CallStatus::Incoming, CallStatus::Active]);

    let log = h.dialer.activity_log();
    assert!(log.contains("Incoming call from +1 555-000-1111"));
    assert!(log.contains("Call connected"));

    let answered = link.find("call-answered").expect("server told about the answer");
    assert_eq!(answered["clientName"], "alice");
    assert_eq!(answered["callSid"], call.sid());
}

#[tokio::test(start_paused = true)]
async fn test_hangup_reports_duration_and_reason() {
    let h = harness();
    h.activate_as("alice").await;
    let call = h.ring("+15550001111").await;
    h.dialer.answer(None).unwrap();

    let mut rx = h.dialer.subscribe();
    sleep(Duration::from_secs(65)).await;
    h.dialer.hangup(None).unwrap();
    assert!(call.disconnected.load(Ordering::SeqCst));
    assert_eq!(h.dialer.call_status(), CallStatus::None);
    settle().await;

    let events = drain_events(&mut rx);
    let ended = events.iter().find_map(|e| match e {
        DialerEvent::CallEnded { reason, duration_secs, .. } => Some((*reason, *duration_secs)),
        _ => None,
    });
    assert_eq!(ended, Some((EndReason::Hangup, 65)));

    let ticks: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            DialerEvent::CallTimerTick { display, .. } => Some(display.as_str()),
            _ => None,
        })
        .collect();
    assert!(ticks.contains(&"01:05"));

    let ended = h.transport.last_link().find("call-ended").expect("server told about the hangup");
    assert_eq!(ended["reason"], "user_hangup");
    assert_eq!(ended["callSid"], call.sid());
    assert!(h.dialer.activity_log().contains("Call ended: hangup"));
}

#[tokio::test(start_paused = true)]
async fn test_reject_and_remote_cancel() {
    let (calls, factory, events) = call_manager().await;
    let mut rx = events.subscribe();
    let device = factory.device();

    let first = device.incoming("+15550001111");
    settle().await;
    calls.reject(None).expect("reject");
    assert!(first.rejected.load(Ordering::SeqCst));
    assert!(calls.current_call().is_none());

    let second = device.incoming("+15550002222");
    settle().await;
    assert_eq!(calls.status(), CallStatus::Incoming);
    second.raise(CallEvent::Cancel);
    settle().await;
    assert_eq!(calls.status(), CallStatus::None);

    assert_eq!(
        ended_reasons(&drain_events(&mut rx)),
        vec![EndReason::Rejected, EndReason::Cancelled]
    );
}

#[tokio::test(start_paused = true)]
async fn test_commands_without_a_call() {
    let (calls, _factory, _events) = call_manager().await;

    assert_eq!(calls.answer(None), Err(DialerError::NoActiveCall));
    assert_eq!(calls.hangup(None), Err(DialerError::NoActiveCall));
    assert!(!calls.toggle_mute());
    assert!(!calls.send_tone('1'));
    assert!(!calls.is_muted());

    calls.cleanup();
    calls.cleanup();
    assert_eq!(calls.status(), CallStatus::None);
}

#[tokio::test(start_paused = true)]
async fn test_answer_with_stale_call_id() {
    let (calls, factory, _events) = call_manager().await;
    factory.device().incoming("+15550001111");
    settle().await;

    let stale = uuid::Uuid::new_v4();
    assert!(matches!(calls.answer(Some(stale)), Err(DialerError::CallNotFound { .. })));
    assert_eq!(calls.status(), CallStatus::Incoming);
}

#[tokio::test(start_paused = true)]
async fn test_tones_only_while_active() {
    let (calls, factory, _events) = call_manager().await;
    let call = factory.device().incoming("+15550001111");
    settle().await;

    assert!(!calls.send_tone('5'));
    calls.answer(None).unwrap();
    assert!(calls.send_tone('5'));
    assert!(calls.send_tone('#'));
    assert!(!calls.send_tone('x'));
    assert_eq!(*call.digits.lock(), vec!["5".to_string(), "#".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_mute() {
    let (calls, factory, events) = call_manager().await;
    let mut rx = events.subscribe();
    let call = factory.device().incoming("+15550001111");
    settle().await;
    calls.answer(None).unwrap();

    assert!(calls.toggle_mute());
    assert!(call.muted.load(Ordering::SeqCst));
    assert!(calls.is_muted());
    assert!(!calls.toggle_mute());
    assert!(!call.muted.load(Ordering::SeqCst));

    let changes: Vec<bool> = drain_events(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            DialerEvent::CallMuteChanged { muted, .. } => Some(muted),
            _ => None,
        })
        .collect();
    assert_eq!(changes, vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn test_outbound_dial() {
    let (calls, factory, _events) = call_manager().await;

    assert!(matches!(calls.dial("   ").await, Err(DialerError::Validation { .. })));

    let id = calls.dial("+15550003333").await.expect("dial");
    assert_eq!(calls.status(), CallStatus::Connecting);
    assert!(matches!(
        calls.dial("+15550004444").await,
        Err(DialerError::CallAlreadyExists { .. })
    ));

    let outbound = factory.device().outbound.lock().clone().expect("outbound call placed");
    outbound.raise(CallEvent::Accept);
    settle().await;
    let call = calls.current_call().expect("call tracked");
    assert_eq!(call.id, id);
    assert_eq!(call.status, CallStatus::Active);
    assert_eq!(call.counterpart, "+15550003333");
}

#[tokio::test(start_paused = true)]
async fn test_new_offer_replaces_current_call() {
    let (calls, factory, events) = call_manager().await;
    let mut rx = events.subscribe();
    let device = factory.device();

    device.incoming("+15550001111");
    settle().await;
    let first = calls.current_call().unwrap().id;

    device.incoming("+15550002222");
    settle().await;
    let current = calls.current_call().expect("second call tracked");
    assert_ne!(current.id, first);
    assert_eq!(current.counterpart, "+15550002222");
    assert_eq!(ended_reasons(&drain_events(&mut rx)), vec![EndReason::Disconnected]);
}

#[tokio::test(start_paused = true)]
async fn test_replacing_offer_survives_post_call_housekeeping() {
    let h = harness();
    h.activate_as("alice").await;
    let first = h.ring("+15550001111").await;
    h.dialer.answer(None).unwrap();
    assert!(first.accepted.load(Ordering::SeqCst));

    let mut rx = h.dialer.subscribe();
    let second = h.factory.device().incoming("+15550002222");
    settle().await;
    sleep(Duration::from_secs(2)).await;

    assert_eq!(h.dialer.call_status(), CallStatus::Incoming);
    let current = h.dialer.calls().current_call().expect("second call still tracked");
    assert_eq!(current.counterpart, "+15550002222");
    assert_eq!(ended_reasons(&drain_events(&mut rx)), vec![EndReason::Disconnected]);

    // maintenance keeps deferring while the new call rings
    sleep(Duration::from_secs(300)).await;
    assert!(h.dialer.session().deferred_ops().contains(&DeferredOp::DeviceRefresh));

    h.dialer.answer(None).unwrap();
    assert!(second.accepted.load(Ordering::SeqCst));
    assert_eq!(h.dialer.call_status(), CallStatus::Active);
}

#[tokio::test(start_paused = true)]
async fn test_dial_right_after_hangup_keeps_new_call() {
    let h = harness();
    h.activate_as("alice").await;
    h.ring("+15550001111").await;
    h.dialer.answer(None).unwrap();

    h.dialer.hangup(None).unwrap();
    let id = h.dialer.dial("+15550003333").await.expect("dial");
    settle().await;
    sleep(Duration::from_secs(2)).await;

    let current = h.dialer.calls().current_call().expect("outbound call still tracked");
    assert_eq!(current.id, id);
    assert_eq!(h.dialer.call_status(), CallStatus::Connecting);
}

#[tokio::test(start_paused = true)]
async fn test_stats_polled_only_while_active() {
    let (calls, factory, events) = call_manager().await;
    let mut rx = events.subscribe();
    let call = factory.device().incoming("+15550001111");
    call.set_stats(vec![
        json!({"kind": "video", "jitter": 99}),
        json!({"kind": "audio", "jitter": "0.012", "packetsReceived": 990, "packetsLost": 10, "codecName": "opus"}),
    ]);
    settle().await;

    sleep(Duration::from_secs(3)).await;
    let ringing = drain_events(&mut rx);
    assert!(!ringing.iter().any(|e| matches!(e, DialerEvent::CallStats { .. })));

    calls.answer(None).unwrap();
    sleep(Duration::from_millis(2500)).await;
    let samples: Vec<_> = drain_events(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            DialerEvent::CallStats { sample, .. } => Some(sample),
            _ => None,
        })
        .collect();
    assert!(samples.len() >= 2);
    assert_eq!(samples[0].jitter, 0.012);
    assert!((samples[0].packet_loss_percentage() - 1.0).abs() < 1e-9);
    assert_eq!(samples[0].codec_name.as_deref(), Some("opus"));
}

#[tokio::test(start_paused = true)]
async fn test_transport_warning_is_classified() {
    let (calls, factory, events) = call_manager().await;
    let mut rx = events.subscribe();
    let call = factory.device().incoming("+15550001111");
    settle().await;
    calls.answer(None).unwrap();

    call.raise(CallEvent::Warning {
        name: "high-rtt".to_string(),
        sample: WarningSample {
            rtt: Some(450.0),
            ..Default::default()
        },
    });
    call.raise(CallEvent::Warning {
        name: "something-new".to_string(),
        sample: WarningSample::default(),
    });
    settle().await;

    let warnings: Vec<(String, String)> = drain_events(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            DialerEvent::CallWarning { name, severity, message, .. } => {
                Some((name, format!("{}: {}", severity, message)))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        warnings,
        vec![
            (
                "high-rtt".to_string(),
                "warning: High network latency detected - conversations may have delays".to_string()
            ),
            ("something-new".to_string(), "warning: Call quality warning: something-new".to_string()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_post_call_cleanup_restores_registration() {
    let (calls, factory, _events) = call_manager().await;
    let device = factory.device();
    assert_eq!(device.registrations.load(Ordering::SeqCst), 1);

    device.incoming("+15550001111");
    settle().await;
    calls.hangup(None).unwrap();
    device.drop_registration();

    calls.post_call_cleanup().await;
    assert_eq!(device.registrations.load(Ordering::SeqCst), 2);
    assert!(device.state().is_ready());
}

#[tokio::test(start_paused = true)]
async fn test_teardown_is_repeatable() {
    let (calls, factory, _events) = call_manager().await;
    let device = factory.device();
    assert_eq!(device.options.codec_preferences, vec!["opus".to_string(), "pcmu".to_string()]);

    calls.teardown().await;
    calls.teardown().await;
    assert_eq!(device.unregistrations.load(Ordering::SeqCst), 1);
    assert_eq!(device.state(), rvoip_dialer_core::DeviceState::Destroyed);
    assert!(calls.device_state().is_none());
    assert_eq!(calls.update_credential("token-2"), Err(DialerError::DeviceNotInitialized));
}
