//! In-memory collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rvoip_dialer_core::{
    ActivityEntry, CallEvent, CallHandle, CallHistoryEntry, CallSession, CallStatus, ChannelEvent,
    CredentialGrant, CredentialProvider, DeviceEvent, DeviceFactory, DeviceOptions, DeviceState,
    Dialer, DialerBuilder, DialerEvent, DialerConfig, DialerError, DialerResult, DialerView, OperatorIdentity,
    OperatorRecord, OperatorStatus, QualityReport, SignalingLink, SignalingTransport,
    SilentNotifier, TelephonyDevice,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("rvoip_dialer_core=debug")
        .with_test_writer()
        .try_init();
}

/// Let spawned tasks run; advances the paused clock a little
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Everything buffered on `rx` right now
pub fn drain_events(rx: &mut broadcast::Receiver<DialerEvent>) -> Vec<DialerEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    events
}

/// Messages of the activity entries among `events`
pub fn activity_messages(events: &[DialerEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            DialerEvent::Activity(entry) => Some(entry.message.clone()),
            _ => None,
        })
        .collect()
}

// ---- telephony ----

pub struct FakeCall {
    sid: String,
    from: String,
    tx: mpsc::UnboundedSender<CallEvent>,
    pub accepted: AtomicBool,
    pub rejected: AtomicBool,
    pub disconnected: AtomicBool,
    pub muted: AtomicBool,
    pub digits: Mutex<Vec<String>>,
    pub stats: Mutex<Vec<Value>>,
}

impl FakeCall {
    fn new(sid: &str, from: &str) -> (Arc<Self>, mpsc::UnboundedReceiver<CallEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let call = Arc::new(Self {
            sid: sid.to_string(),
            from: from.to_string(),
            tx,
            accepted: AtomicBool::new(false),
            rejected: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
            muted: AtomicBool::new(false),
            digits: Mutex::new(Vec::new()),
            stats: Mutex::new(Vec::new()),
        });
        (call, rx)
    }

    /// Raise a transport-side call event
    pub fn raise(&self, event: CallEvent) {
        let _ = self.tx.send(event);
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    pub fn set_stats(&self, reports: Vec<Value>) {
        *self.stats.lock() = reports;
    }
}

#[async_trait]
impl CallHandle for FakeCall {
    fn call_sid(&self) -> Option<String> {
        Some(self.sid.clone())
    }

    fn remote_party(&self) -> Option<String> {
        Some(self.from.clone())
    }

    fn accept(&self) -> DialerResult<()> {
        self.accepted.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn reject(&self) -> DialerResult<()> {
        self.rejected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(&self) -> DialerResult<()> {
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn mute(&self, muted: bool) -> DialerResult<()> {
        self.muted.store(muted, Ordering::SeqCst);
        Ok(())
    }

    fn send_digits(&self, digits: &str) -> DialerResult<()> {
        self.digits.lock().push(digits.to_string());
        Ok(())
    }

    async fn get_stats(&self) -> DialerResult<Vec<Value>> {
        Ok(self.stats.lock().clone())
    }
}

pub struct FakeDevice {
    state: Mutex<DeviceState>,
    tx: mpsc::UnboundedSender<DeviceEvent>,
    pub options: DeviceOptions,
    pub tokens: Mutex<Vec<String>>,
    pub registrations: AtomicUsize,
    pub unregistrations: AtomicUsize,
    pub fail_register: AtomicBool,
    pub outbound: Mutex<Option<Arc<FakeCall>>>,
    next_sid: AtomicUsize,
}

impl FakeDevice {
    /// Deliver an inbound offer
    pub fn incoming(&self, from: &str) -> Arc<FakeCall> {
        let sid = format!("CA{:04}", self.next_sid.fetch_add(1, Ordering::SeqCst));
        let (call, events) = FakeCall::new(&sid, from);
        let _ = self.tx.send(DeviceEvent::Incoming(CallSession {
            handle: call.clone(),
            events,
        }));
        call
    }

    /// Simulate the registration lapsing
    pub fn drop_registration(&self) {
        *self.state.lock() = DeviceState::Unregistered;
    }

    pub fn raise(&self, event: DeviceEvent) {
        let _ = self.tx.send(event);
    }
}

#[async_trait]
impl TelephonyDevice for FakeDevice {
    fn state(&self) -> DeviceState {
        *self.state.lock()
    }

    async fn register(&self) -> DialerResult<()> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(DialerError::registration_failed("registrar unavailable"));
        }
        *self.state.lock() = DeviceState::Registered;
        let _ = self.tx.send(DeviceEvent::Ready);
        Ok(())
    }

    async fn unregister(&self) -> DialerResult<()> {
        self.unregistrations.fetch_add(1, Ordering::SeqCst);
        *self.state.lock() = DeviceState::Unregistered;
        Ok(())
    }

    fn destroy(&self) {
        *self.state.lock() = DeviceState::Destroyed;
    }

    fn update_credential(&self, token: &str) -> DialerResult<()> {
        self.tokens.lock().push(token.to_string());
        Ok(())
    }

    async fn connect(&self, target: &str) -> DialerResult<CallSession> {
        let sid = format!("CA{:04}", self.next_sid.fetch_add(1, Ordering::SeqCst));
        let (call, events) = FakeCall::new(&sid, target);
        *self.outbound.lock() = Some(call.clone());
        Ok(CallSession { handle: call, events })
    }
}

#[derive(Default)]
pub struct FakeDeviceFactory {
    pub creates: AtomicUsize,
    pub fail_create: AtomicBool,
    pub fail_register: AtomicBool,
    last: Mutex<Option<Arc<FakeDevice>>>,
}

impl FakeDeviceFactory {
    pub fn device(&self) -> Arc<FakeDevice> {
        self.last.lock().clone().expect("no device created yet")
    }
}

#[async_trait]
impl DeviceFactory for FakeDeviceFactory {
    async fn create(
        &self,
        token: &str,
        options: &DeviceOptions,
    ) -> DialerResult<(Arc<dyn TelephonyDevice>, mpsc::UnboundedReceiver<DeviceEvent>)> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(DialerError::device("media permissions denied"));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let device = Arc::new(FakeDevice {
            state: Mutex::new(DeviceState::Unregistered),
            tx,
            options: options.clone(),
            tokens: Mutex::new(vec![token.to_string()]),
            registrations: AtomicUsize::new(0),
            unregistrations: AtomicUsize::new(0),
            fail_register: AtomicBool::new(self.fail_register.load(Ordering::SeqCst)),
            outbound: Mutex::new(None),
            next_sid: AtomicUsize::new(1),
        });
        *self.last.lock() = Some(device.clone());
        Ok((device, rx))
    }
}

// ---- signaling ----

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkBehavior {
    /// Server accepts the connection straight away
    Accept,
    /// Server refuses with a connect error
    Refuse,
    /// Nothing ever comes back
    Silent,
}

pub struct FakeLink {
    tx: mpsc::UnboundedSender<ChannelEvent>,
    auto_pong: bool,
    pub emitted: Mutex<Vec<(String, Value)>>,
    pub closed: AtomicBool,
}

impl FakeLink {
    /// Push a server event
    pub fn push(&self, event: ChannelEvent) {
        let _ = self.tx.send(event);
    }

    pub fn emitted_names(&self) -> Vec<String> {
        self.emitted.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn find(&self, name: &str) -> Option<Value> {
        self.emitted
            .lock()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, payload)| payload.clone())
    }
}

impl SignalingLink for FakeLink {
    fn emit(&self, event: &str, payload: Value) -> DialerResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DialerError::NotConnected);
        }
        self.emitted.lock().push((event.to_string(), payload));
        if event == "ping" && self.auto_pong {
            let _ = self.tx.send(ChannelEvent::Pong);
        }
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

pub struct FakeTransport {
    behavior: Mutex<LinkBehavior>,
    auto_pong: AtomicBool,
    pub opens: AtomicUsize,
    links: Mutex<Vec<Arc<FakeLink>>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(LinkBehavior::Accept),
            auto_pong: AtomicBool::new(true),
            opens: AtomicUsize::new(0),
            links: Mutex::new(Vec::new()),
        })
    }

    pub fn set_behavior(&self, behavior: LinkBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn set_auto_pong(&self, enabled: bool) {
        self.auto_pong.store(enabled, Ordering::SeqCst);
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn last_link(&self) -> Arc<FakeLink> {
        self.links.lock().last().cloned().expect("no link opened yet")
    }
}

#[async_trait]
impl SignalingTransport for FakeTransport {
    async fn open(&self) -> DialerResult<(Arc<dyn SignalingLink>, mpsc::UnboundedReceiver<ChannelEvent>)> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        let link = Arc::new(FakeLink {
            tx,
            auto_pong: self.auto_pong.load(Ordering::SeqCst),
            emitted: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        match *self.behavior.lock() {
            LinkBehavior::Accept => link.push(ChannelEvent::Connected),
            LinkBehavior::Refuse => link.push(ChannelEvent::ConnectError {
                message: "xhr poll error".to_string(),
            }),
            LinkBehavior::Silent => {}
        }
        self.links.lock().push(link.clone());
        Ok((link, rx))
    }
}

// ---- credential service ----

#[derive(Default)]
pub struct FakeProvider {
    pub logins: AtomicUsize,
    pub token_requests: AtomicUsize,
    pub history_requests: AtomicUsize,
    pub logouts: AtomicUsize,
    pub fail_token: AtomicBool,
}

impl FakeProvider {
    pub fn token_requests(&self) -> usize {
        self.token_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for FakeProvider {
    async fn login(&self, name: &str) -> DialerResult<OperatorRecord> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if name == "mallory" {
            return Err(DialerError::provider("login", "Client not found or inactive"));
        }
        Ok(OperatorRecord {
            id: Some(1),
            name: name.to_string(),
            number: Some("+15551234567".to_string()),
            status: Some("available".to_string()),
            is_active: Some(true),
            call_sid: None,
        })
    }

    async fn get_credential(&self, name: &str) -> DialerResult<CredentialGrant> {
        let n = self.token_requests.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_token.load(Ordering::SeqCst) {
            return Err(DialerError::provider("token", "Failed to generate token"));
        }
        Ok(CredentialGrant {
            token: format!("token-{}", n),
            identity: Some(name.to_string()),
            number: None,
        })
    }

    async fn get_call_history(&self, _name: &str, limit: usize) -> DialerResult<Vec<CallHistoryEntry>> {
        self.history_requests.fetch_add(1, Ordering::SeqCst);
        let rows = (0..limit.min(2))
            .map(|i| CallHistoryEntry {
                call_sid: format!("CAH{}", i),
                from: "+15550001111".to_string(),
                to: "+15551234567".to_string(),
                direction: Some("inbound".to_string()),
                status: "completed".to_string(),
                duration: 30,
                start_time: None,
                end_time: None,
                price: None,
                price_unit: None,
            })
            .collect();
        Ok(rows)
    }

    async fn logout(&self, _name: &str) -> DialerResult<()> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_call_status(&self, name: &str) -> DialerResult<OperatorStatus> {
        Ok(OperatorStatus {
            client_name: name.to_string(),
            number: None,
            status: "available".to_string(),
            is_available: true,
            is_busy: false,
            current_call_sid: None,
        })
    }
}

// ---- view ----

#[derive(Default)]
pub struct RecordingView {
    pub screens: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<String>>,
    pub activation_enabled: AtomicUsize,
    pub history_updates: AtomicUsize,
    pub call_states: Mutex<Vec<CallStatus>>,
}

impl RecordingView {
    pub fn last_screen(&self) -> Option<String> {
        self.screens.lock().last().cloned()
    }
}

impl DialerView for RecordingView {
    fn show_login(&self) {
        self.screens.lock().push("login".into());
    }

    fn show_activation(&self, _operator: &OperatorIdentity) {
        self.screens.lock().push("activation".into());
    }

    fn show_app(&self, _operator: &OperatorIdentity) {
        self.screens.lock().push("app".into());
    }

    fn show_error(&self, message: &str) {
        self.errors.lock().push(message.to_string());
    }

    fn enable_activation(&self) {
        self.activation_enabled.fetch_add(1, Ordering::SeqCst);
    }

    fn add_activity(&self, _entry: &ActivityEntry) {}

    fn update_call_history(&self, _history: &[CallHistoryEntry]) {
        self.history_updates.fetch_add(1, Ordering::SeqCst);
    }

    fn show_call_state(&self, status: CallStatus) {
        self.call_states.lock().push(status);
    }

    fn update_quality(&self, _report: &QualityReport) {}
}

// ---- harness ----

pub struct Harness {
    pub dialer: Dialer,
    pub factory: Arc<FakeDeviceFactory>,
    pub transport: Arc<FakeTransport>,
    pub provider: Arc<FakeProvider>,
    pub view: Arc<RecordingView>,
}

pub fn harness() -> Harness {
    harness_with(DialerConfig::default())
}

pub fn harness_with(config: DialerConfig) -> Harness {
    init_tracing();
    let factory = Arc::new(FakeDeviceFactory::default());
    let transport = FakeTransport::new();
    let provider = Arc::new(FakeProvider::default());
    let view = Arc::new(RecordingView::default());
    let dialer = DialerBuilder::new(config)
        .device_factory(factory.clone())
        .signaling(transport.clone())
        .provider(provider.clone())
        .view(view.clone())
        .notifier(Arc::new(SilentNotifier))
        .build()
        .expect("dialer should build");
    dialer.start();
    Harness {
        dialer,
        factory,
        transport,
        provider,
        view,
    }
}

impl Harness {
    /// Log in as `name` and activate
    pub async fn activate_as(&self, name: &str) {
        self.dialer.login(name).await.expect("login");
        self.dialer.activate().await.expect("activation");
    }

    /// Deliver an inbound call and wait until it is tracked
    pub async fn ring(&self, from: &str) -> Arc<FakeCall> {
        let call = self.factory.device().incoming(from);
        settle().await;
        assert_eq!(self.dialer.call_status(), CallStatus::Incoming);
        call
    }
}
