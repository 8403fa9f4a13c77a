use super::backoff::ReconnectPolicy;
use super::transport::{wire, ChannelEvent, DisconnectReason, SignalingLink, SignalingTransport};
use crate::config::ChannelConfig;
use crate::error::{DialerError, DialerResult};
use crate::events::{ActivityLevel, DialerEvent, EventEmitter};
use crate::scheduler::Scheduler;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

const KEEPALIVE_TASK: &str = "channel-keepalive";
const PONG_CHECK_TASK: &str = "channel-pong-check";
const RECONNECT_TASK: &str = "channel-reconnect";

type ConnectOutcome = Result<(), String>;

#[derive(Default)]
struct ChannelState {
    connected: bool,
    connecting: bool,
    attempts: u32,
    exhausted: bool,
    last_pong: Option<Instant>,
    operator: Option<String>,
    pending: Option<oneshot::Sender<ConnectOutcome>>,
    generation: u64,
}

/// Snapshot of the channel for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub connecting: bool,
    pub reconnect_attempts: u32,
    pub exhausted: bool,
    pub last_pong_age: Option<Duration>,
    pub operator: Option<String>,
    pub link_id: Option<String>,
}

/// Connection channel manager
///
/// Keeps the out-of-band signaling channel up: connects with a timeout,
/// pings on a fixed interval, and reconnects with exponential backoff after a
/// server disconnect or a failed connect until the attempt cap is reached.
pub struct ChannelManager {
    config: ChannelConfig,
    events: EventEmitter,
    transport: Arc<dyn SignalingTransport>,
    state: Mutex<ChannelState>,
    link: Mutex<Option<Arc<dyn SignalingLink>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    tasks: Scheduler,
}

impl ChannelManager {
    pub fn new(config: ChannelConfig, events: EventEmitter, transport: Arc<dyn SignalingTransport>) -> Arc<Self> {
        Arc::new(Self {
            config,
            events,
            transport,
            state: Mutex::new(ChannelState::default()),
            link: Mutex::new(None),
            listener: Mutex::new(None),
            tasks: Scheduler::new(),
        })
    }

    fn policy(&self) -> &ReconnectPolicy {
        &self.config.reconnect
    }

    /// Open a fresh channel for `operator` and wait for it to connect
    pub async fn connect(self: &Arc<Self>, operator: &str) -> DialerResult<()> {
        let operator = operator.trim();
        if operator.is_empty() {
            return Err(DialerError::validation("operator name", "must not be empty"));
        }

        let (outcome, generation) = {
            let mut state = self.state.lock();
            if state.connecting {
                return Err(DialerError::ConnectInProgress);
            }
            let (tx, rx) = oneshot::channel();
            state.connecting = true;
            state.operator = Some(operator.to_string());
            state.pending = Some(tx);
            state.generation += 1;
            (rx, state.generation)
        };

        self.close_link();

        let (link, server_events) = match self.transport.open().await {
            Ok(opened) => opened,
            Err(e) => {
                warn!(error = %e, "failed to open signaling channel");
                self.settle_connect();
                self.attempt_reconnection();
                return Err(e);
            }
        };
        *self.link.lock() = Some(link);
        self.spawn_listener(generation, server_events);
        self.start_keepalive();

        let waited = timeout(self.config.connect_timeout, outcome).await;
        self.settle_connect();

        match waited {
            Ok(Ok(Ok(()))) => {
                info!(%operator, "signaling channel connected");
                Ok(())
            }
            Ok(Ok(Err(message))) => Err(DialerError::network(message)),
            Ok(Err(_)) => Err(DialerError::network("channel closed before connecting")),
            Err(_) => {
                let timeout_ms = self.config.connect_timeout.as_millis() as u64;
                warn!(timeout_ms, "signaling connect timed out");
                self.attempt_reconnection();
                Err(DialerError::ConnectionTimeout { timeout_ms })
            }
        }
    }

    fn settle_connect(&self) {
        let mut state = self.state.lock();
        state.connecting = false;
        state.pending = None;
    }

    fn spawn_listener(self: &Arc<Self>, generation: u64, mut rx: mpsc::UnboundedReceiver<ChannelEvent>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let listener = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(manager) = weak.upgrade() else { break };
                if manager.state.lock().generation != generation {
                    break;
                }
                manager.handle_channel_event(event);
            }
        });
        if let Some(previous) = self.listener.lock().replace(listener) {
            previous.abort();
        }
    }

    fn handle_channel_event(self: &Arc<Self>, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => self.handle_connected(),
            ChannelEvent::Disconnected { reason } => {
                self.state.lock().connected = false;
                warn!(%reason, "signaling channel disconnected");
                let server_initiated = reason.is_server_initiated();
                self.events.emit(DialerEvent::ChannelDisconnected { reason });
                if server_initiated {
                    self.attempt_reconnection();
                }
            }
            ChannelEvent::ConnectError { message } => {
                let pending = {
                    let mut state = self.state.lock();
                    state.connected = false;
                    state.pending.take()
                };
                warn!(%message, "signaling connect error");
                self.attempt_reconnection();
                if let Some(tx) = pending {
                    let _ = tx.send(Err(message));
                }
            }
            ChannelEvent::Reconnected => {
                self.state.lock().attempts = 0;
                info!("signaling channel reconnected");
                self.events.emit(DialerEvent::ChannelReconnected);
            }
            ChannelEvent::RegistrationSuccess(payload) => {
                debug!("operator registered on channel");
                self.events.emit(DialerEvent::OperatorRegistered { payload });
            }
            ChannelEvent::RegistrationError(payload) => {
                error!(?payload, "operator registration refused");
                self.events
                    .activity(ActivityLevel::Error, "Operator registration failed");
                self.events.emit(DialerEvent::OperatorRegistrationFailed { payload });
            }
            ChannelEvent::IncomingCall(payload) => {
                let from = payload
                    .get("from")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown Number")
                    .to_string();
                let call_sid = payload.get("callSid").and_then(Value::as_str).map(str::to_string);
                self.events.emit(DialerEvent::InboundCallNotice { from, call_sid });
            }
            ChannelEvent::CallStatusUpdate(payload) => {
                self.events.emit(DialerEvent::CallStatusUpdate { payload });
            }
            ChannelEvent::Pong => {
                self.state.lock().last_pong = Some(Instant::now());
            }
        }
    }

    fn handle_connected(&self) {
        let (operator, pending) = {
            let mut state = self.state.lock();
            state.connected = true;
            state.attempts = 0;
            state.exhausted = false;
            state.last_pong = Some(Instant::now());
            (state.operator.clone(), state.pending.take())
        };
        self.tasks.cancel(RECONNECT_TASK);

        if let Some(operator) = operator {
            if let Some(link) = self.link.lock().clone() {
                if let Err(e) = link.emit(wire::REGISTER_CLIENT, json!({ "clientName": operator })) {
                    warn!(error = %e, "failed to register operator on channel");
                }
            }
        }
        self.events.emit(DialerEvent::ChannelConnected);
        if let Some(tx) = pending {
            let _ = tx.send(Ok(()));
        }
    }

    /// Schedule the next backoff attempt, or give up at the cap
    fn attempt_reconnection(self: &Arc<Self>) {
        let policy = self.policy();
        let max_attempts = policy.max_attempts;
        let next = {
            let mut state = self.state.lock();
            if state.operator.is_none() {
                return;
            }
            if !policy.allows(state.attempts.saturating_add(1)) {
                if state.exhausted {
                    return;
                }
                state.exhausted = true;
                None
            } else {
                state.attempts += 1;
                Some(state.attempts)
            }
        };

        let Some(attempt) = next else {
            error!(attempts = max_attempts, "maximum reconnection attempts reached");
            self.events
                .activity(ActivityLevel::Error, "Maximum reconnection attempts reached");
            self.events.emit(DialerEvent::ChannelReconnectExhausted {
                attempts: max_attempts,
            });
            return;
        };

        let delay = policy.delay_for(attempt);
        info!(attempt, max_attempts, delay_ms = delay.as_millis() as u64, "scheduling reconnection");
        self.events.activity(
            ActivityLevel::Info,
            format!("Attempting to reconnect... ({}/{})", attempt, max_attempts),
        );
        self.events.emit(DialerEvent::ChannelReconnecting {
            attempt,
            max_attempts,
            delay_ms: delay.as_millis() as u64,
        });

        let weak = Arc::downgrade(self);
        self.tasks.after(RECONNECT_TASK, delay, move || async move {
            if let Some(manager) = weak.upgrade() {
                manager.run_reconnect().await;
            }
        });
    }

    async fn run_reconnect(self: &Arc<Self>) {
        let operator = {
            let state = self.state.lock();
            if state.connected || state.connecting {
                debug!("skipping reconnection, channel busy or connected");
                return;
            }
            state.operator.clone()
        };
        let Some(operator) = operator else { return };
        if let Err(e) = self.connect(&operator).await {
            debug!(error = %e, category = e.category(), "reconnection attempt failed");
        }
    }

    fn start_keepalive(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.tasks.every(KEEPALIVE_TASK, self.config.keepalive_interval, move || {
            let weak = weak.clone();
            async move {
                if let Some(manager) = weak.upgrade() {
                    manager.send_ping();
                }
            }
        });
    }

    fn send_ping(self: &Arc<Self>) {
        if !self.is_connected() {
            return;
        }
        if let Some(link) = self.link.lock().clone() {
            if let Err(e) = link.emit(wire::PING, json!({ "timestamp": Utc::now().timestamp_millis() })) {
                warn!(error = %e, "ping failed");
            }
        }
        let weak = Arc::downgrade(self);
        self.tasks.after(PONG_CHECK_TASK, self.config.pong_check_delay, move || async move {
            if let Some(manager) = weak.upgrade() {
                manager.check_pong();
            }
        });
    }

    fn check_pong(self: &Arc<Self>) {
        let stale = {
            let state = self.state.lock();
            if !state.connected {
                return;
            }
            match state.last_pong {
                Some(at) if at.elapsed() <= self.config.pong_freshness => None,
                Some(at) => Some(Some(at.elapsed())),
                None => Some(None),
            }
        };
        let Some(age) = stale else { return };

        let last_pong_ms = age.map(|a| a.as_millis() as u64);
        warn!(?last_pong_ms, "signaling channel appears stale");
        self.events
            .activity(ActivityLevel::Warning, "Socket connection appears stale - checking...");
        self.events.emit(DialerEvent::ChannelStale { last_pong_ms });

        self.close_link();
        self.attempt_reconnection();
    }

    fn close_link(&self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
        if let Some(link) = self.link.lock().take() {
            link.close();
        }
        self.state.lock().connected = false;
    }

    /// Send an event to the server; `false` when not connected
    pub fn emit(&self, event: &str, data: Value) -> bool {
        let link = if self.is_connected() { self.link.lock().clone() } else { None };
        let Some(link) = link else {
            warn!(event, "cannot emit, channel not connected");
            self.events
                .activity(ActivityLevel::Warning, "Cannot emit - socket not connected");
            return false;
        };
        match link.emit(event, data) {
            Ok(()) => true,
            Err(e) => {
                warn!(event, error = %e, "emit failed");
                false
            }
        }
    }

    /// Stop keepalive and reconnection, close the channel and forget the
    /// operator. Safe to call repeatedly.
    pub fn disconnect(&self) {
        self.tasks.cancel_all();
        let was_connected = self.is_connected();
        self.close_link();
        {
            let mut state = self.state.lock();
            let generation = state.generation + 1;
            *state = ChannelState {
                generation,
                ..Default::default()
            };
        }
        if was_connected {
            info!("signaling channel disconnected");
            self.events.emit(DialerEvent::ChannelDisconnected {
                reason: DisconnectReason::ClientDisconnect,
            });
        }
    }

    /// Manual reconnect; resets the attempt counter
    pub async fn force_reconnect(self: &Arc<Self>) -> DialerResult<()> {
        let operator = {
            let mut state = self.state.lock();
            state.attempts = 0;
            state.exhausted = false;
            state.operator.clone()
        };
        let operator = operator.ok_or(DialerError::NotLoggedIn)?;
        self.tasks.cancel(RECONNECT_TASK);
        self.close_link();
        self.connect(&operator).await
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn status(&self) -> ConnectionStatus {
        let link_id = self.link.lock().as_ref().and_then(|l| l.id());
        let state = self.state.lock();
        ConnectionStatus {
            connected: state.connected,
            connecting: state.connecting,
            reconnect_attempts: state.attempts,
            exhausted: state.exhausted,
            last_pong_age: state.last_pong.map(|at| at.elapsed()),
            operator: state.operator.clone(),
            link_id,
        }
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        self.tasks.cancel_all();
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
    }
}
