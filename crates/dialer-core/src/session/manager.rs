use super::deferred::{DeferredOp, DeferredOps};
use super::identity::OperatorIdentity;
use crate::call::CallManager;
use crate::channel::ChannelManager;
use crate::config::SessionConfig;
use crate::error::{DialerError, DialerResult};
use crate::events::{ActivityLevel, DialerEvent, EventEmitter};
use crate::provider::CredentialProvider;
use crate::quality::{QualityEngine, QualityReport, SignalStrength};
use crate::scheduler::Scheduler;
use crate::view::DialerView;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

const HEALTH_TASK: &str = "session-health";
const DEVICE_TASK: &str = "session-device-refresh";
const TOKEN_TASK: &str = "session-token-refresh";
const REPLAY_TASK: &str = "session-deferred-replay";

const ACTIVATION_FAILED: &str = "Failed to activate dialer. Please try again.";

/// Session activation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationState {
    Idle,
    Activating,
    Active,
    Deactivating,
}

impl fmt::Display for ActivationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActivationState::Idle => "idle",
            ActivationState::Activating => "activating",
            ActivationState::Active => "active",
            ActivationState::Deactivating => "deactivating",
        };
        f.write_str(s)
    }
}

/// Snapshot of the session for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub state: ActivationState,
    pub operator: Option<String>,
    pub deferred: Vec<DeferredOp>,
    pub credential_age: Option<Duration>,
    pub activating: bool,
}

#[derive(Default)]
struct QualityAlerts {
    poor: bool,
    critical: bool,
}

struct SessionState {
    activation: ActivationState,
    identity: Option<OperatorIdentity>,
    credential_refreshed_at: Option<Instant>,
    alerts: QualityAlerts,
}

/// Held for the duration of one activation attempt
struct ActivationGuard<'a>(&'a AtomicBool);

impl<'a> ActivationGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ActivationGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Session resilience manager
///
/// Owns the operator identity and keeps the device registered, the channel
/// connected and the credential fresh. Maintenance that would disturb a call
/// in progress is deferred and replayed once the call is over.
pub struct SessionManager {
    config: SessionConfig,
    events: EventEmitter,
    provider: Arc<dyn CredentialProvider>,
    view: Arc<dyn DialerView>,
    calls: Arc<CallManager>,
    channel: Arc<ChannelManager>,
    quality: Arc<QualityEngine>,
    state: Mutex<SessionState>,
    deferred: DeferredOps,
    activating: AtomicBool,
    drain_lock: tokio::sync::Mutex<()>,
    loops: Scheduler,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        events: EventEmitter,
        provider: Arc<dyn CredentialProvider>,
        view: Arc<dyn DialerView>,
        calls: Arc<CallManager>,
        channel: Arc<ChannelManager>,
        quality: Arc<QualityEngine>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            events,
            provider,
            view,
            calls,
            channel,
            quality,
            state: Mutex::new(SessionState {
                activation: ActivationState::Idle,
                identity: None,
                credential_refreshed_at: None,
                alerts: QualityAlerts::default(),
            }),
            deferred: DeferredOps::new(),
            activating: AtomicBool::new(false),
            drain_lock: tokio::sync::Mutex::new(()),
            loops: Scheduler::new(),
            watcher: Mutex::new(None),
        })
    }

    fn set_state(&self, next: ActivationState) {
        let previous = {
            let mut state = self.state.lock();
            std::mem::replace(&mut state.activation, next)
        };
        if previous != next {
            debug!(%previous, %next, "session state changed");
            self.events.emit(DialerEvent::SessionStateChanged {
                previous,
                state: next,
            });
        }
    }

    fn operator_name(&self) -> Option<String> {
        self.state.lock().identity.as_ref().map(|i| i.name.clone())
    }

    // ---- login / logout ----

    /// Authenticate `name` and fetch its first credential
    pub async fn login(&self, name: &str) -> DialerResult<OperatorIdentity> {
        let name = name.trim();
        if name.is_empty() {
            let err = DialerError::validation("operator name", "must not be empty");
            self.view.show_error(&err.to_string());
            return Err(err);
        }
        if self.state() != ActivationState::Idle {
            self.deactivate().await;
        }

        let result = async {
            let record = self.provider.login(name).await?;
            let grant = self.provider.get_credential(name).await?;
            Ok::<_, DialerError>(OperatorIdentity::from_login(&record, grant))
        }
        .await;

        match result {
            Ok(identity) => {
                info!(operator = %identity.name, "operator logged in");
                self.state.lock().identity = Some(identity.clone());
                self.view.show_activation(&identity);
                Ok(identity)
            }
            Err(e) => {
                warn!(operator = %name, error = %e, "login failed");
                self.view.show_error(&e.to_string());
                Err(e)
            }
        }
    }

    /// Tear everything down and forget the operator
    pub async fn logout(&self) {
        self.set_state(ActivationState::Deactivating);
        self.perform_cleanup().await;
        self.quality.reset();

        let identity = {
            let mut state = self.state.lock();
            state.alerts = QualityAlerts::default();
            state.identity.take()
        };
        if let Some(identity) = identity {
            if let Err(e) = self.provider.logout(&identity.name).await {
                warn!(operator = %identity.name, error = %e, "logout request failed");
            }
            info!(operator = %identity.name, "operator logged out");
        }
        self.stop_watcher();
        self.set_state(ActivationState::Idle);
        self.view.show_login();
    }

    // ---- activation ----

    /// Bring the session up: clean slate, device, channel, history, loops.
    ///
    /// A second call while one is in flight returns
    /// [`DialerError::ActivationInProgress`] without doing anything.
    pub async fn activate(self: &Arc<Self>) -> DialerResult<()> {
        let Some(_guard) = ActivationGuard::acquire(&self.activating) else {
            debug!("activation already in progress");
            return Err(DialerError::ActivationInProgress);
        };
        let identity = self.state.lock().identity.clone().ok_or(DialerError::NotLoggedIn)?;

        info!(operator = %identity.name, "activating dialer");
        self.set_state(ActivationState::Activating);
        self.perform_cleanup().await;

        let result = async {
            self.calls.initialize_device(identity.token()).await?;
            self.channel.connect(&identity.name).await?;
            Ok::<_, DialerError>(())
        }
        .await;

        match result {
            Ok(()) => {
                self.refresh_history(&identity.name).await;
                self.state.lock().credential_refreshed_at = Some(Instant::now());
                self.start_loops();
                self.ensure_watcher();
                self.set_state(ActivationState::Active);
                self.view.show_app(&identity);
                self.events
                    .activity(ActivityLevel::Success, "Dialer activated successfully");
                info!(operator = %identity.name, "dialer activated");
                Ok(())
            }
            Err(e) => {
                error!(operator = %identity.name, error = %e, category = e.category(), "dialer activation failed");
                self.view.show_error(ACTIVATION_FAILED);
                self.view.enable_activation();
                self.perform_cleanup().await;
                self.set_state(ActivationState::Idle);
                Err(e)
            }
        }
    }

    /// Stop the loops and release device and channel; the operator stays
    /// logged in
    pub async fn deactivate(&self) {
        self.set_state(ActivationState::Deactivating);
        self.perform_cleanup().await;
        self.set_state(ActivationState::Idle);
        info!("dialer deactivated");
    }

    /// Idempotent; safe from any state
    async fn perform_cleanup(&self) {
        self.loops.cancel_all();
        self.calls.teardown().await;
        self.channel.disconnect();
        self.deferred.clear();
        self.state.lock().credential_refreshed_at = None;
        sleep(self.config.teardown_settle).await;
    }

    fn start_loops(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.loops.every(HEALTH_TASK, self.config.health_check_interval, move || {
            let weak = weak.clone();
            async move {
                if let Some(session) = weak.upgrade() {
                    session.run_health_check().await;
                }
            }
        });

        let weak = Arc::downgrade(self);
        self.loops.every(DEVICE_TASK, self.config.device_refresh_interval, move || {
            let weak = weak.clone();
            async move {
                if let Some(session) = weak.upgrade() {
                    session.run_device_refresh().await;
                }
            }
        });

        let weak = Arc::downgrade(self);
        self.loops.repeat_after(TOKEN_TASK, self.config.credential_refresh_interval, move || {
            let weak = weak.clone();
            async move {
                if let Some(session) = weak.upgrade() {
                    session.run_token_refresh().await;
                }
            }
        });
        debug!(
            health_ms = self.config.health_check_interval.as_millis() as u64,
            device_ms = self.config.device_refresh_interval.as_millis() as u64,
            token_ms = self.config.credential_refresh_interval.as_millis() as u64,
            "health monitoring started"
        );
    }

    // ---- maintenance ----

    fn defer(&self, op: DeferredOp) {
        if self.deferred.insert(op) {
            info!(%op, "maintenance deferred, call in progress");
            self.events.activity(ActivityLevel::Info, op.deferred_message());
            self.events.emit(DialerEvent::OperationDeferred { op });
        }
    }

    /// One health check pass. Does nothing disruptive while a call is up.
    pub async fn run_health_check(&self) {
        if !self.is_active() {
            return;
        }
        if self.calls.is_call_in_progress() {
            self.events
                .activity(ActivityLevel::Info, "Health check deferred - call in progress");
            return;
        }

        if !self.channel.is_connected() {
            self.events
                .activity(ActivityLevel::Warning, "Socket disconnected - reconnecting...");
            self.reconnect_channel().await;
        }
        if !self.is_active() {
            return;
        }

        let device_ready = self.calls.device_state().map(|s| s.is_ready()).unwrap_or(false);
        if !device_ready {
            self.events
                .activity(ActivityLevel::Warning, "Device not ready - re-registering...");
            if let Err(e) = self.calls.reregister_device().await {
                warn!(error = %e, "device re-registration during health check failed");
            }
        }

        self.execute_deferred().await;
    }

    async fn reconnect_channel(&self) {
        let Some(name) = self.operator_name() else { return };
        self.channel.disconnect();
        match self.channel.connect(&name).await {
            Ok(()) => self
                .events
                .activity(ActivityLevel::Success, "Socket reconnected successfully"),
            Err(e) => {
                warn!(error = %e, "socket reconnection failed");
                self.events.activity(ActivityLevel::Error, "Socket reconnection failed");
            }
        }
    }

    /// Re-register the device now, or defer it while a call is up
    pub async fn run_device_refresh(&self) {
        if !self.is_active() {
            return;
        }
        if self.calls.is_call_in_progress() {
            self.defer(DeferredOp::DeviceRefresh);
            return;
        }
        if let Err(e) = self.calls.reregister_device().await {
            warn!(error = %e, "device refresh failed");
        }
    }

    /// Fetch a new credential and push it into the device, or defer it while
    /// a call is up
    pub async fn run_token_refresh(&self) {
        let Some(name) = self.operator_name() else { return };
        if !self.is_active() {
            return;
        }
        if self.calls.is_call_in_progress() {
            self.defer(DeferredOp::TokenRefresh);
            return;
        }

        self.events.activity(ActivityLevel::Info, "Refreshing access token...");
        let result = async {
            let grant = self.provider.get_credential(&name).await?;
            let refreshed = {
                let mut state = self.state.lock();
                let current = state.identity.as_ref().ok_or(DialerError::NotLoggedIn)?;
                let refreshed = current.with_credential(grant);
                state.identity = Some(refreshed.clone());
                state.credential_refreshed_at = Some(Instant::now());
                refreshed
            };
            self.calls.update_credential(refreshed.token())?;
            Ok::<_, DialerError>(refreshed)
        }
        .await;

        match result {
            Ok(identity) => {
                info!(operator = %identity.name, "access token refreshed");
                self.events
                    .activity(ActivityLevel::Success, "Access token refreshed successfully");
                self.events.emit(DialerEvent::CredentialRefreshed {
                    issued_at: identity.credential.issued_at,
                });
            }
            Err(e) => {
                error!(operator = %name, error = %e, "token refresh failed");
                self.events.activity(ActivityLevel::Error, "Token refresh failed");
            }
        }
    }

    /// Drain the deferred set and run each operation once. Drains never
    /// overlap; anything re-deferred meanwhile waits for the next drain.
    pub async fn execute_deferred(&self) {
        let _drain = self.drain_lock.lock().await;
        let ops = self.deferred.drain();
        if ops.is_empty() {
            return;
        }
        info!(?ops, "replaying deferred maintenance");
        self.events.emit(DialerEvent::DeferredReplayed { ops: ops.clone() });
        for op in ops {
            match op {
                DeferredOp::TokenRefresh => self.run_token_refresh().await,
                DeferredOp::DeviceRefresh => self.run_device_refresh().await,
            }
        }
    }

    async fn refresh_history(&self, name: &str) {
        match self.provider.get_call_history(name, self.config.history_limit).await {
            Ok(history) => self.view.update_call_history(&history),
            Err(e) => debug!(operator = %name, error = %e, "call history unavailable"),
        }
    }

    // ---- bus watcher ----

    fn ensure_watcher(self: &Arc<Self>) {
        let mut watcher = self.watcher.lock();
        if watcher.as_ref().is_some_and(|w| !w.is_finished()) {
            return;
        }
        let mut rx = self.events.subscribe();
        let weak = Arc::downgrade(self);
        *watcher = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let Some(session) = weak.upgrade() else { break };
                        session.handle_event(event).await;
                    }
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "session watcher lagged"),
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }

    fn stop_watcher(&self) {
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.abort();
        }
    }

    async fn handle_event(self: &Arc<Self>, event: DialerEvent) {
        match event {
            DialerEvent::CallEnded { .. } => self.on_call_ended().await,
            DialerEvent::QualityChanged { report } => self.check_quality(&report),
            _ => {}
        }
    }

    async fn on_call_ended(self: &Arc<Self>) {
        self.calls.post_call_cleanup().await;
        if !self.is_active() {
            return;
        }
        if let Some(name) = self.operator_name() {
            self.refresh_history(&name).await;
        }

        let weak = Arc::downgrade(self);
        self.loops.after(REPLAY_TASK, self.config.deferred_replay_delay, move || async move {
            if let Some(session) = weak.upgrade() {
                session.execute_deferred().await;
            }
        });
    }

    /// Operator warnings on the way down, once per crossing
    fn check_quality(&self, report: &QualityReport) {
        let in_call = self.calls.current_call().is_some();
        let (raise_poor, raise_critical) = {
            let mut state = self.state.lock();
            if state.identity.is_none() {
                return;
            }
            let poor = report.strength == SignalStrength::Poor;
            let critical = in_call && report.scores.overall <= 2;
            let raise = (poor && !state.alerts.poor, critical && !state.alerts.critical);
            state.alerts = QualityAlerts { poor, critical };
            raise
        };
        if raise_poor {
            self.events.activity(
                ActivityLevel::Warning,
                "Poor signal quality detected - call performance may be affected",
            );
        }
        if raise_critical {
            self.events.activity(
                ActivityLevel::Error,
                "Critical signal quality - consider switching networks",
            );
        }
    }

    // ---- queries ----

    pub fn state(&self) -> ActivationState {
        self.state.lock().activation
    }

    pub fn is_active(&self) -> bool {
        self.state() == ActivationState::Active
    }

    pub fn is_activating(&self) -> bool {
        self.activating.load(Ordering::Acquire)
    }

    pub fn identity(&self) -> Option<OperatorIdentity> {
        self.state.lock().identity.clone()
    }

    pub fn deferred_ops(&self) -> Vec<DeferredOp> {
        self.deferred.snapshot()
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.state.lock();
        SessionStatus {
            state: state.activation,
            operator: state.identity.as_ref().map(|i| i.name.clone()),
            deferred: self.deferred.snapshot(),
            credential_age: state.credential_refreshed_at.map(|at| at.elapsed()),
            activating: self.is_activating(),
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.loops.cancel_all();
        self.stop_watcher();
    }
}
