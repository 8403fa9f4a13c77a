use super::state::{Call, CallDirection, CallId, CallStatus, EndReason};
use super::stats::parse_stats;
use crate::config::CallConfig;
use crate::device::{
    CallEvent, CallHandle, CallSession, DeviceEvent, DeviceFactory, DeviceOptions, DeviceState,
    TelephonyDevice,
};
use crate::error::{DialerError, DialerResult};
use crate::events::{ActivityLevel, DialerEvent, EventEmitter};
use crate::quality::classify;
use crate::scheduler::Scheduler;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

const STATS_TASK: &str = "call-stats";
const TIMER_TASK: &str = "call-timer";

const DTMF_DIGITS: &str = "0123456789*#ABCDabcd";

struct ActiveCall {
    call: Call,
    handle: Arc<dyn CallHandle>,
    listener: Option<JoinHandle<()>>,
}

/// Call lifecycle state machine
///
/// Owns the telephony device and the single call it is handling. Device and
/// call events are translated into [`DialerEvent`]s; nothing outside this type
/// mutates the call record.
pub struct CallManager {
    config: CallConfig,
    events: EventEmitter,
    factory: Arc<dyn DeviceFactory>,
    device: Mutex<Option<Arc<dyn TelephonyDevice>>>,
    device_listener: Mutex<Option<JoinHandle<()>>>,
    current: Mutex<Option<ActiveCall>>,
    call_tasks: Scheduler,
}

impl CallManager {
    pub fn new(config: CallConfig, events: EventEmitter, factory: Arc<dyn DeviceFactory>) -> Arc<Self> {
        Arc::new(Self {
            config,
            events,
            factory,
            device: Mutex::new(None),
            device_listener: Mutex::new(None),
            current: Mutex::new(None),
            call_tasks: Scheduler::new(),
        })
    }

    // ---- device lifecycle ----

    /// Tear down any existing device, then create and register a new one
    pub async fn initialize_device(self: &Arc<Self>, token: &str) -> DialerResult<()> {
        self.teardown().await;

        let options = DeviceOptions::from(&self.config);
        let (device, device_events) = self.factory.create(token, &options).await.map_err(|e| {
            error!(error = %e, "failed to create telephony device");
            e
        })?;
        *self.device.lock() = Some(device.clone());
        self.spawn_device_listener(device_events);

        device.register().await.map_err(|e| {
            error!(error = %e, "device registration failed");
            self.events.emit(DialerEvent::DeviceError { message: e.to_string() });
            e
        })?;
        info!(codecs = ?options.codec_preferences, "telephony device registered");
        Ok(())
    }

    fn spawn_device_listener(self: &Arc<Self>, mut rx: mpsc::UnboundedReceiver<DeviceEvent>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let listener = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(manager) = weak.upgrade() else { break };
                manager.handle_device_event(event);
            }
            debug!("device event feed closed");
        });
        if let Some(previous) = self.device_listener.lock().replace(listener) {
            previous.abort();
        }
    }

    fn handle_device_event(self: &Arc<Self>, event: DeviceEvent) {
        match event {
            DeviceEvent::Ready => {
                info!("telephony device ready");
                self.events.emit(DialerEvent::DeviceReady);
            }
            DeviceEvent::Error { message } => {
                error!(%message, "telephony device error");
                self.events.emit(DialerEvent::DeviceError { message });
            }
            DeviceEvent::Incoming(session) => {
                if let Err(e) = self.accept_offer(session) {
                    error!(error = %e, "failed to take incoming call");
                }
            }
            DeviceEvent::Connect { call_sid } => {
                if let Some(id) = self.matching_call(call_sid.as_deref()) {
                    self.mark_connected(id);
                }
            }
            DeviceEvent::Disconnect { call_sid } => {
                if let Some(id) = self.matching_call(call_sid.as_deref()) {
                    self.finish(id, EndReason::Disconnected);
                }
            }
        }
    }

    fn device(&self) -> DialerResult<Arc<dyn TelephonyDevice>> {
        self.device.lock().clone().ok_or(DialerError::DeviceNotInitialized)
    }

    pub fn device_state(&self) -> Option<DeviceState> {
        self.device.lock().as_ref().map(|d| d.state())
    }

    /// Push a fresh credential into the live device; calls are not touched
    pub fn update_credential(&self, token: &str) -> DialerResult<()> {
        self.device()?.update_credential(token)
    }

    /// Register again if the device dropped its registration
    pub async fn reregister_device(&self) -> DialerResult<()> {
        let device = self.device()?;
        match device.state() {
            DeviceState::Unregistered => match device.register().await {
                Ok(()) => {
                    info!("device re-registered");
                    self.events
                        .activity(ActivityLevel::Success, "Device re-registered successfully");
                    Ok(())
                }
                Err(e) => {
                    warn!(error = %e, "device re-registration failed");
                    self.events.activity(ActivityLevel::Error, "Device re-registration failed");
                    Err(e)
                }
            },
            DeviceState::Registered => {
                self.events
                    .activity(ActivityLevel::Info, "Device already registered and ready");
                Ok(())
            }
            DeviceState::Registering => {
                debug!("device registration already in flight");
                Ok(())
            }
            DeviceState::Destroyed => Err(DialerError::DeviceNotInitialized),
        }
    }

    /// Restore registration after a call ended.
    ///
    /// Runs after the ended call was already detached, so it leaves any call
    /// installed since then alone.
    pub async fn post_call_cleanup(&self) {
        let Ok(device) = self.device() else { return };
        if device.state() == DeviceState::Unregistered {
            info!("device unregistered after call, registering again");
            if let Err(e) = device.register().await {
                warn!(error = %e, "post-call registration failed");
                self.events
                    .activity(ActivityLevel::Warning, "Device re-registration after call failed");
            }
        }
    }

    /// Drop the call, unregister and destroy the device. Safe to repeat.
    pub async fn teardown(&self) {
        self.cleanup();

        if let Some(listener) = self.device_listener.lock().take() {
            listener.abort();
        }
        let device = self.device.lock().take();
        let Some(device) = device else { return };

        if device.state() == DeviceState::Registered {
            if let Err(e) = device.unregister().await {
                warn!(error = %e, "unregister during teardown failed");
            }
            sleep(self.config.teardown_settle).await;
        }
        device.destroy();
        sleep(self.config.teardown_settle).await;
        debug!("telephony device destroyed");
    }

    // ---- call lifecycle ----

    fn accept_offer(self: &Arc<Self>, session: CallSession) -> DialerResult<CallId> {
        let from = session
            .handle
            .remote_party()
            .unwrap_or_else(|| "Unknown Number".to_string());
        let id = self.install_call(session, CallDirection::Inbound, from.clone())?;
        info!(call_id = %id, %from, "incoming call");
        self.events.emit(DialerEvent::CallIncoming {
            call_id: id,
            from: from.clone(),
            direction: CallDirection::Inbound,
        });
        self.events.emit(DialerEvent::NotificationRequested { call_id: id, from });
        Ok(id)
    }

    /// Place an outbound call
    pub async fn dial(self: &Arc<Self>, target: &str) -> DialerResult<CallId> {
        let target = target.trim();
        if target.is_empty() {
            return Err(DialerError::validation("call target", "must not be empty"));
        }
        if let Some(existing) = self.current_call() {
            return Err(DialerError::CallAlreadyExists {
                call_id: existing.id.to_string(),
            });
        }
        let session = self.device()?.connect(target).await?;
        let id = self.install_call(session, CallDirection::Outbound, target.to_string())?;
        info!(call_id = %id, %target, "outbound call placed");
        Ok(id)
    }

    fn install_call(
        self: &Arc<Self>,
        session: CallSession,
        direction: CallDirection,
        counterpart: String,
    ) -> DialerResult<CallId> {
        if let Some(stale) = self.current_call() {
            warn!(call_id = %stale.id, "new call while one exists, ending the previous call");
            self.finish(stale.id, EndReason::Disconnected);
        }

        let CallSession { handle, events } = session;
        let mut call = Call::new(counterpart, direction, handle.call_sid());
        let status = match direction {
            CallDirection::Inbound => CallStatus::Incoming,
            CallDirection::Outbound => CallStatus::Connecting,
        };
        let previous = call.transition(status)?;
        let id = call.id;

        *self.current.lock() = Some(ActiveCall {
            call,
            handle,
            listener: None,
        });
        let listener = self.spawn_call_listener(id, events);
        match self.current.lock().as_mut() {
            Some(active) if active.call.id == id => active.listener = Some(listener),
            // ended before the listener was attached
            _ => listener.abort(),
        }

        self.start_call_tasks(id);
        self.events.emit(DialerEvent::CallStateChanged {
            call_id: id,
            previous,
            status,
            duration_secs: 0,
        });
        Ok(id)
    }

    fn spawn_call_listener(self: &Arc<Self>, id: CallId, mut rx: mpsc::UnboundedReceiver<CallEvent>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(manager) = weak.upgrade() else { break };
                manager.handle_call_event(id, event);
            }
        })
    }

    fn handle_call_event(&self, id: CallId, event: CallEvent) {
        if self.current_call().map(|c| c.id) != Some(id) {
            debug!(call_id = %id, ?event, "event for a call that is gone");
            return;
        }
        match event {
            CallEvent::Cancel => self.finish(id, EndReason::Cancelled),
            CallEvent::Disconnect => self.finish(id, EndReason::Disconnected),
            CallEvent::Reject => self.finish(id, EndReason::Rejected),
            CallEvent::Accept => self.mark_connected(id),
            CallEvent::Error { message } => {
                error!(call_id = %id, %message, "call error");
                self.finish(id, EndReason::Error);
            }
            CallEvent::Warning { name, sample } => {
                let warning = classify(&name);
                warn!(call_id = %id, warning = %name, severity = %warning.severity, "transport warning");
                self.events.emit(DialerEvent::CallWarning {
                    call_id: id,
                    name,
                    severity: warning.severity,
                    message: warning.message,
                    sample,
                });
            }
            CallEvent::WarningCleared { name } => {
                debug!(call_id = %id, warning = %name, "transport warning cleared");
                self.events.emit(DialerEvent::CallWarningCleared { call_id: id, name });
            }
        }
    }

    fn matching_call(&self, call_sid: Option<&str>) -> Option<CallId> {
        let current = self.current.lock();
        let active = current.as_ref()?;
        match (call_sid, active.call.call_sid.as_deref()) {
            (Some(wanted), Some(have)) if wanted != have => None,
            _ => Some(active.call.id),
        }
    }

    fn mark_connected(&self, id: CallId) {
        let previous = {
            let mut current = self.current.lock();
            let Some(active) = current.as_mut().filter(|a| a.call.id == id) else {
                return;
            };
            if active.call.status == CallStatus::Active {
                return;
            }
            match active.call.transition(CallStatus::Active) {
                Ok(previous) => previous,
                Err(e) => {
                    warn!(call_id = %id, error = %e, "ignoring connect");
                    return;
                }
            }
        };
        info!(call_id = %id, "call connected");
        self.events.emit(DialerEvent::CallStateChanged {
            call_id: id,
            previous,
            status: CallStatus::Active,
            duration_secs: 0,
        });
        self.events.emit(DialerEvent::CallConnected { call_id: id });
        self.events.emit(DialerEvent::NotificationCleared);
    }

    /// Detach listeners and timers, then clear the record
    fn detach(&self, id: Option<CallId>) -> Option<Call> {
        let mut current = self.current.lock();
        if let Some(wanted) = id {
            if current.as_ref().map(|a| a.call.id) != Some(wanted) {
                return None;
            }
        }
        if let Some(listener) = current.as_mut().and_then(|a| a.listener.take()) {
            listener.abort();
        }
        self.call_tasks.cancel_all();
        current.take().map(|active| active.call)
    }

    fn finish(&self, id: CallId, reason: EndReason) {
        let Some(mut call) = self.detach(Some(id)) else {
            return;
        };
        let duration_secs = call.duration_secs();
        let previous = match call.transition(CallStatus::Ended) {
            Ok(previous) => previous,
            Err(e) => {
                warn!(call_id = %id, error = %e, "call ended from unexpected state");
                call.status
            }
        };
        info!(call_id = %id, %reason, duration_secs, "call ended");

        self.events.emit(DialerEvent::CallStateChanged {
            call_id: id,
            previous,
            status: CallStatus::Ended,
            duration_secs,
        });
        self.events.emit(DialerEvent::CallEnded {
            call_id: id,
            reason,
            duration_secs,
        });
        self.events.emit(DialerEvent::CallStateChanged {
            call_id: id,
            previous: CallStatus::Ended,
            status: CallStatus::None,
            duration_secs,
        });
        self.events.emit(DialerEvent::NotificationCleared);
    }

    /// Stop timers, remove listeners and clear mute. A no-op without a call.
    pub fn cleanup(&self) {
        if let Some(call) = self.detach(None) {
            debug!(call_id = %call.id, "call state cleared");
        }
    }

    fn target(&self, call_id: Option<CallId>) -> DialerResult<(CallId, Arc<dyn CallHandle>)> {
        let current = self.current.lock();
        let active = current.as_ref().ok_or(DialerError::NoActiveCall)?;
        if let Some(wanted) = call_id {
            if wanted != active.call.id {
                return Err(DialerError::CallNotFound {
                    call_id: wanted.to_string(),
                });
            }
        }
        Ok((active.call.id, active.handle.clone()))
    }

    /// Accept the current call. The call is marked active right away rather
    /// than waiting for the transport to confirm.
    pub fn answer(&self, call_id: Option<CallId>) -> DialerResult<()> {
        let (id, handle) = self.target(call_id)?;
        handle.accept()?;
        self.mark_connected(id);
        Ok(())
    }

    pub fn reject(&self, call_id: Option<CallId>) -> DialerResult<()> {
        let (id, handle) = self.target(call_id)?;
        if let Err(e) = handle.reject() {
            warn!(call_id = %id, error = %e, "transport reject failed");
        }
        self.finish(id, EndReason::Rejected);
        Ok(())
    }

    pub fn hangup(&self, call_id: Option<CallId>) -> DialerResult<()> {
        let (id, handle) = self.target(call_id)?;
        if let Err(e) = handle.disconnect() {
            warn!(call_id = %id, error = %e, "transport disconnect failed");
        }
        self.finish(id, EndReason::Hangup);
        Ok(())
    }

    /// Flip mute; returns the new state, or `false` without a call
    pub fn toggle_mute(&self) -> bool {
        let (id, handle, muted) = {
            let mut current = self.current.lock();
            let Some(active) = current.as_mut() else {
                return false;
            };
            active.call.muted = !active.call.muted;
            (active.call.id, active.handle.clone(), active.call.muted)
        };
        if let Err(e) = handle.mute(muted) {
            warn!(call_id = %id, error = %e, "transport mute failed");
        }
        self.events.emit(DialerEvent::CallMuteChanged { call_id: id, muted });
        muted
    }

    /// Send one DTMF digit; only while the call is active
    pub fn send_tone(&self, digit: char) -> bool {
        if !DTMF_DIGITS.contains(digit) {
            debug!(%digit, "not a DTMF digit");
            return false;
        }
        let (id, handle) = {
            let current = self.current.lock();
            match current.as_ref() {
                Some(active) if active.call.status == CallStatus::Active => {
                    (active.call.id, active.handle.clone())
                }
                _ => return false,
            }
        };
        match handle.send_digits(&digit.to_string()) {
            Ok(()) => {
                self.events.emit(DialerEvent::ToneSent { call_id: id, digit });
                true
            }
            Err(e) => {
                warn!(call_id = %id, error = %e, "failed to send tone");
                false
            }
        }
    }

    fn start_call_tasks(self: &Arc<Self>, id: CallId) {
        let weak = Arc::downgrade(self);
        self.call_tasks.every(TIMER_TASK, self.config.timer_interval, move || {
            let weak = weak.clone();
            async move {
                let Some(manager) = weak.upgrade() else { return };
                let Some(call) = manager.current_call().filter(|c| c.id == id) else {
                    return;
                };
                let elapsed_secs = call.duration_secs();
                manager.events.emit(DialerEvent::CallTimerTick {
                    call_id: id,
                    elapsed_secs,
                    display: super::state::format_duration(elapsed_secs),
                });
            }
        });

        let weak = Arc::downgrade(self);
        self.call_tasks.every(STATS_TASK, self.config.stats_interval, move || {
            let weak = weak.clone();
            async move {
                let Some(manager) = weak.upgrade() else { return };
                let handle = {
                    let current = manager.current.lock();
                    match current.as_ref() {
                        Some(a) if a.call.id == id && a.call.status == CallStatus::Active => a.handle.clone(),
                        _ => return,
                    }
                };
                match handle.get_stats().await {
                    Ok(reports) => {
                        if let Some(sample) = parse_stats(&reports) {
                            manager.events.emit(DialerEvent::CallStats { call_id: id, sample });
                        }
                    }
                    Err(e) => debug!(call_id = %id, error = %e, "stats collection failed"),
                }
            }
        });
    }

    // ---- queries ----

    pub fn current_call(&self) -> Option<Call> {
        self.current.lock().as_ref().map(|a| a.call.clone())
    }

    /// `CallStatus::None` when there is no call
    pub fn status(&self) -> CallStatus {
        self.current
            .lock()
            .as_ref()
            .map(|a| a.call.status)
            .unwrap_or(CallStatus::None)
    }

    pub fn is_call_in_progress(&self) -> bool {
        self.status().is_in_progress()
    }

    pub fn is_muted(&self) -> bool {
        self.current.lock().as_ref().map(|a| a.call.muted).unwrap_or(false)
    }
}
