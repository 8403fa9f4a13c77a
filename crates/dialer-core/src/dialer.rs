//! Composition root
//!
//! [`Dialer`] wires the call, channel, quality and session components onto
//! one event bus and exposes the operator-facing commands.
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use rvoip_dialer_core::{DialerBuilder, DialerConfig, DeviceFactory, SignalingTransport};
//! # async fn run(factory: Arc<dyn DeviceFactory>, transport: Arc<dyn SignalingTransport>) -> rvoip_dialer_core::DialerResult<()> {
//! let dialer = DialerBuilder::new(DialerConfig::default())
//!     .device_factory(factory)
//!     .signaling(transport)
//!     .build()?;
//! dialer.start();
//! dialer.login("alice").await?;
//! dialer.activate().await?;
//! # Ok(())
//! # }
//! ```

use crate::call::{Call, CallId, CallManager, CallStatus};
use crate::channel::{wire, ChannelManager, ConnectionStatus, SignalingTransport};
use crate::config::DialerConfig;
use crate::device::DeviceFactory;
use crate::error::{DialerError, DialerResult};
use crate::events::{EventEmitter, EventStream};
use crate::provider::{CredentialProvider, HttpCredentialProvider};
use crate::quality::{NetworkInfoSource, QualityEngine, QualityReport, StaticNetworkInfo};
use crate::session::{OperatorIdentity, SessionManager, SessionStatus};
use crate::view::{ActivityLog, DialerView, HeadlessView, Notifier, SilentNotifier, ViewBridge};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Builder for [`Dialer`]
pub struct DialerBuilder {
    config: DialerConfig,
    device_factory: Option<Arc<dyn DeviceFactory>>,
    transport: Option<Arc<dyn SignalingTransport>>,
    provider: Option<Arc<dyn CredentialProvider>>,
    view: Option<Arc<dyn DialerView>>,
    notifier: Option<Arc<dyn Notifier>>,
    network: Option<Arc<dyn NetworkInfoSource>>,
}

impl DialerBuilder {
    pub fn new(config: DialerConfig) -> Self {
        Self {
            config,
            device_factory: None,
            transport: None,
            provider: None,
            view: None,
            notifier: None,
            network: None,
        }
    }

    /// Telephony capability (required)
    pub fn device_factory(mut self, factory: Arc<dyn DeviceFactory>) -> Self {
        self.device_factory = Some(factory);
        self
    }

    /// Signaling channel transport (required)
    pub fn signaling(mut self, transport: Arc<dyn SignalingTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Credential service; defaults to HTTP against `service_url`
    pub fn provider(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn view(mut self, view: Arc<dyn DialerView>) -> Self {
        self.view = Some(view);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn network_info(mut self, source: Arc<dyn NetworkInfoSource>) -> Self {
        self.network = Some(source);
        self
    }

    pub fn build(self) -> DialerResult<Dialer> {
        self.config.validate()?;
        let factory = self
            .device_factory
            .ok_or_else(|| DialerError::config("device_factory", "a telephony device factory is required"))?;
        let transport = self
            .transport
            .ok_or_else(|| DialerError::config("signaling", "a signaling transport is required"))?;
        let provider: Arc<dyn CredentialProvider> = match self.provider {
            Some(provider) => provider,
            None => Arc::new(HttpCredentialProvider::new(self.config.service_url.clone())?),
        };
        let view = self.view.unwrap_or_else(|| Arc::new(HeadlessView));
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(SilentNotifier));
        let network = self
            .network
            .unwrap_or_else(|| Arc::new(StaticNetworkInfo::default()));

        let events = EventEmitter::new(self.config.event_capacity);
        let calls = CallManager::new(self.config.call.clone(), events.clone(), factory);
        let channel = ChannelManager::new(self.config.channel.clone(), events.clone(), transport);
        let quality = QualityEngine::new(self.config.quality.clone(), events.clone(), network);
        let session = SessionManager::new(
            self.config.session.clone(),
            events.clone(),
            provider,
            view.clone(),
            calls.clone(),
            channel.clone(),
            quality.clone(),
        );
        let bridge = ViewBridge::new(view, notifier, ActivityLog::new(self.config.activity_log_capacity));

        Ok(Dialer {
            config: self.config,
            events,
            calls,
            channel,
            quality,
            session,
            bridge,
        })
    }
}

/// The assembled dialer
pub struct Dialer {
    config: DialerConfig,
    events: EventEmitter,
    calls: Arc<CallManager>,
    channel: Arc<ChannelManager>,
    quality: Arc<QualityEngine>,
    session: Arc<SessionManager>,
    bridge: Arc<ViewBridge>,
}

impl Dialer {
    /// Start the view bridge and signal monitoring. Call once from inside the
    /// runtime before logging in.
    pub fn start(&self) {
        self.bridge.start(&self.events);
        self.quality.start();
        info!(version = crate::VERSION, "dialer started");
    }

    pub async fn login(&self, name: &str) -> DialerResult<OperatorIdentity> {
        self.session.login(name).await
    }

    pub async fn activate(&self) -> DialerResult<()> {
        self.session.activate().await
    }

    pub async fn deactivate(&self) {
        self.session.deactivate().await
    }

    pub async fn logout(&self) {
        self.session.logout().await
    }

    /// Stop everything and release the device and channel
    pub async fn shutdown(&self) {
        self.session.deactivate().await;
        self.quality.stop();
        self.bridge.stop();
        debug!("dialer shut down");
    }

    // ---- call commands ----

    fn notify_server(&self, event: &str, call: Option<Call>, extra: Option<(&str, &str)>) {
        let Some(identity) = self.session.identity() else { return };
        let mut payload = json!({
            "clientName": identity.name,
            "callSid": call.and_then(|c| c.call_sid),
        });
        if let (Some((key, value)), Some(map)) = (extra, payload.as_object_mut()) {
            map.insert(key.to_string(), json!(value));
        }
        self.channel.emit(event, payload);
    }

    pub fn answer(&self, call_id: Option<CallId>) -> DialerResult<()> {
        let call = self.calls.current_call();
        self.calls.answer(call_id)?;
        self.notify_server(wire::CALL_ANSWERED, call, None);
        Ok(())
    }

    pub fn reject(&self, call_id: Option<CallId>) -> DialerResult<()> {
        let call = self.calls.current_call();
        self.calls.reject(call_id)?;
        self.notify_server(wire::CALL_REJECTED, call, None);
        Ok(())
    }

    pub fn hangup(&self, call_id: Option<CallId>) -> DialerResult<()> {
        let call = self.calls.current_call();
        self.calls.hangup(call_id)?;
        self.notify_server(wire::CALL_ENDED, call, Some(("reason", "user_hangup")));
        Ok(())
    }

    pub async fn dial(&self, target: &str) -> DialerResult<CallId> {
        self.calls.dial(target).await
    }

    pub fn toggle_mute(&self) -> bool {
        self.calls.toggle_mute()
    }

    pub fn send_tone(&self, digit: char) -> bool {
        self.calls.send_tone(digit)
    }

    // ---- queries ----

    pub fn config(&self) -> &DialerConfig {
        &self.config
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<crate::events::DialerEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_stream(&self) -> EventStream {
        self.events.subscribe_stream()
    }

    pub fn calls(&self) -> &Arc<CallManager> {
        &self.calls
    }

    pub fn channel(&self) -> &Arc<ChannelManager> {
        &self.channel
    }

    pub fn quality(&self) -> &Arc<QualityEngine> {
        &self.quality
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn activity_log(&self) -> &ActivityLog {
        self.bridge.activity_log()
    }

    pub fn call_status(&self) -> CallStatus {
        self.calls.status()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.channel.status()
    }

    pub fn session_status(&self) -> SessionStatus {
        self.session.status()
    }

    pub fn quality_report(&self) -> QualityReport {
        self.quality.report()
    }
}
