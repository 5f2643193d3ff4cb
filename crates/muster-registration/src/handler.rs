//! The registration state machine.
//!
//! Driven by host lifecycle events ([`LifecycleEvent`]) and inbound server
//! messages ([`ServerMessage`]). All transitions run on the caller's task;
//! the shared [`Identity`](crate::Identity) is the only state touched from
//! other contexts and sits behind a lock.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::broker::{EndpointSink, Exchanger, MessageStore};
use crate::config::ConfigStore;
use crate::error::{RegistrationError, RegistrationResult};
use crate::events::{EventSink, LifecycleEvent, RegistrationEvent};
use crate::identity::{Identity, SharedIdentity};
use crate::messages::{
    OutboundMessage, RegisterCloudVmMessage, RegisterMessage, ServerMessage, REGISTER,
    REGISTER_CLOUD_VM,
};
use crate::metadata::{CloudMetadata, CloudMetadataResolver};
use crate::pending::{PendingRegistration, RegistrationFuture};

/// `info` value of a `registration` message reporting bad credentials.
const UNKNOWN_ACCOUNT: &str = "unknown-account";

/// Where the host stands with the management server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// No secure id and nothing in flight.
    Unregistered,
    /// A registration request is queued or awaiting the server's reply.
    Pending,
    /// A secure id is held.
    Registered,
}

/// The broker services the handler talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub message_store: Arc<dyn MessageStore>,
    pub exchanger: Arc<dyn Exchanger>,
    pub events: Arc<dyn EventSink>,
    pub endpoints: Arc<dyn EndpointSink>,
    pub config_store: Arc<dyn ConfigStore>,
}

/// Client-side registration protocol engine.
pub struct RegistrationHandler {
    identity: SharedIdentity,
    broker: Collaborators,
    /// Present iff the host registers as a cloud instance.
    cloud: Option<CloudMetadataResolver>,
    cloud_metadata: Option<CloudMetadata>,
    pending: PendingRegistration,
    hostname: Option<String>,
}

impl RegistrationHandler {
    /// Handler for a conventionally identified host.
    pub fn new(identity: SharedIdentity, broker: Collaborators) -> Self {
        Self {
            identity,
            broker,
            cloud: None,
            cloud_metadata: None,
            pending: PendingRegistration::default(),
            hostname: None,
        }
    }

    /// Register as a cloud instance, resolving metadata with `resolver`.
    pub fn with_cloud(mut self, resolver: CloudMetadataResolver) -> Self {
        self.cloud = Some(resolver);
        self
    }

    /// Report `hostname` instead of the local system hostname.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn is_cloud(&self) -> bool {
        self.cloud.is_some()
    }

    pub fn identity(&self) -> &SharedIdentity {
        &self.identity
    }

    /// Metadata from the last `run`, if in cloud mode and it has happened.
    pub fn cloud_metadata(&self) -> Option<&CloudMetadata> {
        self.cloud_metadata.as_ref()
    }

    pub fn state(&self) -> RegistrationState {
        if self.identity.read().unwrap().is_registered() {
            return RegistrationState::Registered;
        }
        let queued = self
            .broker
            .message_store
            .pending_messages()
            .iter()
            .any(|m| m["type"] == REGISTER || m["type"] == REGISTER_CLOUD_VM);
        if queued || self.pending.is_outstanding() {
            RegistrationState::Pending
        } else {
            RegistrationState::Unregistered
        }
    }

    /// Whether a registration message should go out with the next exchange.
    pub fn should_register(&self) -> bool {
        let identity = self.identity.read().unwrap();
        if identity.is_registered() {
            return false;
        }
        let store = &self.broker.message_store;
        if self.is_cloud() {
            store.accepts(REGISTER_CLOUD_VM)
        } else {
            identity.computer_title.is_some()
                && identity.account_name.is_some()
                && store.accepts(REGISTER)
        }
    }

    /// Route a lifecycle event to its transition.
    pub async fn dispatch(&mut self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Run => self.handle_run().await,
            LifecycleEvent::PreExchange => self.handle_pre_exchange(),
            LifecycleEvent::ExchangeDone => self.handle_exchange_done(),
        }
    }

    /// Startup: in cloud mode, resolve metadata and adopt any server URLs it carries.
    pub async fn handle_run(&mut self) {
        let Some(resolver) = &self.cloud else {
            return;
        };
        let metadata = resolver.resolve().await;

        if let Some(url) = &metadata.exchange_url {
            self.broker.endpoints.set_exchange_url(url);
            if let Err(e) = self.broker.config_store.set_exchange_url(url) {
                warn!(error = %e, "failed to persist exchange url");
            }
        }
        if let Some(url) = &metadata.ping_url {
            self.broker.endpoints.set_ping_url(url);
            if let Err(e) = self.broker.config_store.set_ping_url(url) {
                warn!(error = %e, "failed to persist ping url");
            }
        }

        self.cloud_metadata = Some(metadata);
    }

    /// Queue a registration message if one is due, replacing anything queued.
    pub fn handle_pre_exchange(&mut self) {
        let should_register = self.should_register();
        self.pending.mark_attempted(should_register);
        if !should_register {
            return;
        }

        match self.build_message() {
            Some(message) => {
                if let Err(e) = self.queue(&message) {
                    error!(error = %e, message_type = message.message_type(), "failed to queue registration message");
                }
            }
            None => self.broker.events.fire(RegistrationEvent::RegistrationFailed),
        }
    }

    /// Ask for an urgent exchange if registration became possible during this cycle.
    pub fn handle_exchange_done(&mut self) {
        if !self.pending.attempted_this_cycle() && self.should_register() {
            debug!("registration now possible, requesting urgent exchange");
            self.broker.exchanger.exchange();
        }
        self.pending.end_cycle();
    }

    /// Start a fresh registration: forget current ids and exchange now.
    ///
    /// Only the most recent caller's future observes the outcome; earlier
    /// unresolved futures yield [`RegistrationError::Superseded`].
    pub fn register(&mut self) -> RegistrationFuture {
        self.identity.write().unwrap().clear_ids();
        let future = self.pending.renew();
        self.broker.exchanger.exchange();
        future
    }

    /// Apply a dispatched `{type, ...fields}` record; unrecognised shapes are ignored.
    pub fn handle_raw_message(&mut self, raw: &serde_json::Value) {
        if let Some(message) = ServerMessage::parse(raw) {
            self.handle_message(message);
        }
    }

    pub fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::SetId { id, insecure_id } => {
                info!("server issued new ids");
                self.identity.write().unwrap().set_ids(id, insecure_id);
                self.broker.events.fire(RegistrationEvent::RegistrationDone);
                self.pending.resolve();
                self.broker
                    .events
                    .fire(RegistrationEvent::ResynchronizeClients);
            }
            ServerMessage::Registration { info } if info.as_deref() == Some(UNKNOWN_ACCOUNT) => {
                warn!("registration rejected: unknown account or invalid password");
                self.broker
                    .events
                    .fire(RegistrationEvent::RegistrationFailed);
                self.pending.reject(RegistrationError::InvalidCredentials);
            }
            ServerMessage::Registration { info } => {
                debug!(info = ?info, "ignoring registration message");
            }
            ServerMessage::UnknownId => {
                info!("server does not know this host, clearing ids");
                self.identity.write().unwrap().clear_ids();
            }
        }
    }

    fn queue(&self, message: &OutboundMessage) -> RegistrationResult<()> {
        let store = &self.broker.message_store;
        store.reset()?;
        store.add(message)
    }

    /// Pick the message for this attempt. `None` means registration cannot
    /// proceed with the data at hand.
    fn build_message(&self) -> Option<OutboundMessage> {
        let identity = self.identity.read().unwrap();

        if self.is_cloud() {
            let resolved = self
                .cloud_metadata
                .as_ref()
                .and_then(|m| m.instance.as_ref().map(|instance| (m, instance)));

            match resolved {
                Some((metadata, instance)) => {
                    if metadata.otp.is_some() {
                        info!("queueing message to register with OTP");
                    } else if let Some(account) = &identity.account_name {
                        info!(
                            "queueing message to register with account '{}' as a cloud instance",
                            account
                        );
                    } else {
                        warn!("no one-time password or account name for cloud registration");
                        return None;
                    }
                    return Some(OutboundMessage::RegisterCloudVm(RegisterCloudVmMessage {
                        otp: metadata.otp.clone(),
                        hostname: self.hostname(),
                        local_hostname: instance.local_hostname.clone(),
                        public_hostname: instance.public_hostname.clone(),
                        instance_key: instance.instance_key.clone(),
                        reservation_key: instance.reservation_key.clone(),
                        ramdisk_key: instance.ramdisk_key.clone(),
                        kernel_key: instance.kernel_key.clone(),
                        launch_index: instance.launch_index,
                        image_key: instance.image_key.clone(),
                        account_name: identity.account_name.clone(),
                        registration_password: identity.registration_password.clone(),
                    }));
                }
                None if identity.computer_title.is_some() => {
                    info!("cloud metadata unavailable, falling back to account registration");
                }
                None => {
                    warn!("cloud metadata unavailable and no computer title to fall back to");
                    return None;
                }
            }
        }

        Some(self.register_message(&identity))
    }

    fn register_message(&self, identity: &Identity) -> OutboundMessage {
        let with = if identity.registration_password.is_some() {
            "with"
        } else {
            "without"
        };
        info!(
            "queueing message to register with account '{}' {} a password",
            identity.account_name.as_deref().unwrap_or_default(),
            with
        );
        OutboundMessage::Register(RegisterMessage {
            computer_title: identity.computer_title.clone(),
            account_name: identity.account_name.clone(),
            registration_password: identity.registration_password.clone(),
            hostname: self.hostname(),
        })
    }

    fn hostname(&self) -> String {
        if let Some(hostname) = &self.hostname {
            return hostname.clone();
        }
        match hostname::get() {
            Ok(name) => name.to_string_lossy().into_owned(),
            Err(e) => {
                warn!(error = %e, "could not determine local hostname");
                "localhost".to_string()
            }
        }
    }
}
