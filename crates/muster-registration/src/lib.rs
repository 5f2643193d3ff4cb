//! Client-side registration engine for the muster fleet agent.
//!
//! Decides whether a managed host needs credentials from the management
//! server, builds the registration request that fits the host (bare
//! metal/VM or cloud instance), and reconciles the local identity with the
//! server's answers.
//!
//! - [`RegistrationHandler`]: the protocol state machine
//! - [`CloudMetadataResolver`]: cloud metadata fetch with fallback tiers
//! - [`is_cloud_managed`]: provisioning-time cloud detection
//! - [`Identity`]: issued ids plus host-supplied description
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use muster_registration::{
//!     Collaborators, Identity, MemoryIdentityStore, RegistrationConfig, RegistrationHandler,
//! };
//!
//! # async fn example(broker: Collaborators) -> Result<(), muster_registration::RegistrationError> {
//! let config = RegistrationConfig::default().with_account("onward");
//! let identity = Identity::from_config(&config, Arc::new(MemoryIdentityStore::new()))?;
//! let mut handler = RegistrationHandler::new(identity.into_shared(), broker);
//!
//! // Resolves once the server answers with `set-id`.
//! let done = handler.register();
//! # drop(done);
//! # Ok(())
//! # }
//! ```
//!
//! The message transport, message store, event dispatcher and ping service
//! are the host's; they plug in through the traits in [`broker`] and
//! [`events`].

pub mod bpickle;
pub mod broker;
pub mod config;
pub mod detect;
pub mod error;
pub mod events;
pub mod handler;
pub mod identity;
pub mod messages;
pub mod metadata;
pub mod pending;

// Re-export main types
pub use broker::{EndpointSink, Exchanger, MessageStore};
pub use config::{ConfigStore, FileConfigStore, RegistrationConfig};
pub use detect::{is_cloud_managed, is_cloud_managed_at};
pub use error::{FetchError, MetadataError, RegistrationError, RegistrationResult};
pub use events::{EventBus, EventSink, LifecycleEvent, RegistrationEvent};
pub use handler::{Collaborators, RegistrationHandler, RegistrationState};
pub use identity::{
    FileIdentityStore, Identity, IdentityStore, MemoryIdentityStore, PersistedIds, SharedIdentity,
};
pub use messages::{
    OutboundMessage, RegisterCloudVmMessage, RegisterMessage, ServerMessage, REGISTER,
    REGISTER_CLOUD_VM,
};
pub use metadata::{
    CloudMetadata, CloudMetadataResolver, HttpMetadataFetcher, InstanceMetadata, MetadataFetcher,
    UserData, METADATA_API_BASE,
};
pub use pending::{PendingRegistration, RegistrationFuture};
