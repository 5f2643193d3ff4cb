//! Registration message shapes exchanged with the management server.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Message type accepted by the server for conventional registration.
pub const REGISTER: &str = "register";

/// Message type accepted by the server for cloud-instance registration.
pub const REGISTER_CLOUD_VM: &str = "register-cloud-vm";

/// Outbound registration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "register")]
    Register(RegisterMessage),

    #[serde(rename = "register-cloud-vm")]
    RegisterCloudVm(RegisterCloudVmMessage),
}

impl OutboundMessage {
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::Register(_) => REGISTER,
            Self::RegisterCloudVm(_) => REGISTER_CLOUD_VM,
        }
    }
}

/// `register`: a conventionally identified host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterMessage {
    pub computer_title: Option<String>,
    pub account_name: Option<String>,
    pub registration_password: Option<String>,
    pub hostname: String,
}

/// `register-cloud-vm`: a cloud instance described by provider metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterCloudVmMessage {
    pub otp: Option<String>,
    pub hostname: String,
    pub local_hostname: String,
    pub public_hostname: String,
    pub instance_key: String,
    pub reservation_key: String,
    pub ramdisk_key: String,
    pub kernel_key: String,
    pub launch_index: u32,
    pub image_key: String,
    pub account_name: Option<String>,
    pub registration_password: Option<String>,
}

/// Inbound server message recognised by the registration engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// New ids issued for this host.
    #[serde(rename = "set-id")]
    SetId {
        id: String,
        #[serde(rename = "insecure-id")]
        insecure_id: String,
    },

    /// Registration outcome report.
    #[serde(rename = "registration")]
    Registration {
        #[serde(default)]
        info: Option<String>,
    },

    /// The server no longer knows this host.
    #[serde(rename = "unknown-id")]
    UnknownId,
}

impl ServerMessage {
    /// Parse a dispatched `{type, ...fields}` record; unrecognised shapes yield `None`.
    pub fn parse(raw: &serde_json::Value) -> Option<Self> {
        match serde_json::from_value(raw.clone()) {
            Ok(message) => Some(message),
            Err(e) => {
                debug!(error = %e, "ignoring unrecognised server message");
                None
            }
        }
    }
}
