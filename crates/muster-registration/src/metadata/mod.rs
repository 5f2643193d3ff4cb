//! Cloud instance metadata resolution.
//!
//! Two independent groups are fetched on startup:
//!
//! 1. **OTP data**: `/user-data` (bpickle) and the launch index. Any failure
//!    here only costs the one-time password; registration continues.
//! 2. **Instance metadata**: eight descriptors fetched concurrently. A single
//!    failure fails the whole group, and a cloud registration message can no
//!    longer be built.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::bpickle::{self, Value};
use crate::error::{FetchError, MetadataError};

mod fetch;
mod http;

pub use fetch::MetadataFetcher;
pub use http::HttpMetadataFetcher;

/// Default base URL of the instance metadata service.
pub const METADATA_API_BASE: &str = "http://169.254.169.254/latest";

pub(crate) const USER_DATA_PATH: &str = "/user-data";
pub(crate) const LAUNCH_INDEX_PATH: &str = "/meta-data/ami-launch-index";

/// Decoded cloud user-data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserData {
    pub otps: Option<Vec<String>>,
    pub exchange_url: Option<String>,
    pub ping_url: Option<String>,
}

impl UserData {
    /// Decode a bpickle dictionary.
    pub fn from_bpickle(raw: &[u8]) -> Result<Self, MetadataError> {
        let value = bpickle::loads(raw)?;
        if !value.is_dict() {
            return Err(MetadataError::Malformed {
                reason: format!("user data is a {}, expected dict", value),
            });
        }

        let otps = match value.get("otps") {
            None => None,
            Some(list) => {
                let items = list.as_seq().ok_or_else(|| MetadataError::Malformed {
                    reason: format!("otps is a {}, expected list", list),
                })?;
                let otps = items
                    .iter()
                    .map(|item| {
                        item.as_str()
                            .map(str::to_string)
                            .ok_or_else(|| MetadataError::Malformed {
                                reason: format!("otp entry is a {}, expected string", item),
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Some(otps)
            }
        };

        Ok(Self {
            otps,
            exchange_url: string_field(&value, "exchange-url")?,
            ping_url: string_field(&value, "ping-url")?,
        })
    }

    /// The one-time password belonging to `launch_index`.
    pub fn select_otp(&self, launch_index: usize) -> Result<&str, MetadataError> {
        let otps = self.otps.as_ref().ok_or_else(|| MetadataError::Malformed {
            reason: "user data has no otps".to_string(),
        })?;
        otps.get(launch_index)
            .map(String::as_str)
            .ok_or(MetadataError::LaunchIndexOutOfRange {
                index: launch_index,
                len: otps.len(),
            })
    }
}

fn string_field(value: &Value, key: &str) -> Result<Option<String>, MetadataError> {
    match value.get(key) {
        None => Ok(None),
        Some(field) => field
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| MetadataError::Malformed {
                reason: format!("{} is a {}, expected string", key, field),
            }),
    }
}

/// Parse the `ami-launch-index` document.
pub fn parse_launch_index(raw: &str) -> Result<u32, MetadataError> {
    raw.trim()
        .parse()
        .map_err(|_| MetadataError::InvalidLaunchIndex {
            value: raw.to_string(),
        })
}

/// Instance descriptors required for a cloud registration message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceMetadata {
    pub instance_key: String,
    pub reservation_key: String,
    pub local_hostname: String,
    pub public_hostname: String,
    pub launch_index: u32,
    pub kernel_key: String,
    pub ramdisk_key: String,
    pub image_key: String,
}

/// Outcome of one resolution attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CloudMetadata {
    /// Selected one-time password; `None` when the OTP group failed.
    pub otp: Option<String>,

    pub exchange_url: Option<String>,

    pub ping_url: Option<String>,

    /// `None` when any instance descriptor could not be fetched.
    pub instance: Option<InstanceMetadata>,
}

/// Fetches and interprets cloud metadata.
#[derive(Clone)]
pub struct CloudMetadataResolver {
    fetcher: Arc<dyn MetadataFetcher>,
    api_base: String,
}

impl std::fmt::Debug for CloudMetadataResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudMetadataResolver")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl CloudMetadataResolver {
    pub fn new(fetcher: Arc<dyn MetadataFetcher>) -> Self {
        Self {
            fetcher,
            api_base: METADATA_API_BASE.to_string(),
        }
    }

    /// Use a different metadata service base URL.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Run both fetch groups concurrently. Never fails; failures surface as
    /// `None` fields.
    pub async fn resolve(&self) -> CloudMetadata {
        let (user_data, instance) = tokio::join!(self.resolve_otp(), self.fetch_instance());

        let instance = match instance {
            Ok(instance) => Some(instance),
            Err(e) => {
                error!(error = %e, "got error while fetching meta-data");
                None
            }
        };

        let metadata = match user_data {
            Some((user_data, otp)) => CloudMetadata {
                otp,
                exchange_url: user_data.exchange_url,
                ping_url: user_data.ping_url,
                instance,
            },
            None => CloudMetadata {
                instance,
                ..CloudMetadata::default()
            },
        };

        info!(
            has_otp = metadata.otp.is_some(),
            has_instance = metadata.instance.is_some(),
            "resolved cloud metadata"
        );
        metadata
    }

    /// OTP group. `None` when user-data itself is unusable; otherwise the
    /// decoded user-data plus the OTP, which may still be missing.
    async fn resolve_otp(&self) -> Option<(UserData, Option<String>)> {
        let (user_data, launch_index) =
            tokio::join!(self.fetch_user_data(), self.fetch(LAUNCH_INDEX_PATH));

        let user_data = match user_data {
            Ok(user_data) => user_data,
            Err(e) => {
                warn!(error = %e, "unusable user data, continuing without one-time password");
                return None;
            }
        };

        let otp = launch_index
            .map_err(MetadataError::from)
            .and_then(|raw| parse_launch_index(&raw))
            .and_then(|index| user_data.select_otp(index as usize).map(str::to_string));

        match otp {
            Ok(otp) => Some((user_data, Some(otp))),
            Err(e) => {
                warn!(error = %e, "no one-time password for this instance");
                Some((user_data, None))
            }
        }
    }

    async fn fetch_user_data(&self) -> Result<UserData, MetadataError> {
        let raw = self.fetch_raw(USER_DATA_PATH).await?;
        UserData::from_bpickle(&raw)
    }

    /// Instance group: all eight documents are awaited before judging.
    async fn fetch_instance(&self) -> Result<InstanceMetadata, MetadataError> {
        let (
            instance_key,
            reservation_key,
            local_hostname,
            public_hostname,
            launch_index,
            kernel_key,
            ramdisk_key,
            image_key,
        ) = tokio::join!(
            self.fetch_logged("/meta-data/instance-id"),
            self.fetch_logged("/meta-data/reservation-id"),
            self.fetch_logged("/meta-data/local-hostname"),
            self.fetch_logged("/meta-data/public-hostname"),
            self.fetch_logged(LAUNCH_INDEX_PATH),
            self.fetch_logged("/meta-data/kernel-id"),
            self.fetch_logged("/meta-data/ramdisk-id"),
            self.fetch_logged("/meta-data/ami-id"),
        );

        Ok(InstanceMetadata {
            instance_key: instance_key?,
            reservation_key: reservation_key?,
            local_hostname: local_hostname?,
            public_hostname: public_hostname?,
            launch_index: parse_launch_index(&launch_index?)?,
            kernel_key: kernel_key?,
            ramdisk_key: ramdisk_key?,
            image_key: image_key?,
        })
    }

    async fn fetch_logged(&self, path: &str) -> Result<String, FetchError> {
        let result = self.fetch(path).await;
        if let Err(e) = &result {
            warn!(path, error = %e, "metadata fetch failed");
        }
        result
    }

    async fn fetch(&self, path: &str) -> Result<String, FetchError> {
        let url = format!("{}{}", self.api_base, path);
        debug!(url = %url, "fetching cloud metadata");
        self.fetcher.fetch(&url).await
    }

    /// Byte-exact fetch for bpickle documents.
    async fn fetch_raw(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        let url = format!("{}{}", self.api_base, path);
        debug!(url = %url, "fetching cloud metadata");
        self.fetcher.fetch_bytes(&url).await
    }
}
