//! Provisioning-time check for cloud-managed hosts.

use tracing::debug;

use crate::error::{FetchError, MetadataError};
use crate::metadata::{
    parse_launch_index, UserData, LAUNCH_INDEX_PATH, METADATA_API_BASE, USER_DATA_PATH,
};

/// Whether this host's registration is driven by cloud metadata.
///
/// `fetch` is a blocking fetch of an absolute URL returning the raw body.
/// Any fetch error, decode failure, missing `otps`/`exchange-url`/`ping-url`
/// key, or launch index outside the OTP list yields `false`.
pub fn is_cloud_managed<F, B>(fetch: F) -> bool
where
    F: Fn(&str) -> Result<B, FetchError>,
    B: AsRef<[u8]>,
{
    is_cloud_managed_at(METADATA_API_BASE, fetch)
}

/// [`is_cloud_managed`] against a non-default metadata service.
pub fn is_cloud_managed_at<F, B>(api_base: &str, fetch: F) -> bool
where
    F: Fn(&str) -> Result<B, FetchError>,
    B: AsRef<[u8]>,
{
    match check(api_base.trim_end_matches('/'), &fetch) {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, "host is not cloud-managed");
            false
        }
    }
}

fn check<F, B>(api_base: &str, fetch: &F) -> Result<(), MetadataError>
where
    F: Fn(&str) -> Result<B, FetchError>,
    B: AsRef<[u8]>,
{
    let raw = fetch(&format!("{}{}", api_base, USER_DATA_PATH))?;
    let user_data = UserData::from_bpickle(raw.as_ref())?;

    for (key, present) in [
        ("otps", user_data.otps.is_some()),
        ("exchange-url", user_data.exchange_url.is_some()),
        ("ping-url", user_data.ping_url.is_some()),
    ] {
        if !present {
            return Err(MetadataError::Malformed {
                reason: format!("user data has no {}", key),
            });
        }
    }

    let index_body = fetch(&format!("{}{}", api_base, LAUNCH_INDEX_PATH))?;
    let index_text = std::str::from_utf8(index_body.as_ref()).map_err(|_| {
        MetadataError::InvalidLaunchIndex {
            value: String::from_utf8_lossy(index_body.as_ref()).into_owned(),
        }
    })?;
    let launch_index = parse_launch_index(index_text)?;
    user_data.select_otp(launch_index as usize)?;
    Ok(())
}
