use std::time::Duration;

use muster_registration::{is_cloud_managed_at, HttpMetadataFetcher, MetadataFetcher};

use super::super::args::ProbeArgs;
use crate::exit_codes::{NOT_CLOUD_MANAGED, SUCCESS};

pub async fn run(args: ProbeArgs) -> anyhow::Result<i32> {
    let fetcher = HttpMetadataFetcher::new(Duration::from_secs(args.timeout))?;
    let handle = tokio::runtime::Handle::current();
    let base = args.metadata_url.clone();

    // The detector takes a blocking fetch; drive the async client from a blocking thread.
    let managed = tokio::task::spawn_blocking(move || {
        is_cloud_managed_at(&base, |url| handle.block_on(fetcher.fetch_bytes(url)))
    })
    .await?;

    if managed {
        println!("cloud-managed ({})", args.metadata_url);
        Ok(SUCCESS)
    } else {
        println!("not cloud-managed ({})", args.metadata_url);
        Ok(NOT_CLOUD_MANAGED)
    }
}
