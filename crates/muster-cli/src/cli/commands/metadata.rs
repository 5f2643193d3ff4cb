use std::sync::Arc;
use std::time::Duration;

use muster_registration::{CloudMetadataResolver, HttpMetadataFetcher};

use super::super::args::MetadataArgs;
use crate::exit_codes::SUCCESS;

pub async fn run(args: MetadataArgs) -> anyhow::Result<i32> {
    let config = super::load_config(&args.config)?;
    let fetcher = HttpMetadataFetcher::new(Duration::from_secs(config.timeout_secs))?;
    let resolver =
        CloudMetadataResolver::new(Arc::new(fetcher)).with_api_base(config.metadata_url);

    let metadata = resolver.resolve().await;
    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(SUCCESS)
}
