use std::sync::Arc;

use muster_registration::{FileIdentityStore, Identity, IdentityStore, PersistedIds};
use tracing::info;

use super::super::args::ConfigArgs;
use crate::exit_codes::SUCCESS;

pub fn cmd_show(args: &ConfigArgs) -> anyhow::Result<i32> {
    let config = super::load_config(args)?;
    let store = FileIdentityStore::new(config.data_path()?);
    let path = store.path().display().to_string();
    let identity = Identity::from_config(&config, Arc::new(store))?;

    let report = serde_json::json!({
        "path": path,
        "registered": identity.is_registered(),
        "secure-id": identity.secure_id(),
        "insecure-id": identity.insecure_id(),
        "account_name": identity.account_name,
        "computer_title": identity.computer_title,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(SUCCESS)
}

pub fn cmd_clear(args: &ConfigArgs) -> anyhow::Result<i32> {
    let config = super::load_config(args)?;
    let store = FileIdentityStore::new(config.data_path()?);

    store.save(&PersistedIds::default())?;
    info!(path = %store.path().display(), "cleared persisted ids");
    println!("cleared ids in {}", store.path().display());
    Ok(SUCCESS)
}
