use super::args::*;

pub mod identity;
pub mod metadata;
pub mod probe;

mod dispatch;
pub use dispatch::dispatch;

/// Load the client configuration named by `args`, overlaid with `MUSTER_*` variables.
pub(crate) fn load_config(
    args: &ConfigArgs,
) -> anyhow::Result<muster_registration::RegistrationConfig> {
    use anyhow::Context;
    use muster_registration::RegistrationConfig;

    let path = match &args.config {
        Some(path) => path.clone(),
        None => RegistrationConfig::default_path()?,
    };
    let config = RegistrationConfig::load_or_default(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    Ok(config.apply_env())
}
