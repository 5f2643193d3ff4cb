use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "muster",
    version,
    about = "Inspect muster agent registration: cloud detection, metadata and identity"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check whether cloud metadata describes a managed instance
    Probe(ProbeArgs),
    /// Resolve cloud metadata once and print it as JSON
    Metadata(MetadataArgs),
    /// Show or clear the persisted registration ids
    Identity(IdentityArgs),
    Version,
}

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    /// Client configuration file (default: <config dir>/muster/client.yaml)
    #[arg(long, env = "MUSTER_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Clone, Debug)]
pub struct ProbeArgs {
    /// Base URL of the metadata service
    #[arg(long, env = "MUSTER_METADATA_URL", default_value = muster_registration::METADATA_API_BASE)]
    pub metadata_url: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub timeout: u64,
}

#[derive(Args, Clone, Debug)]
pub struct MetadataArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Args, Clone, Debug)]
pub struct IdentityArgs {
    #[command(subcommand)]
    pub cmd: IdentitySub,
}

#[derive(Subcommand, Clone, Debug)]
pub enum IdentitySub {
    /// Print the persisted secure and insecure ids
    Show(ConfigArgs),
    /// Forget the persisted ids so the agent registers again
    Clear(ConfigArgs),
}
