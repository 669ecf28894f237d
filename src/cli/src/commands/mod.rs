//! CLI command definitions and dispatch.

mod mirror;
mod tags;
mod version;
mod versions;

use std::path::PathBuf;
use std::sync::Arc;

use a3s_mirror_core::config::MirrorConfig;
use a3s_mirror_runtime::{CancelHandle, Cancellation, MirrorPipeline, RegistryClient};
use clap::{Args, Parser, Subcommand};

/// A3S Mirror - incremental release mirroring between registries and archives.
#[derive(Parser)]
#[command(name = "a3s-mirror", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Mirror missing releases into a destination
    Mirror(mirror::MirrorArgs),
    /// Show which releases a mirror run would copy
    Versions(versions::VersionsArgs),
    /// List the tags of a location
    Tags(tags::TagsArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Source, destination and version selection shared by `mirror` and `versions`.
#[derive(Args, Debug, Clone)]
pub struct LocationArgs {
    /// Destination: "file:<path>.tar.gz", "dir:<path>" or "docker://<repository>"
    pub destination: String,

    /// Source location (defaults to the public release registry)
    #[arg(long = "from")]
    pub source: Option<String>,

    /// Oldest version to keep in the destination: vX.Y.Z, "latest", or empty for auto
    #[arg(long)]
    pub min_version: Option<String>,

    /// License token for the source registry
    #[arg(long, env = "A3S_MIRROR_LICENSE")]
    pub license: Option<String>,

    /// Edition appended to a remote source (e.g. "ee")
    #[arg(long)]
    pub edition: Option<String>,

    /// Destination registry username
    #[arg(long)]
    pub username: Option<String>,

    /// Destination registry password
    #[arg(long, env = "A3S_MIRROR_PASSWORD")]
    pub password: Option<String>,

    /// Skip TLS verification for the destination registry
    #[arg(long)]
    pub insecure: bool,

    /// YAML configuration file; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl LocationArgs {
    /// Load the configuration file (or defaults) and apply the flags.
    pub(crate) fn to_config(&self) -> Result<MirrorConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => MirrorConfig::from_file(path)?,
            None => MirrorConfig::default(),
        };

        config.destination = self.destination.clone();
        if let Some(source) = &self.source {
            config.source = source.clone();
        }
        if let Some(min_version) = &self.min_version {
            config.min_version = min_version.clone();
        }
        if self.license.is_some() {
            config.license = self.license.clone();
        }
        if self.edition.is_some() {
            config.edition = self.edition.clone();
        }
        if self.username.is_some() {
            config.destination_auth.username = self.username.clone();
        }
        if self.password.is_some() {
            config.destination_auth.password = self.password.clone();
        }
        config.insecure |= self.insecure;

        Ok(config)
    }
}

/// Build a pipeline backed by the registry client.
pub(crate) fn open_pipeline(
    config: &MirrorConfig,
) -> Result<MirrorPipeline, Box<dyn std::error::Error>> {
    let client = Arc::new(RegistryClient::new());
    Ok(MirrorPipeline::new(config, client.clone(), client)?)
}

/// Cancellation triggered by Ctrl-C.
pub(crate) fn cancel_on_ctrl_c() -> Cancellation {
    let (handle, cancel) = Cancellation::new();
    tokio::spawn(wait_for_ctrl_c(handle));
    cancel
}

async fn wait_for_ctrl_c(handle: CancelHandle) {
    if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("Interrupted, stopping after the current step...");
        handle.cancel();
    }
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Mirror(args) => mirror::execute(args).await,
        Command::Versions(args) => versions::execute(args).await,
        Command::Tags(args) => tags::execute(args).await,
        Command::Version(args) => version::execute(args).await,
    }
}
