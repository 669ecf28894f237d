//! Release-channel resolver.
//!
//! Reads the version each release channel points to from the channel's
//! metadata image and flags the ones the destination does not hold.

use std::collections::BTreeSet;

use a3s_mirror_core::config::ChannelConfig;
use a3s_mirror_core::error::{MirrorError, Result};
use semver::Version;
use serde::Deserialize;

use crate::cancel::Cancellation;
use crate::oci::layers;
use crate::oci::reference::RegistryLocation;
use crate::transfer::{CopyOptions, ImageTransfer, PolicyContext};
use crate::versions::{parse_version, VersionLedger};

/// Version a channel currently points to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelVersion {
    pub channel: String,
    pub version: Version,
    /// The destination lacks this exact version for its line
    pub needs_mirror: bool,
}

#[derive(Deserialize)]
struct ChannelMetadata {
    version: String,
}

/// Parse a channel metadata document (`{"version": "v1.45.3"}`).
pub fn parse_channel_metadata(image: &str, data: &[u8]) -> Result<Version> {
    let malformed = |message: String| MirrorError::MetadataMalformed {
        image: image.to_string(),
        message,
    };

    let meta: ChannelMetadata =
        serde_json::from_slice(data).map_err(|e| malformed(e.to_string()))?;
    parse_version(&meta.version).map_err(|e| malformed(e.to_string()))
}

/// Resolve every configured channel against the destination ledger.
///
/// Any channel whose metadata cannot be read fails the whole resolution.
pub async fn resolve_channels(
    transfer: &dyn ImageTransfer,
    policy: &PolicyContext,
    source: &RegistryLocation,
    channels: &ChannelConfig,
    destination: &VersionLedger,
    cancel: &Cancellation,
) -> Result<Vec<ChannelVersion>> {
    let options = CopyOptions::default();
    let mut resolved = Vec::with_capacity(channels.names.len());

    for channel in &channels.names {
        let image = source.image(&channels.repository, Some(channel), None);
        cancel.check(&format!("fetching metadata of {}", image))?;

        let data = layers::extract_file(
            transfer,
            policy,
            &options,
            &image,
            &channels.metadata_file,
        )
        .await?;
        let version = parse_channel_metadata(&image.to_string(), &data)?;

        let needs_mirror = destination.get_for(&version) != Some(&version);
        tracing::info!(
            channel = %channel,
            version = %version,
            needs_mirror,
            "Resolved release channel"
        );

        resolved.push(ChannelVersion {
            channel: channel.clone(),
            version,
            needs_mirror,
        });
    }

    Ok(resolved)
}

/// Final version set: diff versions plus every flagged channel version, ascending.
pub fn merge_release_versions(diff: &[Version], channels: &[ChannelVersion]) -> Vec<Version> {
    let mut versions: BTreeSet<Version> = diff.iter().cloned().collect();
    versions.extend(
        channels
            .iter()
            .filter(|c| c.needs_mirror)
            .map(|c| c.version.clone()),
    );
    versions.into_iter().collect()
}
