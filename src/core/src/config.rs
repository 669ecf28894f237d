use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{MirrorError, Result};

/// Default source registry for release images.
pub const DEFAULT_SOURCE: &str = "docker://registry.deckhouse.io/deckhouse";

/// Release channels, ordered from least to most conservative.
pub const DEFAULT_RELEASE_CHANNELS: [&str; 5] =
    ["alpha", "beta", "early-access", "stable", "rock-solid"];

/// Mirror run configuration
///
/// Built once by the caller (CLI flags or a YAML file) and handed to the
/// pipeline; nothing in the engine reads ambient files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Source location (`docker://<repo>`, `file:<path>.tar.gz` or `dir:<path>`)
    pub source: String,

    /// Destination location, same syntax as `source`
    pub destination: String,

    /// Oldest version to keep in the destination: `vX.Y.Z`, `latest`, or empty for auto
    pub min_version: String,

    /// License token for the source registry
    pub license: Option<String>,

    /// Edition path segment appended to a remote source (e.g. "ee")
    pub edition: Option<String>,

    /// Destination registry credentials
    pub destination_auth: CredentialsConfig,

    /// Skip TLS verification for the destination registry
    pub insecure: bool,

    /// Compute the work list but do not transfer anything
    pub dry_run: bool,

    /// Release channel layout
    pub channels: ChannelConfig,

    /// Module image manifests read from each version's root image
    pub modules: ModulesConfig,

    /// Images mirrored on every run regardless of version
    pub extra_images: Vec<ExtraImage>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE.to_string(),
            destination: String::new(),
            min_version: String::new(),
            license: None,
            edition: None,
            destination_auth: CredentialsConfig::default(),
            insecure: false,
            dry_run: false,
            channels: ChannelConfig::default(),
            modules: ModulesConfig::default(),
            extra_images: vec![ExtraImage {
                path: "security/trivy-db".to_string(),
                tag: "2".to_string(),
            }],
        }
    }
}

impl MirrorConfig {
    /// Load a configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MirrorError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: MirrorConfig = serde_yaml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded mirror configuration");
        Ok(config)
    }

    /// Check location and version syntax.
    pub fn validate(&self) -> Result<()> {
        validate_location("source", &self.source)?;
        validate_location("destination", &self.destination)?;

        if !is_valid_min_version(&self.min_version) {
            return Err(MirrorError::ConfigError(format!(
                "min version '{}' must look like vX.Y.Z or be \"latest\"",
                self.min_version
            )));
        }

        if self.channels.names.is_empty() {
            return Err(MirrorError::ConfigError(
                "at least one release channel is required".to_string(),
            ));
        }

        Ok(())
    }
}

/// Username/password pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl CredentialsConfig {
    /// Both parts, or nothing.
    pub fn pair(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => Some((u, p)),
            _ => None,
        }
    }
}

/// Release channel layout in the source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Channel names, in resolution order
    pub names: Vec<String>,

    /// Sub-path holding the channel metadata images
    pub repository: String,

    /// JSON file inside the metadata image carrying `{"version": "..."}`
    pub metadata_file: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            names: DEFAULT_RELEASE_CHANNELS.iter().map(|c| c.to_string()).collect(),
            repository: "release-channel".to_string(),
            metadata_file: "version.json".to_string(),
        }
    }
}

/// Module image manifest files, tried in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModulesConfig {
    pub manifest_files: Vec<String>,

    /// Sub-path of the installer image mirrored next to each version
    pub install_path: String,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            manifest_files: vec![
                "deckhouse/modules/images_digests.json".to_string(),
                "deckhouse/modules/images_tags.json".to_string(),
            ],
            install_path: "install".to_string(),
        }
    }
}

/// A fixed `path:tag` image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraImage {
    pub path: String,
    pub tag: String,
}

fn validate_location(what: &str, location: &str) -> Result<()> {
    let valid = match location.split_once(':') {
        Some(("docker", rest)) => rest.starts_with("//") && rest.len() > 2,
        Some(("file", rest)) => rest.ends_with(".tar.gz") && rest.len() > ".tar.gz".len(),
        Some(("dir", rest)) => !rest.is_empty(),
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(MirrorError::ConfigError(format!(
            "{} '{}' must be \"file:<path>.tar.gz\", \"dir:<path>\" or \"docker://<repository>\"",
            what, location
        )))
    }
}

fn is_valid_min_version(value: &str) -> bool {
    if value.is_empty() || value == "latest" {
        return true;
    }
    let Some(rest) = value.strip_prefix('v') else {
        return false;
    };
    let parts: Vec<&str> = rest.split('.').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}
