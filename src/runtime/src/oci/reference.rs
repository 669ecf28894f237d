//! Registry locations and image locators.
//!
//! A [`RegistryLocation`] names where images live (`docker://host/repo`,
//! `dir:/path`, `file:/path.tar.gz`); an [`ImageLocator`] names one image
//! inside it. Locators resolve to transport-qualified [`ImageReference`]s.

use std::fmt;
use std::path::{Path, PathBuf};

use a3s_mirror_core::error::{MirrorError, Result};
use oci_distribution::Reference;

use super::archive::ARCHIVE_EXTENSION;
use super::registry::RegistryAuth;

/// Storage transport of a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Remote OCI registry
    Registry,
    /// Plain directory, one sub-directory per `tag[@digest]`
    Directory,
    /// Directory packed into a `.tar.gz`
    Archive,
}

impl TransportKind {
    /// Transport prefix used in location strings.
    pub fn name(&self) -> &'static str {
        match self {
            TransportKind::Registry => "docker",
            TransportKind::Directory => "dir",
            TransportKind::Archive => "file",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a set of images lives. Immutable; derived locations are copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryLocation {
    transport: TransportKind,
    path: String,
    auth: Option<RegistryAuth>,
}

impl RegistryLocation {
    /// Parse `docker://<repo>`, `dir:<path>` or `file:<path>.tar.gz`.
    pub fn parse(location: &str, auth: Option<RegistryAuth>) -> Result<Self> {
        let (transport, within) = location.split_once(':').ok_or_else(|| {
            MirrorError::InvalidReference(format!("can't find transport for '{}'", location))
        })?;

        let parsed = match transport {
            "docker" => {
                let path = within.strip_prefix("//").ok_or_else(|| {
                    MirrorError::InvalidReference(format!(
                        "registry location '{}' must start with docker://",
                        location
                    ))
                })?;
                Self::registry(path)
            }
            "dir" => Self::directory(within),
            "file" => Self::archive(within),
            _ => {
                return Err(MirrorError::InvalidReference(format!(
                    "no such transport '{}' in '{}': should be 'file:path', 'dir:path' or 'docker://repository'",
                    transport, location
                )))
            }
        };

        if parsed.path.is_empty() {
            return Err(MirrorError::InvalidReference(format!(
                "empty path in location '{}'",
                location
            )));
        }

        Ok(parsed.with_auth(auth))
    }

    /// A remote registry repository (`host[:port]/path`).
    pub fn registry(path: impl AsRef<str>) -> Self {
        Self {
            transport: TransportKind::Registry,
            path: path.as_ref().trim_end_matches('/').to_string(),
            auth: None,
        }
    }

    /// A directory-backed registry rooted at `path`.
    pub fn directory(path: impl AsRef<Path>) -> Self {
        Self {
            transport: TransportKind::Directory,
            path: path.as_ref().to_string_lossy().to_string(),
            auth: None,
        }
    }

    /// An archive-backed registry; the `.tar.gz` extension is added if missing.
    pub fn archive(path: impl AsRef<Path>) -> Self {
        let raw = path.as_ref().to_string_lossy().to_string();
        let path = if raw.ends_with(ARCHIVE_EXTENSION) {
            raw
        } else {
            format!("{}{}", raw, ARCHIVE_EXTENSION)
        };
        Self {
            transport: TransportKind::Archive,
            path,
            auth: None,
        }
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    /// Path within the transport (repository for registries, filesystem path otherwise).
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn auth(&self) -> Option<&RegistryAuth> {
        self.auth.as_ref()
    }

    /// Whether the location can be queried for what it already holds.
    pub fn is_live(&self) -> bool {
        self.transport == TransportKind::Registry
    }

    /// Registry hostname, or the filesystem path for local transports.
    pub fn host(&self) -> &str {
        match self.transport {
            TransportKind::Registry => self.path.split('/').next().unwrap_or(&self.path),
            _ => &self.path,
        }
    }

    /// Copy of this location with different credentials.
    pub fn with_auth(&self, auth: Option<RegistryAuth>) -> Self {
        Self {
            auth,
            ..self.clone()
        }
    }

    /// Copy of this location with `segment` appended to its path.
    pub fn join(&self, segment: &str) -> Self {
        let segment = segment.trim_matches('/');
        if segment.is_empty() {
            return self.clone();
        }
        let path = match self.transport {
            TransportKind::Archive => {
                let base = self.path.strip_suffix(ARCHIVE_EXTENSION).unwrap_or(&self.path);
                format!("{}/{}{}", base, segment, ARCHIVE_EXTENSION)
            }
            _ => format!("{}/{}", self.path, segment),
        };
        Self {
            path,
            ..self.clone()
        }
    }

    /// Locator for an image in this location.
    pub fn image(&self, sub_path: &str, tag: Option<&str>, digest: Option<&str>) -> ImageLocator {
        ImageLocator::new(self.clone(), sub_path, tag, digest)
    }
}

impl fmt::Display for RegistryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.transport {
            TransportKind::Registry => write!(f, "docker://{}", self.path),
            _ => write!(f, "{}:{}", self.transport.name(), self.path),
        }
    }
}

/// One image inside a [`RegistryLocation`].
///
/// Digest wins when fetching from a registry, tag wins when storing into one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLocator {
    registry: RegistryLocation,
    sub_path: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageLocator {
    pub fn new(
        registry: RegistryLocation,
        sub_path: &str,
        tag: Option<&str>,
        digest: Option<&str>,
    ) -> Self {
        let non_empty = |s: Option<&str>| s.filter(|s| !s.is_empty()).map(str::to_string);
        Self {
            registry,
            sub_path: sub_path.trim_matches('/').to_string(),
            tag: non_empty(tag),
            digest: non_empty(digest),
        }
    }

    pub fn registry(&self) -> &RegistryLocation {
        &self.registry
    }

    pub fn sub_path(&self) -> &str {
        &self.sub_path
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    pub fn with_registry(&self, registry: RegistryLocation) -> Self {
        Self {
            registry,
            ..self.clone()
        }
    }

    pub fn with_tag(&self, tag: Option<&str>) -> Self {
        Self {
            tag: tag.filter(|t| !t.is_empty()).map(str::to_string),
            ..self.clone()
        }
    }

    pub fn with_digest(&self, digest: Option<&str>) -> Self {
        Self {
            digest: digest.filter(|d| !d.is_empty()).map(str::to_string),
            ..self.clone()
        }
    }

    /// Resolve to a transport-qualified reference.
    ///
    /// For directory locations the parent directory is created.
    pub fn reference(&self) -> Result<ImageReference> {
        match self.registry.transport() {
            TransportKind::Registry => {
                let mut repository = self.registry.path().to_string();
                if !self.sub_path.is_empty() {
                    repository.push('/');
                    repository.push_str(&self.sub_path);
                }
                Ok(ImageReference::Registry {
                    repository,
                    tag: self.tag.clone(),
                    digest: self.digest.clone(),
                })
            }
            TransportKind::Directory => {
                let tag = self.tag.as_deref().ok_or_else(|| {
                    MirrorError::InvalidReference(format!(
                        "directory image {} needs a tag",
                        self
                    ))
                })?;

                let parent = Path::new(self.registry.path()).join(&self.sub_path);
                std::fs::create_dir_all(&parent).map_err(|e| {
                    MirrorError::InvalidReference(format!(
                        "failed to create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;

                let name = match &self.digest {
                    Some(digest) => format!("{}@{}", tag, digest),
                    None => tag.to_string(),
                };
                Ok(ImageReference::Directory {
                    path: parent.join(name),
                })
            }
            TransportKind::Archive => Err(MirrorError::InvalidReference(format!(
                "archive image {} must be opened through the archive transport",
                self
            ))),
        }
    }
}

impl fmt::Display for ImageLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.registry)?;
        if !self.sub_path.is_empty() {
            write!(f, "/{}", self.sub_path)?;
        }
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

/// A resolved, transport-qualified image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageReference {
    /// `docker://<repository>[:tag]` or `docker://<repository>@<digest>`
    Registry {
        repository: String,
        tag: Option<String>,
        digest: Option<String>,
    },
    /// `dir:<root>/<sub-path>/<tag>[@digest]`
    Directory { path: PathBuf },
}

impl ImageReference {
    /// Reference string without the transport prefix.
    pub fn within_transport(&self) -> String {
        match self {
            ImageReference::Registry {
                repository,
                tag,
                digest,
            } => match (tag, digest) {
                (_, Some(digest)) => format!("{}@{}", repository, digest),
                (Some(tag), None) => format!("{}:{}", repository, tag),
                (None, None) => repository.clone(),
            },
            ImageReference::Directory { path } => path.display().to_string(),
        }
    }

    /// Registry hostname for registry references.
    pub fn registry_host(&self) -> Option<&str> {
        match self {
            ImageReference::Registry { repository, .. } => repository.split('/').next(),
            ImageReference::Directory { .. } => None,
        }
    }

    /// Directory path for directory references.
    pub fn directory(&self) -> Option<&Path> {
        match self {
            ImageReference::Directory { path } => Some(path),
            ImageReference::Registry { .. } => None,
        }
    }

    /// Convert a registry reference to an oci-distribution Reference.
    pub fn to_oci_reference(&self) -> Result<Reference> {
        match self {
            ImageReference::Registry { .. } => {
                let ref_str = self.within_transport();
                ref_str.parse::<Reference>().map_err(|e| {
                    MirrorError::InvalidReference(format!(
                        "Invalid OCI reference '{}': {}",
                        ref_str, e
                    ))
                })
            }
            ImageReference::Directory { path } => Err(MirrorError::InvalidReference(format!(
                "{} is not a registry reference",
                path.display()
            ))),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageReference::Registry { .. } => write!(f, "docker://{}", self.within_transport()),
            ImageReference::Directory { .. } => write!(f, "dir:{}", self.within_transport()),
        }
    }
}
