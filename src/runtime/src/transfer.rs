//! Contracts of the image transfer collaborator.

use a3s_mirror_core::error::Result;
use a3s_mirror_core::event::{EventEmitter, MirrorEvent};
use async_trait::async_trait;

use crate::oci::archive::ArchiveTransport;
use crate::oci::directory;
use crate::oci::reference::{ImageLocator, ImageReference, RegistryLocation, TransportKind};
use crate::oci::registry::RegistryAuth;

/// Signature acceptance policy handed through to the transfer client.
///
/// Created by the caller; the mirroring core never inspects it.
#[derive(Debug, Clone)]
pub struct PolicyContext {
    accept_unsigned: bool,
}

impl PolicyContext {
    /// Accept every image.
    pub fn insecure_accept_anything() -> Self {
        Self {
            accept_unsigned: true,
        }
    }

    /// Reject every image.
    pub fn reject_all() -> Self {
        Self {
            accept_unsigned: false,
        }
    }

    /// Whether `reference` may be copied.
    pub fn allows(&self, _reference: &ImageReference) -> bool {
        self.accept_unsigned
    }
}

impl Default for PolicyContext {
    fn default() -> Self {
        Self::insecure_accept_anything()
    }
}

/// Per-copy options.
#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    /// Fail instead of storing an image under a different digest
    pub preserve_digests: bool,

    /// Copy every instance of an image list, not just the host platform
    pub copy_all_architectures: bool,

    /// Skip TLS verification towards the destination registry
    pub destination_insecure: bool,

    /// Decide but do not transfer
    pub dry_run: bool,

    /// Progress sink
    pub report: Option<EventEmitter>,
}

impl CopyOptions {
    pub(crate) fn report(&self, event: MirrorEvent) {
        if let Some(report) = &self.report {
            report.emit(event);
        }
    }
}

/// Options for tag listing.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Credentials overriding the location's own
    pub auth: Option<RegistryAuth>,

    /// Skip TLS verification
    pub insecure: bool,
}

/// Copies one image between two locations.
#[async_trait]
pub trait ImageTransfer: Send + Sync {
    async fn copy(
        &self,
        source: &ImageLocator,
        destination: &ImageLocator,
        policy: &PolicyContext,
        options: &CopyOptions,
    ) -> Result<()>;
}

/// Lists the tags of a remote repository.
#[async_trait]
pub trait TagLister: Send + Sync {
    async fn list_registry_tags(
        &self,
        location: &RegistryLocation,
        options: &ListOptions,
    ) -> Result<Vec<String>>;
}

/// Tags of any location, sorted.
///
/// Registries go through `lister`; directories are scanned; archives are
/// extracted into a scratch directory that is removed before returning.
pub async fn list_tags(
    lister: &dyn TagLister,
    location: &RegistryLocation,
    options: &ListOptions,
) -> Result<Vec<String>> {
    let mut tags = match location.transport() {
        TransportKind::Registry => lister.list_registry_tags(location, options).await?,
        TransportKind::Directory => directory::list_tags(std::path::Path::new(location.path()))?,
        TransportKind::Archive => {
            let source = ArchiveTransport::default().open_source(location)?;
            directory::list_tags(std::path::Path::new(source.registry().path()))?
        }
    };
    tags.sort();
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FixedTags {
        tags: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TagLister for FixedTags {
        async fn list_registry_tags(
            &self,
            location: &RegistryLocation,
            _options: &ListOptions,
        ) -> Result<Vec<String>> {
            self.calls.lock().unwrap().push(location.to_string());
            Ok(self.tags.clone())
        }
    }

    fn lister(tags: &[&str]) -> FixedTags {
        FixedTags {
            tags: tags.iter().map(|t| t.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn test_list_registry_tags_sorted() {
        let lister = lister(&["v1.45.3", "alpha", "v1.44.1"]);
        let location = RegistryLocation::registry("registry.example.com/d8");
        let tags = list_tags(&lister, &location, &ListOptions::default()).await.unwrap();
        assert_eq!(tags, vec!["alpha", "v1.44.1", "v1.45.3"]);
        assert_eq!(
            *lister.calls.lock().unwrap(),
            vec!["docker://registry.example.com/d8".to_string()]
        );
    }

    #[tokio::test]
    async fn test_list_directory_tags_skips_lister() {
        let tmp = TempDir::new().unwrap();
        let image = tmp.path().join("v1.45.3@sha256:abc");
        std::fs::create_dir_all(&image).unwrap();
        std::fs::write(image.join(directory::MANIFEST_FILE), "{}").unwrap();

        let lister = lister(&["never"]);
        let location = RegistryLocation::directory(tmp.path());
        let tags = list_tags(&lister, &location, &ListOptions::default()).await.unwrap();
        assert_eq!(tags, vec!["v1.45.3"]);
        assert!(lister.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_copy_options_defaults() {
        let options = CopyOptions::default();
        assert!(!options.preserve_digests);
        assert!(!options.copy_all_architectures);
        assert!(!options.destination_insecure);
        assert!(!options.dry_run);
        assert!(options.report.is_none());
    }

    #[test]
    fn test_policy_context() {
        let reference = ImageReference::Registry {
            repository: "r.example.com/d8".to_string(),
            tag: Some("v1".to_string()),
            digest: None,
        };
        assert!(PolicyContext::default().allows(&reference));
        assert!(!PolicyContext::reject_all().allows(&reference));
    }
}
