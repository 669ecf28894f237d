//! OCI registry client.
//!
//! Uses the `oci-distribution` crate to move images between remote
//! registries and the directory layout, and to list repository tags.

use std::path::Path;

use a3s_mirror_core::config::CredentialsConfig;
use a3s_mirror_core::error::{MirrorError, Result};
use a3s_mirror_core::event::MirrorEvent;
use async_trait::async_trait;
use http::HeaderValue;
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::manifest::{ImageIndexEntry, OciImageIndex, OciImageManifest};
use oci_distribution::secrets::RegistryAuth as OciRegistryAuth;
use oci_distribution::{Client, Reference, RegistryOperation};
use sha2::{Digest, Sha256};

use super::directory::{self, DirectoryImage};
use super::reference::{ImageLocator, ImageReference, RegistryLocation};
use crate::transfer::{CopyOptions, ImageTransfer, ListOptions, PolicyContext, TagLister};

/// User name paired with a license token.
pub const LICENSE_USER: &str = "license-token";

const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";

const ACCEPTED_MANIFESTS: [&str; 4] = [OCI_MANIFEST, OCI_INDEX, DOCKER_MANIFEST, DOCKER_MANIFEST_LIST];

/// Authentication credentials for a container registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryAuth {
    username: Option<String>,
    password: Option<String>,
}

impl RegistryAuth {
    /// Create anonymous authentication (no credentials).
    pub fn anonymous() -> Self {
        Self {
            username: None,
            password: None,
        }
    }

    /// Create basic authentication with username and password.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Credentials derived from a license token.
    pub fn license(token: impl Into<String>) -> Self {
        Self::basic(LICENSE_USER, token)
    }

    /// Basic credentials when both parts are configured.
    pub fn from_credentials(credentials: &CredentialsConfig) -> Option<Self> {
        credentials.pair().map(|(u, p)| Self::basic(u, p))
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    fn to_oci_auth(&self) -> OciRegistryAuth {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => OciRegistryAuth::Basic(u.clone(), p.clone()),
            _ => OciRegistryAuth::Anonymous,
        }
    }
}

fn oci_auth(auth: Option<&RegistryAuth>) -> OciRegistryAuth {
    auth.map(RegistryAuth::to_oci_auth)
        .unwrap_or(OciRegistryAuth::Anonymous)
}

/// Image transfer and tag listing backed by `oci-distribution`.
pub struct RegistryClient {
    client: Client,
    insecure_client: Client,
}

impl RegistryClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(client_config(false)),
            insecure_client: Client::new(client_config(true)),
        }
    }

    fn client(&self, insecure: bool) -> &Client {
        if insecure {
            &self.insecure_client
        } else {
            &self.client
        }
    }

    /// Pull an image into the directory layout at `target`, returning the stored manifest digest.
    async fn pull(
        &self,
        reference: &ImageReference,
        auth: &OciRegistryAuth,
        target: &Path,
        options: &CopyOptions,
    ) -> Result<String> {
        let oci_ref = reference.to_oci_reference()?;
        let registry = oci_ref.registry().to_string();
        let client = self.client(false);

        tracing::info!(
            reference = %reference,
            target = %target.display(),
            "Pulling image from registry"
        );

        let (manifest, digest) = client
            .pull_manifest_raw(&oci_ref, auth, &ACCEPTED_MANIFESTS)
            .await
            .map_err(|e| MirrorError::Registry {
                registry: registry.clone(),
                message: format!("Failed to pull manifest for {}: {}", reference, e),
            })?;

        let image = DirectoryImage::create(target)?;

        if !is_index(&manifest)? {
            image.write_manifest(&manifest, None)?;
            self.pull_blobs(&oci_ref, &manifest, &image).await?;
            tracing::debug!(reference = %reference, digest = %digest, "Image pulled");
            return Ok(sha256_digest(&manifest));
        }

        let index: OciImageIndex = serde_json::from_slice(&manifest)?;

        if options.copy_all_architectures {
            image.write_manifest(&manifest, None)?;
            for entry in &index.manifests {
                let instance_ref = with_digest(&oci_ref, &entry.digest);
                let (instance, _) = client
                    .pull_manifest_raw(&instance_ref, auth, &ACCEPTED_MANIFESTS)
                    .await
                    .map_err(|e| MirrorError::Registry {
                        registry: registry.clone(),
                        message: format!("Failed to pull manifest {}: {}", entry.digest, e),
                    })?;
                image.write_manifest(&instance, Some(&entry.digest))?;
                self.pull_blobs(&instance_ref, &instance, &image).await?;
            }
            tracing::debug!(
                reference = %reference,
                instances = index.manifests.len(),
                "Image list pulled"
            );
            return Ok(sha256_digest(&manifest));
        }

        if options.preserve_digests {
            return Err(MirrorError::Registry {
                registry,
                message: format!(
                    "{} is an image list; selecting one platform would change its digest",
                    reference
                ),
            });
        }

        let chosen = linux_platform_resolver(&index.manifests).ok_or_else(|| {
            MirrorError::Registry {
                registry: registry.clone(),
                message: format!("No linux/{} image in {}", host_arch(), reference),
            }
        })?;
        let instance_ref = with_digest(&oci_ref, &chosen);
        let (instance, _) = client
            .pull_manifest_raw(&instance_ref, auth, &ACCEPTED_MANIFESTS)
            .await
            .map_err(|e| MirrorError::Registry {
                registry: registry.clone(),
                message: format!("Failed to pull manifest {}: {}", chosen, e),
            })?;
        image.write_manifest(&instance, None)?;
        self.pull_blobs(&instance_ref, &instance, &image).await?;

        tracing::debug!(reference = %reference, digest = %chosen, "Platform image pulled");
        Ok(sha256_digest(&instance))
    }

    /// Pull config and layers of a single-image manifest, skipping blobs already present.
    async fn pull_blobs(
        &self,
        oci_ref: &Reference,
        manifest: &[u8],
        image: &DirectoryImage,
    ) -> Result<()> {
        let manifest: OciImageManifest = serde_json::from_slice(manifest)?;

        for descriptor in std::iter::once(&manifest.config).chain(manifest.layers.iter()) {
            if image.has_blob(&descriptor.digest) {
                continue;
            }

            tracing::debug!(
                digest = %descriptor.digest,
                size = descriptor.size,
                "Pulling blob"
            );

            let mut data: Vec<u8> = Vec::new();
            self.client(false)
                .pull_blob(oci_ref, descriptor, &mut data)
                .await
                .map_err(|e| MirrorError::Registry {
                    registry: oci_ref.registry().to_string(),
                    message: format!("Failed to pull blob {}: {}", descriptor.digest, e),
                })?;

            if descriptor.digest.starts_with("sha256:") && sha256_digest(&data) != descriptor.digest {
                return Err(MirrorError::Registry {
                    registry: oci_ref.registry().to_string(),
                    message: format!("Blob {} failed digest verification", descriptor.digest),
                });
            }

            image.write_blob(&descriptor.digest, &data)?;
        }

        Ok(())
    }

    /// Push a directory-layout image to a registry.
    ///
    /// Manifests go out as the bytes stored on disk, so their digests match the source.
    async fn push(
        &self,
        source: &Path,
        reference: &ImageReference,
        auth: &OciRegistryAuth,
        options: &CopyOptions,
    ) -> Result<String> {
        let oci_ref = reference.to_oci_reference()?;
        let image = DirectoryImage::open(source)?;
        let manifest = image.read_manifest(None)?;
        let is_list = is_index(&manifest)?;
        let media_type = manifest_media_type(&manifest, is_list)?;
        let client = self.client(options.destination_insecure);

        tracing::info!(
            reference = %reference,
            source = %source.display(),
            "Pushing image to registry"
        );

        client
            .auth(&oci_ref, auth, RegistryOperation::Push)
            .await
            .map_err(|e| registry_error(&oci_ref, format!("Failed to authenticate: {}", e)))?;

        if is_list {
            let index: OciImageIndex = serde_json::from_slice(&manifest)?;
            for entry in &index.manifests {
                let instance = image.read_manifest(Some(&entry.digest))?;
                if entry.digest.starts_with("sha256:") && sha256_digest(&instance) != entry.digest {
                    return Err(registry_error(
                        &oci_ref,
                        format!("Stored manifest {} does not match its digest", entry.digest),
                    ));
                }
                let instance_ref = with_digest(&oci_ref, &entry.digest);
                let instance_type = manifest_media_type(&instance, false)?;
                self.push_blobs(client, &image, &instance, &instance_ref)
                    .await?;
                push_manifest(client, &instance_ref, &instance, &instance_type).await?;
            }
        } else {
            self.push_blobs(client, &image, &manifest, &oci_ref).await?;
        }

        let url = push_manifest(client, &oci_ref, &manifest, &media_type).await?;
        let digest = sha256_digest(&manifest);
        tracing::debug!(manifest_url = %url, digest = %digest, "Image pushed");
        Ok(digest)
    }

    /// Upload config and layers of a single-image manifest as stored.
    async fn push_blobs(
        &self,
        client: &Client,
        image: &DirectoryImage,
        raw_manifest: &[u8],
        oci_ref: &Reference,
    ) -> Result<()> {
        let manifest: OciImageManifest = serde_json::from_slice(raw_manifest)?;

        for descriptor in std::iter::once(&manifest.config).chain(manifest.layers.iter()) {
            let data = image.read_blob(&descriptor.digest)?;
            tracing::debug!(
                digest = %descriptor.digest,
                size = data.len(),
                "Pushing blob"
            );
            client
                .push_blob(oci_ref, &data, &descriptor.digest)
                .await
                .map_err(|e| {
                    registry_error(
                        oci_ref,
                        format!("Failed to push blob {}: {}", descriptor.digest, e),
                    )
                })?;
        }

        Ok(())
    }
}

async fn push_manifest(
    client: &Client,
    oci_ref: &Reference,
    raw: &[u8],
    media_type: &str,
) -> Result<String> {
    let content_type = HeaderValue::from_str(media_type).map_err(|e| {
        registry_error(oci_ref, format!("Invalid manifest media type '{}': {}", media_type, e))
    })?;
    client
        .push_manifest_raw(oci_ref, raw.to_vec(), content_type)
        .await
        .map_err(|e| registry_error(oci_ref, format!("Failed to push manifest: {}", e)))
}

fn registry_error(reference: &Reference, message: String) -> MirrorError {
    MirrorError::Registry {
        registry: reference.registry().to_string(),
        message,
    }
}

impl Default for RegistryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageTransfer for RegistryClient {
    async fn copy(
        &self,
        source: &ImageLocator,
        destination: &ImageLocator,
        policy: &PolicyContext,
        options: &CopyOptions,
    ) -> Result<()> {
        let src_ref = source.reference()?;
        if !policy.allows(&src_ref) {
            return Err(MirrorError::Other(format!(
                "{} rejected by signature policy",
                src_ref
            )));
        }

        if options.dry_run {
            tracing::info!(source = %source, destination = %destination, "Dry run: skipping copy");
            options.report(MirrorEvent::with_fields(
                "copy.skipped",
                [
                    ("source", source.to_string()),
                    ("destination", destination.to_string()),
                ],
            ));
            return Ok(());
        }

        let dst_ref = destination.reference()?;
        options.report(MirrorEvent::with_fields(
            "copy.started",
            [
                ("source", src_ref.to_string()),
                ("destination", dst_ref.to_string()),
            ],
        ));

        let src_auth = oci_auth(source.registry().auth());
        let dst_auth = oci_auth(destination.registry().auth());

        let digest = match (src_ref.directory(), dst_ref.directory()) {
            (Some(src_dir), Some(dst_dir)) => {
                let digest = sha256_digest(&DirectoryImage::open(src_dir)?.read_manifest(None)?);
                if dst_dir.exists() {
                    std::fs::remove_dir_all(dst_dir)?;
                }
                directory::copy_dir_recursive(src_dir, dst_dir).map_err(|e| {
                    MirrorError::ExtractionFailed {
                        path: dst_dir.to_path_buf(),
                        message: e.to_string(),
                    }
                })?;
                digest
            }
            (None, Some(dst_dir)) => self.pull(&src_ref, &src_auth, dst_dir, options).await?,
            (Some(src_dir), None) => self.push(src_dir, &dst_ref, &dst_auth, options).await?,
            (None, None) => {
                let tmp = tempfile::Builder::new()
                    .prefix("a3s-mirror-")
                    .tempdir()?;
                let staging = tmp.path().join("image");
                self.pull(&src_ref, &src_auth, &staging, options).await?;
                self.push(&staging, &dst_ref, &dst_auth, options).await?
            }
        };

        options.report(MirrorEvent::with_fields(
            "copy.completed",
            [
                ("source", src_ref.to_string()),
                ("destination", dst_ref.to_string()),
                ("digest", digest),
            ],
        ));
        Ok(())
    }
}

#[async_trait]
impl TagLister for RegistryClient {
    async fn list_registry_tags(
        &self,
        location: &RegistryLocation,
        options: &ListOptions,
    ) -> Result<Vec<String>> {
        let reference = location.image("", None, None).reference()?;
        let oci_ref = reference.to_oci_reference()?;
        let auth = oci_auth(options.auth.as_ref().or(location.auth()));

        tracing::debug!(location = %location, "Listing tags");

        let response = self
            .client(options.insecure)
            .list_tags(&oci_ref, &auth, None, None)
            .await
            .map_err(|e| MirrorError::Registry {
                registry: location.host().to_string(),
                message: format!("Failed to list tags of {}: {}", location, e),
            })?;

        Ok(response.tags)
    }
}

fn client_config(insecure: bool) -> ClientConfig {
    ClientConfig {
        protocol: ClientProtocol::Https,
        accept_invalid_certificates: insecure,
        platform_resolver: Some(Box::new(linux_platform_resolver)),
        ..Default::default()
    }
}

fn with_digest(reference: &Reference, digest: &str) -> Reference {
    Reference::with_digest(
        reference.registry().to_string(),
        reference.repository().to_string(),
        digest.to_string(),
    )
}

/// Whether a raw manifest is an image list.
fn is_index(manifest: &[u8]) -> Result<bool> {
    let value: serde_json::Value = serde_json::from_slice(manifest)?;
    let media_type = value.get("mediaType").and_then(|m| m.as_str());
    Ok(match media_type {
        Some(OCI_INDEX) | Some(DOCKER_MANIFEST_LIST) => true,
        Some(_) => false,
        None => value.get("manifests").is_some(),
    })
}

/// Content type of a raw manifest, from its own `mediaType` or the OCI default.
fn manifest_media_type(manifest: &[u8], is_list: bool) -> Result<String> {
    let value: serde_json::Value = serde_json::from_slice(manifest)?;
    let default = if is_list { OCI_INDEX } else { OCI_MANIFEST };
    Ok(value
        .get("mediaType")
        .and_then(|m| m.as_str())
        .unwrap_or(default)
        .to_string())
}

/// `sha256:<hex>` digest of a byte slice.
pub fn sha256_digest(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    }
}

/// Platform resolver that selects the linux image matching the host architecture.
fn linux_platform_resolver(manifests: &[ImageIndexEntry]) -> Option<String> {
    let arch = host_arch();

    manifests
        .iter()
        .find(|entry| {
            entry
                .platform
                .as_ref()
                .map_or(false, |p| p.os == "linux" && p.architecture == arch)
        })
        .map(|entry| entry.digest.clone())
}
