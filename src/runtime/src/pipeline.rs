//! The mirroring run.
//!
//! list source tags → compute diff → resolve channels → deduplicate →
//! copy each image → commit the archive destination.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use a3s_mirror_core::config::{ChannelConfig, ExtraImage, MirrorConfig, ModulesConfig};
use a3s_mirror_core::error::{MirrorError, Result};
use a3s_mirror_core::event::{EventEmitter, MirrorEvent};
use semver::Version;

use crate::cancel::Cancellation;
use crate::channels::{merge_release_versions, resolve_channels, ChannelVersion};
use crate::copy::CopyOrchestrator;
use crate::dedup::{deduplicate, parse_module_manifest};
use crate::oci::archive::{scratch_dir, ArchiveDestination, ArchiveSource, ArchiveTransport};
use crate::oci::layers;
use crate::oci::reference::{ImageLocator, RegistryLocation, TransportKind};
use crate::oci::registry::RegistryAuth;
use crate::transfer::{self, CopyOptions, ImageTransfer, ListOptions, PolicyContext, TagLister};
use crate::versions::{
    compute_diff, ledger_from_tags, seed_destination, version_tag, MinVersion, VersionLedger,
};

/// What a run decided to mirror.
#[derive(Debug, Clone)]
pub struct MirrorPlan {
    /// Release versions found in the source
    pub source: VersionLedger,
    /// Destination ledger after seeding
    pub destination: VersionLedger,
    /// Versions the diff walk selected
    pub diff: Vec<Version>,
    /// Channel pointers and whether they drifted
    pub channels: Vec<ChannelVersion>,
    /// Final version set, ascending
    pub versions: Vec<Version>,
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct MirrorReport {
    pub plan: MirrorPlan,
    /// Images handed to the transfer client, in copy order
    pub images: Vec<ImageLocator>,
    /// Archive written at the end of the run, if any
    pub archive: Option<PathBuf>,
    pub dry_run: bool,
}

/// A configured mirroring run.
pub struct MirrorPipeline {
    source: RegistryLocation,
    destination: RegistryLocation,
    min_version: MinVersion,
    channels: ChannelConfig,
    modules: ModulesConfig,
    extra_images: Vec<ExtraImage>,
    destination_insecure: bool,
    dry_run: bool,
    transfer: Arc<dyn ImageTransfer>,
    tags: Arc<dyn TagLister>,
    archives: ArchiveTransport,
    policy: PolicyContext,
    report: Option<EventEmitter>,
    cancel: Cancellation,
}

impl MirrorPipeline {
    /// Build a pipeline from a validated configuration.
    pub fn new(
        config: &MirrorConfig,
        transfer: Arc<dyn ImageTransfer>,
        tags: Arc<dyn TagLister>,
    ) -> Result<Self> {
        config.validate()?;

        let source = source_location(config)?;
        let destination = RegistryLocation::parse(
            &config.destination,
            RegistryAuth::from_credentials(&config.destination_auth),
        )?;

        check_disjoint(&source, &destination)?;

        Ok(Self {
            source,
            destination,
            min_version: config.min_version.parse()?,
            channels: config.channels.clone(),
            modules: config.modules.clone(),
            extra_images: config.extra_images.clone(),
            destination_insecure: config.insecure,
            dry_run: config.dry_run,
            transfer,
            tags,
            archives: ArchiveTransport::default(),
            policy: PolicyContext::default(),
            report: None,
            cancel: Cancellation::never(),
        })
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_report(mut self, report: EventEmitter) -> Self {
        self.report = Some(report);
        self
    }

    pub fn with_policy(mut self, policy: PolicyContext) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_archive_transport(mut self, archives: ArchiveTransport) -> Self {
        self.archives = archives;
        self
    }

    pub fn source(&self) -> &RegistryLocation {
        &self.source
    }

    pub fn destination(&self) -> &RegistryLocation {
        &self.destination
    }

    /// Decide what would be mirrored without copying anything.
    pub async fn plan(&self) -> Result<MirrorPlan> {
        let source = self.open_source()?;
        self.plan_from(source.registry()).await
    }

    /// Run the whole mirror.
    ///
    /// An archive destination is written once, after every image was copied;
    /// on failure or cancellation it is left as it was.
    pub async fn run(&self) -> Result<MirrorReport> {
        let source = self.open_source()?;
        let destination = self.open_destination()?;

        let plan = self.plan_from(source.registry()).await?;
        tracing::info!(
            versions = ?plan.versions.iter().map(version_tag).collect::<Vec<_>>(),
            "Versions to mirror"
        );

        let images = self.images_to_copy(source.registry(), &plan).await?;

        let orchestrator = CopyOrchestrator::new(
            self.transfer.clone(),
            self.policy.clone(),
            self.copy_options(),
            self.cancel.clone(),
        );
        let copied = orchestrator
            .copy_all(&images, destination.registry())
            .await?;
        tracing::info!(images = copied, "Images copied");

        let archive = match destination {
            OpenDestination::Archive(session) if !self.dry_run => {
                self.cancel.check("committing archive")?;
                let path = session.commit()?;
                if let Some(report) = &self.report {
                    report.emit(MirrorEvent::with_string(
                        "archive.committed",
                        path.display().to_string(),
                    ));
                }
                Some(path)
            }
            _ => None,
        };

        Ok(MirrorReport {
            plan,
            images,
            archive,
            dry_run: self.dry_run,
        })
    }

    async fn plan_from(&self, source: &RegistryLocation) -> Result<MirrorPlan> {
        self.cancel.check("listing source tags")?;
        let source_tags =
            transfer::list_tags(self.tags.as_ref(), source, &ListOptions::default()).await?;
        let source_ledger = ledger_from_tags(&source_tags)?;
        if source_ledger.is_empty() {
            return Err(MirrorError::NoVersions {
                location: self.source.to_string(),
            });
        }

        let live = self.destination.is_live();
        let destination_ledger = if live {
            self.cancel.check("listing destination tags")?;
            let options = ListOptions {
                auth: None,
                insecure: self.destination_insecure,
            };
            let tags = transfer::list_tags(self.tags.as_ref(), &self.destination, &options).await?;
            ledger_from_tags(&tags)?
        } else {
            VersionLedger::new()
        };

        let destination_ledger =
            seed_destination(&source_ledger, destination_ledger, live, &self.min_version)?;
        let diff = compute_diff(&source_ledger, &destination_ledger)?;

        let channels = resolve_channels(
            self.transfer.as_ref(),
            &self.policy,
            source,
            &self.channels,
            &destination_ledger,
            &self.cancel,
        )
        .await?;

        let versions = merge_release_versions(&diff, &channels);

        Ok(MirrorPlan {
            source: source_ledger,
            destination: destination_ledger,
            diff,
            channels,
            versions,
        })
    }

    /// Full image list for a plan, in copy order.
    async fn images_to_copy(
        &self,
        source: &RegistryLocation,
        plan: &MirrorPlan,
    ) -> Result<Vec<ImageLocator>> {
        let manifest_files: Vec<&str> = self
            .modules
            .manifest_files
            .iter()
            .map(String::as_str)
            .collect();
        let metadata_options = CopyOptions::default();

        let mut module_images = BTreeMap::new();
        for version in &plan.versions {
            let root = source.image("", Some(&version_tag(version)), None);
            self.cancel.check(&format!("reading module images of {}", root))?;

            let (file, data) = layers::extract_any_file(
                self.transfer.as_ref(),
                &self.policy,
                &metadata_options,
                &root,
                &manifest_files,
            )
            .await?;
            let images = parse_module_manifest(&root.to_string(), &data)?;
            tracing::debug!(version = %version, file, images = images.len(), "Read module images");
            module_images.insert(version.clone(), images);
        }

        let mut images: Vec<ImageLocator> = deduplicate(&module_images)
            .iter()
            .map(|item| item.locator(source))
            .collect();

        for version in &plan.versions {
            let tag = version_tag(version);
            images.push(source.image("", Some(&tag), None));
            images.push(source.image(&self.modules.install_path, Some(&tag), None));
        }

        for channel in &self.channels.names {
            images.push(source.image("", Some(channel), None));
            images.push(source.image(&self.modules.install_path, Some(channel), None));
            images.push(source.image(&self.channels.repository, Some(channel), None));
        }

        for extra in &self.extra_images {
            images.push(source.image(&extra.path, Some(&extra.tag), None));
        }

        Ok(images)
    }

    fn copy_options(&self) -> CopyOptions {
        CopyOptions {
            preserve_digests: true,
            copy_all_architectures: true,
            destination_insecure: self.destination_insecure,
            dry_run: self.dry_run,
            report: self.report.clone(),
        }
    }

    fn open_source(&self) -> Result<OpenSource> {
        match self.source.transport() {
            TransportKind::Archive => Ok(OpenSource::Archive(self.archives.open_source(&self.source)?)),
            _ => Ok(OpenSource::Location(self.source.clone())),
        }
    }

    fn open_destination(&self) -> Result<OpenDestination> {
        match self.destination.transport() {
            TransportKind::Archive => Ok(OpenDestination::Archive(
                self.archives.open_destination(&self.destination)?,
            )),
            _ => Ok(OpenDestination::Location(self.destination.clone())),
        }
    }
}

/// Source location resolved from the configuration.
///
/// Remote sources get the edition appended and the license as credentials.
fn source_location(config: &MirrorConfig) -> Result<RegistryLocation> {
    let source = RegistryLocation::parse(&config.source, None)?;
    if !source.is_live() {
        return Ok(source);
    }

    let license = config
        .license
        .as_deref()
        .filter(|l| !l.is_empty())
        .ok_or_else(|| {
            MirrorError::ConfigError(format!("a license is required to read from {}", source))
        })?;

    let source = match config.edition.as_deref().filter(|e| !e.is_empty()) {
        Some(edition) => source.join(edition),
        None => source,
    };
    Ok(source.with_auth(Some(RegistryAuth::license(license))))
}

/// Directory a location occupies on disk; archives occupy their scratch directory.
fn local_root(location: &RegistryLocation) -> Option<PathBuf> {
    match location.transport() {
        TransportKind::Registry => None,
        TransportKind::Directory => Some(PathBuf::from(location.path())),
        TransportKind::Archive => Some(scratch_dir(Path::new(location.path()))),
    }
}

/// Absolute form of `path` with `.` and `..` resolved lexically.
fn absolute(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    Ok(normalized)
}

/// Local endpoints must not share a directory tree.
fn check_disjoint(source: &RegistryLocation, destination: &RegistryLocation) -> Result<()> {
    let (Some(src), Some(dst)) = (local_root(source), local_root(destination)) else {
        return Ok(());
    };
    let (src, dst) = (absolute(&src)?, absolute(&dst)?);

    if src.starts_with(&dst) || dst.starts_with(&src) {
        return Err(MirrorError::ConfigError(format!(
            "source {} and destination {} overlap at {}",
            source,
            destination,
            if src.starts_with(&dst) { dst.display() } else { src.display() }
        )));
    }
    Ok(())
}

enum OpenSource {
    Location(RegistryLocation),
    Archive(ArchiveSource),
}

impl OpenSource {
    fn registry(&self) -> &RegistryLocation {
        match self {
            OpenSource::Location(location) => location,
            OpenSource::Archive(session) => session.registry(),
        }
    }
}

enum OpenDestination {
    Location(RegistryLocation),
    Archive(ArchiveDestination),
}

impl OpenDestination {
    fn registry(&self) -> &RegistryLocation {
        match self {
            OpenDestination::Location(location) => location,
            OpenDestination::Archive(session) => session.registry(),
        }
    }
}
