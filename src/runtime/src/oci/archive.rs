//! Archive transport.
//!
//! Presents a `.tar.gz` file as a directory-backed registry. Reads extract the
//! archive into a scratch directory derived from the archive path; writes go
//! to that directory and are packed back into the archive on commit.

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use a3s_mirror_core::error::{MirrorError, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::Archive;

use super::reference::{RegistryLocation, TransportKind};

/// Extension of archive-backed locations.
pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

const PARTIAL_SUFFIX: &str = ".partial";

/// File marking a directory as scratch space owned by the archive transport.
pub const SCRATCH_MARKER: &str = ".a3s-mirror-scratch";

/// Strip the archive extension, if present.
pub fn trim_extension(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match raw.strip_suffix(ARCHIVE_EXTENSION) {
        Some(stripped) => PathBuf::from(stripped),
        None => path.to_path_buf(),
    }
}

/// Append the archive extension unless already present.
pub fn add_extension(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    if raw.ends_with(ARCHIVE_EXTENSION) {
        path.to_path_buf()
    } else {
        PathBuf::from(format!("{}{}", raw, ARCHIVE_EXTENSION))
    }
}

/// Scratch directory used for an archive: the archive path without extension.
pub fn scratch_dir(archive: &Path) -> PathBuf {
    trim_extension(archive)
}

/// Unpack a gzip-compressed tar archive into `dest`.
///
/// Regular files, directories, symbolic and hard links are supported and
/// mode bits are preserved. Invalid streams fail with `ArchiveCorrupt`,
/// filesystem errors with `ExtractionFailed`.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let corrupt = |message: String| MirrorError::ArchiveCorrupt {
        archive: archive.to_path_buf(),
        message,
    };

    let file = File::open(archive).map_err(|e| corrupt(format!("cannot open: {}", e)))?;
    if file.metadata().map(|m| m.len()).unwrap_or(0) == 0 {
        return Err(corrupt("empty file".to_string()));
    }

    std::fs::create_dir_all(dest).map_err(|e| MirrorError::ExtractionFailed {
        path: dest.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut tar = Archive::new(GzDecoder::new(BufReader::new(file)));
    tar.set_preserve_permissions(true);
    tar.set_overwrite(true);

    let mut count = 0usize;
    for entry in tar.entries().map_err(|e| corrupt(e.to_string()))? {
        let mut entry = entry.map_err(|e| corrupt(e.to_string()))?;
        let rel = entry
            .path()
            .map_err(|e| corrupt(e.to_string()))?
            .into_owned();

        if !is_contained(&rel) {
            return Err(corrupt(format!("entry escapes archive root: {}", rel.display())));
        }

        entry.unpack_in(dest).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput => {
                corrupt(format!("{}: {}", rel.display(), e))
            }
            _ => MirrorError::ExtractionFailed {
                path: dest.join(&rel),
                message: e.to_string(),
            },
        })?;
        count += 1;
    }

    // Drain the stream so a truncated gzip trailer is noticed.
    io::copy(&mut tar.into_inner(), &mut io::sink()).map_err(|e| corrupt(e.to_string()))?;

    tracing::debug!(
        archive = %archive.display(),
        target = %dest.display(),
        entries = count,
        "Extracted archive"
    );

    Ok(())
}

fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Pack `src` into a gzip-compressed tar at `archive`.
///
/// Entries are added in name order at maximum compression. The stream is
/// written to a sibling `.partial` file and renamed over `archive` only once
/// complete, so an existing archive is never replaced by a truncated one.
pub fn compress_dir(src: &Path, archive: &Path) -> Result<()> {
    let partial = PathBuf::from(format!("{}{}", archive.display(), PARTIAL_SUFFIX));

    let result = write_archive(src, &partial).and_then(|()| {
        std::fs::rename(&partial, archive).map_err(|e| {
            MirrorError::Other(format!(
                "Failed to move {} into place: {}",
                partial.display(),
                e
            ))
        })
    });

    if result.is_err() {
        let _ = std::fs::remove_file(&partial);
    }
    result?;

    tracing::debug!(
        source = %src.display(),
        archive = %archive.display(),
        "Compressed directory"
    );
    Ok(())
}

fn write_archive(src: &Path, target: &Path) -> Result<()> {
    let write_error = |e: io::Error| {
        MirrorError::Other(format!("Failed to write archive {}: {}", target.display(), e))
    };

    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
    }

    let file = File::create(target).map_err(write_error)?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::best());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    append_tree(&mut builder, src, src).map_err(write_error)?;

    let encoder = builder.into_inner().map_err(write_error)?;
    let writer = encoder.finish().map_err(write_error)?;
    let file = writer.into_inner().map_err(|e| write_error(e.into_error()))?;
    file.sync_all().map_err(write_error)?;
    Ok(())
}

fn append_tree<W: io::Write>(
    builder: &mut tar::Builder<W>,
    root: &Path,
    current: &Path,
) -> io::Result<()> {
    let mut entries = std::fs::read_dir(current)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        if current == root && entry.file_name() == SCRATCH_MARKER {
            continue;
        }
        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        if entry.file_type()?.is_dir() {
            builder.append_dir(relative, &path)?;
            append_tree(builder, root, &path)?;
        } else {
            builder.append_path_with_name(&path, relative)?;
        }
    }
    Ok(())
}

/// Produces the directory-backed registry an archive is unpacked into.
pub trait DirectoryFactory: Send + Sync {
    fn registry(&self, root: &Path) -> RegistryLocation;
}

/// Plain local directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDirectories;

impl DirectoryFactory for LocalDirectories {
    fn registry(&self, root: &Path) -> RegistryLocation {
        RegistryLocation::directory(root)
    }
}

/// Opens archive-backed locations as directory registries.
#[derive(Clone)]
pub struct ArchiveTransport {
    directories: Arc<dyn DirectoryFactory>,
}

impl ArchiveTransport {
    pub fn new(directories: Arc<dyn DirectoryFactory>) -> Self {
        Self { directories }
    }

    /// Extract an existing archive for reading.
    pub fn open_source(&self, location: &RegistryLocation) -> Result<ArchiveSource> {
        let archive = archive_path(location)?;
        if !archive.is_file() {
            return Err(MirrorError::ArchiveCorrupt {
                archive,
                message: "no such archive".to_string(),
            });
        }

        let scratch = ScratchDir::fresh(scratch_dir(&archive))?;
        extract_archive(&archive, scratch.path())?;

        tracing::info!(
            archive = %archive.display(),
            scratch = %scratch.path().display(),
            "Opened archive source"
        );

        let registry = self
            .directories
            .registry(scratch.path())
            .with_auth(location.auth().cloned());
        Ok(ArchiveSource {
            archive,
            registry,
            _scratch: scratch,
        })
    }

    /// Prepare an archive for writing.
    ///
    /// An existing archive is extracted first so the committed archive keeps
    /// its previous images.
    pub fn open_destination(&self, location: &RegistryLocation) -> Result<ArchiveDestination> {
        let archive = archive_path(location)?;
        let scratch = ScratchDir::fresh(scratch_dir(&archive))?;

        if archive.is_file() {
            extract_archive(&archive, scratch.path())?;
        }

        tracing::info!(
            archive = %archive.display(),
            scratch = %scratch.path().display(),
            existing = archive.is_file(),
            "Opened archive destination"
        );

        let registry = self
            .directories
            .registry(scratch.path())
            .with_auth(location.auth().cloned());
        Ok(ArchiveDestination {
            archive,
            registry,
            scratch,
        })
    }
}

impl Default for ArchiveTransport {
    fn default() -> Self {
        Self::new(Arc::new(LocalDirectories))
    }
}

impl std::fmt::Debug for ArchiveTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveTransport").finish_non_exhaustive()
    }
}

fn archive_path(location: &RegistryLocation) -> Result<PathBuf> {
    if location.transport() != TransportKind::Archive {
        return Err(MirrorError::InvalidReference(format!(
            "{} is not an archive location",
            location
        )));
    }
    Ok(add_extension(Path::new(location.path())))
}

/// An extracted archive opened for reading. The scratch directory is removed on drop.
#[derive(Debug)]
pub struct ArchiveSource {
    archive: PathBuf,
    registry: RegistryLocation,
    _scratch: ScratchDir,
}

impl ArchiveSource {
    /// Directory registry holding the extracted images.
    pub fn registry(&self) -> &RegistryLocation {
        &self.registry
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive
    }
}

/// A scratch directory that becomes an archive on commit.
///
/// Dropping without commit removes the scratch directory and leaves any
/// existing archive untouched.
#[derive(Debug)]
pub struct ArchiveDestination {
    archive: PathBuf,
    registry: RegistryLocation,
    scratch: ScratchDir,
}

impl ArchiveDestination {
    /// Directory registry receiving the images.
    pub fn registry(&self) -> &RegistryLocation {
        &self.registry
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive
    }

    /// Pack the scratch directory into the archive, then remove it.
    pub fn commit(self) -> Result<PathBuf> {
        compress_dir(self.scratch.path(), &self.archive)?;
        tracing::info!(archive = %self.archive.display(), "Committed archive");
        Ok(self.archive.clone())
    }
}

#[derive(Debug)]
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create an empty scratch directory, discarding leftovers of an earlier run.
    ///
    /// An existing directory without the scratch marker is left alone and
    /// fails with `ConfigError`.
    fn fresh(path: PathBuf) -> Result<Self> {
        if path.exists() {
            if !path.join(SCRATCH_MARKER).is_file() {
                return Err(MirrorError::ConfigError(format!(
                    "{} already exists and is not an archive scratch directory",
                    path.display()
                )));
            }
            tracing::warn!(path = %path.display(), "Removing stale scratch directory");
            std::fs::remove_dir_all(&path).map_err(|e| MirrorError::ExtractionFailed {
                path: path.clone(),
                message: format!("Failed to remove stale scratch directory: {}", e),
            })?;
        }
        std::fs::create_dir_all(&path)
            .and_then(|()| std::fs::write(path.join(SCRATCH_MARKER), b""))
            .map_err(|e| MirrorError::ExtractionFailed {
                path: path.clone(),
                message: e.to_string(),
            })?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to remove scratch directory"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oci::directory;
    use std::collections::BTreeMap;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn create_test_archive(path: &Path, files: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *content).unwrap();
        }

        builder.into_inner().unwrap().finish().unwrap();
    }

    /// relative path -> (contents or link target, mode)
    fn snapshot(root: &Path) -> BTreeMap<String, (Vec<u8>, u32)> {
        fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<String, (Vec<u8>, u32)>) {
            for entry in std::fs::read_dir(dir).unwrap() {
                let entry = entry.unwrap();
                let path = entry.path();
                let rel = path.strip_prefix(root).unwrap().to_string_lossy().to_string();
                let meta = std::fs::symlink_metadata(&path).unwrap();
                let mode = meta.permissions().mode() & 0o7777;
                if meta.file_type().is_symlink() {
                    let target = std::fs::read_link(&path).unwrap();
                    out.insert(rel, (target.to_string_lossy().as_bytes().to_vec(), 0));
                } else if meta.is_dir() {
                    out.insert(format!("{}/", rel), (Vec::new(), mode));
                    walk(root, &path, out);
                } else {
                    out.insert(rel, (std::fs::read(&path).unwrap(), mode));
                }
            }
        }
        let mut out = BTreeMap::new();
        walk(root, root, &mut out);
        out
    }

    #[test]
    fn test_extension_helpers() {
        assert_eq!(trim_extension(Path::new("/tmp/a.tar.gz")), PathBuf::from("/tmp/a"));
        assert_eq!(trim_extension(Path::new("/tmp/a")), PathBuf::from("/tmp/a"));
        assert_eq!(add_extension(Path::new("/tmp/a")), PathBuf::from("/tmp/a.tar.gz"));
        assert_eq!(add_extension(Path::new("/tmp/a.tar.gz")), PathBuf::from("/tmp/a.tar.gz"));
        assert_eq!(scratch_dir(Path::new("out/d8.tar.gz")), PathBuf::from("out/d8"));
    }

    #[test]
    fn test_round_trip_preserves_tree() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        std::fs::create_dir_all(src.join("v1.45.3")).unwrap();
        std::fs::create_dir_all(src.join("install/v1.45.3")).unwrap();
        std::fs::write(src.join("v1.45.3/manifest.json"), b"{}").unwrap();
        std::fs::write(src.join("v1.45.3/version"), directory::VERSION_CONTENT).unwrap();
        std::fs::write(src.join("install/v1.45.3/run.sh"), b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(
            src.join("install/v1.45.3/run.sh"),
            std::fs::Permissions::from_mode(0o755),
        )
        .unwrap();
        std::fs::set_permissions(
            src.join("v1.45.3/manifest.json"),
            std::fs::Permissions::from_mode(0o600),
        )
        .unwrap();
        std::os::unix::fs::symlink("v1.45.3", src.join("stable")).unwrap();

        let archive = tmp.path().join("mirror.tar.gz");
        compress_dir(&src, &archive).unwrap();
        assert!(archive.is_file());
        assert!(!tmp.path().join("mirror.tar.gz.partial").exists());

        let out = tmp.path().join("out");
        extract_archive(&archive, &out).unwrap();
        assert_eq!(snapshot(&src), snapshot(&out));

        // Re-compressing the extracted tree round-trips again
        let again = tmp.path().join("again.tar.gz");
        compress_dir(&out, &again).unwrap();
        let out2 = tmp.path().join("out2");
        extract_archive(&again, &out2).unwrap();
        assert_eq!(snapshot(&src), snapshot(&out2));
    }

    #[test]
    fn test_extract_hard_link() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("links.tar.gz");

        let file = File::create(&archive).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        let mut header = tar::Header::new_gnu();
        header.set_size(5);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "blob", &b"hello"[..]).unwrap();

        let mut link = tar::Header::new_gnu();
        link.set_entry_type(tar::EntryType::Link);
        link.set_size(0);
        link.set_mode(0o644);
        builder.append_link(&mut link, "alias", "blob").unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let out = tmp.path().join("out");
        extract_archive(&archive, &out).unwrap();
        assert_eq!(std::fs::read(out.join("alias")).unwrap(), b"hello");
    }

    #[test]
    fn test_extract_garbage_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("bad.tar.gz");
        std::fs::write(&archive, b"definitely not gzip").unwrap();

        let err = extract_archive(&archive, &tmp.path().join("out")).unwrap_err();
        assert!(matches!(err, MirrorError::ArchiveCorrupt { .. }), "{err}");
    }

    #[test]
    fn test_extract_gzip_of_non_tar_is_corrupt() {
        use std::io::Write;

        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("bad.tar.gz");
        let mut encoder = GzEncoder::new(File::create(&archive).unwrap(), Compression::default());
        encoder.write_all(&[0x42u8; 1024]).unwrap();
        encoder.finish().unwrap();

        let err = extract_archive(&archive, &tmp.path().join("out")).unwrap_err();
        assert!(matches!(err, MirrorError::ArchiveCorrupt { .. }), "{err}");
    }

    #[test]
    fn test_extract_empty_file_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("empty.tar.gz");
        std::fs::write(&archive, b"").unwrap();
        assert!(matches!(
            extract_archive(&archive, &tmp.path().join("out")),
            Err(MirrorError::ArchiveCorrupt { .. })
        ));
    }

    #[test]
    fn test_failed_compress_keeps_previous_archive() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("mirror.tar.gz");
        create_test_archive(&archive, &[("v1/manifest.json", b"{}")]);
        let before = std::fs::read(&archive).unwrap();

        let err = compress_dir(&tmp.path().join("missing"), &archive);
        assert!(err.is_err());
        assert_eq!(std::fs::read(&archive).unwrap(), before);
        assert!(!tmp.path().join("mirror.tar.gz.partial").exists());
    }

    #[test]
    fn test_archive_tag_listing() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("a.tar.gz");
        create_test_archive(&archive, &[("tag1@sha256:deadbeef/manifest.json", b"{}")]);

        let location = RegistryLocation::archive(&archive);
        let source = ArchiveTransport::default().open_source(&location).unwrap();
        let root = PathBuf::from(source.registry().path());
        assert_eq!(root, tmp.path().join("a"));

        let tags = directory::list_tags(&root).unwrap();
        assert_eq!(tags, vec!["tag1"]);

        drop(source);
        assert!(!tmp.path().join("a").exists());
    }

    #[test]
    fn test_open_source_missing_archive() {
        let tmp = TempDir::new().unwrap();
        let location = RegistryLocation::archive(tmp.path().join("nope.tar.gz"));
        let err = ArchiveTransport::default().open_source(&location).unwrap_err();
        assert!(matches!(err, MirrorError::ArchiveCorrupt { .. }));
        assert!(!tmp.path().join("nope").exists());
    }

    #[test]
    fn test_open_source_rejects_other_transports() {
        let location = RegistryLocation::directory("/tmp/images");
        assert!(matches!(
            ArchiveTransport::default().open_source(&location),
            Err(MirrorError::InvalidReference(_))
        ));
    }

    #[test]
    fn test_destination_commit_accumulates() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("mirror.tar.gz");
        create_test_archive(&archive, &[("v1.44.1/manifest.json", b"{}")]);

        let location = RegistryLocation::archive(&archive);
        let dest = ArchiveTransport::default().open_destination(&location).unwrap();
        let root = PathBuf::from(dest.registry().path());
        std::fs::create_dir_all(root.join("v1.45.3")).unwrap();
        std::fs::write(root.join("v1.45.3/manifest.json"), b"{}").unwrap();

        let committed = dest.commit().unwrap();
        assert_eq!(committed, archive);
        assert!(!root.exists());

        let source = ArchiveTransport::default().open_source(&location).unwrap();
        let tags = directory::list_tags(Path::new(source.registry().path())).unwrap();
        assert_eq!(tags, vec!["v1.44.1", "v1.45.3"]);
    }

    #[test]
    fn test_destination_drop_without_commit() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("mirror.tar.gz");
        let location = RegistryLocation::archive(&archive);

        let dest = ArchiveTransport::default().open_destination(&location).unwrap();
        let root = PathBuf::from(dest.registry().path());
        std::fs::write(root.join("partial"), b"x").unwrap();
        drop(dest);

        assert!(!root.exists());
        assert!(!archive.exists());
    }

    #[test]
    fn test_stale_scratch_is_replaced() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("mirror.tar.gz");
        create_test_archive(&archive, &[("v1/manifest.json", b"{}")]);
        std::fs::create_dir_all(tmp.path().join("mirror/leftover@sha256:00")).unwrap();
        std::fs::write(tmp.path().join("mirror/leftover@sha256:00/manifest.json"), b"{}").unwrap();
        std::fs::write(tmp.path().join("mirror").join(SCRATCH_MARKER), b"").unwrap();

        let source = ArchiveTransport::default()
            .open_source(&RegistryLocation::archive(&archive))
            .unwrap();
        let tags = directory::list_tags(Path::new(source.registry().path())).unwrap();
        assert_eq!(tags, vec!["v1"]);
    }

    #[test]
    fn test_existing_directory_is_not_wiped() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("d8.tar.gz");
        create_test_archive(&archive, &[("v1/manifest.json", b"{}")]);
        std::fs::create_dir_all(tmp.path().join("d8")).unwrap();
        std::fs::write(tmp.path().join("d8/precious.txt"), b"keep").unwrap();

        let location = RegistryLocation::archive(&archive);
        let err = ArchiveTransport::default().open_source(&location).unwrap_err();
        assert!(matches!(err, MirrorError::ConfigError(_)), "{err}");
        let err = ArchiveTransport::default().open_destination(&location).unwrap_err();
        assert!(matches!(err, MirrorError::ConfigError(_)), "{err}");

        assert_eq!(std::fs::read(tmp.path().join("d8/precious.txt")).unwrap(), b"keep");
    }

    #[test]
    fn test_committed_archive_omits_scratch_marker() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("mirror.tar.gz");
        let location = RegistryLocation::archive(&archive);

        let dest = ArchiveTransport::default().open_destination(&location).unwrap();
        let root = PathBuf::from(dest.registry().path());
        assert!(root.join(SCRATCH_MARKER).is_file());
        std::fs::create_dir_all(root.join("v1")).unwrap();
        std::fs::write(root.join("v1/manifest.json"), b"{}").unwrap();
        dest.commit().unwrap();

        let out = tmp.path().join("out");
        extract_archive(&archive, &out).unwrap();
        assert!(!out.join(SCRATCH_MARKER).exists());
        assert!(out.join("v1/manifest.json").is_file());
    }

    #[test]
    fn test_truncated_archive_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        std::fs::create_dir_all(src.join("v1")).unwrap();
        let blob: Vec<u8> = (0..16 * 1024u32).map(|i| (i * 7919 % 251) as u8).collect();
        std::fs::write(src.join("v1/blob"), &blob).unwrap();
        std::fs::write(src.join("v1/manifest.json"), b"{}").unwrap();

        let archive = tmp.path().join("full.tar.gz");
        compress_dir(&src, &archive).unwrap();
        let bytes = std::fs::read(&archive).unwrap();

        for (name, len) in [("mid.tar.gz", bytes.len() / 2), ("tail.tar.gz", bytes.len() - 4)] {
            let truncated = tmp.path().join(name);
            std::fs::write(&truncated, &bytes[..len]).unwrap();
            let err = extract_archive(&truncated, &tmp.path().join(name).with_extension("out"))
                .unwrap_err();
            assert!(matches!(err, MirrorError::ArchiveCorrupt { .. }), "{name}: {err}");
        }
    }
}
