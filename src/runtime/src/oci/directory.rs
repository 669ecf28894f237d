//! Directory image layout.
//!
//! One directory per image holding `manifest.json`, a `version` marker and
//! one file per blob named by its hex digest. Instance manifests of an image
//! list are stored as `<hex>.manifest.json`.

use std::path::{Path, PathBuf};

use a3s_mirror_core::error::{MirrorError, Result};

/// Top-level manifest file of a directory image.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Layout marker file.
pub const VERSION_FILE: &str = "version";

/// Contents of the layout marker file.
pub const VERSION_CONTENT: &str = "Directory Transport Version: 1.1\n";

/// A single image stored as a directory.
#[derive(Debug, Clone)]
pub struct DirectoryImage {
    path: PathBuf,
}

impl DirectoryImage {
    /// Create (or reuse) an image directory and write the layout marker.
    pub fn create(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path).map_err(|e| MirrorError::ExtractionFailed {
            path: path.to_path_buf(),
            message: format!("Failed to create image directory: {}", e),
        })?;
        std::fs::write(path.join(VERSION_FILE), VERSION_CONTENT).map_err(|e| {
            MirrorError::ExtractionFailed {
                path: path.join(VERSION_FILE),
                message: e.to_string(),
            }
        })?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Open an existing image directory; it must hold a manifest.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.join(MANIFEST_FILE).is_file() {
            return Err(MirrorError::InvalidReference(format!(
                "{} is not a directory image: no {}",
                path.display(),
                MANIFEST_FILE
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File path of a blob.
    pub fn blob_path(&self, digest: &str) -> Result<PathBuf> {
        Ok(self.path.join(digest_hex(digest)?))
    }

    pub fn has_blob(&self, digest: &str) -> bool {
        self.blob_path(digest).map(|p| p.is_file()).unwrap_or(false)
    }

    pub fn write_blob(&self, digest: &str, data: &[u8]) -> Result<()> {
        let path = self.blob_path(digest)?;
        std::fs::write(&path, data).map_err(|e| MirrorError::ExtractionFailed {
            path,
            message: format!("Failed to write blob {}: {}", digest, e),
        })
    }

    pub fn read_blob(&self, digest: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(digest)?;
        std::fs::read(&path).map_err(|e| {
            MirrorError::Other(format!("Failed to read blob {}: {}", path.display(), e))
        })
    }

    /// Write the top-level manifest, or an instance manifest when `instance` is set.
    pub fn write_manifest(&self, data: &[u8], instance: Option<&str>) -> Result<()> {
        let path = self.manifest_path(instance)?;
        std::fs::write(&path, data).map_err(|e| MirrorError::ExtractionFailed {
            path,
            message: format!("Failed to write manifest: {}", e),
        })
    }

    pub fn read_manifest(&self, instance: Option<&str>) -> Result<Vec<u8>> {
        let path = self.manifest_path(instance)?;
        std::fs::read(&path).map_err(|e| {
            MirrorError::Other(format!(
                "Failed to read manifest {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Regular files of the image in name order.
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    fn manifest_path(&self, instance: Option<&str>) -> Result<PathBuf> {
        match instance {
            None => Ok(self.path.join(MANIFEST_FILE)),
            Some(digest) => Ok(self
                .path
                .join(format!("{}.{}", digest_hex(digest)?, MANIFEST_FILE))),
        }
    }
}

/// Hex part of a `sha256:<hex>` digest, validated as a file name.
pub fn digest_hex(digest: &str) -> Result<&str> {
    let hex = digest.split_once(':').map(|(_, h)| h).unwrap_or(digest);
    if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(MirrorError::InvalidReference(format!(
            "invalid digest '{}'",
            digest
        )));
    }
    Ok(hex)
}

/// Tags of the images stored directly under `root`.
///
/// Each child directory holding a manifest is named `tag[@digest]`; the
/// digest suffix is dropped. A missing root has no tags.
pub fn list_tags(root: &Path) -> Result<Vec<String>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut tags = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() || !entry.path().join(MANIFEST_FILE).is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let tag = name.split('@').next().unwrap_or(&name).to_string();
        if !tag.is_empty() {
            tags.push(tag);
        }
    }
    tags.sort();
    tags.dedup();
    Ok(tags)
}

/// Recursively copy a directory tree.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}
