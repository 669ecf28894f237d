//! Layer file extraction.
//!
//! Finds a single file inside the gzip-compressed tar layers of an image
//! stored in the directory layout.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use a3s_mirror_core::error::{MirrorError, Result};
use flate2::read::GzDecoder;
use tar::Archive;

use super::directory::DirectoryImage;
use super::reference::{ImageLocator, RegistryLocation};
use crate::transfer::{CopyOptions, ImageTransfer, PolicyContext};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Search one layer blob for `filename`.
///
/// Blobs that are not gzip, or whose tar stream cannot be read, are skipped
/// by returning `None`.
pub fn find_file_in_layer(layer_path: &Path, filename: &str) -> Result<Option<Vec<u8>>> {
    let mut file = File::open(layer_path)?;
    let mut magic = [0u8; 2];
    if file.read_exact(&mut magic).is_err() || magic != GZIP_MAGIC {
        return Ok(None);
    }
    drop(file);

    let wanted = normalize(filename);
    let file = File::open(layer_path)?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));

    let entries = match archive.entries() {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(layer = %layer_path.display(), error = %e, "Skipping unreadable layer");
            return Ok(None);
        }
    };

    for entry in entries {
        let mut entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(layer = %layer_path.display(), error = %e, "Skipping unreadable layer");
                return Ok(None);
            }
        };

        let matches = entry
            .path()
            .map(|p| normalize(&p.to_string_lossy()) == wanted)
            .unwrap_or(false);
        if !matches || !entry.header().entry_type().is_file() {
            continue;
        }

        let mut data = Vec::new();
        match entry.read_to_end(&mut data) {
            Ok(_) => return Ok(Some(data)),
            Err(e) => {
                tracing::debug!(layer = %layer_path.display(), error = %e, "Truncated layer entry");
                return Ok(None);
            }
        }
    }

    Ok(None)
}

/// Search every blob of a directory image, in file name order.
pub fn find_file_in_image(image_dir: &Path, filename: &str) -> Result<Option<Vec<u8>>> {
    let image = DirectoryImage::open(image_dir)?;
    for blob in image.files()? {
        if let Some(data) = find_file_in_layer(&blob, filename)? {
            tracing::debug!(
                layer = %blob.display(),
                file = filename,
                "Found file in layer"
            );
            return Ok(Some(data));
        }
    }
    Ok(None)
}

/// Fetch `filename` out of an image's layers.
///
/// The image is copied into a temporary directory through `transfer`, which
/// is removed on return. Fails with `MetadataNotFound` when no layer holds
/// the file.
pub async fn extract_file(
    transfer: &dyn ImageTransfer,
    policy: &PolicyContext,
    options: &CopyOptions,
    image: &ImageLocator,
    filename: &str,
) -> Result<Vec<u8>> {
    let (_, data) = extract_any_file(transfer, policy, options, image, &[filename]).await?;
    Ok(data)
}

/// Fetch the first of `filenames` present in an image, copying the image once.
///
/// Returns the matched name with its contents.
pub async fn extract_any_file<'a>(
    transfer: &dyn ImageTransfer,
    policy: &PolicyContext,
    options: &CopyOptions,
    image: &ImageLocator,
    filenames: &[&'a str],
) -> Result<(&'a str, Vec<u8>)> {
    let tmp = tempfile::Builder::new()
        .prefix("a3s-mirror-")
        .tempdir()
        .map_err(|e| MirrorError::ExtractionFailed {
            path: std::env::temp_dir(),
            message: format!("Failed to create temporary directory: {}", e),
        })?;

    let local = image.with_registry(RegistryLocation::directory(tmp.path()));
    transfer.copy(image, &local, policy, options).await?;

    let image_dir: PathBuf = local
        .reference()?
        .directory()
        .map(Path::to_path_buf)
        .ok_or_else(|| MirrorError::InvalidReference(local.to_string()))?;

    for filename in filenames {
        if let Some(data) = find_file_in_image(&image_dir, filename)? {
            return Ok((filename, data));
        }
    }

    Err(MirrorError::MetadataNotFound {
        file: filenames.join(", "),
        image: image.to_string(),
    })
}

fn normalize(path: &str) -> &str {
    let path = path.strip_prefix("./").unwrap_or(path);
    path.trim_start_matches('/')
}
