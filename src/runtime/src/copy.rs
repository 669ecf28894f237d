//! Copy orchestrator.
//!
//! Picks source and destination references for each image and hands them
//! to the transfer collaborator, one image at a time.

use std::sync::Arc;

use a3s_mirror_core::error::{MirrorError, Result};

use crate::cancel::Cancellation;
use crate::oci::reference::{ImageLocator, RegistryLocation, TransportKind};
use crate::transfer::{CopyOptions, ImageTransfer, PolicyContext};

/// Reference to fetch from: registry images carrying a digest are fetched
/// by digest only, so a moved tag cannot change the content.
pub fn source_image(image: &ImageLocator) -> ImageLocator {
    if image.registry().transport() == TransportKind::Registry && image.digest().is_some() {
        return image.with_tag(None);
    }
    image.clone()
}

/// Reference to store into: registry destinations receive tagged images by
/// tag only, so the pushed image is never left untagged.
pub fn destination_image(destination: &RegistryLocation, image: &ImageLocator) -> ImageLocator {
    let target = image.with_registry(destination.clone());
    if destination.transport() == TransportKind::Registry && image.tag().is_some() {
        return target.with_digest(None);
    }
    target
}

/// Copies work items sequentially, stopping at the first failure.
pub struct CopyOrchestrator {
    transfer: Arc<dyn ImageTransfer>,
    policy: PolicyContext,
    options: CopyOptions,
    cancel: Cancellation,
}

impl CopyOrchestrator {
    pub fn new(
        transfer: Arc<dyn ImageTransfer>,
        policy: PolicyContext,
        options: CopyOptions,
        cancel: Cancellation,
    ) -> Self {
        Self {
            transfer,
            policy,
            options,
            cancel,
        }
    }

    /// Copy one image into `destination`.
    ///
    /// Transfer failures are wrapped in `CopyFailed` naming the image.
    pub async fn copy_image(
        &self,
        image: &ImageLocator,
        destination: &RegistryLocation,
    ) -> Result<()> {
        self.cancel.check(&format!("copying {}", image))?;

        let source = source_image(image);
        let target = destination_image(destination, image);

        tracing::info!(source = %source, destination = %target, "Copying image");

        self.transfer
            .copy(&source, &target, &self.policy, &self.options)
            .await
            .map_err(|e| match e {
                MirrorError::Cancelled(_) => e,
                other => MirrorError::copy_failed(image.to_string(), other),
            })
    }

    /// Copy every image in order; returns how many were copied.
    pub async fn copy_all(
        &self,
        images: &[ImageLocator],
        destination: &RegistryLocation,
    ) -> Result<usize> {
        for (i, image) in images.iter().enumerate() {
            tracing::debug!(index = i + 1, total = images.len(), image = %image, "Next image");
            self.copy_image(image, destination).await?;
        }
        Ok(images.len())
    }
}
