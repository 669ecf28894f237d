use std::path::PathBuf;

use thiserror::Error;

/// A3S Mirror error types
#[derive(Error, Debug)]
pub enum MirrorError {
    /// A version string could not be parsed
    #[error("Invalid version '{version}': {message}")]
    InvalidVersion { version: String, message: String },

    /// A version line required by the diff walk is absent from the source
    #[error("version {version} from source: no such version")]
    MissingSourceVersion { version: String },

    /// A ledger that had to contain at least one version was empty
    #[error("No versions found in {location}")]
    NoVersions { location: String },

    /// No layer of the image contained the requested file
    #[error("Metadata file '{file}' not found in image {image}")]
    MetadataNotFound { file: String, image: String },

    /// The metadata file exists but cannot be interpreted
    #[error("Malformed metadata in image {image}: {message}")]
    MetadataMalformed { image: String, message: String },

    /// Truncated or invalid gzip/tar stream
    #[error("Archive {} is corrupt: {message}", .archive.display())]
    ArchiveCorrupt { archive: PathBuf, message: String },

    /// Filesystem failure while writing extracted entries
    #[error("Extraction to {} failed: {message}", .path.display())]
    ExtractionFailed { path: PathBuf, message: String },

    /// A registry location or image reference cannot be resolved
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Container registry error reported by the transfer client
    #[error("Registry error: {registry} - {message}")]
    Registry { registry: String, message: String },

    /// Copying a single image failed
    #[error("Failed to copy image {image}: {source}")]
    CopyFailed {
        image: String,
        #[source]
        source: Box<MirrorError>,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The run was cancelled at an I/O boundary
    #[error("Cancelled before {0}")]
    Cancelled(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl MirrorError {
    /// Attach the identifier of the image being copied to an error.
    pub fn copy_failed(image: impl Into<String>, source: MirrorError) -> Self {
        MirrorError::CopyFailed {
            image: image.into(),
            source: Box::new(source),
        }
    }
}

impl From<serde_json::Error> for MirrorError {
    fn from(err: serde_json::Error) -> Self {
        MirrorError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for MirrorError {
    fn from(err: serde_yaml::Error) -> Self {
        MirrorError::SerializationError(err.to_string())
    }
}

/// Result type alias for A3S Mirror operations
pub type Result<T> = std::result::Result<T, MirrorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_source_version_display() {
        let error = MirrorError::MissingSourceVersion {
            version: "v1.45".to_string(),
        };
        assert_eq!(error.to_string(), "version v1.45 from source: no such version");
    }

    #[test]
    fn test_invalid_version_display() {
        let error = MirrorError::InvalidVersion {
            version: "vX".to_string(),
            message: "unexpected character".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid version 'vX': unexpected character"
        );
    }

    #[test]
    fn test_metadata_not_found_display() {
        let error = MirrorError::MetadataNotFound {
            file: "version.json".to_string(),
            image: "docker://registry.example.com/release-channel:stable".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Metadata file 'version.json' not found in image docker://registry.example.com/release-channel:stable"
        );
    }

    #[test]
    fn test_archive_corrupt_display() {
        let error = MirrorError::ArchiveCorrupt {
            archive: PathBuf::from("/tmp/mirror.tar.gz"),
            message: "invalid gzip header".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Archive /tmp/mirror.tar.gz is corrupt: invalid gzip header"
        );
    }

    #[test]
    fn test_copy_failed_keeps_source() {
        let error = MirrorError::copy_failed(
            "docker://registry.example.com/repo:v1.45.3",
            MirrorError::Registry {
                registry: "registry.example.com".to_string(),
                message: "unauthorized".to_string(),
            },
        );
        assert_eq!(
            error.to_string(),
            "Failed to copy image docker://registry.example.com/repo:v1.45.3: Registry error: registry.example.com - unauthorized"
        );
        let source = std::error::Error::source(&error).unwrap();
        assert!(source.to_string().contains("unauthorized"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: MirrorError = io_error.into();
        assert!(matches!(error, MirrorError::IoError(_)));
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ invalid");
        let error: MirrorError = result.unwrap_err().into();
        assert!(matches!(error, MirrorError::SerializationError(_)));
    }

    #[test]
    fn test_serde_yaml_error_conversion() {
        let result: std::result::Result<serde_yaml::Value, _> =
            serde_yaml::from_str("invalid: yaml: content:");
        let error: MirrorError = result.unwrap_err().into();
        assert!(matches!(error, MirrorError::SerializationError(_)));
    }

    #[test]
    fn test_cancelled_display() {
        let error = MirrorError::Cancelled("listing tags".to_string());
        assert_eq!(error.to_string(), "Cancelled before listing tags");
    }
}
