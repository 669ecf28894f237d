//! Image storage and transport.
//!
//! Locations come in three transports:
//!
//! ```text
//! docker://host/repo     live registry, reached through RegistryClient
//! dir:/path              one image per tag directory
//! file:/path.tar.gz      dir layout packed into a gzip tar
//!
//! dir layout:
//!   <root>/<sub>/<tag>/
//!   ├── version              "Directory Transport Version: 1.1"
//!   ├── manifest.json
//!   ├── <hex>.manifest.json  (one per image list instance)
//!   └── <hex>                (config and layer blobs)
//! ```

pub mod archive;
pub mod directory;
pub mod layers;
pub mod reference;
pub mod registry;

pub use archive::{ArchiveDestination, ArchiveSource, ArchiveTransport, DirectoryFactory};
pub use directory::DirectoryImage;
pub use layers::{extract_any_file, extract_file};
pub use reference::{ImageLocator, ImageReference, RegistryLocation, TransportKind};
pub use registry::{RegistryAuth, RegistryClient};
