//! A3S Mirror Core - Foundational Types
//!
//! This crate provides the error taxonomy, run configuration and progress
//! events shared by the mirroring engine and its front-ends.

pub mod config;
pub mod error;
pub mod event;

// Re-export commonly used types
pub use config::{ChannelConfig, CredentialsConfig, ExtraImage, MirrorConfig, ModulesConfig};
pub use error::{MirrorError, Result};
pub use event::{EventEmitter, EventPayload, MirrorEvent};

/// A3S Mirror version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
