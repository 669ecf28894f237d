//! A3S Mirror CLI - incremental release mirroring.

pub mod commands;
pub mod output;
