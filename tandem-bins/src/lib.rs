//! Shared plumbing for the tandem binaries

pub mod common;
