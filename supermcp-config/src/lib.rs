//! Configuration management for super-mcp
//!
//! Loads one or more JSON config documents, follows `configPaths`
//! references, merges them deterministically, and produces validated
//! package descriptors plus the security configuration. Invalid entries
//! are never fatal; they are collected as skipped packages with a reason.

pub mod descriptor;
pub mod error;
pub mod expand;
pub mod loader;

pub use descriptor::{
    normalize_entry, HttpSubtype, NormalizedPackage, PackageDescriptor, SkippedPackage,
    TransportKind, Visibility,
};
pub use error::{ConfigError, ConfigResult};
pub use expand::{expand_str, expand_value};
pub use loader::{ConfigLoader, LoadedConfig, SecurityConfig, MAX_CONFIG_DEPTH};
