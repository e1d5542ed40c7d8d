//! Package lifecycle and tool catalog for super-mcp
//!
//! The registry owns every per-package client: lazy connection with
//! single-flight coalescing, restart, health, the idle reaper for stdio
//! children, and shutdown. The catalog caches per-package tool lists with
//! authentication-aware states and the resource-URI prefix table.

pub mod catalog;
pub mod error;
pub mod registry;

pub use catalog::{
    CatalogEntry, CatalogStatus, CatalogTool, ToolCatalog, ERROR_RETRY_INTERVAL,
};
pub use error::{RegistryError, RegistryResult};
pub use registry::{PackageHealth, PackageRegistry, RestartOutcome, REAPER_INTERVAL};
