// src/registry/mod.rs

//! Package registry access
//!
//! The resolver only needs two capabilities from a registry: an existence /
//! available-versions check and a download. [`RegistryClient`] is that seam;
//! [`OrchestratorClient`] is the production implementation against an
//! Orchestrator tenant's OData and NuGet feed surfaces. Tests substitute an
//! in-memory implementation.

mod client;

pub use client::{LibraryEntry, OrchestratorClient};

use crate::error::Result;
use std::path::{Path, PathBuf};

/// Capabilities the dependency resolver requires from a registry.
///
/// Retry and backoff policy is the implementation's concern; the resolver
/// treats any error as an ordinary failure string.
pub trait RegistryClient {
    /// Check whether a package exists, returning its available versions
    /// sorted newest-first when it does.
    fn check_exists(&self, token: &str, package_id: &str) -> Result<(bool, Vec<String>)>;

    /// Download a package archive into `target_dir`, returning the local
    /// path. A pre-existing valid archive on disk counts as success; the
    /// caller treats a returned path as success regardless of whether bytes
    /// were freshly fetched.
    fn download(
        &self,
        token: &str,
        package_id: &str,
        version: &str,
        target_dir: &Path,
    ) -> Result<PathBuf>;
}
