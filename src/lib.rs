// src/lib.rs

//! orchsync
//!
//! Dependency hygiene for teams building automation packages against a
//! private Orchestrator registry. orchsync scans a folder of automation
//! projects, consolidates the NuGet-style dependency requirements they
//! declare, resolves concrete versions against the registry, downloads the
//! transitive closure of custom libraries, and installs each archive into
//! the local NuGet cache so offline builds find them.
//!
//! # Architecture
//!
//! - Scanner: one-level walk over project folders, consolidating
//!   `project.json` dependencies into a per-package map
//! - Version: NuGet range-specifier classification and a total comparator
//!   over dotted version strings
//! - Resolver: recursive download/install of the dependency closure with a
//!   per-session visited set for cycle and duplicate avoidance
//! - Manifest: tolerant nuspec extraction from nupkg archives
//! - Cache: bit-compatible local NuGet cache installation (sha512 + metadata
//!   sidecars)
//! - Registry: the Orchestrator client behind a narrow trait seam

pub mod cache;
pub mod config;
mod error;
pub mod manifest;
pub mod registry;
pub mod resolver;
pub mod scanner;
pub mod version;

pub use cache::PackageCache;
pub use config::{Config, PathsConfig, RegistryConfig};
pub use error::{Error, Result};
pub use manifest::{parse_nuspec_dependencies, read_package_identity, NuspecDependency};
pub use registry::{OrchestratorClient, RegistryClient};
pub use resolver::{
    count_total_packages, DependencyResolver, ExistenceCache, ResolutionOutcome, ResolutionStats,
    ResolvedPackage,
};
pub use scanner::{
    filter_custom_dependencies, is_custom_library, scan_local_projects,
    scan_project_dependencies, DependencyInfo, ProjectInfo, OFFICIAL_PREFIXES,
};
pub use version::{
    compare_versions, increment_version, parse_version_spec, resolve_best_version,
    sort_versions_descending, Bump, SpecKind,
};
