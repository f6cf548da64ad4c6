// src/resolver/mod.rs

//! Transitive dependency resolution
//!
//! Given a set of root (package id, version) pairs, downloads each package,
//! reads its nuspec to discover further dependencies, and recurses until the
//! full closure of custom libraries is on disk and (optionally) installed in
//! the local cache. A per-session visited set guarantees termination on
//! dependency cycles and prevents duplicate downloads; official platform
//! packages are excluded from the closure since public feeds serve them.
//!
//! No error escapes a resolution session: every failure is captured as a
//! string on the affected node and in the aggregated error list, and the
//! traversal continues with siblings and other roots. The only per-branch
//! hard stop is a failed download, since without an archive there is nothing
//! to parse dependencies from.

use crate::cache::PackageCache;
use crate::manifest;
use crate::registry::RegistryClient;
use crate::scanner::is_custom_library;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One node in the resolution result tree.
///
/// The tree has no back-edges: re-encountering a (package id, version) pair
/// yields a lightweight stub marked `skipped` instead of a second subtree.
#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    pub package_id: String,
    pub version: String,
    /// Local archive path, set once downloaded
    pub archive_path: Option<PathBuf>,
    /// Child packages discovered from this package's nuspec
    pub dependencies: Vec<ResolvedPackage>,
    pub downloaded: bool,
    pub installed: bool,
    /// True when this (id, version) was already processed earlier in the
    /// session (duplicate or cycle back-reference)
    pub skipped: bool,
    pub error: Option<String>,
}

impl ResolvedPackage {
    fn new(package_id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            version: version.into(),
            archive_path: None,
            dependencies: Vec::new(),
            downloaded: false,
            installed: false,
            skipped: false,
            error: None,
        }
    }
}

/// Counters for one resolution session, read-only after completion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionStats {
    pub downloaded: usize,
    pub installed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Result of a [`DependencyResolver::resolve_all`] call
#[derive(Debug)]
pub struct ResolutionOutcome {
    /// One tree per requested root package
    pub packages: Vec<ResolvedPackage>,
    /// Flat, human-readable list of everything that failed
    pub errors: Vec<String>,
    pub stats: ResolutionStats,
}

/// Memo of registry existence checks: package id -> (exists, versions).
///
/// Callers that resolve several packages against the same registry state
/// share one of these across the session to avoid repeated lookups.
pub type ExistenceCache = HashMap<String, (bool, Vec<String>)>;

/// Per-call mutable state: the visited set and the counters.
///
/// Created fresh inside every `resolve_all` invocation, never shared
/// between sessions.
struct ResolutionSession {
    visited: HashSet<(String, String)>,
    stats: ResolutionStats,
}

impl ResolutionSession {
    fn new() -> Self {
        Self {
            visited: HashSet::new(),
            stats: ResolutionStats::default(),
        }
    }
}

/// Transitive dependency resolver over a registry and a local cache
pub struct DependencyResolver<'a> {
    registry: &'a dyn RegistryClient,
    cache: &'a PackageCache,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(registry: &'a dyn RegistryClient, cache: &'a PackageCache) -> Self {
        Self { registry, cache }
    }

    /// Resolve and download a set of root packages with their transitive
    /// dependencies.
    ///
    /// The session's visited set and statistics are fresh for this call.
    /// `target_dir` is created if absent. When `existence_cache` is given,
    /// each package id is checked against the registry (once) before any
    /// download attempt.
    pub fn resolve_all(
        &self,
        token: &str,
        root_packages: &[(String, String)],
        target_dir: &Path,
        install_to_cache: bool,
        mut existence_cache: Option<&mut ExistenceCache>,
    ) -> ResolutionOutcome {
        let mut session = ResolutionSession::new();
        let mut packages = Vec::new();
        let mut errors = Vec::new();

        if let Err(e) = fs::create_dir_all(target_dir) {
            errors.push(format!(
                "Failed to create {}: {}",
                target_dir.display(),
                e
            ));
            return ResolutionOutcome {
                packages,
                errors,
                stats: session.stats,
            };
        }

        info!(
            "Resolving {} root packages into {}",
            root_packages.len(),
            target_dir.display()
        );

        for (pkg_id, version) in root_packages {
            let node = self.resolve_recursive(
                token,
                pkg_id,
                version,
                target_dir,
                install_to_cache,
                existence_cache.as_deref_mut(),
                &mut session,
                &mut errors,
            );
            packages.push(node);
        }

        info!(
            "Resolution complete: {} downloaded, {} installed, {} skipped, {} failed",
            session.stats.downloaded,
            session.stats.installed,
            session.stats.skipped,
            session.stats.failed
        );

        ResolutionOutcome {
            packages,
            errors,
            stats: session.stats,
        }
    }

    /// Resolve one package and recurse into its dependencies.
    #[allow(clippy::too_many_arguments)]
    fn resolve_recursive(
        &self,
        token: &str,
        package_id: &str,
        version: &str,
        target_dir: &Path,
        install_to_cache: bool,
        mut existence_cache: Option<&mut ExistenceCache>,
        session: &mut ResolutionSession,
        errors: &mut Vec<String>,
    ) -> ResolvedPackage {
        let mut pkg = ResolvedPackage::new(package_id, version);

        // Duplicate / cycle short-circuit. The key is inserted before any
        // descent so a cycle back to an ancestor terminates immediately.
        let key = (package_id.to_lowercase(), version.to_string());
        if session.visited.contains(&key) {
            debug!("Already processed: {}@{}", package_id, version);
            pkg.downloaded = true;
            pkg.skipped = true;
            session.stats.skipped += 1;
            return pkg;
        }
        session.visited.insert(key);

        // Registry existence check, memoized per package id
        if let Some(cache) = existence_cache.as_deref_mut() {
            let (exists, _) = cache
                .entry(package_id.to_string())
                .or_insert_with(|| match self.registry.check_exists(token, package_id) {
                    Ok(result) => result,
                    Err(e) => {
                        warn!("Existence check failed for {}: {}", package_id, e);
                        (false, Vec::new())
                    }
                });
            if !*exists {
                pkg.error = Some("Package not found in registry".to_string());
                errors.push(format!("{}@{}: Not found in registry", package_id, version));
                session.stats.failed += 1;
                return pkg;
            }
        }

        // Download. A failure here ends the branch: no archive, no deps.
        let archive_path =
            match self.registry.download(token, package_id, version, target_dir) {
                Ok(path) => path,
                Err(e) => {
                    let msg = e.to_string();
                    pkg.error = Some(msg.clone());
                    errors.push(format!("{}@{}: {}", package_id, version, msg));
                    session.stats.failed += 1;
                    return pkg;
                }
            };

        pkg.archive_path = Some(archive_path.clone());
        pkg.downloaded = true;
        session.stats.downloaded += 1;
        debug!("Downloaded {}@{}", package_id, version);

        // Cache installation failure is reported but does not stop the tree
        if install_to_cache {
            match self.cache.install(&archive_path) {
                Ok(_) => {
                    pkg.installed = true;
                    session.stats.installed += 1;
                }
                Err(e) => {
                    warn!("Install failed for {}: {}", package_id, e);
                    errors.push(format!("Install failed {}: {}", package_id, e));
                }
            }
        }

        // Discover and recurse into transitive dependencies, in nuspec order
        for dep in manifest::parse_nuspec_dependencies(&archive_path) {
            if !is_custom_library(&dep.id, None, None) {
                debug!("Skipping official package: {}", dep.id);
                continue;
            }

            debug!("Resolving dependency: {}@{}", dep.id, dep.version);
            let child = self.resolve_recursive(
                token,
                &dep.id,
                &dep.version,
                target_dir,
                install_to_cache,
                existence_cache.as_deref_mut(),
                session,
                errors,
            );
            pkg.dependencies.push(child);
        }

        pkg
    }
}

/// Count packages in a resolution result: (roots, tree edges).
///
/// The transitive count tallies every node in every subtree, so a package
/// reached from two roots counts twice here even though the visited set
/// downloaded it once. This is a tree-edge statistic, not a unique-download
/// count.
pub fn count_total_packages(resolved: &[ResolvedPackage]) -> (usize, usize) {
    fn count_deps(pkg: &ResolvedPackage) -> usize {
        pkg.dependencies.len() + pkg.dependencies.iter().map(count_deps).sum::<usize>()
    }

    let main_count = resolved.len();
    let transitive_count = resolved.iter().map(count_deps).sum();
    (main_count, transitive_count)
}
