// src/cache/mod.rs

//! Local NuGet package cache
//!
//! Installs package archives into the standard local cache layout so that
//! subsequent builds find them offline:
//!
//! ```text
//! <root>/<id-lowercase>/<version>/
//!     ... extracted archive contents ...
//!     <id-lowercase>.<version>.nupkg         copy of the original archive
//!     <id-lowercase>.<version>.nupkg.sha512  base64 SHA-512 of the archive
//!     .nupkg.metadata                        JSON sidecar
//! ```
//!
//! The cache root is always injected by the caller; `default_root` merely
//! provides the conventional `~/.nuget/packages` location.

use crate::error::{Error, Result};
use crate::manifest;
use crate::version::{compare_versions, parse_version_spec, sort_versions_descending};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;
use sha2::{Digest, Sha512};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zip::ZipArchive;

/// Sidecar file recording the content hash, in the layout NuGet expects
#[derive(Debug, Serialize)]
struct CacheMetadata {
    version: u32,
    #[serde(rename = "contentHash")]
    content_hash: String,
    /// Always null: marks a locally/offline-installed package, as opposed to
    /// one restored directly from a remote feed
    source: Option<String>,
}

/// Filesystem-backed package cache keyed by (package id, version)
#[derive(Debug, Clone)]
pub struct PackageCache {
    root: PathBuf,
}

impl PackageCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Conventional cache location: `~/.nuget/packages`
    pub fn default_root() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".nuget")
            .join("packages")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn package_dir(&self, package_id: &str, version: &str) -> PathBuf {
        self.root.join(package_id.to_lowercase()).join(version)
    }

    /// Check whether a (package id, version) pair is installed.
    pub fn exists(&self, package_id: &str, version: &str) -> bool {
        self.package_dir(package_id, version).is_dir()
    }

    /// Install an archive into the cache.
    ///
    /// Extracts the full archive contents into the package directory, copies
    /// the archive alongside under its lowercase-normalized name, and writes
    /// the sha512 and metadata sidecars. Returns the installed (id, version).
    pub fn install(&self, archive_path: &Path) -> Result<(String, String)> {
        let (package_id, version) = manifest::read_package_identity(archive_path)
            .map_err(|e| Error::InstallError(e.to_string()))?;

        let package_dir = self.package_dir(&package_id, &version);
        fs::create_dir_all(&package_dir).map_err(|e| {
            Error::InstallError(format!(
                "Failed to create {}: {}",
                package_dir.display(),
                e
            ))
        })?;

        extract_archive(archive_path, &package_dir)?;

        let basename = format!("{}.{}.nupkg", package_id.to_lowercase(), version);
        let archive_copy = package_dir.join(&basename);
        fs::copy(archive_path, &archive_copy).map_err(|e| {
            Error::InstallError(format!(
                "Failed to copy archive to {}: {}",
                archive_copy.display(),
                e
            ))
        })?;

        // SHA-512 of the raw archive bytes, base64-encoded
        let archive_bytes = fs::read(archive_path)
            .map_err(|e| Error::InstallError(format!("Failed to read archive: {}", e)))?;
        let content_hash = BASE64.encode(Sha512::digest(&archive_bytes));

        fs::write(
            package_dir.join(format!("{}.sha512", basename)),
            &content_hash,
        )
        .map_err(|e| Error::InstallError(format!("Failed to write hash sidecar: {}", e)))?;

        let metadata = CacheMetadata {
            version: 2,
            content_hash,
            source: None,
        };
        let metadata_json = serde_json::to_string_pretty(&metadata)
            .map_err(|e| Error::InstallError(format!("Failed to encode metadata: {}", e)))?;
        fs::write(package_dir.join(".nupkg.metadata"), metadata_json)
            .map_err(|e| Error::InstallError(format!("Failed to write metadata: {}", e)))?;

        info!("Installed {} v{} to cache", package_id, version);
        Ok((package_id, version))
    }

    /// List the versions of a package already installed, newest first.
    ///
    /// A version directory only counts when it actually holds an archive or
    /// a nuspec; bare directories left by aborted installs are ignored.
    pub fn installed_versions(&self, package_id: &str) -> Vec<String> {
        let package_dir = self.root.join(package_id.to_lowercase());
        let mut versions = Vec::new();

        let entries = match fs::read_dir(&package_dir) {
            Ok(entries) => entries,
            Err(_) => return versions,
        };

        for entry in entries.flatten() {
            let version_path = entry.path();
            if !version_path.is_dir() {
                continue;
            }
            let version = entry.file_name().to_string_lossy().to_string();

            let nupkg = version_path.join(format!(
                "{}.{}.nupkg",
                package_id.to_lowercase(),
                version
            ));
            let has_nuspec = fs::read_dir(&version_path)
                .map(|mut dir| {
                    dir.any(|f| {
                        f.map(|f| {
                            f.file_name()
                                .to_string_lossy()
                                .to_lowercase()
                                .ends_with(".nuspec")
                        })
                        .unwrap_or(false)
                    })
                })
                .unwrap_or(false);

            if nupkg.exists() || has_nuspec {
                versions.push(version);
            }
        }

        sort_versions_descending(&mut versions);
        versions
    }

    /// Check the cache against a package's declared version specs.
    ///
    /// Returns the installed versions (newest first) and whether every spec
    /// is satisfied by some installed version. Much cheaper than a registry
    /// round trip, so callers run this first.
    pub fn check_local_cache(
        &self,
        package_id: &str,
        version_specs: &BTreeSet<String>,
    ) -> (Vec<String>, bool) {
        let installed = self.installed_versions(package_id);

        if installed.is_empty() || version_specs.is_empty() {
            return (installed, false);
        }

        let mut satisfied = 0;
        for spec in version_specs {
            let (_, extracted) = parse_version_spec(spec);
            let Some(floor) = extracted else { continue };

            if installed.iter().any(|v| *v == floor)
                || installed
                    .iter()
                    .any(|v| compare_versions(v, &floor) != Ordering::Less)
            {
                satisfied += 1;
            }
        }

        let all_satisfied = satisfied == version_specs.len();
        (installed, all_satisfied)
    }

    /// Annotate a consolidated dependency map with local cache state.
    ///
    /// Returns the number of packages fully satisfied without touching the
    /// registry.
    pub fn annotate_local_cache(
        &self,
        dependencies: &mut std::collections::HashMap<String, crate::scanner::DependencyInfo>,
    ) -> usize {
        let mut fully_installed = 0;

        for (pkg_id, info) in dependencies.iter_mut() {
            let (installed, all_satisfied) = self.check_local_cache(pkg_id, &info.version_specs);
            info.installed_versions = installed;
            info.installed_locally = Some(all_satisfied);
            if all_satisfied {
                fully_installed += 1;
            }
        }

        fully_installed
    }
}

/// Extract the full contents of a zip archive into `dest_dir`.
///
/// Entry paths are validated against traversal outside the destination.
fn extract_archive(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .map_err(|e| Error::InstallError(format!("Failed to open archive: {}", e)))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| Error::InstallError(format!("Not a valid archive: {}", e)))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| Error::InstallError(format!("Failed to read archive entry: {}", e)))?;

        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            warn!("Skipping unsafe archive entry: {}", entry.name());
            continue;
        };
        let out_path = dest_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .map_err(|e| Error::InstallError(format!("Failed to create dir: {}", e)))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::InstallError(format!("Failed to create dir: {}", e)))?;
        }

        let mut out_file = File::create(&out_path).map_err(|e| {
            Error::InstallError(format!("Failed to create {}: {}", out_path.display(), e))
        })?;
        io::copy(&mut entry, &mut out_file)
            .map_err(|e| Error::InstallError(format!("Failed to extract entry: {}", e)))?;
    }

    Ok(())
}
