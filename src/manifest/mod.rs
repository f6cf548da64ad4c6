// src/manifest/mod.rs

//! Nuspec inspection for package archives
//!
//! A `.nupkg` archive is a zip container carrying a single `.nuspec`
//! descriptor. This module extracts the declared dependency list and the
//! package's own identity from that descriptor. Extraction is deliberately
//! regex-based rather than a full XML parse: it tolerates attribute order,
//! quote style, and malformed surroundings, and it never propagates a
//! failure past this boundary (absence of dependencies and a parse failure
//! look the same to the caller).

use crate::error::{Error, Result};
use crate::version::extract_version;
use regex::Regex;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, warn};
use zip::ZipArchive;

static DEP_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<dependency\b([^>]*)/?>").expect("valid regex"));

static ID_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bid\s*=\s*["']([^"']+)["']"#).expect("valid regex"));

static VERSION_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bversion\s*=\s*["']([^"']+)["']"#).expect("valid regex"));

static ID_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<id>([^<]+)</id>").expect("valid regex"));

static VERSION_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<version>([^<]+)</version>").expect("valid regex"));

/// One dependency declaration from a nuspec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NuspecDependency {
    /// Declared package id
    pub id: String,
    /// Concrete version collapsed from the declared specifier
    pub version: String,
    /// Original specifier string, kept for reference
    pub version_spec: String,
}

/// Read the `.nuspec` text out of an archive.
fn read_nuspec_content(archive_path: &Path) -> Result<String> {
    let file = File::open(archive_path)
        .map_err(|e| Error::IoError(format!("Failed to open {}: {}", archive_path.display(), e)))?;

    let mut archive = ZipArchive::new(file).map_err(|e| {
        Error::ParseError(format!(
            "{} is not a valid nupkg archive: {}",
            archive_path.display(),
            e
        ))
    })?;

    let nuspec_name = (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|f| f.name().to_string()))
        .find(|name| name.to_lowercase().ends_with(".nuspec"))
        .ok_or_else(|| {
            Error::ParseError(format!("No .nuspec found in {}", archive_path.display()))
        })?;

    let mut nuspec = archive
        .by_name(&nuspec_name)
        .map_err(|e| Error::ParseError(format!("Failed to read {}: {}", nuspec_name, e)))?;

    let mut content = String::new();
    nuspec
        .read_to_string(&mut content)
        .map_err(|e| Error::ParseError(format!("Invalid UTF-8 in {}: {}", nuspec_name, e)))?;

    Ok(content)
}

/// Extract the dependency declarations from an archive's nuspec.
///
/// Returns an empty list when the archive is unreadable or carries no
/// nuspec; both cases are logged and neither is an error to the caller.
pub fn parse_nuspec_dependencies(archive_path: &Path) -> Vec<NuspecDependency> {
    let content = match read_nuspec_content(archive_path) {
        Ok(content) => content,
        Err(e) => {
            warn!("{}", e);
            return Vec::new();
        }
    };

    let mut dependencies = Vec::new();

    for caps in DEP_TAG_RE.captures_iter(&content) {
        let attrs = &caps[1];
        let id = ID_ATTR_RE.captures(attrs).map(|c| c[1].to_string());
        let spec = VERSION_ATTR_RE.captures(attrs).map(|c| c[1].to_string());

        if let (Some(id), Some(spec)) = (id, spec) {
            dependencies.push(NuspecDependency {
                id,
                version: extract_version(&spec),
                version_spec: spec,
            });
        }
    }

    if !dependencies.is_empty() {
        debug!(
            "Found {} dependencies in {}",
            dependencies.len(),
            archive_path.display()
        );
    }

    dependencies
}

/// Read the package's own id and version from its nuspec.
///
/// Simple tag text extraction: requires well-formed `<id>` and `<version>`
/// open/close tags but nothing else about the document.
pub fn read_package_identity(archive_path: &Path) -> Result<(String, String)> {
    let content = read_nuspec_content(archive_path)?;

    let id = ID_TAG_RE
        .captures(&content)
        .map(|c| c[1].trim().to_string())
        .ok_or_else(|| {
            Error::ParseError(format!(
                "Could not parse package id from nuspec in {}",
                archive_path.display()
            ))
        })?;

    let version = VERSION_TAG_RE
        .captures(&content)
        .map(|c| c[1].trim().to_string())
        .ok_or_else(|| {
            Error::ParseError(format!(
                "Could not parse package version from nuspec in {}",
                archive_path.display()
            ))
        })?;

    Ok((id, version))
}
