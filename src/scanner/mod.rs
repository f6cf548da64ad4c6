// src/scanner/mod.rs

//! Project dependency scanning and consolidation
//!
//! Walks a folder of automation projects, reads each project's `project.json`
//! manifest, and consolidates the declared dependencies into a single map of
//! package id to [`DependencyInfo`]. Also classifies packages as custom
//! libraries versus official platform packages.

use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Prefixes of official platform packages. These are served from public feeds
/// and are excluded from private transitive resolution.
pub const OFFICIAL_PREFIXES: &[&str] = &[
    "UiPath.",
    "System.",
    "Microsoft.",
    "Newtonsoft.",
    "NuGet.",
];

/// Per-project manifest file name
pub const PROJECT_MANIFEST: &str = "project.json";

/// Consolidated information about one package id across all scanned projects
#[derive(Debug, Clone, Default)]
pub struct DependencyInfo {
    /// Unique package id, as declared
    pub package_id: String,
    /// Distinct version specifier strings seen across projects
    pub version_specs: BTreeSet<String>,
    /// Names of the projects that require this package
    pub projects: BTreeSet<String>,
    /// Which specifier each project declared
    pub project_versions: HashMap<String, String>,
    /// Version chosen to satisfy the union of specs, once resolved
    pub resolved_version: Option<String>,
    /// Every distinct version required across projects, newest first
    pub all_resolved_versions: Vec<String>,
    /// Versions already present in the local cache, newest first
    pub installed_versions: Vec<String>,
    /// Versions the registry reports, newest first
    pub available_versions: Vec<String>,
    /// Tri-state registry existence: unknown / present / absent
    pub exists_in_registry: Option<bool>,
    /// True when every declared spec is satisfied by the local cache
    pub installed_locally: Option<bool>,
    /// Last failure reported while querying or resolving this package
    pub error_message: Option<String>,
}

impl DependencyInfo {
    pub fn new(package_id: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            ..Default::default()
        }
    }
}

/// Summary of a single project folder found during a scan
#[derive(Debug, Clone)]
pub struct ProjectInfo {
    /// Project name from the manifest (folder name when absent)
    pub name: String,
    /// Folder name on disk
    pub folder_name: String,
    /// Absolute path to the project folder
    pub path: PathBuf,
    /// Declared project version
    pub version: String,
    /// Free-form description
    pub description: String,
    /// Folder naming convention marks forked copies
    pub is_fork: bool,
}

#[derive(Debug, Deserialize)]
struct ProjectManifest {
    name: Option<String>,
    #[serde(rename = "projectVersion")]
    project_version: Option<String>,
    description: Option<String>,
    #[serde(default)]
    dependencies: serde_json::Map<String, serde_json::Value>,
}

fn read_manifest(path: &Path) -> Option<ProjectManifest> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Could not read {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(m) => Some(m),
        Err(e) => {
            warn!("Could not parse {}: {}", path.display(), e);
            None
        }
    }
}

/// Version specifiers in project.json are usually strings, but tolerate any
/// JSON scalar by falling back to its textual form.
fn spec_to_string(value: &serde_json::Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    }
}

/// Scan every project under `base_dir` and consolidate their dependencies.
///
/// Walks the immediate subdirectories only (projects are flat under the
/// reference folder). A manifest that fails to parse is warned about and
/// skipped; it never aborts the scan. A missing `base_dir` yields an empty
/// map rather than an error.
pub fn scan_project_dependencies(base_dir: &Path) -> HashMap<String, DependencyInfo> {
    let mut dependencies: HashMap<String, DependencyInfo> = HashMap::new();

    let entries = match fs::read_dir(base_dir) {
        Ok(entries) => entries,
        Err(_) => return dependencies,
    };

    for entry in entries.flatten() {
        let item_path = entry.path();
        if !item_path.is_dir() {
            continue;
        }

        let manifest_path = item_path.join(PROJECT_MANIFEST);
        if !manifest_path.exists() {
            continue;
        }

        let Some(manifest) = read_manifest(&manifest_path) else {
            continue;
        };

        let folder_name = entry.file_name().to_string_lossy().to_string();
        let project_name = manifest.name.unwrap_or(folder_name);
        debug!(
            "Project {} declares {} dependencies",
            project_name,
            manifest.dependencies.len()
        );

        for (pkg_id, spec_value) in &manifest.dependencies {
            let spec = spec_to_string(spec_value);
            let info = dependencies
                .entry(pkg_id.clone())
                .or_insert_with(|| DependencyInfo::new(pkg_id.clone()));
            info.version_specs.insert(spec.clone());
            info.projects.insert(project_name.clone());
            info.project_versions.insert(project_name.clone(), spec);
        }
    }

    dependencies
}

/// List the projects under `base_dir`, sorted by name.
///
/// A folder counts as a project when it carries a parseable manifest;
/// invalid manifests are skipped silently here (the dependency scan is where
/// they get warned about).
pub fn scan_local_projects(base_dir: &Path) -> Vec<ProjectInfo> {
    let mut projects = Vec::new();

    let entries = match fs::read_dir(base_dir) {
        Ok(entries) => entries,
        Err(_) => return projects,
    };

    for entry in entries.flatten() {
        let item_path = entry.path();
        if !item_path.is_dir() {
            continue;
        }

        let manifest_path = item_path.join(PROJECT_MANIFEST);
        if !manifest_path.exists() {
            continue;
        }

        let content = match fs::read_to_string(&manifest_path) {
            Ok(c) => c,
            Err(_) => continue,
        };
        let manifest: ProjectManifest = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(_) => continue,
        };

        let folder_name = entry.file_name().to_string_lossy().to_string();
        let lower = folder_name.to_lowercase();
        projects.push(ProjectInfo {
            name: manifest.name.unwrap_or_else(|| folder_name.clone()),
            folder_name: folder_name.clone(),
            path: item_path,
            version: manifest
                .project_version
                .unwrap_or_else(|| "1.0.0".to_string()),
            description: manifest.description.unwrap_or_default(),
            is_fork: lower.ends_with("-fork") || lower.ends_with("fork"),
        });
    }

    projects.sort_by_key(|p| p.name.to_lowercase());
    projects
}

/// Decide whether a package id names a custom library.
///
/// With `custom_prefixes` given, whitelist mode: the id must start with one
/// of them. Otherwise blacklist mode: anything not matching an official
/// prefix is custom.
pub fn is_custom_library(
    package_id: &str,
    custom_prefixes: Option<&[String]>,
    official_prefixes: Option<&[&str]>,
) -> bool {
    let official = official_prefixes.unwrap_or(OFFICIAL_PREFIXES);

    if let Some(custom) = custom_prefixes {
        if !custom.is_empty() {
            return custom.iter().any(|p| package_id.starts_with(p.as_str()));
        }
    }

    !official.iter().any(|p| package_id.starts_with(p))
}

/// Filter a consolidated dependency map down to custom libraries.
///
/// `use_prefix_filter = false` bypasses filtering and returns everything.
pub fn filter_custom_dependencies(
    dependencies: HashMap<String, DependencyInfo>,
    custom_prefixes: Option<&[String]>,
    use_prefix_filter: bool,
) -> HashMap<String, DependencyInfo> {
    if !use_prefix_filter {
        return dependencies;
    }

    dependencies
        .into_iter()
        .filter(|(pkg_id, _)| is_custom_library(pkg_id, custom_prefixes, None))
        .collect()
}

/// Display-friendly version for a dependency: the resolved version when
/// known, the first spec's extracted version otherwise, the raw spec as a
/// last resort.
pub fn get_display_version(info: &DependencyInfo) -> String {
    if let Some(ref resolved) = info.resolved_version {
        return resolved.clone();
    }

    if let Some(first_spec) = info.version_specs.iter().next() {
        let (_, extracted) = crate::version::parse_version_spec(first_spec);
        return extracted.unwrap_or_else(|| first_spec.clone());
    }

    "Unknown".to_string()
}

/// Format an owning-projects list for display, truncated past `max_display`.
pub fn format_projects_list(projects: &BTreeSet<String>, max_display: usize) -> String {
    let names: Vec<&str> = projects.iter().map(String::as_str).collect();
    if names.len() <= max_display {
        return names.join(", ");
    }
    format!(
        "{} (+{} more)",
        names[..max_display].join(", "),
        names.len() - max_display
    )
}

/// Resolve every distinct version a package needs across all projects.
///
/// Each spec resolves independently against the available list; the distinct
/// winners come back newest-first.
pub fn resolve_all_versions_for_package(
    info: &DependencyInfo,
    available_versions: &[String],
) -> Vec<String> {
    if available_versions.is_empty() {
        return Vec::new();
    }

    let mut resolved: BTreeSet<String> = BTreeSet::new();
    for spec in &info.version_specs {
        if let Some(version) = crate::version::resolve_best_version(available_versions, spec) {
            resolved.insert(version);
        }
    }

    let mut versions: Vec<String> = resolved.into_iter().collect();
    crate::version::sort_versions_descending(&mut versions);
    versions
}

/// Downloaded archives smaller than this are assumed to be error pages,
/// not packages.
const MIN_PACKAGE_SIZE: u64 = 1000;

/// Check which (package id, version) pairs already exist as archives in
/// `target_dir`.
pub fn check_files_exist(
    package_versions: &[(String, String)],
    target_dir: &Path,
) -> HashMap<(String, String), bool> {
    let mut result = HashMap::new();

    for (pkg_id, version) in package_versions {
        let path = target_dir.join(format!("{}.{}.nupkg", pkg_id, version));
        let exists = path
            .metadata()
            .map(|m| m.is_file() && m.len() > MIN_PACKAGE_SIZE)
            .unwrap_or(false);
        result.insert((pkg_id.clone(), version.clone()), exists);
    }

    result
}

/// Split the full required-version list into (to download, already present).
///
/// Only packages confirmed to exist in the registry with resolved versions
/// are considered.
pub fn build_download_list(
    custom_deps: &HashMap<String, DependencyInfo>,
    target_dir: &Path,
) -> (Vec<(String, String)>, Vec<(String, String)>) {
    let mut all_versions = Vec::new();

    for (pkg_id, info) in custom_deps {
        if info.exists_in_registry == Some(true) {
            for version in &info.all_resolved_versions {
                all_versions.push((pkg_id.clone(), version.clone()));
            }
        }
    }

    let existence = check_files_exist(&all_versions, target_dir);

    let mut to_download = Vec::new();
    let mut already_exists = Vec::new();
    for pv in all_versions {
        if existence.get(&pv).copied().unwrap_or(false) {
            already_exists.push(pv);
        } else {
            to_download.push(pv);
        }
    }

    (to_download, already_exists)
}
