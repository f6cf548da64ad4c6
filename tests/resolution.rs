// tests/resolution.rs

//! End-to-end resolution: scan a projects folder, resolve the consolidated
//! dependencies through an in-memory registry, and verify the downloaded
//! closure and the resulting cache layout.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use orchsync::{
    count_total_packages, scanner, DependencyResolver, Error, ExistenceCache, PackageCache,
    RegistryClient, Result,
};
use sha2::{Digest, Sha512};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::write::FileOptions;
use zip::ZipWriter;

/// Build a minimal nupkg: a zip with a nuspec and a payload file.
fn write_nupkg(path: &Path, id: &str, version: &str, dependencies: &[(&str, &str)]) {
    let dep_lines: String = dependencies
        .iter()
        .map(|(dep_id, dep_spec)| {
            format!(r#"      <dependency id="{}" version="{}" />"#, dep_id, dep_spec)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let nuspec = format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd">
  <metadata>
    <id>{}</id>
    <version>{}</version>
    <authors>integration tests</authors>
    <dependencies>
{}
    </dependencies>
  </metadata>
</package>
"#,
        id, version, dep_lines
    );

    let file = fs::File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    let options: FileOptions = FileOptions::default();

    zip.start_file(format!("{}.nuspec", id), options).unwrap();
    zip.write_all(nuspec.as_bytes()).unwrap();

    // Stored payload keeps the archive above the minimum-size threshold
    // real packages are validated against
    let stored: FileOptions =
        FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    zip.start_file("lib/net45/assembly.dll", stored).unwrap();
    zip.write_all(&[0u8; 2048]).unwrap();
    zip.finish().unwrap();
}

fn write_project(base: &Path, folder: &str, name: &str, deps: &[(&str, &str)]) {
    let dir = base.join(folder);
    fs::create_dir_all(&dir).unwrap();
    let deps_json: Vec<String> = deps
        .iter()
        .map(|(id, spec)| format!(r#""{}": "{}""#, id, spec))
        .collect();
    let manifest = format!(
        r#"{{"name": "{}", "projectVersion": "1.0.0", "dependencies": {{{}}}}}"#,
        name,
        deps_json.join(", ")
    );
    fs::write(dir.join("project.json"), manifest).unwrap();
}

/// Registry serving prebuilt fixtures from a directory.
struct FixtureRegistry {
    fixtures: HashMap<(String, String), PathBuf>,
}

impl FixtureRegistry {
    fn new() -> Self {
        Self {
            fixtures: HashMap::new(),
        }
    }

    fn add(&mut self, dir: &Path, id: &str, version: &str, deps: &[(&str, &str)]) {
        let path = dir.join(format!("{}.{}.nupkg", id, version));
        write_nupkg(&path, id, version, deps);
        self.fixtures
            .insert((id.to_lowercase(), version.to_string()), path);
    }
}

impl RegistryClient for FixtureRegistry {
    fn check_exists(&self, _token: &str, package_id: &str) -> Result<(bool, Vec<String>)> {
        let mut versions: Vec<String> = self
            .fixtures
            .keys()
            .filter(|(id, _)| *id == package_id.to_lowercase())
            .map(|(_, v)| v.clone())
            .collect();
        orchsync::sort_versions_descending(&mut versions);
        Ok((!versions.is_empty(), versions))
    }

    fn download(
        &self,
        _token: &str,
        package_id: &str,
        version: &str,
        target_dir: &Path,
    ) -> Result<PathBuf> {
        let key = (package_id.to_lowercase(), version.to_string());
        let fixture = self
            .fixtures
            .get(&key)
            .ok_or_else(|| Error::NotFoundError(format!("{}@{}", package_id, version)))?;
        let dest = target_dir.join(format!("{}.{}.nupkg", package_id, version));
        fs::copy(fixture, &dest)?;
        Ok(dest)
    }
}

#[test]
fn scan_resolve_install_full_flow() {
    let temp = TempDir::new().unwrap();
    let projects_dir = temp.path().join("projects");
    let fixtures_dir = temp.path().join("registry");
    let downloads_dir = temp.path().join("downloads");
    let cache_root = temp.path().join("cache");
    fs::create_dir_all(&fixtures_dir).unwrap();

    // Two projects sharing one custom library at different specs, plus
    // official packages that must never enter the closure
    write_project(
        &projects_dir,
        "invoice-bot",
        "InvoiceBot",
        &[
            ("Acme.Common.Activities", "[1.2.0]"),
            ("UiPath.Excel.Activities", "2.11.4"),
        ],
    );
    write_project(
        &projects_dir,
        "mail-bot",
        "MailBot",
        &[
            ("Acme.Common.Activities", "1.0.0"),
            ("System.Activities", "6.0.0"),
        ],
    );

    // The custom library pulls a runtime companion transitively
    let mut registry = FixtureRegistry::new();
    registry.add(
        &fixtures_dir,
        "Acme.Common.Activities",
        "1.2.0",
        &[("Acme.Common.Activities.Runtime", "[1.2.0]")],
    );
    registry.add(&fixtures_dir, "Acme.Common.Activities", "1.0.0", &[]);
    registry.add(&fixtures_dir, "Acme.Common.Activities.Runtime", "1.2.0", &[]);

    // Scan and consolidate
    let deps = scanner::scan_project_dependencies(&projects_dir);
    assert_eq!(deps.len(), 4);
    let mut custom = scanner::filter_custom_dependencies(deps, None, true);
    assert_eq!(custom.len(), 1);

    let info = custom.get_mut("Acme.Common.Activities").unwrap();
    assert_eq!(info.projects.len(), 2);
    assert_eq!(info.version_specs.len(), 2);

    // Resolve required versions against the registry
    let (exists, available) = registry.check_exists("token", "Acme.Common.Activities").unwrap();
    assert!(exists);
    info.exists_in_registry = Some(true);
    info.all_resolved_versions = scanner::resolve_all_versions_for_package(info, &available);
    // [1.2.0] resolves exactly; the bare 1.0.0 floor is satisfied by 1.0.0
    assert_eq!(info.all_resolved_versions, vec!["1.2.0", "1.0.0"]);
    let version_specs = info.version_specs.clone();

    let (to_download, already) = scanner::build_download_list(&custom, &downloads_dir);
    assert_eq!(to_download.len(), 2);
    assert!(already.is_empty());

    // Run the transitive resolver
    let cache = PackageCache::new(&cache_root);
    let resolver = DependencyResolver::new(&registry, &cache);
    let mut existence = ExistenceCache::new();
    let outcome = resolver.resolve_all(
        "token",
        &to_download,
        &downloads_dir,
        true,
        Some(&mut existence),
    );

    assert!(outcome.errors.is_empty(), "errors: {:?}", outcome.errors);
    // Both required versions plus the transitive runtime package
    assert_eq!(outcome.stats.downloaded, 3);
    assert_eq!(outcome.stats.installed, 3);
    assert_eq!(outcome.stats.failed, 0);

    let (main_count, transitive_count) = count_total_packages(&outcome.packages);
    assert_eq!(main_count, 2);
    assert_eq!(transitive_count, 1);

    // Downloaded archives are on disk
    assert!(downloads_dir
        .join("Acme.Common.Activities.1.2.0.nupkg")
        .exists());
    assert!(downloads_dir
        .join("Acme.Common.Activities.Runtime.1.2.0.nupkg")
        .exists());

    // Cache layout matches the NuGet convention, hash round-trips
    let pkg_dir = cache_root.join("acme.common.activities").join("1.2.0");
    assert!(pkg_dir.join("acme.common.activities.1.2.0.nupkg").exists());
    assert!(pkg_dir.join("lib/net45/assembly.dll").exists());

    let sidecar =
        fs::read_to_string(pkg_dir.join("acme.common.activities.1.2.0.nupkg.sha512")).unwrap();
    let archive_bytes = fs::read(downloads_dir.join("Acme.Common.Activities.1.2.0.nupkg")).unwrap();
    assert_eq!(
        BASE64.decode(sidecar.trim()).unwrap(),
        Sha512::digest(&archive_bytes).as_slice()
    );

    let metadata: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(pkg_dir.join(".nupkg.metadata")).unwrap(),
    )
    .unwrap();
    assert_eq!(metadata["version"], 2);
    assert!(metadata["source"].is_null());

    // The cache now satisfies both declared specs without the registry
    let (installed, all_satisfied) =
        cache.check_local_cache("Acme.Common.Activities", &version_specs);
    assert_eq!(installed, vec!["1.2.0", "1.0.0"]);
    assert!(all_satisfied);
}

#[test]
fn second_session_skips_archives_already_on_disk() {
    let temp = TempDir::new().unwrap();
    let fixtures_dir = temp.path().join("registry");
    let downloads_dir = temp.path().join("downloads");
    fs::create_dir_all(&fixtures_dir).unwrap();

    let mut registry = FixtureRegistry::new();
    registry.add(&fixtures_dir, "Acme.Lib", "1.0.0", &[]);

    let cache = PackageCache::new(temp.path().join("cache"));
    let resolver = DependencyResolver::new(&registry, &cache);
    let roots = vec![("Acme.Lib".to_string(), "1.0.0".to_string())];

    let first = resolver.resolve_all("token", &roots, &downloads_dir, false, None);
    assert_eq!(first.stats.downloaded, 1);

    // The archive exists now, so the pre-download existence split reports it
    let mut deps = HashMap::new();
    let mut info = scanner::DependencyInfo::new("Acme.Lib");
    info.exists_in_registry = Some(true);
    info.all_resolved_versions = vec!["1.0.0".to_string()];
    deps.insert("Acme.Lib".to_string(), info);

    let (to_download, already) = scanner::build_download_list(&deps, &downloads_dir);
    assert!(to_download.is_empty());
    assert_eq!(already.len(), 1);

    // A fresh session still succeeds: a returned path counts as success
    // whether or not bytes were fetched
    let second = resolver.resolve_all("token", &roots, &downloads_dir, false, None);
    assert!(second.errors.is_empty());
    assert_eq!(second.stats.downloaded, 1);
}
