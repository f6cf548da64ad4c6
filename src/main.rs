// src/main.rs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use orchsync::{
    count_total_packages, scanner, Config, DependencyResolver, ExistenceCache,
    OrchestratorClient, PackageCache, RegistryClient,
};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "orchsync")]
#[command(author, version, about = "Sync automation project dependencies from an Orchestrator registry", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "orchsync.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a projects folder and print the consolidated dependency table
    Scan {
        /// Folder containing the automation project folders
        dir: PathBuf,
        /// Include official platform packages instead of custom-only
        #[arg(long)]
        all: bool,
    },
    /// Scan, resolve against the registry, and download the full closure
    Resolve {
        /// Folder containing the automation project folders
        dir: PathBuf,
        /// Directory downloaded archives land in
        #[arg(short, long, default_value = "packages")]
        output: PathBuf,
        /// Download only; skip local cache installation
        #[arg(long)]
        no_install: bool,
    },
    /// Authenticate and print a bearer token
    Token,
    /// List the published versions of a library, newest first
    Versions {
        /// Package id to query
        package_id: String,
    },
    /// Upload a package archive to the registry
    Upload {
        /// Path to the .nupkg file
        nupkg: PathBuf,
    },
    /// Install a local package archive into the NuGet cache
    Install {
        /// Path to the .nupkg file
        nupkg: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Scan { dir, all } => cmd_scan(&config, &dir, all),
        Commands::Resolve {
            dir,
            output,
            no_install,
        } => cmd_resolve(&config, &dir, &output, !no_install),
        Commands::Token => {
            let client = OrchestratorClient::new(&config.registry)?;
            println!("{}", client.get_token()?);
            Ok(())
        }
        Commands::Versions { package_id } => {
            let client = OrchestratorClient::new(&config.registry)?;
            let token = client.get_token()?;
            for version in client.get_library_versions(&token, &package_id)? {
                println!("{version}");
            }
            Ok(())
        }
        Commands::Upload { nupkg } => {
            let client = OrchestratorClient::new(&config.registry)?;
            let token = client.get_token()?;
            client.upload_package(&token, &nupkg)?;
            println!("Uploaded {}", nupkg.display());
            Ok(())
        }
        Commands::Install { nupkg } => {
            let cache = PackageCache::new(config.cache_root());
            let (id, version) = cache.install(&nupkg)?;
            println!("Installed {} v{} to {}", id, version, cache.root().display());
            Ok(())
        }
    }
}

fn custom_prefixes(config: &Config) -> Option<&[String]> {
    if config.paths.custom_prefixes.is_empty() {
        None
    } else {
        Some(&config.paths.custom_prefixes)
    }
}

fn cmd_scan(config: &Config, dir: &PathBuf, all: bool) -> Result<()> {
    let dependencies = scanner::scan_project_dependencies(dir);
    let mut dependencies =
        scanner::filter_custom_dependencies(dependencies, custom_prefixes(config), !all);

    let cache = PackageCache::new(config.cache_root());
    let satisfied = cache.annotate_local_cache(&mut dependencies);

    let mut rows: Vec<_> = dependencies.values().collect();
    rows.sort_by(|a, b| a.package_id.cmp(&b.package_id));

    for info in &rows {
        let local = match info.installed_locally {
            Some(true) => "cached",
            _ => "missing",
        };
        println!(
            "{:<50} {:<12} {:<8} {}",
            info.package_id,
            scanner::get_display_version(info),
            local,
            scanner::format_projects_list(&info.projects, 3)
        );
    }
    println!(
        "\n{} packages across projects, {} fully satisfied from local cache",
        rows.len(),
        satisfied
    );
    Ok(())
}

fn cmd_resolve(config: &Config, dir: &PathBuf, output: &PathBuf, install: bool) -> Result<()> {
    let dependencies = scanner::scan_project_dependencies(dir);
    let mut dependencies =
        scanner::filter_custom_dependencies(dependencies, custom_prefixes(config), true);

    if dependencies.is_empty() {
        println!("No custom dependencies found under {}", dir.display());
        return Ok(());
    }

    let client = OrchestratorClient::new(&config.registry)?;
    let token = client
        .get_token()
        .context("Authentication against the registry failed")?;

    // Query the registry once per package id and pick required versions
    let mut existence = ExistenceCache::new();
    for (pkg_id, info) in dependencies.iter_mut() {
        match client.check_exists(&token, pkg_id) {
            Ok((exists, versions)) => {
                info.exists_in_registry = Some(exists);
                info.available_versions = versions.clone();
                if exists {
                    info.all_resolved_versions =
                        scanner::resolve_all_versions_for_package(info, &versions);
                    info.resolved_version = info.all_resolved_versions.first().cloned();
                } else {
                    warn!("{} not found in registry", pkg_id);
                }
                existence.insert(pkg_id.clone(), (exists, versions));
            }
            Err(e) => {
                warn!("Registry query failed for {}: {}", pkg_id, e);
                info.error_message = Some(e.to_string());
            }
        }
    }

    let (to_download, already_present) = scanner::build_download_list(&dependencies, output);
    info!(
        "{} packages to download, {} already present",
        to_download.len(),
        already_present.len()
    );

    let cache = PackageCache::new(config.cache_root());
    let resolver = DependencyResolver::new(&client, &cache);
    let outcome = resolver.resolve_all(&token, &to_download, output, install, Some(&mut existence));

    let (main_count, transitive_count) = count_total_packages(&outcome.packages);
    println!(
        "Resolved {} root packages ({} transitive references)",
        main_count, transitive_count
    );
    println!(
        "Downloaded: {}  Installed: {}  Skipped: {}  Failed: {}",
        outcome.stats.downloaded,
        outcome.stats.installed,
        outcome.stats.skipped,
        outcome.stats.failed
    );

    if !outcome.errors.is_empty() {
        eprintln!("\nErrors:");
        for error in &outcome.errors {
            eprintln!("  {error}");
        }
    }

    let failed_roots: HashMap<&str, &str> = outcome
        .packages
        .iter()
        .filter(|p| p.error.is_some())
        .map(|p| (p.package_id.as_str(), p.version.as_str()))
        .collect();
    if !failed_roots.is_empty() {
        bail!("{} root packages failed to resolve", failed_roots.len());
    }

    Ok(())
}
