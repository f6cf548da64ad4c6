// src/registry/client.rs

//! Orchestrator registry client
//!
//! Blocking HTTP client for an Orchestrator tenant: client-credentials
//! authentication, library listing, version queries, package download and
//! upload. Libraries live behind several feed surfaces depending on the
//! Orchestrator version, so downloads try the known endpoint shapes in
//! order.

use crate::config::RegistryConfig;
use crate::error::{Error, Result};
use crate::version::sort_versions_descending;
use reqwest::blocking::{multipart, Client};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::RegistryClient;

/// Default timeout for API requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for package transfers (2 minutes)
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(120);

/// Downloads smaller than this are HTML error pages, not packages
const MIN_PACKAGE_SIZE: u64 = 1000;

/// Tenant header required by the Orchestrator API
const TENANT_HEADER: &str = "X-UIPATH-TenantName";

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ODataList<T> {
    #[serde(default)]
    value: Vec<T>,
}

/// One library row from the OData Libraries feed
#[derive(Debug, Clone, Deserialize)]
pub struct LibraryEntry {
    #[serde(rename = "Id")]
    pub id: Option<String>,
    #[serde(rename = "Version")]
    pub version: Option<String>,
    #[serde(rename = "Title")]
    pub title: Option<String>,
    #[serde(rename = "Authors")]
    pub authors: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Version list entries arrive either as bare strings or as objects with a
/// Version field, depending on the Orchestrator release.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VersionEntry {
    Plain(String),
    Keyed {
        #[serde(rename = "Version", alias = "version")]
        version: String,
    },
}

impl VersionEntry {
    fn into_string(self) -> String {
        match self {
            VersionEntry::Plain(v) => v,
            VersionEntry::Keyed { version } => version,
        }
    }
}

/// Identity endpoint for the token exchange. Cloud tenants use the
/// underscore-suffixed path, on-prem installs do not.
fn identity_url(base_url: &str) -> String {
    let identity_path = if base_url.contains("cloud.uipath.com") {
        "identity_"
    } else {
        "identity"
    };
    format!(
        "{}/{}/connect/token",
        base_url.trim_end_matches('/'),
        identity_path
    )
}

/// The feed endpoints a library download may live behind, in probe order.
fn download_endpoints(tenant_base: &str, package_id: &str, version: &str) -> Vec<String> {
    let id_lower = package_id.to_lowercase();
    vec![
        format!(
            "{tenant_base}/odata/Libraries/UiPath.Server.Configuration.OData.DownloadPackage(key='{package_id}:{version}')"
        ),
        format!("{tenant_base}/nuget/Libraries/v2/package/{package_id}/{version}"),
        format!(
            "{tenant_base}/nuget/Libraries/v3/flatcontainer/{id_lower}/{version}/{id_lower}.{version}.nupkg"
        ),
        format!(
            "{tenant_base}/nuget/v3/flatcontainer/{id_lower}/{version}/{id_lower}.{version}.nupkg"
        ),
    ]
}

/// Blocking client for one Orchestrator tenant
pub struct OrchestratorClient {
    http: Client,
    base_url: String,
    org: String,
    tenant: String,
    client_id: String,
    client_secret: String,
    scope: String,
}

impl OrchestratorClient {
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            org: config.org.clone(),
            tenant: config.tenant.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scope: config.scope.clone(),
        })
    }

    /// Base URL of the tenant-scoped Orchestrator API
    fn tenant_base(&self) -> String {
        format!(
            "{}/{}/{}/orchestrator_",
            self.base_url, self.org, self.tenant
        )
    }

    /// Authenticate via the client-credentials flow and return a bearer
    /// token.
    pub fn get_token(&self) -> Result<String> {
        let token_url = identity_url(&self.base_url);
        debug!("Requesting token from {}", token_url);

        let response = self
            .http
            .post(&token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", self.scope.as_str()),
            ])
            .send()
            .map_err(|e| Error::DownloadError(format!("Token request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::DownloadError(format!(
                "Authentication failed: HTTP {} from {}",
                response.status(),
                token_url
            )));
        }

        let token: TokenResponse = response
            .json()
            .map_err(|e| Error::ParseError(format!("Invalid token response: {e}")))?;

        Ok(token.access_token)
    }

    /// List libraries at tenant level, optionally filtered by a search term.
    ///
    /// The feed returns only the latest version of each library; use
    /// [`get_library_versions`](Self::get_library_versions) for the full
    /// history.
    pub fn list_libraries(&self, token: &str, search: Option<&str>) -> Result<Vec<LibraryEntry>> {
        let url = format!("{}/odata/Libraries", self.tenant_base());

        let mut params = vec![
            ("$orderby".to_string(), "Id asc".to_string()),
            ("$top".to_string(), "100".to_string()),
            (
                "$select".to_string(),
                "Id,Version,Title,Authors".to_string(),
            ),
        ];
        if let Some(term) = search {
            params.push((
                "$filter".to_string(),
                format!("contains(tolower(Id), tolower('{}'))", term),
            ));
        }

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .header(TENANT_HEADER, &self.tenant)
            .query(&params)
            .send()
            .map_err(|e| Error::DownloadError(format!("Failed to list libraries: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::DownloadError(format!(
                "HTTP {} listing libraries",
                response.status()
            )));
        }

        let list: ODataList<LibraryEntry> = response
            .json()
            .map_err(|e| Error::ParseError(format!("Invalid libraries response: {e}")))?;

        Ok(list.value)
    }

    /// Fetch every published version of a library, sorted newest-first.
    pub fn get_library_versions(&self, token: &str, package_id: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/odata/Libraries/UiPath.Server.Configuration.OData.GetVersions(packageId='{}')",
            self.tenant_base(),
            package_id
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .header(TENANT_HEADER, &self.tenant)
            .send()
            .map_err(|e| {
                Error::DownloadError(format!("Failed to get versions for {package_id}: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(Error::DownloadError(format!(
                "HTTP {} getting versions for {}",
                response.status(),
                package_id
            )));
        }

        let list: ODataList<VersionEntry> = response
            .json()
            .map_err(|e| Error::ParseError(format!("Invalid versions response: {e}")))?;

        let mut versions: Vec<String> =
            list.value.into_iter().map(VersionEntry::into_string).collect();
        sort_versions_descending(&mut versions);
        Ok(versions)
    }

    /// Download a library archive, probing the known feed endpoints in
    /// order. Skips the transfer when a valid archive is already on disk.
    pub fn download_library(
        &self,
        token: &str,
        package_id: &str,
        version: &str,
        output_dir: &Path,
    ) -> Result<PathBuf> {
        let output_path = output_dir.join(format!("{}.{}.nupkg", package_id, version));

        if let Ok(meta) = output_path.metadata() {
            if meta.is_file() && meta.len() > MIN_PACKAGE_SIZE {
                debug!("{} already on disk, skipping download", output_path.display());
                return Ok(output_path);
            }
        }

        fs::create_dir_all(output_dir).map_err(|e| {
            Error::IoError(format!("Failed to create {}: {}", output_dir.display(), e))
        })?;

        let mut last_error = String::from("no endpoints attempted");

        for endpoint in download_endpoints(&self.tenant_base(), package_id, version) {
            debug!("Trying {}", endpoint);

            let response = match self
                .http
                .get(&endpoint)
                .bearer_auth(token)
                .header(TENANT_HEADER, &self.tenant)
                .timeout(TRANSFER_TIMEOUT)
                .send()
            {
                Ok(response) => response,
                Err(e) => {
                    last_error = e.to_string();
                    continue;
                }
            };

            if !response.status().is_success() {
                last_error = format!("HTTP {}", response.status());
                continue;
            }

            let bytes = match response.bytes() {
                Ok(bytes) => bytes,
                Err(e) => {
                    last_error = format!("Failed to read response body: {e}");
                    continue;
                }
            };

            // Reject tiny bodies: those are error pages, not packages
            if (bytes.len() as u64) <= MIN_PACKAGE_SIZE {
                last_error = "Downloaded file too small, likely not a valid package".to_string();
                continue;
            }

            // Write to a temp file first, then rename into place
            let temp_path = output_path.with_extension("tmp");
            fs::write(&temp_path, &bytes).map_err(|e| {
                Error::IoError(format!("Failed to write {}: {}", temp_path.display(), e))
            })?;
            fs::rename(&temp_path, &output_path).map_err(|e| {
                Error::IoError(format!("Failed to move into place: {e}"))
            })?;

            info!(
                "Downloaded {}@{} ({} bytes)",
                package_id,
                version,
                bytes.len()
            );
            return Ok(output_path);
        }

        Err(Error::DownloadError(format!(
            "All endpoints failed for {}@{}: {}",
            package_id, version, last_error
        )))
    }

    /// Upload a package archive to the tenant feed.
    pub fn upload_package(&self, token: &str, nupkg_path: &Path) -> Result<()> {
        let url = format!(
            "{}/odata/Processes/UiPath.Server.Configuration.OData.UploadPackage",
            self.tenant_base()
        );

        let form = multipart::Form::new().file("file", nupkg_path).map_err(|e| {
            Error::IoError(format!("Failed to read {}: {}", nupkg_path.display(), e))
        })?;

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .header(TENANT_HEADER, &self.tenant)
            .timeout(TRANSFER_TIMEOUT)
            .multipart(form)
            .send()
            .map_err(|e| Error::DownloadError(format!("Upload failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(Error::DownloadError(format!(
                "Upload failed: HTTP {} {}",
                status, body
            )));
        }

        info!("Uploaded {}", nupkg_path.display());
        Ok(())
    }
}

impl RegistryClient for OrchestratorClient {
    fn check_exists(&self, token: &str, package_id: &str) -> Result<(bool, Vec<String>)> {
        let matches = self.list_libraries(token, Some(package_id))?;
        let entry = matches
            .iter()
            .find(|e| e.id.as_deref() == Some(package_id));

        let Some(entry) = entry else {
            return Ok((false, Vec::new()));
        };

        match self.get_library_versions(token, package_id) {
            Ok(versions) if !versions.is_empty() => Ok((true, versions)),
            // GetVersions is flaky on older installs; fall back to the one
            // version the listing reported
            _ => {
                warn!("Version query failed for {}, using listed version", package_id);
                Ok((true, entry.version.iter().cloned().collect()))
            }
        }
    }

    fn download(
        &self,
        token: &str,
        package_id: &str,
        version: &str,
        target_dir: &Path,
    ) -> Result<PathBuf> {
        self.download_library(token, package_id, version, target_dir)
    }
}
