//! Declarative resources read from YAML manifests: the `Repo` managed
//! resource and the `ProviderConfig` holding connection settings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::constants::DEPLOYMENT_ID_LABEL;
use crate::error::{Error, Result};
use crate::git::Credential;
use crate::store::{KeySelector, SecretStore};

pub const REPO_KIND: &str = "Repo";
pub const PROVIDER_CONFIG_KIND: &str = "ProviderConfig";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Where a repository lives and which part of it is used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoOpts {
    pub url: String,
    /// Folder in the repository to copy from (or to).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Tag created and pushed after the first commit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Hosting provider id; derived from the URL host when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<bool>,
    /// Token for the provider REST API. Repository creation is only
    /// attempted when this is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_credentials: Option<CredentialSelector>,
}

impl RepoOpts {
    /// The configured path, `None` when unset or blank.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoParameters {
    pub from_repo: RepoOpts,
    pub to_repo: RepoOpts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map_key_ref: Option<KeySelector>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoSpec {
    pub for_provider: RepoParameters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionReason {
    Creating,
    Available,
}

/// Readiness condition, shaped like the Kubernetes `Ready` condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    pub reason: ConditionReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoObservation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoStatus {
    #[serde(default)]
    pub at_provider: RepoObservation,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl RepoStatus {
    pub fn set_condition(&mut self, reason: ConditionReason) {
        let status = match reason {
            ConditionReason::Available => "True",
            ConditionReason::Creating => "False",
        };
        let condition = Condition {
            kind: "Ready".to_string(),
            status: status.to_string(),
            reason,
        };
        self.conditions.retain(|c| c.kind != condition.kind);
        self.conditions.push(condition);
    }

    pub fn condition(&self) -> Option<ConditionReason> {
        self.conditions.iter().find(|c| c.kind == "Ready").map(|c| c.reason)
    }
}

/// A request to materialize `toRepo` from a subtree of `fromRepo`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repo {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: RepoSpec,
    #[serde(default)]
    pub status: RepoStatus,
}

impl Repo {
    /// The deployment correlation id, `None` when the label is missing or blank.
    pub fn deployment_id(&self) -> Option<&str> {
        self.metadata
            .labels
            .get(DEPLOYMENT_ID_LABEL)
            .map(String::as_str)
            .filter(|id| !id.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialsSource {
    #[default]
    None,
    Secret,
    Environment,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvSelector {
    pub name: String,
}

/// Where to find a secret value, in the crossplane credential selector shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSelector {
    #[serde(default)]
    pub source: CredentialsSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<KeySelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<EnvSelector>,
    /// Presenting a username switches from token to basic authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl CredentialSelector {
    /// Reads the secret value this selector points at.
    ///
    /// # Returns
    /// * `None` when the source is `None`
    pub fn secret(&self, secrets: &dyn SecretStore) -> Result<Option<String>> {
        match self.source {
            CredentialsSource::None => Ok(None),
            CredentialsSource::Secret => {
                let selector = self.secret_ref.as_ref().ok_or_else(|| {
                    Error::CredentialsUnavailable("no credentials secret referenced".to_string())
                })?;
                secrets.get_secret(selector).map(Some)
            }
            CredentialsSource::Environment => {
                let env = self.env.as_ref().ok_or_else(|| {
                    Error::CredentialsUnavailable("no credentials environment variable referenced".to_string())
                })?;
                std::env::var(&env.name).map(Some).map_err(|_| {
                    Error::CredentialsUnavailable(format!("environment variable {} is not set", env.name))
                })
            }
        }
    }

    /// Resolves the selector into a git [`Credential`].
    pub fn credential(&self, secrets: &dyn SecretStore) -> Result<Credential> {
        let Some(secret) = self.secret(secrets)? else {
            return Ok(Credential::Anonymous);
        };
        Ok(match self.username.as_deref().filter(|u| !u.is_empty()) {
            Some(username) => Credential::Basic {
                username: username.to_string(),
                password: secret,
            },
            None => Credential::Token(secret),
        })
    }
}

fn resolve_credential(selector: Option<&CredentialSelector>, secrets: &dyn SecretStore) -> Result<Credential> {
    match selector {
        Some(selector) => selector.credential(secrets),
        None => Ok(Credential::Anonymous),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfigSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,
    #[serde(default)]
    pub deployment_service_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_repo_credentials: Option<CredentialSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_repo_credentials: Option<CredentialSelector>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: ProviderConfigSpec,
}

/// Connection settings with every credential resolved.
#[derive(Debug, Clone)]
pub struct Config {
    pub insecure: bool,
    pub deployment_service_url: String,
    pub from_repo: Credential,
    pub to_repo: Credential,
}

impl ProviderConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_yaml(path.as_ref())
    }

    /// Validates the config and resolves its credentials.
    pub fn resolve(&self, secrets: &dyn SecretStore) -> Result<Config> {
        if self.spec.deployment_service_url.trim().is_empty() {
            return Err(Error::InvalidResource(
                "deployment service url must be specified".to_string(),
            ));
        }
        Ok(Config {
            insecure: self.spec.insecure.unwrap_or(false),
            deployment_service_url: self.spec.deployment_service_url.clone(),
            from_repo: resolve_credential(self.spec.from_repo_credentials.as_ref(), secrets)?,
            to_repo: resolve_credential(self.spec.to_repo_credentials.as_ref(), secrets)?,
        })
    }
}

fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    debug!("Loading {}", path.display());
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path.display().to_string(), e))?;
    Ok(serde_yaml::from_str(&content)?)
}

/// Parses every `Repo` document of a (possibly multi-document) YAML stream.
/// Documents of other kinds are skipped.
pub fn parse_repos(content: &str) -> Result<Vec<Repo>> {
    let mut repos = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        match value.get("kind").and_then(serde_yaml::Value::as_str) {
            Some(REPO_KIND) => repos.push(serde_yaml::from_value(value)?),
            kind => debug!("Skipping document of kind {:?}", kind),
        }
    }
    Ok(repos)
}

/// Lists `.yaml` and `.yml` files under `root` (or `root` itself), sorted.
pub fn discover_manifests(root: &Path) -> Result<Vec<PathBuf>> {
    let mut manifests = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).display().to_string();
            Error::io(path, e.into())
        })?;
        let is_yaml = matches!(
            entry.path().extension().and_then(|ext| ext.to_str()),
            Some("yaml" | "yml")
        );
        if entry.file_type().is_file() && is_yaml {
            manifests.push(entry.into_path());
        }
    }
    manifests.sort();
    Ok(manifests)
}

/// Loads every `Repo` found in the manifests under `root`.
pub fn load_repos(root: &Path) -> Result<Vec<Repo>> {
    let mut repos = Vec::new();
    for manifest in discover_manifests(root)? {
        let content =
            std::fs::read_to_string(&manifest).map_err(|e| Error::io(manifest.display().to_string(), e))?;
        let found = parse_repos(&content)?;
        debug!("Found {} Repo resource(s) in {}", found.len(), manifest.display());
        repos.extend(found);
    }
    Ok(repos)
}
