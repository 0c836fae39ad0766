//! Repository creation through hosting provider REST APIs.
//!
//! Providers are looked up by a normalized id in a [`ProviderRegistry`]:
//! either the id given explicitly on the resource, or the first DNS label of
//! the repository host (`github.com` and `github.example.org` both map to
//! `github`).

use indexmap::IndexMap;
use log::{debug, info};
use url::Url;

use crate::error::{Error, Result};

mod github;

pub use github::GitHubClient;

/// Owner and name of a repository, parsed from its clone URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoInfo {
    pub host: String,
    pub owner: String,
    pub name: String,
}

impl RepoInfo {
    /// Parses `https://host/<owner>/<name>[.git]`.
    pub fn parse(raw_url: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidUrl {
            url: raw_url.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(raw_url).map_err(|e| invalid(&e.to_string()))?;
        let host = url.host_str().ok_or_else(|| invalid("missing host"))?.to_string();

        let segments: Vec<&str> = url
            .path()
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();
        let (owner, name) = match segments.as_slice() {
            [owner, .., name] => (owner.to_string(), name.trim_end_matches(".git").to_string()),
            _ => return Err(invalid("expected an owner and a repository name in the path")),
        };
        if name.is_empty() {
            return Err(invalid("empty repository name"));
        }

        Ok(Self { host, owner, name })
    }
}

/// A hosting service able to check for and create repositories.
pub trait RepoProvider: Send + Sync {
    fn exists(&self, owner: &str, name: &str) -> Result<bool>;

    fn create(&self, owner: &str, name: &str, private: bool) -> Result<()>;
}

/// Settings handed to a provider factory.
#[derive(Clone, Default)]
pub struct ProviderOptions {
    /// REST API base URL; each provider falls back to its public endpoint.
    pub api_url: Option<String>,
    pub token: String,
    pub insecure: bool,
}

impl std::fmt::Debug for ProviderOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderOptions")
            .field("api_url", &self.api_url)
            .field("token", &"<redacted>")
            .field("insecure", &self.insecure)
            .finish()
    }
}

pub type ProviderFactory = Box<dyn Fn(&ProviderOptions) -> Result<Box<dyn RepoProvider>> + Send + Sync>;

/// Table of provider implementations keyed by normalized id.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: IndexMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in provider.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("github", |options| Ok(Box::new(GitHubClient::from_options(options)?)));
        registry
    }

    /// Adds or replaces the factory for `id`.
    pub fn register<F>(&mut self, id: &str, factory: F)
    where
        F: Fn(&ProviderOptions) -> Result<Box<dyn RepoProvider>> + Send + Sync + 'static,
    {
        self.factories.insert(normalize_id(id), Box::new(factory));
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Instantiates the provider registered under `id`.
    ///
    /// # Errors
    /// * `Error::ProviderNotImplemented` for an unknown id
    pub fn resolve(&self, id: &str, options: &ProviderOptions) -> Result<Box<dyn RepoProvider>> {
        let id = normalize_id(id);
        match self.factories.get(&id) {
            Some(factory) => factory(options),
            None => Err(Error::ProviderNotImplemented(id)),
        }
    }

    /// Creates the repository behind `raw_url` unless it already exists.
    ///
    /// # Returns
    /// * `true` if the repository was created by this call
    pub fn create_eventually(
        &self,
        raw_url: &str,
        provider: Option<&str>,
        options: &ProviderOptions,
        private: bool,
    ) -> Result<bool> {
        let info = RepoInfo::parse(raw_url)?;
        let id = provider_id(provider, &info.host);
        let client = self.resolve(&id, options)?;

        if client.exists(&info.owner, &info.name)? {
            debug!("Repository {}/{} already exists on {}", info.owner, info.name, id);
            return Ok(false);
        }
        client.create(&info.owner, &info.name, private)?;
        info!("Created repository {}/{} on {}", info.owner, info.name, id);
        Ok(true)
    }
}

fn normalize_id(id: &str) -> String {
    id.trim().to_ascii_lowercase()
}

/// Chooses the registry key for a repository: the explicit provider when
/// set, otherwise the first label of `host`.
pub fn provider_id(explicit: Option<&str>, host: &str) -> String {
    match explicit.map(str::trim).filter(|p| !p.is_empty()) {
        Some(provider) => normalize_id(provider),
        None => normalize_id(host.split('.').next().unwrap_or(host)),
    }
}
