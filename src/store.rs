//! ConfigMap- and Secret-like key/value lookups.
//!
//! The directory implementations read the layout Kubernetes uses when
//! mounting such objects into a pod: `<root>/<namespace>/<name>/<key>`.

use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::renderer::RenderContext;

/// Reference to one key of a named, namespaced object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySelector {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    pub key: String,
}

impl std::fmt::Display for KeySelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}[{}]", self.namespace, self.name, self.key)
    }
}

pub trait ValueStore: Send + Sync {
    fn get_value(&self, selector: &KeySelector) -> Result<String>;
}

pub trait SecretStore: Send + Sync {
    fn get_secret(&self, selector: &KeySelector) -> Result<String>;
}

fn key_path(root: &Path, selector: &KeySelector) -> Result<PathBuf> {
    let parts = [selector.namespace.as_str(), selector.name.as_str(), selector.key.as_str()];
    if selector.name.is_empty() || selector.key.is_empty() {
        return Err(Error::InvalidResource(format!("incomplete key reference {selector}")));
    }
    if parts.iter().any(|part| part.contains(['/', '\\']) || *part == "..") {
        return Err(Error::InvalidResource(format!("invalid key reference {selector}")));
    }
    Ok(parts
        .iter()
        .filter(|part| !part.is_empty())
        .fold(root.to_path_buf(), |path, part| path.join(part)))
}

/// [`ValueStore`] reading mounted ConfigMaps.
#[derive(Debug, Clone)]
pub struct DirValueStore {
    root: PathBuf,
}

impl DirValueStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ValueStore for DirValueStore {
    fn get_value(&self, selector: &KeySelector) -> Result<String> {
        let path = key_path(&self.root, selector)?;
        debug!("Reading value {} from {}", selector, path.display());
        std::fs::read_to_string(&path).map_err(|e| Error::io(path.display().to_string(), e))
    }
}

/// [`SecretStore`] reading mounted Secrets. Trailing whitespace is trimmed.
#[derive(Debug, Clone)]
pub struct DirSecretStore {
    root: PathBuf,
}

impl DirSecretStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SecretStore for DirSecretStore {
    fn get_secret(&self, selector: &KeySelector) -> Result<String> {
        let path = key_path(&self.root, selector)?;
        debug!("Reading secret {}", selector);
        let secret = std::fs::read_to_string(&path)
            .map_err(|_| Error::CredentialsUnavailable(format!("cannot read secret {selector}")))?;
        Ok(secret.trim_end().to_string())
    }
}

/// Loads template values from the store and parses them as JSON or YAML.
pub fn load_render_context(store: &dyn ValueStore, selector: &KeySelector) -> Result<RenderContext> {
    let raw = store.get_value(selector)?;
    RenderContext::parse(&raw)
}
