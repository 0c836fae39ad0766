//! Client for the deployment metadata service.
//!
//! A deployment is looked up by its opaque id and returned as JSON with a
//! required `claim` and an optional `package` object. Both are re-encoded as
//! YAML so they can be committed next to the generated sources.

use log::debug;
use reqwest::blocking::Client;
use reqwest::StatusCode;

use crate::error::{Error, Result};

/// YAML artifacts fetched for one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub claim: Vec<u8>,
    pub package: Option<Vec<u8>>,
}

impl Deployment {
    /// Extracts the artifacts from a deployment service response body.
    ///
    /// # Errors
    /// * `Error::ClaimNotFound` if the document has no `claim` key
    pub fn from_json(deployment_id: &str, body: &[u8]) -> Result<Self> {
        let mut document: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(body)?;

        let claim = document
            .remove("claim")
            .ok_or_else(|| Error::ClaimNotFound {
                deployment_id: deployment_id.to_string(),
            })?;
        let package = match document.remove("package") {
            Some(serde_json::Value::Null) | None => None,
            Some(value) => Some(serde_yaml::to_string(&value)?.into_bytes()),
        };

        Ok(Self {
            claim: serde_yaml::to_string(&claim)?.into_bytes(),
            package,
        })
    }
}

/// Source of deployment artifacts.
pub trait DeploymentService: Send + Sync {
    fn get(&self, deployment_id: &str) -> Result<Deployment>;
}

/// [`DeploymentService`] backed by `GET <base_url>/<deployment_id>`.
pub struct HttpDeploymentService {
    client: Client,
    base_url: String,
}

impl HttpDeploymentService {
    pub fn new(base_url: impl Into<String>, insecure: bool) -> Result<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(insecure)
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn deployment_url(&self, deployment_id: &str) -> String {
        format!("{}/{}", self.base_url, deployment_id)
    }
}

impl DeploymentService for HttpDeploymentService {
    fn get(&self, deployment_id: &str) -> Result<Deployment> {
        let url = self.deployment_url(deployment_id);
        debug!("Fetching deployment from {}", url);

        let response = self.client.get(&url).send()?;
        match response.status() {
            StatusCode::OK => {
                let body = response.bytes()?;
                Deployment::from_json(deployment_id, &body)
            }
            status => Err(Error::UnexpectedStatus {
                url,
                status: status.as_u16(),
                message: response.text().unwrap_or_default(),
            }),
        }
    }
}
