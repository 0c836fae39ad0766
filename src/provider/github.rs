use log::debug;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{ProviderOptions, RepoProvider};
use crate::error::{Error, Result};

const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(Debug, Serialize)]
struct CreateRepoRequest<'a> {
    name: &'a str,
    private: bool,
    auto_init: bool,
}

/// Error document returned by the GitHub REST API.
#[derive(Debug, Default, Deserialize)]
struct GitHubError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
    #[serde(default)]
    documentation_url: String,
}

/// Minimal GitHub REST client: repository lookup and creation.
pub struct GitHubClient {
    client: Client,
    api_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(client: Client, api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub fn from_options(options: &ProviderOptions) -> Result<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(options.insecure)
            .build()?;
        let api_url = options
            .api_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(DEFAULT_API_URL);
        Ok(Self::new(client, api_url, options.token.clone()))
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder
            .header(USER_AGENT, concat!("provider-git/", env!("CARGO_PKG_VERSION")))
            .header(ACCEPT, "application/vnd.github+json");
        if self.token.is_empty() {
            builder
        } else {
            builder.header(AUTHORIZATION, format!("token {}", self.token))
        }
    }

    /// GET `path`, mapping 200 to `true` and 404 to `false`.
    fn probe(&self, path: &str) -> Result<bool> {
        let url = format!("{}{}", self.api_url, path);
        debug!("GET {}", url);
        let response = self.request(self.client.get(&url)).send()?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(Error::UnexpectedStatus {
                url,
                status: status.as_u16(),
                message: response.text().unwrap_or_default(),
            }),
        }
    }

    fn is_org(&self, owner: &str) -> Result<bool> {
        self.probe(&format!("/orgs/{owner}"))
    }
}

impl RepoProvider for GitHubClient {
    fn exists(&self, owner: &str, name: &str) -> Result<bool> {
        self.probe(&format!("/repos/{owner}/{name}"))
    }

    /// Creates the repository under the organization when `owner` is one,
    /// otherwise under the authenticated user. The repository is initialized
    /// with a first commit so it can be cloned right away.
    fn create(&self, owner: &str, name: &str, private: bool) -> Result<()> {
        let path = if self.is_org(owner)? {
            format!("/orgs/{owner}/repos")
        } else {
            "/user/repos".to_string()
        };
        let url = format!("{}{}", self.api_url, path);
        debug!("POST {}", url);

        let body = CreateRepoRequest {
            name,
            private,
            auto_init: true,
        };
        let response = self.request(self.client.post(&url)).json(&body).send()?;
        if response.status() == StatusCode::CREATED {
            return Ok(());
        }

        let status = response.status();
        let text = response.text().unwrap_or_default();
        match serde_json::from_str::<GitHubError>(&text) {
            Ok(err) => Err(Error::ProviderApi(format!(
                "github: {} {:?} {}",
                err.message, err.errors, err.documentation_url
            ))),
            Err(_) => Err(Error::UnexpectedStatus {
                url,
                status: status.as_u16(),
                message: text,
            }),
        }
    }
}
