//! Reconciliation of a `Repo` resource against the destination repository.
//!
//! Observe decides whether the destination was already materialized by
//! looking for the claim file; Create performs the full copy, commit and push.

use log::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::constants::{CLAIM_FILE, COMMIT_MESSAGE, DEFAULT_BRANCH, DEFAULT_REMOTE, IGNORE_FILE, PACKAGE_FILE};
use crate::copier::{write_bytes, CopyJob};
use crate::deployment::{DeploymentService, HttpDeploymentService};
use crate::error::{Error, Result};
use crate::git::{list_remote_tags, Credential, RepoHandle, TransportOptions};
use crate::ignore::IgnoreSet;
use crate::provider::{ProviderOptions, ProviderRegistry};
use crate::renderer::{MustacheRenderer, RenderContext, TemplateRenderer};
use crate::resource::{Config, ConditionReason, Repo};
use crate::store::{load_render_context, KeySelector, SecretStore, ValueStore};

const UNABLE_TO_LOAD_VALUES: &str = "unable to load configmap with template values";
const VALUES_NOT_READY: &str = "configmap values not ready yet";

/// What Observe found in the destination repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub resource_exists: bool,
    pub resource_up_to_date: bool,
}

/// Result of one [`Reconciler::reconcile`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    UpToDate,
    Created,
    Updated,
}

pub struct Reconciler {
    config: Config,
    deployments: Box<dyn DeploymentService>,
    values: Box<dyn ValueStore>,
    secrets: Box<dyn SecretStore>,
    providers: ProviderRegistry,
    renderer: Box<dyn TemplateRenderer>,
}

impl Reconciler {
    pub fn new(
        config: Config,
        deployments: Box<dyn DeploymentService>,
        values: Box<dyn ValueStore>,
        secrets: Box<dyn SecretStore>,
    ) -> Self {
        Self {
            config,
            deployments,
            values,
            secrets,
            providers: ProviderRegistry::with_defaults(),
            renderer: Box::new(MustacheRenderer::new()),
        }
    }

    /// Builds a reconciler talking to the deployment service named in `config`.
    pub fn from_config(config: Config, values: Box<dyn ValueStore>, secrets: Box<dyn SecretStore>) -> Result<Self> {
        let deployments = HttpDeploymentService::new(&config.deployment_service_url, config.insecure)?;
        Ok(Self::new(config, Box::new(deployments), values, secrets))
    }

    pub fn with_providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = providers;
        self
    }

    pub fn with_renderer(mut self, renderer: Box<dyn TemplateRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    fn transport(&self, credential: &Credential, cancel: &CancelToken) -> TransportOptions {
        TransportOptions::new(credential.clone())
            .insecure(self.config.insecure)
            .with_cancel(cancel.clone())
    }

    /// Checks whether the destination repository already holds the claim.
    ///
    /// # Errors
    /// * `Error::MissingDeploymentId` without a `deploymentId` label
    /// * `Error::ConfigUnavailable` when a source path is configured but the
    ///   template values can not be read or are still blank
    /// * any clone failure of the destination repository
    pub fn observe(&self, repo: &mut Repo, cancel: &CancelToken) -> Result<Observation> {
        let deployment_id = repo.deployment_id().ok_or(Error::MissingDeploymentId)?.to_string();
        let params = &repo.spec.for_provider;

        if params.from_repo.path().is_some() {
            let raw = match &params.config_map_key_ref {
                Some(selector) => self.values.get_value(selector).map_err(|e| {
                    debug!("Unable to load configmap {}: {}", selector, e);
                    Error::ConfigUnavailable(UNABLE_TO_LOAD_VALUES.to_string())
                })?,
                None => return Err(Error::ConfigUnavailable(UNABLE_TO_LOAD_VALUES.to_string())),
            };
            if raw.trim().is_empty() {
                return Err(Error::ConfigUnavailable(VALUES_NOT_READY.to_string()));
            }
        }

        let to_url = params.to_repo.url.clone();
        let to_repo = RepoHandle::clone(&to_url, &self.transport(&self.config.to_repo, cancel))?;
        debug!("Target repo cloned: {}", to_url);

        if to_repo.exists(CLAIM_FILE)? {
            debug!("Claim found in {}", to_url);
            repo.status.at_provider.deployment_id = Some(deployment_id);
            repo.status.set_condition(ConditionReason::Available);
            return Ok(Observation {
                resource_exists: true,
                resource_up_to_date: true,
            });
        }

        debug!("Target repo {} has no claim yet", to_url);
        Ok(Observation {
            resource_exists: false,
            resource_up_to_date: true,
        })
    }

    /// Materializes the destination repository.
    ///
    /// Any failing step aborts the whole operation; nothing is pushed unless
    /// every earlier step succeeded.
    pub fn create(&self, repo: &mut Repo, cancel: &CancelToken) -> Result<()> {
        repo.status.set_condition(ConditionReason::Creating);

        let deployment_id = repo.deployment_id().ok_or(Error::MissingDeploymentId)?.to_string();
        let params = repo.spec.for_provider.clone();

        cancel.check()?;
        let deployment = self.deployments.get(&deployment_id).inspect_err(|e| {
            warn!("Fetching deployment (deploymentId: {}) failed: {}", deployment_id, e);
        })?;
        debug!("Claim fetched for deployment {}", deployment_id);

        if let Some(selector) = &params.to_repo.api_credentials {
            let options = ProviderOptions {
                api_url: params.to_repo.api_url.clone(),
                token: selector.secret(self.secrets.as_ref())?.unwrap_or_default(),
                insecure: self.config.insecure,
            };
            self.providers.create_eventually(
                &params.to_repo.url,
                params.to_repo.provider.as_deref(),
                &options,
                params.to_repo.private.unwrap_or(false),
            )?;
        }

        let to_transport = self.transport(&self.config.to_repo, cancel);
        let to_repo = RepoHandle::clone(&params.to_repo.url, &to_transport)?;
        debug!("Target repo cloned: {}", params.to_repo.url);

        let from_repo =
            RepoHandle::clone(&params.from_repo.url, &self.transport(&self.config.from_repo, cancel))?;
        debug!("Origin repo cloned: {}", params.from_repo.url);

        to_repo.branch(DEFAULT_BRANCH)?;
        // Must run before the copy: a fast-forward checks out the new tip.
        to_repo.pull()?;
        debug!("Target repo on branch {}", DEFAULT_BRANCH);

        if let Some(from_path) = params.from_repo.path() {
            let ignore = IgnoreSet::load(from_repo.fs());
            if ignore.is_disabled() {
                info!("Unable to load '{}', every file will be rendered", IGNORE_FILE);
            }
            let context = self.render_context(params.config_map_key_ref.as_ref());
            let to_path = params.to_repo.path().unwrap_or("/");

            cancel.check()?;
            CopyJob::new(from_repo.fs(), to_repo.fs())
                .with_rendering(self.renderer.as_ref(), &context)
                .with_ignore(ignore)
                .copy_dir(from_path, to_path)?;
            debug!("Copied {}:{} into {}:{}", params.from_repo.url, from_path, params.to_repo.url, to_path);
        }

        write_bytes(to_repo.fs(), &deployment.claim, CLAIM_FILE)?;
        if let Some(package) = &deployment.package {
            write_bytes(to_repo.fs(), package, PACKAGE_FILE)?;
        }

        let commit_id = to_repo.commit(".", COMMIT_MESSAGE)?;
        debug!("Target repo committed branch {} ({})", DEFAULT_BRANCH, commit_id);

        to_repo.push(DEFAULT_REMOTE, DEFAULT_BRANCH)?;
        info!(
            "Pushed branch {} to {} for deployment {}",
            DEFAULT_BRANCH, params.to_repo.url, deployment_id
        );

        if let Some(tag) = params.to_repo.tag.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            if list_remote_tags(&params.to_repo.url, &to_transport)?.iter().any(|t| t == tag) {
                info!("Tag '{}' already exists on {}, leaving it in place", tag, params.to_repo.url);
            } else {
                if !to_repo.create_tag(tag)? {
                    debug!("Tag '{}' already present", tag);
                }
                to_repo.push_tags()?;
            }
        }

        repo.status.set_condition(ConditionReason::Available);
        repo.status.at_provider.deployment_id = Some(deployment_id);
        Ok(())
    }

    /// Destination repositories are never modified after creation.
    pub fn update(&self, _repo: &mut Repo) -> Result<()> {
        Ok(())
    }

    /// Leaves the destination repository in place.
    pub fn delete(&self, repo: &mut Repo) -> Result<()> {
        repo.status.set_condition(ConditionReason::Creating);
        Ok(())
    }

    /// Observes `repo` and creates it when missing.
    pub fn reconcile(&self, repo: &mut Repo, cancel: &CancelToken) -> Result<Outcome> {
        let observation = self.observe(repo, cancel)?;
        if !observation.resource_exists {
            self.create(repo, cancel)?;
            return Ok(Outcome::Created);
        }
        if !observation.resource_up_to_date {
            self.update(repo)?;
            return Ok(Outcome::Updated);
        }
        Ok(Outcome::UpToDate)
    }

    /// Template values for the copy. Failures are logged and yield an empty
    /// context, so only templates that actually use a value can fail.
    fn render_context(&self, selector: Option<&KeySelector>) -> RenderContext {
        let Some(selector) = selector else {
            warn!("No configmap referenced, rendering with empty values");
            return RenderContext::default();
        };
        match load_render_context(self.values.as_ref(), selector) {
            Ok(context) => {
                debug!("Loaded values from configmap {}", selector);
                context
            }
            Err(e) => {
                warn!("Unable to load configmap with template data {}: {}", selector, e);
                RenderContext::default()
            }
        }
    }
}
