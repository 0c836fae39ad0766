//! provider-git materializes a target git repository from a subtree of a
//! source repository: files are copied, optionally rendered with template
//! values, a deployment claim is added, and the result is committed and
//! pushed. A `Repo` resource declares the pair of repositories; the
//! reconciler keeps the target in line with it.

/// Cancellation token shared by network operations
pub mod cancel;

/// Command-line interface module for the provider-git binary
pub mod cli;

/// Common constants: file names, labels and the commit identity
pub mod constants;

/// Periodic reconciliation of every Repo manifest
pub mod controller;

/// Directory tree copy with selective template rendering
pub mod copier;

/// Client for the deployment metadata service
pub mod deployment;

/// Error types and handling for provider-git
pub mod error;

/// Virtual, rooted filesystems over clones and memory
pub mod fs;

/// Clone, branch, commit, push and tag on top of libgit2
pub mod git;

/// File ignore patterns
/// Processes .krateoignore files to select files copied without rendering
pub mod ignore;

/// Logger initialization for the binary
pub mod logger;

/// Repository creation through hosting provider REST APIs
pub mod provider;

/// Observe / Create / Update / Delete of a Repo resource
pub mod reconciler;

/// Template rendering of skeleton files
pub mod renderer;

/// Repo and ProviderConfig resources and manifest loading
pub mod resource;

/// ConfigMap- and Secret-like value lookups
pub mod store;
