//! Common constants used throughout provider-git.

/// Ignore file looked up at the root of the source repository
pub const IGNORE_FILE: &str = ".krateoignore";

/// Marker file whose presence means the destination was already materialized
pub const CLAIM_FILE: &str = "claim.yaml";

/// Optional package artifact written next to the claim
pub const PACKAGE_FILE: &str = "package.yaml";

/// Label carrying the deployment correlation identifier
pub const DEPLOYMENT_ID_LABEL: &str = "deploymentId";

/// Service identity used for generated commits and tags
pub const COMMIT_AUTHOR_NAME: &str = "krateoctl";
pub const COMMIT_AUTHOR_EMAIL: &str = "krateoctl@krateoplatformops.io";

pub const COMMIT_MESSAGE: &str = ":rocket: first commit";

pub const DEFAULT_REMOTE: &str = "origin";
pub const DEFAULT_BRANCH: &str = "main";
