//! Command-line interface implementation for provider-git.
//! Provides argument parsing using clap; every flag can also be set through
//! its environment variable.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments structure for provider-git.
#[derive(Parser, Debug)]
#[command(author, version, about = "provider-git: materializes git repositories from template skeletons", long_about = None)]
pub struct Args {
    /// File or directory containing Repo manifests
    #[arg(long, env = "PROVIDER_GIT_MANIFESTS", value_name = "PATH")]
    pub manifests: PathBuf,

    /// ProviderConfig manifest with connection settings
    #[arg(long, env = "PROVIDER_GIT_PROVIDER_CONFIG", value_name = "FILE")]
    pub provider_config: PathBuf,

    /// Directory of mounted secrets, laid out as <namespace>/<name>/<key>
    #[arg(long, env = "PROVIDER_GIT_SECRETS_DIR", value_name = "DIR", default_value = "/etc/provider-git/secrets")]
    pub secrets_dir: PathBuf,

    /// Directory of mounted configmaps, laid out as <namespace>/<name>/<key>
    #[arg(long, env = "PROVIDER_GIT_CONFIGMAPS_DIR", value_name = "DIR", default_value = "/etc/provider-git/configmaps")]
    pub configmaps_dir: PathBuf,

    /// Sync period such as 300ms, 1.5h or 2h45m
    #[arg(short, long, env = "PROVIDER_GIT_SYNC", default_value = "1h", value_parser = humantime::parse_duration)]
    pub sync: Duration,

    /// Maximum number of resources reconciled concurrently
    #[arg(long, env = "PROVIDER_GIT_MAX_RECONCILE_RATE", default_value_t = 2, value_parser = clap::value_parser!(u16).range(1..))]
    pub max_reconcile_rate: u16,

    /// Run with debug logging
    #[arg(short, long, env = "PROVIDER_GIT_DEBUG")]
    pub debug: bool,

    /// Run a single reconciliation pass and exit
    #[arg(long)]
    pub once: bool,
}

/// Parses command line arguments and returns the Args structure.
///
/// # Exits
/// * With clap's default error handling for invalid arguments
pub fn get_args() -> Args {
    Args::parse()
}
