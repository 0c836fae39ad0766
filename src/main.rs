//! provider-git entry point: reads process configuration, wires the
//! collaborators and runs the reconciliation loop.

use anyhow::Context;
use log::debug;

use provider_git::{
    cancel::CancelToken,
    cli::{get_args, Args},
    controller::{Controller, ControllerOptions},
    logger::init_logger,
    reconciler::Reconciler,
    resource::ProviderConfig,
    store::{DirSecretStore, DirValueStore},
};

/// Main application entry point.
fn main() {
    let args = get_args();
    init_logger(args.debug);

    if let Err(err) = run(args) {
        default_error_handler(err);
    }
}

fn default_error_handler(err: anyhow::Error) {
    eprintln!("{err:#}");
    std::process::exit(1);
}

/// Main application logic execution.
///
/// # Flow
/// 1. Loads the ProviderConfig and resolves its credentials
/// 2. Builds the reconciler over the mounted configmaps and secrets
/// 3. Runs one pass (`--once`) or loops every sync period
fn run(args: Args) -> anyhow::Result<()> {
    debug!("Starting with {:?}", args);

    let secrets = DirSecretStore::new(&args.secrets_dir);
    let provider_config = ProviderConfig::load(&args.provider_config)
        .with_context(|| format!("cannot read provider config {}", args.provider_config.display()))?;
    let config = provider_config
        .resolve(&secrets)
        .context("cannot resolve provider config")?;

    let reconciler = Reconciler::from_config(
        config,
        Box::new(DirValueStore::new(&args.configmaps_dir)),
        Box::new(secrets),
    )?;
    let controller = Controller::new(
        reconciler,
        ControllerOptions {
            manifests: args.manifests,
            sync_period: args.sync,
            max_reconcile_rate: usize::from(args.max_reconcile_rate),
        },
    );

    let cancel = CancelToken::new();
    if args.once {
        let summary = controller.run_once(&cancel)?;
        if summary.failed > 0 {
            anyhow::bail!("{} resource(s) failed to reconcile", summary.failed);
        }
        return Ok(());
    }
    controller.run(&cancel)?;
    Ok(())
}
