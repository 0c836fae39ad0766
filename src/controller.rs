//! Periodic reconciliation of every `Repo` manifest found on disk.

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info};

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::reconciler::{Outcome, Reconciler};
use crate::resource::{load_repos, Repo};

const SLEEP_STEP: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// File or directory holding `Repo` manifests.
    pub manifests: PathBuf,
    /// Pause between two reconciliation passes.
    pub sync_period: Duration,
    /// Upper bound on concurrently reconciled resources.
    pub max_reconcile_rate: usize,
}

/// Counts of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub up_to_date: usize,
    pub created: usize,
    pub failed: usize,
}

pub struct Controller {
    reconciler: Reconciler,
    options: ControllerOptions,
}

impl Controller {
    pub fn new(reconciler: Reconciler, options: ControllerOptions) -> Self {
        Self { reconciler, options }
    }

    /// Reconciles every resource once, `max_reconcile_rate` at a time.
    ///
    /// A failing resource is logged and counted; it does not stop the pass.
    ///
    /// # Errors
    /// * when the manifests can not be read
    pub fn run_once(&self, cancel: &CancelToken) -> Result<PassSummary> {
        let mut repos = load_repos(&self.options.manifests)?;
        debug!("Reconciling {} resource(s)", repos.len());

        let mut summary = PassSummary::default();
        for batch in repos.chunks_mut(self.options.max_reconcile_rate.max(1)) {
            if cancel.is_cancelled() {
                break;
            }
            let outcomes: Vec<Option<Outcome>> = thread::scope(|scope| {
                let handles: Vec<_> = batch
                    .iter_mut()
                    .map(|repo| scope.spawn(move || self.reconcile_one(repo, cancel)))
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| handle.join().unwrap_or(None))
                    .collect()
            });
            for outcome in outcomes {
                match outcome {
                    Some(Outcome::Created) => summary.created += 1,
                    Some(Outcome::UpToDate | Outcome::Updated) => summary.up_to_date += 1,
                    None => summary.failed += 1,
                }
            }
        }

        info!(
            "Reconciliation pass done: {} created, {} up to date, {} failed",
            summary.created, summary.up_to_date, summary.failed
        );
        Ok(summary)
    }

    fn reconcile_one(&self, repo: &mut Repo, cancel: &CancelToken) -> Option<Outcome> {
        let name = repo.metadata.name.clone();
        match self.reconciler.reconcile(repo, cancel) {
            Ok(outcome) => {
                info!("Repo '{}': {:?}", name, outcome);
                Some(outcome)
            }
            Err(e) => {
                error!("Repo '{}' failed to reconcile: {}", name, e);
                None
            }
        }
    }

    /// Runs passes every `sync_period` until `cancel` fires.
    pub fn run(&self, cancel: &CancelToken) -> Result<()> {
        info!(
            "Starting controller, sync period {}",
            humantime::format_duration(self.options.sync_period)
        );
        while !cancel.is_cancelled() {
            if let Err(e) = self.run_once(cancel) {
                error!("Reconciliation pass failed: {}", e);
            }
            let wake = Instant::now() + self.options.sync_period;
            while !cancel.is_cancelled() && Instant::now() < wake {
                thread::sleep(SLEEP_STEP.min(wake.saturating_duration_since(Instant::now())));
            }
        }
        info!("Controller stopped");
        Ok(())
    }
}
