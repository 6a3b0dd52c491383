//! Batch orchestration: which identities to sync, in what order, and what
//! happened to each of them.

use crate::config::SyncConfig;
use crate::delay_manager::PacingPolicy;
use crate::http_session::HttpSession;
use crate::input_loader;
use crate::model::Identity;
use crate::page::{PageError, PageSession};
use crate::reconcile::{reconcile, ReconcileStatus, Reconciliation};
use crate::report::ReportWriter;
use crate::store::{RecordStore, StoreError};
use crate::workflow::{Acquisition, SearchWorkflow, Stage};
use log::{error, info, warn};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("could not enumerate identities: {0}")]
    Store(#[from] StoreError),

    #[error("could not read identity file: {0}")]
    Input(#[from] csv::Error),

    #[error("could not open page session: {0}")]
    Session(#[from] PageError),

    #[error("could not open report file: {0}")]
    Report(#[source] csv::Error),
}

/// Where the batch finds the identities to sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySource {
    /// A collection in the record store with a `cdcr_number` column.
    Store { collection: String },
    Csv(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Synced(ReconcileStatus),
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityOutcome {
    pub identity: Identity,
    pub status: OutcomeStatus,
    pub name: Option<String>,
    pub hearings: usize,
    /// Where acquisition ended; `None` when no acquisition was attempted.
    pub stage: Option<Stage>,
    pub no_records: bool,
    /// The store fault, or the page fault that cut acquisition short.
    pub error: Option<String>,
}

impl IdentityOutcome {
    fn skipped(identity: &Identity) -> Self {
        IdentityOutcome {
            identity: identity.clone(),
            status: OutcomeStatus::Skipped,
            name: None,
            hearings: 0,
            stage: None,
            no_records: false,
            error: None,
        }
    }

    fn from_attempt(acquisition: &Acquisition, reconciled: &Result<Reconciliation, StoreError>) -> Self {
        let (status, error) = match reconciled {
            Ok(reconciliation) => (OutcomeStatus::Synced(reconciliation.status), acquisition.fault.clone()),
            Err(e) => (OutcomeStatus::Failed, Some(e.to_string())),
        };
        IdentityOutcome {
            identity: acquisition.record.identity.clone(),
            status,
            name: acquisition.record.name.clone(),
            hearings: acquisition.record.hearings.len(),
            stage: Some(acquisition.stage),
            no_records: acquisition.no_records,
            error,
        }
    }

    pub fn label(&self) -> &'static str {
        match self.status {
            OutcomeStatus::Skipped => "skipped",
            OutcomeStatus::Failed => "failed",
            OutcomeStatus::Synced(_) if self.no_records => "no_records",
            OutcomeStatus::Synced(status) => status.as_str(),
        }
    }
}

/// Counters and per-identity outcomes of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub interrupted: bool,
    pub outcomes: Vec<IdentityOutcome>,
}

impl BatchSummary {
    fn push(&mut self, outcome: IdentityOutcome) {
        match outcome.status {
            OutcomeStatus::Synced(_) => self.succeeded += 1,
            OutcomeStatus::Skipped => self.skipped += 1,
            OutcomeStatus::Failed => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(80);
        writeln!(f, "{rule}")?;
        if self.interrupted {
            writeln!(f, "SCRAPING INTERRUPTED")?;
        } else {
            writeln!(f, "SCRAPING COMPLETE")?;
        }
        writeln!(f, "{rule}")?;
        writeln!(f, "Total CDCR numbers: {}", self.total)?;
        writeln!(f, "Successfully scraped: {}", self.succeeded)?;
        writeln!(f, "Skipped (already exists): {}", self.skipped)?;
        writeln!(f, "Errors: {}", self.failed)?;
        write!(f, "{rule}")
    }
}

/// Result of single-identity mode.
#[derive(Debug)]
pub struct SingleRun {
    pub acquisition: Acquisition,
    pub reconciled: Result<Reconciliation, StoreError>,
}

pub struct BatchOrchestrator<'a, S: RecordStore + ?Sized, P: PageSession + ?Sized> {
    store: &'a S,
    session: &'a mut P,
    workflow: &'a SearchWorkflow,
    pacing: PacingPolicy,
    stop: &'a AtomicBool,
    report: Option<ReportWriter>,
}

impl<'a, S: RecordStore + ?Sized, P: PageSession + ?Sized> BatchOrchestrator<'a, S, P> {
    pub fn new(
        store: &'a S,
        session: &'a mut P,
        workflow: &'a SearchWorkflow,
        pacing: PacingPolicy,
        stop: &'a AtomicBool,
    ) -> Self {
        BatchOrchestrator {
            store,
            session,
            workflow,
            pacing,
            stop,
            report: None,
        }
    }

    pub fn with_report(mut self, report: ReportWriter) -> Self {
        self.report = Some(report);
        self
    }

    /// Sorted, de-duplicated identities from `source`.
    pub fn enumerate(&self, source: &IdentitySource) -> Result<Vec<Identity>, BatchError> {
        let identities = match source {
            IdentitySource::Store { collection } => {
                info!("Fetching CDCR numbers from {} table...", collection);
                self.store.list_distinct_identities(collection)?
            }
            IdentitySource::Csv(path) => input_loader::load_identities(path)?,
        };
        info!("Found {} unique CDCR numbers", identities.len());
        Ok(identities.into_iter().collect())
    }

    /// Processes `identities` in order, one at a time.
    ///
    /// Without `force_refresh`, identities already in the store are skipped
    /// without touching the session. A raised stop flag ends the run between
    /// identities.
    pub fn run(&mut self, identities: &[Identity], force_refresh: bool) -> BatchSummary {
        let mut summary = BatchSummary {
            total: identities.len(),
            ..BatchSummary::default()
        };
        info!("Starting CDCR sync for {} inmates", identities.len());

        for (i, identity) in identities.iter().enumerate() {
            if self.stop.load(Ordering::SeqCst) {
                warn!("Stop requested; ending batch before {}", identity);
                summary.interrupted = true;
                break;
            }
            info!("[{}/{}] Processing CDCR number: {}", i + 1, identities.len(), identity);

            if !force_refresh {
                match self.store.exists(identity) {
                    Ok(true) => {
                        info!("Skipping {}: data already exists (use --force to re-scrape)", identity);
                        self.finish(&mut summary, IdentityOutcome::skipped(identity));
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        error!("Could not check existing record for {}: {}", identity, e);
                        let mut outcome = IdentityOutcome::skipped(identity);
                        outcome.status = OutcomeStatus::Failed;
                        outcome.error = Some(e.to_string());
                        self.finish(&mut summary, outcome);
                        continue;
                    }
                }
            }

            let attempt = self.sync_one(identity);
            let outcome = IdentityOutcome::from_attempt(&attempt.acquisition, &attempt.reconciled);
            self.finish(&mut summary, outcome);

            if i + 1 < identities.len() && !self.pacing.pause_between_identities(self.stop) {
                warn!("Stop requested during pause");
                summary.interrupted = true;
                break;
            }
        }
        if self.stop.load(Ordering::SeqCst) {
            summary.interrupted = true;
        }

        info!(
            "Sync finished: {} total, {} succeeded, {} skipped, {} failed{}",
            summary.total,
            summary.succeeded,
            summary.skipped,
            summary.failed,
            if summary.interrupted { " (interrupted)" } else { "" }
        );
        summary
    }

    /// Single-identity mode: no enumeration, no skip check.
    pub fn run_single(&mut self, identity: &Identity) -> SingleRun {
        let attempt = self.sync_one(identity);
        let outcome = IdentityOutcome::from_attempt(&attempt.acquisition, &attempt.reconciled);
        self.write_report(&outcome);
        attempt
    }

    fn sync_one(&mut self, identity: &Identity) -> SingleRun {
        let acquisition = self.workflow.acquire(&mut *self.session, identity);
        let reconciled = reconcile(self.store, &acquisition.record);
        if let Err(e) = &reconciled {
            error!("Error saving {} to database: {}", identity, e);
        }
        SingleRun {
            acquisition,
            reconciled,
        }
    }

    fn finish(&mut self, summary: &mut BatchSummary, outcome: IdentityOutcome) {
        self.write_report(&outcome);
        summary.push(outcome);
    }

    fn write_report(&mut self, outcome: &IdentityOutcome) {
        if let Some(report) = self.report.as_mut() {
            if let Err(e) = report.write(outcome) {
                error!("Failed to write report row for {}: {}", outcome.identity, e);
            }
        }
    }
}

/// Batch mode end to end: one HTTP session for the whole run, closed on the
/// way out whether the batch completed, was interrupted or failed to
/// enumerate.
pub fn run_batch<S: RecordStore + ?Sized>(
    config: &SyncConfig,
    store: &S,
    source: &IdentitySource,
    stop: &AtomicBool,
) -> Result<BatchSummary, BatchError> {
    let report = config
        .report
        .as_ref()
        .map(ReportWriter::open)
        .transpose()
        .map_err(BatchError::Report)?;
    let workflow = SearchWorkflow::new(config.profile.clone(), config.timeouts, config.pacing);
    let mut session = HttpSession::open(config.session_options())?;

    let result = {
        let mut orchestrator = BatchOrchestrator::new(store, &mut session, &workflow, config.pacing, stop);
        if let Some(report) = report {
            orchestrator = orchestrator.with_report(report);
        }
        match orchestrator.enumerate(source) {
            Ok(identities) => Ok(orchestrator.run(&identities, config.force_refresh)),
            Err(e) => Err(e),
        }
    };
    session.close();
    result
}

/// Single-identity mode end to end.
pub fn run_single<S: RecordStore + ?Sized>(
    config: &SyncConfig,
    store: &S,
    identity: &Identity,
    stop: &AtomicBool,
) -> Result<SingleRun, BatchError> {
    let report = config
        .report
        .as_ref()
        .map(ReportWriter::open)
        .transpose()
        .map_err(BatchError::Report)?;
    let workflow = SearchWorkflow::new(config.profile.clone(), config.timeouts, config.pacing);
    let mut session = HttpSession::open(config.session_options())?;

    let run = {
        let mut orchestrator = BatchOrchestrator::new(store, &mut session, &workflow, config.pacing, stop);
        if let Some(report) = report {
            orchestrator = orchestrator.with_report(report);
        }
        orchestrator.run_single(identity)
    };
    session.close();
    Ok(run)
}
