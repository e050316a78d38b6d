//! Target synchronization engine
//!
//! Drives one authenticated session through every (subject, event group)
//! unit, strictly one call at a time:
//!
//! - **Activation** (`phase_activation`): date the event, trigger repeat forms
//! - **Discovery** (`phase_discovery`): poll the form set until two
//!   consecutive polls agree
//! - **Submission** (`phase_submission`): post items for new forms, submit
//!   the forms that received data
//! - **Compensation** (`compensation`): create missing item groups and retry
//!   the affected items once
//!
//! Per-item and per-event failures go to the [`FailureLog`]; only session
//! failures end a run early, and the logs are written either way.

mod compensation;
mod phase_activation;
mod phase_discovery;
mod phase_submission;

pub use compensation::{
    classify, Classification, CompensationMode, CompensationTask, ITEM_GROUP_MISSING_MARKER,
};
pub use phase_submission::build_form_payloads;

use crate::config::{Credentials, EngineSettings, StudyContext, TargetConfig};
use crate::error::{MigrationError, MigrationResult};
use crate::models::{
    EventGroupUnit, FailureRecord, MigrationOutcome, RecordTable, RunSummary, SubjectMap,
    TargetSchedule,
};
use crate::services::edc_client::{EdcApi, EdcError, SessionToken};
use crate::services::failure_log::{FailureLog, FailureLogPaths};
use crate::services::vault_client::VaultClient;
use std::collections::HashSet;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Everything a run needs besides the client
#[derive(Debug, Clone)]
pub struct MigrationRequest {
    pub target: TargetConfig,
    pub study: StudyContext,
    pub records: RecordTable,
    pub schedule: TargetSchedule,
    pub subjects: SubjectMap,
    pub settings: EngineSettings,
    /// Directory receiving both failure logs
    pub output_dir: PathBuf,
}

/// Run a migration against the Vault target
pub async fn migrate(
    request: MigrationRequest,
    cancel: CancellationToken,
) -> MigrationResult<MigrationOutcome> {
    migrate_with(request, cancel, |creds, settings| {
        VaultClient::new(
            &creds.host,
            &creds.api_version,
            settings.request_timeout,
            settings.min_request_interval,
        )
    })
    .await
}

/// Run a migration with a caller-supplied client constructor
///
/// Skip decisions happen before `connect` is called, so a skipped run
/// issues no network traffic and writes no files.
pub async fn migrate_with<C, F>(
    request: MigrationRequest,
    cancel: CancellationToken,
    connect: F,
) -> MigrationResult<MigrationOutcome>
where
    C: EdcApi,
    F: FnOnce(&Credentials, &EngineSettings) -> Result<C, EdcError>,
{
    let creds = match request.target.validate() {
        Ok(creds) => creds,
        Err(missing) => {
            let reason = format!("Missing target configuration: {}", missing.join(", "));
            warn!("Migration skipped: {}", reason);
            return Ok(MigrationOutcome::Skipped { reason });
        }
    };

    if request.subjects.is_empty() {
        let reason = "No subject mapping provided".to_string();
        warn!("Migration skipped: {}", reason);
        return Ok(MigrationOutcome::Skipped { reason });
    }

    let settings = request.settings.sanitized();
    let client = connect(&creds, &settings).map_err(MigrationError::Client)?;
    let engine = MigrationEngine::new(
        client,
        request.study,
        request.schedule,
        request.records,
        request.subjects,
        settings,
    );

    let summary = engine
        .run(&creds, FailureLogPaths::in_dir(&request.output_dir), &cancel)
        .await?;
    Ok(MigrationOutcome::Completed(summary))
}

/// Mutable state threaded through every stage of one run
struct RunContext {
    token: SessionToken,
    log: FailureLog,
    summary: RunSummary,
    /// (subject, event, form) already counted in `forms_submitted`
    submitted_forms: HashSet<(String, String, String)>,
}

impl RunContext {
    /// Turn a call error into a logged failure, or a fatal error
    ///
    /// `SessionExpired` ends the run. Undecodable responses are logged as
    /// parse failures, everything else as transport failures.
    fn absorb<T>(
        &mut self,
        result: Result<T, EdcError>,
        subject: &str,
        event_name: &str,
        action: &str,
    ) -> MigrationResult<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(EdcError::SessionExpired(message)) => {
                error!(subject = %subject, event = %event_name, action = %action, "Session rejected by target");
                Err(MigrationError::SessionExpired(message))
            }
            Err(EdcError::Parse(message)) => {
                warn!(subject = %subject, event = %event_name, action = %action, "Undecodable response: {}", message);
                self.log
                    .record(FailureRecord::parse(subject, event_name, action, message));
                Ok(None)
            }
            Err(other) => {
                warn!(subject = %subject, event = %event_name, action = %action, "Call failed: {}", other);
                self.log
                    .record(FailureRecord::transport(subject, event_name, action, other));
                Ok(None)
            }
        }
    }

    /// Count a submitted form once, however many submit calls carried it
    fn count_submitted(&mut self, subject: &str, event_name: &str, form_name: &str) {
        let key = (subject.to_string(), event_name.to_string(), form_name.to_string());
        if self.submitted_forms.insert(key) {
            self.summary.forms_submitted += 1;
        }
    }
}

/// Synchronization engine over an [`EdcApi`] client
pub struct MigrationEngine<C: EdcApi> {
    client: C,
    study: StudyContext,
    schedule: TargetSchedule,
    records: RecordTable,
    subjects: SubjectMap,
    settings: EngineSettings,
}

impl<C: EdcApi> MigrationEngine<C> {
    pub fn new(
        client: C,
        study: StudyContext,
        schedule: TargetSchedule,
        records: RecordTable,
        subjects: SubjectMap,
        settings: EngineSettings,
    ) -> Self {
        Self {
            client,
            study,
            schedule,
            records,
            subjects,
            settings,
        }
    }

    /// Authenticate, process every unit, then write the failure logs
    ///
    /// The logs are written on every exit path, including authentication
    /// failure and session expiry.
    pub async fn run(
        &self,
        creds: &Credentials,
        paths: FailureLogPaths,
        cancel: &CancellationToken,
    ) -> MigrationResult<RunSummary> {
        let mut log = FailureLog::new(paths.clone());
        let summary = RunSummary::new(paths.failures, paths.item_groups);

        info!(
            run_id = %summary.run_id,
            study = %self.study.study_name,
            site = %self.study.site,
            subjects = self.subjects.len(),
            records = self.records.len(),
            "Starting migration"
        );

        let token = match self
            .client
            .authenticate(&creds.username, &creds.password)
            .await
        {
            Ok(token) => token,
            Err(e) => {
                error!("Authentication failed: {}", e);
                flush_after_error(&mut log);
                return Err(MigrationError::Authentication(e));
            }
        };

        let mut ctx = RunContext {
            token,
            log,
            summary,
            submitted_forms: HashSet::new(),
        };
        let result = self.process_units(&mut ctx, cancel).await;
        let RunContext {
            mut log,
            mut summary,
            ..
        } = ctx;

        match result {
            Ok(()) => {
                log.flush()?;
                summary.finish(log.counts());
                info!(
                    run_id = %summary.run_id,
                    units = summary.units_processed,
                    events = summary.events_processed,
                    forms_submitted = summary.forms_submitted,
                    failures = summary.failures.total(),
                    cancelled = summary.cancelled,
                    "Migration finished"
                );
                Ok(summary)
            }
            Err(e) => {
                flush_after_error(&mut log);
                Err(e)
            }
        }
    }

    /// Subject by subject, event group by event group
    async fn process_units(
        &self,
        ctx: &mut RunContext,
        cancel: &CancellationToken,
    ) -> MigrationResult<()> {
        let event_groups = self.schedule.event_groups();

        for mapping in self.subjects.iter() {
            for event_group in &event_groups {
                if cancel.is_cancelled() {
                    warn!("Migration cancelled, stopping before next unit");
                    ctx.summary.cancelled = true;
                    return Ok(());
                }

                let records = self.records.unit_records(event_group, &mapping.old_id);
                if records.is_empty() {
                    debug!(
                        subject = %mapping.old_id,
                        event_group = %event_group,
                        "No records for unit"
                    );
                    continue;
                }

                let mut unit = EventGroupUnit::new(event_group.clone(), mapping.clone(), records);
                info!(
                    old_subject = %mapping.old_id,
                    subject = %mapping.new_id,
                    event_group = %event_group,
                    records = unit.records.len(),
                    "Processing unit"
                );
                self.process_unit(ctx, &mut unit).await?;
                ctx.summary.units_processed += 1;
            }
        }

        Ok(())
    }
}

fn flush_after_error(log: &mut FailureLog) {
    if let Err(e) = log.flush() {
        error!("Failed to write failure logs: {}", e);
    }
}
