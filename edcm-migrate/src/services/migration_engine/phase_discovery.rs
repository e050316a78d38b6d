//! Discovery: poll the event's form set until it stops changing
//!
//! The target provisions forms progressively, so submitting one form can
//! make further forms appear on a later poll. Each poll is compared with
//! the previous one; two identical consecutive polls end the loop. Forms
//! are submitted at most once per event, and the loop is bounded by
//! `max_polls` with a doubling delay between polls.

use super::{MigrationEngine, RunContext};
use crate::error::MigrationResult;
use crate::models::{EventGroupUnit, FailureRecord, UnitState};
use crate::services::edc_client::EdcApi;
use std::collections::HashSet;
use tracing::{debug, info, warn};

impl<C: EdcApi> MigrationEngine<C> {
    /// Run the discovery loop for one event
    ///
    /// `triggered` forms are merged into every poll, covering a listing
    /// that lags behind the trigger call.
    pub(super) async fn discover_forms(
        &self,
        ctx: &mut RunContext,
        unit: &mut EventGroupUnit,
        event_name: &str,
        triggered: &[String],
    ) -> MigrationResult<()> {
        let scope = unit.scope(&self.study, event_name);
        let mut previous: Option<HashSet<String>> = None;
        let mut submitted: HashSet<String> = HashSet::new();
        let mut delay = self.settings.poll_backoff;

        for poll in 1..=self.settings.max_polls {
            if poll > 1 && !delay.is_zero() {
                debug!(poll, delay_ms = delay.as_millis() as u64, "Waiting before next form poll");
                tokio::time::sleep(delay).await;
                delay = self.settings.next_backoff(delay);
            }

            unit.transition_to(UnitState::Discovering);
            let result = self
                .client
                .get_forms(&ctx.token, &self.study.study_name, &scope)
                .await;
            let Some(mut observed) =
                ctx.absorb(result, &scope.subject, event_name, "get_forms")?
            else {
                // No listing to compare against; the event ends here
                return Ok(());
            };

            for form in triggered {
                if !observed.contains(form) {
                    observed.push(form.clone());
                }
            }
            let observed_set: HashSet<String> = observed.iter().cloned().collect();

            if previous.as_ref() == Some(&observed_set) {
                info!(
                    subject = %scope.subject,
                    event = %event_name,
                    polls = poll,
                    forms = observed_set.len(),
                    "Forms stable"
                );
                return Ok(());
            }

            let delta: Vec<String> = observed
                .into_iter()
                .filter(|form| !submitted.contains(form))
                .collect();
            if !delta.is_empty() {
                debug!(subject = %scope.subject, event = %event_name, poll, forms = ?delta, "New forms discovered");
                unit.transition_to(UnitState::Submitting);
                self.submit_forms_with_items(ctx, unit, event_name, &delta)
                    .await?;
                submitted.extend(delta);
            }

            previous = Some(observed_set);
        }

        warn!(
            subject = %scope.subject,
            event_group = %unit.event_group,
            event = %event_name,
            polls = self.settings.max_polls,
            "Form discovery did not converge"
        );
        ctx.log.record(FailureRecord::non_convergence(
            &scope.subject,
            &unit.event_group,
            event_name,
            self.settings.max_polls,
        ));
        Ok(())
    }
}
