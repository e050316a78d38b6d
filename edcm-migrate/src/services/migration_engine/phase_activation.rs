//! Activation: event dating and repeat-form triggering
//!
//! Events run in schedule order. An event whose rows carry no parseable
//! date is left alone entirely: the target only provisions forms under a
//! dated event.

use super::compensation::CompensationMode;
use super::{MigrationEngine, RunContext};
use crate::error::MigrationResult;
use crate::models::{EventGroupUnit, UnitState};
use crate::services::edc_client::{EdcApi, EventDateEntry, FormEntry};
use chrono::NaiveDate;
use edcm_common::time::format_iso_date;
use tracing::{debug, info};

impl<C: EdcApi> MigrationEngine<C> {
    /// Activate, discover and submit every scheduled event of one unit
    pub(super) async fn process_unit(
        &self,
        ctx: &mut RunContext,
        unit: &mut EventGroupUnit,
    ) -> MigrationResult<()> {
        let events = self.schedule.events_for(&unit.event_group);
        if events.is_empty() {
            debug!(event_group = %unit.event_group, "No scheduled events for event group");
        }

        for event_name in &events {
            unit.transition_to(UnitState::Activating);

            let Some(date) = unit.event_date(event_name) else {
                debug!(
                    subject = %unit.subject.new_id,
                    event = %event_name,
                    "No parseable event date, skipping event"
                );
                ctx.summary.events_skipped_no_date += 1;
                continue;
            };

            let triggered = self.activate_event(ctx, unit, event_name, date).await?;
            self.discover_forms(ctx, unit, event_name, &triggered).await?;
            ctx.summary.events_processed += 1;
        }

        unit.transition_to(UnitState::Done);
        Ok(())
    }

    /// Set the event date, then trigger the event's repeat forms
    ///
    /// Returns the triggered form names so discovery can merge them into
    /// polls that do not list them yet.
    async fn activate_event(
        &self,
        ctx: &mut RunContext,
        unit: &EventGroupUnit,
        event_name: &str,
        date: NaiveDate,
    ) -> MigrationResult<Vec<String>> {
        let scope = unit.scope(&self.study, event_name);
        let subject = unit.subject.new_id.as_str();

        let entry = EventDateEntry {
            scope: scope.clone(),
            date: format_iso_date(date),
        };
        info!(subject = %subject, event = %event_name, date = %entry.date, "Setting event date");
        let result = self
            .client
            .set_event_date(&ctx.token, &self.study.study_name, &entry)
            .await;
        if let Some(response) = ctx.absorb(result, subject, event_name, "set_event_date")? {
            ctx.record_response(&response, CompensationMode::Disabled, subject, event_name, "set_event_date");
        }

        let triggered = self.schedule.trigger_forms(&unit.event_group, event_name);
        if !triggered.is_empty() {
            let forms: Vec<FormEntry> = triggered
                .iter()
                .map(|form_name| FormEntry {
                    scope: scope.clone(),
                    form_name: form_name.clone(),
                })
                .collect();
            info!(subject = %subject, event = %event_name, forms = ?triggered, "Triggering repeat forms");
            let result = self
                .client
                .trigger_forms(&ctx.token, &self.study.study_name, &forms)
                .await;
            if let Some(response) = ctx.absorb(result, subject, event_name, "trigger_forms")? {
                ctx.record_response(&response, CompensationMode::Disabled, subject, event_name, "trigger_forms");
            }
        }

        Ok(triggered)
    }
}
