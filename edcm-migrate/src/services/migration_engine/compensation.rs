//! Failure classification and item-group compensation
//!
//! An item rejected because its item group was never instantiated can be
//! repaired: create the item group, then post that form/item-group pair
//! again. Classification only collects [`CompensationTask`]s; the engine
//! drains them once after the post that produced them. Nested posts are
//! classified with [`CompensationMode::Disabled`], so a task can never
//! spawn another task.

use super::{MigrationEngine, RunContext};
use crate::error::MigrationResult;
use crate::models::{EventGroupUnit, FailureRecord};
use crate::services::edc_client::{display_value, ActionResponse, EdcApi, ResponseStatus};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Error text the target returns for an item whose item group does not exist
pub const ITEM_GROUP_MISSING_MARKER: &str = "Unique item group cannot be found";

/// Whether missing item groups in a response may be compensated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompensationMode {
    Enabled,
    Disabled,
}

/// One item group to create and retry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationTask {
    pub form_name: String,
    pub item_group: String,
}

/// Classified content of one response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Failure lines in response order
    pub failures: Vec<FailureRecord>,
    /// At most one task per item group
    pub tasks: Vec<CompensationTask>,
}

/// Split a response into failure lines and compensation tasks
///
/// Item-group-missing items are always logged to the item-group log. With
/// compensation enabled, the first such item for each item group also
/// yields a task; later items of the same group only add log lines.
/// Tasks are keyed on the item group name alone, so when two forms report
/// the same item group missing only the first form is compensated.
pub fn classify(response: &ActionResponse, mode: CompensationMode) -> Classification {
    let mut classification = Classification::default();

    for item in response
        .items
        .iter()
        .filter(|i| i.response_status == ResponseStatus::Failure)
    {
        let message = display_value(&item.error_message);
        let item_group_missing = message.contains(ITEM_GROUP_MISSING_MARKER);
        classification
            .failures
            .push(FailureRecord::item(item, item_group_missing));

        if !item_group_missing || mode == CompensationMode::Disabled {
            continue;
        }
        match (item.form_name.as_deref(), item.itemgroup_name.as_deref()) {
            (Some(form_name), Some(item_group)) => {
                if !classification.tasks.iter().any(|t| t.item_group == item_group) {
                    classification.tasks.push(CompensationTask {
                        form_name: form_name.to_string(),
                        item_group: item_group.to_string(),
                    });
                }
            }
            _ => warn!(
                item = %item.item_name.as_deref().unwrap_or("N/A"),
                "Missing item group reported without form or item group name, cannot compensate"
            ),
        }
    }

    for event in response
        .events
        .iter()
        .filter(|e| e.response_status == ResponseStatus::Failure)
    {
        classification.failures.push(FailureRecord::event_date(event));
    }

    for form in response
        .forms
        .iter()
        .filter(|f| f.response_status == ResponseStatus::Failure)
    {
        classification.failures.push(FailureRecord::form(form));
    }

    classification
}

impl RunContext {
    /// Log every failure in `response` and return its compensation tasks
    pub(super) fn record_response(
        &mut self,
        response: &ActionResponse,
        mode: CompensationMode,
        subject: &str,
        event_name: &str,
        action: &str,
    ) -> Vec<CompensationTask> {
        if response.is_request_failure() {
            warn!(subject = %subject, event = %event_name, action = %action, "Request rejected: {}", response.error_summary());
            self.log.record(FailureRecord::request(
                subject,
                event_name,
                action,
                response.error_summary(),
            ));
            return Vec::new();
        }

        let classification = classify(response, mode);
        if !classification.failures.is_empty() {
            debug!(
                subject = %subject,
                event = %event_name,
                action = %action,
                failures = classification.failures.len(),
                "Response carried failures"
            );
        }
        for failure in classification.failures {
            self.log.record(failure);
        }
        classification.tasks
    }
}

impl<C: EdcApi> MigrationEngine<C> {
    /// Create each queued item group and post its items once more
    ///
    /// Runs once per outer post. Retried posts use
    /// [`CompensationMode::Disabled`] and never extend the queue.
    pub(super) async fn drain_compensation(
        &self,
        ctx: &mut RunContext,
        unit: &EventGroupUnit,
        event_name: &str,
        tasks: Vec<CompensationTask>,
    ) -> MigrationResult<()> {
        let mut queue: VecDeque<CompensationTask> = tasks.into();
        if !queue.is_empty() {
            info!(
                subject = %unit.subject.new_id,
                event = %event_name,
                queued = queue.len(),
                "Compensating missing item groups"
            );
        }

        while let Some(task) = queue.pop_front() {
            let created = self
                .create_item_group(ctx, unit, event_name, &task.form_name, &task.item_group)
                .await?;
            if !created {
                continue;
            }

            let retry = self
                .post_items(
                    ctx,
                    unit,
                    event_name,
                    std::slice::from_ref(&task.form_name),
                    Some(&task.item_group),
                    CompensationMode::Disabled,
                )
                .await?;
            if let Some(posted) = retry {
                self.finalize_forms(ctx, unit, event_name, &posted.forms).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FailureKind;
    use serde_json::json;

    fn response(body: serde_json::Value) -> ActionResponse {
        serde_json::from_value(body).unwrap()
    }

    fn missing(item: &str, form: &str, item_group: &str) -> serde_json::Value {
        json!({
            "responseStatus": "FAILURE",
            "errorMessage": "Unique item group cannot be found for the given fields",
            "subject": "101-001",
            "event_name": "ev_D1",
            "form_name": form,
            "itemgroup_name": item_group,
            "item_name": item,
            "value": "1"
        })
    }

    #[test]
    fn test_same_item_group_compensated_once() {
        let r = response(json!({
            "responseStatus": "SUCCESS",
            "items": [missing("AETERM", "AE", "ig_AE"), missing("AESEV", "AE", "ig_AE")]
        }));

        let c = classify(&r, CompensationMode::Enabled);
        assert_eq!(
            c.tasks,
            vec![CompensationTask {
                form_name: "AE".to_string(),
                item_group: "ig_AE".to_string()
            }]
        );
        assert_eq!(c.failures.len(), 2);
        assert!(c.failures.iter().all(|f| f.kind == FailureKind::ItemGroupMissing));
    }

    #[test]
    fn test_distinct_item_groups_each_get_a_task() {
        let r = response(json!({
            "items": [missing("A", "AE", "ig_AE"), missing("B", "CM", "ig_CM")]
        }));
        let c = classify(&r, CompensationMode::Enabled);
        assert_eq!(c.tasks.len(), 2);
        assert_eq!(c.tasks[1].form_name, "CM");
    }

    #[test]
    fn test_item_group_shared_across_forms_compensated_for_first_form() {
        let r = response(json!({
            "items": [missing("A", "AE", "ig_COMMON"), missing("B", "CM", "ig_COMMON")]
        }));
        let c = classify(&r, CompensationMode::Enabled);
        assert_eq!(c.tasks.len(), 1);
        assert_eq!(c.tasks[0].form_name, "AE");
        assert_eq!(c.failures.len(), 2);
    }

    #[test]
    fn test_disabled_mode_logs_without_tasks() {
        let r = response(json!({"items": [missing("A", "AE", "ig_AE")]}));
        let c = classify(&r, CompensationMode::Disabled);
        assert!(c.tasks.is_empty());
        assert_eq!(c.failures[0].kind, FailureKind::ItemGroupMissing);
    }

    #[test]
    fn test_other_failures_are_terminal() {
        let r = response(json!({
            "items": [
                {"responseStatus": "SUCCESS", "item_name": "OK"},
                {"responseStatus": "FAILURE", "item_name": "SYSBP", "errorMessage": "Invalid value"}
            ],
            "events": [
                {"responseStatus": "FAILURE", "event_name": "ev_D1", "errorMessage": "Date before consent"}
            ],
            "forms": [
                {"responseStatus": "FAILURE", "form_name": "VS", "errorMessage": "Form locked"},
                {"responseStatus": "SUCCESS", "form_name": "LB"}
            ]
        }));

        let c = classify(&r, CompensationMode::Enabled);
        assert!(c.tasks.is_empty());
        let kinds: Vec<_> = c.failures.iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![FailureKind::Item, FailureKind::EventDate, FailureKind::Form]);
    }

    #[test]
    fn test_missing_without_item_group_name_not_queued() {
        let r = response(json!({
            "items": [{"responseStatus": "FAILURE", "errorMessage": "Unique item group cannot be found"}]
        }));
        let c = classify(&r, CompensationMode::Enabled);
        assert!(c.tasks.is_empty());
        assert_eq!(c.failures.len(), 1);
    }
}
