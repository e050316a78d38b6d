//! Failure records
//!
//! Each incident becomes one formatted log line. Item-group-missing lines
//! go to their own log; every other kind goes to the generic log.

use crate::services::edc_client::{display_value, EventResult, FormResult, ItemResult};
use serde::{Deserialize, Serialize};
use std::fmt;

const NA: &str = "N/A";

/// Failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Item rejected because its item group instance does not exist
    ItemGroupMissing,
    /// Any other item rejection
    Item,
    EventDate,
    Form,
    /// Top-level FAILURE without per-entry results
    Request,
    Transport,
    Parse,
    NonConvergence,
}

impl FailureKind {
    /// True for the kind written to the item-group-missing log
    pub fn is_item_group_missing(self) -> bool {
        self == FailureKind::ItemGroupMissing
    }
}

/// One logged failure incident
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub line: String,
}

fn or_na(value: Option<&str>) -> &str {
    value.unwrap_or(NA)
}

impl FailureRecord {
    /// Item-level FAILURE; `item_group_missing` selects the log
    pub fn item(result: &ItemResult, item_group_missing: bool) -> Self {
        let line = format!(
            "ITEM FAILURE - SUBJECT: {}, EVENT NAME: {}, FORM NAME: {}, ITEM NAME: {}, VALUE: {}, ERROR: {}",
            or_na(result.subject.as_deref()),
            or_na(result.event_name.as_deref()),
            or_na(result.form_name.as_deref()),
            or_na(result.item_name.as_deref()),
            display_value(&result.value),
            display_value(&result.error_message),
        );
        let kind = if item_group_missing {
            FailureKind::ItemGroupMissing
        } else {
            FailureKind::Item
        };
        Self { kind, line }
    }

    pub fn event_date(result: &EventResult) -> Self {
        Self {
            kind: FailureKind::EventDate,
            line: format!(
                "EVENT DATE FAILURE - SUBJECT: {}, EVENT: {}, DATE: {}, ERROR: {}",
                or_na(result.subject.as_deref()),
                or_na(result.event_name.as_deref()),
                or_na(result.date.as_deref()),
                display_value(&result.error_message),
            ),
        }
    }

    pub fn form(result: &FormResult) -> Self {
        Self {
            kind: FailureKind::Form,
            line: format!(
                "FORM FAILURE - SUBJECT: {}, EVENT NAME: {}, FORM NAME: {}, ERROR: {}",
                or_na(result.subject.as_deref()),
                or_na(result.event_name.as_deref()),
                or_na(result.form_name.as_deref()),
                display_value(&result.error_message),
            ),
        }
    }

    pub fn request(subject: &str, event_name: &str, action: &str, error: impl fmt::Display) -> Self {
        Self::action_line(FailureKind::Request, "REQUEST FAILURE", subject, event_name, action, error)
    }

    pub fn transport(subject: &str, event_name: &str, action: &str, error: impl fmt::Display) -> Self {
        Self::action_line(FailureKind::Transport, "TRANSPORT FAILURE", subject, event_name, action, error)
    }

    pub fn parse(subject: &str, event_name: &str, action: &str, error: impl fmt::Display) -> Self {
        Self::action_line(FailureKind::Parse, "RESPONSE PARSE FAILURE", subject, event_name, action, error)
    }

    pub fn non_convergence(subject: &str, event_group: &str, event_name: &str, polls: u32) -> Self {
        Self {
            kind: FailureKind::NonConvergence,
            line: format!(
                "DISCOVERY NON-CONVERGENCE - SUBJECT: {}, EVENT GROUP: {}, EVENT NAME: {}, POLLS: {}",
                subject, event_group, event_name, polls
            ),
        }
    }

    fn action_line(
        kind: FailureKind,
        label: &str,
        subject: &str,
        event_name: &str,
        action: &str,
        error: impl fmt::Display,
    ) -> Self {
        Self {
            kind,
            line: format!(
                "{} - SUBJECT: {}, EVENT NAME: {}, ACTION: {}, ERROR: {}",
                label, subject, event_name, action, error
            ),
        }
    }
}

/// Failure counts by category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FailureCounts {
    pub item_group_missing: usize,
    pub item: usize,
    pub event_date: usize,
    pub form: usize,
    pub request: usize,
    pub transport: usize,
    pub parse: usize,
    pub non_convergence: usize,
}

impl FailureCounts {
    pub fn record(&mut self, kind: FailureKind) {
        let slot = match kind {
            FailureKind::ItemGroupMissing => &mut self.item_group_missing,
            FailureKind::Item => &mut self.item,
            FailureKind::EventDate => &mut self.event_date,
            FailureKind::Form => &mut self.form,
            FailureKind::Request => &mut self.request,
            FailureKind::Transport => &mut self.transport,
            FailureKind::Parse => &mut self.parse,
            FailureKind::NonConvergence => &mut self.non_convergence,
        };
        *slot += 1;
    }

    pub fn total(&self) -> usize {
        self.item_group_missing
            + self.item
            + self.event_date
            + self.form
            + self.request
            + self.transport
            + self.parse
            + self.non_convergence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::edc_client::ResponseStatus;
    use serde_json::json;

    #[test]
    fn test_item_line_format() {
        let result = ItemResult {
            response_status: ResponseStatus::Failure,
            error_message: Some(json!("Value out of range")),
            subject: Some("101-001".to_string()),
            event_name: Some("ev_SCR".to_string()),
            form_name: Some("VS".to_string()),
            item_name: Some("SYSBP".to_string()),
            value: Some(json!("999")),
            ..ItemResult::default()
        };
        let record = FailureRecord::item(&result, false);
        assert_eq!(record.kind, FailureKind::Item);
        assert_eq!(
            record.line,
            "ITEM FAILURE - SUBJECT: 101-001, EVENT NAME: ev_SCR, FORM NAME: VS, ITEM NAME: SYSBP, VALUE: 999, ERROR: Value out of range"
        );
    }

    #[test]
    fn test_missing_fields_render_na() {
        let record = FailureRecord::event_date(&EventResult::default());
        assert_eq!(
            record.line,
            "EVENT DATE FAILURE - SUBJECT: N/A, EVENT: N/A, DATE: N/A, ERROR: N/A"
        );

        let record = FailureRecord::item(&ItemResult::default(), true);
        assert!(record.kind.is_item_group_missing());
        assert!(record.line.contains("ITEM NAME: N/A, VALUE: N/A"));
    }

    #[test]
    fn test_action_lines() {
        let record = FailureRecord::transport("101-001", "ev_SCR", "post_items", "connection reset");
        assert_eq!(
            record.line,
            "TRANSPORT FAILURE - SUBJECT: 101-001, EVENT NAME: ev_SCR, ACTION: post_items, ERROR: connection reset"
        );
        assert!(FailureRecord::parse("s", "e", "get_forms", "eof")
            .line
            .starts_with("RESPONSE PARSE FAILURE - "));
        assert!(FailureRecord::request("s", "e", "trigger_forms", "denied")
            .line
            .starts_with("REQUEST FAILURE - "));
    }

    #[test]
    fn test_non_convergence_line() {
        let record = FailureRecord::non_convergence("101-001", "eg_TRT", "ev_D1", 10);
        assert_eq!(
            record.line,
            "DISCOVERY NON-CONVERGENCE - SUBJECT: 101-001, EVENT GROUP: eg_TRT, EVENT NAME: ev_D1, POLLS: 10"
        );
    }

    #[test]
    fn test_counts() {
        let mut counts = FailureCounts::default();
        counts.record(FailureKind::Item);
        counts.record(FailureKind::Item);
        counts.record(FailureKind::NonConvergence);
        assert_eq!(counts.item, 2);
        assert_eq!(counts.non_convergence, 1);
        assert_eq!(counts.total(), 3);
    }
}
