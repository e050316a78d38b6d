//! Per-unit processing state
//!
//! A unit is one (event group, mapped subject) pair. It lives only while the
//! engine works on it.
//!
//! Activating → Discovering ⇄ Submitting → Done

use super::records::TransformedRecord;
use super::subject_map::SubjectMapping;
use crate::config::StudyContext;
use crate::services::edc_client::EventScope;
use chrono::NaiveDate;
use edcm_common::time::parse_day_first_date;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unit workflow state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UnitState {
    /// Dating events and triggering repeat forms
    Activating,
    /// Polling the target form set
    Discovering,
    /// Posting items for newly discovered forms
    Submitting,
    Done,
}

/// One (event group, subject) unit of work
#[derive(Debug, Clone)]
pub struct EventGroupUnit {
    pub event_group: String,
    pub subject: SubjectMapping,
    /// Deduplicated rows with item data for this unit
    pub records: Vec<TransformedRecord>,
    pub state: UnitState,
}

impl EventGroupUnit {
    pub fn new(event_group: impl Into<String>, subject: SubjectMapping, records: Vec<TransformedRecord>) -> Self {
        Self {
            event_group: event_group.into(),
            subject,
            records,
            state: UnitState::Activating,
        }
    }

    /// Transition to new state
    pub fn transition_to(&mut self, new_state: UnitState) {
        if self.state != new_state {
            tracing::debug!(
                subject = %self.subject.new_id,
                event_group = %self.event_group,
                from = ?self.state,
                to = ?new_state,
                "Unit state transition"
            );
        }
        self.state = new_state;
    }

    pub fn is_done(&self) -> bool {
        self.state == UnitState::Done
    }

    /// Target-side location of `event_name` for this unit's subject
    pub fn scope(&self, study: &StudyContext, event_name: &str) -> EventScope {
        EventScope {
            study_country: study.study_country.clone(),
            site: study.site.clone(),
            subject: self.subject.new_id.clone(),
            eventgroup_name: self.event_group.clone(),
            event_name: event_name.to_string(),
        }
    }

    /// Rows belonging to one event
    pub fn event_records<'a>(&'a self, event_name: &'a str) -> impl Iterator<Item = &'a TransformedRecord> + 'a {
        self.records.iter().filter(move |r| r.event_name == event_name)
    }

    /// Rows belonging to one form of one event
    pub fn form_records<'a>(
        &'a self,
        event_name: &'a str,
        form_name: &'a str,
    ) -> impl Iterator<Item = &'a TransformedRecord> + 'a {
        self.event_records(event_name)
            .filter(move |r| r.form_name == form_name)
    }

    /// Most frequent parseable event date for `event_name`
    ///
    /// Dates are read day-first. Ties go to the earliest date; `None` when
    /// no row carries a parseable date.
    pub fn event_date(&self, event_name: &str) -> Option<NaiveDate> {
        let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
        for date in self
            .event_records(event_name)
            .filter_map(|r| r.event_date.as_deref())
            .filter_map(parse_day_first_date)
        {
            *counts.entry(date).or_default() += 1;
        }

        // BTreeMap iterates ascending, so the first maximum is the earliest
        let mut best: Option<(NaiveDate, usize)> = None;
        for (date, count) in counts {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((date, count));
            }
        }
        best.map(|(date, _)| date)
    }
}
