//! Target schedule description
//!
//! Flattened schedule tree rows (event group → event → form with a repeat
//! flag) plus item-group definitions. All queries preserve the row order of
//! the source document.

use edcm_common::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use tracing::info;

/// One row of the schedule tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRow {
    #[serde(alias = "Event Group Name")]
    pub event_group: String,

    #[serde(alias = "Event Name")]
    pub event_name: String,

    #[serde(default, alias = "Form Name")]
    pub form_name: Option<String>,

    /// Event repeats: its forms must be triggered explicitly
    #[serde(default, alias = "Repeats", deserialize_with = "yes_no")]
    pub repeats: bool,
}

/// Item group definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemGroupDef {
    #[serde(alias = "Item Group Name")]
    pub name: String,

    #[serde(default, alias = "IG Rep", deserialize_with = "yes_no")]
    pub repeating: bool,
}

/// Schedule description for the target study
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSchedule {
    #[serde(default)]
    pub schedule: Vec<ScheduleRow>,

    #[serde(default)]
    pub item_groups: Vec<ItemGroupDef>,
}

/// Accept `true`/`false` or spreadsheet-style `"Yes"`/`"No"`
fn yes_no<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Text(s)) => {
            let s = s.trim();
            s.eq_ignore_ascii_case("yes") || s.eq_ignore_ascii_case("y") || s.eq_ignore_ascii_case("true")
        }
        None => false,
    })
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

impl TargetSchedule {
    /// Load from TOML (`.toml`) or JSON (anything else)
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));

        let schedule: Self = if is_toml {
            toml::from_str(&content).map_err(|e| {
                Error::InvalidInput(format!("Schedule {} invalid: {}", path.display(), e))
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| {
                Error::InvalidInput(format!("Schedule {} invalid: {}", path.display(), e))
            })?
        };

        info!(
            path = %path.display(),
            rows = schedule.schedule.len(),
            event_groups = schedule.event_groups().len(),
            "Loaded target schedule"
        );
        Ok(schedule)
    }

    /// Distinct event groups
    pub fn event_groups(&self) -> Vec<String> {
        let mut groups = Vec::new();
        for row in &self.schedule {
            push_unique(&mut groups, &row.event_group);
        }
        groups
    }

    /// Distinct events of one event group
    pub fn events_for(&self, event_group: &str) -> Vec<String> {
        let mut events = Vec::new();
        for row in self.schedule.iter().filter(|r| r.event_group == event_group) {
            push_unique(&mut events, &row.event_name);
        }
        events
    }

    /// Forms to trigger explicitly for a repeating event
    pub fn trigger_forms(&self, event_group: &str, event_name: &str) -> Vec<String> {
        let mut forms = Vec::new();
        for row in self.schedule.iter().filter(|r| {
            r.repeats && r.event_group == event_group && r.event_name == event_name
        }) {
            if let Some(form) = row.form_name.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
                push_unique(&mut forms, form);
            }
        }
        forms
    }

    /// Whether the item group is defined as repeating
    pub fn is_repeating_item_group(&self, name: &str) -> bool {
        self.item_groups.iter().any(|ig| ig.repeating && ig.name == name)
    }
}
