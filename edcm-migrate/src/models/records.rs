//! Normalized record table
//!
//! One row per (subject, event, form, item) value, produced upstream by the
//! source-to-target transformation. Field aliases accept the upstream
//! column headers (`"Event Group Name"`, `"Item Data"`, ...) as well as
//! snake_case names.

use edcm_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Strings treated as "no value" in `item_data`
const NULL_MARKERS: &[&str] = &["", "nan", "NAN", "NaN"];

/// Raw item value as it arrives from the record table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ItemValue {
    /// True for null-marker strings and non-finite numbers
    pub fn is_null(&self) -> bool {
        match self {
            ItemValue::Text(s) => NULL_MARKERS.contains(&s.trim()),
            ItemValue::Float(f) => !f.is_finite(),
            ItemValue::Bool(_) | ItemValue::Integer(_) => false,
        }
    }
}

/// One row of the record table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformedRecord {
    #[serde(alias = "Subject")]
    pub subject: String,

    #[serde(alias = "Event Group Name")]
    pub event_group: String,

    #[serde(alias = "Event Name")]
    pub event_name: String,

    #[serde(alias = "Form Name")]
    pub form_name: String,

    #[serde(default, alias = "Item Group")]
    pub item_group: Option<String>,

    #[serde(default, alias = "Item Name")]
    pub item_name: Option<String>,

    #[serde(default, alias = "Item Data")]
    pub item_data: Option<ItemValue>,

    #[serde(default, alias = "Event Date")]
    pub event_date: Option<String>,
}

impl TransformedRecord {
    /// Item data present and not a null marker
    pub fn has_item_data(&self) -> bool {
        self.item_data.as_ref().is_some_and(|v| !v.is_null())
    }

    /// Trimmed, non-blank item name
    pub fn item_name(&self) -> Option<&str> {
        non_blank(self.item_name.as_deref())
    }

    /// Trimmed, non-blank item group
    pub fn item_group(&self) -> Option<&str> {
        non_blank(self.item_group.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Deduplication key within one unit
type RecordKey = (String, String, Option<String>, String);

fn record_key(record: &TransformedRecord) -> RecordKey {
    (
        record.event_name.clone(),
        record.form_name.clone(),
        record.item_name().map(str::to_string),
        record.subject.clone(),
    )
}

/// The full record table for a run
#[derive(Debug, Clone, Default)]
pub struct RecordTable {
    records: Vec<TransformedRecord>,
}

impl RecordTable {
    pub fn new(records: Vec<TransformedRecord>) -> Self {
        Self { records }
    }

    /// Load a JSON array of records
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let records: Vec<TransformedRecord> = serde_json::from_str(&content).map_err(|e| {
            Error::InvalidInput(format!("Record table {} invalid: {}", path.display(), e))
        })?;

        info!(path = %path.display(), rows = records.len(), "Loaded record table");
        Ok(Self::new(records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rows for one (event group, source subject) unit
    ///
    /// Keeps rows carrying item data, then collapses rows sharing
    /// (event, form, item, subject) to the first one in table order.
    /// A dropped duplicate with a different value is reported as a warning.
    pub fn unit_records(&self, event_group: &str, subject: &str) -> Vec<TransformedRecord> {
        let mut kept: Vec<TransformedRecord> = Vec::new();
        let mut index: HashMap<RecordKey, usize> = HashMap::new();

        for record in self
            .records
            .iter()
            .filter(|r| r.event_group == event_group && r.subject == subject)
            .filter(|r| r.has_item_data())
        {
            let key = record_key(record);
            match index.get(&key) {
                Some(&position) => {
                    let first = &kept[position];
                    if first.item_data != record.item_data {
                        warn!(
                            subject = %subject,
                            event = %record.event_name,
                            form = %record.form_name,
                            item = %record.item_name().unwrap_or("N/A"),
                            kept = ?first.item_data,
                            dropped = ?record.item_data,
                            "Conflicting duplicate record dropped, keeping first occurrence"
                        );
                    }
                }
                None => {
                    index.insert(key, kept.len());
                    kept.push(record.clone());
                }
            }
        }

        kept
    }
}
