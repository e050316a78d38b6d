//! Test Helper Utilities
//!
//! Shared builders for edcm-migrate integration tests

#![allow(dead_code)]

pub mod fake_edc;

pub use fake_edc::{Call, FakeEdc};

use edcm_migrate::config::{EngineSettings, StudyContext, TargetConfig};
use edcm_migrate::models::{
    ItemValue, RecordTable, SubjectMap, TargetSchedule, TransformedRecord,
};
use edcm_migrate::services::edc_client::{ActionResponse, EdcError};
use edcm_migrate::{migrate_with, MigrationOutcome, MigrationRequest, MigrationResult};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const EVENT_GROUP: &str = "eg_TRT";
pub const EVENT: &str = "ev_D1";

/// Complete target settings
pub fn full_target() -> TargetConfig {
    TargetConfig {
        host: Some("acme.veevavault.com".to_string()),
        api_version: Some("v23.2".to_string()),
        username: Some("migrator".to_string()),
        password: Some("secret".to_string()),
    }
}

/// Engine settings with no delay between polls
pub fn fast_settings() -> EngineSettings {
    EngineSettings {
        poll_backoff: Duration::ZERO,
        poll_backoff_max: Duration::ZERO,
        ..EngineSettings::default()
    }
}

/// Row for subject S1 under `EVENT_GROUP`/`EVENT` with a parseable date
pub fn record(form: &str, item_group: &str, item: &str, value: ItemValue) -> TransformedRecord {
    TransformedRecord {
        subject: "S1".to_string(),
        event_group: EVENT_GROUP.to_string(),
        event_name: EVENT.to_string(),
        form_name: form.to_string(),
        item_group: Some(item_group.to_string()),
        item_name: Some(item.to_string()),
        item_data: Some(value),
        event_date: Some("02-01-2024".to_string()),
    }
}

pub fn text(value: &str) -> ItemValue {
    ItemValue::Text(value.to_string())
}

/// Schedule with one event; `repeat_forms` are flagged as repeating rows
pub fn schedule(forms: &[&str], repeat_forms: &[&str]) -> TargetSchedule {
    let mut rows: Vec<Value> = forms
        .iter()
        .map(|form| {
            serde_json::json!({
                "event_group": EVENT_GROUP,
                "event_name": EVENT,
                "form_name": form,
            })
        })
        .collect();
    rows.extend(repeat_forms.iter().map(|form| {
        serde_json::json!({
            "event_group": EVENT_GROUP,
            "event_name": EVENT,
            "form_name": form,
            "repeats": "Yes",
        })
    }));
    serde_json::from_value(serde_json::json!({ "schedule": rows })).unwrap()
}

/// Request mapping S1 to 101-001, logging into `output_dir`
pub fn request(
    output_dir: &Path,
    records: Vec<TransformedRecord>,
    schedule: TargetSchedule,
) -> MigrationRequest {
    MigrationRequest {
        target: full_target(),
        study: StudyContext {
            study_name: "STUDY-1".to_string(),
            study_country: "United States".to_string(),
            site: "101".to_string(),
        },
        records: RecordTable::new(records),
        schedule,
        subjects: SubjectMap::parse("S1:101-001").unwrap(),
        settings: fast_settings(),
        output_dir: output_dir.to_path_buf(),
    }
}

/// Run `request` against `fake`
pub async fn run(fake: &FakeEdc, request: MigrationRequest) -> MigrationResult<MigrationOutcome> {
    let client = fake.clone();
    migrate_with(request, CancellationToken::new(), move |_, _| Ok::<_, EdcError>(client)).await
}

pub fn action_response(body: Value) -> ActionResponse {
    serde_json::from_value(body).unwrap()
}

/// Item-level FAILURE entry for subject 101-001 under `EVENT`
pub fn item_failure(form: &str, item_group: &str, item: &str, message: &str) -> Value {
    serde_json::json!({
        "responseStatus": "FAILURE",
        "errorMessage": message,
        "subject": "101-001",
        "eventgroup_name": EVENT_GROUP,
        "event_name": EVENT,
        "form_name": form,
        "itemgroup_name": item_group,
        "item_name": item,
        "value": "x"
    })
}

pub fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}
