//! Submission: item posts and form finalization

use super::compensation::{CompensationMode, CompensationTask};
use super::{MigrationEngine, RunContext};
use crate::error::MigrationResult;
use crate::models::EventGroupUnit;
use crate::services::edc_client::{EdcApi, EventScope, FormEntry, FormItemsEntry, ItemEntry, ItemGroupEntry};
use crate::services::value_normalizer::normalize_value;
use tracing::{debug, info};

/// Result of an accepted item post
#[derive(Debug, Clone, Default)]
pub(super) struct PostOutcome {
    /// Forms that carried at least one item
    pub forms: Vec<String>,
    pub tasks: Vec<CompensationTask>,
}

/// Item payloads for `form_names` under one event
///
/// A row contributes only when its item name, item group and normalized
/// value are all non-blank. `item_group` restricts rows to one item group.
/// Forms without any contributing row are left out.
pub fn build_form_payloads(
    unit: &EventGroupUnit,
    scope: &EventScope,
    form_names: &[String],
    item_group: Option<&str>,
) -> Vec<FormItemsEntry> {
    form_names
        .iter()
        .filter_map(|form_name| {
            let items: Vec<ItemEntry> = unit
                .form_records(&scope.event_name, form_name)
                .filter_map(|record| {
                    let group = record.item_group()?;
                    if item_group.is_some_and(|wanted| wanted.trim() != group) {
                        return None;
                    }
                    let name = record.item_name()?;
                    let value = record.item_data.as_ref().and_then(normalize_value)?;
                    Some(ItemEntry {
                        itemgroup_name: group.to_string(),
                        item_name: name.to_string(),
                        value,
                    })
                })
                .collect();

            (!items.is_empty()).then(|| FormItemsEntry {
                scope: scope.clone(),
                form_name: form_name.clone(),
                items,
            })
        })
        .collect()
}

impl<C: EdcApi> MigrationEngine<C> {
    /// Post items for newly discovered forms, compensate, then submit
    pub(super) async fn submit_forms_with_items(
        &self,
        ctx: &mut RunContext,
        unit: &EventGroupUnit,
        event_name: &str,
        form_names: &[String],
    ) -> MigrationResult<()> {
        let Some(posted) = self
            .post_items(ctx, unit, event_name, form_names, None, CompensationMode::Enabled)
            .await?
        else {
            return Ok(());
        };

        self.drain_compensation(ctx, unit, event_name, posted.tasks)
            .await?;
        self.finalize_forms(ctx, unit, event_name, &posted.forms)
            .await
    }

    /// Issue one item post and classify its response
    ///
    /// Returns `None` when there was nothing to post or the post itself
    /// failed; forms are only finalized after an accepted post.
    pub(super) async fn post_items(
        &self,
        ctx: &mut RunContext,
        unit: &EventGroupUnit,
        event_name: &str,
        form_names: &[String],
        item_group: Option<&str>,
        mode: CompensationMode,
    ) -> MigrationResult<Option<PostOutcome>> {
        let scope = unit.scope(&self.study, event_name);
        let subject = unit.subject.new_id.as_str();
        let payloads = build_form_payloads(unit, &scope, form_names, item_group);
        if payloads.is_empty() {
            debug!(subject = %subject, event = %event_name, forms = ?form_names, "No item data for forms");
            return Ok(None);
        }

        if mode == CompensationMode::Enabled && self.settings.precreate_repeating_item_groups {
            self.precreate_item_groups(ctx, unit, event_name, &payloads)
                .await?;
        }

        let item_count: usize = payloads.iter().map(|p| p.items.len()).sum();
        info!(
            subject = %subject,
            event = %event_name,
            forms = payloads.len(),
            items = item_count,
            item_group = ?item_group,
            "Posting items"
        );
        let result = self
            .client
            .post_items(&ctx.token, &self.study.study_name, &payloads)
            .await;
        ctx.summary.item_posts += 1;

        let Some(response) = ctx.absorb(result, subject, event_name, "post_items")? else {
            return Ok(None);
        };
        if response.is_request_failure() {
            ctx.record_response(&response, mode, subject, event_name, "post_items");
            return Ok(None);
        }

        let tasks = ctx.record_response(&response, mode, subject, event_name, "post_items");
        Ok(Some(PostOutcome {
            forms: payloads.into_iter().map(|p| p.form_name).collect(),
            tasks,
        }))
    }

    /// Submit forms that received data
    ///
    /// A compensated form is submitted twice, once after its retry and once
    /// with the outer batch; it still counts once in `forms_submitted`.
    pub(super) async fn finalize_forms(
        &self,
        ctx: &mut RunContext,
        unit: &EventGroupUnit,
        event_name: &str,
        form_names: &[String],
    ) -> MigrationResult<()> {
        if form_names.is_empty() {
            return Ok(());
        }

        let scope = unit.scope(&self.study, event_name);
        let subject = unit.subject.new_id.as_str();
        let forms: Vec<FormEntry> = form_names
            .iter()
            .map(|form_name| FormEntry {
                scope: scope.clone(),
                form_name: form_name.clone(),
            })
            .collect();

        info!(subject = %subject, event = %event_name, forms = ?form_names, "Submitting forms");
        let result = self
            .client
            .submit_forms(&ctx.token, &self.study.study_name, &forms)
            .await;
        if let Some(response) = ctx.absorb(result, subject, event_name, "submit_forms")? {
            if !response.is_request_failure() {
                for form_name in form_names {
                    ctx.count_submitted(subject, event_name, form_name);
                }
            }
            ctx.record_response(&response, CompensationMode::Disabled, subject, event_name, "submit_forms");
        }
        Ok(())
    }

    /// Instantiate one item group; `true` when the target accepted the call
    pub(super) async fn create_item_group(
        &self,
        ctx: &mut RunContext,
        unit: &EventGroupUnit,
        event_name: &str,
        form_name: &str,
        item_group: &str,
    ) -> MigrationResult<bool> {
        let subject = unit.subject.new_id.as_str();
        let entry = ItemGroupEntry {
            scope: unit.scope(&self.study, event_name),
            form_name: form_name.to_string(),
            itemgroup_name: item_group.to_string(),
        };

        info!(subject = %subject, event = %event_name, form = %form_name, item_group = %item_group, "Creating item group");
        let result = self
            .client
            .create_item_group(&ctx.token, &self.study.study_name, &entry)
            .await;
        let Some(response) = ctx.absorb(result, subject, event_name, "create_item_group")? else {
            return Ok(false);
        };

        let accepted = !response.is_request_failure();
        ctx.record_response(&response, CompensationMode::Disabled, subject, event_name, "create_item_group");
        if accepted {
            ctx.summary.item_groups_created += 1;
        }
        Ok(accepted)
    }

    /// Create repeating item groups ahead of their first post
    async fn precreate_item_groups(
        &self,
        ctx: &mut RunContext,
        unit: &EventGroupUnit,
        event_name: &str,
        payloads: &[FormItemsEntry],
    ) -> MigrationResult<()> {
        for payload in payloads {
            let mut groups: Vec<&str> = Vec::new();
            for item in &payload.items {
                let group = item.itemgroup_name.as_str();
                if self.schedule.is_repeating_item_group(group) && !groups.contains(&group) {
                    groups.push(group);
                }
            }
            for group in groups {
                self.create_item_group(ctx, unit, event_name, &payload.form_name, group)
                    .await?;
            }
        }
        Ok(())
    }
}
