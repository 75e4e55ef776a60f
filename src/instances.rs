use crate::db::models::{GeneratedInstance, RecurrencePattern, RecurringTaskInstance, Task};
use crate::error::{EngineError, Result};
use crate::locks::KeyedLocks;
use crate::recurrence::{self, RecurrenceState};
use crate::storage::TaskStore;
use chrono::{DateTime, Utc};
use uuid::Uuid;

fn template_pattern(template: &Task) -> Result<&RecurrencePattern> {
    match &template.recurrence_pattern {
        Some(pattern) if template.is_recurring => Ok(pattern),
        _ => Err(EngineError::NotATemplate(template.id.clone())),
    }
}

/// The concrete task for one occurrence: a copy of the template pinned to
/// `scheduled`, with no pattern and no edges.
fn instance_task(template: &Task, scheduled: &str, occurrence_number: u32) -> Task {
    Task {
        id: Uuid::new_v4().to_string(),
        due_date: Some(scheduled.to_string()),
        start_date: Some(scheduled.to_string()),
        is_recurring: false,
        recurrence_pattern: None,
        original_task_id: Some(template.id.clone()),
        occurrence_number: Some(occurrence_number),
        dependencies: Vec::new(),
        dependent_task_ids: Vec::new(),
        is_blocked: false,
        created_at: Utc::now(),
        ..template.clone()
    }
}

fn instance_rejected(template: &Task, occurrence_number: u32) -> EngineError {
    tracing::warn!(
        template_id = %template.id,
        occurrence_number,
        "Instance rejected by storage"
    );
    EngineError::PersistenceFailed(format!(
        "occurrence {} of template {}",
        occurrence_number, template.id
    ))
}

/// Turns recurrence templates into concrete task instances.
pub struct InstanceManager<'a, S: TaskStore> {
    store: &'a S,
    locks: &'a KeyedLocks,
}

impl<'a, S: TaskStore> InstanceManager<'a, S> {
    pub fn new(store: &'a S, locks: &'a KeyedLocks) -> Self {
        Self { store, locks }
    }

    /// Build occurrence `occurrence_number` of `template` on `scheduled_date`
    /// and record it.
    ///
    /// Only the instance record is persisted here; the returned
    /// `generated_task` is left to the caller. [`Self::materialize_next`]
    /// writes both in one transaction.
    pub async fn generate_task_instance(
        &self,
        template: &Task,
        scheduled_date: &str,
        occurrence_number: u32,
    ) -> Result<GeneratedInstance> {
        let pattern = template_pattern(template)?;
        let scheduled = recurrence::format_iso(recurrence::parse_iso(scheduled_date)?);
        let generated_task = instance_task(template, &scheduled, occurrence_number);

        let instance = self
            .store
            .create_recurring_task_instance(
                &template.id,
                &generated_task.id,
                occurrence_number,
                &scheduled,
            )
            .await?
            .ok_or_else(|| instance_rejected(template, occurrence_number))?;

        let next_scheduled_date = self.next_scheduled_date(pattern, &scheduled, occurrence_number)?;

        crate::log_task_operation!("generate_instance", template.id, occurrence_number);

        Ok(GeneratedInstance {
            generated_task,
            instance,
            next_scheduled_date,
        })
    }

    fn next_scheduled_date(
        &self,
        pattern: &RecurrencePattern,
        scheduled: &str,
        occurrence_number: u32,
    ) -> Result<Option<String>> {
        let from = recurrence::parse_iso(scheduled)?;
        let Some(next) = recurrence::calculate_occurrence_after(pattern, from, occurrence_number)?
        else {
            return Ok(None);
        };

        match recurrence::recurrence_state(pattern, occurrence_number, Some(&next.date))? {
            RecurrenceState::Active => Ok(Some(next.date)),
            RecurrenceState::Exhausted => Ok(None),
        }
    }

    /// Number the next instance of `template_id` would take: latest + 1, or 1.
    pub async fn get_next_occurrence_number(&self, template_id: &str) -> Result<u32> {
        let latest = self
            .store
            .get_latest_recurring_task_instance(template_id)
            .await?;
        Ok(latest.map_or(1, |instance| instance.occurrence_number + 1))
    }

    async fn materialize_locked(
        &self,
        template: &Task,
        scheduled_date: &str,
    ) -> Result<GeneratedInstance> {
        let pattern = template_pattern(template)?;
        let scheduled = recurrence::format_iso(recurrence::parse_iso(scheduled_date)?);
        let occurrence_number = self.get_next_occurrence_number(&template.id).await?;
        let task = instance_task(template, &scheduled, occurrence_number);

        let (generated_task, instance) = self
            .store
            .create_materialized_instance(&task, &template.id, occurrence_number, &scheduled)
            .await?
            .ok_or_else(|| instance_rejected(template, occurrence_number))?;

        let next_scheduled_date = self.next_scheduled_date(pattern, &scheduled, occurrence_number)?;

        crate::log_task_operation!("materialize_instance", template.id, occurrence_number);

        Ok(GeneratedInstance {
            generated_task,
            instance,
            next_scheduled_date,
        })
    }

    /// Allocate the next occurrence number and persist both the instance
    /// record and the generated task, serialized per template.
    pub async fn materialize_next(
        &self,
        template: &Task,
        scheduled_date: &str,
    ) -> Result<GeneratedInstance> {
        template_pattern(template)?;
        let _guard = self.locks.lock(&template.id).await;
        self.materialize_locked(template, scheduled_date).await
    }

    /// Generate the template's next instance if it is due at `now`.
    ///
    /// The first instance lands on the template's start date, else its due
    /// date, else `now`. Returns `None` when nothing is due or the template
    /// is exhausted.
    pub async fn materialize_if_due(
        &self,
        template: &Task,
        now: DateTime<Utc>,
    ) -> Result<Option<GeneratedInstance>> {
        let pattern = template_pattern(template)?;
        let _guard = self.locks.lock(&template.id).await;

        let latest = self
            .store
            .get_latest_recurring_task_instance(&template.id)
            .await?;
        let generated_count = latest.as_ref().map_or(0, |i| i.occurrence_number);

        let scheduled = match &latest {
            None => match template.start_date.as_deref().or(template.due_date.as_deref()) {
                Some(date) => recurrence::format_iso(recurrence::parse_iso(date)?),
                None => recurrence::format_iso(now),
            },
            Some(last) => {
                if !recurrence::should_generate_instance_at(
                    pattern,
                    Some(&last.scheduled_date),
                    now,
                )? {
                    tracing::debug!(template_id = %template.id, "No instance due");
                    return Ok(None);
                }
                let from = recurrence::parse_iso(&last.scheduled_date)?;
                match recurrence::calculate_occurrence_after(pattern, from, generated_count)? {
                    Some(next) => next.date,
                    None => return Ok(None),
                }
            },
        };

        if recurrence::recurrence_state(pattern, generated_count, Some(&scheduled))?
            == RecurrenceState::Exhausted
        {
            tracing::debug!(template_id = %template.id, generated_count, "Template exhausted");
            return Ok(None);
        }

        self.materialize_locked(template, &scheduled).await.map(Some)
    }

    pub async fn get_instances(&self, template_id: &str) -> Result<Vec<RecurringTaskInstance>> {
        self.store.get_recurring_task_instances(template_id).await
    }

    pub async fn delete_all_instances(&self, template_id: &str) -> Result<bool> {
        let _guard = self.locks.lock(template_id).await;
        self.store
            .delete_all_recurring_task_instances(template_id)
            .await
    }
}
