//! Weekly publishing calendar.

use std::collections::HashSet;

use chrono::{Datelike, Duration, NaiveDate};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::StudioError;
use crate::gateway::CallOptions;
use crate::prompt::personas;
use crate::studio::Studio;
use crate::types::{MemoryKind, ScheduleTask, TaskStatus};

/// Result of one generation run.
#[derive(Debug, Clone)]
pub struct WeekPlan {
    /// Full calendar after merging.
    pub tasks: Vec<ScheduleTask>,
    /// Tasks that were new.
    pub added: usize,
    /// Generated entries that could not be read as a task.
    pub skipped: usize,
    /// The reply could not be read as a task list.
    pub malformed: bool,
}

/// Monday-to-Sunday week containing `date`.
pub fn week_of(date: NaiveDate) -> [NaiveDate; 7] {
    let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
    std::array::from_fn(|i| monday + Duration::days(i as i64))
}

/// Append generated tasks that don't already exist. Duplicates are matched
/// on (date, action) only; the same action reworded counts as new.
pub fn merge_tasks(existing: &[ScheduleTask], generated: Vec<ScheduleTask>) -> Vec<ScheduleTask> {
    let mut seen: HashSet<(NaiveDate, String)> = existing
        .iter()
        .map(|t| (t.date, t.action.clone()))
        .collect();

    let mut merged = existing.to_vec();
    for task in generated {
        let (date, action) = task.merge_key();
        if seen.insert((date, action.to_owned())) {
            merged.push(task);
        }
    }
    merged
}

pub fn tasks_on(tasks: &[ScheduleTask], date: NaiveDate) -> Vec<&ScheduleTask> {
    tasks.iter().filter(|t| t.date == date).collect()
}

/// Move a task forward. Going back is an error; staying put is a no-op.
pub fn advance(task: &mut ScheduleTask, to: TaskStatus) -> Result<(), StudioError> {
    if !task.status.can_advance_to(to) {
        return Err(StudioError::InvalidTransition { from: task.status, to });
    }
    task.status = to;
    Ok(())
}

/// Ask the model for a week of tasks starting from the week of `start` and
/// merge them into the stored calendar.
pub async fn generate_week(
    studio: &Studio,
    start: NaiveDate,
    brief: &str,
    cancel: &CancellationToken,
) -> Result<WeekPlan, StudioError> {
    let week = week_of(start);
    let out = studio
        .ask::<Vec<serde_json::Value>>(
            &personas::schedule(&week),
            &[MemoryKind::ChannelDirectory, MemoryKind::ExecutionLearning],
            brief,
            CallOptions::json(),
            cancel,
        )
        .await?;

    let malformed = out.structured.is_malformed();
    let (generated, skipped) = read_generated(out.structured.or_default());

    let existing = studio.store.read_schedule().await?;
    let before = existing.len();
    let tasks = merge_tasks(&existing, generated);
    let added = tasks.len() - before;
    if added > 0 {
        studio.store.write_schedule(&tasks).await?;
    }

    tracing::info!(added, skipped, total = tasks.len(), malformed, "week planned");
    Ok(WeekPlan { tasks, added, skipped, malformed })
}

/// Read each generated entry on its own so one bad task doesn't sink the
/// week. The model never picks ids or status: every task gets a fresh id
/// and starts pending.
fn read_generated(entries: Vec<serde_json::Value>) -> (Vec<ScheduleTask>, usize) {
    let mut tasks = Vec::with_capacity(entries.len());
    let mut skipped = 0;
    for mut entry in entries {
        if let Some(obj) = entry.as_object_mut() {
            obj.remove("id");
            obj.remove("status");
        }
        match serde_json::from_value::<ScheduleTask>(entry) {
            Ok(task) => tasks.push(task),
            Err(e) => {
                skipped += 1;
                tracing::debug!(error = %e, "skipping unreadable generated task");
            }
        }
    }
    (tasks, skipped)
}

pub async fn start_task(studio: &Studio, id: Uuid) -> Result<ScheduleTask, StudioError> {
    let mut tasks = studio.store.read_schedule().await?;
    let task = tasks.iter_mut().find(|t| t.id == id).ok_or(StudioError::TaskNotFound(id))?;
    advance(task, TaskStatus::InProgress)?;
    let updated = task.clone();
    studio.store.write_schedule(&tasks).await?;
    Ok(updated)
}

/// Mark every task on `date` complete and record what was executed.
/// Returns how many tasks changed.
pub async fn execute_day(studio: &Studio, date: NaiveDate) -> Result<usize, StudioError> {
    let mut tasks = studio.store.read_schedule().await?;
    let mut done = Vec::new();
    for task in tasks.iter_mut().filter(|t| t.date == date && t.status != TaskStatus::Complete) {
        advance(task, TaskStatus::Complete)?;
        done.push(format!("{} ({})", task.action, task.channel_name));
    }
    if done.is_empty() {
        return Ok(0);
    }
    studio.store.write_schedule(&tasks).await?;

    let line = format!("Executed {date}: {}", done.join("; "));
    if let Err(e) = studio.store.append(MemoryKind::ExecutionLearning, &line).await {
        tracing::warn!(error = %e, "failed to record executed day");
    }
    Ok(done.len())
}
