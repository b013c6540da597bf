//! Read-time projections: health classification, schedule progress, active plans and
//! desire freshness. Everything here is a pure function of its inputs and `now`.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::record::{parse_timestamp, Record};
use crate::store::StatsSnapshot;

const MS_PER_HOUR: i64 = 3_600_000;

/// A desire snapshot older than this is reported unhealthy.
pub const DESIRE_FRESHNESS_MS: i64 = 86_400_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLabel {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HealthSummary {
    pub overall_health: f64,
    pub health_status: HealthLabel,
}

/// Score for a single component status string.
pub fn component_score(status: &str) -> f64 {
    match status {
        "healthy" | "active" => 1.0,
        "degraded" | "warning" => 0.5,
        _ => 0.0,
    }
}

/// Mean component score and its label. No components scores 0 (`unhealthy`).
pub fn classify_health<'a, I>(statuses: I) -> HealthSummary
where
    I: IntoIterator<Item = &'a str>,
{
    let (sum, count) = statuses
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), s| (sum + component_score(s), count + 1));
    let overall_health = if count == 0 { 0.0 } else { sum / count as f64 };
    let health_status = if overall_health >= 0.8 {
        HealthLabel::Healthy
    } else if overall_health >= 0.5 {
        HealthLabel::Degraded
    } else {
        HealthLabel::Unhealthy
    };
    HealthSummary {
        overall_health,
        health_status,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Pending,
    InProgress,
    Completed,
}

impl ScheduleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "pending",
            ScheduleStatus::InProgress => "in_progress",
            ScheduleStatus::Completed => "completed",
        }
    }
}

pub fn schedule_status(start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> ScheduleStatus {
    if now < start {
        ScheduleStatus::Pending
    } else if now <= end {
        ScheduleStatus::InProgress
    } else {
        ScheduleStatus::Completed
    }
}

/// Whole hours until `start`, rounded up; 0 once started.
pub fn hours_until_start(start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let ms = (start - now).num_milliseconds();
    if ms <= 0 {
        0
    } else {
        (ms + MS_PER_HOUR - 1) / MS_PER_HOUR
    }
}

/// 0 before start, 100 at or after end, linear in between.
pub fn progress_percentage(start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> u8 {
    if now < start {
        return 0;
    }
    if now >= end {
        return 100;
    }
    let elapsed = (now - start).num_milliseconds() as f64;
    let duration = (end - start).num_milliseconds() as f64;
    (100.0 * elapsed / duration).round().clamp(0.0, 100.0) as u8
}

/// Copy of a schedule item with `status`, `time_until_start` and `progress_percentage`
/// added. Items without parseable `start_time`/`end_time` get status `unknown`.
pub fn enrich_schedule_item(item: &Value, now: DateTime<Utc>) -> (Value, Option<ScheduleStatus>) {
    let mut enriched = match item {
        Value::Object(map) => map.clone(),
        other => {
            let mut map = serde_json::Map::new();
            map.insert("item".to_string(), other.clone());
            map
        }
    };
    let start = enriched.get("start_time").and_then(parse_timestamp);
    let end = enriched.get("end_time").and_then(parse_timestamp);
    let status = match (start, end) {
        (Some(start), Some(end)) => {
            let status = schedule_status(start, end, now);
            enriched.insert("status".to_string(), status.as_str().into());
            enriched.insert("time_until_start".to_string(), hours_until_start(start, now).into());
            enriched.insert("progress_percentage".to_string(), progress_percentage(start, end, now).into());
            Some(status)
        }
        _ => {
            enriched.insert("status".to_string(), "unknown".into());
            None
        }
    };
    (Value::Object(enriched), status)
}

/// Enriched schedule of one plan record.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleView {
    pub plan_id: String,
    pub schedule: Vec<Value>,
    pub total_items: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
}

pub fn schedule_view(record: &Record, now: DateTime<Utc>) -> ScheduleView {
    let items = record
        .get(&["plan", "schedule"])
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let mut view = ScheduleView {
        plan_id: record.id.clone(),
        schedule: Vec::with_capacity(items.len()),
        total_items: items.len(),
        pending: 0,
        in_progress: 0,
        completed: 0,
    };
    for item in items {
        let (enriched, status) = enrich_schedule_item(item, now);
        match status {
            Some(ScheduleStatus::Pending) => view.pending += 1,
            Some(ScheduleStatus::InProgress) => view.in_progress += 1,
            Some(ScheduleStatus::Completed) => view.completed += 1,
            None => {}
        }
        view.schedule.push(enriched);
    }
    view
}

/// `plan.estimated_completion` when parseable, else the latest schedule `end_time`,
/// else `timestamp + plan.metrics.total_duration_hours`.
pub fn plan_completion(record: &Record) -> Option<DateTime<Utc>> {
    if let Some(at) = record.get(&["plan", "estimated_completion"]).and_then(parse_timestamp) {
        return Some(at);
    }
    let scheduled_end = record
        .get(&["plan", "schedule"])
        .and_then(Value::as_array)
        .and_then(|items| {
            items
                .iter()
                .filter_map(|item| item.get("end_time").and_then(parse_timestamp))
                .max()
        });
    scheduled_end.or_else(|| duration_completion(record))
}

fn duration_completion(record: &Record) -> Option<DateTime<Utc>> {
    let start = record.get(&["timestamp"]).and_then(parse_timestamp)?;
    let hours = record
        .get(&["plan", "metrics", "total_duration_hours"])
        .and_then(Value::as_f64)
        .filter(|h| h.is_finite() && *h >= 0.0)?;
    let ms = (hours * MS_PER_HOUR as f64).round();
    if ms > i64::MAX as f64 {
        return None;
    }
    start.checked_add_signed(Duration::milliseconds(ms as i64))
}

/// A plan is active while its completion lies ahead and it is not marked completed.
pub fn is_active_plan(record: &Record, now: DateTime<Utc>) -> bool {
    let status = record
        .str_at(&["status"])
        .or_else(|| record.str_at(&["plan", "status"]));
    if status == Some("completed") {
        return false;
    }
    plan_completion(record).is_some_and(|at| at > now)
}

pub fn active_plans(records: Vec<Record>, now: DateTime<Utc>) -> Vec<Record> {
    records
        .into_iter()
        .filter(|record| is_active_plan(record, now))
        .collect()
}

/// True only when a latest record exists and was received within the last 24 hours.
pub fn desire_healthy(latest: Option<&Record>, now: DateTime<Utc>) -> bool {
    latest.is_some_and(|record| now - record.received_at <= Duration::milliseconds(DESIRE_FRESHNESS_MS))
}

/// Health projection served by the desires endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct DesireStatus {
    pub healthy: bool,
    pub last_optimization: Option<DateTime<Utc>>,
    pub latest_optimization_type: Option<String>,
    pub total_optimizations: u64,
}

pub fn desire_status(latest: Option<&Record>, stats: &StatsSnapshot, now: DateTime<Utc>) -> DesireStatus {
    DesireStatus {
        healthy: desire_healthy(latest, now),
        last_optimization: latest.map(|record| record.received_at),
        latest_optimization_type: latest
            .and_then(|record| record.str_at(&["optimization_type"]))
            .map(str::to_string),
        total_optimizations: stats.total,
    }
}
