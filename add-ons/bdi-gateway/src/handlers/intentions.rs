//! `/api/intentions`: scheduled plans, with active-plan and schedule-progress views.

use axum::body::Bytes;
use axum::extract::State;
use bdi_core::{active_plans, schedule_view, Record};
use chrono::Utc;
use serde::Serialize;

use super::{read_history, read_latest, read_stats, write_record, ApiError, ReadQuery, Reply};
use crate::AppState;

#[derive(Serialize)]
struct ActivePlans {
    active_plans: Vec<Record>,
    count: usize,
}

/// GET: latest record, or `?action=history|stats|active|schedule`.
pub(crate) async fn read(State(state): State<AppState>, query: ReadQuery) -> Result<Reply, ApiError> {
    let store = &state.stores.intentions;
    let now = Utc::now();
    match query.action() {
        None => read_latest(store),
        Some("history") => read_history(store, query.limit()),
        Some("stats") => read_stats(store),
        Some("active") => {
            let plans = active_plans(store.records()?, now);
            Ok(Reply::ok(ActivePlans {
                count: plans.len(),
                active_plans: plans,
            }))
        }
        Some("schedule") => Ok(match store.latest()? {
            Some(record) => Reply::ok(schedule_view(&record, now)),
            None => Reply::ok(serde_json::Value::Null).with_message("No intention data available yet"),
        }),
        Some(other) => Err(ApiError::UnknownAction(other.to_string())),
    }
}

pub(crate) async fn write(State(state): State<AppState>, body: Bytes) -> Result<Reply, ApiError> {
    write_record(&state.stores.intentions, &body)
}
