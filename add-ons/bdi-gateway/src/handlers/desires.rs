//! `/api/desires`: desire-optimization results and their freshness.

use axum::body::Bytes;
use axum::extract::State;
use bdi_core::desire_status;
use chrono::Utc;

use super::{read_history, read_latest, read_stats, write_record, ApiError, ReadQuery, Reply};
use crate::AppState;

/// GET: latest record, or `?action=history|stats|status`.
pub(crate) async fn read(State(state): State<AppState>, query: ReadQuery) -> Result<Reply, ApiError> {
    let store = &state.stores.desires;
    match query.action() {
        None => read_latest(store),
        Some("history") => read_history(store, query.limit()),
        Some("stats") => read_stats(store),
        Some("status") => {
            let latest = store.latest()?;
            let stats = store.stats()?;
            let status = desire_status(latest.as_ref(), &stats, Utc::now());
            let reply = Reply::ok(&status);
            Ok(if status.healthy {
                reply
            } else {
                reply.with_message("No desire optimization received in the last 24 hours")
            })
        }
        Some(other) => Err(ApiError::UnknownAction(other.to_string())),
    }
}

pub(crate) async fn write(State(state): State<AppState>, body: Bytes) -> Result<Reply, ApiError> {
    write_record(&state.stores.desires, &body)
}
