//! `/api/beliefs`: processed belief states.

use axum::body::Bytes;
use axum::extract::State;

use super::{read_history, read_latest, read_stats, write_record, ApiError, ReadQuery, Reply};
use crate::AppState;

/// GET: latest record, or `?action=history|stats`.
pub(crate) async fn read(State(state): State<AppState>, query: ReadQuery) -> Result<Reply, ApiError> {
    let store = &state.stores.beliefs;
    match query.action() {
        None => read_latest(store),
        Some("history") => read_history(store, query.limit()),
        Some("stats") => read_stats(store),
        Some(other) => Err(ApiError::UnknownAction(other.to_string())),
    }
}

pub(crate) async fn write(State(state): State<AppState>, body: Bytes) -> Result<Reply, ApiError> {
    write_record(&state.stores.beliefs, &body)
}
