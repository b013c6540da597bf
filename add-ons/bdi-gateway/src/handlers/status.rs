//! `/api/status`: component health, system metrics and the GitHub Actions bridge.

use axum::body::Bytes;
use axum::extract::State;
use bdi_core::{BridgeOutcome, ComponentAck, StatusAck, StatusUpdate, GITHUB_COMPONENT};
use chrono::Utc;
use serde_json::json;

use super::{parse_body, ApiError, ReadQuery, Reply};
use crate::AppState;

/// GET: full status with computed health, or `?action=health|metrics|github`.
pub(crate) async fn read(State(state): State<AppState>, query: ReadQuery) -> Result<Reply, ApiError> {
    let status = &state.stores.status;
    let now = Utc::now();
    match query.action() {
        None => Ok(Reply::ok(status.overview(now)?)),
        Some("health") => Ok(Reply::ok(json!({
            "status": "ok",
            "service": state.config.app_name,
            "uptime_seconds": status.uptime_seconds(now),
        }))),
        Some("metrics") => Ok(Reply::ok(status.metrics_view()?)),
        Some("github") => Ok(match state.bridge.refresh(status).await {
            BridgeOutcome::Updated(component) => Reply::ok(ComponentAck {
                component: GITHUB_COMPONENT.to_string(),
                state: component,
            })
            .with_message("GitHub Actions status refreshed"),
            BridgeOutcome::Failed { error, component } => Reply::failed(
                ComponentAck {
                    component: GITHUB_COMPONENT.to_string(),
                    state: component,
                },
                format!("GitHub Actions status unavailable: {}", error),
            ),
        }),
        Some(other) => Err(ApiError::UnknownAction(other.to_string())),
    }
}

/// POST: `{component, status, ...}` updates one component; `{metrics}` merges metrics.
pub(crate) async fn write(State(state): State<AppState>, body: Bytes) -> Result<Reply, ApiError> {
    let update = parse_body(&body).and_then(StatusUpdate::from_payload).map_err(|e| {
        tracing::warn!(target: "bdi::status", error = %e, "Rejected status update");
        e
    })?;
    let ack = state.stores.status.apply(update, Utc::now())?;
    let message = match &ack {
        StatusAck::Component(ack) => {
            tracing::info!(
                target: "bdi::status",
                component = %ack.component,
                status = ack.state.status.as_str(),
                "Component status updated"
            );
            format!("Component '{}' updated", ack.component)
        }
        StatusAck::Metrics { metrics } => {
            tracing::info!(target: "bdi::status", keys = metrics.len(), "System metrics merged");
            "Metrics updated".to_string()
        }
    };
    Ok(Reply::created(&ack).with_message(message))
}
