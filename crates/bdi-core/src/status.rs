//! Live component health for the status domain.
//!
//! Unlike the record domains this store keeps no history: it tracks the last reported
//! state of each named component plus a free-form system metrics object.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::derived::{classify_health, HealthSummary};
use crate::error::{StoreError, ValidationError};

/// Fields of a component update that are not copied into its extras. Extras are
/// flattened next to the server-owned `status` and `last_seen`, so callers cannot set those.
const COMPONENT_FIELDS: [&str; 4] = ["component", "status", "timestamp", "last_seen"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    Healthy,
    Active,
    Degraded,
    Warning,
    Error,
    Unknown,
}

impl ComponentStatus {
    /// Case-insensitive; unrecognized labels map to `Unknown`.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "healthy" => Self::Healthy,
            "active" => Self::Active,
            "degraded" => Self::Degraded,
            "warning" => Self::Warning,
            "error" => Self::Error,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Active => "active",
            Self::Degraded => "degraded",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

/// Last reported state of one component.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentState {
    pub status: ComponentStatus,
    pub last_seen: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A validated status write.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    Component {
        name: String,
        status: ComponentStatus,
        extra: Map<String, Value>,
    },
    Metrics(Map<String, Value>),
}

impl StatusUpdate {
    /// `{component, status, ...extra}` updates a component; `{metrics: {...}}` merges
    /// system metrics.
    pub fn from_payload(payload: Value) -> Result<Self, ValidationError> {
        let Value::Object(mut map) = payload else {
            return Err(ValidationError::NotAnObject);
        };

        let component = map
            .get("component")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        if let Some(name) = component {
            let status = map
                .get("status")
                .and_then(Value::as_str)
                .map(ComponentStatus::parse)
                .ok_or_else(|| ValidationError::MissingField("status".to_string()))?;
            if let Some(reported) = map.get("timestamp").cloned().filter(|v| !v.is_null()) {
                map.insert("reported_at".to_string(), reported);
            }
            for key in COMPONENT_FIELDS {
                map.remove(key);
            }
            return Ok(StatusUpdate::Component { name, status, extra: map });
        }

        match map.remove("metrics") {
            Some(Value::Object(metrics)) => Ok(StatusUpdate::Metrics(metrics)),
            _ => Err(ValidationError::EmptyStatusUpdate),
        }
    }
}

/// Component name plus its new state.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentAck {
    pub component: String,
    #[serde(flatten)]
    pub state: ComponentState,
}

/// What a status write changed.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StatusAck {
    Component(ComponentAck),
    Metrics { metrics: Map<String, Value> },
}

/// Full status view with computed health.
#[derive(Debug, Clone, Serialize)]
pub struct StatusOverview {
    pub components: BTreeMap<String, ComponentState>,
    pub metrics: Map<String, Value>,
    #[serde(flatten)]
    pub health: HealthSummary,
    pub component_count: usize,
    pub updates_received: u64,
    pub uptime_seconds: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsView {
    pub metrics: Map<String, Value>,
    pub updates_received: u64,
    pub component_count: usize,
}

pub struct StatusStore {
    components: DashMap<String, ComponentState>,
    metrics: RwLock<Map<String, Value>>,
    updates: AtomicU64,
    started_at: DateTime<Utc>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::started_at(Utc::now())
    }

    pub fn started_at(started_at: DateTime<Utc>) -> Self {
        Self {
            components: DashMap::new(),
            metrics: RwLock::new(Map::new()),
            updates: AtomicU64::new(0),
            started_at,
        }
    }

    /// Applies a validated write and counts it.
    pub fn apply(&self, update: StatusUpdate, now: DateTime<Utc>) -> Result<StatusAck, StoreError> {
        let ack = match update {
            StatusUpdate::Component { name, status, extra } => {
                let state = self.set_component(&name, status, extra, now);
                StatusAck::Component(ComponentAck { component: name, state })
            }
            StatusUpdate::Metrics(incoming) => {
                let mut metrics = self.metrics.write().map_err(|_| StoreError::Poisoned("status"))?;
                metrics.extend(incoming);
                StatusAck::Metrics {
                    metrics: metrics.clone(),
                }
            }
        };
        self.updates.fetch_add(1, Ordering::Relaxed);
        Ok(ack)
    }

    /// Replaces a component's state; extras from earlier reports are not kept.
    pub fn set_component(
        &self,
        name: &str,
        status: ComponentStatus,
        extra: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> ComponentState {
        let state = ComponentState {
            status,
            last_seen: now,
            extra,
        };
        self.components.insert(name.to_string(), state.clone());
        tracing::debug!(target: "bdi::status", component = name, status = status.as_str(), "Component updated");
        state
    }

    pub fn component(&self, name: &str) -> Option<ComponentState> {
        self.components.get(name).map(|entry| entry.value().clone())
    }

    /// Snapshot of all components ordered by name.
    pub fn components(&self) -> BTreeMap<String, ComponentState> {
        self.components
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn metrics(&self) -> Result<Map<String, Value>, StoreError> {
        self.metrics
            .read()
            .map(|m| m.clone())
            .map_err(|_| StoreError::Poisoned("status"))
    }

    pub fn updates_received(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.started_at).num_seconds().max(0)
    }

    pub fn overview(&self, now: DateTime<Utc>) -> Result<StatusOverview, StoreError> {
        let components = self.components();
        let health = classify_health(components.values().map(|c| c.status.as_str()));
        Ok(StatusOverview {
            component_count: components.len(),
            components,
            metrics: self.metrics()?,
            health,
            updates_received: self.updates_received(),
            uptime_seconds: self.uptime_seconds(now),
        })
    }

    pub fn metrics_view(&self) -> Result<MetricsView, StoreError> {
        Ok(MetricsView {
            metrics: self.metrics()?,
            updates_received: self.updates_received(),
            component_count: self.components.len(),
        })
    }
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derived::HealthLabel;
    use serde_json::json;

    fn apply(store: &StatusStore, payload: Value) -> StatusAck {
        let update = StatusUpdate::from_payload(payload).unwrap();
        store.apply(update, Utc::now()).unwrap()
    }

    #[test]
    fn component_update_keeps_extras_and_drops_envelope_fields() {
        let update = StatusUpdate::from_payload(json!({
            "component": "termux_agent",
            "status": "Active",
            "timestamp": "2026-05-10T12:00:00",
            "metrics": { "beliefs": 12 }
        }))
        .unwrap();
        let StatusUpdate::Component { name, status, extra } = update else {
            panic!("expected component update");
        };
        assert_eq!(name, "termux_agent");
        assert_eq!(status, ComponentStatus::Active);
        assert_eq!(extra["metrics"]["beliefs"], 12);
        assert_eq!(extra["reported_at"], "2026-05-10T12:00:00");
        assert!(!extra.contains_key("component"));
        assert!(!extra.contains_key("status"));
        assert!(!extra.contains_key("timestamp"));
    }

    #[test]
    fn caller_cannot_override_last_seen() {
        let store = StatusStore::new();
        let before = Utc::now();
        apply(
            &store,
            json!({ "component": "x", "status": "healthy", "last_seen": "1999-01-01", "region": "eu" }),
        );
        let state = store.component("x").unwrap();
        assert!(state.last_seen >= before);
        assert!(!state.extra.contains_key("last_seen"));
        assert_eq!(state.extra["region"], "eu");

        let value = serde_json::to_value(&state).unwrap();
        assert_ne!(value["last_seen"], "1999-01-01");
        assert_eq!(value["status"], "healthy");
    }

    #[test]
    fn invalid_status_payloads_are_rejected() {
        assert_eq!(StatusUpdate::from_payload(json!(null)), Err(ValidationError::NotAnObject));
        assert_eq!(
            StatusUpdate::from_payload(json!({ "component": "api" })),
            Err(ValidationError::MissingField("status".to_string()))
        );
        assert_eq!(StatusUpdate::from_payload(json!({})), Err(ValidationError::EmptyStatusUpdate));
        assert_eq!(
            StatusUpdate::from_payload(json!({ "metrics": 5 })),
            Err(ValidationError::EmptyStatusUpdate)
        );
    }

    #[test]
    fn unrecognized_status_labels_are_unknown() {
        assert_eq!(ComponentStatus::parse("HEALTHY"), ComponentStatus::Healthy);
        assert_eq!(ComponentStatus::parse("on fire"), ComponentStatus::Unknown);
    }

    #[test]
    fn overview_computes_health_over_components() {
        let store = StatusStore::new();
        let empty = store.overview(Utc::now()).unwrap();
        assert_eq!(empty.health.health_status, HealthLabel::Unhealthy);
        assert_eq!(empty.component_count, 0);

        apply(&store, json!({ "component": "a", "status": "healthy" }));
        apply(&store, json!({ "component": "b", "status": "degraded" }));
        apply(&store, json!({ "component": "c", "status": "unknown" }));
        let overview = store.overview(Utc::now()).unwrap();
        assert_eq!(overview.component_count, 3);
        assert!((overview.health.overall_health - 0.5).abs() < 1e-12);
        assert_eq!(overview.health.health_status, HealthLabel::Degraded);
        assert_eq!(overview.updates_received, 3);

        let value = serde_json::to_value(&overview).unwrap();
        assert_eq!(value["health_status"], "degraded");
        assert_eq!(value["components"]["b"]["status"], "degraded");
    }

    #[test]
    fn metrics_merge_shallowly() {
        let store = StatusStore::new();
        apply(&store, json!({ "metrics": { "cpu": 0.4, "mem": 0.2 } }));
        let ack = apply(&store, json!({ "metrics": { "cpu": 0.9, "disk": 0.1 } }));
        let StatusAck::Metrics { metrics } = ack else {
            panic!("expected metrics ack");
        };
        assert_eq!(metrics["cpu"], 0.9);
        assert_eq!(metrics["mem"], 0.2);
        assert_eq!(metrics["disk"], 0.1);
        assert_eq!(store.metrics_view().unwrap().updates_received, 2);
    }

    #[test]
    fn repeated_reports_replace_component_state() {
        let store = StatusStore::new();
        apply(&store, json!({ "component": "api", "status": "error", "detail": "boom" }));
        apply(&store, json!({ "component": "api", "status": "healthy" }));
        let state = store.component("api").unwrap();
        assert_eq!(state.status, ComponentStatus::Healthy);
        assert!(!state.extra.contains_key("detail"));
        assert_eq!(store.components().len(), 1);
    }
}
