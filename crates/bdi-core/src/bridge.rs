//! Read-through integration with GitHub Actions: samples the most recent workflow runs
//! and folds an aggregate status into the `github_actions` status component.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::error::BridgeError;
use crate::shared::CoreConfig;
use crate::status::{ComponentState, ComponentStatus, StatusStore};

/// Status component written by the bridge.
pub const GITHUB_COMPONENT: &str = "github_actions";
/// Number of most recent runs sampled.
pub const WORKFLOW_SAMPLE: usize = 5;
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Minimum share of successful runs for a `healthy` verdict.
pub const HEALTHY_SUCCESS_RATIO: f64 = 0.6;

const USER_AGENT: &str = concat!("bdi-gateway/", env!("CARGO_PKG_VERSION"));

/// Subset of a GitHub workflow run kept in run summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub head_branch: Option<String>,
}

#[derive(Deserialize)]
struct WorkflowRunsResponse {
    workflow_runs: Vec<WorkflowRun>,
}

/// Source of recent workflow runs, newest first.
#[async_trait::async_trait]
pub trait WorkflowRunSource: Send + Sync {
    async fn recent_runs(&self, limit: usize) -> Result<Vec<WorkflowRun>, BridgeError>;
}

/// GitHub REST client for `GET /repos/{owner}/{repo}/actions/runs`.
pub struct GithubActionsClient {
    http: reqwest::Client,
    api_base: String,
    repository: Option<String>,
    token: Option<String>,
}

impl GithubActionsClient {
    pub fn from_config(config: &CoreConfig) -> Result<Self, BridgeError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            api_base: config.github_api_base.trim_end_matches('/').to_string(),
            repository: config.repository().map(str::to_string),
            token: config.github_token.clone().filter(|t| !t.trim().is_empty()),
        })
    }
}

#[async_trait::async_trait]
impl WorkflowRunSource for GithubActionsClient {
    async fn recent_runs(&self, limit: usize) -> Result<Vec<WorkflowRun>, BridgeError> {
        let repository = self.repository.as_deref().ok_or(BridgeError::NotConfigured)?;
        let url = format!("{}/repos/{}/actions/runs?per_page={}", self.api_base, repository, limit);

        let mut request = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Status(status.as_u16()));
        }
        let body: WorkflowRunsResponse = response.json().await?;
        Ok(body.workflow_runs.into_iter().take(limit).collect())
    }
}

/// Aggregate verdict over a sample of runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowSummary {
    pub status: ComponentStatus,
    pub success_rate: f64,
    pub last_run: Option<String>,
    pub runs: Vec<WorkflowRun>,
}

/// `healthy` when at least 60% of the sampled runs succeeded, `unknown` when there are none.
pub fn summarize_runs(runs: Vec<WorkflowRun>) -> WorkflowSummary {
    let runs: Vec<WorkflowRun> = runs.into_iter().take(WORKFLOW_SAMPLE).collect();
    if runs.is_empty() {
        return WorkflowSummary {
            status: ComponentStatus::Unknown,
            success_rate: 0.0,
            last_run: None,
            runs,
        };
    }
    let successes = runs
        .iter()
        .filter(|run| run.conclusion.as_deref() == Some("success"))
        .count();
    let success_rate = successes as f64 / runs.len() as f64;
    let status = if success_rate >= HEALTHY_SUCCESS_RATIO {
        ComponentStatus::Healthy
    } else {
        ComponentStatus::Degraded
    };
    WorkflowSummary {
        status,
        success_rate,
        last_run: runs[0].created_at.clone(),
        runs,
    }
}

/// Result of one bridge refresh.
#[derive(Debug, Clone)]
pub enum BridgeOutcome {
    Updated(ComponentState),
    /// The component was marked `error`; `error` describes the failure.
    Failed { error: String, component: ComponentState },
}

/// Pulls workflow status on demand and records it in the status store.
pub struct ExternalStatusBridge {
    source: Arc<dyn WorkflowRunSource>,
}

impl ExternalStatusBridge {
    pub fn new(source: Arc<dyn WorkflowRunSource>) -> Self {
        Self { source }
    }

    /// Fetches runs without holding any store lock, then folds the result into the
    /// `github_actions` component. Never fails: errors mark the component `error`.
    pub async fn refresh(&self, status: &StatusStore) -> BridgeOutcome {
        match self.source.recent_runs(WORKFLOW_SAMPLE).await {
            Ok(runs) => {
                let summary = summarize_runs(runs);
                tracing::info!(
                    target: "bdi::bridge",
                    status = summary.status.as_str(),
                    sampled = summary.runs.len(),
                    success_rate = summary.success_rate,
                    "Workflow status refreshed"
                );
                let mut extra = Map::new();
                extra.insert("success_rate".to_string(), summary.success_rate.into());
                extra.insert("last_run".to_string(), summary.last_run.clone().map_or(Value::Null, Value::from));
                extra.insert(
                    "recent_runs".to_string(),
                    serde_json::to_value(&summary.runs).unwrap_or(Value::Null),
                );
                BridgeOutcome::Updated(status.set_component(GITHUB_COMPONENT, summary.status, extra, Utc::now()))
            }
            Err(e) => {
                tracing::warn!(target: "bdi::bridge", error = %e, "Workflow status refresh failed");
                let error = e.to_string();
                let mut extra = Map::new();
                extra.insert("error".to_string(), error.clone().into());
                let component = status.set_component(GITHUB_COMPONENT, ComponentStatus::Error, extra, Utc::now());
                BridgeOutcome::Failed { error, component }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(id: u64, conclusion: Option<&str>) -> WorkflowRun {
        WorkflowRun {
            id,
            name: Some("quantum-processing".to_string()),
            status: Some("completed".to_string()),
            conclusion: conclusion.map(str::to_string),
            created_at: Some(format!("2026-05-10T0{}:00:00Z", id)),
            html_url: None,
            head_branch: Some("main".to_string()),
        }
    }

    struct StubSource(Result<Vec<WorkflowRun>, fn() -> BridgeError>);

    #[async_trait::async_trait]
    impl WorkflowRunSource for StubSource {
        async fn recent_runs(&self, limit: usize) -> Result<Vec<WorkflowRun>, BridgeError> {
            match &self.0 {
                Ok(runs) => Ok(runs.iter().take(limit).cloned().collect()),
                Err(make) => Err(make()),
            }
        }
    }

    #[test]
    fn three_of_five_successes_is_healthy() {
        let runs = vec![
            run(5, Some("success")),
            run(4, Some("failure")),
            run(3, Some("success")),
            run(2, None),
            run(1, Some("success")),
        ];
        let summary = summarize_runs(runs);
        assert_eq!(summary.status, ComponentStatus::Healthy);
        assert!((summary.success_rate - 0.6).abs() < 1e-12);
        assert_eq!(summary.last_run.as_deref(), Some("2026-05-10T05:00:00Z"));
    }

    #[test]
    fn two_of_five_successes_is_degraded() {
        let runs = vec![
            run(5, Some("failure")),
            run(4, Some("success")),
            run(3, Some("cancelled")),
            run(2, Some("success")),
            run(1, Some("failure")),
        ];
        let summary = summarize_runs(runs);
        assert_eq!(summary.status, ComponentStatus::Degraded);
        assert!((summary.success_rate - 0.4).abs() < 1e-12);
    }

    #[test]
    fn only_the_newest_five_runs_are_sampled() {
        // 5 of 8 overall would be healthy; the newest five hold only 2 successes.
        let mut runs = vec![
            run(9, Some("failure")),
            run(8, Some("success")),
            run(7, Some("cancelled")),
            run(6, Some("success")),
            run(5, Some("failure")),
        ];
        runs.extend((1..=3).map(|i| run(i, Some("success"))));
        let summary = summarize_runs(runs);
        assert_eq!(summary.runs.len(), WORKFLOW_SAMPLE);
        assert_eq!(summary.runs.last().map(|r| r.id), Some(5));
        assert_eq!(summary.status, ComponentStatus::Degraded);
        assert!((summary.success_rate - 0.4).abs() < 1e-12);
    }

    #[test]
    fn no_runs_is_unknown() {
        let summary = summarize_runs(Vec::new());
        assert_eq!(summary.status, ComponentStatus::Unknown);
        assert!(summary.last_run.is_none());
    }

    #[test]
    fn runs_response_parses_github_shape() {
        let body = r#"{ "total_count": 1, "workflow_runs": [
            { "id": 42, "name": "ci", "status": "completed", "conclusion": "success",
              "created_at": "2026-05-10T10:00:00Z", "html_url": "https://example.test/42",
              "head_branch": "main", "run_number": 7 }
        ]}"#;
        let parsed: WorkflowRunsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.workflow_runs.len(), 1);
        assert_eq!(parsed.workflow_runs[0].id, 42);
        assert_eq!(parsed.workflow_runs[0].conclusion.as_deref(), Some("success"));
    }

    #[tokio::test]
    async fn refresh_folds_summary_into_status_store() {
        let store = StatusStore::new();
        let bridge = ExternalStatusBridge::new(Arc::new(StubSource(Ok(vec![
            run(2, Some("success")),
            run(1, Some("success")),
        ]))));
        let BridgeOutcome::Updated(state) = bridge.refresh(&store).await else {
            panic!("expected update");
        };
        assert_eq!(state.status, ComponentStatus::Healthy);
        let stored = store.component(GITHUB_COMPONENT).unwrap();
        assert_eq!(stored, state);
        assert_eq!(stored.extra["recent_runs"].as_array().unwrap().len(), 2);
        assert_eq!(stored.extra["last_run"], "2026-05-10T02:00:00Z");
    }

    #[tokio::test]
    async fn refresh_failure_marks_component_error() {
        let store = StatusStore::new();
        let bridge = ExternalStatusBridge::new(Arc::new(StubSource(Err(|| BridgeError::Timeout))));
        let BridgeOutcome::Failed { error, component } = bridge.refresh(&store).await else {
            panic!("expected failure");
        };
        assert_eq!(error, "request timed out");
        assert_eq!(component.status, ComponentStatus::Error);
        assert_eq!(store.component(GITHUB_COMPONENT).unwrap().extra["error"], "request timed out");
    }

    #[tokio::test]
    async fn unconfigured_client_fails_without_network() {
        let client = GithubActionsClient::from_config(&CoreConfig::default()).unwrap();
        let err = client.recent_runs(WORKFLOW_SAMPLE).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotConfigured));
    }
}
