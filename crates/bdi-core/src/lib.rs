//! bdi-core: in-memory domain stores for BDI agent telemetry (beliefs, desires,
//! intentions, system status), running statistics, read-time derived status and the
//! GitHub Actions status bridge.

mod bridge;
mod derived;
mod error;
mod record;
mod shared;
mod status;
mod store;

pub use bridge::{
    summarize_runs, BridgeOutcome, ExternalStatusBridge, GithubActionsClient, WorkflowRun, WorkflowRunSource,
    WorkflowSummary, GITHUB_COMPONENT, HEALTHY_SUCCESS_RATIO, REQUEST_TIMEOUT, WORKFLOW_SAMPLE,
};
pub use derived::{
    active_plans, classify_health, component_score, desire_healthy, desire_status, enrich_schedule_item,
    hours_until_start, is_active_plan, plan_completion, progress_percentage, schedule_status, schedule_view,
    DesireStatus, HealthLabel, HealthSummary, ScheduleStatus, ScheduleView, DESIRE_FRESHNESS_MS,
};
pub use error::{BridgeError, StoreError, ValidationError};
pub use record::{parse_timestamp, value_at, Record};
pub use shared::{CoreConfig, DEFAULT_GITHUB_API_BASE};
pub use status::{
    ComponentAck, ComponentState, ComponentStatus, MetricsView, StatusAck, StatusOverview, StatusStore, StatusUpdate,
};
pub use store::{
    BoundedHistoryStore, CountField, DomainSpec, HistoryPage, MeanField, PageLimit, RunningMean,
    RunningStatsAggregator, StatsSnapshot, BELIEFS, DEFAULT_PAGE_LIMIT, DESIRES, HISTORY_CAPACITY, INTENTIONS,
    MAX_PAGE_LIMIT,
};

/// One store per domain, created once at startup and shared by every handler.
pub struct DomainStores {
    pub beliefs: BoundedHistoryStore,
    pub desires: BoundedHistoryStore,
    pub intentions: BoundedHistoryStore,
    pub status: StatusStore,
}

impl DomainStores {
    pub fn new() -> Self {
        Self {
            beliefs: BoundedHistoryStore::new(&BELIEFS),
            desires: BoundedHistoryStore::new(&DESIRES),
            intentions: BoundedHistoryStore::new(&INTENTIONS),
            status: StatusStore::new(),
        }
    }
}

impl Default for DomainStores {
    fn default() -> Self {
        Self::new()
    }
}
