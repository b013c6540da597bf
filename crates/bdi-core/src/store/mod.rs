//! Generic bounded-history store shared by the belief, desire and intention domains.
//!
//! Each domain is a static [`DomainSpec`]: which fields a write must carry, which
//! discriminator value counts as the "special" category, and which payload paths
//! feed the running means and sums.
//!
//! | Domain     | Discriminator       | Special value  |
//! |------------|---------------------|----------------|
//! | beliefs    | `processing_type`   | `quantum`      |
//! | desires    | `optimization_type` | `quantum_qaoa` |
//! | intentions | `planning_type`     | `quantum`      |

mod stats;

pub use stats::{RunningMean, RunningStatsAggregator, StatsSnapshot};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::num::IntErrorKind;
use std::sync::{Mutex, MutexGuard};

use crate::error::{StoreError, ValidationError};
use crate::record::Record;

/// Maximum records retained per store; oldest are evicted first.
pub const HISTORY_CAPACITY: usize = 1000;
/// Page size when `limit` is absent or invalid.
pub const DEFAULT_PAGE_LIMIT: usize = 50;
pub const MAX_PAGE_LIMIT: usize = 100;

/// A running mean over the first numeric value found among candidate paths.
#[derive(Debug, PartialEq)]
pub struct MeanField {
    /// Output key in the stats snapshot.
    pub key: &'static str,
    pub paths: &'static [&'static [&'static str]],
}

/// A running total of item counts: the length of the array at `path`, or a
/// non-negative integer stored there.
#[derive(Debug, PartialEq)]
pub struct CountField {
    pub key: &'static str,
    pub path: &'static [&'static str],
}

/// Static configuration of one record domain.
#[derive(Debug, PartialEq)]
pub struct DomainSpec {
    /// Domain name used in logs and lock errors.
    pub name: &'static str,
    pub id_prefix: &'static str,
    pub discriminator: &'static str,
    pub special_value: &'static str,
    pub total_key: &'static str,
    pub special_key: &'static str,
    pub default_key: &'static str,
    pub means: &'static [MeanField],
    pub sums: &'static [CountField],
}

impl DomainSpec {
    /// Fields a write must carry (non-null) to be accepted.
    pub fn required_fields(&self) -> [&'static str; 2] {
        ["timestamp", self.discriminator]
    }
}

pub static BELIEFS: DomainSpec = DomainSpec {
    name: "beliefs",
    id_prefix: "belief",
    discriminator: "processing_type",
    special_value: "quantum",
    total_key: "total_processed",
    special_key: "quantum_processed",
    default_key: "classical_processed",
    means: &[MeanField {
        key: "average_optimization_score",
        paths: &[&["optimized_beliefs", "optimization_score"]],
    }],
    sums: &[],
};

pub static DESIRES: DomainSpec = DomainSpec {
    name: "desires",
    id_prefix: "desire",
    discriminator: "optimization_type",
    special_value: "quantum_qaoa",
    total_key: "total_optimizations",
    special_key: "quantum_optimizations",
    default_key: "classical_optimizations",
    means: &[
        MeanField {
            key: "average_net_value",
            paths: &[&["solution", "optimization_score", "net_value"], &["solution", "net_value"]],
        },
        MeanField {
            key: "average_selected_desires",
            paths: &[&["solution", "total_selected"]],
        },
    ],
    sums: &[],
};

pub static INTENTIONS: DomainSpec = DomainSpec {
    name: "intentions",
    id_prefix: "intention",
    discriminator: "planning_type",
    special_value: "quantum",
    total_key: "total_plans",
    special_key: "quantum_plans",
    default_key: "classical_plans",
    means: &[MeanField {
        key: "average_plan_quality",
        paths: &[&["plan", "quality_metrics", "overall_quality"]],
    }],
    sums: &[CountField {
        key: "total_actions_planned",
        path: &["plan", "actions"],
    }],
};

/// Clamped history page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimit(usize);

impl PageLimit {
    /// Parses a `limit` query value: absent, unparsable or < 1 gives the default,
    /// anything above the maximum is clamped.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };
        match raw.trim().parse::<i64>() {
            Ok(n) if n >= 1 => Self((n as u64).min(MAX_PAGE_LIMIT as u64) as usize),
            // Integers past i64 are still above the maximum.
            Err(e) if *e.kind() == IntErrorKind::PosOverflow => Self(MAX_PAGE_LIMIT),
            _ => Self::default(),
        }
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for PageLimit {
    fn default() -> Self {
        Self(DEFAULT_PAGE_LIMIT)
    }
}

/// One page of history, oldest of the window first.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub records: Vec<Record>,
    /// Records currently retained by the store.
    pub total_count: usize,
    pub returned_count: usize,
}

struct StoreState {
    latest: Option<Record>,
    history: VecDeque<Record>,
    stats: RunningStatsAggregator,
}

/// Latest record, bounded FIFO history and running stats for one domain.
///
/// A single mutex covers all three so a write is applied as one unit.
pub struct BoundedHistoryStore {
    spec: &'static DomainSpec,
    state: Mutex<StoreState>,
}

impl BoundedHistoryStore {
    pub fn new(spec: &'static DomainSpec) -> Self {
        Self {
            spec,
            state: Mutex::new(StoreState {
                latest: None,
                history: VecDeque::with_capacity(HISTORY_CAPACITY),
                stats: RunningStatsAggregator::new(spec),
            }),
        }
    }

    pub fn spec(&self) -> &'static DomainSpec {
        self.spec
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Poisoned(self.spec.name))
    }

    /// Checks that `payload` is an object carrying every required field.
    pub fn validate(&self, payload: Value) -> Result<Map<String, Value>, ValidationError> {
        let Value::Object(map) = payload else {
            return Err(ValidationError::NotAnObject);
        };
        for field in self.spec.required_fields() {
            if map.get(field).map_or(true, Value::is_null) {
                return Err(ValidationError::MissingField(field.to_string()));
            }
        }
        Ok(map)
    }

    /// Validates and stores a write received now.
    pub fn record_latest(&self, payload: Value) -> Result<Record, StoreError> {
        self.record_latest_at(payload, Utc::now())
    }

    /// Validates and stores a write with an explicit ingestion time. Nothing is
    /// mutated when validation fails.
    pub fn record_latest_at(&self, payload: Value, received_at: DateTime<Utc>) -> Result<Record, StoreError> {
        let map = self.validate(payload)?;
        let record = Record::ingest(self.spec.id_prefix, map, received_at);

        let mut state = self.lock()?;
        state.stats.update(&record);
        if state.history.len() == HISTORY_CAPACITY {
            state.history.pop_front();
        }
        state.history.push_back(record.clone());
        state.latest = Some(record.clone());
        tracing::debug!(
            target: "bdi::store",
            domain = self.spec.name,
            id = %record.id,
            retained = state.history.len(),
            "Record accepted"
        );
        Ok(record)
    }

    pub fn latest(&self) -> Result<Option<Record>, StoreError> {
        Ok(self.lock()?.latest.clone())
    }

    /// The most recent `limit` records in append order.
    pub fn history(&self, limit: PageLimit) -> Result<HistoryPage, StoreError> {
        let state = self.lock()?;
        let total_count = state.history.len();
        let skip = total_count.saturating_sub(limit.get());
        let records: Vec<Record> = state.history.iter().skip(skip).cloned().collect();
        Ok(HistoryPage {
            returned_count: records.len(),
            total_count,
            records,
        })
    }

    /// All retained records, oldest first.
    pub fn records(&self) -> Result<Vec<Record>, StoreError> {
        Ok(self.lock()?.history.iter().cloned().collect())
    }

    pub fn stats(&self) -> Result<StatsSnapshot, StoreError> {
        Ok(self.lock()?.stats.snapshot())
    }
}
