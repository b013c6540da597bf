//! Incremental statistics kept alongside each domain store.

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use super::{CountField, DomainSpec, MeanField};
use crate::record::Record;

/// Mean maintained without retaining past values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningMean {
    mean: f64,
    count: u64,
}

impl RunningMean {
    /// `mean_n = (mean_{n-1} * (n-1) + value) / n`
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let n = self.count as f64;
        self.mean = (self.mean * (n - 1.0) + value) / n;
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }
}

/// Per-domain counters, means and sums, updated once per accepted write.
#[derive(Debug, Clone)]
pub struct RunningStatsAggregator {
    spec: &'static DomainSpec,
    total: u64,
    special: u64,
    default: u64,
    means: Vec<RunningMean>,
    sums: Vec<u64>,
    last_updated: Option<DateTime<Utc>>,
}

impl RunningStatsAggregator {
    pub fn new(spec: &'static DomainSpec) -> Self {
        Self {
            spec,
            total: 0,
            special: 0,
            default: 0,
            means: vec![RunningMean::default(); spec.means.len()],
            sums: vec![0; spec.sums.len()],
            last_updated: None,
        }
    }

    pub fn update(&mut self, record: &Record) {
        self.total += 1;
        if record.str_at(&[self.spec.discriminator]) == Some(self.spec.special_value) {
            self.special += 1;
        } else {
            self.default += 1;
        }
        for (mean, field) in self.means.iter_mut().zip(self.spec.means) {
            mean.push(field.read(record));
        }
        for (sum, field) in self.sums.iter_mut().zip(self.spec.sums) {
            *sum += field.read(record);
        }
        self.last_updated = Some(record.received_at);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            spec: self.spec,
            total: self.total,
            special: self.special,
            default: self.default,
            means: self.means.iter().map(RunningMean::mean).collect(),
            sums: self.sums.clone(),
            last_updated: self.last_updated,
        }
    }
}

impl MeanField {
    /// First numeric value among the candidate paths; 0 when none is present.
    pub fn read(&self, record: &Record) -> f64 {
        self.paths
            .iter()
            .find_map(|path| record.get(path).and_then(Value::as_f64))
            .unwrap_or(0.0)
    }
}

impl CountField {
    pub fn read(&self, record: &Record) -> u64 {
        match record.get(self.path) {
            Some(Value::Array(items)) => items.len() as u64,
            Some(other) => other.as_u64().unwrap_or(0),
            None => 0,
        }
    }
}

/// Point-in-time copy of an aggregator. Serializes as a flat object keyed by the
/// domain's field names, e.g. `{"total_processed": 3, "quantum_processed": 1, ...}`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    spec: &'static DomainSpec,
    pub total: u64,
    pub special: u64,
    pub default: u64,
    pub means: Vec<f64>,
    pub sums: Vec<u64>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl StatsSnapshot {
    /// Current mean for the field named `key`, if the domain tracks it.
    pub fn mean(&self, key: &str) -> Option<f64> {
        self.spec
            .means
            .iter()
            .position(|field| field.key == key)
            .map(|i| self.means[i])
    }

    pub fn sum(&self, key: &str) -> Option<u64> {
        self.spec
            .sums
            .iter()
            .position(|field| field.key == key)
            .map(|i| self.sums[i])
    }
}

impl Serialize for StatsSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let spec = self.spec;
        let mut map = serializer.serialize_map(Some(4 + self.means.len() + self.sums.len()))?;
        map.serialize_entry(spec.total_key, &self.total)?;
        map.serialize_entry(spec.special_key, &self.special)?;
        map.serialize_entry(spec.default_key, &self.default)?;
        for (field, mean) in spec.means.iter().zip(&self.means) {
            map.serialize_entry(field.key, mean)?;
        }
        for (field, sum) in spec.sums.iter().zip(&self.sums) {
            map.serialize_entry(field.key, sum)?;
        }
        map.serialize_entry("last_updated", &self.last_updated)?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BELIEFS, DESIRES, INTENTIONS};
    use serde_json::{json, Value};

    fn record(payload: Value) -> Record {
        Record::ingest("t", payload.as_object().cloned().unwrap_or_default(), Utc::now())
    }

    #[test]
    fn running_mean_matches_arithmetic_mean_after_every_step() {
        let values = [0.25, 3.0, -1.5, 10.0, 0.0, 7.75, 2.5];
        let mut mean = RunningMean::default();
        let mut sum = 0.0;
        for (i, v) in values.iter().enumerate() {
            mean.push(*v);
            sum += v;
            let expected = sum / (i + 1) as f64;
            assert!((mean.mean() - expected).abs() < 1e-9, "step {}: {} vs {}", i, mean.mean(), expected);
        }
    }

    #[test]
    fn counters_split_on_special_value_and_sum_to_total() {
        let mut agg = RunningStatsAggregator::new(&BELIEFS);
        let kinds = [json!("quantum"), json!("classical"), json!("QUANTUM"), json!(42), Value::Null, json!("quantum")];
        for (i, kind) in kinds.iter().enumerate() {
            agg.update(&record(json!({ "processing_type": kind })));
            let snap = agg.snapshot();
            assert_eq!(snap.special + snap.default, snap.total);
            assert_eq!(snap.total, i as u64 + 1);
        }
        let snap = agg.snapshot();
        assert_eq!(snap.special, 2);
        assert_eq!(snap.default, 4);
    }

    #[test]
    fn missing_metric_paths_count_as_zero() {
        let mut agg = RunningStatsAggregator::new(&BELIEFS);
        agg.update(&record(json!({ "optimized_beliefs": { "optimization_score": 0.9 } })));
        agg.update(&record(json!({ "optimized_beliefs": {} })));
        let snap = agg.snapshot();
        assert!((snap.mean("average_optimization_score").unwrap() - 0.45).abs() < 1e-12);
    }

    #[test]
    fn desire_net_value_falls_back_to_flat_solution_field() {
        let mut agg = RunningStatsAggregator::new(&DESIRES);
        agg.update(&record(json!({
            "optimization_type": "quantum_qaoa",
            "solution": { "optimization_score": { "net_value": 2.0 }, "total_selected": 2 }
        })));
        agg.update(&record(json!({
            "optimization_type": "classical_fallback",
            "solution": { "net_value": 1.0, "total_selected": 1 }
        })));
        let snap = agg.snapshot();
        assert_eq!(snap.special, 1);
        assert_eq!(snap.default, 1);
        assert_eq!(snap.mean("average_net_value"), Some(1.5));
        assert_eq!(snap.mean("average_selected_desires"), Some(1.5));
    }

    #[test]
    fn intentions_accumulate_planned_actions() {
        let mut agg = RunningStatsAggregator::new(&INTENTIONS);
        agg.update(&record(json!({ "plan": { "actions": [{}, {}, {}] } })));
        agg.update(&record(json!({ "plan": { "actions": [] } })));
        agg.update(&record(json!({ "plan": {} })));
        agg.update(&record(json!({ "plan": { "actions": [{}] } })));
        let snap = agg.snapshot();
        assert_eq!(snap.sum("total_actions_planned"), Some(4));
        assert_eq!(snap.total, 4);
    }

    #[test]
    fn snapshot_serializes_with_domain_field_names() {
        let mut agg = RunningStatsAggregator::new(&INTENTIONS);
        agg.update(&record(json!({
            "planning_type": "quantum",
            "plan": { "actions": [{}, {}], "quality_metrics": { "overall_quality": 0.8 } }
        })));
        let value = serde_json::to_value(agg.snapshot()).unwrap();
        assert_eq!(value["total_plans"], 1);
        assert_eq!(value["quantum_plans"], 1);
        assert_eq!(value["classical_plans"], 0);
        assert_eq!(value["average_plan_quality"], 0.8);
        assert_eq!(value["total_actions_planned"], 2);
        assert!(value["total_actions_planned"].is_u64());
        assert!(value["last_updated"].is_string());
    }

    #[test]
    fn empty_snapshot_has_null_last_updated() {
        let value = serde_json::to_value(RunningStatsAggregator::new(&BELIEFS).snapshot()).unwrap();
        assert_eq!(value["total_processed"], 0);
        assert_eq!(value["average_optimization_score"], 0.0);
        assert!(value["last_updated"].is_null());
    }
}
