//! Metric tables keyed by entity identifier, threshold and metric name
//!
//! Values are stored densely as `[metric][threshold][entity]`. A table is
//! filled by the engine and handed to the caller read-only; entities whose
//! computation failed carry NaN values plus a reason. Per-source values of
//! buffer (non-live) nodes are NaN without a reason.

use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{NetworkError, Result};

/// Thresholds closer than this are the same threshold
const THRESHOLD_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Node,
    Edge,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricResult {
    kind: EntityKind,
    ids: Vec<String>,
    thresholds: Vec<f64>,
    metrics: Vec<String>,
    values: Vec<f64>,
    failures: BTreeMap<String, String>,
    index: FxHashMap<String, usize>,
}

impl MetricResult {
    pub(crate) fn new(kind: EntityKind, ids: Vec<String>, thresholds: Vec<f64>, metrics: Vec<String>) -> Self {
        let index = ids.iter().enumerate().map(|(i, id)| (id.clone(), i)).collect();
        let len = ids.len() * thresholds.len() * metrics.len();
        Self {
            kind,
            ids,
            thresholds,
            metrics,
            values: vec![0.0; len],
            failures: BTreeMap::new(),
            index,
        }
    }

    #[inline]
    fn offset(&self, metric: usize, threshold: usize, entity: usize) -> usize {
        (metric * self.thresholds.len() + threshold) * self.ids.len() + entity
    }

    pub(crate) fn set(&mut self, metric: usize, threshold: usize, entity: usize, value: f64) {
        let at = self.offset(metric, threshold, entity);
        self.values[at] = value;
    }

    pub(crate) fn add(&mut self, metric: usize, threshold: usize, entity: usize, value: f64) {
        let at = self.offset(metric, threshold, entity);
        self.values[at] += value;
    }

    /// Overwrite every value of `entity` with NaN and record why
    pub(crate) fn mark_failed(&mut self, entity: usize, reason: impl Into<String>) {
        for m in 0..self.metrics.len() {
            for t in 0..self.thresholds.len() {
                self.set(m, t, entity, f64::NAN);
            }
        }
        if let Some(id) = self.ids.get(entity) {
            self.failures.insert(id.clone(), reason.into());
        }
    }

    /// NaN for `metrics` of an entity that was never a source
    pub(crate) fn mark_not_computed(&mut self, entity: usize, metrics: std::ops::Range<usize>) {
        for m in metrics {
            for t in 0..self.thresholds.len() {
                self.set(m, t, entity, f64::NAN);
            }
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }

    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    pub fn metric_index(&self, metric: &str) -> Option<usize> {
        self.metrics.iter().position(|m| m == metric)
    }

    pub fn threshold_index(&self, threshold: f64) -> Option<usize> {
        self.thresholds
            .iter()
            .position(|&t| (t - threshold).abs() <= THRESHOLD_EPS)
    }

    pub fn entity_index(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Value for (`id`, `threshold`, `metric`)
    pub fn get(&self, id: &str, threshold: f64, metric: &str) -> Option<f64> {
        let e = self.entity_index(id)?;
        let t = self.threshold_index(threshold)?;
        let m = self.metric_index(metric)?;
        Some(self.values[self.offset(m, t, e)])
    }

    pub fn value_at(&self, metric: usize, threshold: usize, entity: usize) -> f64 {
        self.values[self.offset(metric, threshold, entity)]
    }

    /// All entity values of one metric at one threshold, in `ids()` order
    pub fn column(&self, metric: &str, threshold: f64) -> Option<&[f64]> {
        let m = self.metric_index(metric)?;
        let t = self.threshold_index(threshold)?;
        let start = self.offset(m, t, 0);
        Some(&self.values[start..start + self.ids.len()])
    }

    pub fn failures(&self) -> &BTreeMap<String, String> {
        &self.failures
    }

    pub fn is_failed(&self, id: &str) -> bool {
        self.failures.contains_key(id)
    }

    /// Combine two tables over the same entities and thresholds
    pub fn merge(mut self, other: MetricResult) -> Result<MetricResult> {
        if self.kind != other.kind || self.ids != other.ids || self.thresholds != other.thresholds {
            return Err(NetworkError::config(
                "metric tables must share entities and thresholds to merge",
            ));
        }
        if let Some(dup) = other.metrics.iter().find(|m| self.metrics.contains(m)) {
            return Err(NetworkError::config(format!("metric '{dup}' present in both tables")));
        }
        self.metrics.extend(other.metrics);
        self.values.extend(other.values);
        for (id, reason) in other.failures {
            self.failures.entry(id).or_insert(reason);
        }
        // a failed entity stays NaN across every metric
        let failed: Vec<usize> = self
            .failures
            .keys()
            .filter_map(|id| self.index.get(id).copied())
            .collect();
        for e in failed {
            for m in 0..self.metrics.len() {
                for t in 0..self.thresholds.len() {
                    self.set(m, t, e, f64::NAN);
                }
            }
        }
        Ok(self)
    }
}
