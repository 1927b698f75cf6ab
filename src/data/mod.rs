//! Data points and their assignment to the network
//!
//! A point is assigned to the edge nearest by perpendicular distance. Both
//! edge endpoints are kept so that aggregation can approach the point from
//! either side; `nearest` is the endpoint with the shorter along-edge walk.

use geo::Coord;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::config::AssignConfig;
use crate::error::{NetworkError, Result};
use crate::geom;
use crate::graph::{EdgeIdx, NetworkStructure, NodeIdx};
use crate::spatial::{EdgeIndex, NodeIndex};

/// Data point as supplied by a collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRecord {
    pub id: String,
    pub x: f64,
    pub y: f64,
    /// Land-use class label
    pub class: String,
}

impl DataRecord {
    pub fn new(id: impl Into<String>, x: f64, y: f64, class: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            class: class.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    pub edge: EdgeIdx,
    pub nearest: NodeIdx,
    pub next_nearest: NodeIdx,
    /// Along-edge distance from `nearest` to the projected point
    pub nearest_along: f64,
    /// Along-edge distance from `next_nearest` to the projected point
    pub next_along: f64,
    /// Perpendicular distance from the point to the edge
    pub offset: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    pub id: String,
    pub coord: Coord<f64>,
    /// Index into `DataLayer::classes`
    pub class_code: usize,
    pub assignment: Option<Assignment>,
}

/// Outcome of an assignment pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssignmentReport {
    pub assigned: usize,
    pub unassigned: Vec<String>,
    pub max_dist: f64,
}

impl AssignmentReport {
    pub fn errors(&self) -> Vec<NetworkError> {
        self.unassigned
            .iter()
            .map(|id| NetworkError::Unassignable {
                id: id.clone(),
                max_dist: self.max_dist,
            })
            .collect()
    }
}

/// Data points sharing one class vocabulary
#[derive(Debug, Clone, Default)]
pub struct DataLayer {
    points: Vec<DataPoint>,
    classes: Vec<String>,
    network_generation: Option<u64>,
}

impl DataLayer {
    pub fn from_records(records: &[DataRecord]) -> Result<Self> {
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        for record in records {
            if !record.x.is_finite() || !record.y.is_finite() {
                return Err(NetworkError::structural(&record.id, "non-finite coordinate"));
            }
            if !seen.insert(record.id.as_str()) {
                return Err(NetworkError::structural(&record.id, "duplicate data point identifier"));
            }
        }
        let (classes, codes) = encode_categorical(records.iter().map(|r| r.class.as_str()));
        let points = records
            .iter()
            .zip(codes)
            .map(|(r, class_code)| DataPoint {
                id: r.id.clone(),
                coord: Coord { x: r.x, y: r.y },
                class_code,
                assignment: None,
            })
            .collect();
        Ok(Self {
            points,
            classes,
            network_generation: None,
        })
    }

    pub fn points(&self) -> &[DataPoint] {
        &self.points
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn class_code(&self, label: &str) -> Option<usize> {
        self.classes.iter().position(|c| c == label)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Generation of the network the points were last assigned against
    pub fn network_generation(&self) -> Option<u64> {
        self.network_generation
    }

    /// Assign every point to its nearest edge within `max_assign_dist`
    ///
    /// Points with no edge in range keep a null assignment and are listed in
    /// the report; they do not fail the pass.
    pub fn assign_to_network(
        &mut self,
        network: &NetworkStructure,
        config: &AssignConfig,
    ) -> Result<AssignmentReport> {
        config.validate()?;
        let index = EdgeIndex::build(network);
        let assignments: Vec<Option<Assignment>> = self
            .points
            .par_iter()
            .map(|p| assign_point(network, &index, p.coord, config.max_assign_dist))
            .collect();

        let mut report = AssignmentReport {
            max_dist: config.max_assign_dist,
            ..Default::default()
        };
        for (point, assignment) in self.points.iter_mut().zip(assignments) {
            point.assignment = assignment;
            match assignment {
                Some(_) => report.assigned += 1,
                None => {
                    tracing::warn!(id = %point.id, max_dist = config.max_assign_dist, "data point unassignable");
                    report.unassigned.push(point.id.clone());
                }
            }
        }
        self.network_generation = Some(network.generation());

        tracing::info!(
            assigned = report.assigned,
            unassigned = report.unassigned.len(),
            "data points assigned"
        );
        Ok(report)
    }

    /// Indices of points within `radius` of `at`, inclusive
    pub fn radial_filter(&self, at: Coord<f64>, radius: f64) -> Vec<usize> {
        self.points
            .iter()
            .enumerate()
            .filter(|(_, p)| geom::distance(p.coord, at) <= radius)
            .map(|(i, _)| i)
            .collect()
    }
}

fn assign_point(
    network: &NetworkStructure,
    index: &EdgeIndex,
    at: Coord<f64>,
    max_dist: f64,
) -> Option<Assignment> {
    let (edge_idx, _) = index.nearest(at, max_dist)?;
    let edge = network.edge(edge_idx)?;
    let proj = geom::project(&edge.geom, at)?;
    let from_start = proj.along.clamp(0.0, edge.length);
    let from_end = edge.length - from_start;
    let (nearest, next_nearest, nearest_along, next_along) = if from_start <= from_end {
        (edge.start, edge.end, from_start, from_end)
    } else {
        (edge.end, edge.start, from_end, from_start)
    };
    Some(Assignment {
        edge: edge_idx,
        nearest,
        next_nearest,
        nearest_along,
        next_along,
        offset: proj.offset,
    })
}

/// Map labels to dense codes in first-appearance order
pub fn encode_categorical<'a, I>(labels: I) -> (Vec<String>, Vec<usize>)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut classes: Vec<String> = Vec::new();
    let mut lookup: FxHashMap<&'a str, usize> = FxHashMap::default();
    let codes = labels
        .into_iter()
        .map(|label| {
            *lookup.entry(label).or_insert_with(|| {
                classes.push(label.to_string());
                classes.len() - 1
            })
        })
        .collect();
    (classes, codes)
}

/// Nearest node to `at`, optionally bounded by `max_dist`
pub fn nearest_node(network: &NetworkStructure, at: Coord<f64>, max_dist: Option<f64>) -> Option<NodeIdx> {
    NodeIndex::build(network).nearest(at, max_dist).map(|(n, _)| n)
}
