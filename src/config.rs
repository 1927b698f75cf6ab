//! Analysis configuration
//!
//! All structs deserialize from camelCase JSON with every field optional;
//! missing fields fall back to the defaults below. `validate()` rejects
//! parameter combinations that would make an operation meaningless and names
//! the offending field.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{NetworkError, Result};

/// Weight at which a distance threshold is considered reached: exp(-4)
pub const MIN_THRESHOLD_WEIGHT: f64 = 0.018_315_638_888_734_18;

/// Geometry validation applied when records become a network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GraphConfig {
    /// Maximum gap between a geometry endpoint and its node coordinate
    pub endpoint_tolerance: f64,
    /// Overwrite endpoints within tolerance with the exact node coordinate
    pub snap_endpoints: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            endpoint_tolerance: 1e-3,
            snap_endpoints: false,
        }
    }
}

impl GraphConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.endpoint_tolerance.is_finite() || self.endpoint_tolerance < 0.0 {
            return Err(NetworkError::config(format!(
                "endpointTolerance must be a finite non-negative distance, got {}",
                self.endpoint_tolerance
            )));
        }
        Ok(())
    }
}

/// Graph cleaning parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CleanConfig {
    /// Merge radius for consolidation and opposing-geometry splitting
    pub buffer_dist: f64,
    pub min_node_group: usize,
    pub min_node_degree: usize,
    /// Members at or above this degree dictate the consolidated centroid
    pub cent_min_degree: usize,
    pub crawl: bool,
    /// Dead-end chains shorter than this are removed
    pub despine: f64,
    pub remove_disconnected: bool,
    /// Components with fewer nodes than this are disconnected fragments
    pub min_component_nodes: usize,
    /// Degree-2 nodes turning more than this many degrees are kept
    pub angular_tolerance: Option<f64>,
    /// Max deviation in degrees for an edge to count as opposing a node's street
    pub opposing_angle_tolerance: f64,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            buffer_dist: 12.0,
            min_node_group: 2,
            min_node_degree: 1,
            cent_min_degree: 3,
            crawl: true,
            despine: 15.0,
            remove_disconnected: true,
            min_component_nodes: 100,
            angular_tolerance: None,
            opposing_angle_tolerance: 30.0,
        }
    }
}

impl CleanConfig {
    pub fn validate(&self) -> Result<()> {
        non_negative("bufferDist", self.buffer_dist)?;
        non_negative("despine", self.despine)?;
        if self.min_node_group < 1 {
            return Err(NetworkError::config("minNodeGroup must be at least 1"));
        }
        if let Some(tol) = self.angular_tolerance {
            if !tol.is_finite() || !(0.0..=180.0).contains(&tol) {
                return Err(NetworkError::config(format!(
                    "angularTolerance must lie in [0, 180], got {tol}"
                )));
            }
        }
        if !(0.0..=90.0).contains(&self.opposing_angle_tolerance) {
            return Err(NetworkError::config(format!(
                "opposingAngleTolerance must lie in [0, 90], got {}",
                self.opposing_angle_tolerance
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DecomposeConfig {
    pub decomposition_length: f64,
}

impl Default for DecomposeConfig {
    fn default() -> Self {
        Self {
            decomposition_length: 20.0,
        }
    }
}

impl DecomposeConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.decomposition_length.is_finite() || self.decomposition_length <= 0.0 {
            return Err(NetworkError::config(format!(
                "decompositionLength must be positive, got {}",
                self.decomposition_length
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssignConfig {
    /// Search radius for the nearest edge
    pub max_assign_dist: f64,
}

impl Default for AssignConfig {
    fn default() -> Self {
        Self {
            max_assign_dist: 400.0,
        }
    }
}

impl AssignConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.max_assign_dist.is_finite() || self.max_assign_dist <= 0.0 {
            return Err(NetworkError::config(format!(
                "maxAssignDist must be positive, got {}",
                self.max_assign_dist
            )));
        }
        Ok(())
    }
}

/// Path cost used to build each window's predecessor tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathMode {
    /// Minimise metric distance
    #[default]
    Shortest,
    /// Minimise cumulative angular change
    Simplest,
}

/// A distance threshold with its paired decay parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    pub distance: f64,
    pub beta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CentralityConfig {
    pub distance_thresholds: Vec<f64>,
    /// Decay parameters; derived from the thresholds when empty
    #[serde(alias = "beta")]
    pub betas: Vec<f64>,
    pub min_threshold_weight: f64,
    pub path_mode: PathMode,
    pub closeness: bool,
    pub betweenness: bool,
    /// Edge-keyed segment metrics
    pub segment: bool,
    pub angular_scaling_unit: f64,
    pub farness_scaling_offset: f64,
}

impl Default for CentralityConfig {
    fn default() -> Self {
        Self {
            distance_thresholds: vec![400.0, 800.0],
            betas: Vec::new(),
            min_threshold_weight: MIN_THRESHOLD_WEIGHT,
            path_mode: PathMode::Shortest,
            closeness: true,
            betweenness: true,
            segment: false,
            angular_scaling_unit: 180.0,
            farness_scaling_offset: 1.0,
        }
    }
}

impl CentralityConfig {
    pub fn validate(&self) -> Result<()> {
        self.thresholds().map(|_| ())
    }

    /// Resolve distances and betas into sorted threshold pairs
    ///
    /// Either list may be omitted and is derived from the other through
    /// `min_threshold_weight`. When both are given they pair by position.
    pub fn thresholds(&self) -> Result<Vec<Threshold>> {
        if !(self.min_threshold_weight > 0.0 && self.min_threshold_weight < 1.0) {
            return Err(NetworkError::config(format!(
                "minThresholdWeight must lie in (0, 1), got {}",
                self.min_threshold_weight
            )));
        }
        if self.angular_scaling_unit <= 0.0 || !self.angular_scaling_unit.is_finite() {
            return Err(NetworkError::config("angularScalingUnit must be positive"));
        }
        for &d in &self.distance_thresholds {
            if !d.is_finite() || d <= 0.0 {
                return Err(NetworkError::config(format!(
                    "distanceThresholds must be positive and finite, got {d}"
                )));
            }
        }
        for &b in &self.betas {
            if !b.is_finite() || b <= 0.0 {
                return Err(NetworkError::config(format!(
                    "beta values must be positive and finite, got {b}"
                )));
            }
        }

        let mut pairs: Vec<Threshold> = match (self.distance_thresholds.is_empty(), self.betas.is_empty()) {
            (true, true) => {
                return Err(NetworkError::config(
                    "at least one of distanceThresholds or beta is required",
                ))
            }
            (false, true) => self
                .distance_thresholds
                .iter()
                .map(|&distance| Threshold {
                    distance,
                    beta: beta_from_distance(distance, self.min_threshold_weight),
                })
                .collect(),
            (true, false) => self
                .betas
                .iter()
                .map(|&beta| Threshold {
                    distance: distance_from_beta(beta, self.min_threshold_weight),
                    beta,
                })
                .collect(),
            (false, false) => {
                if self.distance_thresholds.len() != self.betas.len() {
                    return Err(NetworkError::config(format!(
                        "{} distance thresholds but {} beta values",
                        self.distance_thresholds.len(),
                        self.betas.len()
                    )));
                }
                self.distance_thresholds
                    .iter()
                    .zip(&self.betas)
                    .map(|(&distance, &beta)| Threshold { distance, beta })
                    .collect()
            }
        };

        pairs.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        if pairs.windows(2).any(|w| w[0].distance == w[1].distance) {
            return Err(NetworkError::config("distance thresholds must be unique"));
        }
        Ok(pairs)
    }
}

/// Distance at which exp(-beta * d) decays to `min_weight`
pub fn distance_from_beta(beta: f64, min_weight: f64) -> f64 {
    -min_weight.ln() / beta
}

/// Beta for which exp(-beta * distance) equals `min_weight`
pub fn beta_from_distance(distance: f64, min_weight: f64) -> f64 {
    -min_weight.ln() / distance
}

/// Mixed-use and accessibility aggregation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LanduseConfig {
    /// Hill number orders
    pub qs: Vec<f64>,
    /// Metric names, e.g. "hill", "shannon", "raos_pairwise_disparity"
    pub mixed_use_metrics: Vec<String>,
    /// Class labels reported as per-class accessibility
    pub accessibility_labels: Vec<String>,
    /// Add the perpendicular offset to network distances
    pub include_offset: bool,
    /// Class-by-class disparity weights for the disparity metrics
    pub disparity_matrix: Option<Vec<Vec<f64>>>,
}

impl Default for LanduseConfig {
    fn default() -> Self {
        Self {
            qs: vec![0.0, 1.0, 2.0],
            mixed_use_metrics: Vec::new(),
            accessibility_labels: Vec::new(),
            include_offset: false,
            disparity_matrix: None,
        }
    }
}

impl LanduseConfig {
    pub fn validate(&self) -> Result<()> {
        if self.mixed_use_metrics.is_empty() && self.accessibility_labels.is_empty() {
            return Err(NetworkError::config(
                "no mixed-use metrics or accessibility labels requested",
            ));
        }
        for &q in &self.qs {
            if !q.is_finite() || q < 0.0 {
                return Err(NetworkError::config(format!("q must be non-negative, got {q}")));
            }
        }
        Ok(())
    }
}

/// Every stage's parameters in one document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalysisConfig {
    pub graph: GraphConfig,
    pub clean: CleanConfig,
    /// Decomposition is skipped when absent
    pub decompose: Option<DecomposeConfig>,
    pub assign: AssignConfig,
    pub centrality: CentralityConfig,
    pub landuse: Option<LanduseConfig>,
}

impl AnalysisConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.graph.validate()?;
        self.clean.validate()?;
        if let Some(decompose) = &self.decompose {
            decompose.validate()?;
        }
        self.assign.validate()?;
        self.centrality.validate()?;
        if let Some(landuse) = &self.landuse {
            landuse.validate()?;
        }
        Ok(())
    }
}

fn non_negative(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(NetworkError::config(format!(
            "{field} must be a finite non-negative distance, got {value}"
        )));
    }
    Ok(())
}
