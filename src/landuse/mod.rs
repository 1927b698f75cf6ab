//! Land-use accessibility and mixed-use diversity per node window
//!
//! A data point reaches a node through either end of the edge it is assigned
//! to: its distance is the smaller of `dist(node, end) + along(end)` over both
//! ends. Points within the threshold are tallied per class and folded into the
//! requested diversity indices and per-class accessibility counts.

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::{info, warn};

use crate::centrality::ShortestTree;
use crate::config::{CentralityConfig, LanduseConfig, Threshold};
use crate::data::DataLayer;
use crate::error::{NetworkError, Result};
use crate::graph::{NetworkStructure, NodeIdx};
use crate::results::{EntityKind, MetricResult};

pub mod diversity;

/// Mixed-use indices by name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixedUse {
    Hill,
    HillBranchWt,
    HillPairwiseWt,
    HillPairwiseDisparity,
    Shannon,
    GiniSimpson,
    RaosPairwiseDisparity,
}

impl MixedUse {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "hill" => Some(Self::Hill),
            "hill_branch_wt" => Some(Self::HillBranchWt),
            "hill_pairwise_wt" => Some(Self::HillPairwiseWt),
            "hill_pairwise_disparity" => Some(Self::HillPairwiseDisparity),
            "shannon" => Some(Self::Shannon),
            "gini_simpson" => Some(Self::GiniSimpson),
            "raos_pairwise_disparity" => Some(Self::RaosPairwiseDisparity),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hill => "hill",
            Self::HillBranchWt => "hill_branch_wt",
            Self::HillPairwiseWt => "hill_pairwise_wt",
            Self::HillPairwiseDisparity => "hill_pairwise_disparity",
            Self::Shannon => "shannon",
            Self::GiniSimpson => "gini_simpson",
            Self::RaosPairwiseDisparity => "raos_pairwise_disparity",
        }
    }

    /// Indices reported once per Hill order
    pub fn takes_q(&self) -> bool {
        matches!(
            self,
            Self::Hill | Self::HillBranchWt | Self::HillPairwiseWt | Self::HillPairwiseDisparity
        )
    }

    pub fn needs_disparity(&self) -> bool {
        matches!(self, Self::HillPairwiseDisparity | Self::RaosPairwiseDisparity)
    }
}

/// One output column
#[derive(Debug, Clone, Copy)]
enum Column {
    MixedUse(MixedUse, f64),
    Access { class: usize, weighted: bool },
}

struct Plan {
    thresholds: Vec<Threshold>,
    columns: Vec<Column>,
    names: Vec<String>,
    n_classes: usize,
    disparity: Vec<Vec<f64>>,
    include_offset: bool,
}

fn plan(layer: &DataLayer, thresholds: Vec<Threshold>, config: &LanduseConfig) -> Result<Plan> {
    let n_classes = layer.classes().len();
    let mut columns = Vec::new();
    let mut names = Vec::new();
    let mut needs_disparity = false;

    let mut parsed = Vec::with_capacity(config.mixed_use_metrics.len());
    for name in &config.mixed_use_metrics {
        let metric = MixedUse::parse(name)
            .ok_or_else(|| NetworkError::config(format!("unknown mixed-use metric '{name}'")))?;
        if parsed.contains(&metric) {
            return Err(NetworkError::config(format!("mixed-use metric '{name}' requested twice")));
        }
        parsed.push(metric);
    }
    if parsed.iter().any(MixedUse::takes_q) && config.qs.is_empty() {
        return Err(NetworkError::config("Hill metrics require at least one q"));
    }
    for metric in parsed {
        needs_disparity |= metric.needs_disparity();
        if metric.takes_q() {
            for &q in &config.qs {
                columns.push(Column::MixedUse(metric, q));
                names.push(format!("{}_q{q}", metric.as_str()));
            }
        } else {
            columns.push(Column::MixedUse(metric, 0.0));
            names.push(metric.as_str().to_string());
        }
    }

    for label in &config.accessibility_labels {
        let class = layer
            .class_code(label)
            .ok_or_else(|| NetworkError::config(format!("accessibility label '{label}' not present in data")))?;
        columns.push(Column::Access { class, weighted: false });
        names.push(format!("ac_{label}_nw"));
        columns.push(Column::Access { class, weighted: true });
        names.push(format!("ac_{label}_wt"));
    }

    let disparity = match (&config.disparity_matrix, needs_disparity) {
        (Some(matrix), _) => {
            if matrix.len() != n_classes || matrix.iter().any(|row| row.len() != n_classes) {
                return Err(NetworkError::config(format!(
                    "disparity matrix must be {n_classes} x {n_classes} to match the data classes"
                )));
            }
            if matrix.iter().flatten().any(|w| !w.is_finite() || *w < 0.0) {
                return Err(NetworkError::config("disparity weights must be finite and non-negative"));
            }
            matrix.clone()
        }
        (None, true) => {
            return Err(NetworkError::config("disparity metrics require a disparity matrix"));
        }
        (None, false) => Vec::new(),
    };

    Ok(Plan {
        thresholds,
        columns,
        names,
        n_classes,
        disparity,
        include_offset: config.include_offset,
    })
}

/// Compute mixed-use and accessibility metrics for every live node
///
/// The layer must have been assigned against this exact network state.
/// Rows of non-live nodes are NaN.
pub fn compute_landuses(
    network: &NetworkStructure,
    layer: &DataLayer,
    centrality: &CentralityConfig,
    config: &LanduseConfig,
) -> Result<MetricResult> {
    config.validate()?;
    let thresholds = centrality.thresholds()?;
    match layer.network_generation() {
        None => return Err(NetworkError::config("data layer has not been assigned to a network")),
        Some(g) if g != network.generation() => {
            return Err(NetworkError::config(format!(
                "data layer was assigned at network generation {g}, network is at {}",
                network.generation()
            )))
        }
        Some(_) => {}
    }
    let plan = plan(layer, thresholds, config)?;
    let max_dist = plan.thresholds.last().map_or(0.0, |t| t.distance);

    // points reachable through each node: (point, along-edge distance)
    let mut attached: Vec<Vec<(usize, f64)>> = vec![Vec::new(); network.node_capacity()];
    for (p, point) in layer.points().iter().enumerate() {
        let Some(a) = point.assignment else { continue };
        let offset = if plan.include_offset { a.offset } else { 0.0 };
        attached[a.nearest].push((p, a.nearest_along + offset));
        attached[a.next_nearest].push((p, a.next_along + offset));
    }

    let mut row_of = vec![usize::MAX; network.node_capacity()];
    let mut ids = Vec::with_capacity(network.node_count());
    for (i, (idx, node)) in network.nodes().enumerate() {
        row_of[idx] = i;
        ids.push(node.id.clone());
    }
    let distances = plan.thresholds.iter().map(|t| t.distance).collect();
    let mut result = MetricResult::new(EntityKind::Node, ids, distances, plan.names.clone());
    for (idx, node) in network.nodes() {
        if !node.live {
            result.mark_not_computed(row_of[idx], 0..plan.names.len());
        }
    }

    let sources: Vec<NodeIdx> = network.nodes().filter(|(_, n)| n.live).map(|(i, _)| i).collect();
    info!(
        sources = sources.len(),
        points = layer.len(),
        columns = plan.names.len(),
        "computing land-use metrics"
    );

    let rows: Vec<Vec<f64>> = sources
        .par_iter()
        .map(|&source| source_row(network, layer, &attached, &plan, source, max_dist))
        .collect();

    let t_len = plan.thresholds.len();
    let mut failed = 0usize;
    for (&source, row) in sources.iter().zip(rows) {
        let r = row_of[source];
        if row.iter().any(|v| !v.is_finite()) {
            let id = network.node(source).map_or("?", |n| n.id.as_str());
            warn!(node = id, "non-finite land-use metric");
            result.mark_failed(r, "non-finite land-use metric");
            failed += 1;
            continue;
        }
        for (slot, value) in row.into_iter().enumerate() {
            result.set(slot / t_len, slot % t_len, r, value);
        }
    }
    info!(failed, "land-use metrics complete");
    Ok(result)
}

/// Network distance from `source` to every point within `max_dist`, by point index
fn point_distances(
    network: &NetworkStructure,
    attached: &[Vec<(usize, f64)>],
    source: NodeIdx,
    max_dist: f64,
) -> Vec<(usize, f64)> {
    let tree = ShortestTree::build(network, source, max_dist);
    let mut nearest: FxHashMap<usize, f64> = FxHashMap::default();
    for &node in &tree.order {
        for &(p, along) in &attached[node] {
            let d = tree.dist[node] + along;
            if d > max_dist {
                continue;
            }
            nearest
                .entry(p)
                .and_modify(|best| *best = best.min(d))
                .or_insert(d);
        }
    }
    let mut out: Vec<(usize, f64)> = nearest.into_iter().collect();
    out.sort_unstable_by_key(|&(p, _)| p);
    out
}

fn source_row(
    network: &NetworkStructure,
    layer: &DataLayer,
    attached: &[Vec<(usize, f64)>],
    plan: &Plan,
    source: NodeIdx,
    max_dist: f64,
) -> Vec<f64> {
    let reached = point_distances(network, attached, source, max_dist);
    let t_len = plan.thresholds.len();
    let mut row = vec![0.0; plan.columns.len() * t_len];
    let points = layer.points();

    for (t, th) in plan.thresholds.iter().enumerate() {
        let mut counts = vec![0.0; plan.n_classes];
        let mut nearest = vec![f64::INFINITY; plan.n_classes];
        let mut decayed = vec![0.0; plan.n_classes];
        for &(p, d) in &reached {
            if d > th.distance {
                continue;
            }
            let class = points[p].class_code;
            counts[class] += 1.0;
            nearest[class] = nearest[class].min(d);
            decayed[class] += (-th.beta * d).exp();
        }

        for (c, column) in plan.columns.iter().enumerate() {
            let value = match *column {
                Column::MixedUse(metric, q) => match metric {
                    MixedUse::Hill => diversity::hill(&counts, q),
                    MixedUse::HillBranchWt => diversity::hill_branch_wt(&counts, &nearest, q, th.beta),
                    MixedUse::HillPairwiseWt => diversity::hill_pairwise_wt(&counts, &nearest, q, th.beta),
                    MixedUse::HillPairwiseDisparity => {
                        diversity::hill_pairwise_disparity(&counts, &plan.disparity, q)
                    }
                    MixedUse::Shannon => diversity::shannon(&counts),
                    MixedUse::GiniSimpson => diversity::gini_simpson(&counts),
                    MixedUse::RaosPairwiseDisparity => {
                        diversity::raos_pairwise_disparity(&counts, &plan.disparity)
                    }
                },
                Column::Access { class, weighted: false } => counts[class],
                Column::Access { class, weighted: true } => decayed[class],
            };
            row[c * t_len + t] = value;
        }
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AssignConfig, GraphConfig};
    use crate::data::DataRecord;
    use crate::graph::{EdgeRecord, NodeRecord};

    fn line() -> NetworkStructure {
        let nodes = vec![
            NodeRecord::new("a", 0.0, 0.0),
            NodeRecord::new("b", 100.0, 0.0),
            NodeRecord::new("c", 200.0, 0.0),
        ];
        let edges = vec![EdgeRecord::new("ab", "a", "b"), EdgeRecord::new("bc", "b", "c")];
        NetworkStructure::from_records(&nodes, &edges, &GraphConfig::default()).unwrap()
    }

    fn layer(net: &NetworkStructure) -> DataLayer {
        let records = vec![
            DataRecord::new("p1", 50.0, 5.0, "shop"),
            DataRecord::new("p2", 180.0, 3.0, "cafe"),
            DataRecord::new("p3", 10.0, -2.0, "shop"),
        ];
        let mut layer = DataLayer::from_records(&records).unwrap();
        layer.assign_to_network(net, &AssignConfig::default()).unwrap();
        layer
    }

    fn centrality() -> CentralityConfig {
        CentralityConfig {
            distance_thresholds: vec![100.0, 200.0],
            ..Default::default()
        }
    }

    #[test]
    fn test_accessibility_and_hill() {
        let net = line();
        let layer = layer(&net);
        let cfg = LanduseConfig {
            qs: vec![0.0],
            mixed_use_metrics: vec!["hill".into()],
            accessibility_labels: vec!["shop".into(), "cafe".into()],
            ..Default::default()
        };
        let result = compute_landuses(&net, &layer, &centrality(), &cfg).unwrap();
        assert_eq!(result.get("a", 100.0, "hill_q0"), Some(1.0));
        assert_eq!(result.get("a", 200.0, "hill_q0"), Some(2.0));
        assert_eq!(result.get("a", 100.0, "ac_shop_nw"), Some(2.0));
        assert_eq!(result.get("a", 100.0, "ac_cafe_nw"), Some(0.0));
        // cafe reached through b at 100 + 80
        let wt = result.get("a", 200.0, "ac_cafe_wt").unwrap();
        assert!((wt - (-0.02f64 * 180.0).exp()).abs() < 1e-9);
        assert_eq!(result.get("c", 100.0, "ac_shop_nw"), Some(0.0));
        assert_eq!(result.get("c", 200.0, "ac_shop_nw"), Some(2.0));
    }

    #[test]
    fn test_offset_is_optional() {
        let net = line();
        let layer = layer(&net);
        let cfg = LanduseConfig {
            accessibility_labels: vec!["cafe".into()],
            include_offset: true,
            ..Default::default()
        };
        let result = compute_landuses(&net, &layer, &centrality(), &cfg).unwrap();
        let wt = result.get("a", 200.0, "ac_cafe_wt").unwrap();
        assert!((wt - (-0.02f64 * 183.0).exp()).abs() < 1e-9);
    }

    #[test]
    fn test_configuration_errors() {
        let net = line();
        let assigned = layer(&net);
        let hill = LanduseConfig {
            mixed_use_metrics: vec!["hill_pairwise_disparity".into()],
            ..Default::default()
        };
        assert!(compute_landuses(&net, &assigned, &centrality(), &hill).is_err());

        let unknown = LanduseConfig {
            mixed_use_metrics: vec!["entropy".into()],
            ..Default::default()
        };
        assert!(compute_landuses(&net, &assigned, &centrality(), &unknown).is_err());

        let fresh = DataLayer::from_records(&[DataRecord::new("p", 1.0, 1.0, "shop")]).unwrap();
        let access = LanduseConfig {
            accessibility_labels: vec!["shop".into()],
            ..Default::default()
        };
        let err = compute_landuses(&net, &fresh, &centrality(), &access).unwrap_err();
        assert!(err.to_string().contains("not been assigned"));
    }

    #[test]
    fn test_buffer_rows_are_nan() {
        let mut net = line();
        let layer = layer(&net);
        let c = net.node_index("c").unwrap();
        net.set_live(c, false);
        let cfg = LanduseConfig {
            accessibility_labels: vec!["shop".into(), "cafe".into()],
            ..Default::default()
        };
        let result = compute_landuses(&net, &layer, &centrality(), &cfg).unwrap();
        assert!(result.get("c", 200.0, "ac_shop_nw").unwrap().is_nan());
        assert!(result.get("c", 100.0, "ac_cafe_wt").unwrap().is_nan());
        assert!(!result.is_failed("c"));
        // a live node reaching nothing is still zero
        assert_eq!(result.get("a", 100.0, "ac_cafe_nw"), Some(0.0));
        assert_eq!(result.get("b", 100.0, "ac_shop_nw"), Some(2.0));
    }

    #[test]
    fn test_stale_assignment_rejected() {
        let mut net = line();
        let layer = layer(&net);
        let c = net.node_index("c").unwrap();
        net.remove_node(c);
        let cfg = LanduseConfig {
            accessibility_labels: vec!["shop".into()],
            ..Default::default()
        };
        let err = compute_landuses(&net, &layer, &centrality(), &cfg).unwrap_err();
        assert!(err.to_string().contains("generation"));
    }
}
