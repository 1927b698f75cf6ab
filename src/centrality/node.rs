//! Per-source node metrics: closeness rows and betweenness increments
//!
//! Each source yields its own closeness row plus a list of betweenness
//! increments for other entities. Nothing is shared between sources, so the
//! caller can run them in parallel and fold the outputs in source order.
//!
//! A pair of nodes is counted once for betweenness: from the lower-indexed
//! end when both are live, otherwise from the live end.

use crate::config::Threshold;
use crate::graph::{NetworkStructure, NodeIdx};

use super::tree::{ShortestTree, SimplestTree};

pub const NODE_DENSITY: &str = "node_density";
pub const NODE_FARNESS: &str = "node_farness";
pub const NODE_CYCLES: &str = "node_cycles";
pub const NODE_HARMONIC: &str = "node_harmonic";
pub const NODE_BETA: &str = "node_beta";
pub const NODE_BETWEENNESS: &str = "node_betweenness";
pub const NODE_BETWEENNESS_BETA: &str = "node_betweenness_beta";
pub const NODE_HARMONIC_ANGULAR: &str = "node_harmonic_angular";
pub const NODE_FARNESS_ANGULAR: &str = "node_farness_angular";
pub const NODE_BETWEENNESS_ANGULAR: &str = "node_betweenness_angular";
pub const NODE_BETWEENNESS_BETA_ANGULAR: &str = "node_betweenness_beta_angular";

pub const SHORTEST_CLOSENESS: [&str; 5] = [NODE_DENSITY, NODE_FARNESS, NODE_CYCLES, NODE_HARMONIC, NODE_BETA];
pub const SHORTEST_BETWEENNESS: [&str; 2] = [NODE_BETWEENNESS, NODE_BETWEENNESS_BETA];
pub const SIMPLEST_CLOSENESS: [&str; 2] = [NODE_HARMONIC_ANGULAR, NODE_FARNESS_ANGULAR];
pub const SIMPLEST_BETWEENNESS: [&str; 2] = [NODE_BETWEENNESS_ANGULAR, NODE_BETWEENNESS_BETA_ANGULAR];

/// An addition to one cell of a metric table
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Increment {
    pub entity: usize,
    pub metric: usize,
    pub threshold: usize,
    pub value: f64,
}

/// Everything one source contributes
#[derive(Debug, Clone, Default)]
pub(crate) struct SourceOutput {
    /// Closeness values `[metric][threshold]` for the source itself
    pub closeness: Vec<f64>,
    /// Betweenness increments, metric indices local to the betweenness block
    pub node_increments: Vec<Increment>,
    pub edge_increments: Vec<Increment>,
    pub failure: Option<String>,
}

impl SourceOutput {
    pub(crate) fn failed(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Default::default()
        }
    }

    /// First non-finite value produced, if any
    pub(crate) fn non_finite(&self) -> Option<&'static str> {
        if self.closeness.iter().any(|v| !v.is_finite()) {
            return Some("closeness");
        }
        if self.node_increments.iter().any(|i| !i.value.is_finite()) {
            return Some("node betweenness");
        }
        if self.edge_increments.iter().any(|i| !i.value.is_finite()) {
            return Some("segment metrics");
        }
        None
    }
}

/// Whether the pair (source, target) is counted from `source`
fn counts_pair(network: &NetworkStructure, source: NodeIdx, target: NodeIdx) -> bool {
    target != source && (target > source || !network.node(target).is_some_and(|n| n.live))
}

fn weight(network: &NetworkStructure, node: NodeIdx) -> f64 {
    network.node(node).map_or(0.0, |n| n.weight)
}

/// Closeness row over the shortest-path window
pub(crate) fn shortest_closeness(
    network: &NetworkStructure,
    tree: &ShortestTree,
    thresholds: &[Threshold],
) -> Vec<f64> {
    let t_len = thresholds.len();
    let mut row = vec![0.0; SHORTEST_CLOSENESS.len() * t_len];
    for &w in &tree.order {
        if w == tree.source {
            continue;
        }
        let d = tree.dist[w];
        let wt = weight(network, w);
        let cyclic = tree.sigma[w] > 1.5;
        for (t, th) in thresholds.iter().enumerate() {
            if d > th.distance {
                continue;
            }
            row[t] += wt;
            row[t_len + t] += wt * d;
            if cyclic {
                row[2 * t_len + t] += wt;
            }
            if d > 0.0 {
                row[3 * t_len + t] += wt / d;
            }
            row[4 * t_len + t] += wt * (-th.beta * d).exp();
        }
    }
    row
}

/// Brandes dependency accumulation within each threshold's window
///
/// Node increments use metric 0 (unit) and 1 (beta-decayed); when
/// `edge_increments` is given, traversed edges receive the same shares.
pub(crate) fn shortest_betweenness(
    network: &NetworkStructure,
    tree: &ShortestTree,
    thresholds: &[Threshold],
    node_increments: &mut Vec<Increment>,
    mut edge_increments: Option<&mut Vec<Increment>>,
) {
    let s = tree.source;
    let mut delta = vec![0.0; tree.dist.len()];
    let mut delta_beta = vec![0.0; tree.dist.len()];

    for (t, th) in thresholds.iter().enumerate() {
        for &w in &tree.order {
            delta[w] = 0.0;
            delta_beta[w] = 0.0;
        }
        for &w in tree.order.iter().rev() {
            let d = tree.dist[w];
            if d > th.distance {
                continue;
            }
            let (own, own_beta) = if counts_pair(network, s, w) {
                (1.0, (-th.beta * d).exp())
            } else {
                (0.0, 0.0)
            };
            for pred in &tree.preds[w] {
                let share = tree.sigma[pred.node] / tree.sigma[w];
                let add = share * (own + delta[w]);
                let add_beta = share * (own_beta + delta_beta[w]);
                delta[pred.node] += add;
                delta_beta[pred.node] += add_beta;
                if let Some(edges) = edge_increments.as_deref_mut() {
                    if add != 0.0 {
                        edges.push(Increment { entity: pred.edge, metric: 0, threshold: t, value: add });
                        edges.push(Increment { entity: pred.edge, metric: 1, threshold: t, value: add_beta });
                    }
                }
            }
            if w != s && delta[w] != 0.0 {
                node_increments.push(Increment { entity: w, metric: 0, threshold: t, value: delta[w] });
                node_increments.push(Increment { entity: w, metric: 1, threshold: t, value: delta_beta[w] });
            }
        }
    }
}

/// Angular closeness row over the simplest-path window
pub(crate) fn simplest_closeness(
    network: &NetworkStructure,
    tree: &SimplestTree,
    thresholds: &[Threshold],
    angular_unit: f64,
    farness_offset: f64,
) -> Vec<f64> {
    let t_len = thresholds.len();
    let mut row = vec![0.0; SIMPLEST_CLOSENESS.len() * t_len];
    for &w in &tree.order {
        if w == tree.source {
            continue;
        }
        let d = tree.dist[w];
        let scaled = tree.angular[w] / angular_unit;
        let wt = weight(network, w);
        for (t, th) in thresholds.iter().enumerate() {
            if d > th.distance {
                continue;
            }
            row[t] += wt / (1.0 + scaled);
            row[t_len + t] += wt * (farness_offset + scaled);
        }
    }
    row
}

/// Betweenness along each target's angular predecessor chain
pub(crate) fn simplest_betweenness(
    network: &NetworkStructure,
    tree: &SimplestTree,
    thresholds: &[Threshold],
    node_increments: &mut Vec<Increment>,
) {
    for &target in &tree.order {
        if !counts_pair(network, tree.source, target) {
            continue;
        }
        let d = tree.dist[target];
        let via = tree.path_nodes(network, target);
        if via.is_empty() {
            continue;
        }
        for (t, th) in thresholds.iter().enumerate() {
            if d > th.distance {
                continue;
            }
            let decay = (-th.beta * d).exp();
            for &v in &via {
                node_increments.push(Increment { entity: v, metric: 0, threshold: t, value: 1.0 });
                node_increments.push(Increment { entity: v, metric: 1, threshold: t, value: decay });
            }
        }
    }
}
