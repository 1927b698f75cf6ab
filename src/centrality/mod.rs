//! Localized centrality over moving distance windows
//!
//! Every live node runs one bounded expansion out to the largest threshold;
//! smaller thresholds are read off the same tree. Sources are processed in
//! parallel chunks and folded into the result tables in node order, so the
//! floating-point sums do not depend on thread scheduling.

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::{CentralityConfig, PathMode, Threshold};
use crate::error::{NetworkError, Result};
use crate::graph::{NetworkStructure, NodeIdx};
use crate::results::{EntityKind, MetricResult};

pub mod node;
pub mod segment;
pub mod tree;

use node::{Increment, SourceOutput};
pub use tree::{Pred, ShortestTree, SimplestTree};

/// Sources per parallel batch
const CHUNK_SIZE: usize = 512;

#[derive(Debug, Clone, PartialEq)]
pub struct CentralityResult {
    /// Node-keyed metrics
    pub nodes: MetricResult,
    /// Edge-keyed metrics, present when segment metrics were requested
    pub segments: Option<MetricResult>,
}

/// Which metric blocks one run produces
struct Plan<'a> {
    thresholds: Vec<Threshold>,
    mode: PathMode,
    closeness: &'a [&'static str],
    betweenness: &'a [&'static str],
    segment: bool,
    angular_unit: f64,
    farness_offset: f64,
}

impl Plan<'_> {
    fn node_metrics(&self) -> Vec<String> {
        self.closeness
            .iter()
            .chain(self.betweenness)
            .map(|m| m.to_string())
            .collect()
    }

    fn segment_metrics(&self) -> Vec<String> {
        let closeness = if self.closeness.is_empty() { &[][..] } else { &segment::SEGMENT_CLOSENESS[..] };
        let betweenness = if self.betweenness.is_empty() {
            &[][..]
        } else {
            &segment::SEGMENT_BETWEENNESS_METRICS[..]
        };
        closeness.iter().chain(betweenness).map(|m| m.to_string()).collect()
    }

    fn segment_offset(&self) -> usize {
        if self.closeness.is_empty() { 0 } else { segment::SEGMENT_CLOSENESS.len() }
    }

    fn max_distance(&self) -> f64 {
        self.thresholds.last().map_or(0.0, |t| t.distance)
    }
}

/// Compute node (and optionally segment) centrality for every live node
pub fn compute_centrality(network: &NetworkStructure, config: &CentralityConfig) -> Result<CentralityResult> {
    let thresholds = config.thresholds()?;
    if !config.closeness && !config.betweenness {
        return Err(NetworkError::config("neither closeness nor betweenness requested"));
    }
    if config.segment && config.path_mode == PathMode::Simplest {
        return Err(NetworkError::config("segment metrics are only defined for shortest paths"));
    }
    network.validate()?;

    let (closeness, betweenness): (&[&str], &[&str]) = match config.path_mode {
        PathMode::Shortest => (&node::SHORTEST_CLOSENESS, &node::SHORTEST_BETWEENNESS),
        PathMode::Simplest => (&node::SIMPLEST_CLOSENESS, &node::SIMPLEST_BETWEENNESS),
    };
    let plan = Plan {
        thresholds,
        mode: config.path_mode,
        closeness: if config.closeness { closeness } else { &[] },
        betweenness: if config.betweenness { betweenness } else { &[] },
        segment: config.segment,
        angular_unit: config.angular_scaling_unit,
        farness_offset: config.farness_scaling_offset,
    };
    let distances: Vec<f64> = plan.thresholds.iter().map(|t| t.distance).collect();

    let mut node_row = vec![usize::MAX; network.node_capacity()];
    let mut node_ids = Vec::with_capacity(network.node_count());
    for (i, (idx, node)) in network.nodes().enumerate() {
        node_row[idx] = i;
        node_ids.push(node.id.clone());
    }
    let mut nodes = MetricResult::new(EntityKind::Node, node_ids, distances.clone(), plan.node_metrics());
    // buffer nodes carry betweenness but never run as a source
    for (idx, node) in network.nodes() {
        if !node.live {
            nodes.mark_not_computed(node_row[idx], 0..plan.closeness.len());
        }
    }

    let mut edge_row = vec![usize::MAX; network.edge_capacity()];
    let mut segments = plan.segment.then(|| {
        let mut edge_ids = Vec::with_capacity(network.edge_count());
        for (i, (idx, edge)) in network.edges().enumerate() {
            edge_row[idx] = i;
            edge_ids.push(edge.id.clone());
        }
        MetricResult::new(EntityKind::Edge, edge_ids, distances, plan.segment_metrics())
    });

    let sources: Vec<NodeIdx> = network
        .nodes()
        .filter(|(_, n)| n.live)
        .map(|(idx, _)| idx)
        .collect();
    info!(
        sources = sources.len(),
        thresholds = plan.thresholds.len(),
        mode = ?plan.mode,
        segment = plan.segment,
        "computing centrality"
    );

    let t_len = plan.thresholds.len();
    let n_closeness = plan.closeness.len();
    let mut failed: Vec<(NodeIdx, String)> = Vec::new();

    for (chunk_no, chunk) in sources.chunks(CHUNK_SIZE).enumerate() {
        let outputs: Vec<SourceOutput> = chunk
            .par_iter()
            .map(|&source| process_source(network, &plan, source))
            .collect();

        for (&source, output) in chunk.iter().zip(outputs) {
            if let Some(reason) = output.failure {
                failed.push((source, reason));
                continue;
            }
            let row = node_row[source];
            for (slot, &value) in output.closeness.iter().enumerate() {
                nodes.set(slot / t_len, slot % t_len, row, value);
            }
            for inc in &output.node_increments {
                nodes.add(n_closeness + inc.metric, inc.threshold, node_row[inc.entity], inc.value);
            }
            if let Some(table) = segments.as_mut() {
                for inc in &output.edge_increments {
                    table.add(inc.metric, inc.threshold, edge_row[inc.entity], inc.value);
                }
            }
        }
        debug!(chunk = chunk_no, processed = chunk.len(), "centrality chunk reduced");
    }

    for (source, reason) in &failed {
        let id = network.node(*source).map_or("?", |n| n.id.as_str());
        warn!(node = id, reason = %reason, "centrality failed for node");
        nodes.mark_failed(node_row[*source], reason.clone());
    }
    info!(failed = failed.len(), "centrality complete");

    Ok(CentralityResult { nodes, segments })
}

/// One source's window: closeness row, betweenness and segment increments
fn process_source(network: &NetworkStructure, plan: &Plan<'_>, source: NodeIdx) -> SourceOutput {
    let weight = network.node(source).map_or(f64::NAN, |n| n.weight);
    if !weight.is_finite() {
        return SourceOutput::failed(format!("non-finite weight {weight}"));
    }

    let mut output = SourceOutput::default();
    let reached = match plan.mode {
        PathMode::Shortest => {
            let tree = ShortestTree::build(network, source, plan.max_distance());
            if let Some(reason) = non_finite_weight(network, &tree.order) {
                return SourceOutput::failed(reason);
            }
            if !plan.closeness.is_empty() {
                output.closeness = node::shortest_closeness(network, &tree, &plan.thresholds);
            }
            let mut edge_betweenness = Vec::new();
            if !plan.betweenness.is_empty() {
                node::shortest_betweenness(
                    network,
                    &tree,
                    &plan.thresholds,
                    &mut output.node_increments,
                    plan.segment.then_some(&mut edge_betweenness),
                );
            }
            if plan.segment {
                if !plan.closeness.is_empty() {
                    output.edge_increments = segment::segment_closeness(network, &tree, &plan.thresholds);
                }
                let offset = plan.segment_offset();
                output.edge_increments.extend(
                    edge_betweenness
                        .into_iter()
                        .map(|inc| Increment { metric: inc.metric + offset, ..inc }),
                );
            }
            tree.order.len()
        }
        PathMode::Simplest => {
            let tree = SimplestTree::build(network, source, plan.max_distance());
            if let Some(reason) = non_finite_weight(network, &tree.order) {
                return SourceOutput::failed(reason);
            }
            if !plan.closeness.is_empty() {
                output.closeness = node::simplest_closeness(
                    network,
                    &tree,
                    &plan.thresholds,
                    plan.angular_unit,
                    plan.farness_offset,
                );
            }
            if !plan.betweenness.is_empty() {
                node::simplest_betweenness(network, &tree, &plan.thresholds, &mut output.node_increments);
            }
            tree.order.len()
        }
    };

    if let Some(what) = output.non_finite() {
        return SourceOutput::failed(format!("non-finite {what} over {reached} reached nodes"));
    }
    output
}

fn non_finite_weight(network: &NetworkStructure, reached: &[NodeIdx]) -> Option<String> {
    reached.iter().find_map(|&idx| {
        let node = network.node(idx)?;
        (!node.weight.is_finite()).then(|| format!("reached node {} has non-finite weight", node.id))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{beta_from_distance, GraphConfig, MIN_THRESHOLD_WEIGHT};
    use crate::graph::tests::square;
    use crate::graph::{EdgeRecord, NodeRecord};

    fn config(distances: &[f64]) -> CentralityConfig {
        CentralityConfig {
            distance_thresholds: distances.to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn test_square_shortest_metrics() {
        let net = square();
        let result = compute_centrality(&net, &config(&[1.0, 2.0])).unwrap().nodes;
        for id in ["a", "b", "c", "d"] {
            // threshold windows are inclusive
            assert_eq!(result.get(id, 1.0, "node_density"), Some(2.0));
            assert_eq!(result.get(id, 2.0, "node_density"), Some(3.0));
            assert_eq!(result.get(id, 2.0, "node_cycles"), Some(1.0));
            assert_eq!(result.get(id, 2.0, "node_farness"), Some(4.0));
            let betweenness = result.get(id, 2.0, "node_betweenness").unwrap();
            assert!((betweenness - 0.5).abs() < 1e-12);
            assert_eq!(result.get(id, 1.0, "node_betweenness"), Some(0.0));
        }
        let beta: f64 = 4.0 / 2.0;
        let expected = 2.0 * (-beta).exp() + (-2.0 * beta).exp();
        assert!((result.get("a", 2.0, "node_beta").unwrap() - expected).abs() < 1e-9);
        assert!(result.failures().is_empty());
    }

    #[test]
    fn test_buffer_node_closeness_is_nan() {
        let mut net = square();
        let d = net.node_index("d").unwrap();
        net.set_live(d, false);
        let result = compute_centrality(&net, &config(&[2.0])).unwrap().nodes;
        assert!(result.get("d", 2.0, "node_density").unwrap().is_nan());
        assert!(result.get("d", 2.0, "node_harmonic").unwrap().is_nan());
        assert!(!result.is_failed("d"));
        assert_eq!(result.get("d", 2.0, "node_betweenness"), Some(0.5));
        assert_eq!(result.get("a", 2.0, "node_density"), Some(3.0));
    }

    #[test]
    fn test_square_simplest_metrics() {
        let net = square();
        let cfg = CentralityConfig {
            path_mode: PathMode::Simplest,
            ..config(&[10.0])
        };
        let result = compute_centrality(&net, &cfg).unwrap().nodes;
        for id in ["a", "b", "c", "d"] {
            let harmonic = result.get(id, 10.0, "node_harmonic_angular").unwrap();
            assert!((harmonic - (2.0 + 2.0 / 3.0)).abs() < 1e-12);
        }
        // each opposite pair routes through exactly one corner
        let total: f64 = result.column("node_betweenness_angular", 10.0).unwrap().iter().sum();
        assert!((total - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_no_shortcut_harmonic() {
        let net = tree::tests::no_shortcut();
        let cfg = CentralityConfig {
            path_mode: PathMode::Simplest,
            ..config(&[100.0])
        };
        let result = compute_centrality(&net, &cfg).unwrap().nodes;
        let expected = 1.0 / (1.0 + 50.0 / 180.0) + 1.0 / (1.0 + 60.0 / 180.0);
        let harmonic = result.get("S", 100.0, "node_harmonic_angular").unwrap();
        assert!((harmonic - expected).abs() < 1e-9);
    }

    #[test]
    fn test_segment_metrics() {
        let net = square();
        let cfg = CentralityConfig {
            segment: true,
            ..config(&[4.0])
        };
        let result = compute_centrality(&net, &cfg).unwrap();
        let segments = result.segments.unwrap();
        // every source covers the whole square once
        let density: f64 = segments.column("segment_density", 4.0).unwrap().iter().sum();
        assert!((density - 16.0).abs() < 1e-9);
        // one adjacent pair per edge, plus half of each opposite pair
        let beta = beta_from_distance(4.0, MIN_THRESHOLD_WEIGHT);
        let decayed = (-beta).exp() + (-2.0 * beta).exp();
        for id in ["ab", "bc", "cd", "da"] {
            assert_eq!(segments.get(id, 4.0, "segment_betweenness"), Some(2.0));
            let b = segments.get(id, 4.0, "segment_betweenness_beta").unwrap();
            assert!((b - decayed).abs() < 1e-12);
        }
        assert!((decayed - 0.503214724408055).abs() < 1e-12);
        assert_eq!(segments.metrics().len(), 5);
    }

    #[test]
    fn test_segment_rejects_simplest() {
        let cfg = CentralityConfig {
            segment: true,
            path_mode: PathMode::Simplest,
            ..config(&[4.0])
        };
        assert!(compute_centrality(&square(), &cfg).is_err());
    }

    #[test]
    fn test_failure_isolated_to_component() {
        let nodes = vec![
            NodeRecord::new("a", 0.0, 0.0),
            NodeRecord::new("b", 10.0, 0.0),
            NodeRecord::new("c", 20.0, 0.0),
            NodeRecord::new("x", 1000.0, 0.0),
            NodeRecord::new("y", 1010.0, 0.0),
        ];
        let edges = vec![
            EdgeRecord::new("ab", "a", "b"),
            EdgeRecord::new("bc", "b", "c"),
            EdgeRecord::new("xy", "x", "y"),
        ];
        let mut net = NetworkStructure::from_records(&nodes, &edges, &GraphConfig::default()).unwrap();
        let x = net.node_index("x").unwrap();
        net.set_weight(x, f64::NAN);

        let result = compute_centrality(&net, &config(&[50.0])).unwrap().nodes;
        assert!(result.is_failed("x"));
        assert!(result.is_failed("y"));
        assert!(result.get("x", 50.0, "node_density").unwrap().is_nan());
        assert_eq!(result.get("a", 50.0, "node_density"), Some(2.0));
        assert_eq!(result.get("b", 50.0, "node_betweenness"), Some(1.0));
        assert!(!result.is_failed("a"));
    }

    #[test]
    fn test_reduction_is_deterministic() {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for i in 0..6 {
            for j in 0..6 {
                nodes.push(NodeRecord::new(format!("{i}-{j}"), i as f64 * 10.0, j as f64 * 10.0 + (i * j) as f64 * 0.3));
                if i > 0 {
                    edges.push(EdgeRecord::new(format!("h{i}-{j}"), format!("{}-{j}", i - 1), format!("{i}-{j}")));
                }
                if j > 0 {
                    edges.push(EdgeRecord::new(format!("v{i}-{j}"), format!("{i}-{}", j - 1), format!("{i}-{j}")));
                }
            }
        }
        let net = NetworkStructure::from_records(&nodes, &edges, &GraphConfig::default()).unwrap();
        let cfg = CentralityConfig {
            segment: true,
            ..config(&[25.0, 60.0])
        };
        let single = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
        let many = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();
        let one = single.install(|| compute_centrality(&net, &cfg)).unwrap();
        let four = many.install(|| compute_centrality(&net, &cfg)).unwrap();
        assert_eq!(one, four);
    }
}
