//! Split edges where they pass alongside a node on a parallel street

use rayon::prelude::*;

use crate::config::CleanConfig;
use crate::error::Result;
use crate::geom;
use crate::graph::{Edge, EdgeIdx, NetworkStructure, Node, NodeIdx};
use crate::spatial::EdgeIndex;

/// A projected split point on an edge
#[derive(Debug, Clone, Copy, PartialEq)]
struct SplitPoint {
    edge: EdgeIdx,
    along: f64,
}

/// Insert a degree-2 node wherever an edge passes within `buffer_dist` of a
/// node whose own street runs roughly parallel to it
///
/// Split positions are all computed against the unmodified network. Each
/// edge is then cut at its points in along-edge order. New nodes are named
/// `{edge}:{i}` and are live when both edge ends are live.
pub fn split_opposing_geoms(network: &NetworkStructure, config: &CleanConfig) -> Result<NetworkStructure> {
    config.validate()?;
    let index = EdgeIndex::build(network);
    let tol = network.tolerance().max(1e-6);

    let nodes: Vec<NodeIdx> = network.node_indices().collect();
    let mut points: Vec<SplitPoint> = nodes
        .par_iter()
        .flat_map_iter(|&n| opposing_points(network, &index, n, config, tol))
        .collect();
    points.sort_by(|a, b| a.edge.cmp(&b.edge).then(a.along.total_cmp(&b.along)));

    let mut net = network.clone();
    let mut created = 0usize;
    let mut i = 0;
    while i < points.len() {
        let edge = points[i].edge;
        let mut cuts: Vec<f64> = Vec::new();
        while i < points.len() && points[i].edge == edge {
            let along = points[i].along;
            if cuts.last().map_or(true, |&last| along - last > tol) {
                cuts.push(along);
            }
            i += 1;
        }
        created += split_edge(&mut net, edge, &cuts)?;
    }

    tracing::debug!(created, nodes = net.node_count(), "opposing geometries split");
    Ok(net)
}

fn opposing_points(
    network: &NetworkStructure,
    index: &EdgeIndex,
    n: NodeIdx,
    config: &CleanConfig,
    tol: f64,
) -> Vec<SplitPoint> {
    let Some(node) = network.node(n) else {
        return Vec::new();
    };
    let own = network.incident_edges(n);
    let departures: Vec<f64> = own
        .iter()
        .filter_map(|&e| network.edge(e))
        .filter(|e| !e.is_loop())
        .map(|e| e.bearings_from(n).0)
        .collect();
    if departures.is_empty() {
        return Vec::new();
    }

    index
        .within(node.coord, config.buffer_dist)
        .into_iter()
        .filter(|(e, _)| !own.contains(e))
        .filter_map(|(e, _)| {
            let edge = network.edge(e)?;
            let proj = geom::project(&edge.geom, node.coord)?;
            if proj.along <= tol || proj.along >= edge.length - tol {
                return None;
            }
            let heading = heading_at(edge, proj.along);
            let parallel = departures
                .iter()
                .any(|&d| axis_deviation(d, heading) <= config.opposing_angle_tolerance);
            parallel.then_some(SplitPoint { edge: e, along: proj.along })
        })
        .collect()
}

/// Heading of the geometry segment containing `along`
fn heading_at(edge: &Edge, along: f64) -> f64 {
    let offsets = geom::vertex_offsets(&edge.geom);
    let seg = offsets
        .windows(2)
        .position(|w| along <= w[1] && w[1] > w[0])
        .unwrap_or(0);
    let coords = &edge.geom.0;
    match (coords.get(seg), coords.get(seg + 1)) {
        (Some(&a), Some(&b)) => geom::bearing(a, b),
        _ => edge.in_bearing,
    }
}

/// Angle between two headings treated as undirected axes, in [0, 90]
fn axis_deviation(a: f64, b: f64) -> f64 {
    let turn = geom::turn_angle(a, b);
    turn.min(180.0 - turn)
}

/// Replace `edge` by the chain of pieces between `cuts`; returns new node count
fn split_edge(net: &mut NetworkStructure, edge: EdgeIdx, cuts: &[f64]) -> Result<usize> {
    if cuts.is_empty() {
        return Ok(0);
    }
    let Some(original) = net.remove_edge(edge) else {
        return Ok(0);
    };
    let live = [original.start, original.end]
        .iter()
        .all(|&n| net.node(n).is_some_and(|node| node.live));

    let mut prev_node = original.start;
    let mut prev_along = 0.0;
    for (i, &along) in cuts.iter().enumerate() {
        let at = geom::interpolate(&original.geom, along);
        let node = net.add_node(Node::new(format!("{}:{i}", original.id), at, live))?;
        let piece = geom::substring(&original.geom, prev_along, along);
        net.add_edge(prev_node, node, piece, original.imp_factor)?;
        prev_node = node;
        prev_along = along;
    }
    let tail = geom::substring(&original.geom, prev_along, original.length);
    net.add_edge(prev_node, original.end, tail, original.imp_factor)?;
    Ok(cuts.len())
}
