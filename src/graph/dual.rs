//! Dual representation: streets become nodes, junction turns become edges

use crate::config::GraphConfig;
use crate::error::Result;
use crate::geom;

use super::{EdgeIdx, NetworkStructure, Node};

/// Build the dual graph
///
/// Each primal edge becomes a node at its midpoint, identified by the edge
/// identifier. Two dual nodes are joined for every primal node their edges
/// share; the joining geometry follows each half-edge through that node.
pub fn to_dual(primal: &NetworkStructure) -> Result<NetworkStructure> {
    let mut dual = NetworkStructure::new(&GraphConfig {
        endpoint_tolerance: primal.tolerance(),
        snap_endpoints: false,
    });

    let mut dual_idx = vec![usize::MAX; primal.edge_capacity()];
    for (e, edge) in primal.edges() {
        let mid = geom::interpolate(&edge.geom, edge.length / 2.0);
        let live = [edge.start, edge.end]
            .iter()
            .all(|&n| primal.node(n).is_some_and(|node| node.live));
        dual_idx[e] = dual.add_node(Node::new(&edge.id, mid, live))?;
    }

    for (n, node) in primal.nodes() {
        let mut incident: Vec<EdgeIdx> = primal
            .incident_edges(n)
            .iter()
            .copied()
            .filter(|&e| primal.edge(e).is_some_and(|edge| !edge.is_loop()))
            .collect();
        incident.sort_unstable();
        incident.dedup();

        for (i, &e1) in incident.iter().enumerate() {
            for &e2 in &incident[i + 1..] {
                let (Some(edge1), Some(edge2)) = (primal.edge(e1), primal.edge(e2)) else {
                    continue;
                };
                let half1 = geom::substring(&edge1.geom_from(n), 0.0, edge1.length / 2.0);
                let half2 = geom::substring(&edge2.geom_from(n), 0.0, edge2.length / 2.0);
                let geom = geom::weld(&geom::reversed(&half1), &half2);
                let id = format!("{}|{}|{}", edge1.id, node.id, edge2.id);
                dual.add_edge_with_id(&id, dual_idx[e1], dual_idx[e2], geom, 1.0)?;
            }
        }
    }

    tracing::debug!(
        primal_edges = primal.edge_count(),
        dual_edges = dual.edge_count(),
        "dual graph built"
    );
    Ok(dual)
}
