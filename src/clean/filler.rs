//! Filler node removal: collapse pass-through degree-2 nodes

use crate::error::{NetworkError, Result};
use crate::geom;
use crate::graph::{EdgeIdx, NetworkStructure, NodeIdx};

/// Weld away every degree-2 node that is not a real intersection
///
/// Nodes are visited in identifier order and the sweep repeats until a pass
/// makes no change, so the result is already filler-free. A node is kept when
/// it is marked `preserve`, when both its edges lead to the same neighbour,
/// or when its through-turn exceeds `angular_tolerance`.
pub fn remove_filler_nodes(
    network: &NetworkStructure,
    angular_tolerance: Option<f64>,
) -> Result<NetworkStructure> {
    let mut net = network.clone();
    let mut welded = 0usize;

    loop {
        let mut changed = false;
        for n in net.nodes_by_id() {
            let Some((e1, e2)) = filler_edges(&net, n, angular_tolerance) else {
                continue;
            };
            weld_through(&mut net, n, e1, e2)?;
            welded += 1;
            changed = true;
        }
        if !changed {
            break;
        }
    }

    tracing::debug!(welded, nodes = net.node_count(), "filler nodes removed");
    Ok(net)
}

/// The two edges to weld through `n`, when `n` is a filler node
fn filler_edges(
    net: &NetworkStructure,
    n: NodeIdx,
    angular_tolerance: Option<f64>,
) -> Option<(EdgeIdx, EdgeIdx)> {
    let node = net.node(n)?;
    if node.preserve {
        return None;
    }
    let &[e1, e2] = net.incident_edges(n) else {
        return None;
    };
    if e1 == e2 {
        return None;
    }
    let (edge1, edge2) = (net.edge(e1)?, net.edge(e2)?);
    if edge1.is_loop() || edge2.is_loop() {
        return None;
    }
    let (nb1, nb2) = (edge1.other(n), edge2.other(n));
    if nb1 == nb2 {
        return None;
    }
    if let Some(tol) = angular_tolerance {
        let (_, arrive) = edge1.bearings_from(nb1);
        let (depart, _) = edge2.bearings_from(n);
        if geom::turn_angle(arrive, depart) > tol {
            return None;
        }
    }
    Some((e1, e2))
}

fn weld_through(net: &mut NetworkStructure, n: NodeIdx, e1: EdgeIdx, e2: EdgeIdx) -> Result<()> {
    let (Some(node), Some(edge1), Some(edge2)) = (net.node(n), net.edge(e1), net.edge(e2)) else {
        return Err(NetworkError::structural(format!("#{n}"), "filler node lost its edges"));
    };
    let nb1 = edge1.other(n);
    let nb2 = edge2.other(n);
    let into = edge1.geom_from(nb1);
    let out = edge2.geom_from(n);

    let tol = net.tolerance();
    let meets = |c: Option<&geo::Coord<f64>>| c.is_some_and(|&c| geom::coords_close(c, node.coord, tol));
    if !meets(into.0.last()) || !meets(out.0.first()) {
        return Err(NetworkError::structural(
            &node.id,
            format!("edges '{}' and '{}' do not meet at the node", edge1.id, edge2.id),
        ));
    }

    let geom = geom::weld(&into, &out);
    let total = edge1.length + edge2.length;
    let imp_factor = if total > 0.0 {
        (edge1.length * edge1.imp_factor + edge2.length * edge2.imp_factor) / total
    } else {
        (edge1.imp_factor + edge2.imp_factor) / 2.0
    };
    tracing::trace!(node = %node.id, "welding filler node");

    net.remove_node(n);
    net.add_edge(nb1, nb2, geom, imp_factor)?;
    Ok(())
}
