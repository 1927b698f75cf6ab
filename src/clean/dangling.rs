//! Dead-end pruning and disconnected component handling

use serde::Serialize;
use std::collections::VecDeque;

use crate::error::NetworkError;
use crate::graph::{EdgeIdx, NetworkStructure, NodeIdx};

/// Remove dead-end chains shorter than `despine`
///
/// From every degree-1 tip the chain is followed through degree-2 nodes back
/// to the first junction. When the chain is shorter than `despine` its nodes
/// are removed. The sweep repeats because a removal can leave a new tip.
/// Chains that never reach a junction are isolated paths and are left to
/// component handling.
pub fn remove_dangling_nodes(network: &NetworkStructure, despine: f64) -> NetworkStructure {
    let mut net = network.clone();
    let mut removed = 0usize;
    if despine <= 0.0 {
        return net;
    }

    loop {
        let mut changed = false;
        for tip in net.nodes_by_id() {
            if net.node(tip).is_none() || net.degree(tip) != 1 {
                continue;
            }
            let Some(chain) = spine_from(&net, tip, despine) else {
                continue;
            };
            for n in chain {
                net.remove_node(n);
                removed += 1;
            }
            changed = true;
        }
        if !changed {
            break;
        }
    }

    tracing::debug!(removed, nodes = net.node_count(), "dangling nodes removed");
    net
}

/// Nodes of the dead-end chain starting at `tip`, when shorter than `despine`
fn spine_from(net: &NetworkStructure, tip: NodeIdx, despine: f64) -> Option<Vec<NodeIdx>> {
    let mut chain = vec![tip];
    let mut via: EdgeIdx = *net.incident_edges(tip).first()?;
    let mut total = 0.0;
    let mut current = tip;

    loop {
        let edge = net.edge(via)?;
        if edge.is_loop() {
            return None;
        }
        total += edge.length;
        if total >= despine {
            return None;
        }
        current = edge.other(current);
        match net.degree(current) {
            2 => {
                if chain.contains(&current) {
                    return None;
                }
                let next = net
                    .incident_edges(current)
                    .iter()
                    .copied()
                    .find(|&e| e != via)?;
                chain.push(current);
                via = next;
            }
            d if d >= 3 => return Some(chain),
            _ => return None,
        }
    }
}

/// Connected components as node lists
///
/// Components are discovered from seeds in identifier order and nodes within
/// a component are listed in discovery order.
pub fn components(network: &NetworkStructure) -> Vec<Vec<NodeIdx>> {
    let mut seen = vec![false; network.node_capacity()];
    let mut out = Vec::new();
    for seed in network.nodes_by_id() {
        if seen[seed] {
            continue;
        }
        seen[seed] = true;
        let mut component = Vec::new();
        let mut queue = VecDeque::from([seed]);
        while let Some(n) = queue.pop_front() {
            component.push(n);
            for m in network.neighbors(n) {
                if !seen[m] {
                    seen[m] = true;
                    queue.push_back(m);
                }
            }
        }
        out.push(component);
    }
    out
}

/// A component smaller than the configured node count
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentReport {
    /// Identifier of the first node discovered
    pub first: String,
    pub nodes: Vec<String>,
    pub size: usize,
    pub removed: bool,
}

impl ComponentReport {
    pub fn to_error(&self) -> NetworkError {
        NetworkError::DisconnectedComponent {
            first: self.first.clone(),
            size: self.size,
        }
    }
}

/// Report components below `min_nodes`, removing them when `remove` is set
///
/// The largest component is never reported; ties go to the component found
/// first.
pub fn remove_disconnected(
    network: &NetworkStructure,
    min_nodes: usize,
    remove: bool,
) -> (NetworkStructure, Vec<ComponentReport>) {
    let mut net = network.clone();
    let comps = components(network);
    let largest = comps
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, usize)>, (i, c)| match best {
            Some((_, size)) if size >= c.len() => best,
            _ => Some((i, c.len())),
        })
        .map(|(i, _)| i);

    let mut reports = Vec::new();
    for (i, comp) in comps.iter().enumerate() {
        if Some(i) == largest || comp.len() >= min_nodes {
            continue;
        }
        let nodes: Vec<String> = comp
            .iter()
            .filter_map(|&n| network.node(n).map(|node| node.id.clone()))
            .collect();
        let report = ComponentReport {
            first: nodes.first().cloned().unwrap_or_default(),
            size: nodes.len(),
            nodes,
            removed: remove,
        };
        tracing::warn!(first = %report.first, size = report.size, removed = remove, "disconnected component");
        if remove {
            for &n in comp {
                net.remove_node(n);
            }
        }
        reports.push(report);
    }

    tracing::debug!(
        components = comps.len(),
        reported = reports.len(),
        "component scan complete"
    );
    (net, reports)
}
