//! Compact CSR adjacency for traversal
//!
//! Built from a `NetworkStructure` snapshot; self-loops are omitted since no
//! shortest or simplest path uses them.

use super::{EdgeIdx, NetworkStructure, NodeIdx};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Incidence {
    pub edge: EdgeIdx,
    pub neighbor: NodeIdx,
    /// Traversal follows the stored start -> end orientation
    pub forward: bool,
}

#[derive(Debug, Clone)]
pub struct Adjacency {
    pub offsets: Vec<usize>, // node_capacity + 1
    pub entries: Vec<Incidence>,
}

impl Adjacency {
    pub fn build(network: &NetworkStructure) -> Self {
        let n = network.node_capacity();
        let mut offsets = Vec::with_capacity(n + 1);
        let mut entries = Vec::with_capacity(network.edge_count() * 2);

        for node in 0..n {
            offsets.push(entries.len());
            let mut incident: Vec<EdgeIdx> = network.incident_edges(node).to_vec();
            incident.sort_unstable();
            incident.dedup();
            for e in incident {
                let Some(edge) = network.edge(e) else { continue };
                if edge.is_loop() {
                    continue;
                }
                entries.push(Incidence {
                    edge: e,
                    neighbor: edge.other(node),
                    forward: edge.start == node,
                });
            }
        }
        offsets.push(entries.len());

        Self { offsets, entries }
    }

    pub fn incident(&self, node: NodeIdx) -> &[Incidence] {
        match (self.offsets.get(node), self.offsets.get(node + 1)) {
            (Some(&start), Some(&end)) => &self.entries[start..end],
            _ => &[],
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }
}
