//! R-tree indices over network nodes and edge geometries

use geo::{Coord, LineString};
use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::geom;
use crate::graph::{EdgeIdx, NetworkStructure, NodeIdx};

/// Node coordinate with its arena index
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IndexedNode {
    pub coords: [f64; 2],
    pub node: NodeIdx,
}

impl RTreeObject for IndexedNode {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.coords)
    }
}

impl PointDistance for IndexedNode {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.coords[0] - point[0];
        let dy = self.coords[1] - point[1];
        dx * dx + dy * dy
    }

    fn contains_point(&self, point: &[f64; 2]) -> bool {
        self.coords == *point
    }
}

pub struct NodeIndex {
    tree: RTree<IndexedNode>,
}

impl NodeIndex {
    pub fn build(network: &NetworkStructure) -> Self {
        let points = network
            .nodes()
            .map(|(idx, n)| IndexedNode {
                coords: [n.coord.x, n.coord.y],
                node: idx,
            })
            .collect();
        Self {
            tree: RTree::bulk_load(points),
        }
    }

    /// Nodes within `radius` (inclusive), sorted by index
    pub fn within(&self, at: Coord<f64>, radius: f64) -> Vec<NodeIdx> {
        let mut found: Vec<NodeIdx> = self
            .tree
            .locate_within_distance([at.x, at.y], radius * radius)
            .map(|p| p.node)
            .collect();
        found.sort_unstable();
        found
    }

    /// Nearest node, optionally bounded by `max_dist`
    pub fn nearest(&self, at: Coord<f64>, max_dist: Option<f64>) -> Option<(NodeIdx, f64)> {
        let query = [at.x, at.y];
        let p = self.tree.nearest_neighbor_iter(&query).next()?;
        let d = p.distance_2(&query).sqrt();
        match max_dist {
            Some(max) if d > max => None,
            _ => Some((p.node, d)),
        }
    }
}

/// Edge geometry with its arena index
#[derive(Clone, Debug)]
pub struct IndexedEdge {
    pub edge: EdgeIdx,
    pub geom: LineString<f64>,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedEdge {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl PointDistance for IndexedEdge {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        match geom::project(&self.geom, Coord { x: point[0], y: point[1] }) {
            Some(proj) => proj.offset * proj.offset,
            None => f64::INFINITY,
        }
    }
}

pub struct EdgeIndex {
    tree: RTree<IndexedEdge>,
}

impl EdgeIndex {
    pub fn build(network: &NetworkStructure) -> Self {
        let items = network
            .edges()
            .map(|(idx, e)| {
                let corners: Vec<[f64; 2]> = e.geom.0.iter().map(|c| [c.x, c.y]).collect();
                IndexedEdge {
                    edge: idx,
                    geom: e.geom.clone(),
                    envelope: AABB::from_points(corners.iter()),
                }
            })
            .collect();
        Self {
            tree: RTree::bulk_load(items),
        }
    }

    /// Edges whose geometry lies within `radius` of `at`, with distances,
    /// ordered by distance then edge index
    pub fn within(&self, at: Coord<f64>, radius: f64) -> Vec<(EdgeIdx, f64)> {
        let mut found: Vec<(EdgeIdx, f64)> = self
            .tree
            .locate_within_distance([at.x, at.y], radius * radius)
            .map(|e| (e.edge, e.distance_2(&[at.x, at.y]).sqrt()))
            .collect();
        found.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        found
    }

    /// Nearest edge by perpendicular distance within `max_dist`
    pub fn nearest(&self, at: Coord<f64>, max_dist: f64) -> Option<(EdgeIdx, f64)> {
        self.within(at, max_dist).into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::square;

    #[test]
    fn test_node_radius_inclusive() {
        let net = square();
        let index = NodeIndex::build(&net);
        let found = index.within(Coord { x: 0.0, y: 0.0 }, 1.0);
        assert_eq!(found.len(), 3);
        let (nearest, d) = index.nearest(Coord { x: 0.9, y: 0.1 }, None).unwrap();
        assert_eq!(nearest, net.node_index("b").unwrap());
        assert!((d - 0.1414213562373095).abs() < 1e-12);
        assert!(index.nearest(Coord { x: 5.0, y: 5.0 }, Some(1.0)).is_none());
    }

    #[test]
    fn test_nearest_edge_by_perpendicular() {
        let net = square();
        let index = EdgeIndex::build(&net);
        // closer to edge bc than to any node
        let (edge, d) = index.nearest(Coord { x: 1.2, y: 0.5 }, 1.0).unwrap();
        assert_eq!(edge, net.edge_index("bc").unwrap());
        assert!((d - 0.2).abs() < 1e-12);
        assert!(index.nearest(Coord { x: 3.0, y: 0.5 }, 1.0).is_none());
    }
}
