//! Segment metrics: edges as the unit of accumulation
//!
//! Every edge touching a reached node is split at the point equidistant from
//! the source via either end. Each end covers `[d_end, min(mid, D)]` of the
//! distance axis, and the metrics integrate over that covered range.

use rustc_hash::FxHashSet;

use crate::config::Threshold;
use crate::graph::NetworkStructure;

use super::node::Increment;
use super::tree::ShortestTree;

pub const SEGMENT_DENSITY: &str = "segment_density";
pub const SEGMENT_HARMONIC: &str = "segment_harmonic";
pub const SEGMENT_BETA: &str = "segment_beta";
pub const SEGMENT_BETWEENNESS: &str = "segment_betweenness";
pub const SEGMENT_BETWEENNESS_BETA: &str = "segment_betweenness_beta";

pub const SEGMENT_CLOSENESS: [&str; 3] = [SEGMENT_DENSITY, SEGMENT_HARMONIC, SEGMENT_BETA];
pub const SEGMENT_BETWEENNESS_METRICS: [&str; 2] = [SEGMENT_BETWEENNESS, SEGMENT_BETWEENNESS_BETA];

/// ∫ 1/max(x, 1) dx over [x0, x1]
fn harmonic_integral(x0: f64, x1: f64) -> f64 {
    if x1 <= 1.0 {
        x1 - x0
    } else if x0 >= 1.0 {
        (x1 / x0).ln()
    } else {
        (1.0 - x0) + x1.ln()
    }
}

/// ∫ exp(-βx) dx over [x0, x1]
fn beta_integral(beta: f64, x0: f64, x1: f64) -> f64 {
    ((-beta * x0).exp() - (-beta * x1).exp()) / beta
}

/// Covered distance ranges of every edge in the source's window
pub(crate) fn segment_closeness(
    network: &NetworkStructure,
    tree: &ShortestTree,
    thresholds: &[Threshold],
) -> Vec<Increment> {
    let mut out = Vec::new();
    let mut seen = FxHashSet::default();

    for &node in &tree.order {
        for &e in network.incident_edges(node) {
            if !seen.insert(e) {
                continue;
            }
            let Some(edge) = network.edge(e) else { continue };
            let cost = edge.cost();
            let da = tree.dist[edge.start];
            let db = tree.dist[edge.end];

            for (t, th) in thresholds.iter().enumerate() {
                for (near, far) in [(da, db), (db, da)] {
                    if !near.is_finite() || near > th.distance {
                        continue;
                    }
                    let mid = if far.is_finite() {
                        (cost + near + far) / 2.0
                    } else {
                        near + cost
                    };
                    let x0 = near;
                    let x1 = mid.min(th.distance);
                    if x1 <= x0 {
                        continue;
                    }
                    out.push(Increment { entity: e, metric: 0, threshold: t, value: x1 - x0 });
                    out.push(Increment { entity: e, metric: 1, threshold: t, value: harmonic_integral(x0, x1) });
                    out.push(Increment { entity: e, metric: 2, threshold: t, value: beta_integral(th.beta, x0, x1) });
                }
            }
        }
    }
    out
}
