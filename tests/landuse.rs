//! Land-use accessibility against an all-pairs brute force

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use streetnet::config::{beta_from_distance, MIN_THRESHOLD_WEIGHT};
use streetnet::landuse::diversity;
use streetnet::{
    compute_landuses, AssignConfig, CentralityConfig, DataLayer, DataRecord, EdgeRecord, GraphConfig, LanduseConfig,
    NetworkStructure, NodeRecord,
};

const SPACING: f64 = 10.0;
const SIDE: usize = 5;
const CLASSES: [&str; 3] = ["shop", "cafe", "school"];

struct Scenario {
    edges: Vec<(usize, usize)>,
    /// (edge, fraction along from the edge start, class)
    points: Vec<(usize, f64, usize)>,
}

fn coord(n: usize) -> (f64, f64) {
    ((n / SIDE) as f64 * SPACING, (n % SIDE) as f64 * SPACING)
}

fn scenario(seed: u64) -> Scenario {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut edges = Vec::new();
    for i in 0..SIDE {
        for j in 0..SIDE {
            let n = i * SIDE + j;
            if i + 1 < SIDE && rng.random_bool(0.8) {
                edges.push((n, n + SIDE));
            }
            if j + 1 < SIDE && rng.random_bool(0.8) {
                edges.push((n, n + 1));
            }
        }
    }
    let points = (0..60)
        .map(|_| {
            let e = rng.random_range(0..edges.len());
            // keep projections clear of the lattice nodes
            let t = rng.random_range(0.15..0.85);
            (e, t, rng.random_range(0..CLASSES.len()))
        })
        .collect();
    Scenario { edges, points }
}

fn build(s: &Scenario) -> Result<(NetworkStructure, DataLayer)> {
    let nodes: Vec<NodeRecord> = (0..SIDE * SIDE)
        .map(|n| {
            let (x, y) = coord(n);
            NodeRecord::new(format!("n{n}"), x, y)
        })
        .collect();
    let edges: Vec<EdgeRecord> = s
        .edges
        .iter()
        .enumerate()
        .map(|(k, &(a, b))| EdgeRecord::new(format!("e{k}"), format!("n{a}"), format!("n{b}")))
        .collect();
    let network = NetworkStructure::from_records(&nodes, &edges, &GraphConfig::default())?;

    let records: Vec<DataRecord> = s
        .points
        .iter()
        .enumerate()
        .map(|(i, &(e, t, class))| {
            let (a, b) = s.edges[e];
            let (ax, ay) = coord(a);
            let (bx, by) = coord(b);
            // small perpendicular offset off the street
            let (dx, dy) = ((bx - ax) / SPACING, (by - ay) / SPACING);
            let x = ax + t * (bx - ax) - dy * 0.5;
            let y = ay + t * (by - ay) + dx * 0.5;
            DataRecord::new(format!("p{i}"), x, y, CLASSES[class])
        })
        .collect();
    let mut layer = DataLayer::from_records(&records)?;
    let report = layer.assign_to_network(&network, &AssignConfig::default())?;
    assert!(report.unassigned.is_empty());
    Ok((network, layer))
}

fn floyd_warshall(s: &Scenario) -> Vec<Vec<f64>> {
    let n = SIDE * SIDE;
    let mut d = vec![vec![f64::INFINITY; n]; n];
    for (i, row) in d.iter_mut().enumerate() {
        row[i] = 0.0;
    }
    for &(a, b) in &s.edges {
        d[a][b] = SPACING;
        d[b][a] = SPACING;
    }
    for k in 0..n {
        for i in 0..n {
            for j in 0..n {
                let via = d[i][k] + d[k][j];
                if via < d[i][j] {
                    d[i][j] = via;
                }
            }
        }
    }
    d
}

fn close(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() <= 1e-9 * actual.abs().max(expected.abs()).max(1.0)
}

#[test]
fn accessibility_matches_brute_force() -> Result<()> {
    for seed in [5, 23] {
        let s = scenario(seed);
        let (network, layer) = build(&s)?;
        let centrality = CentralityConfig {
            distance_thresholds: vec![20.0, 40.0],
            ..Default::default()
        };
        let config = LanduseConfig {
            qs: vec![0.0, 1.0],
            mixed_use_metrics: vec!["hill".into(), "shannon".into()],
            accessibility_labels: CLASSES.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        };
        let result = compute_landuses(&network, &layer, &centrality, &config)?;
        let d = floyd_warshall(&s);

        for distance in [20.0, 40.0] {
            let beta = beta_from_distance(distance, MIN_THRESHOLD_WEIGHT);
            for node in 0..SIDE * SIDE {
                let mut counts = [0.0; 3];
                let mut weighted = [0.0; 3];
                for &(e, t, class) in &s.points {
                    let (a, b) = s.edges[e];
                    let reach = (d[node][a] + t * SPACING).min(d[node][b] + (1.0 - t) * SPACING);
                    if reach <= distance {
                        counts[class] += 1.0;
                        weighted[class] += (-beta * reach).exp();
                    }
                }

                let id = format!("n{node}");
                for (c, label) in CLASSES.iter().enumerate() {
                    let nw = result.get(&id, distance, &format!("ac_{label}_nw")).unwrap_or(f64::NAN);
                    let wt = result.get(&id, distance, &format!("ac_{label}_wt")).unwrap_or(f64::NAN);
                    assert_eq!(nw, counts[c], "seed {seed} {id} {label}@{distance}");
                    assert!(close(wt, weighted[c]), "seed {seed} {id} {label}@{distance}: {wt} vs {}", weighted[c]);
                }

                // class codes follow first appearance in the data
                let ordered: Vec<f64> = layer
                    .classes()
                    .iter()
                    .map(|c| counts[CLASSES.iter().position(|k| *k == c.as_str()).unwrap_or(0)])
                    .collect();
                let richness = ordered.iter().filter(|&&c| c > 0.0).count() as f64;
                assert_eq!(result.get(&id, distance, "hill_q0"), Some(richness));
                let shannon = result.get(&id, distance, "shannon").unwrap_or(f64::NAN);
                assert!(close(shannon, diversity::shannon(&ordered)));
                let hill1 = result.get(&id, distance, "hill_q1").unwrap_or(f64::NAN);
                assert!(close(hill1, shannon.exp()) || richness == 0.0);
            }
        }
    }
    Ok(())
}

#[test]
fn landuse_table_exports() -> Result<()> {
    let s = scenario(1);
    let (network, layer) = build(&s)?;
    let config = LanduseConfig {
        mixed_use_metrics: vec!["gini_simpson".into()],
        accessibility_labels: vec!["shop".into()],
        ..Default::default()
    };
    let result = compute_landuses(&network, &layer, &CentralityConfig::default(), &config)?;
    let batch = streetnet::export::to_record_batch(&result)?;
    assert_eq!(batch.num_rows(), SIDE * SIDE * 2);
    assert_eq!(batch.schema().field(3).name(), "gini_simpson");
    assert_eq!(batch.schema().field(4).name(), "ac_shop_nw");
    Ok(())
}
