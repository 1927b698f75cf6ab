//! Street network cleaning and localized centrality
//!
//! Graphs arrive as node and edge records, are cleaned into a simplified
//! pedestrian network, and are then analysed node by node within moving
//! distance windows:
//!
//! ```no_run
//! use streetnet::{clean, compute_centrality, AnalysisConfig, EdgeRecord, NodeRecord};
//!
//! # fn main() -> streetnet::Result<()> {
//! let nodes = vec![NodeRecord::new("a", 0.0, 0.0), NodeRecord::new("b", 100.0, 0.0)];
//! let edges = vec![EdgeRecord::new("ab", "a", "b")];
//! let config = AnalysisConfig::default();
//! let (network, _reports) = clean::Pipeline::run(nodes, edges, &config)?;
//! let result = compute_centrality(&network, &config.centrality)?;
//! println!("{:?}", result.nodes.get("a", 400.0, "node_density"));
//! # Ok(())
//! # }
//! ```

pub mod centrality;
pub mod clean;
pub mod config;
pub mod data;
pub mod decompose;
pub mod error;
pub mod export;
pub mod geom;
pub mod graph;
pub mod landuse;
pub mod logging;
pub mod results;
pub mod spatial;

pub use centrality::{compute_centrality, CentralityResult};
pub use config::{
    AnalysisConfig, AssignConfig, CentralityConfig, CleanConfig, DecomposeConfig, GraphConfig, LanduseConfig,
    PathMode,
};
pub use data::{DataLayer, DataRecord};
pub use error::{NetworkError, Result};
pub use graph::{EdgeRecord, NetworkStructure, NodeRecord};
pub use landuse::compute_landuses;
pub use results::{EntityKind, MetricResult};
