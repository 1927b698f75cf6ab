//! Graph cleaning pipeline
//!
//! Raw records pass through a fixed sequence of stages:
//!
//! ```text
//! Raw -> GeometryInferred -> FillerRemoved -> Despined
//!     -> (Consolidated <-> OpposingSplit)* -> [Decomposed] -> Ready
//! ```
//!
//! Each step consumes the pipeline and returns it at the next stage, so a
//! caller never observes a partially cleaned network.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{AnalysisConfig, CleanConfig, DecomposeConfig, GraphConfig};
use crate::decompose::decompose;
use crate::error::{NetworkError, Result};
use crate::graph::{EdgeRecord, NetworkStructure, NodeIdx, NodeRecord};

pub mod consolidate;
pub mod dangling;
pub mod filler;
pub mod split;

pub use consolidate::consolidate_nodes;
pub use dangling::{components, remove_dangling_nodes, remove_disconnected, ComponentReport};
pub use filler::remove_filler_nodes;
pub use split::split_opposing_geoms;

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Raw,
    GeometryInferred,
    FillerRemoved,
    Despined,
    Consolidated,
    OpposingSplit,
    Decomposed,
    Ready,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Raw => "Raw",
            Stage::GeometryInferred => "GeometryInferred",
            Stage::FillerRemoved => "FillerRemoved",
            Stage::Despined => "Despined",
            Stage::Consolidated => "Consolidated",
            Stage::OpposingSplit => "OpposingSplit",
            Stage::Decomposed => "Decomposed",
            Stage::Ready => "Ready",
        }
    }

    pub fn can_transition_to(&self, next: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, next),
            (Raw, GeometryInferred)
                | (GeometryInferred, FillerRemoved)
                | (FillerRemoved, Despined)
                | (Despined | Consolidated | OpposingSplit, Consolidated)
                | (Despined | Consolidated, OpposingSplit)
                | (Despined | Consolidated | OpposingSplit, Decomposed)
                | (Despined | Consolidated | OpposingSplit | Decomposed, Ready)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Ready)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Staged cleaning of one network
#[derive(Debug, Clone)]
pub struct Pipeline {
    stage: Stage,
    records: Option<(Vec<NodeRecord>, Vec<EdgeRecord>)>,
    network: NetworkStructure,
    graph_config: GraphConfig,
    clean_config: CleanConfig,
    reports: Vec<ComponentReport>,
}

impl Pipeline {
    pub fn new(
        nodes: Vec<NodeRecord>,
        edges: Vec<EdgeRecord>,
        graph_config: GraphConfig,
        clean_config: CleanConfig,
    ) -> Result<Self> {
        graph_config.validate()?;
        clean_config.validate()?;
        Ok(Self {
            stage: Stage::Raw,
            records: Some((nodes, edges)),
            network: NetworkStructure::new(&graph_config),
            graph_config,
            clean_config,
            reports: Vec::new(),
        })
    }

    /// Start from an already built network, skipping geometry inference
    pub fn from_network(network: NetworkStructure, clean_config: CleanConfig) -> Result<Self> {
        clean_config.validate()?;
        network.validate()?;
        let graph_config = GraphConfig {
            endpoint_tolerance: network.tolerance(),
            ..Default::default()
        };
        Ok(Self {
            stage: Stage::GeometryInferred,
            records: None,
            network,
            graph_config,
            clean_config,
            reports: Vec::new(),
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn network(&self) -> &NetworkStructure {
        &self.network
    }

    /// Components reported so far as below the configured size
    pub fn reports(&self) -> &[ComponentReport] {
        &self.reports
    }

    pub fn components(&self) -> Vec<Vec<NodeIdx>> {
        components(&self.network)
    }

    fn advance(mut self, next: Stage, network: NetworkStructure) -> Self {
        tracing::info!(
            from = %self.stage,
            to = %next,
            nodes = network.node_count(),
            edges = network.edge_count(),
            "pipeline stage complete"
        );
        self.stage = next;
        self.network = network;
        self
    }

    fn check(&self, next: Stage) -> Result<()> {
        if self.stage.can_transition_to(next) {
            Ok(())
        } else {
            Err(NetworkError::InvalidStateTransition {
                from: self.stage.to_string(),
                to: next.to_string(),
            })
        }
    }

    pub fn infer_geometry(mut self) -> Result<Self> {
        self.check(Stage::GeometryInferred)?;
        let (nodes, edges) = self.records.take().unwrap_or_default();
        let network = NetworkStructure::from_records(&nodes, &edges, &self.graph_config)?;
        Ok(self.advance(Stage::GeometryInferred, network))
    }

    pub fn remove_filler_nodes(self) -> Result<Self> {
        self.check(Stage::FillerRemoved)?;
        let network = remove_filler_nodes(&self.network, self.clean_config.angular_tolerance)?;
        Ok(self.advance(Stage::FillerRemoved, network))
    }

    /// Prune short dead ends, then handle undersized components
    pub fn despine(mut self) -> Result<Self> {
        self.check(Stage::Despined)?;
        let cfg = &self.clean_config;
        let pruned = remove_dangling_nodes(&self.network, cfg.despine);
        let (pruned, reports) =
            remove_disconnected(&pruned, cfg.min_component_nodes, cfg.remove_disconnected);
        let network = remove_filler_nodes(&pruned, cfg.angular_tolerance)?;
        self.reports.extend(reports);
        Ok(self.advance(Stage::Despined, network))
    }

    pub fn consolidate(self) -> Result<Self> {
        let config = self.clean_config.clone();
        self.consolidate_with(&config)
    }

    /// Consolidate with one-off parameters, e.g. a wider final pass
    pub fn consolidate_with(self, config: &CleanConfig) -> Result<Self> {
        self.check(Stage::Consolidated)?;
        let merged = consolidate_nodes(&self.network, config)?;
        let network = remove_filler_nodes(&merged, config.angular_tolerance)?;
        Ok(self.advance(Stage::Consolidated, network))
    }

    pub fn split_opposing(self) -> Result<Self> {
        self.check(Stage::OpposingSplit)?;
        let network = split_opposing_geoms(&self.network, &self.clean_config)?;
        Ok(self.advance(Stage::OpposingSplit, network))
    }

    pub fn decompose(self, config: &DecomposeConfig) -> Result<Self> {
        self.check(Stage::Decomposed)?;
        let network = decompose(&self.network, config)?;
        Ok(self.advance(Stage::Decomposed, network))
    }

    /// Compact and validate the final network
    pub fn finish(self) -> Result<NetworkStructure> {
        self.check(Stage::Ready)?;
        let network = self.network.compacted()?;
        network.validate()?;
        tracing::info!(
            nodes = network.node_count(),
            edges = network.edge_count(),
            disconnected = self.reports.len(),
            "network ready"
        );
        Ok(network)
    }

    /// Run every stage with the parameters in `config`
    ///
    /// Consolidation runs twice around the opposing-geometry split so that
    /// parallel carriageways collapse onto a single street.
    pub fn run(
        nodes: Vec<NodeRecord>,
        edges: Vec<EdgeRecord>,
        config: &AnalysisConfig,
    ) -> Result<(NetworkStructure, Vec<ComponentReport>)> {
        config.validate()?;
        let mut pipeline = Self::new(nodes, edges, config.graph.clone(), config.clean.clone())?
            .infer_geometry()?
            .remove_filler_nodes()?
            .despine()?
            .consolidate()?
            .split_opposing()?
            .consolidate()?;
        if let Some(decompose) = &config.decompose {
            pipeline = pipeline.decompose(decompose)?;
        }
        let reports = pipeline.reports.clone();
        Ok((pipeline.finish()?, reports))
    }
}
