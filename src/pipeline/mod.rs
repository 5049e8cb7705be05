//! Layout analytics pipeline
//!
//! Five numbered stages run strictly forward, each reading its inputs from
//! the store and replacing its own output table:
//!
//! 1. [`transitions`]: movement events to a weighted transition graph
//! 2. [`communities`]: section communities by modularity
//! 3. [`affinity`]: product affinity clusters from synthesized baskets
//! 4. [`layout`]: product-to-section assignment and recommendations
//! 5. run record, written by the [`orchestrator`]

pub mod affinity;
pub mod communities;
pub mod layout;
pub mod orchestrator;
pub mod transitions;

pub use affinity::{cluster_products, ClusteringSummary, CooccurrenceMatrix};
pub use communities::{detect_section_communities, CommunitySummary};
pub use layout::{optimize_layout, LayoutSummary};
pub use orchestrator::{Pipeline, PipelineReport, PipelineState, StageTiming};
pub use transitions::{
    aggregate_transitions, build_transition_graph, graph_statistics, GraphStatistics,
    TransitionCounts, TransitionSummary,
};

use crate::model::SectionId;
use crate::persistence::StorageError;
use serde::{Deserialize, Serialize};
use shelfwise_graph_algorithms::NodeId;
use shelfwise_optimization::{AssignmentError, ClusteringError};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use thiserror::Error;

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Aggregate,
    DetectCommunities,
    ClusterProducts,
    OptimizeLayout,
    RecordRun,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Aggregate,
        Stage::DetectCommunities,
        Stage::ClusterProducts,
        Stage::OptimizeLayout,
        Stage::RecordRun,
    ];

    /// 1-based position in the pipeline
    pub fn number(&self) -> usize {
        match self {
            Stage::Aggregate => 1,
            Stage::DetectCommunities => 2,
            Stage::ClusterProducts => 3,
            Stage::OptimizeLayout => 4,
            Stage::RecordRun => 5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Aggregate => "aggregate",
            Stage::DetectCommunities => "detect communities",
            Stage::ClusterProducts => "cluster products",
            Stage::OptimizeLayout => "optimize layout",
            Stage::RecordRun => "record run",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.number(), Stage::ALL.len(), self.name())
    }
}

/// Failure inside a single stage
#[derive(Error, Debug)]
pub enum StageError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The stage has nothing to work on
    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    #[error("assignment failed: {0}")]
    Assignment(#[from] AssignmentError),

    #[error("clustering failed: {0}")]
    Clustering(#[from] ClusteringError),
}

/// A stage failure, tagged with the stage that raised it
#[derive(Error, Debug)]
#[error("stage {stage} failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: StageError,
}

/// Dense mapping between section ids and graph node ids.
///
/// Node ids follow ascending section id order, so "lowest node id" and
/// "lowest section id" agree.
pub(crate) struct SectionIndex {
    sections: Vec<SectionId>,
    lookup: HashMap<SectionId, NodeId>,
}

impl SectionIndex {
    pub(crate) fn new<'a>(ids: impl IntoIterator<Item = &'a SectionId>) -> Self {
        let sections: Vec<SectionId> = ids
            .into_iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let lookup = sections
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.clone(), idx as NodeId))
            .collect();
        Self { sections, lookup }
    }

    pub(crate) fn node(&self, id: &SectionId) -> Option<NodeId> {
        self.lookup.get(id).copied()
    }

    pub(crate) fn section(&self, node: NodeId) -> Option<&SectionId> {
        self.sections.get(node as usize)
    }
}
