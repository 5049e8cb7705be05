//! Stage 1: movement events to a weighted section transition graph

use super::{SectionIndex, StageError};
use crate::model::{MovementEvent, SectionId, TransitionEdge};
use crate::persistence::LayoutStorage;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use shelfwise_graph_algorithms::GraphView;
use tracing::{debug, info};

/// Number of top sections reported by [`graph_statistics`]
const TOP_SECTIONS: usize = 5;

/// Transition counts keyed by ordered (source, target) pair
#[derive(Debug, Default, Clone)]
pub struct TransitionCounts {
    counts: FxHashMap<(SectionId, SectionId), u64>,
    /// Events scanned
    pub events: usize,
    /// Distinct sessions seen
    pub sessions: usize,
}

impl TransitionCounts {
    /// Count for the ordered pair, 0 when never observed
    pub fn weight(&self, source: &SectionId, target: &SectionId) -> u64 {
        self.counts
            .get(&(source.clone(), target.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Number of distinct ordered pairs
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all weights
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Edge list sorted by (source, target)
    pub fn into_edges(self) -> Vec<TransitionEdge> {
        let mut edges: Vec<TransitionEdge> = self
            .counts
            .into_iter()
            .map(|((source, target), weight)| TransitionEdge {
                source,
                target,
                weight,
            })
            .collect();
        edges.sort_unstable_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));
        edges
    }
}

/// Count consecutive section-to-section steps.
///
/// `events` must be ordered by (session, step). A change of session resets
/// the cursor without emitting, and repeated visits to the same section are
/// not transitions.
pub fn aggregate_transitions(events: &[MovementEvent]) -> TransitionCounts {
    let mut result = TransitionCounts::default();
    let mut cursor: Option<(&str, &SectionId)> = None;

    for event in events {
        result.events += 1;
        match cursor {
            Some((session, previous)) if session == event.session_id => {
                if previous != &event.section {
                    *result
                        .counts
                        .entry((previous.clone(), event.section.clone()))
                        .or_insert(0) += 1;
                }
            }
            _ => result.sessions += 1,
        }
        cursor = Some((event.session_id.as_str(), &event.section));
    }

    result
}

/// Shape of the transition graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub node_count: usize,
    pub edge_count: usize,
    /// Mean of in-degree plus out-degree
    pub average_degree: f64,
    /// `E / (N (N - 1))` for a directed graph
    pub density: f64,
    /// Highest-degree sections, ties by section id
    pub top_sections: Vec<(SectionId, usize)>,
}

pub fn graph_statistics(edges: &[TransitionEdge]) -> GraphStatistics {
    let index = SectionIndex::new(edges.iter().flat_map(|e| [&e.source, &e.target]));
    let triples: Vec<_> = edges
        .iter()
        .filter_map(|e| Some((index.node(&e.source)?, index.node(&e.target)?, e.weight as f64)))
        .collect();
    let view = GraphView::from_directed_edges(&triples);

    let n = view.node_count;
    let e = view.edge_count();

    let mut degrees: Vec<(SectionId, usize)> = (0..n)
        .filter_map(|idx| {
            let section = index.section(view.index_to_node[idx])?;
            Some((section.clone(), view.out_degree(idx) + view.in_degree(idx)))
        })
        .collect();
    degrees.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    degrees.truncate(TOP_SECTIONS);

    GraphStatistics {
        node_count: n,
        edge_count: e,
        average_degree: if n > 0 { 2.0 * e as f64 / n as f64 } else { 0.0 },
        density: if n > 1 {
            e as f64 / (n as f64 * (n as f64 - 1.0))
        } else {
            0.0
        },
        top_sections: degrees,
    }
}

/// Outcome of stage 1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionSummary {
    pub events: usize,
    pub sessions: usize,
    pub edges: usize,
    pub total_transitions: u64,
    pub statistics: GraphStatistics,
}

/// Rebuild the stored edge set from every stored movement event
pub fn build_transition_graph(storage: &LayoutStorage) -> Result<TransitionSummary, StageError> {
    info!("Building transition graph from movements...");

    let events = storage.scan_movements()?;
    if events.is_empty() {
        return Err(StageError::DegenerateInput(
            "no movement events in the store".to_string(),
        ));
    }
    debug!("Processing {} movement events", events.len());

    let counts = aggregate_transitions(&events);
    let (event_count, sessions, total) = (counts.events, counts.sessions, counts.total());
    let edges = counts.into_edges();

    storage.replace_edges(&edges)?;

    let statistics = graph_statistics(&edges);
    info!(
        "Transition graph: {} sections, {} edges, {} transitions from {} sessions",
        statistics.node_count,
        statistics.edge_count,
        total,
        sessions
    );
    info!(
        "Average degree {:.2}, density {:.4}",
        statistics.average_degree, statistics.density
    );
    for (section, degree) in &statistics.top_sections {
        debug!("  {}: degree {}", section, degree);
    }

    Ok(TransitionSummary {
        events: event_count,
        sessions,
        edges: edges.len(),
        total_transitions: total,
        statistics,
    })
}
