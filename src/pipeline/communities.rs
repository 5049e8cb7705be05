//! Stage 2: section communities from the transition graph

use super::{SectionIndex, StageError};
use crate::config::{CommunityConfig, CommunityStrategy, IsolatedSectionPolicy};
use crate::model::{CommunityAssignment, CommunityId, Section, SectionId, TransitionEdge};
use crate::persistence::LayoutStorage;
use serde::{Deserialize, Serialize};
use shelfwise_graph_algorithms::{
    CommunityDetector, GraphView, GreedyModularity, Louvain, LouvainConfig,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Outcome of stage 2
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunitySummary {
    pub strategy: String,
    pub assignments: Vec<CommunityAssignment>,
    /// Communities including isolated singletons
    pub community_count: usize,
    pub modularity: f64,
    /// Catalog sections no edge touches
    pub isolated_sections: usize,
    pub average_size: f64,
    pub largest: usize,
    pub smallest: usize,
}

fn detector(config: &CommunityConfig, seed: u64) -> Box<dyn CommunityDetector> {
    match config.strategy {
        CommunityStrategy::Louvain => Box::new(Louvain::new(LouvainConfig {
            resolution: config.resolution,
            seed,
            ..LouvainConfig::default()
        })),
        CommunityStrategy::Greedy => Box::new(GreedyModularity {
            resolution: config.resolution,
        }),
    }
}

/// Partition the sections touched by `edges`, treating the graph as undirected.
///
/// Catalog sections with no edges are handled per `config.isolated_sections`.
pub fn partition_sections(
    edges: &[TransitionEdge],
    catalog: &[Section],
    config: &CommunityConfig,
    seed: u64,
) -> Result<CommunitySummary, StageError> {
    if edges.is_empty() {
        return Err(StageError::DegenerateInput(
            "no transition edges; run aggregation first".to_string(),
        ));
    }

    let index = SectionIndex::new(edges.iter().flat_map(|e| [&e.source, &e.target]));
    let triples: Vec<_> = edges
        .iter()
        .filter_map(|e| Some((index.node(&e.source)?, index.node(&e.target)?, e.weight as f64)))
        .collect();
    let view = GraphView::from_undirected_edges(&triples);

    let detector = detector(config, seed);
    debug!(
        "Partitioning {} sections / {} undirected edges with {}",
        view.node_count,
        view.edge_count(),
        detector.name()
    );
    let result = detector.partition(&view);

    let mut assignments: Vec<CommunityAssignment> = Vec::new();
    let mut sizes: Vec<usize> = Vec::with_capacity(result.community_count());
    for (&community, members) in &result.communities {
        sizes.push(members.len());
        for &node in members {
            if let Some(section) = index.section(node) {
                assignments.push(CommunityAssignment {
                    section: section.clone(),
                    community: CommunityId(community as u32),
                });
            }
        }
    }

    let isolated: BTreeSet<&SectionId> = catalog
        .iter()
        .map(|s| &s.id)
        .filter(|id| index.node(id).is_none())
        .collect();

    if config.isolated_sections == IsolatedSectionPolicy::Singleton {
        let mut next = result.community_count() as u32;
        for section in &isolated {
            assignments.push(CommunityAssignment {
                section: (*section).clone(),
                community: CommunityId(next),
            });
            sizes.push(1);
            next += 1;
        }
    } else if !isolated.is_empty() {
        debug!("{} sections have no transitions and stay unassigned", isolated.len());
    }

    assignments.sort_by(|a, b| a.section.cmp(&b.section));

    let community_count = sizes.len();
    Ok(CommunitySummary {
        strategy: detector.name().to_string(),
        assignments,
        community_count,
        modularity: result.modularity,
        isolated_sections: isolated.len(),
        average_size: if community_count > 0 {
            sizes.iter().sum::<usize>() as f64 / community_count as f64
        } else {
            0.0
        },
        largest: sizes.iter().copied().max().unwrap_or(0),
        smallest: sizes.iter().copied().min().unwrap_or(0),
    })
}

/// Group assignments by community, members in section order
pub fn group_by_community(
    assignments: &[CommunityAssignment],
) -> BTreeMap<CommunityId, Vec<SectionId>> {
    let mut groups: BTreeMap<CommunityId, Vec<SectionId>> = BTreeMap::new();
    for a in assignments {
        groups.entry(a.community).or_default().push(a.section.clone());
    }
    for members in groups.values_mut() {
        members.sort();
    }
    groups
}

/// Replace the stored community assignments from the stored edge set
pub fn detect_section_communities(
    storage: &LayoutStorage,
    config: &CommunityConfig,
    seed: u64,
) -> Result<CommunitySummary, StageError> {
    info!("Detecting section communities...");

    let edges = storage.scan_edges()?;
    let catalog = storage.scan_sections()?;
    let summary = partition_sections(&edges, &catalog, config, seed)?;

    storage.replace_communities(&summary.assignments)?;

    info!(
        "Found {} communities with {} (modularity {:.4})",
        summary.community_count, summary.strategy, summary.modularity
    );
    info!(
        "Community sizes: average {:.1}, largest {}, smallest {}",
        summary.average_size, summary.largest, summary.smallest
    );
    for (community, members) in group_by_community(&summary.assignments) {
        let names: Vec<&str> = members.iter().map(|s| s.as_str()).collect();
        debug!("  community {}: {}", community, names.join(", "));
    }

    Ok(summary)
}
