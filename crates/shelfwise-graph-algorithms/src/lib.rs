//! Graph algorithms for section-transition analytics.
//!
//! Algorithms run over [`GraphView`], a dense CSR snapshot built from weighted
//! edge triples. Callers map their own identifiers onto [`NodeId`].

pub mod common;
pub mod community;

pub use common::{GraphView, NodeId};
pub use community::{
    modularity, CommunityDetector, CommunityResult, GreedyModularity, Louvain, LouvainConfig,
};
