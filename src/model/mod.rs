//! Layout data model
//!
//! Catalog rows (sections, products), ingested movement events, and the
//! per-run outputs of each pipeline stage.

pub mod records;
pub mod types;

pub use records::{
    CommunityAssignment, MovementEvent, Product, ProductCluster, Recommendation, RunRecord,
    Section, TransitionEdge,
};
pub use types::{ClusterId, CommunityId, ProductId, SectionId};
