//! Rows of the layout store

use super::types::{ClusterId, CommunityId, ProductId, SectionId};
use serde::{Deserialize, Serialize};

/// A fixed physical area of the store on an integer grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    pub name: String,
    pub x: i32,
    pub y: i32,
}

impl Section {
    pub fn new(id: impl Into<SectionId>, name: impl Into<String>, x: i32, y: i32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            x,
            y,
        }
    }

    /// Grid walking distance; no obstacles are modelled
    pub fn manhattan_distance(&self, other: &Section) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub category: String,
    /// Where the product is shelved today, if anywhere
    pub current_section: Option<SectionId>,
}

impl Product {
    pub fn new(
        id: impl Into<ProductId>,
        name: impl Into<String>,
        category: impl Into<String>,
        current_section: Option<SectionId>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            current_section,
        }
    }
}

/// One step of a customer path. Steps are ordered by `(session_id, step_order)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementEvent {
    pub session_id: String,
    pub step_order: u32,
    pub section: SectionId,
    /// Unix epoch milliseconds
    pub timestamp: i64,
}

impl MovementEvent {
    pub fn new(session_id: impl Into<String>, step_order: u32, section: impl Into<SectionId>, timestamp: i64) -> Self {
        Self {
            session_id: session_id.into(),
            step_order,
            section: section.into(),
            timestamp,
        }
    }
}

/// Directed section-to-section transition count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEdge {
    pub source: SectionId,
    pub target: SectionId,
    pub weight: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityAssignment {
    pub section: SectionId,
    pub community: CommunityId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCluster {
    pub product: ProductId,
    pub cluster: ClusterId,
}

/// Placement recommendation; `score` is the negated assignment cost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub product: ProductId,
    pub section: SectionId,
    pub rationale: String,
    pub score: f64,
}

/// Audit row written after each successful pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: u64,
    /// Unix epoch milliseconds
    pub created_at: i64,
    pub notes: String,
}
