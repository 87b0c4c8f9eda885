//! Recommendation Module
//!
//! Finds related and recommended resources for Campus Share users.
//!
//! ## Feed Types
//!
//! - **Similar**: resources sharing the target's course, else department,
//!   else university; topped up with globally popular resources when short
//! - **Recommended**: resources from the member's department, else
//!   university, excluding their own uploads; never topped up
//!
//! Both rank candidates by downloads, then views, then recency. Sharing
//! scope is not consulted; only approval is.

pub mod engine;
pub mod metrics;

pub use engine::{
    clamp_limit, AffinityTier, RecommendationEngine, RecommendationReason, ScoredResource,
};
