//! Campus Share library crate
//!
//! Resource visibility, catalog filtering, engagement counters and
//! recommendations for the university resource-sharing platform.

pub mod api;
pub mod catalog;
pub mod config;
pub mod database;
pub mod engagement;
pub mod error;
pub mod models;
pub mod observability;
pub mod recommendation;
pub mod resources;
pub mod store;
pub mod visibility;

// Re-export commonly used types
pub use catalog::{Catalog, ResourceFilter, ResourcePage};
pub use config::Config;
pub use database::Database;
pub use engagement::EngagementLedger;
pub use error::{Error, Result};
pub use models::{Resource, SharingScope, Viewer, VoteOutcome, VoteTally, VoteTarget};
pub use recommendation::{RecommendationEngine, ScoredResource};
pub use resources::ResourceService;
pub use store::{EngagementStore, InMemoryStore, PgStore, ResourceStore};
