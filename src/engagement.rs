//! Engagement counter ledger
//!
//! Votes on forum topics and replies, resource ratings and the view and
//! download counters. Every mutation of a vote or rating goes through one
//! atomic store operation; this layer validates input first and records
//! metrics afterwards.

use std::sync::Arc;

use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{
    Rating, RatingSummary, ResourceCounter, Vote, VoteOutcome, VoteTally, VoteTarget, MAX_RATING,
    MIN_RATING,
};
use crate::observability;
use crate::store::{EngagementStore, ResourceStore};

#[derive(Clone)]
pub struct EngagementLedger {
    resources: Arc<dyn ResourceStore>,
    engagement: Arc<dyn EngagementStore>,
}

impl EngagementLedger {
    pub fn new(resources: Arc<dyn ResourceStore>, engagement: Arc<dyn EngagementStore>) -> Self {
        Self {
            resources,
            engagement,
        }
    }

    // ========================================================================
    // Ratings
    // ========================================================================

    /// Create or update the caller's rating of a resource
    #[instrument(skip(self))]
    pub async fn rate(&self, resource_id: Uuid, user_id: Uuid, value: i32) -> Result<Rating> {
        if !(MIN_RATING..=MAX_RATING).contains(&value) {
            return Err(Error::validation(format!(
                "rating must be between {} and {}, got {}",
                MIN_RATING, MAX_RATING, value
            )));
        }

        let rating = self
            .engagement
            .upsert_rating(resource_id, user_id, value)
            .await?;
        observability::register_rating(value);
        debug!(rating_id = %rating.id, "rating stored");
        Ok(rating)
    }

    pub async fn rating_summary(&self, resource_id: Uuid) -> Result<RatingSummary> {
        self.engagement.rating_summary(resource_id).await
    }

    pub async fn user_rating(&self, resource_id: Uuid, user_id: Uuid) -> Result<Option<Rating>> {
        self.engagement.find_rating(resource_id, user_id).await
    }

    // ========================================================================
    // Votes
    // ========================================================================

    /// Record, keep or flip `voter_id`'s vote on `target`
    #[instrument(skip(self), fields(target = %target))]
    pub async fn vote(
        &self,
        target: VoteTarget,
        voter_id: Uuid,
        is_upvote: bool,
    ) -> Result<VoteOutcome> {
        let outcome = self
            .engagement
            .apply_vote(target, voter_id, is_upvote)
            .await?;
        observability::register_vote(target, outcome);
        debug!(outcome = outcome.as_str(), "vote applied");
        Ok(outcome)
    }

    pub async fn user_vote(&self, target: VoteTarget, voter_id: Uuid) -> Result<Option<Vote>> {
        self.engagement.find_vote(target, voter_id).await
    }

    pub async fn tally(&self, target: VoteTarget) -> Result<VoteTally> {
        self.engagement
            .vote_tally(target)
            .await?
            .ok_or_else(|| Error::not_found(target.entity_name(), target.id()))
    }

    // ========================================================================
    // Counters (increment-only, best effort)
    // ========================================================================

    pub async fn increment_view(&self, resource_id: Uuid) -> Result<()> {
        self.increment_resource(resource_id, ResourceCounter::View)
            .await
    }

    pub async fn increment_download(&self, resource_id: Uuid) -> Result<()> {
        self.increment_resource(resource_id, ResourceCounter::Download)
            .await
    }

    pub async fn increment_topic_view(&self, topic_id: Uuid) -> Result<()> {
        let applied = self.engagement.increment_topic_views(topic_id).await?;
        observability::register_counter_increment("topic_view", applied);
        if !applied {
            debug!(%topic_id, "topic view not counted: topic missing");
        }
        Ok(())
    }

    async fn increment_resource(&self, resource_id: Uuid, counter: ResourceCounter) -> Result<()> {
        let applied = self
            .resources
            .increment_counter(resource_id, counter, 1)
            .await?;
        observability::register_counter_increment(
            observability::resource_counter_label(counter),
            applied,
        );
        if !applied {
            info!(%resource_id, counter = counter.column(), "counter not incremented: resource missing");
        }
        Ok(())
    }
}
