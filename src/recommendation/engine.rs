//! Recommendation Engine
//!
//! Rule-based cascade over academic affinity. A resource's most specific
//! key wins (course, then department, then university); candidates are
//! ranked by downloads, then views, then recency.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::metrics::PerformanceTimer;
use crate::config::RecommendationConfig;
use crate::error::{Error, Result};
use crate::models::{MemberAffinity, Resource};
use crate::observability;
use crate::store::{ResourcePredicate, ResourceStore, SortKey};

/// Slow-query threshold for recommendation lookups
const SLOW_RECOMMENDATION_MS: u64 = 200;

/// A recommended resource and why it was picked
#[derive(Debug, Clone, Serialize)]
pub struct ScoredResource {
    #[serde(flatten)]
    pub resource: Resource,
    pub reason: RecommendationReason,
}

/// Why this resource was recommended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationReason {
    SameCourse,
    SameDepartment,
    SameUniversity,
    /// Globally popular, either because no affinity key applied or as
    /// backfill after the affinity tier ran short
    Popular,
}

/// The affinity key a query was narrowed by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AffinityTier {
    Course(Uuid),
    Department(Uuid),
    University(Uuid),
    Global,
}

impl AffinityTier {
    /// Most specific key present on a resource
    pub fn for_resource(resource: &Resource) -> Self {
        if let Some(course_id) = resource.course_id {
            AffinityTier::Course(course_id)
        } else if let Some(department_id) = resource.department_id {
            AffinityTier::Department(department_id)
        } else if let Some(university_id) = resource.university_id {
            AffinityTier::University(university_id)
        } else {
            AffinityTier::Global
        }
    }

    /// Members carry no course, so department is the narrowest key
    pub fn for_member(member: &MemberAffinity) -> Self {
        if let Some(department_id) = member.department_id {
            AffinityTier::Department(department_id)
        } else if let Some(university_id) = member.university_id {
            AffinityTier::University(university_id)
        } else {
            AffinityTier::Global
        }
    }

    fn narrow(&self, predicate: &mut ResourcePredicate) {
        match *self {
            AffinityTier::Course(id) => predicate.course_id = Some(id),
            AffinityTier::Department(id) => predicate.department_id = Some(id),
            AffinityTier::University(id) => predicate.university_id = Some(id),
            AffinityTier::Global => {}
        }
    }

    pub fn reason(&self) -> RecommendationReason {
        match self {
            AffinityTier::Course(_) => RecommendationReason::SameCourse,
            AffinityTier::Department(_) => RecommendationReason::SameDepartment,
            AffinityTier::University(_) => RecommendationReason::SameUniversity,
            AffinityTier::Global => RecommendationReason::Popular,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AffinityTier::Course(_) => "course",
            AffinityTier::Department(_) => "department",
            AffinityTier::University(_) => "university",
            AffinityTier::Global => "global",
        }
    }
}

/// Absent or non-positive requests get the default; anything above `max`
/// is capped.
pub fn clamp_limit(requested: Option<i64>, default: u64, max: u64) -> u64 {
    match requested {
        Some(n) if n > 0 => (n as u64).min(max),
        _ => default,
    }
}

fn scored(resources: Vec<Resource>, reason: RecommendationReason) -> Vec<ScoredResource> {
    resources
        .into_iter()
        .map(|resource| ScoredResource { resource, reason })
        .collect()
}

/// Main recommendation engine
#[derive(Clone)]
pub struct RecommendationEngine {
    store: Arc<dyn ResourceStore>,
    limits: RecommendationConfig,
}

impl RecommendationEngine {
    pub fn new(store: Arc<dyn ResourceStore>, limits: RecommendationConfig) -> Self {
        Self { store, limits }
    }

    /// Resources related to `resource_id`, backfilled with globally popular
    /// ones when the affinity tier runs short
    pub async fn similar_to(
        &self,
        resource_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<ScoredResource>> {
        let timer = PerformanceTimer::new("similar_to");
        let limit = clamp_limit(
            limit,
            self.limits.similar_default_limit,
            self.limits.similar_max_limit,
        );

        let target = self
            .store
            .find_by_id(resource_id)
            .await?
            .ok_or_else(|| Error::not_found("resource", resource_id))?;
        let tier = AffinityTier::for_resource(&target);

        let mut predicate = ResourcePredicate::approved();
        predicate.exclude_ids.push(target.id);
        tier.narrow(&mut predicate);

        let primary = self
            .store
            .find_ranked(&predicate, SortKey::PopularRecent, limit)
            .await?;
        let mut results = scored(primary, tier.reason());

        // A global tier already drew from the whole pool; nothing to add
        let missing = limit.saturating_sub(results.len() as u64);
        if missing > 0 && tier != AffinityTier::Global {
            let mut backfill = ResourcePredicate::approved();
            backfill.exclude_ids.push(target.id);
            backfill
                .exclude_ids
                .extend(results.iter().map(|r| r.resource.id));

            let extra = self
                .store
                .find_ranked(&backfill, SortKey::PopularRecent, missing)
                .await?;
            observability::register_backfill(extra.len());
            results.extend(scored(extra, RecommendationReason::Popular));
        }

        debug!(
            %resource_id,
            tier = tier.label(),
            returned = results.len(),
            "similar resources computed"
        );
        observability::register_recommendation("similar", tier.label(), results.len());
        timer.log_if_slow(SLOW_RECOMMENDATION_MS);
        Ok(results)
    }

    /// Popular resources around a member's department (or university), never
    /// their own uploads. No backfill.
    pub async fn recommended_for(
        &self,
        user_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<ScoredResource>> {
        let timer = PerformanceTimer::new("recommended_for");
        let limit = clamp_limit(
            limit,
            self.limits.recommended_default_limit,
            self.limits.recommended_max_limit,
        );

        let member = self
            .store
            .find_member(user_id)
            .await?
            .ok_or_else(|| Error::not_found("user", user_id))?;
        let tier = AffinityTier::for_member(&member);

        let mut predicate = ResourcePredicate::approved();
        predicate.exclude_owner = Some(user_id);
        tier.narrow(&mut predicate);

        let resources = self
            .store
            .find_ranked(&predicate, SortKey::PopularRecent, limit)
            .await?;
        let results = scored(resources, tier.reason());

        debug!(
            %user_id,
            tier = tier.label(),
            returned = results.len(),
            "recommendations computed"
        );
        observability::register_recommendation("recommended", tier.label(), results.len());
        timer.log_if_slow(SLOW_RECOMMENDATION_MS);
        Ok(results)
    }
}
