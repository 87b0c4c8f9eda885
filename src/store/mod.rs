//! Store ports
//!
//! The core talks to persistence only through these traits; adapters are
//! injected explicitly (no process-wide handle). `postgres` is the
//! production adapter, `memory` backs tests and local runs.

use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    MemberAffinity, Rating, RatingSummary, Resource, ResourceCounter, ResourceType, Vote,
    VoteOutcome, VoteTally, VoteTarget,
};
use crate::visibility::ListVisibility;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Row ordering for resource queries. Every ordering ends with `id` so
/// pages are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// created_at desc
    #[default]
    Newest,
    /// download_count desc, view_count desc
    Popular,
    /// download_count desc, view_count desc, created_at desc
    PopularRecent,
}

impl SortKey {
    /// Unknown keys (including "rating") fall back to newest.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("popular") => SortKey::Popular,
            _ => SortKey::Newest,
        }
    }

    pub fn order_by_sql(&self) -> &'static str {
        match self {
            SortKey::Newest => " ORDER BY r.created_at DESC, r.id",
            SortKey::Popular => " ORDER BY r.download_count DESC, r.view_count DESC, r.id",
            SortKey::PopularRecent => {
                " ORDER BY r.download_count DESC, r.view_count DESC, r.created_at DESC, r.id"
            }
        }
    }

    pub fn compare(&self, a: &Resource, b: &Resource) -> std::cmp::Ordering {
        let ordering = match self {
            SortKey::Newest => b.created_at.cmp(&a.created_at),
            SortKey::Popular => b
                .download_count
                .cmp(&a.download_count)
                .then(b.view_count.cmp(&a.view_count)),
            SortKey::PopularRecent => b
                .download_count
                .cmp(&a.download_count)
                .then(b.view_count.cmp(&a.view_count))
                .then(b.created_at.cmp(&a.created_at)),
        };
        ordering.then(a.id.cmp(&b.id))
    }
}

/// AND-ed resource filter shared by the catalog and the recommender.
/// Soft-deleted rows are always excluded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourcePredicate {
    pub approved_only: bool,
    /// Catalog visibility; `None` skips sharing-scope filtering
    pub visibility: Option<ListVisibility>,
    /// Case-insensitive substring over title and description
    pub search: Option<String>,
    pub resource_type: Option<ResourceType>,
    pub university_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub course_id: Option<Uuid>,
    /// Exact tag name
    pub tag: Option<String>,
    pub exclude_ids: Vec<Uuid>,
    pub exclude_owner: Option<Uuid>,
}

impl ResourcePredicate {
    pub fn approved() -> Self {
        Self {
            approved_only: true,
            ..Default::default()
        }
    }

    /// Per-row evaluation, mirrors the SQL built by the postgres adapter
    pub fn matches(&self, resource: &Resource) -> bool {
        if self.approved_only && !resource.is_approved {
            return false;
        }
        if let Some(visibility) = &self.visibility {
            if !visibility.matches(resource) {
                return false;
            }
        }
        if let Some(needle) = &self.search {
            let needle = needle.to_lowercase();
            if !resource.title.to_lowercase().contains(&needle)
                && !resource.description.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if self.resource_type.is_some_and(|t| t != resource.resource_type) {
            return false;
        }
        if self.university_id.is_some() && self.university_id != resource.university_id {
            return false;
        }
        if self.department_id.is_some() && self.department_id != resource.department_id {
            return false;
        }
        if self.course_id.is_some() && self.course_id != resource.course_id {
            return false;
        }
        if let Some(tag) = &self.tag {
            if !resource.tags.iter().any(|t| t == tag) {
                return false;
            }
        }
        if self.exclude_ids.contains(&resource.id) {
            return false;
        }
        if self.exclude_owner == Some(resource.owner_id) {
            return false;
        }
        true
    }
}

/// A paginated resource query
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceQuery {
    pub predicate: ResourcePredicate,
    pub sort: SortKey,
    pub offset: u64,
    pub limit: u64,
}

/// Persistence for resources and the member directory
pub trait ResourceStore: Send + Sync {
    /// Live (not soft-deleted) resource by id
    fn find_by_id(&self, id: Uuid) -> BoxFuture<'_, Result<Option<Resource>>>;

    /// One page of matching rows plus the total count of the filtered set
    fn find_filtered<'a>(
        &'a self,
        query: &'a ResourceQuery,
    ) -> BoxFuture<'a, Result<(Vec<Resource>, u64)>>;

    /// Top `limit` matching rows by `sort`, without counting
    fn find_ranked<'a>(
        &'a self,
        predicate: &'a ResourcePredicate,
        sort: SortKey,
        limit: u64,
    ) -> BoxFuture<'a, Result<Vec<Resource>>>;

    /// Atomic `counter += delta` with no preceding read. Returns false when
    /// the resource is missing or soft-deleted.
    fn increment_counter(
        &self,
        id: Uuid,
        counter: ResourceCounter,
        delta: u32,
    ) -> BoxFuture<'_, Result<bool>>;

    /// Insert or update a resource and replace its tag set
    fn save<'a>(&'a self, resource: &'a Resource) -> BoxFuture<'a, Result<Resource>>;

    fn set_approval(&self, id: Uuid, approved: bool) -> BoxFuture<'_, Result<bool>>;

    fn soft_delete(&self, id: Uuid) -> BoxFuture<'_, Result<bool>>;

    fn find_member(&self, user_id: Uuid) -> BoxFuture<'_, Result<Option<MemberAffinity>>>;

    /// Liveness check
    fn ping(&self) -> BoxFuture<'_, Result<()>>;
}

/// Persistence for ratings, votes and forum counters.
///
/// `upsert_rating` and `apply_vote` are each a single atomic unit: the
/// existence check, the read of the current row, the write and any counter
/// adjustment commit together or not at all.
pub trait EngagementStore: Send + Sync {
    /// Insert or update the (resource, user) rating. `NotFound` if the
    /// resource is missing or soft-deleted.
    fn upsert_rating(
        &self,
        resource_id: Uuid,
        user_id: Uuid,
        value: i32,
    ) -> BoxFuture<'_, Result<Rating>>;

    fn rating_summary(&self, resource_id: Uuid) -> BoxFuture<'_, Result<RatingSummary>>;

    fn find_rating(&self, resource_id: Uuid, user_id: Uuid)
        -> BoxFuture<'_, Result<Option<Rating>>>;

    /// Record, keep or flip the voter's vote and adjust the target's
    /// counters. `NotFound` if the target is missing or soft-deleted.
    fn apply_vote(
        &self,
        target: VoteTarget,
        voter_id: Uuid,
        is_upvote: bool,
    ) -> BoxFuture<'_, Result<VoteOutcome>>;

    fn find_vote(&self, target: VoteTarget, voter_id: Uuid) -> BoxFuture<'_, Result<Option<Vote>>>;

    /// Current counters, `None` if the target does not exist
    fn vote_tally(&self, target: VoteTarget) -> BoxFuture<'_, Result<Option<VoteTally>>>;

    /// Atomic `view_count += 1` on a topic; false if missing
    fn increment_topic_views(&self, topic_id: Uuid) -> BoxFuture<'_, Result<bool>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SharingScope;
    use chrono::{Duration, Utc};

    fn resource(downloads: i64, views: i64, age_minutes: i64) -> Resource {
        let mut r = Resource::new(Uuid::new_v4(), "Organic chemistry exam", ResourceType::Exam);
        r.download_count = downloads;
        r.view_count = views;
        r.created_at = Utc::now() - Duration::minutes(age_minutes);
        r
    }

    #[test]
    fn test_sort_key_parse_falls_back_to_newest() {
        assert_eq!(SortKey::parse(Some("popular")), SortKey::Popular);
        assert_eq!(SortKey::parse(Some("rating")), SortKey::Newest);
        assert_eq!(SortKey::parse(None), SortKey::Newest);
    }

    #[test]
    fn test_popular_recent_breaks_ties_by_views_then_age() {
        let older = resource(10, 5, 60);
        let newer = resource(10, 5, 1);
        let more_views = resource(10, 9, 120);
        let mut rows = vec![older.clone(), newer.clone(), more_views.clone()];
        rows.sort_by(|a, b| SortKey::PopularRecent.compare(a, b));
        assert_eq!(rows[0].id, more_views.id);
        assert_eq!(rows[1].id, newer.id);
        assert_eq!(rows[2].id, older.id);
    }

    #[test]
    fn test_predicate_search_is_case_insensitive() {
        let mut r = resource(0, 0, 0);
        r.description = "Past paper with SOLUTIONS".to_string();
        let predicate = ResourcePredicate {
            search: Some("solutions".to_string()),
            ..Default::default()
        };
        assert!(predicate.matches(&r));
    }

    #[test]
    fn test_predicate_excludes_ids_and_owner() {
        let r = resource(0, 0, 0);
        let by_id = ResourcePredicate {
            exclude_ids: vec![r.id],
            ..Default::default()
        };
        assert!(!by_id.matches(&r));
        let by_owner = ResourcePredicate {
            exclude_owner: Some(r.owner_id),
            ..Default::default()
        };
        assert!(!by_owner.matches(&r));
    }

    #[test]
    fn test_predicate_without_visibility_ignores_scope() {
        let mut r = resource(0, 0, 0);
        r.sharing_scope = SharingScope::Course;
        r.course_id = Some(Uuid::new_v4());
        assert!(ResourcePredicate::approved().matches(&r));
    }
}
