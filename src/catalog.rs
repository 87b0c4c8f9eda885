//! Catalog filter
//!
//! Filtered, paginated, sorted listing of approved resources. Visibility is
//! applied inside the store query (never after loading), so `total` and the
//! page are computed over the same filtered set.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::CatalogConfig;
use crate::error::Result;
use crate::models::{Resource, ResourceType, Viewer};
use crate::observability;
use crate::store::{ResourcePredicate, ResourceQuery, ResourceStore, SortKey};
use crate::visibility::ListVisibility;

/// Raw catalog query parameters as they arrive over HTTP. Values that fail
/// to parse are treated as absent rather than rejected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListResourcesRequest {
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub search: Option<String>,
    #[serde(rename = "type")]
    pub resource_type: Option<String>,
    pub university_id: Option<String>,
    pub department_id: Option<String>,
    pub course_id: Option<String>,
    pub tag: Option<String>,
    pub sort_by: Option<String>,
}

fn non_empty(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_uuid(raw: Option<&str>) -> Option<Uuid> {
    raw.and_then(|s| Uuid::parse_str(s.trim()).ok())
}

fn parse_int(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|s| s.trim().parse().ok())
}

impl ListResourcesRequest {
    pub fn into_filter(self) -> ResourceFilter {
        ResourceFilter {
            page: parse_int(self.page.as_deref()),
            page_size: parse_int(self.page_size.as_deref()),
            search: non_empty(self.search.as_deref()),
            resource_type: self
                .resource_type
                .as_deref()
                .and_then(|s| s.parse::<ResourceType>().ok()),
            university_id: parse_uuid(self.university_id.as_deref()),
            department_id: parse_uuid(self.department_id.as_deref()),
            course_id: parse_uuid(self.course_id.as_deref()),
            tag: non_empty(self.tag.as_deref()),
            sort: SortKey::parse(self.sort_by.as_deref()),
        }
    }
}

/// Typed catalog filter; every field is optional and AND-ed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceFilter {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub search: Option<String>,
    pub resource_type: Option<ResourceType>,
    pub university_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub course_id: Option<Uuid>,
    pub tag: Option<String>,
    pub sort: SortKey,
}

/// One catalog page
#[derive(Debug, Clone, Serialize)]
pub struct ResourcePage {
    pub items: Vec<Resource>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
}

#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn ResourceStore>,
    config: CatalogConfig,
}

impl Catalog {
    pub fn new(store: Arc<dyn ResourceStore>, config: CatalogConfig) -> Self {
        Self { store, config }
    }

    /// Page defaults to 1 and never goes below it. A missing or non-positive
    /// page size takes the configured default; larger ones are capped at
    /// `max_page_size`.
    pub fn resolve_paging(&self, filter: &ResourceFilter) -> (u64, u64) {
        let page = filter.page.unwrap_or(1).max(1) as u64;
        let page_size = match filter.page_size {
            Some(size) if size > 0 => (size as u64).min(self.config.max_page_size),
            _ => self.config.default_page_size,
        };
        (page, page_size)
    }

    #[instrument(skip(self, filter, viewer), fields(page = ?filter.page, sort = ?filter.sort))]
    pub async fn list_resources(
        &self,
        filter: &ResourceFilter,
        viewer: Option<&Viewer>,
    ) -> Result<ResourcePage> {
        let (page, page_size) = self.resolve_paging(filter);
        let viewer_university = viewer.and_then(|v| v.university_id);

        let query = ResourceQuery {
            predicate: ResourcePredicate {
                approved_only: true,
                visibility: Some(ListVisibility::new(viewer_university, filter.course_id)),
                search: filter.search.clone(),
                resource_type: filter.resource_type,
                university_id: filter.university_id,
                department_id: filter.department_id,
                course_id: filter.course_id,
                tag: filter.tag.clone(),
                exclude_ids: Vec::new(),
                exclude_owner: None,
            },
            sort: filter.sort,
            offset: (page - 1).saturating_mul(page_size),
            limit: page_size,
        };

        let (items, total) = self.store.find_filtered(&query).await?;
        observability::register_catalog_query(match filter.sort {
            SortKey::Newest => "newest",
            SortKey::Popular => "popular",
            SortKey::PopularRecent => "popular_recent",
        });
        debug!(total, returned = items.len(), "catalog listed");

        Ok(ResourcePage {
            items,
            total,
            page,
            page_size,
            total_pages: total.div_ceil(page_size),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SharingScope;
    use crate::store::InMemoryStore;
    use chrono::{Duration, Utc};

    async fn seeded(count: usize) -> (InMemoryStore, Vec<Resource>) {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let mut resources = Vec::new();
        for i in 0..count {
            let mut r = Resource::new(Uuid::new_v4(), format!("Lecture {}", i), ResourceType::Notes);
            // Newest first: resource 0 is the most recent
            r.created_at = now - Duration::minutes(i as i64);
            store.insert_resource(r.clone()).await;
            resources.push(r);
        }
        (store, resources)
    }

    fn catalog(store: InMemoryStore) -> Catalog {
        Catalog::new(Arc::new(store), CatalogConfig::default())
    }

    #[tokio::test]
    async fn test_second_page_of_twenty_five() {
        let (store, resources) = seeded(25).await;
        let filter = ResourceFilter {
            page: Some(2),
            page_size: Some(10),
            ..Default::default()
        };
        let page = catalog(store).list_resources(&filter, None).await.unwrap();

        assert_eq!(page.total, 25);
        assert_eq!(page.total_pages, 3);
        let ids: Vec<Uuid> = page.items.iter().map(|r| r.id).collect();
        let expected: Vec<Uuid> = resources[10..20].iter().map(|r| r.id).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_non_positive_page_size_uses_default() {
        let (store, _) = seeded(25).await;
        let catalog = catalog(store);
        for size in ["0", "-5"] {
            let request = ListResourcesRequest {
                page_size: Some(size.to_string()),
                ..Default::default()
            };
            let page = catalog
                .list_resources(&request.into_filter(), None)
                .await
                .unwrap();
            assert_eq!(page.page_size, 20);
            assert_eq!(page.items.len(), 20);
            assert_eq!(page.total_pages, 2);
        }
    }

    #[tokio::test]
    async fn test_page_far_past_the_end_is_empty() {
        let (store, _) = seeded(3).await;
        let request = ListResourcesRequest {
            page: Some(i64::MAX.to_string()),
            page_size: Some("100".to_string()),
            ..Default::default()
        };
        let page = catalog(store)
            .list_resources(&request.into_filter(), None)
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 3);
        assert_eq!(page.page, i64::MAX as u64);
    }

    #[tokio::test]
    async fn test_anonymous_sees_public_only() {
        let store = InMemoryStore::new();
        let university = Uuid::new_v4();

        let public = Resource::new(Uuid::new_v4(), "Public notes", ResourceType::Notes);
        let mut campus = Resource::new(Uuid::new_v4(), "Campus notes", ResourceType::Notes);
        campus.sharing_scope = SharingScope::University;
        campus.university_id = Some(university);
        let mut pending = Resource::new(Uuid::new_v4(), "Pending notes", ResourceType::Notes);
        pending.is_approved = false;

        for r in [&public, &campus, &pending] {
            store.insert_resource(r.clone()).await;
        }
        let catalog = catalog(store);

        let anonymous = catalog
            .list_resources(&ResourceFilter::default(), None)
            .await
            .unwrap();
        assert_eq!(anonymous.total, 1);
        assert_eq!(anonymous.items[0].id, public.id);

        let member = Viewer::student(Uuid::new_v4()).with_university(university);
        let affiliated = catalog
            .list_resources(&ResourceFilter::default(), Some(&member))
            .await
            .unwrap();
        assert_eq!(affiliated.total, 2);
        assert!(affiliated.items.iter().all(|r| r.id != pending.id));
    }

    #[tokio::test]
    async fn test_course_scope_requires_explicit_course_filter() {
        let store = InMemoryStore::new();
        let course = Uuid::new_v4();
        let mut r = Resource::new(Uuid::new_v4(), "Week 3 slides", ResourceType::Slides);
        r.sharing_scope = SharingScope::Course;
        r.course_id = Some(course);
        store.insert_resource(r.clone()).await;
        let catalog = catalog(store);

        let unfiltered = catalog
            .list_resources(&ResourceFilter::default(), None)
            .await
            .unwrap();
        assert_eq!(unfiltered.total, 0);

        let filtered = ResourceFilter {
            course_id: Some(course),
            ..Default::default()
        };
        let page = catalog.list_resources(&filtered, None).await.unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_tag_and_popular_sort() {
        let store = InMemoryStore::new();
        let mut quiet = Resource::new(Uuid::new_v4(), "Calculus I", ResourceType::Exam);
        quiet.tags = vec!["calculus".to_string()];
        quiet.download_count = 1;
        let mut busy = Resource::new(Uuid::new_v4(), "Calculus II", ResourceType::Exam);
        busy.tags = vec!["calculus".to_string(), "midterm".to_string()];
        busy.download_count = 40;
        let untagged = Resource::new(Uuid::new_v4(), "Physics", ResourceType::Exam);
        for r in [&quiet, &busy, &untagged] {
            store.insert_resource(r.clone()).await;
        }

        let request = ListResourcesRequest {
            tag: Some("calculus".to_string()),
            sort_by: Some("popular".to_string()),
            ..Default::default()
        };
        let page = catalog(store)
            .list_resources(&request.into_filter(), None)
            .await
            .unwrap();
        let ids: Vec<Uuid> = page.items.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![busy.id, quiet.id]);
    }

    #[test]
    fn test_unparseable_parameters_are_absent() {
        let request = ListResourcesRequest {
            page: Some("two".to_string()),
            page_size: Some("ten".to_string()),
            resource_type: Some("poster".to_string()),
            university_id: Some("not-a-uuid".to_string()),
            search: Some("   ".to_string()),
            sort_by: Some("rating".to_string()),
            ..Default::default()
        };
        assert_eq!(request.into_filter(), ResourceFilter::default());
    }

    #[test]
    fn test_paging_is_clamped() {
        let catalog = catalog(InMemoryStore::new());
        let filter = ResourceFilter {
            page: Some(-3),
            page_size: Some(10_000),
            ..Default::default()
        };
        assert_eq!(catalog.resolve_paging(&filter), (1, 100));

        for size in [0, -5] {
            let filter = ResourceFilter {
                page_size: Some(size),
                ..Default::default()
            };
            assert_eq!(catalog.resolve_paging(&filter), (1, 20));
        }
        assert_eq!(catalog.resolve_paging(&ResourceFilter::default()), (1, 20));
    }
}
