//! Visibility rules
//!
//! Decides which resources a viewer may see. Every rule is available in two
//! forms that must agree: a per-row check over a loaded [`Resource`] (used by
//! the in-memory store and by callers holding a single row) and a SQL
//! fragment pushed into a `QueryBuilder` for set-based evaluation.
//!
//! Two predicates are deliberately distinct:
//! - list visibility (catalog browsing) requires approval and filters on
//!   sharing scope
//! - direct-fetch visibility (a resource opened by link) checks neither

use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::{Resource, SharingScope};

/// Base rule: can a viewer with this university see the resource through
/// affiliation alone?
///
/// Course-scoped resources are never visible through affiliation; they only
/// surface when the caller explicitly filters by their course (see
/// [`ListVisibility`]) or opens them directly.
pub fn is_visible(resource: &Resource, viewer_university: Option<Uuid>) -> bool {
    match resource.sharing_scope {
        SharingScope::Public => true,
        SharingScope::University => match (viewer_university, resource.university_id) {
            (Some(viewer), Some(owner)) => viewer == owner,
            _ => false,
        },
        SharingScope::Course => false,
    }
}

/// Direct single-resource fetch. Any live (not soft-deleted) resource can be
/// opened by link, approved or not, whatever its scope.
pub fn is_fetchable(_resource: &Resource) -> bool {
    true
}

/// Catalog-path visibility for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListVisibility {
    /// University of the viewer; `None` for anonymous viewers and viewers
    /// without an affiliation
    pub viewer_university: Option<Uuid>,
    /// Course id the request explicitly filters on
    pub course_filter: Option<Uuid>,
}

impl ListVisibility {
    pub fn new(viewer_university: Option<Uuid>, course_filter: Option<Uuid>) -> Self {
        Self {
            viewer_university,
            course_filter,
        }
    }

    /// Per-row form
    pub fn matches(&self, resource: &Resource) -> bool {
        if !resource.is_approved {
            return false;
        }
        if is_visible(resource, self.viewer_university) {
            return true;
        }
        resource.sharing_scope == SharingScope::Course
            && self.course_filter.is_some()
            && resource.course_id == self.course_filter
    }

    /// Set-based form. Appends `AND (...)` against a `resources r` alias.
    pub fn push_sql(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push(" AND r.is_approved = TRUE");
        qb.push(" AND (r.sharing_scope = 'public'");
        if let Some(university_id) = self.viewer_university {
            qb.push(" OR (r.sharing_scope = 'university' AND r.university_id = ")
                .push_bind(university_id)
                .push(")");
        }
        if let Some(course_id) = self.course_filter {
            qb.push(" OR (r.sharing_scope = 'course' AND r.course_id = ")
                .push_bind(course_id)
                .push(")");
        }
        qb.push(")");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceType;

    fn resource(scope: SharingScope) -> Resource {
        let mut r = Resource::new(Uuid::new_v4(), "Thermodynamics slides", ResourceType::Slides);
        r.sharing_scope = scope;
        r.university_id = Some(Uuid::new_v4());
        r.course_id = Some(Uuid::new_v4());
        r
    }

    #[test]
    fn test_public_visible_to_everyone() {
        let r = resource(SharingScope::Public);
        assert!(is_visible(&r, None));
        assert!(is_visible(&r, Some(Uuid::new_v4())));
        assert!(is_visible(&r, r.university_id));
    }

    #[test]
    fn test_university_scope_requires_matching_university() {
        let r = resource(SharingScope::University);
        assert!(is_visible(&r, r.university_id));
        assert!(!is_visible(&r, Some(Uuid::new_v4())));
        assert!(!is_visible(&r, None));
    }

    #[test]
    fn test_university_scope_without_university_is_hidden() {
        let mut r = resource(SharingScope::University);
        r.university_id = None;
        assert!(!is_visible(&r, Some(Uuid::new_v4())));
    }

    #[test]
    fn test_course_scope_not_visible_by_affiliation() {
        let r = resource(SharingScope::Course);
        assert!(!is_visible(&r, r.university_id));
        assert!(!ListVisibility::new(r.university_id, None).matches(&r));
    }

    #[test]
    fn test_course_scope_listed_with_explicit_course_filter() {
        let r = resource(SharingScope::Course);
        assert!(ListVisibility::new(None, r.course_id).matches(&r));
        assert!(!ListVisibility::new(None, Some(Uuid::new_v4())).matches(&r));
    }

    #[test]
    fn test_list_visibility_requires_approval() {
        let mut r = resource(SharingScope::Public);
        r.is_approved = false;
        assert!(!ListVisibility::default().matches(&r));
    }

    #[test]
    fn test_direct_fetch_ignores_approval_and_scope() {
        let mut r = resource(SharingScope::Course);
        r.is_approved = false;
        assert!(is_fetchable(&r));
    }

    #[test]
    fn test_sql_fragment_mentions_each_branch() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT r.id FROM resources r WHERE TRUE");
        ListVisibility::new(Some(Uuid::new_v4()), Some(Uuid::new_v4())).push_sql(&mut qb);
        let sql = qb.sql();
        assert!(sql.contains("r.is_approved = TRUE"));
        assert!(sql.contains("r.sharing_scope = 'public'"));
        assert!(sql.contains("r.sharing_scope = 'university' AND r.university_id = $1"));
        assert!(sql.contains("r.sharing_scope = 'course' AND r.course_id = $2"));
    }

    #[test]
    fn test_sql_fragment_anonymous_is_public_only() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT r.id FROM resources r WHERE TRUE");
        ListVisibility::default().push_sql(&mut qb);
        let sql = qb.sql();
        assert!(!sql.contains("'university'"));
        assert!(!sql.contains("'course'"));
    }
}
