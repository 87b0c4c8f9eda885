//! PostgreSQL store adapter
//!
//! Votes and ratings run inside one transaction each. A vote locks the
//! target row with `FOR UPDATE` before reading the voter's existing vote, so
//! all votes on a target serialize. A rating locks the resource row
//! `FOR SHARE` and upserts on `(resource_id, user_id)`. View and download
//! counters are single `UPDATE ... SET x = x + n` statements.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::{PgExecutor, Postgres, QueryBuilder};
use tracing::{debug, Instrument};
use uuid::Uuid;

use super::{BoxFuture, EngagementStore, ResourcePredicate, ResourceQuery, ResourceStore, SortKey};
use crate::error::{Error, Result};
use crate::models::{
    MemberAffinity, Rating, RatingSummary, Resource, ResourceCounter, Vote, VoteOutcome,
    VoteTally, VoteTarget,
};

const RESOURCE_COLUMNS: &str = "id, owner_id, title, description, resource_type, file_name, \
    file_size, file_type, storage_key, university_id, department_id, course_id, sharing_scope, \
    is_approved, download_count, view_count, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct ResourceRow {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    description: String,
    resource_type: String,
    file_name: String,
    file_size: i64,
    file_type: String,
    storage_key: String,
    university_id: Option<Uuid>,
    department_id: Option<Uuid>,
    course_id: Option<Uuid>,
    sharing_scope: String,
    is_approved: bool,
    download_count: i64,
    view_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ResourceRow {
    fn into_resource(self, tags: Vec<String>) -> Result<Resource> {
        let resource_type = self.resource_type.parse().map_err(|_| {
            Error::invalid_format(format!(
                "resource {} has unknown type '{}'",
                self.id, self.resource_type
            ))
        })?;
        let sharing_scope = self.sharing_scope.parse().map_err(|_| {
            Error::invalid_format(format!(
                "resource {} has unknown sharing scope '{}'",
                self.id, self.sharing_scope
            ))
        })?;
        Ok(Resource {
            id: self.id,
            owner_id: self.owner_id,
            title: self.title,
            description: self.description,
            resource_type,
            file_name: self.file_name,
            file_size: self.file_size,
            file_type: self.file_type,
            storage_key: self.storage_key,
            university_id: self.university_id,
            department_id: self.department_id,
            course_id: self.course_id,
            sharing_scope,
            is_approved: self.is_approved,
            download_count: self.download_count,
            view_count: self.view_count,
            tags,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn votable_table(target: VoteTarget) -> &'static str {
    match target {
        VoteTarget::Topic(_) => "forum_topics",
        VoteTarget::Reply(_) => "forum_replies",
    }
}

/// LIMIT/OFFSET are BIGINT; anything past `i64::MAX` saturates instead of
/// wrapping negative
fn sql_bound(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Escape LIKE metacharacters so search is a literal substring match
fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// Appends the WHERE clause for `predicate` against a `resources r` alias
fn push_predicate(qb: &mut QueryBuilder<'_, Postgres>, predicate: &ResourcePredicate) {
    qb.push(" WHERE r.deleted_at IS NULL");

    match &predicate.visibility {
        // List visibility carries the approval check itself
        Some(visibility) => visibility.push_sql(qb),
        None if predicate.approved_only => {
            qb.push(" AND r.is_approved = TRUE");
        }
        None => {}
    }

    if let Some(search) = &predicate.search {
        let pattern = like_pattern(search);
        qb.push(" AND (r.title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR r.description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(resource_type) = predicate.resource_type {
        qb.push(" AND r.resource_type = ")
            .push_bind(resource_type.as_str());
    }
    if let Some(university_id) = predicate.university_id {
        qb.push(" AND r.university_id = ").push_bind(university_id);
    }
    if let Some(department_id) = predicate.department_id {
        qb.push(" AND r.department_id = ").push_bind(department_id);
    }
    if let Some(course_id) = predicate.course_id {
        qb.push(" AND r.course_id = ").push_bind(course_id);
    }
    if let Some(tag) = &predicate.tag {
        qb.push(
            " AND EXISTS (SELECT 1 FROM resource_tags rt JOIN tags t ON t.id = rt.tag_id \
             WHERE rt.resource_id = r.id AND t.name = ",
        )
        .push_bind(tag.clone())
        .push(")");
    }
    if !predicate.exclude_ids.is_empty() {
        qb.push(" AND r.id <> ALL(")
            .push_bind(predicate.exclude_ids.clone())
            .push(")");
    }
    if let Some(owner_id) = predicate.exclude_owner {
        qb.push(" AND r.owner_id <> ").push_bind(owner_id);
    }
}

async fn load_tags<'e, E>(executor: E, ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<String>>>
where
    E: PgExecutor<'e>,
{
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = sqlx::query_as::<_, (Uuid, String)>(
        r#"
        SELECT rt.resource_id, t.name
        FROM resource_tags rt
        JOIN tags t ON t.id = rt.tag_id
        WHERE rt.resource_id = ANY($1)
        ORDER BY t.name
        "#,
    )
    .bind(ids)
    .fetch_all(executor)
    .await?;

    let mut tags: HashMap<Uuid, Vec<String>> = HashMap::new();
    for (resource_id, name) in rows {
        tags.entry(resource_id).or_default().push(name);
    }
    Ok(tags)
}

fn attach_tags(
    rows: Vec<ResourceRow>,
    mut tags: HashMap<Uuid, Vec<String>>,
) -> Result<Vec<Resource>> {
    rows.into_iter()
        .map(|row| {
            let row_tags = tags.remove(&row.id).unwrap_or_default();
            row.into_resource(row_tags)
        })
        .collect()
}

/// Production store over a shared `PgPool`
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl ResourceStore for PgStore {
    fn find_by_id(&self, id: Uuid) -> BoxFuture<'_, Result<Option<Resource>>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {} FROM resources r WHERE r.id = $1 AND r.deleted_at IS NULL",
                RESOURCE_COLUMNS
            );
            let row = sqlx::query_as::<_, ResourceRow>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            match row {
                Some(row) => {
                    let mut tags = load_tags(&self.pool, &[id]).await?;
                    let row_tags = tags.remove(&id).unwrap_or_default();
                    Ok(Some(row.into_resource(row_tags)?))
                }
                None => Ok(None),
            }
        })
    }

    fn find_filtered<'a>(
        &'a self,
        query: &'a ResourceQuery,
    ) -> BoxFuture<'a, Result<(Vec<Resource>, u64)>> {
        let span = tracing::debug_span!("find_filtered", offset = query.offset, limit = query.limit);
        Box::pin(
            async move {
                // Count and page read from one snapshot so `total` matches the rows
                let mut tx = self.pool.begin().await?;
                sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
                    .execute(&mut *tx)
                    .await?;

                let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM resources r");
                push_predicate(&mut count_qb, &query.predicate);
                let total = count_qb.build_query_scalar::<i64>().fetch_one(&mut *tx).await?;

                let mut qb = QueryBuilder::<Postgres>::new(format!(
                    "SELECT {} FROM resources r",
                    RESOURCE_COLUMNS
                ));
                push_predicate(&mut qb, &query.predicate);
                qb.push(query.sort.order_by_sql());
                qb.push(" LIMIT ")
                    .push_bind(sql_bound(query.limit))
                    .push(" OFFSET ")
                    .push_bind(sql_bound(query.offset));
                let rows = qb.build_query_as::<ResourceRow>().fetch_all(&mut *tx).await?;

                let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
                let tags = load_tags(&mut *tx, &ids).await?;
                tx.commit().await?;

                debug!(total, returned = rows.len(), "catalog page loaded");
                Ok((attach_tags(rows, tags)?, total.max(0) as u64))
            }
            .instrument(span),
        )
    }

    fn find_ranked<'a>(
        &'a self,
        predicate: &'a ResourcePredicate,
        sort: SortKey,
        limit: u64,
    ) -> BoxFuture<'a, Result<Vec<Resource>>> {
        Box::pin(async move {
            let mut qb = QueryBuilder::<Postgres>::new(format!(
                "SELECT {} FROM resources r",
                RESOURCE_COLUMNS
            ));
            push_predicate(&mut qb, predicate);
            qb.push(sort.order_by_sql());
            qb.push(" LIMIT ").push_bind(sql_bound(limit));
            let rows = qb.build_query_as::<ResourceRow>().fetch_all(&self.pool).await?;

            let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
            let tags = load_tags(&self.pool, &ids).await?;
            attach_tags(rows, tags)
        })
    }

    fn increment_counter(
        &self,
        id: Uuid,
        counter: ResourceCounter,
        delta: u32,
    ) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let column = counter.column();
            let sql = format!(
                "UPDATE resources SET {column} = {column} + $1 WHERE id = $2 AND deleted_at IS NULL"
            );
            let result = sqlx::query(&sql)
                .bind(i64::from(delta))
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn save<'a>(&'a self, resource: &'a Resource) -> BoxFuture<'a, Result<Resource>> {
        let span = tracing::debug_span!("save_resource", resource_id = %resource.id);
        Box::pin(
            async move {
                let mut tx = self.pool.begin().await?;

                let sql = format!(
                    r#"
                    INSERT INTO resources
                        (id, owner_id, title, description, resource_type, file_name, file_size,
                         file_type, storage_key, university_id, department_id, course_id,
                         sharing_scope, is_approved, download_count, view_count, created_at, updated_at)
                    VALUES
                        ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, NOW())
                    ON CONFLICT (id) DO UPDATE SET
                        title = EXCLUDED.title,
                        description = EXCLUDED.description,
                        resource_type = EXCLUDED.resource_type,
                        file_name = EXCLUDED.file_name,
                        file_size = EXCLUDED.file_size,
                        file_type = EXCLUDED.file_type,
                        storage_key = EXCLUDED.storage_key,
                        university_id = EXCLUDED.university_id,
                        department_id = EXCLUDED.department_id,
                        course_id = EXCLUDED.course_id,
                        sharing_scope = EXCLUDED.sharing_scope,
                        is_approved = EXCLUDED.is_approved,
                        updated_at = NOW()
                    WHERE resources.deleted_at IS NULL
                      AND resources.owner_id = EXCLUDED.owner_id
                    RETURNING {}
                    "#,
                    RESOURCE_COLUMNS
                );
                let row = sqlx::query_as::<_, ResourceRow>(&sql)
                    .bind(resource.id)
                    .bind(resource.owner_id)
                    .bind(&resource.title)
                    .bind(&resource.description)
                    .bind(resource.resource_type.as_str())
                    .bind(&resource.file_name)
                    .bind(resource.file_size)
                    .bind(&resource.file_type)
                    .bind(&resource.storage_key)
                    .bind(resource.university_id)
                    .bind(resource.department_id)
                    .bind(resource.course_id)
                    .bind(resource.sharing_scope.as_str())
                    .bind(resource.is_approved)
                    .bind(resource.download_count)
                    .bind(resource.view_count)
                    .bind(resource.created_at)
                    .fetch_optional(&mut *tx)
                    .await?;

                // No row back: the existing row is soft-deleted or owned by someone else
                let Some(row) = row else {
                    let live_owner: Option<Uuid> = sqlx::query_scalar(
                        "SELECT owner_id FROM resources WHERE id = $1 AND deleted_at IS NULL",
                    )
                    .bind(resource.id)
                    .fetch_optional(&mut *tx)
                    .await?;
                    return Err(match live_owner {
                        Some(_) => Error::forbidden("only the owner can edit this resource"),
                        None => Error::not_found("resource", resource.id),
                    });
                };

                sqlx::query("DELETE FROM resource_tags WHERE resource_id = $1")
                    .bind(resource.id)
                    .execute(&mut *tx)
                    .await?;

                for name in &resource.tags {
                    let tag_id: Uuid = sqlx::query_scalar(
                        r#"
                        INSERT INTO tags (name) VALUES ($1)
                        ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
                        RETURNING id
                        "#,
                    )
                    .bind(name)
                    .fetch_one(&mut *tx)
                    .await?;

                    sqlx::query(
                        "INSERT INTO resource_tags (resource_id, tag_id) VALUES ($1, $2) \
                         ON CONFLICT DO NOTHING",
                    )
                    .bind(resource.id)
                    .bind(tag_id)
                    .execute(&mut *tx)
                    .await?;
                }

                tx.commit().await?;
                row.into_resource(resource.tags.clone())
            }
            .instrument(span),
        )
    }

    fn set_approval(&self, id: Uuid, approved: bool) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE resources SET is_approved = $1, updated_at = NOW() \
                 WHERE id = $2 AND deleted_at IS NULL",
            )
            .bind(approved)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn soft_delete(&self, id: Uuid) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE resources SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
            )
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn find_member(&self, user_id: Uuid) -> BoxFuture<'_, Result<Option<MemberAffinity>>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, (Uuid, Option<Uuid>, Option<Uuid>)>(
                "SELECT id, university_id, department_id FROM users \
                 WHERE id = $1 AND deleted_at IS NULL",
            )
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.map(|(user_id, university_id, department_id)| MemberAffinity {
                user_id,
                university_id,
                department_id,
            }))
        })
    }

    fn ping(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(|e| Error::Database {
                    message: format!("Health check failed: {}", e).into(),
                    source: Some(e),
                })?;
            Ok(())
        })
    }
}

impl EngagementStore for PgStore {
    fn upsert_rating(
        &self,
        resource_id: Uuid,
        user_id: Uuid,
        value: i32,
    ) -> BoxFuture<'_, Result<Rating>> {
        let span = tracing::debug_span!("upsert_rating", %resource_id, %user_id);
        Box::pin(
            async move {
                let mut tx = self.pool.begin().await?;

                let live: Option<Uuid> = sqlx::query_scalar(
                    "SELECT id FROM resources WHERE id = $1 AND deleted_at IS NULL FOR SHARE",
                )
                .bind(resource_id)
                .fetch_optional(&mut *tx)
                .await?;
                if live.is_none() {
                    return Err(Error::not_found("resource", resource_id));
                }

                let rating = sqlx::query_as::<_, Rating>(
                    r#"
                    INSERT INTO ratings (id, resource_id, user_id, value, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, NOW(), NOW())
                    ON CONFLICT (resource_id, user_id) DO UPDATE SET
                        value = EXCLUDED.value,
                        updated_at = NOW(),
                        deleted_at = NULL
                    RETURNING id, resource_id, user_id, value, created_at, updated_at
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(resource_id)
                .bind(user_id)
                .bind(value)
                .fetch_one(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok(rating)
            }
            .instrument(span),
        )
    }

    fn rating_summary(&self, resource_id: Uuid) -> BoxFuture<'_, Result<RatingSummary>> {
        Box::pin(async move {
            let (average, count) = sqlx::query_as::<_, (f64, i64)>(
                r#"
                SELECT COALESCE(AVG(value)::float8, 0::float8), COUNT(*)
                FROM ratings
                WHERE resource_id = $1 AND deleted_at IS NULL
                "#,
            )
            .bind(resource_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(RatingSummary { average, count })
        })
    }

    fn find_rating(
        &self,
        resource_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'_, Result<Option<Rating>>> {
        Box::pin(async move {
            let rating = sqlx::query_as::<_, Rating>(
                r#"
                SELECT id, resource_id, user_id, value, created_at, updated_at
                FROM ratings
                WHERE resource_id = $1 AND user_id = $2 AND deleted_at IS NULL
                "#,
            )
            .bind(resource_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(rating)
        })
    }

    fn apply_vote(
        &self,
        target: VoteTarget,
        voter_id: Uuid,
        is_upvote: bool,
    ) -> BoxFuture<'_, Result<VoteOutcome>> {
        let span = tracing::debug_span!("apply_vote", %target, %voter_id, is_upvote);
        Box::pin(
            async move {
                let table = votable_table(target);
                let mut tx = self.pool.begin().await?;

                // Row lock first: every vote on this target waits here
                let lock_sql = format!(
                    "SELECT id FROM {table} WHERE id = $1 AND deleted_at IS NULL FOR UPDATE"
                );
                let locked: Option<Uuid> = sqlx::query_scalar(&lock_sql)
                    .bind(target.id())
                    .fetch_optional(&mut *tx)
                    .await?;
                if locked.is_none() {
                    return Err(Error::not_found(target.entity_name(), target.id()));
                }

                let existing: Option<bool> = sqlx::query_scalar(
                    "SELECT is_upvote FROM forum_votes \
                     WHERE user_id = $1 AND votable_type = $2 AND votable_id = $3",
                )
                .bind(voter_id)
                .bind(target.kind().as_str())
                .bind(target.id())
                .fetch_optional(&mut *tx)
                .await?;

                let outcome = VoteOutcome::decide(existing, is_upvote);
                match outcome {
                    VoteOutcome::Unchanged => {
                        tx.commit().await?;
                        return Ok(outcome);
                    }
                    VoteOutcome::Recorded { .. } => {
                        sqlx::query(
                            r#"
                            INSERT INTO forum_votes (id, user_id, votable_type, votable_id, is_upvote, created_at)
                            VALUES ($1, $2, $3, $4, $5, NOW())
                            "#,
                        )
                        .bind(Uuid::new_v4())
                        .bind(voter_id)
                        .bind(target.kind().as_str())
                        .bind(target.id())
                        .bind(is_upvote)
                        .execute(&mut *tx)
                        .await?;
                    }
                    VoteOutcome::Flipped { .. } => {
                        sqlx::query(
                            "UPDATE forum_votes SET is_upvote = $1 \
                             WHERE user_id = $2 AND votable_type = $3 AND votable_id = $4",
                        )
                        .bind(is_upvote)
                        .bind(voter_id)
                        .bind(target.kind().as_str())
                        .bind(target.id())
                        .execute(&mut *tx)
                        .await?;
                    }
                }

                let mut delta = VoteTally::default();
                delta.apply(outcome);
                let counter_sql = format!(
                    "UPDATE {table} SET upvote_count = upvote_count + $1, \
                     downvote_count = downvote_count + $2 WHERE id = $3"
                );
                sqlx::query(&counter_sql)
                    .bind(delta.upvote_count)
                    .bind(delta.downvote_count)
                    .bind(target.id())
                    .execute(&mut *tx)
                    .await?;

                tx.commit().await?;
                Ok(outcome)
            }
            .instrument(span),
        )
    }

    fn find_vote(
        &self,
        target: VoteTarget,
        voter_id: Uuid,
    ) -> BoxFuture<'_, Result<Option<Vote>>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, (Uuid, bool, DateTime<Utc>)>(
                "SELECT id, is_upvote, created_at FROM forum_votes \
                 WHERE user_id = $1 AND votable_type = $2 AND votable_id = $3",
            )
            .bind(voter_id)
            .bind(target.kind().as_str())
            .bind(target.id())
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.map(|(id, is_upvote, created_at)| Vote {
                id,
                voter_id,
                target,
                is_upvote,
                created_at,
            }))
        })
    }

    fn vote_tally(&self, target: VoteTarget) -> BoxFuture<'_, Result<Option<VoteTally>>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT upvote_count, downvote_count FROM {} WHERE id = $1 AND deleted_at IS NULL",
                votable_table(target)
            );
            let row = sqlx::query_as::<_, (i64, i64)>(&sql)
                .bind(target.id())
                .fetch_optional(&self.pool)
                .await?;
            Ok(row.map(|(upvote_count, downvote_count)| VoteTally {
                upvote_count,
                downvote_count,
            }))
        })
    }

    fn increment_topic_views(&self, topic_id: Uuid) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE forum_topics SET view_count = view_count + 1 \
                 WHERE id = $1 AND deleted_at IS NULL",
            )
            .bind(topic_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
    }
}
