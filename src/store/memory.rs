//! In-memory store adapter
//!
//! Every operation takes one `tokio::sync::Mutex` over the whole state, so
//! each vote or rating mutation is serialized exactly like the row-locked
//! transactions of the postgres adapter.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{BoxFuture, EngagementStore, ResourcePredicate, ResourceQuery, ResourceStore, SortKey};
use crate::error::{Error, Result};
use crate::models::{
    MemberAffinity, Rating, RatingSummary, Resource, ResourceCounter, Vote, VoteOutcome,
    VoteTally, VoteTarget,
};

#[derive(Debug, Clone)]
struct StoredResource {
    resource: Resource,
    deleted: bool,
}

#[derive(Debug, Clone, Default)]
struct StoredVotable {
    tally: VoteTally,
    view_count: i64,
    deleted: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    resources: HashMap<Uuid, StoredResource>,
    members: HashMap<Uuid, MemberAffinity>,
    topics: HashMap<Uuid, StoredVotable>,
    replies: HashMap<Uuid, StoredVotable>,
    ratings: HashMap<(Uuid, Uuid), Rating>,
    votes: HashMap<(VoteTarget, Uuid), Vote>,
}

impl MemoryState {
    fn live_resource(&self, id: Uuid) -> Option<&Resource> {
        self.resources
            .get(&id)
            .filter(|stored| !stored.deleted)
            .map(|stored| &stored.resource)
    }

    fn votable_mut(&mut self, target: VoteTarget) -> Option<&mut StoredVotable> {
        let table = match target {
            VoteTarget::Topic(_) => &mut self.topics,
            VoteTarget::Reply(_) => &mut self.replies,
        };
        table.get_mut(&target.id()).filter(|v| !v.deleted)
    }

    fn votable(&self, target: VoteTarget) -> Option<&StoredVotable> {
        let table = match target {
            VoteTarget::Topic(_) => &self.topics,
            VoteTarget::Reply(_) => &self.replies,
        };
        table.get(&target.id()).filter(|v| !v.deleted)
    }

    fn matching(&self, predicate: &ResourcePredicate, sort: SortKey) -> Vec<Resource> {
        let mut rows: Vec<Resource> = self
            .resources
            .values()
            .filter(|stored| !stored.deleted && predicate.matches(&stored.resource))
            .map(|stored| stored.resource.clone())
            .collect();
        rows.sort_by(|a, b| sort.compare(a, b));
        rows
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- Seeding and inspection helpers ----

    pub async fn insert_resource(&self, resource: Resource) {
        let mut state = self.state.lock().await;
        state.resources.insert(
            resource.id,
            StoredResource {
                resource,
                deleted: false,
            },
        );
    }

    pub async fn insert_member(&self, member: MemberAffinity) {
        self.state.lock().await.members.insert(member.user_id, member);
    }

    /// Creates an empty forum topic and returns its id
    pub async fn insert_topic(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.state
            .lock()
            .await
            .topics
            .insert(id, StoredVotable::default());
        id
    }

    /// Creates an empty forum reply and returns its id
    pub async fn insert_reply(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.state
            .lock()
            .await
            .replies
            .insert(id, StoredVotable::default());
        id
    }

    pub async fn delete_votable(&self, target: VoteTarget) {
        if let Some(votable) = self.state.lock().await.votable_mut(target) {
            votable.deleted = true;
        }
    }

    pub async fn topic_views(&self, topic_id: Uuid) -> Option<i64> {
        self.state
            .lock()
            .await
            .topics
            .get(&topic_id)
            .map(|t| t.view_count)
    }

    /// (upvotes, downvotes) counted from the live vote rows themselves
    pub async fn live_vote_counts(&self, target: VoteTarget) -> (i64, i64) {
        let state = self.state.lock().await;
        state
            .votes
            .values()
            .filter(|vote| vote.target == target)
            .fold((0, 0), |(up, down), vote| {
                if vote.is_upvote {
                    (up + 1, down)
                } else {
                    (up, down + 1)
                }
            })
    }

    pub async fn rating_rows(&self, resource_id: Uuid) -> usize {
        self.state
            .lock()
            .await
            .ratings
            .keys()
            .filter(|(rid, _)| *rid == resource_id)
            .count()
    }
}

impl ResourceStore for InMemoryStore {
    fn find_by_id(&self, id: Uuid) -> BoxFuture<'_, Result<Option<Resource>>> {
        Box::pin(async move { Ok(self.state.lock().await.live_resource(id).cloned()) })
    }

    fn find_filtered<'a>(
        &'a self,
        query: &'a ResourceQuery,
    ) -> BoxFuture<'a, Result<(Vec<Resource>, u64)>> {
        Box::pin(async move {
            let rows = self
                .state
                .lock()
                .await
                .matching(&query.predicate, query.sort);
            let total = rows.len() as u64;
            let page = rows
                .into_iter()
                .skip(query.offset as usize)
                .take(query.limit as usize)
                .collect();
            Ok((page, total))
        })
    }

    fn find_ranked<'a>(
        &'a self,
        predicate: &'a ResourcePredicate,
        sort: SortKey,
        limit: u64,
    ) -> BoxFuture<'a, Result<Vec<Resource>>> {
        Box::pin(async move {
            let mut rows = self.state.lock().await.matching(predicate, sort);
            rows.truncate(limit as usize);
            Ok(rows)
        })
    }

    fn increment_counter(
        &self,
        id: Uuid,
        counter: ResourceCounter,
        delta: u32,
    ) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let Some(stored) = state.resources.get_mut(&id).filter(|s| !s.deleted) else {
                return Ok(false);
            };
            let field = match counter {
                ResourceCounter::View => &mut stored.resource.view_count,
                ResourceCounter::Download => &mut stored.resource.download_count,
            };
            *field += i64::from(delta);
            Ok(true)
        })
    }

    fn save<'a>(&'a self, resource: &'a Resource) -> BoxFuture<'a, Result<Resource>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let mut saved = resource.clone();
            saved.updated_at = Utc::now();
            match state.resources.get(&resource.id) {
                Some(existing) if existing.deleted => {
                    return Err(Error::not_found("resource", resource.id));
                }
                Some(existing) if existing.resource.owner_id != resource.owner_id => {
                    return Err(Error::forbidden("only the owner can edit this resource"));
                }
                Some(existing) => {
                    // Counters and creation time only move through their own paths
                    saved.download_count = existing.resource.download_count;
                    saved.view_count = existing.resource.view_count;
                    saved.created_at = existing.resource.created_at;
                }
                None => {}
            }
            state.resources.insert(
                saved.id,
                StoredResource {
                    resource: saved.clone(),
                    deleted: false,
                },
            );
            Ok(saved)
        })
    }

    fn set_approval(&self, id: Uuid, approved: bool) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            match state.resources.get_mut(&id).filter(|s| !s.deleted) {
                Some(stored) => {
                    stored.resource.is_approved = approved;
                    stored.resource.updated_at = Utc::now();
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    fn soft_delete(&self, id: Uuid) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            match state.resources.get_mut(&id).filter(|s| !s.deleted) {
                Some(stored) => {
                    stored.deleted = true;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    fn find_member(&self, user_id: Uuid) -> BoxFuture<'_, Result<Option<MemberAffinity>>> {
        Box::pin(async move { Ok(self.state.lock().await.members.get(&user_id).copied()) })
    }

    fn ping(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

impl EngagementStore for InMemoryStore {
    fn upsert_rating(
        &self,
        resource_id: Uuid,
        user_id: Uuid,
        value: i32,
    ) -> BoxFuture<'_, Result<Rating>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if state.live_resource(resource_id).is_none() {
                return Err(Error::not_found("resource", resource_id));
            }
            let now = Utc::now();
            let rating = state
                .ratings
                .entry((resource_id, user_id))
                .and_modify(|rating| {
                    rating.value = value;
                    rating.updated_at = now;
                })
                .or_insert_with(|| Rating {
                    id: Uuid::new_v4(),
                    resource_id,
                    user_id,
                    value,
                    created_at: now,
                    updated_at: now,
                });
            Ok(rating.clone())
        })
    }

    fn rating_summary(&self, resource_id: Uuid) -> BoxFuture<'_, Result<RatingSummary>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            let (sum, count) = state
                .ratings
                .values()
                .filter(|rating| rating.resource_id == resource_id)
                .fold((0i64, 0i64), |(sum, count), rating| {
                    (sum + i64::from(rating.value), count + 1)
                });
            if count == 0 {
                return Ok(RatingSummary::empty());
            }
            Ok(RatingSummary {
                average: sum as f64 / count as f64,
                count,
            })
        })
    }

    fn find_rating(
        &self,
        resource_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'_, Result<Option<Rating>>> {
        Box::pin(async move {
            Ok(self
                .state
                .lock()
                .await
                .ratings
                .get(&(resource_id, user_id))
                .cloned())
        })
    }

    fn apply_vote(
        &self,
        target: VoteTarget,
        voter_id: Uuid,
        is_upvote: bool,
    ) -> BoxFuture<'_, Result<VoteOutcome>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if state.votable(target).is_none() {
                return Err(Error::not_found(target.entity_name(), target.id()));
            }

            let existing = state.votes.get(&(target, voter_id)).map(|v| v.is_upvote);
            let outcome = VoteOutcome::decide(existing, is_upvote);
            match outcome {
                VoteOutcome::Unchanged => return Ok(outcome),
                VoteOutcome::Recorded { .. } => {
                    state.votes.insert(
                        (target, voter_id),
                        Vote {
                            id: Uuid::new_v4(),
                            voter_id,
                            target,
                            is_upvote,
                            created_at: Utc::now(),
                        },
                    );
                }
                VoteOutcome::Flipped { .. } => {
                    if let Some(vote) = state.votes.get_mut(&(target, voter_id)) {
                        vote.is_upvote = is_upvote;
                    }
                }
            }
            if let Some(votable) = state.votable_mut(target) {
                votable.tally.apply(outcome);
            }
            Ok(outcome)
        })
    }

    fn find_vote(
        &self,
        target: VoteTarget,
        voter_id: Uuid,
    ) -> BoxFuture<'_, Result<Option<Vote>>> {
        Box::pin(async move {
            Ok(self
                .state
                .lock()
                .await
                .votes
                .get(&(target, voter_id))
                .cloned())
        })
    }

    fn vote_tally(&self, target: VoteTarget) -> BoxFuture<'_, Result<Option<VoteTally>>> {
        Box::pin(async move { Ok(self.state.lock().await.votable(target).map(|v| v.tally)) })
    }

    fn increment_topic_views(&self, topic_id: Uuid) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            match self.state.lock().await.votable_mut(VoteTarget::Topic(topic_id)) {
                Some(topic) => {
                    topic.view_count += 1;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }
}
