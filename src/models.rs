//! Domain types shared by the resolver, ledger, catalog and recommender.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Kind of academic material a resource holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Notes,
    Slides,
    Textbook,
    Assignment,
    Exam,
    Video,
    Other,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Notes => "notes",
            ResourceType::Slides => "slides",
            ResourceType::Textbook => "textbook",
            ResourceType::Assignment => "assignment",
            ResourceType::Exam => "exam",
            ResourceType::Video => "video",
            ResourceType::Other => "other",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "notes" => Ok(ResourceType::Notes),
            "slides" => Ok(ResourceType::Slides),
            "textbook" => Ok(ResourceType::Textbook),
            "assignment" => Ok(ResourceType::Assignment),
            "exam" => Ok(ResourceType::Exam),
            "video" => Ok(ResourceType::Video),
            "other" => Ok(ResourceType::Other),
            other => Err(Error::validation(format!("unknown resource type '{}'", other))),
        }
    }
}

/// Declared audience of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharingScope {
    #[default]
    Public,
    University,
    Course,
}

impl SharingScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SharingScope::Public => "public",
            SharingScope::University => "university",
            SharingScope::Course => "course",
        }
    }
}

impl fmt::Display for SharingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SharingScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "public" => Ok(SharingScope::Public),
            "university" => Ok(SharingScope::University),
            "course" => Ok(SharingScope::Course),
            other => Err(Error::validation(format!("unknown sharing scope '{}'", other))),
        }
    }
}

/// An uploaded academic resource (metadata only, never payload bytes)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub resource_type: ResourceType,
    pub file_name: String,
    pub file_size: i64,
    pub file_type: String,
    #[serde(skip_serializing)]
    pub storage_key: String,
    pub university_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub course_id: Option<Uuid>,
    pub sharing_scope: SharingScope,
    pub is_approved: bool,
    pub download_count: i64,
    pub view_count: i64,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Resource {
    /// A fresh, approved, public resource owned by `owner_id`
    pub fn new(owner_id: Uuid, title: impl Into<String>, resource_type: ResourceType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            title: title.into(),
            description: String::new(),
            resource_type,
            file_name: String::new(),
            file_size: 0,
            file_type: String::new(),
            storage_key: String::new(),
            university_id: None,
            department_id: None,
            course_id: None,
            sharing_scope: SharingScope::Public,
            is_approved: true,
            download_count: 0,
            view_count: 0,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Scope invariants: course scope needs a course, university scope a university.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::validation("title must not be empty"));
        }
        match self.sharing_scope {
            SharingScope::Course if self.course_id.is_none() => Err(Error::validation(
                "course-scoped resources must reference a course",
            )),
            SharingScope::University if self.university_id.is_none() => Err(Error::validation(
                "university-scoped resources must reference a university",
            )),
            _ => Ok(()),
        }
    }
}

/// Role carried by an authenticated viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Student,
    Moderator,
    Admin,
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            other => Err(Error::validation(format!("unknown role '{}'", other))),
        }
    }
}

/// Authenticated caller as supplied by the identity gateway.
/// Anonymous requests carry no `Viewer` at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewer {
    pub id: Uuid,
    pub university_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub role: Role,
}

impl Viewer {
    pub fn student(id: Uuid) -> Self {
        Self {
            id,
            university_id: None,
            department_id: None,
            role: Role::Student,
        }
    }

    pub fn with_university(mut self, university_id: Uuid) -> Self {
        self.university_id = Some(university_id);
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn can_moderate(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Moderator)
    }
}

/// Academic affiliation of a registered member, used for recommendations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberAffinity {
    pub user_id: Uuid,
    pub university_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
}

/// A user's 1-5 rating of a resource; unique per (resource, user)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Rating {
    pub id: Uuid,
    pub resource_id: Uuid,
    pub user_id: Uuid,
    pub value: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

/// Average rating recomputed on read over live ratings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    pub average: f64,
    pub count: i64,
}

impl RatingSummary {
    pub fn empty() -> Self {
        Self {
            average: 0.0,
            count: 0,
        }
    }
}

/// The two kinds of votable forum entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VotableKind {
    Topic,
    Reply,
}

impl VotableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VotableKind::Topic => "topic",
            VotableKind::Reply => "reply",
        }
    }
}

/// A vote target: a forum topic or a forum reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum VoteTarget {
    Topic(Uuid),
    Reply(Uuid),
}

impl VoteTarget {
    pub fn kind(&self) -> VotableKind {
        match self {
            VoteTarget::Topic(_) => VotableKind::Topic,
            VoteTarget::Reply(_) => VotableKind::Reply,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            VoteTarget::Topic(id) | VoteTarget::Reply(id) => *id,
        }
    }

    pub fn entity_name(&self) -> &'static str {
        self.kind().as_str()
    }
}

impl fmt::Display for VoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind().as_str(), self.id())
    }
}

/// A live vote; at most one per (voter, target)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub id: Uuid,
    pub voter_id: Uuid,
    pub target: VoteTarget,
    pub is_upvote: bool,
    pub created_at: DateTime<Utc>,
}

/// Up/down counters stored on a topic or reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VoteTally {
    pub upvote_count: i64,
    pub downvote_count: i64,
}

impl VoteTally {
    pub fn score(&self) -> i64 {
        self.upvote_count - self.downvote_count
    }

    /// Counter transition for one vote mutation
    pub fn apply(&mut self, outcome: VoteOutcome) {
        match outcome {
            VoteOutcome::Recorded { is_upvote: true } => self.upvote_count += 1,
            VoteOutcome::Recorded { is_upvote: false } => self.downvote_count += 1,
            VoteOutcome::Flipped { is_upvote: true } => {
                self.upvote_count += 1;
                self.downvote_count -= 1;
            }
            VoteOutcome::Flipped { is_upvote: false } => {
                self.downvote_count += 1;
                self.upvote_count -= 1;
            }
            VoteOutcome::Unchanged => {}
        }
    }
}

/// What a single vote call did to the target's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VoteOutcome {
    /// First vote by this voter on the target
    Recorded { is_upvote: bool },
    /// Same polarity as the existing vote
    Unchanged,
    /// Existing vote switched to `is_upvote`
    Flipped { is_upvote: bool },
}

impl VoteOutcome {
    /// Decide the transition from the voter's existing vote, if any
    pub fn decide(existing: Option<bool>, is_upvote: bool) -> Self {
        match existing {
            None => VoteOutcome::Recorded { is_upvote },
            Some(current) if current == is_upvote => VoteOutcome::Unchanged,
            Some(_) => VoteOutcome::Flipped { is_upvote },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VoteOutcome::Recorded { .. } => "recorded",
            VoteOutcome::Unchanged => "unchanged",
            VoteOutcome::Flipped { .. } => "flipped",
        }
    }
}

/// Monotonic resource counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceCounter {
    View,
    Download,
}

impl ResourceCounter {
    pub fn column(&self) -> &'static str {
        match self {
            ResourceCounter::View => "view_count",
            ResourceCounter::Download => "download_count",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_invariants() {
        let mut resource = Resource::new(Uuid::new_v4(), "Linear algebra notes", ResourceType::Notes);
        assert!(resource.validate().is_ok());

        resource.sharing_scope = SharingScope::Course;
        assert!(matches!(resource.validate(), Err(Error::Validation { .. })));
        resource.course_id = Some(Uuid::new_v4());
        assert!(resource.validate().is_ok());

        resource.sharing_scope = SharingScope::University;
        assert!(resource.validate().is_err());
        resource.university_id = Some(Uuid::new_v4());
        assert!(resource.validate().is_ok());
    }

    #[test]
    fn test_vote_outcome_transitions() {
        assert_eq!(
            VoteOutcome::decide(None, true),
            VoteOutcome::Recorded { is_upvote: true }
        );
        assert_eq!(VoteOutcome::decide(Some(true), true), VoteOutcome::Unchanged);
        assert_eq!(
            VoteOutcome::decide(Some(true), false),
            VoteOutcome::Flipped { is_upvote: false }
        );
    }

    #[test]
    fn test_tally_flip_moves_one_vote() {
        let mut tally = VoteTally::default();
        tally.apply(VoteOutcome::Recorded { is_upvote: true });
        tally.apply(VoteOutcome::Flipped { is_upvote: false });
        assert_eq!(tally.upvote_count, 0);
        assert_eq!(tally.downvote_count, 1);
        assert_eq!(tally.score(), -1);
    }

    #[test]
    fn test_resource_type_parsing_is_case_insensitive() {
        assert_eq!("Slides".parse::<ResourceType>().unwrap(), ResourceType::Slides);
        assert!("poster".parse::<ResourceType>().is_err());
    }

    #[test]
    fn test_vote_target_kind_and_display() {
        let id = Uuid::new_v4();
        let target = VoteTarget::Reply(id);
        assert_eq!(target.id(), id);
        assert_eq!(target.kind(), VotableKind::Reply);
        assert_eq!(target.kind().as_str(), "reply");
        assert_eq!(target.to_string(), format!("reply:{}", id));
    }
}
