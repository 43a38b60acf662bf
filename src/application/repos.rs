//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::application::import::{ImportPlan, ImportSummary};
use crate::domain::entities::{CommentRecord, PostRecord, TagRecord};
use crate::domain::posts::{PublishDate, SimilarCandidate};
use crate::domain::search::{SearchStrategy, SearchTuning};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Narrowing applied to the published-post listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostQueryFilter {
    pub tag: Option<String>,
}

impl PostQueryFilter {
    pub fn tagged(slug: impl Into<String>) -> Self {
        Self {
            tag: Some(slug.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateCommentParams {
    pub post_id: Uuid,
    pub name: String,
    pub email: String,
    pub body: String,
}

/// A post matched by a search strategy. `score` is the rank or similarity
/// for strategies that compute one.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub post: PostRecord,
    pub score: Option<f32>,
}

/// Read access to published posts. Every method here only ever returns
/// posts whose status is `published`.
#[async_trait]
pub trait PostsRepo: Send + Sync {
    async fn count_published(&self, filter: &PostQueryFilter) -> Result<u64, RepoError>;

    /// Published posts ordered by publish time, newest first.
    async fn list_published(
        &self,
        filter: &PostQueryFilter,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<PostRecord>, RepoError>;

    /// Published posts published on `date` with `slug`. Returns at most two
    /// rows so callers can tell a unique match from an ambiguous one.
    async fn find_published_by_date(
        &self,
        date: PublishDate,
        slug: &str,
    ) -> Result<Vec<PostRecord>, RepoError>;

    async fn find_published_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError>;

    /// Published posts sharing at least one tag with `post_id`, excluding it,
    /// with the number of shared tags.
    async fn list_similar_candidates(
        &self,
        post_id: Uuid,
    ) -> Result<Vec<SimilarCandidate>, RepoError>;

    async fn list_recent_published(&self, limit: u32) -> Result<Vec<PostRecord>, RepoError>;
}

#[async_trait]
pub trait TagsRepo: Send + Sync {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<TagRecord>, RepoError>;

    async fn list_for_post(&self, post_id: Uuid) -> Result<Vec<TagRecord>, RepoError>;
}

#[async_trait]
pub trait CommentsRepo: Send + Sync {
    /// Active comments of a post, oldest first.
    async fn list_active_for_post(&self, post_id: Uuid) -> Result<Vec<CommentRecord>, RepoError>;

    async fn create_comment(&self, params: CreateCommentParams)
    -> Result<CommentRecord, RepoError>;
}

#[async_trait]
pub trait SearchRepo: Send + Sync {
    async fn search_posts(
        &self,
        strategy: SearchStrategy,
        query: &str,
        tuning: &SearchTuning,
    ) -> Result<Vec<SearchHit>, RepoError>;
}

#[async_trait]
pub trait HealthRepo: Send + Sync {
    async fn ping(&self) -> Result<(), RepoError>;
}

/// Writes a validated content archive. Implementations apply the whole
/// plan atomically.
#[async_trait]
pub trait ImportRepo: Send + Sync {
    async fn apply_import(&self, plan: &ImportPlan) -> Result<ImportSummary, RepoError>;
}
