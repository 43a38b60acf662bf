use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::forms::{CommentForm, FieldErrors};
use crate::application::listing::{PostSummary, summarize};
use crate::application::render::render_body;
use crate::application::repos::{
    CommentsRepo, CreateCommentParams, PostsRepo, RepoError, TagsRepo,
};
use crate::domain::entities::{CommentRecord, PostRecord, TagRecord};
use crate::domain::posts::{PublishDate, SIMILAR_POSTS_LIMIT, rank_similar};

pub const METRIC_COMMENTS_CREATED: &str = "quire_comments_created_total";

#[derive(Debug, Clone)]
pub struct PostDetail {
    pub post: PostRecord,
    pub body_html: String,
    pub tags: Vec<TagRecord>,
    pub comments: Vec<CommentRecord>,
    pub similar: Vec<PostSummary>,
}

#[derive(Debug, Clone)]
pub enum CommentOutcome {
    Created {
        detail: PostDetail,
        comment: CommentRecord,
    },
    Rejected {
        detail: PostDetail,
        form: CommentForm,
        errors: FieldErrors,
    },
}

#[derive(Debug, Error)]
pub enum DetailError {
    #[error("post not found")]
    NotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct PostDetailService {
    posts: Arc<dyn PostsRepo>,
    tags: Arc<dyn TagsRepo>,
    comments: Arc<dyn CommentsRepo>,
}

impl PostDetailService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        tags: Arc<dyn TagsRepo>,
        comments: Arc<dyn CommentsRepo>,
    ) -> Self {
        Self {
            posts,
            tags,
            comments,
        }
    }

    pub async fn load(&self, date: PublishDate, slug: &str) -> Result<PostDetail, DetailError> {
        let post = self.resolve(date, slug).await?;
        self.assemble(post).await
    }

    /// Validate and persist a comment on the post addressed by `date` and
    /// `slug`. Invalid forms are returned with their errors and nothing is
    /// written.
    pub async fn submit_comment(
        &self,
        date: PublishDate,
        slug: &str,
        form: CommentForm,
    ) -> Result<CommentOutcome, DetailError> {
        let post = self.resolve(date, slug).await?;

        let new_comment = match form.validate() {
            Ok(comment) => comment,
            Err(errors) => {
                let detail = self.assemble(post).await?;
                return Ok(CommentOutcome::Rejected {
                    detail,
                    form: form.normalized(),
                    errors,
                });
            }
        };

        let comment = self
            .comments
            .create_comment(CreateCommentParams {
                post_id: post.id,
                name: new_comment.name,
                email: new_comment.email,
                body: new_comment.body,
            })
            .await?;

        metrics::counter!(METRIC_COMMENTS_CREATED).increment(1);
        info!(
            target = "quire::application::detail",
            post_id = %post.id,
            comment_id = %comment.id,
            "comment created"
        );

        let detail = self.assemble(post).await?;
        Ok(CommentOutcome::Created { detail, comment })
    }

    async fn resolve(&self, date: PublishDate, slug: &str) -> Result<PostRecord, DetailError> {
        let mut matches = self.posts.find_published_by_date(date, slug).await?;
        match (matches.pop(), matches.is_empty()) {
            (Some(post), true) => Ok(post),
            _ => Err(DetailError::NotFound),
        }
    }

    async fn assemble(&self, post: PostRecord) -> Result<PostDetail, DetailError> {
        let tags = self.tags.list_for_post(post.id).await?;
        let comments = self.comments.list_active_for_post(post.id).await?;

        let candidates = if tags.is_empty() {
            Vec::new()
        } else {
            self.posts.list_similar_candidates(post.id).await?
        };
        let mut similar = Vec::new();
        for candidate in rank_similar(candidates, post.id, SIMILAR_POSTS_LIMIT) {
            similar.push(summarize(self.tags.as_ref(), candidate.post).await?);
        }

        Ok(PostDetail {
            body_html: render_body(&post.body),
            post,
            tags,
            comments,
            similar,
        })
    }
}
