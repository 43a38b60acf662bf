use std::sync::Arc;

use thiserror::Error;

use crate::application::pagination::{Page, Paginator};
use crate::application::repos::{PostQueryFilter, PostsRepo, RepoError, TagsRepo};
use crate::domain::entities::{PostRecord, TagRecord};
use crate::domain::posts::{EXCERPT_WORDS, truncate_words};

/// A post as shown on listing pages.
#[derive(Debug, Clone, PartialEq)]
pub struct PostSummary {
    pub post: PostRecord,
    pub tags: Vec<TagRecord>,
    pub excerpt: String,
}

#[derive(Debug, Clone)]
pub struct ListingView {
    pub tag: Option<TagRecord>,
    pub page: Page<PostSummary>,
}

#[derive(Debug, Error)]
pub enum ListingError {
    #[error("unknown tag")]
    UnknownTag,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct ListingService {
    posts: Arc<dyn PostsRepo>,
    tags: Arc<dyn TagsRepo>,
    paginator: Paginator,
}

impl ListingService {
    pub fn new(posts: Arc<dyn PostsRepo>, tags: Arc<dyn TagsRepo>, paginator: Paginator) -> Self {
        Self {
            posts,
            tags,
            paginator,
        }
    }

    /// One page of published posts, newest first, optionally narrowed to a tag.
    ///
    /// The page token never fails the request; see [`Paginator::resolve`].
    pub async fn list(
        &self,
        tag: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<ListingView, ListingError> {
        let (tag, filter) = match tag {
            Some(slug) => {
                let record = self
                    .tags
                    .find_by_slug(slug)
                    .await?
                    .ok_or(ListingError::UnknownTag)?;
                let filter = PostQueryFilter::tagged(record.slug.clone());
                (Some(record), filter)
            }
            None => (None, PostQueryFilter::default()),
        };

        let total = self.posts.count_published(&filter).await?;
        let window = self.paginator.resolve(page_token, total);
        let posts = self
            .posts
            .list_published(&filter, window.offset(), window.limit())
            .await?;

        let mut items = Vec::with_capacity(posts.len());
        for post in posts {
            items.push(summarize(self.tags.as_ref(), post).await?);
        }

        Ok(ListingView {
            tag,
            page: Page::new(items, window),
        })
    }
}

pub(crate) async fn summarize(
    tags: &dyn TagsRepo,
    post: PostRecord,
) -> Result<PostSummary, RepoError> {
    let tags = tags.list_for_post(post.id).await?;
    let excerpt = truncate_words(&post.body, EXCERPT_WORDS);
    Ok(PostSummary {
        post,
        tags,
        excerpt,
    })
}
