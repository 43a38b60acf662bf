//! Content import from a TOML archive.
//!
//! An archive lists tags and posts; posts may carry their comments:
//!
//! ```toml
//! [[tags]]
//! name = "Django"
//!
//! [[posts]]
//! title = "Who was Django Reinhardt?"
//! body = "..."
//! status = "published"
//! publish = "2024-01-05T10:00:00Z"
//! tags = ["django"]
//!
//! [[posts.comments]]
//! name = "Ada"
//! email = "ada@example.com"
//! body = "Great post!"
//! ```
//!
//! Tags are upserted by slug and posts by publish date and slug. Comments are
//! only written for posts the import creates, so re-running an import does
//! not duplicate them.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::info;

use crate::application::forms::is_valid_email;
use crate::application::repos::{ImportRepo, RepoError};
use crate::domain::posts::PublishDate;
use crate::domain::slug::{SlugError, derive_slug, resolve_slug};
use crate::domain::types::PostStatus;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read archive: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid archive: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{context}: {source}")]
    Slug {
        context: String,
        #[source]
        source: SlugError,
    },
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Archive {
    #[serde(default)]
    tags: Vec<ArchiveTag>,
    #[serde(default)]
    posts: Vec<ArchivePost>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ArchiveTag {
    name: String,
    slug: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ArchivePost {
    title: String,
    slug: Option<String>,
    body: String,
    #[serde(default)]
    status: Option<String>,
    publish: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    comments: Vec<ArchiveComment>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ArchiveComment {
    name: String,
    email: String,
    body: String,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTag {
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedComment {
    pub name: String,
    pub email: String,
    pub body: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPost {
    pub slug: String,
    pub title: String,
    pub body: String,
    pub status: PostStatus,
    pub publish: OffsetDateTime,
    pub tag_slugs: Vec<String>,
    pub comments: Vec<PlannedComment>,
}

/// A validated archive, ready to be written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportPlan {
    pub tags: Vec<PlannedTag>,
    pub posts: Vec<PlannedPost>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub tags: usize,
    pub posts_created: usize,
    pub posts_updated: usize,
    pub comments: usize,
}

/// Parse and validate an archive. `now` is used for posts without a
/// `publish` timestamp.
pub fn plan_import(source: &str, now: OffsetDateTime) -> Result<ImportPlan, ImportError> {
    let archive: Archive = toml::from_str(source)?;

    let mut tags: Vec<PlannedTag> = Vec::new();
    let mut tag_index: HashMap<String, usize> = HashMap::new();
    let mut names: HashMap<String, String> = HashMap::new();

    for tag in archive.tags {
        let name = tag.name.trim().to_string();
        let slug = resolve_slug(tag.slug.as_deref(), &name).map_err(|source| ImportError::Slug {
            context: format!("tag `{name}`"),
            source,
        })?;
        if tag_index.contains_key(&slug) {
            return Err(ImportError::Invalid(format!("duplicate tag slug `{slug}`")));
        }
        names.insert(name.to_lowercase(), slug.clone());
        tag_index.insert(slug.clone(), tags.len());
        tags.push(PlannedTag { slug, name });
    }

    let mut posts = Vec::with_capacity(archive.posts.len());
    let mut addresses: HashSet<(time::Date, String)> = HashSet::new();

    for post in archive.posts {
        let title = post.title.trim().to_string();
        if title.is_empty() {
            return Err(ImportError::Invalid("post title must not be empty".into()));
        }
        let slug = resolve_slug(post.slug.as_deref(), &title).map_err(|source| {
            ImportError::Slug {
                context: format!("post `{title}`"),
                source,
            }
        })?;

        let status = match post.status.as_deref() {
            None => PostStatus::Draft,
            Some(value) => PostStatus::try_from(value).map_err(|_| {
                ImportError::Invalid(format!("post `{title}` has unknown status `{value}`"))
            })?,
        };

        let publish = match post.publish.as_deref() {
            None => now,
            Some(value) => OffsetDateTime::parse(value, &Rfc3339).map_err(|err| {
                ImportError::Invalid(format!(
                    "post `{title}` has invalid publish timestamp `{value}`: {err}"
                ))
            })?,
        };
        let day = PublishDate::of(publish).ok_or_else(|| {
            ImportError::Invalid(format!("post `{title}` publish date is out of range"))
        })?;
        if !addresses.insert((day.date(), slug.clone())) {
            return Err(ImportError::Invalid(format!(
                "more than one post uses slug `{slug}` on {}",
                day.date()
            )));
        }

        let mut tag_slugs = Vec::with_capacity(post.tags.len());
        for reference in post.tags {
            let reference = reference.trim();
            let slug = match names.get(&reference.to_lowercase()) {
                Some(slug) => slug.clone(),
                None => derive_slug(reference).map_err(|source| ImportError::Slug {
                    context: format!("tag `{reference}` of post `{title}`"),
                    source,
                })?,
            };
            if !tag_index.contains_key(&slug) {
                tag_index.insert(slug.clone(), tags.len());
                tags.push(PlannedTag {
                    slug: slug.clone(),
                    name: reference.to_string(),
                });
            }
            if !tag_slugs.contains(&slug) {
                tag_slugs.push(slug);
            }
        }

        let mut comments = Vec::with_capacity(post.comments.len());
        for comment in post.comments {
            let email = comment.email.trim().to_string();
            if !is_valid_email(&email) {
                return Err(ImportError::Invalid(format!(
                    "comment on post `{title}` has invalid email `{email}`"
                )));
            }
            let name = comment.name.trim().to_string();
            let body = comment.body.trim().to_string();
            if name.is_empty() || body.is_empty() {
                return Err(ImportError::Invalid(format!(
                    "comment on post `{title}` needs a name and a body"
                )));
            }
            comments.push(PlannedComment {
                name,
                email,
                body,
                active: comment.active,
            });
        }

        posts.push(PlannedPost {
            slug,
            title,
            body: post.body,
            status,
            publish,
            tag_slugs,
            comments,
        });
    }

    Ok(ImportPlan { tags, posts })
}

#[derive(Clone)]
pub struct ImportService {
    repo: Arc<dyn ImportRepo>,
}

impl ImportService {
    pub fn new(repo: Arc<dyn ImportRepo>) -> Self {
        Self { repo }
    }

    pub async fn import_file(&self, path: &Path) -> Result<ImportSummary, ImportError> {
        let source = tokio::fs::read_to_string(path).await?;
        let plan = plan_import(&source, OffsetDateTime::now_utc())?;
        let summary = self.repo.apply_import(&plan).await?;
        info!(
            target = "quire::application::import",
            path = %path.display(),
            tags = summary.tags,
            posts_created = summary.posts_created,
            posts_updated = summary.posts_updated,
            comments = summary.comments,
            "content archive imported"
        );
        Ok(summary)
    }
}
