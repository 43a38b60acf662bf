use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::application::import::{ImportPlan, ImportSummary, PlannedPost};
use crate::application::repos::{CreateCommentParams, ImportRepo, RepoError};
use crate::domain::posts::PublishDate;

use super::{PostgresRepositories, map_sqlx_error};

struct UpsertedPost {
    id: Uuid,
    inserted: bool,
}

impl PostgresRepositories {
    async fn upsert_post(
        tx: &mut Transaction<'_, Postgres>,
        post: &PlannedPost,
    ) -> Result<UpsertedPost, RepoError> {
        let day = PublishDate::of(post.publish).ok_or_else(|| RepoError::InvalidInput {
            message: format!("publish date of `{}` is out of range", post.slug),
        })?;

        let existing: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM posts WHERE slug = $1 AND publish >= $2 AND publish < $3",
        )
        .bind(&post.slug)
        .bind(day.start())
        .bind(day.end())
        .fetch_optional(tx.as_mut())
        .await
        .map_err(map_sqlx_error)?;

        match existing {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE posts
                    SET title = $2, body = $3, status = $4, publish = $5, updated_at = now()
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(&post.title)
                .bind(&post.body)
                .bind(post.status)
                .bind(post.publish)
                .execute(tx.as_mut())
                .await
                .map_err(map_sqlx_error)?;
                Ok(UpsertedPost {
                    id,
                    inserted: false,
                })
            }
            None => {
                let id = Uuid::new_v4();
                sqlx::query(
                    r#"
                    INSERT INTO posts (id, slug, title, body, status, publish)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(id)
                .bind(&post.slug)
                .bind(&post.title)
                .bind(&post.body)
                .bind(post.status)
                .bind(post.publish)
                .execute(tx.as_mut())
                .await
                .map_err(map_sqlx_error)?;
                Ok(UpsertedPost { id, inserted: true })
            }
        }
    }
}

#[async_trait]
impl ImportRepo for PostgresRepositories {
    async fn apply_import(&self, plan: &ImportPlan) -> Result<ImportSummary, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        let mut summary = ImportSummary::default();

        let mut tag_ids: HashMap<&str, Uuid> = HashMap::new();
        for tag in &plan.tags {
            let id: Uuid = sqlx::query_scalar(
                r#"
                INSERT INTO tags (id, slug, name)
                VALUES ($1, $2, $3)
                ON CONFLICT (slug) DO UPDATE SET name = EXCLUDED.name
                RETURNING id
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&tag.slug)
            .bind(&tag.name)
            .fetch_one(tx.as_mut())
            .await
            .map_err(map_sqlx_error)?;
            tag_ids.insert(tag.slug.as_str(), id);
            summary.tags += 1;
        }

        for post in &plan.posts {
            let upserted = Self::upsert_post(&mut tx, post).await?;
            if upserted.inserted {
                summary.posts_created += 1;
            } else {
                summary.posts_updated += 1;
            }

            sqlx::query("DELETE FROM post_tags WHERE post_id = $1")
                .bind(upserted.id)
                .execute(tx.as_mut())
                .await
                .map_err(map_sqlx_error)?;

            let ids = post
                .tag_slugs
                .iter()
                .map(|slug| {
                    tag_ids
                        .get(slug.as_str())
                        .copied()
                        .ok_or_else(|| RepoError::Integrity {
                            message: format!("tag `{slug}` missing from import plan"),
                        })
                })
                .collect::<Result<Vec<Uuid>, RepoError>>()?;

            if !ids.is_empty() {
                let mut qb = QueryBuilder::<Postgres>::new("INSERT INTO post_tags (post_id, tag_id) ");
                qb.push_values(ids, |mut row, tag_id| {
                    row.push_bind(upserted.id).push_bind(tag_id);
                });
                qb.build()
                    .execute(tx.as_mut())
                    .await
                    .map_err(map_sqlx_error)?;
            }

            if upserted.inserted {
                for comment in &post.comments {
                    let params = CreateCommentParams {
                        post_id: upserted.id,
                        name: comment.name.clone(),
                        email: comment.email.clone(),
                        body: comment.body.clone(),
                    };
                    Self::insert_comment(tx.as_mut(), &params, comment.active).await?;
                    summary.comments += 1;
                }
            }
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(summary)
    }
}
