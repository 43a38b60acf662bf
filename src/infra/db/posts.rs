use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{PostQueryFilter, PostsRepo, RepoError};
use crate::domain::entities::PostRecord;
use crate::domain::posts::{PublishDate, SimilarCandidate};
use crate::domain::types::PostStatus;

use super::{POST_COLUMNS, PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
pub(super) struct PostRow {
    pub(super) id: Uuid,
    pub(super) slug: String,
    pub(super) title: String,
    pub(super) body: String,
    pub(super) status: PostStatus,
    pub(super) publish: OffsetDateTime,
    pub(super) created_at: OffsetDateTime,
    pub(super) updated_at: OffsetDateTime,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            title: row.title,
            body: row.body,
            status: row.status,
            publish: row.publish,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SimilarRow {
    #[sqlx(flatten)]
    post: PostRow,
    same_tags: i64,
}

fn select_published<'q>() -> QueryBuilder<'q, Postgres> {
    let mut qb = QueryBuilder::new("SELECT ");
    qb.push(POST_COLUMNS);
    qb.push(" FROM posts p WHERE");
    PostgresRepositories::push_published_condition(&mut qb);
    qb
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn count_published(&self, filter: &PostQueryFilter) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM posts p WHERE");
        Self::push_published_condition(&mut qb);
        Self::apply_filter(&mut qb, filter);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Self::convert_count(count)
    }

    async fn list_published(
        &self,
        filter: &PostQueryFilter,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let offset = i64::try_from(offset)
            .map_err(|_| RepoError::InvalidInput {
                message: "page offset out of range".to_string(),
            })?;

        let mut qb = select_published();
        Self::apply_filter(&mut qb, filter);
        qb.push(" ORDER BY p.publish DESC, p.id DESC LIMIT ");
        qb.push_bind(i64::from(limit));
        qb.push(" OFFSET ");
        qb.push_bind(offset);

        let rows = qb
            .build_query_as::<PostRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(PostRecord::from).collect())
    }

    async fn find_published_by_date(
        &self,
        date: PublishDate,
        slug: &str,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let mut qb = select_published();
        qb.push(" AND p.slug = ");
        qb.push_bind(slug.to_string());
        qb.push(" AND p.publish >= ");
        qb.push_bind(date.start());
        qb.push(" AND p.publish < ");
        qb.push_bind(date.end());
        qb.push(" ORDER BY p.id LIMIT 2");

        let rows = qb
            .build_query_as::<PostRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(PostRecord::from).collect())
    }

    async fn find_published_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        let mut qb = select_published();
        qb.push(" AND p.id = ");
        qb.push_bind(id);

        let row = qb
            .build_query_as::<PostRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(PostRecord::from))
    }

    async fn list_similar_candidates(
        &self,
        post_id: Uuid,
    ) -> Result<Vec<SimilarCandidate>, RepoError> {
        let sql = format!(
            "SELECT {POST_COLUMNS}, COUNT(pt.tag_id) AS same_tags \
             FROM posts p \
             INNER JOIN post_tags pt ON pt.post_id = p.id \
             WHERE p.status = $1 \
               AND p.id <> $2 \
               AND pt.tag_id IN (SELECT tag_id FROM post_tags WHERE post_id = $2) \
             GROUP BY p.id \
             ORDER BY same_tags DESC, p.publish DESC, p.id DESC"
        );

        let rows = sqlx::query_as::<_, SimilarRow>(&sql)
            .bind(PostStatus::Published)
            .bind(post_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| {
                let shared_tags = u32::try_from(row.same_tags)
                    .map_err(|_| RepoError::from_persistence("shared tag count out of range"))?;
                Ok(SimilarCandidate {
                    post: row.post.into(),
                    shared_tags,
                })
            })
            .collect()
    }

    async fn list_recent_published(&self, limit: u32) -> Result<Vec<PostRecord>, RepoError> {
        let mut qb = select_published();
        qb.push(" ORDER BY p.publish DESC, p.id DESC LIMIT ");
        qb.push_bind(i64::from(limit));

        let rows = qb
            .build_query_as::<PostRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(PostRecord::from).collect())
    }
}
