use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{CommentsRepo, CreateCommentParams, RepoError},
    domain::entities::CommentRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: Uuid,
    post_id: Uuid,
    name: String,
    email: String,
    body: String,
    active: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<CommentRow> for CommentRecord {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            post_id: row.post_id,
            name: row.name,
            email: row.email,
            body: row.body,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl PostgresRepositories {
    pub(super) async fn insert_comment<'e, E>(
        executor: E,
        params: &CreateCommentParams,
        active: bool,
    ) -> Result<CommentRecord, RepoError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query_as::<_, CommentRow>(
            r#"
            INSERT INTO comments (id, post_id, name, email, body, active)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, post_id, name, email, body, active, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(params.post_id)
        .bind(&params.name)
        .bind(&params.email)
        .bind(&params.body)
        .bind(active)
        .fetch_one(executor)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }
}

#[async_trait]
impl CommentsRepo for PostgresRepositories {
    async fn list_active_for_post(&self, post_id: Uuid) -> Result<Vec<CommentRecord>, RepoError> {
        let rows = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT id, post_id, name, email, body, active, created_at, updated_at
            FROM comments
            WHERE post_id = $1 AND active
            ORDER BY created_at, id
            "#,
        )
        .bind(post_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CommentRecord::from).collect())
    }

    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        Self::insert_comment(self.pool(), &params, true).await
    }
}
