//! Full-text and trigram search over published posts.

use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};

use crate::application::repos::{RepoError, SearchHit, SearchRepo};
use crate::domain::search::{SearchStrategy, SearchTuning};

use super::posts::PostRow;
use super::{POST_COLUMNS, PostgresRepositories, map_sqlx_error};

const PLAIN_VECTOR: &str = "to_tsvector(p.title || ' ' || p.body)";
const WEIGHTED_VECTOR: &str =
    "(setweight(to_tsvector(p.title), 'A') || setweight(to_tsvector(p.body), 'B'))";

#[derive(sqlx::FromRow)]
struct ScoredRow {
    #[sqlx(flatten)]
    post: PostRow,
    score: Option<f32>,
}

impl From<ScoredRow> for SearchHit {
    fn from(row: ScoredRow) -> Self {
        Self {
            post: row.post.into(),
            score: row.score,
        }
    }
}

/// Build the SQL for one strategy. Every strategy only considers published
/// posts; ties are broken by recency.
pub(super) fn build_search_query<'q>(
    strategy: SearchStrategy,
    query: &'q str,
    tuning: &SearchTuning,
) -> QueryBuilder<'q, Postgres> {
    let mut qb = QueryBuilder::new("SELECT ");
    qb.push(POST_COLUMNS);

    match strategy {
        SearchStrategy::Simple => {
            qb.push(", NULL::real AS score FROM posts p WHERE");
            PostgresRepositories::push_published_condition(&mut qb);
            qb.push(" AND ");
            qb.push(PLAIN_VECTOR);
            qb.push(" @@ plainto_tsquery(");
            qb.push_bind(query);
            qb.push(") ORDER BY p.publish DESC, p.id DESC");
        }
        SearchStrategy::Rank => {
            qb.push(", ts_rank(");
            qb.push(PLAIN_VECTOR);
            qb.push(", plainto_tsquery(");
            qb.push_bind(query);
            qb.push(")) AS score FROM posts p WHERE");
            PostgresRepositories::push_published_condition(&mut qb);
            qb.push(" AND ");
            qb.push(PLAIN_VECTOR);
            qb.push(" @@ plainto_tsquery(");
            qb.push_bind(query);
            qb.push(") ORDER BY score DESC, p.publish DESC, p.id DESC");
        }
        SearchStrategy::Weighted => {
            let weights = tuning.rank_weights().to_vec();
            qb.push(", ranked.score FROM posts p CROSS JOIN LATERAL (SELECT ts_rank(");
            qb.push_bind(weights);
            qb.push("::real[], ");
            qb.push(WEIGHTED_VECTOR);
            qb.push(", plainto_tsquery(");
            qb.push_bind(query);
            qb.push(")) AS score) ranked WHERE");
            PostgresRepositories::push_published_condition(&mut qb);
            qb.push(" AND ranked.score >= ");
            qb.push_bind(tuning.rank_threshold);
            qb.push(" ORDER BY ranked.score DESC, p.publish DESC, p.id DESC");
        }
        SearchStrategy::Trigram => {
            qb.push(", similarity(p.title, ");
            qb.push_bind(query);
            qb.push(") AS score FROM posts p WHERE");
            PostgresRepositories::push_published_condition(&mut qb);
            qb.push(" AND similarity(p.title, ");
            qb.push_bind(query);
            qb.push(") >= ");
            qb.push_bind(tuning.trigram_threshold);
            qb.push(" ORDER BY score DESC, p.publish DESC, p.id DESC");
        }
    }

    qb
}

#[async_trait]
impl SearchRepo for PostgresRepositories {
    async fn search_posts(
        &self,
        strategy: SearchStrategy,
        query: &str,
        tuning: &SearchTuning,
    ) -> Result<Vec<SearchHit>, RepoError> {
        let rows = build_search_query(strategy, query, tuning)
            .build_query_as::<ScoredRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(SearchHit::from).collect())
    }
}
