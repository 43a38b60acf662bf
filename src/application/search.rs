use std::sync::Arc;

use tracing::debug;

use crate::application::forms::{FieldErrors, SearchForm};
use crate::application::repos::{RepoError, SearchHit, SearchRepo};
use crate::domain::search::{SearchStrategy, SearchTuning};

pub const METRIC_SEARCHES: &str = "quire_searches_total";

#[derive(Debug, Clone)]
pub struct SearchView {
    pub strategy: SearchStrategy,
    /// The trimmed query, or whatever was submitted when it failed validation.
    pub query: Option<String>,
    pub errors: FieldErrors,
    pub results: Vec<SearchHit>,
    /// Whether a search actually ran; distinguishes "no results" from "no query".
    pub searched: bool,
}

#[derive(Clone)]
pub struct SearchService {
    repo: Arc<dyn SearchRepo>,
    tuning: SearchTuning,
}

impl SearchService {
    pub fn new(repo: Arc<dyn SearchRepo>, tuning: SearchTuning) -> Self {
        Self { repo, tuning }
    }

    pub async fn search(
        &self,
        strategy: SearchStrategy,
        query: Option<&str>,
    ) -> Result<SearchView, RepoError> {
        let form = SearchForm {
            query: query.map(str::to_string),
        };

        let query = match form.validate() {
            Ok(Some(query)) => query,
            Ok(None) => return Ok(empty_view(strategy, None, FieldErrors::new())),
            Err(errors) => return Ok(empty_view(strategy, form.query, errors)),
        };

        let results = self
            .repo
            .search_posts(strategy, &query, &self.tuning)
            .await?;

        metrics::counter!(METRIC_SEARCHES, "strategy" => strategy.as_str()).increment(1);
        debug!(
            target = "quire::application::search",
            strategy = strategy.as_str(),
            results = results.len(),
            "search executed"
        );

        Ok(SearchView {
            strategy,
            query: Some(query),
            errors: FieldErrors::new(),
            results,
            searched: true,
        })
    }
}

fn empty_view(strategy: SearchStrategy, query: Option<String>, errors: FieldErrors) -> SearchView {
    SearchView {
        strategy,
        query,
        errors,
        results: Vec::new(),
        searched: false,
    }
}
