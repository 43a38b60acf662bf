use std::sync::Arc;

use axum::{
    Form, Router,
    body::Body,
    extract::{Path, Query, State},
    http::{StatusCode, header::CONTENT_TYPE},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    application::{
        detail::{CommentOutcome, DetailError, PostDetailService},
        error::{ErrorReport, HttpError, repo_error_to_http},
        forms::{CommentForm, FieldErrors, ShareForm},
        listing::{ListingError, ListingService},
        repos::HealthRepo,
        search::SearchService,
        share::{ShareError, ShareOutcome, ShareService},
        site::SiteInfo,
        syndication::SyndicationService,
    },
    domain::{posts::PublishDate, search::SearchStrategy},
    presentation::views::{
        DetailTemplate, LayoutChrome, LayoutContext, ListTemplate, ListingContext,
        PostDetailContext, SearchContext, SearchTemplate, ShareContext, ShareTemplate,
        render_not_found_response, render_template_response,
    },
};

use super::{
    db_health_response,
    middleware::{log_responses, set_request_context},
};

#[derive(Clone)]
pub struct HttpState {
    pub listing: Arc<ListingService>,
    pub detail: Arc<PostDetailService>,
    pub share: Arc<ShareService>,
    pub search: Arc<SearchService>,
    pub syndication: Arc<SyndicationService>,
    pub site: Arc<SiteInfo>,
    pub health: Arc<dyn HealthRepo>,
}

impl HttpState {
    fn chrome(&self) -> LayoutChrome {
        LayoutChrome::from_site(&self.site)
    }
}

pub fn build_router(state: HttpState) -> Router {
    let mut router = Router::new()
        .route("/", get(index))
        .route("/function-views/", get(function_index))
        .route("/function-views/tag/{tag}/", get(tag_index))
        .route(
            "/{year}/{month}/{day}/{slug}/",
            get(post_detail).post(post_comment),
        )
        .route("/{post_id}/share/", get(share_form).post(share_submit))
        .route("/feed/", get(rss_feed))
        .route("/_health/db", get(public_health));

    for strategy in SearchStrategy::all() {
        router = router.route(
            strategy.path(),
            get(move |state: State<HttpState>, query: Query<SearchQuery>| {
                search(state, query, strategy)
            }),
        );
    }

    router
        .fallback(not_found)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PageQuery {
    page: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchQuery {
    query: Option<String>,
}

async fn index(State(state): State<HttpState>, Query(query): Query<PageQuery>) -> Response {
    render_listing(&state, None, query.page.as_deref(), "/").await
}

async fn function_index(
    State(state): State<HttpState>,
    Query(query): Query<PageQuery>,
) -> Response {
    render_listing(&state, None, query.page.as_deref(), "/function-views/").await
}

async fn tag_index(
    State(state): State<HttpState>,
    Path(tag): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let base_path = format!("/function-views/tag/{tag}/");
    render_listing(&state, Some(&tag), query.page.as_deref(), &base_path).await
}

async fn render_listing(
    state: &HttpState,
    tag: Option<&str>,
    page: Option<&str>,
    base_path: &str,
) -> Response {
    let chrome = state.chrome();
    match state.listing.list(tag, page).await {
        Ok(listing) => {
            let title = match listing.tag.as_ref() {
                Some(tag) => format!("Posts tagged with \"{}\"", tag.name),
                None => chrome.site_title.clone(),
            };
            let content = ListingContext::new(&listing, base_path);
            let view = LayoutContext::new(chrome, title, content);
            render_template_response(ListTemplate { view }, StatusCode::OK)
        }
        Err(ListingError::UnknownTag) => {
            not_found_with_detail(chrome, "infra::http::public::listing", "Unknown tag")
        }
        Err(ListingError::Repo(err)) => {
            repo_error_to_http("infra::http::public::listing", err).into_response()
        }
    }
}

async fn post_detail(
    State(state): State<HttpState>,
    Path((year, month, day, slug)): Path<(String, String, String, String)>,
) -> Response {
    let chrome = state.chrome();
    let Some(date) = PublishDate::parse_segments(&year, &month, &day) else {
        return not_found_with_detail(chrome, "infra::http::public::detail", "Invalid date");
    };

    match state.detail.load(date, &slug).await {
        Ok(detail) => {
            let content = PostDetailContext::new(
                &detail,
                None,
                &CommentForm::default(),
                &FieldErrors::new(),
            );
            let view = LayoutContext::new(chrome, detail.post.title.clone(), content);
            render_template_response(DetailTemplate { view }, StatusCode::OK)
        }
        Err(err) => detail_error_to_response(err, chrome),
    }
}

async fn post_comment(
    State(state): State<HttpState>,
    Path((year, month, day, slug)): Path<(String, String, String, String)>,
    Form(form): Form<CommentForm>,
) -> Response {
    let chrome = state.chrome();
    let Some(date) = PublishDate::parse_segments(&year, &month, &day) else {
        return not_found_with_detail(chrome, "infra::http::public::comment", "Invalid date");
    };

    let (detail, content) = match state.detail.submit_comment(date, &slug, form).await {
        Ok(CommentOutcome::Created { detail, comment }) => {
            let content = PostDetailContext::new(
                &detail,
                Some(&comment),
                &CommentForm::default(),
                &FieldErrors::new(),
            );
            (detail, content)
        }
        Ok(CommentOutcome::Rejected {
            detail,
            form,
            errors,
        }) => {
            let content = PostDetailContext::new(&detail, None, &form, &errors);
            (detail, content)
        }
        Err(err) => return detail_error_to_response(err, chrome),
    };

    let view = LayoutContext::new(chrome, detail.post.title, content);
    render_template_response(DetailTemplate { view }, StatusCode::OK)
}

fn detail_error_to_response(err: DetailError, chrome: LayoutChrome) -> Response {
    match err {
        DetailError::NotFound => {
            not_found_with_detail(chrome, "infra::http::public::detail", "Post not found")
        }
        DetailError::Repo(err) => {
            repo_error_to_http("infra::http::public::detail", err).into_response()
        }
    }
}

async fn share_form(State(state): State<HttpState>, Path(post_id): Path<String>) -> Response {
    let chrome = state.chrome();
    let Ok(id) = Uuid::parse_str(&post_id) else {
        return not_found_with_detail(chrome, "infra::http::public::share", "Invalid post id");
    };

    match state.share.load(id).await {
        Ok(outcome) => render_share(chrome, &outcome),
        Err(err) => share_error_to_response(err, chrome),
    }
}

async fn share_submit(
    State(state): State<HttpState>,
    Path(post_id): Path<String>,
    Form(form): Form<ShareForm>,
) -> Response {
    let chrome = state.chrome();
    let Ok(id) = Uuid::parse_str(&post_id) else {
        return not_found_with_detail(chrome, "infra::http::public::share", "Invalid post id");
    };

    match state.share.share(id, form).await {
        Ok(outcome) => render_share(chrome, &outcome),
        Err(err) => share_error_to_response(err, chrome),
    }
}

fn render_share(chrome: LayoutChrome, outcome: &ShareOutcome) -> Response {
    let title = format!("Share \"{}\"", outcome.post.title);
    let view = LayoutContext::new(chrome, title, ShareContext::new(outcome));
    render_template_response(ShareTemplate { view }, StatusCode::OK)
}

fn share_error_to_response(err: ShareError, chrome: LayoutChrome) -> Response {
    match err {
        ShareError::NotFound => {
            not_found_with_detail(chrome, "infra::http::public::share", "Post not found")
        }
        ShareError::Repo(err) => {
            repo_error_to_http("infra::http::public::share", err).into_response()
        }
    }
}

async fn search(
    State(state): State<HttpState>,
    Query(query): Query<SearchQuery>,
    strategy: SearchStrategy,
) -> Response {
    let chrome = state.chrome();
    match state.search.search(strategy, query.query.as_deref()).await {
        Ok(result) => {
            let view = LayoutContext::new(chrome, "Search", SearchContext::new(&result));
            render_template_response(SearchTemplate { view }, StatusCode::OK)
        }
        Err(err) => repo_error_to_http("infra::http::public::search", err).into_response(),
    }
}

async fn rss_feed(State(state): State<HttpState>) -> Response {
    match state.syndication.rss_feed().await {
        Ok(body) => xml_response(body, "application/rss+xml; charset=utf-8"),
        Err(err) => HttpError::from_error(
            "infra::http::public::rss",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to generate RSS feed",
            &err,
        )
        .into_response(),
    }
}

async fn public_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.health.ping().await)
}

async fn not_found(State(state): State<HttpState>) -> Response {
    render_not_found_response(state.chrome())
}

fn not_found_with_detail(
    chrome: LayoutChrome,
    source: &'static str,
    detail: &'static str,
) -> Response {
    let mut response = render_not_found_response(chrome);
    ErrorReport::from_message(source, StatusCode::NOT_FOUND, detail).attach(&mut response);
    response
}

fn xml_response(body: String, content_type: &str) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
