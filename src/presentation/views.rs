use crate::application::{
    detail::PostDetail,
    error::{ErrorReport, HttpError},
    forms::{CommentForm, FORM_ERROR_FIELD, FieldErrors, ShareForm},
    listing::{ListingView, PostSummary},
    pagination::PageWindow,
    search::SearchView,
    share::ShareOutcome,
    site::SiteInfo,
};
use crate::domain::{
    entities::{CommentRecord, PostRecord, TagRecord},
    posts::{EXCERPT_WORDS, format_human_date, post_path, share_path, truncate_words},
    search::SearchStrategy,
};
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(chrome: LayoutChrome) -> Response {
    let view = LayoutContext::new(chrome, "Page not found", ErrorPageView::not_found());
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

#[derive(Clone)]
pub struct NavigationLinkView {
    pub label: String,
    pub href: String,
}

/// Site-wide elements shared by every page.
#[derive(Clone)]
pub struct LayoutChrome {
    pub site_title: String,
    pub site_description: String,
    pub feed_href: String,
    pub navigation: Vec<NavigationLinkView>,
}

impl LayoutChrome {
    pub fn from_site(site: &SiteInfo) -> Self {
        let mut navigation = vec![NavigationLinkView {
            label: "Posts".to_string(),
            href: "/".to_string(),
        }];
        navigation.extend(SearchStrategy::all().into_iter().map(|strategy| {
            NavigationLinkView {
                label: format!("Search: {}", strategy.label()),
                href: strategy.path().to_string(),
            }
        }));

        Self {
            site_title: site.title.clone(),
            site_description: site.description.clone(),
            feed_href: "/feed/".to_string(),
            navigation,
        }
    }
}

pub struct LayoutContext<T> {
    pub chrome: LayoutChrome,
    pub page_title: String,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(chrome: LayoutChrome, page_title: impl Into<String>, content: T) -> Self {
        Self {
            chrome,
            page_title: page_title.into(),
            content,
        }
    }
}

#[derive(Clone)]
pub struct TagBadge {
    pub label: String,
    pub href: String,
}

impl From<&TagRecord> for TagBadge {
    fn from(tag: &TagRecord) -> Self {
        Self {
            label: tag.name.clone(),
            href: tag_path(&tag.slug),
        }
    }
}

pub fn tag_path(slug: &str) -> String {
    format!("/function-views/tag/{slug}/")
}

pub fn build_tag_badges(tags: &[TagRecord]) -> Vec<TagBadge> {
    tags.iter().map(TagBadge::from).collect()
}

#[derive(Clone)]
pub struct PostCard {
    pub title: String,
    pub href: String,
    pub share_href: String,
    pub published: String,
    pub iso_date: String,
    pub excerpt: String,
    pub badges: Vec<TagBadge>,
}

impl From<&PostSummary> for PostCard {
    fn from(summary: &PostSummary) -> Self {
        Self {
            excerpt: summary.excerpt.clone(),
            badges: build_tag_badges(&summary.tags),
            ..PostCard::bare(&summary.post)
        }
    }
}

impl PostCard {
    fn bare(post: &PostRecord) -> Self {
        Self {
            title: post.title.clone(),
            href: post_path(post),
            share_href: share_path(post),
            published: format_human_date(post.publish),
            iso_date: post
                .publish
                .format(&Rfc3339)
                .unwrap_or_else(|_| post.publish.to_string()),
            excerpt: truncate_words(&post.body, EXCERPT_WORDS),
            badges: Vec::new(),
        }
    }
}

pub struct PaginationView {
    pub number: u64,
    pub num_pages: u64,
    pub previous_href: Option<String>,
    pub next_href: Option<String>,
}

impl PaginationView {
    pub fn new(window: &PageWindow, base_path: &str) -> Self {
        let href = |number: u64| format!("{base_path}?page={number}");
        Self {
            number: window.number,
            num_pages: window.num_pages,
            previous_href: window.previous_number().map(href),
            next_href: window.next_number().map(href),
        }
    }

    pub fn has_other_pages(&self) -> bool {
        self.previous_href.is_some() || self.next_href.is_some()
    }
}

pub struct ListingContext {
    pub tag: Option<TagBadge>,
    pub posts: Vec<PostCard>,
    pub pagination: PaginationView,
}

impl ListingContext {
    pub fn new(view: &ListingView, base_path: &str) -> Self {
        Self {
            tag: view.tag.as_ref().map(TagBadge::from),
            posts: view.page.items.iter().map(PostCard::from).collect(),
            pagination: PaginationView::new(&view.page.window, base_path),
        }
    }
}

#[derive(Template)]
#[template(path = "list.html")]
pub struct ListTemplate {
    pub view: LayoutContext<ListingContext>,
}

pub struct CommentView {
    pub number: usize,
    pub name: String,
    pub created: String,
    pub body: String,
}

impl CommentView {
    fn new(number: usize, comment: &CommentRecord) -> Self {
        Self {
            number,
            name: comment.name.clone(),
            created: format_human_date(comment.created_at),
            body: comment.body.clone(),
        }
    }
}

/// A form input's submitted value and its first validation message.
#[derive(Default)]
pub struct FieldView {
    pub value: String,
    pub error: Option<String>,
}

impl FieldView {
    fn new(value: &str, errors: &FieldErrors, field: &str) -> Self {
        Self {
            value: value.to_string(),
            error: errors.first(field).map(str::to_string),
        }
    }
}

pub struct CommentFormView {
    pub action: String,
    pub name: FieldView,
    pub email: FieldView,
    pub body: FieldView,
}

impl CommentFormView {
    fn new(action: String, form: &CommentForm, errors: &FieldErrors) -> Self {
        Self {
            action,
            name: FieldView::new(&form.name, errors, "name"),
            email: FieldView::new(&form.email, errors, "email"),
            body: FieldView::new(&form.body, errors, "body"),
        }
    }
}

pub struct PostDetailContext {
    pub title: String,
    pub published: String,
    pub iso_date: String,
    pub body_html: String,
    pub badges: Vec<TagBadge>,
    pub share_href: String,
    pub comments: Vec<CommentView>,
    pub new_comment: Option<CommentView>,
    pub form: CommentFormView,
    pub similar: Vec<PostCard>,
}

impl PostDetailContext {
    pub fn new(
        detail: &PostDetail,
        new_comment: Option<&CommentRecord>,
        form: &CommentForm,
        errors: &FieldErrors,
    ) -> Self {
        let card = PostCard::bare(&detail.post);
        let comments = detail
            .comments
            .iter()
            .enumerate()
            .map(|(index, comment)| CommentView::new(index + 1, comment))
            .collect::<Vec<_>>();
        let new_comment = new_comment.map(|comment| {
            let number = detail
                .comments
                .iter()
                .position(|existing| existing.id == comment.id)
                .map_or(comments.len() + 1, |index| index + 1);
            CommentView::new(number, comment)
        });

        Self {
            form: CommentFormView::new(card.href.clone(), form, errors),
            title: card.title,
            published: card.published,
            iso_date: card.iso_date,
            body_html: detail.body_html.clone(),
            badges: build_tag_badges(&detail.tags),
            share_href: card.share_href,
            comments,
            new_comment,
            similar: detail.similar.iter().map(PostCard::from).collect(),
        }
    }

    pub fn comment_count(&self) -> usize {
        self.comments.len()
    }
}

#[derive(Template)]
#[template(path = "detail.html")]
pub struct DetailTemplate {
    pub view: LayoutContext<PostDetailContext>,
}

pub struct ShareContext {
    pub action: String,
    pub post_title: String,
    pub post_href: String,
    pub sent: bool,
    pub recipient: String,
    pub form_error: Option<String>,
    pub name: FieldView,
    pub email: FieldView,
    pub to: FieldView,
    pub comments: FieldView,
}

impl ShareContext {
    pub fn new(outcome: &ShareOutcome) -> Self {
        let ShareOutcome {
            post,
            form,
            errors,
            sent,
        } = outcome;
        let ShareForm {
            name,
            email,
            to,
            comments,
        } = form;

        Self {
            action: share_path(post),
            post_title: post.title.clone(),
            post_href: post_path(post),
            sent: *sent,
            recipient: to.clone(),
            form_error: errors.first(FORM_ERROR_FIELD).map(str::to_string),
            name: FieldView::new(name, errors, "name"),
            email: FieldView::new(email, errors, "email"),
            to: FieldView::new(to, errors, "to"),
            comments: FieldView::new(comments, errors, "comments"),
        }
    }
}

#[derive(Template)]
#[template(path = "share.html")]
pub struct ShareTemplate {
    pub view: LayoutContext<ShareContext>,
}

pub struct StrategyLinkView {
    pub label: String,
    pub href: String,
    pub is_active: bool,
}

pub struct SearchResultView {
    pub card: PostCard,
    pub score: Option<String>,
}

pub struct SearchContext {
    pub action: String,
    pub strategy_label: String,
    pub strategies: Vec<StrategyLinkView>,
    pub query: FieldView,
    pub searched: bool,
    pub results: Vec<SearchResultView>,
}

impl SearchContext {
    pub fn new(view: &SearchView) -> Self {
        let strategies = SearchStrategy::all()
            .into_iter()
            .map(|strategy| StrategyLinkView {
                label: strategy.label().to_string(),
                href: match view.query.as_deref() {
                    Some(query) if view.searched => {
                        format!("{}?query={}", strategy.path(), encode_query(query))
                    }
                    _ => strategy.path().to_string(),
                },
                is_active: strategy == view.strategy,
            })
            .collect();

        let results = view
            .results
            .iter()
            .map(|hit| SearchResultView {
                card: PostCard::bare(&hit.post),
                score: hit
                    .score
                    .filter(|_| view.strategy.is_scored())
                    .map(|score| format!("{score:.3}")),
            })
            .collect();

        Self {
            action: view.strategy.path().to_string(),
            strategy_label: view.strategy.label().to_string(),
            strategies,
            query: FieldView::new(view.query.as_deref().unwrap_or(""), &view.errors, "query"),
            searched: view.searched,
            results,
        }
    }

    pub fn result_count(&self) -> usize {
        self.results.len()
    }
}

fn encode_query(query: &str) -> String {
    url::form_urlencoded::byte_serialize(query.as_bytes()).collect()
}

#[derive(Template)]
#[template(path = "search.html")]
pub struct SearchTemplate {
    pub view: LayoutContext<SearchContext>,
}

pub struct ErrorPageView {
    pub title: String,
    pub message: String,
}

impl ErrorPageView {
    pub fn not_found() -> Self {
        Self {
            title: "Page not found".to_string(),
            message: "The page you requested does not exist.".to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}
