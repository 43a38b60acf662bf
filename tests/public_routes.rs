use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header::CONTENT_TYPE},
    response::Response,
};
use http_body_util::BodyExt;
use quire::application::{
    detail::PostDetailService,
    listing::ListingService,
    mail::{MailError, Mailer, OutgoingMail},
    pagination::Paginator,
    repos::{
        CommentsRepo, CreateCommentParams, HealthRepo, PostQueryFilter, PostsRepo, RepoError,
        SearchHit, SearchRepo, TagsRepo,
    },
    search::SearchService,
    share::ShareService,
    site::SiteInfo,
    syndication::SyndicationService,
};
use quire::domain::{
    entities::{CommentRecord, PostRecord, TagRecord},
    posts::{PublishDate, SimilarCandidate},
    search::{SearchStrategy, SearchTuning},
    types::PostStatus,
};
use quire::infra::http::{HttpState, build_router};
use time::{OffsetDateTime, macros::datetime};
use tower::ServiceExt;
use url::Url;
use uuid::Uuid;

#[derive(Default)]
struct MemoryStore {
    posts: Vec<PostRecord>,
    tags: Vec<TagRecord>,
    post_tags: Vec<(Uuid, Uuid)>,
    comments: Mutex<Vec<CommentRecord>>,
    searches: Mutex<Vec<(SearchStrategy, String)>>,
}

impl MemoryStore {
    fn published(&self, filter: &PostQueryFilter) -> Vec<PostRecord> {
        let tag_id = filter
            .tag
            .as_ref()
            .and_then(|slug| self.tags.iter().find(|tag| &tag.slug == slug))
            .map(|tag| tag.id);

        let mut posts: Vec<PostRecord> = self
            .posts
            .iter()
            .filter(|post| post.status == PostStatus::Published)
            .filter(|post| match (filter.tag.as_ref(), tag_id) {
                (None, _) => true,
                (Some(_), Some(tag_id)) => self.post_tags.contains(&(post.id, tag_id)),
                (Some(_), None) => false,
            })
            .cloned()
            .collect();
        posts.sort_by(|left, right| right.publish.cmp(&left.publish));
        posts
    }

    fn comment_count(&self, post_id: Uuid) -> usize {
        self.comments
            .lock()
            .expect("comments lock")
            .iter()
            .filter(|comment| comment.post_id == post_id && comment.active)
            .count()
    }
}

#[async_trait]
impl PostsRepo for MemoryStore {
    async fn count_published(&self, filter: &PostQueryFilter) -> Result<u64, RepoError> {
        Ok(self.published(filter).len() as u64)
    }

    async fn list_published(
        &self,
        filter: &PostQueryFilter,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<PostRecord>, RepoError> {
        Ok(self
            .published(filter)
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn find_published_by_date(
        &self,
        date: PublishDate,
        slug: &str,
    ) -> Result<Vec<PostRecord>, RepoError> {
        Ok(self
            .published(&PostQueryFilter::default())
            .into_iter()
            .filter(|post| post.slug == slug && date.contains(post.publish))
            .take(2)
            .collect())
    }

    async fn find_published_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        Ok(self
            .published(&PostQueryFilter::default())
            .into_iter()
            .find(|post| post.id == id))
    }

    async fn list_similar_candidates(
        &self,
        post_id: Uuid,
    ) -> Result<Vec<SimilarCandidate>, RepoError> {
        let source_tags: Vec<Uuid> = self
            .post_tags
            .iter()
            .filter(|(post, _)| *post == post_id)
            .map(|(_, tag)| *tag)
            .collect();

        Ok(self
            .published(&PostQueryFilter::default())
            .into_iter()
            .filter(|post| post.id != post_id)
            .map(|post| {
                let shared_tags = self
                    .post_tags
                    .iter()
                    .filter(|(candidate, tag)| *candidate == post.id && source_tags.contains(tag))
                    .count() as u32;
                SimilarCandidate { post, shared_tags }
            })
            .filter(|candidate| candidate.shared_tags > 0)
            .collect())
    }

    async fn list_recent_published(&self, limit: u32) -> Result<Vec<PostRecord>, RepoError> {
        Ok(self
            .published(&PostQueryFilter::default())
            .into_iter()
            .take(limit as usize)
            .collect())
    }
}

#[async_trait]
impl TagsRepo for MemoryStore {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<TagRecord>, RepoError> {
        Ok(self.tags.iter().find(|tag| tag.slug == slug).cloned())
    }

    async fn list_for_post(&self, post_id: Uuid) -> Result<Vec<TagRecord>, RepoError> {
        Ok(self
            .tags
            .iter()
            .filter(|tag| self.post_tags.contains(&(post_id, tag.id)))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CommentsRepo for MemoryStore {
    async fn list_active_for_post(&self, post_id: Uuid) -> Result<Vec<CommentRecord>, RepoError> {
        Ok(self
            .comments
            .lock()
            .expect("comments lock")
            .iter()
            .filter(|comment| comment.post_id == post_id && comment.active)
            .cloned()
            .collect())
    }

    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let comment = CommentRecord {
            id: Uuid::new_v4(),
            post_id: params.post_id,
            name: params.name,
            email: params.email,
            body: params.body,
            active: true,
            created_at: now,
            updated_at: now,
        };
        self.comments
            .lock()
            .expect("comments lock")
            .push(comment.clone());
        Ok(comment)
    }
}

#[async_trait]
impl SearchRepo for MemoryStore {
    async fn search_posts(
        &self,
        strategy: SearchStrategy,
        query: &str,
        _tuning: &SearchTuning,
    ) -> Result<Vec<SearchHit>, RepoError> {
        self.searches
            .lock()
            .expect("searches lock")
            .push((strategy, query.to_string()));

        let needle = query.to_lowercase();
        Ok(self
            .published(&PostQueryFilter::default())
            .into_iter()
            .filter(|post| post.title.to_lowercase().contains(&needle))
            .map(|post| SearchHit {
                post,
                score: strategy.is_scored().then_some(0.5),
            })
            .collect())
    }
}

#[async_trait]
impl HealthRepo for MemoryStore {
    async fn ping(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
    fail: bool,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        if self.fail {
            return Err(MailError::Transport("connection refused".into()));
        }
        self.sent.lock().expect("mail lock").push(mail);
        Ok(())
    }

    fn transport_name(&self) -> &'static str {
        "recording"
    }
}

impl RecordingMailer {
    fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().expect("mail lock").clone()
    }
}

fn post(slug: &str, title: &str, status: PostStatus, publish: OffsetDateTime) -> PostRecord {
    PostRecord {
        id: Uuid::new_v4(),
        slug: slug.to_string(),
        title: title.to_string(),
        body: format!("Body of **{title}**."),
        status,
        publish,
        created_at: publish,
        updated_at: publish,
    }
}

fn tag(slug: &str, name: &str) -> TagRecord {
    TagRecord {
        id: Uuid::new_v4(),
        slug: slug.to_string(),
        name: name.to_string(),
    }
}

struct Fixture {
    store: Arc<MemoryStore>,
    mailer: Arc<RecordingMailer>,
    router: Router,
}

impl Fixture {
    fn post(&self, slug: &str) -> &PostRecord {
        self.store
            .posts
            .iter()
            .find(|post| post.slug == slug)
            .expect("fixture post")
    }
}

fn fixture_with_mailer(mailer: RecordingMailer) -> Fixture {
    let rust = tag("rust", "Rust");
    let web = tag("web", "Web");

    let posts = vec![
        post("first-post", "First Post", PostStatus::Published, datetime!(2024-01-05 09:00 UTC)),
        post("second-post", "Second Post", PostStatus::Published, datetime!(2024-02-10 09:00 UTC)),
        post("third-post", "Third Post", PostStatus::Published, datetime!(2024-03-09 08:00 UTC)),
        post("fourth-post", "Fourth Post", PostStatus::Published, datetime!(2024-04-01 12:00 UTC)),
        post("secret-draft", "Secret Draft", PostStatus::Draft, datetime!(2024-04-02 12:00 UTC)),
    ];

    let post_tags = vec![
        (posts[0].id, rust.id),
        (posts[1].id, rust.id),
        (posts[1].id, web.id),
        (posts[2].id, rust.id),
        (posts[2].id, web.id),
        (posts[4].id, rust.id),
    ];

    let store = Arc::new(MemoryStore {
        posts,
        tags: vec![rust, web],
        post_tags,
        ..MemoryStore::default()
    });
    let mailer = Arc::new(mailer);
    let router = router_for(store.clone(), mailer.clone());

    Fixture {
        store,
        mailer,
        router,
    }
}

fn router_for(store: Arc<MemoryStore>, mailer: Arc<RecordingMailer>) -> Router {
    let site = Arc::new(SiteInfo::new(
        "Quire Test",
        "Posts for tests.",
        Url::parse("https://blog.example.com/").expect("valid url"),
    ));

    let posts_repo: Arc<dyn PostsRepo> = store.clone();
    let tags_repo: Arc<dyn TagsRepo> = store.clone();
    let comments_repo: Arc<dyn CommentsRepo> = store.clone();
    let search_repo: Arc<dyn SearchRepo> = store.clone();
    let health_repo: Arc<dyn HealthRepo> = store;
    let mailer_dyn: Arc<dyn Mailer> = mailer;

    let state = HttpState {
        listing: Arc::new(ListingService::new(
            posts_repo.clone(),
            tags_repo.clone(),
            Paginator::default(),
        )),
        detail: Arc::new(PostDetailService::new(
            posts_repo.clone(),
            tags_repo,
            comments_repo,
        )),
        share: Arc::new(ShareService::new(
            posts_repo.clone(),
            mailer_dyn,
            site.clone(),
            "admin@localhost",
        )),
        search: Arc::new(SearchService::new(search_repo, SearchTuning::default())),
        syndication: Arc::new(SyndicationService::new(posts_repo, site.clone())),
        site,
        health: health_repo,
    };

    build_router(state)
}

fn fixture() -> Fixture {
    fixture_with_mailer(RecordingMailer::default())
}

async fn send(router: &Router, request: Request<Body>) -> Response {
    router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond")
}

async fn get(router: &Router, uri: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    let response = send(router, request).await;
    let status = response.status();
    (status, body_text(response).await)
}

async fn post_form(router: &Router, uri: &str, form: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .expect("request should build");
    let response = send(router, request).await;
    let status = response.status();
    (status, body_text(response).await)
}

async fn body_text(response: Response) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

#[tokio::test]
async fn listing_shows_newest_published_posts_first() {
    let fixture = fixture();

    let (status, body) = get(&fixture.router, "/").await;
    assert_eq!(status, StatusCode::OK);

    let fourth = body.find("Fourth Post").expect("fourth post listed");
    let third = body.find("Third Post").expect("third post listed");
    assert!(fourth < third, "newest post comes first");
    assert!(body.contains("Second Post"));
    assert!(!body.contains("First Post"), "page size is three");
    assert!(!body.contains("Secret Draft"));
    assert!(body.contains("Page 1 of 2."));
}

#[tokio::test]
async fn listing_clamps_page_tokens() {
    let fixture = fixture();

    let (status, body) = get(&fixture.router, "/function-views/?page=abc").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Page 1 of 2."));

    let (status, body) = get(&fixture.router, "/function-views/?page=9999").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Page 2 of 2."));
    assert!(body.contains("First Post"));
    assert!(body.contains("/function-views/?page=1"));
}

#[tokio::test]
async fn tag_listing_filters_and_unknown_tag_is_not_found() {
    let fixture = fixture();

    let (status, body) = get(&fixture.router, "/function-views/tag/web/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Second Post"));
    assert!(body.contains("Third Post"));
    assert!(!body.contains("Fourth Post"));
    assert!(!body.contains("Page 1 of"), "single page hides pagination");

    let (status, _) = get(&fixture.router, "/function-views/tag/missing/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn detail_resolves_by_date_and_slug() {
    let fixture = fixture();

    let (status, body) = get(&fixture.router, "/2024/3/9/third-post/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<strong>Third Post</strong>"), "body is rendered markdown");
    assert!(body.contains("There are no comments yet."));

    let similar = body.find("Similar posts").expect("similar section");
    let second = body[similar..].find("Second Post").expect("two shared tags");
    let first = body[similar..].find("First Post").expect("one shared tag");
    assert!(second < first, "more shared tags rank first");
    assert!(!body[similar..].contains("Secret Draft"));

    let (status, _) = get(&fixture.router, "/2024/03/09/third-post/").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn detail_not_found_cases() {
    let fixture = fixture();

    for uri in [
        "/2024/3/10/third-post/",
        "/2024/4/2/secret-draft/",
        "/2024/2/30/second-post/",
        "/year/3/9/third-post/",
        "/2024/3/9/unknown/",
    ] {
        let (status, body) = get(&fixture.router, uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert!(body.contains("Page not found"));
    }
}

#[tokio::test]
async fn detail_with_ambiguous_date_and_slug_is_not_found() {
    let store = Arc::new(MemoryStore {
        posts: vec![
            post("twin-post", "Morning Twin", PostStatus::Published, datetime!(2024-05-01 08:00 UTC)),
            post("twin-post", "Evening Twin", PostStatus::Published, datetime!(2024-05-01 20:00 UTC)),
        ],
        ..MemoryStore::default()
    });
    let router = router_for(store, Arc::new(RecordingMailer::default()));

    let (status, body) = get(&router, "/2024/5/1/twin-post/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("Page not found"));
    assert!(!body.contains("Morning Twin"));
    assert!(!body.contains("Evening Twin"));
}

#[tokio::test]
async fn valid_comment_is_persisted_and_shown() {
    let fixture = fixture();
    let post_id = fixture.post("third-post").id;

    let (status, body) = post_form(
        &fixture.router,
        "/2024/3/9/third-post/",
        "name=Ada&email=ada%40example.com&body=Lovely+post",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(fixture.store.comment_count(post_id), 1);
    assert!(body.contains("Your comment has been added."));
    assert!(body.contains("Lovely post"));
    assert!(body.contains("1 comment"));
}

#[tokio::test]
async fn invalid_comment_rerenders_form_without_writing() {
    let fixture = fixture();
    let post_id = fixture.post("third-post").id;

    let (status, body) = post_form(
        &fixture.router,
        "/2024/3/9/third-post/",
        "name=Ada&email=not-an-email&body=Lovely+post",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(fixture.store.comment_count(post_id), 0);
    assert!(body.contains("class=\"error\""));
    assert!(body.contains("value=\"not-an-email\""));
    assert!(!body.contains("Your comment has been added."));
}

#[tokio::test]
async fn share_sends_one_mail_with_absolute_link() {
    let fixture = fixture();
    let post = fixture.post("third-post").clone();

    let (status, body) = get(&fixture.router, &format!("/{}/share/", post.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("name=\"to\""));

    let (status, body) = post_form(
        &fixture.router,
        &format!("/{}/share/", post.id),
        "name=Ada&email=ada%40example.com&to=bob%40example.com&comments=Worth+reading",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("E-mail successfully sent"));
    assert!(body.contains("bob@example.com"));

    let sent = fixture.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, vec!["bob@example.com".to_string()]);
    assert_eq!(sent[0].from, "admin@localhost");
    assert!(
        sent[0]
            .body
            .contains("https://blog.example.com/2024/3/9/third-post/")
    );
}

#[tokio::test]
async fn share_with_malformed_recipient_sends_nothing() {
    let fixture = fixture();
    let post_id = fixture.post("third-post").id;

    let (status, body) = post_form(
        &fixture.router,
        &format!("/{post_id}/share/"),
        "name=Ada&email=ada%40example.com&to=bob&comments=",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(fixture.mailer.sent().is_empty());
    assert!(!body.contains("E-mail successfully sent"));
    assert!(body.contains("class=\"error\""));
}

#[tokio::test]
async fn share_transport_failure_is_reported_on_the_form() {
    let fixture = fixture_with_mailer(RecordingMailer {
        fail: true,
        ..RecordingMailer::default()
    });
    let post_id = fixture.post("third-post").id;

    let (status, body) = post_form(
        &fixture.router,
        &format!("/{post_id}/share/"),
        "name=Ada&email=ada%40example.com&to=bob%40example.com",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(!body.contains("E-mail successfully sent"));
    assert!(body.contains("could not be sent"));
}

#[tokio::test]
async fn share_of_unknown_or_draft_post_is_not_found() {
    let fixture = fixture();
    let draft_id = fixture.post("secret-draft").id;

    for uri in [
        format!("/{}/share/", Uuid::new_v4()),
        format!("/{draft_id}/share/"),
        "/not-a-uuid/share/".to_string(),
    ] {
        let (status, _) = get(&fixture.router, &uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn search_routes_share_one_handler() {
    let fixture = fixture();

    for strategy in SearchStrategy::all() {
        let (status, body) = get(
            &fixture.router,
            &format!("{}?query=third", strategy.path()),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", strategy.path());
        assert!(body.contains("Found 1 result"));
        assert!(body.contains("/2024/3/9/third-post/"));
    }

    let searches = fixture.store.searches.lock().expect("searches lock").clone();
    let strategies: Vec<SearchStrategy> = searches.iter().map(|(strategy, _)| *strategy).collect();
    assert_eq!(strategies, SearchStrategy::all().to_vec());
    assert!(searches.iter().all(|(_, query)| query == "third"));
}

#[tokio::test]
async fn search_without_query_shows_form_and_skips_repository() {
    let fixture = fixture();

    let (status, body) = get(&fixture.router, "/search/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("name=\"query\""));

    let (status, body) = get(&fixture.router, "/search-rank/?query=%20%20").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("name=\"query\""));

    assert!(fixture.store.searches.lock().expect("searches lock").is_empty());
}

#[tokio::test]
async fn feed_lists_published_posts_as_rss() {
    let fixture = fixture();

    let request = Request::builder()
        .method(Method::GET)
        .uri("/feed/")
        .body(Body::empty())
        .expect("request should build");
    let response = send(&fixture.router, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("application/rss+xml"));

    let body = body_text(response).await;
    assert!(body.contains("<rss version=\"2.0\">"));
    assert!(body.contains("<link>https://blog.example.com/2024/4/1/fourth-post/</link>"));
    assert!(!body.contains("Secret Draft"));
}

#[tokio::test]
async fn health_and_fallback() {
    let fixture = fixture();

    let request = Request::builder()
        .uri("/_health/db")
        .body(Body::empty())
        .expect("request should build");
    let response = send(&fixture.router, request).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(response.headers().contains_key("x-request-id"));

    let (status, body) = get(&fixture.router, "/no/such/page").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("Page not found"));
}
