use std::{process, sync::Arc, time::Duration};

use quire::{
    application::{
        detail::PostDetailService,
        error::AppError,
        import::ImportService,
        listing::ListingService,
        pagination::Paginator,
        repos::{CommentsRepo, HealthRepo, ImportRepo, PostsRepo, SearchRepo, TagsRepo},
        search::SearchService,
        share::ShareService,
        site::SiteInfo,
        syndication::SyndicationService,
    },
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        mail, telemetry,
    },
};
use sqlx::PgPool;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
        config::Command::Import(args) => run_import(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let pool = connect_pool(&settings).await?;
    migrate(&pool).await?;

    let repositories = Arc::new(PostgresRepositories::new(pool));
    let state = build_http_state(repositories, &settings)?;
    serve_http(&settings, state).await
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let pool = connect_pool(&settings).await?;
    migrate(&pool).await?;
    info!(target = "quire::migrate", "database migrations applied");
    Ok(())
}

async fn run_import(settings: config::Settings, args: config::ImportArgs) -> Result<(), AppError> {
    let pool = connect_pool(&settings).await?;
    migrate(&pool).await?;

    let repositories = Arc::new(PostgresRepositories::new(pool));
    let import_repo: Arc<dyn ImportRepo> = repositories;
    let summary = ImportService::new(import_repo)
        .import_file(&args.file)
        .await
        .map_err(|err| AppError::validation(err.to_string()))?;

    println!(
        "Imported {} tags, {} new posts, {} updated posts and {} comments from {}",
        summary.tags,
        summary.posts_created,
        summary.posts_updated,
        summary.comments,
        args.file.display()
    );
    Ok(())
}

async fn connect_pool(settings: &config::Settings) -> Result<PgPool, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))
}

async fn migrate(pool: &PgPool) -> Result<(), AppError> {
    PostgresRepositories::run_migrations(pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))
}

fn build_http_state(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<HttpState, AppError> {
    let posts_repo: Arc<dyn PostsRepo> = repositories.clone();
    let tags_repo: Arc<dyn TagsRepo> = repositories.clone();
    let comments_repo: Arc<dyn CommentsRepo> = repositories.clone();
    let search_repo: Arc<dyn SearchRepo> = repositories.clone();
    let health_repo: Arc<dyn HealthRepo> = repositories;

    let site = Arc::new(SiteInfo::new(
        settings.site.title.clone(),
        settings.site.description.clone(),
        settings.site.public_url.clone(),
    ));
    let mailer = mail::build_mailer(&settings.mail).map_err(AppError::from)?;

    Ok(HttpState {
        listing: Arc::new(ListingService::new(
            posts_repo.clone(),
            tags_repo.clone(),
            Paginator::new(settings.listing.page_size),
        )),
        detail: Arc::new(PostDetailService::new(
            posts_repo.clone(),
            tags_repo,
            comments_repo,
        )),
        share: Arc::new(ShareService::new(
            posts_repo.clone(),
            mailer,
            site.clone(),
            settings.mail.from.clone(),
        )),
        search: Arc::new(SearchService::new(search_repo, settings.search)),
        syndication: Arc::new(SyndicationService::new(posts_repo, site.clone())),
        site,
        health: health_repo,
    })
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "quire::serve",
        addr = %settings.server.addr,
        "listening for HTTP requests"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(settings.server.graceful_shutdown))
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    info!(target = "quire::serve", "server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM. In-flight requests get `grace` to drain
/// before the process exits regardless.
async fn shutdown_signal(grace: Duration) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target = "quire::serve", error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(target = "quire::serve", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!(
        target = "quire::serve",
        grace_seconds = grace.as_secs(),
        "shutdown requested, draining connections"
    );

    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        warn!(target = "quire::serve", "graceful shutdown timed out");
        process::exit(1);
    });
}
