use axum::{routing::get, Router};
use std::{env, sync::Arc};
use tokio::net::TcpListener;
use tower_http::{trace::TraceLayer, cors::{Any, CorsLayer}};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quiz_extensions::{
    canvas::CanvasClient,
    config::Config,
    db::{self, PgRepository},
    jobs::JobQueue,
    routes::{self, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "quiz_extensions=info,axum=info".into())
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = db::connect(&config.database_url).await?;
    // crate-relative path for sqlx migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    let state = AppState {
        canvas: CanvasClient::new(
            config.canvas_api_url.clone(),
            config.canvas_api_key.clone(),
            config.max_per_page,
        )?,
        repo: Arc::new(PgRepository::new(pool)),
        queue: JobQueue::new(config.worker_concurrency),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(routes::router(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(
        workers = config.worker_concurrency,
        "listening on http://0.0.0.0:{}", config.port
    );

    axum::serve(listener, app).await?;
    Ok(())
}
