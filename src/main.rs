use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coursebase::api::router;
use coursebase::cache::ContentStore;
use coursebase::config::Config;
use coursebase::refresher::{CourseRefresher, GitCloneRefresher};
use coursebase::services::{RefreshScheduler, RefreshService};
use coursebase::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "coursebase=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let store = Arc::new(ContentStore::new(config.cache_root.clone()));
    let refresher: Arc<dyn CourseRefresher> = Arc::new(GitCloneRefresher);
    let refresh = Arc::new(RefreshService::new(pool.clone(), store.clone(), refresher));

    if let Some(interval_secs) = config.refresh_interval_secs {
        let scheduler = RefreshScheduler::new(pool.clone(), refresh.clone(), interval_secs);
        tokio::spawn(scheduler.start());
    }

    let state = AppState {
        db: pool.clone(),
        store,
        refresh,
    };

    let app = router(state);

    info!("listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
