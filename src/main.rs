use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bloggregator::config::Config;
use bloggregator::db::Database;
use bloggregator::routes::{self, AppState};
use bloggregator::scheduler;
use bloggregator::source::HttpFeedSource;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bloggregator=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path =
        std::env::var("BLOGGREGATOR_CONFIG").unwrap_or_else(|_| "bloggregator.toml".to_string());
    let mut config = Config::load_or_default(&config_path)?;
    config.apply_env(|key| std::env::var(key).ok())?;

    // Initialize database
    let db = Database::new(&config.database_url).await?;
    db.initialize().await?;
    info!("Database initialized");

    let db = Arc::new(db);

    // Start the feed poller
    if config.poll.enabled {
        let settings = config.poll_settings()?;
        let source = Arc::new(HttpFeedSource::new(settings.fetch_timeout)?);
        let store = db.clone();
        tokio::spawn(async move {
            scheduler::run(settings, source, store).await;
        });
    } else {
        info!("Feed polling disabled");
    }

    let app = routes::router(Arc::new(AppState { db: db.clone() }));

    // Start server
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!("Server starting on http://localhost:{}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
