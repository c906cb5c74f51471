use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod ai;
mod config;
mod detector;
mod routes;
mod stations;
mod suggest;

use ai::{AiClient, SuggestionProvider};
use config::Config;
use routes::{create_router, AppState};
use stations::mock::MockStationStore;
use stations::poller::{StationBoard, StationPoller};
use stations::remote::RemoteStationStore;
use stations::StationSource;
use suggest::SuggestionService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "envmon_advisor_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Station data source
    let source: Arc<dyn StationSource> = match &config.station_store_url {
        Some(url) => {
            tracing::info!("Polling station store at {}", url);
            Arc::new(RemoteStationStore::new(url.clone())?)
        }
        None => {
            tracing::warn!("STATION_STORE_URL not set, using mock station data");
            Arc::new(MockStationStore::new())
        }
    };

    let board = StationBoard::new(config.history_len);
    let poller = StationPoller::new(source, board.clone());
    poller.spawn(Duration::from_secs(config.poll_interval_secs.max(1)));

    // AI provider is optional; without it every answer is the local fallback
    let provider: Option<Arc<dyn SuggestionProvider>> = match &config.openrouter_api_key {
        Some(key) => {
            let client: Arc<dyn SuggestionProvider> = Arc::new(AiClient::new(&config, key.clone())?);
            Some(client)
        }
        None => {
            tracing::info!("OPENROUTER_API_KEY not set, AI suggestions disabled");
            None
        }
    };
    let suggestions = Arc::new(SuggestionService::new(
        provider,
        Duration::from_secs(config.ai_timeout_secs),
    ));

    let bind_addr = config.bind_addr.clone();
    let state = AppState {
        config: Arc::new(config),
        board,
        suggestions,
    };

    let app: Router = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server starting on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
