use anyhow::anyhow;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vigil::app::decision::DecisionEngine;
use vigil::config::AppConfig;
use vigil::infra::vision::build_classifier;
use vigil::infra::{cache::RedisCache, db::Db, queue::QueueClient};
use vigil::{http, jobs, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let db = Db::connect(&config).await?;
    let queue = QueueClient::new(&config).await?;
    let cache = RedisCache::connect(&config.redis_url).await?;

    match config.app_mode.as_str() {
        "api" => {
            let state = AppState {
                db,
                cache,
                queue,
                admin_token: config.admin_token.clone(),
                stats_cache_ttl_seconds: config.stats_cache_ttl_seconds,
            };

            let app: Router = http::router(state).layer(TraceLayer::new_for_http());
            let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
            tracing::info!("listening on {}", config.http_addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        "worker" => {
            let classifier = build_classifier(&config.classifier)?;
            let engine = DecisionEngine::new(db, classifier, config.moderation.clone());
            tracing::info!(
                model = %config.classifier.model,
                enabled = config.moderation.enabled,
                auto_reject_threshold = config.moderation.auto_reject_threshold,
                manual_review_threshold = config.moderation.manual_review_threshold,
                "starting worker mode"
            );
            tokio::select! {
                result = jobs::moderation_worker::run(engine, queue, cache, config.worker_batch_size) => {
                    result?;
                }
                _ = shutdown_signal() => {}
            }
        }
        other => return Err(anyhow!("unknown APP_MODE: {}", other)),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
