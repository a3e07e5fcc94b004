//! 主应用程序入口
//!
//! 加载配置、组装基础设施并启动 Axum Web API 服务。

use std::{sync::Arc, time::Duration};

use axum::http::HeaderValue;
use config::AppConfig;
use infrastructure::Infrastructure;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

/// 内存后端清理过期在线记录的间隔
const PRESENCE_PRUNE_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    tracing::info!(config = %config.sanitize(), "configuration loaded");

    let infrastructure = Infrastructure::from_config(&config).await?;
    let _pruner = infrastructure.spawn_presence_pruner(PRESENCE_PRUNE_INTERVAL);

    let jwt_service = Arc::new(JwtService::new(
        &config.auth,
        infrastructure.token_blacklist.clone(),
    ));
    let state = AppState::new(&infrastructure, jwt_service);

    let app = router(state)
        .layer(cors_layer(&config.server.cors_origins))
        .layer(TraceLayer::new_for_http());

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!("workchat 服务器启动在 http://{}", address);
    axum::serve(listener, app).await?;

    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(allowed)
}
