// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 传输层 (Transport)
///
/// - `GET /`       文本横幅
/// - `GET /health` JSON 健康检查
/// - `GET /ws`     WebSocket, 每个连接一个流式会话
pub mod messages;
pub mod ws;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::{extract::State, Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::PipelineConfig;
use crate::models::InferenceEngine;

pub use messages::{ClientMessage, ServerMessage};

pub const BANNER: &str = "YOLO detection server is running";

/// 所有连接共享的状态: 一个推理引擎 + 一份流水线配置
pub struct AppState {
    pub engine: Arc<dyn InferenceEngine>,
    pub config: PipelineConfig,
    sessions: AtomicUsize,
    next_session: AtomicU64,
}

impl AppState {
    pub fn new(engine: Arc<dyn InferenceEngine>, config: PipelineConfig) -> Self {
        Self {
            engine,
            config,
            sessions: AtomicUsize::new(0),
            next_session: AtomicU64::new(1),
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.load(Ordering::Relaxed)
    }

    fn next_session_id(&self) -> u64 {
        self.next_session.fetch_add(1, Ordering::Relaxed)
    }

    fn session_opened(&self) -> usize {
        self.sessions.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn session_closed(&self) -> usize {
        self.sessions.fetch_sub(1, Ordering::Relaxed) - 1
    }
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub model: String,
    pub sessions: usize,
}

async fn root() -> &'static str {
    BANNER
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        model: state.engine.name().to_string(),
        sessions: state.active_sessions(),
    })
}

pub fn router(state: Arc<AppState>, allow_origin: &str) -> anyhow::Result<Router> {
    let origin: HeaderValue = allow_origin
        .parse()
        .with_context(|| format!("invalid CORS origin: {allow_origin}"))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    Ok(Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/ws", get(ws::ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}
