// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// YOLO 实时检测服务
///
/// 主程序入口 - 直接运行: cargo run --bin yolo-stream --release -- --model models/best.onnx
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use yolo_stream_rs::models::{InferenceEngine, OrtEngine};
use yolo_stream_rs::server::{self, AppState};
use yolo_stream_rs::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG 优先, 否则使用 --log-level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = args.pipeline_config()?;
    config.log_summary();

    // 模型加载可能较慢, 放到阻塞线程
    let model = args.model.clone();
    let ep = args.ep();
    let engine = tokio::task::spawn_blocking(move || OrtEngine::build(&model, ep))
        .await?
        .with_context(|| format!("failed to load model {}", args.model))?;
    let engine: Arc<dyn InferenceEngine> = Arc::new(engine);

    let state = Arc::new(AppState::new(engine, config));
    let app = server::router(state, &args.allow_origin)?;

    let addr = args.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, origin = %args.allow_origin, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
