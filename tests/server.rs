// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

use common::*;
use yolo_stream_rs::server::{self, AppState, BANNER};
use yolo_stream_rs::{InferenceEngine, PipelineConfig};

const ORIGIN: &str = "http://localhost:5173";

fn state() -> Arc<AppState> {
    let engine: Arc<dyn InferenceEngine> = Arc::new(MockEngine::new(one_box));
    Arc::new(AppState::new(engine, PipelineConfig::default()))
}

async fn body_string(resp: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn root_returns_banner() {
    let app = server::router(state(), ORIGIN).unwrap();
    let resp = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, BANNER);
}

#[tokio::test]
async fn health_reports_model_and_sessions() {
    let app = server::router(state(), ORIGIN).unwrap();
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, ORIGIN)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        resp.headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        ORIGIN
    );
    let v: Value = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(v["status"], "ok");
    assert_eq!(v["model"], "mock");
    assert_eq!(v["sessions"], 0);
}

#[tokio::test]
async fn preflight_allows_json_writes() {
    let app = server::router(state(), ORIGIN).unwrap();
    let resp = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/health")
                .header(header::ORIGIN, ORIGIN)
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PUT")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type,authorization")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let get = |name: header::HeaderName| {
        resp.headers()
            .get(name)
            .map(|v| v.to_str().unwrap().to_ascii_lowercase())
            .unwrap_or_default()
    };
    assert_eq!(get(header::ACCESS_CONTROL_ALLOW_ORIGIN), ORIGIN);
    let methods = get(header::ACCESS_CONTROL_ALLOW_METHODS);
    assert!(methods.contains("put") && methods.contains("delete"), "{methods}");
    let headers = get(header::ACCESS_CONTROL_ALLOW_HEADERS);
    assert!(headers.contains("content-type") && headers.contains("authorization"), "{headers}");
}

#[test]
fn bad_origin_is_rejected() {
    assert!(server::router(state(), "not a\nheader").is_err());
}

async fn next_json<S>(ws: &mut S) -> Value
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("no message within 5s")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn websocket_round_trip() {
    let state = state();
    let app = server::router(state.clone(), ORIGIN).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();

    let ready = next_json(&mut ws).await;
    assert_eq!(ready["type"], "ready");
    assert_eq!(ready["targetWidth"], 640);
    assert_eq!(state.active_sessions(), 1);

    // 二进制帧
    ws.send(Message::Binary(png(1280, 720, RED))).await.unwrap();
    let v = next_json(&mut ws).await;
    assert_eq!(v["type"], "detections");
    assert_eq!(v["frameId"], 1);
    assert_eq!(v["width"], 1280);
    assert_eq!(v["detections"][0]["classId"], 2);
    assert_eq!(v["detections"][0]["box"]["x1"], 200.0);
    assert_eq!(v["detections"][0]["box"]["y2"], 220.0);

    // 无法解析的文本帧: 报错但会话继续
    ws.send(Message::Text("%%%".to_string())).await.unwrap();
    let v = next_json(&mut ws).await;
    assert_eq!(v["type"], "error");
    assert_eq!(v["kind"], "capture");

    // base64 文本帧
    use base64::Engine as _;
    let b64 = base64::engine::general_purpose::STANDARD.encode(png(64, 64, BLUE));
    let envelope = serde_json::json!({ "type": "frame", "data": b64 }).to_string();
    ws.send(Message::Text(envelope)).await.unwrap();
    let v = next_json(&mut ws).await;
    assert_eq!(v["type"], "detections");
    assert_eq!(v["frameId"], 2);

    ws.close(None).await.unwrap();
    for _ in 0..250 {
        if state.active_sessions() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(state.active_sessions(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn flood_of_bad_text_frames_does_not_stall_the_session() {
    let state = state();
    let app = server::router(state.clone(), ORIGIN).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();
    assert_eq!(next_json(&mut ws).await["type"], "ready");

    // 只发不读
    let flood = 200;
    for _ in 0..flood {
        ws.send(Message::Text("%%%".to_string())).await.unwrap();
    }
    ws.send(Message::Binary(png(64, 48, RED))).await.unwrap();

    let mut errors = 0;
    loop {
        let v = next_json(&mut ws).await;
        match v["type"].as_str() {
            Some("error") => {
                assert_eq!(v["kind"], "capture");
                errors += 1;
            }
            Some("detections") => {
                assert_eq!(v["frameId"], 1);
                break;
            }
            other => panic!("unexpected message {other:?}"),
        }
    }
    assert!(errors <= flood);
    assert_eq!(state.active_sessions(), 1);
}
