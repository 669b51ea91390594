// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! WebSocket 会话处理: 一个连接 = 一个 StreamingSession
//!
//! 接收任务: 读取帧 → submit_frame (不等待)
//! 发送任务: 结果流 + 本地错误 → JSON → socket

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

use super::messages::{parse_text_frame, ServerMessage};
use super::AppState;
use crate::pipeline::FrameOutcome;
use crate::session::{SessionHandle, StreamingSession};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// 本地消息队列 (ready + 无法解析的文本帧错误) 容量, 满了就丢
const LOCAL_QUEUE: usize = 16;

/// 非阻塞地放入本地队列; 队列满时丢弃消息, 返回是否入队
fn push_local(tx: &mpsc::Sender<ServerMessage>, msg: ServerMessage, session_id: u64) -> bool {
    match tx.try_send(msg) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            debug!(session = session_id, "local queue full, message dropped");
            false
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session = match StreamingSession::new(
        state.next_session_id(),
        Arc::clone(&state.engine),
        &state.config,
    ) {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "failed to start session");
            return;
        }
    };
    let session_id = session.id();
    let active = state.session_opened();
    info!(session = session_id, active, "client connected");

    let (handle, mut results) = session.into_split();
    let (mut sender, mut receiver) = socket.split();
    let (local_tx, mut local_rx) = mpsc::channel::<ServerMessage>(LOCAL_QUEUE);

    push_local(
        &local_tx,
        ServerMessage::Ready {
            session_id,
            target_width: state.config.target_width,
            target_height: state.config.target_height,
        },
        session_id,
    );

    let meter_handle = handle.clone();
    let mut send_task = tokio::spawn(async move {
        let mut meter = ThroughputMeter::new(meter_handle);
        loop {
            let msg = tokio::select! {
                Some(outcome) = results.next() => {
                    meter.record(&outcome);
                    ServerMessage::from(outcome)
                }
                Some(msg) = local_rx.recv() => msg,
                else => break,
            };

            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    error!(session = session_id, error = %e, "failed to serialize message");
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_handle = handle.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Binary(bytes)) => {
                    recv_handle.submit_frame(bytes);
                }
                Ok(Message::Text(text)) => match parse_text_frame(&text) {
                    Ok(bytes) => {
                        recv_handle.submit_frame(bytes);
                    }
                    Err(e) => {
                        warn!(session = session_id, len = text.len(), error = %e, "undecodable text frame");
                        push_local(&local_tx, ServerMessage::error(None, &e), session_id);
                    }
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {} // ping/pong 由 axum 处理
                Err(e) => {
                    debug!(session = session_id, error = %e, "socket read failed");
                    break;
                }
            }
        }
    });

    // 任一方向结束 → 整个会话结束
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    handle.close();
    let active = state.session_closed();
    info!(session = session_id, active, "client disconnected");
}

/// 每秒最多打印一次吞吐量
struct ThroughputMeter {
    handle: SessionHandle,
    count: u64,
    last: Instant,
}

impl ThroughputMeter {
    const INTERVAL: Duration = Duration::from_secs(1);

    fn new(handle: SessionHandle) -> Self {
        Self {
            handle,
            count: 0,
            last: Instant::now(),
        }
    }

    fn record(&mut self, outcome: &FrameOutcome) {
        if outcome.is_ok() {
            self.count += 1;
        }
        let elapsed = self.last.elapsed();
        if elapsed < Self::INTERVAL {
            return;
        }
        let s = self.handle.stats();
        info!(
            session = self.handle.id(),
            fps = %format!("{:.1}", self.count as f64 / elapsed.as_secs_f64()),
            completed = s.completed,
            dropped = s.dropped,
            failed = s.failed,
            undelivered = s.undelivered,
            inference_ms = %format!("{:.1}", s.last_inference_ms),
            "throughput"
        );
        self.count = 0;
        self.last = Instant::now();
    }
}
