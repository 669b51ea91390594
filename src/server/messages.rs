// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! WebSocket 消息格式
//!
//! 客户端 → 服务端:
//! - Binary: 编码后的图片 (JPEG/PNG/WebP)
//! - Text:   `{"type":"frame","data":"<base64>"}` 或者直接是 base64 字符串
//!           (允许 `data:image/jpeg;base64,` 前缀, 即 canvas.toDataURL 的输出)
//!
//! 服务端 → 客户端: `ServerMessage`, JSON, 字段 camelCase

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::detection::Detection;
use crate::error::PipelineError;
use crate::pipeline::FrameOutcome;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Frame { data: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// 连接建立后第一条消息
    #[serde(rename_all = "camelCase")]
    Ready {
        session_id: u64,
        target_width: u32,
        target_height: u32,
    },
    #[serde(rename_all = "camelCase")]
    Detections {
        frame_id: u64,
        width: u32,
        height: u32,
        inference_ms: f64,
        detections: Vec<Detection>,
    },
    /// 单帧失败 (会话继续)
    #[serde(rename_all = "camelCase")]
    Error {
        frame_id: Option<u64>,
        kind: String,
        message: String,
    },
}

impl ServerMessage {
    pub fn error(frame_id: Option<u64>, error: &PipelineError) -> Self {
        ServerMessage::Error {
            frame_id,
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

impl From<FrameOutcome> for ServerMessage {
    fn from(outcome: FrameOutcome) -> Self {
        match outcome {
            Ok(ys) => ServerMessage::Detections {
                frame_id: ys.frame_id,
                width: ys.width,
                height: ys.height,
                inference_ms: ys.inference_ms,
                detections: ys.detections,
            },
            Err(failure) => ServerMessage::error(Some(failure.frame_id), &failure.error),
        }
    }
}

/// 解析文本帧 → 图片字节
pub fn parse_text_frame(text: &str) -> Result<Vec<u8>, PipelineError> {
    let text = text.trim();
    let payload = if text.starts_with('{') {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Frame { data }) => data,
            Err(e) => return Err(PipelineError::Capture(format!("bad frame message: {e}"))),
        }
    } else {
        text.to_string()
    };
    decode_base64_image(&payload)
}

fn decode_base64_image(payload: &str) -> Result<Vec<u8>, PipelineError> {
    let b64 = match payload.strip_prefix("data:") {
        Some(rest) => match rest.find("base64,") {
            Some(i) => &rest[i + "base64,".len()..],
            None => return Err(PipelineError::Capture("data url is not base64".to_string())),
        },
        None => payload,
    };
    if b64.is_empty() {
        return Err(PipelineError::Capture("empty frame payload".to_string()));
    }
    STANDARD
        .decode(b64.trim())
        .map_err(|e| PipelineError::Capture(format!("invalid base64: {e}")))
}
