// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测结果数据结构
/// Data structures for decoded detections
use serde::{Deserialize, Serialize};

/// 检测框 (源图像像素坐标)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoxCoords {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// 单个检测: 类别 + 置信度 + 框. 帧之间没有身份 (不做追踪)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub class_id: i32,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: BoxCoords,
}

/// 一次流水线运行的结果 (推理线程 → 会话)
#[derive(Clone, Debug)]
pub struct FrameDetections {
    pub frame_id: u64,
    pub width: u32,
    pub height: u32,
    pub detections: Vec<Detection>,
    pub inference_ms: f64,
}
