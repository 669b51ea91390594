/// 检测解码系统 (Detection System)
///
/// - Decoder: 原始推理输出 → 过滤 + 坐标还原后的检测结果
/// - Types:   Detection / BoxCoords / FrameDetections
pub mod decoder;
pub mod types;

pub use decoder::DetectionDecoder;
pub use types::{BoxCoords, Detection, FrameDetections};
