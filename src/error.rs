// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 流水线错误类型
/// Frame-scoped pipeline errors. None of these end a session.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// 源帧无法解码 (JPEG/PNG 损坏、尺寸为0)
    #[error("capture error: {0}")]
    Capture(String),

    #[error("invalid pixel buffer: expected {expected} bytes, got {actual}")]
    InvalidPixelBuffer { expected: usize, actual: usize },

    #[error("letterbox failed: {0}")]
    Letterbox(String),

    /// 推理输出不符合 [x1, y1, x2, y2, score, class] 记录格式
    #[error("malformed model output: {0}")]
    MalformedOutput(String),

    #[error("inference engine error: {0}")]
    InferenceEngine(String),

    #[error("session closed")]
    SessionClosed,

    #[error("invalid config: {0}")]
    Config(String),

    /// 没有可用的 Tokio 运行时 (在运行时之外创建会话)
    #[error("no tokio runtime: {0}")]
    Runtime(String),
}

impl PipelineError {
    /// 传输层使用的稳定错误标识
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Capture(_) => "capture",
            PipelineError::InvalidPixelBuffer { .. } => "invalid_pixel_buffer",
            PipelineError::Letterbox(_) => "letterbox",
            PipelineError::MalformedOutput(_) => "malformed_output",
            PipelineError::InferenceEngine(_) => "inference_engine",
            PipelineError::SessionClosed => "session_closed",
            PipelineError::Config(_) => "config",
            PipelineError::Runtime(_) => "runtime",
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
