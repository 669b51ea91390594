// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 命令行 + 流水线参数
pub mod detection; // 检测结果与解码
pub mod error; // 帧级错误
pub mod models; // 推理引擎接口与 ONNX Runtime 实现
pub mod pipeline; // 帧处理流水线 (latest-wins)
pub mod server; // WebSocket 传输层
pub mod session; // 流式会话
pub mod utils; // letterbox / 仿射变换

pub use crate::config::{Args, CoordUnits, PipelineConfig};
pub use crate::detection::{BoxCoords, Detection, DetectionDecoder, FrameDetections};
pub use crate::error::{PipelineError, Result};
pub use crate::models::{EngineOutputs, InferenceEngine, OrtEP, OrtEngine};
pub use crate::pipeline::{
    FrameFailure, FrameOutcome, FramePipeline, PipelineState, StatsSnapshot, TensorEncoder,
    RESULT_QUEUE,
};
pub use crate::session::{ResultStream, SessionHandle, StreamingSession};
pub use crate::utils::{Letterbox, LetterboxPlan};
