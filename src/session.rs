// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 流式会话: 一个客户端连接 ↔ 一条帧处理流水线

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::models::InferenceEngine;
use crate::pipeline::{
    FrameOutcome, FramePayload, FramePipeline, PipelineState, StatsSnapshot, RESULT_QUEUE,
};

/// 会话
///
/// `submit_frame` 不等待结果; 结果从 `next_result` 按完成顺序取出。
/// 不是每一帧都有结果: 被新帧挤掉的帧不产生任何输出。
pub struct StreamingSession {
    handle: SessionHandle,
    results: ResultStream,
}

/// 提交端 (可克隆)。最后一个句柄释放时会话自动关闭。
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<SessionShared>,
}

struct SessionShared {
    id: u64,
    pipeline: FramePipeline,
    next_frame_id: AtomicU64,
}

impl Drop for SessionShared {
    fn drop(&mut self) {
        self.pipeline.close();
    }
}

/// 结果端 (有界, 最多缓存 `RESULT_QUEUE` 个未读结果)
pub struct ResultStream {
    rx: mpsc::Receiver<FrameOutcome>,
}

impl ResultStream {
    /// 下一个结果; 会话关闭且所有发送端释放后返回 None
    pub async fn next(&mut self) -> Option<FrameOutcome> {
        self.rx.recv().await
    }
}

impl StreamingSession {
    /// 在当前 Tokio 运行时上创建会话; 不在运行时内时返回 `PipelineError::Runtime`
    pub fn new(
        id: u64,
        engine: Arc<dyn InferenceEngine>,
        config: &PipelineConfig,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| PipelineError::Runtime(e.to_string()))?;
        Ok(Self::with_runtime(id, engine, config, runtime))
    }

    /// 显式指定处理任务所在的运行时
    pub fn with_runtime(
        id: u64,
        engine: Arc<dyn InferenceEngine>,
        config: &PipelineConfig,
        runtime: Handle,
    ) -> Self {
        let (tx, rx) = mpsc::channel(RESULT_QUEUE);
        let pipeline = FramePipeline::new(id, engine, config, runtime, tx);
        Self {
            handle: SessionHandle {
                shared: Arc::new(SessionShared {
                    id,
                    pipeline,
                    next_frame_id: AtomicU64::new(1),
                }),
            },
            results: ResultStream { rx },
        }
    }

    pub fn id(&self) -> u64 {
        self.handle.id()
    }

    pub fn submit_frame(&self, bytes: impl Into<Vec<u8>>) -> u64 {
        self.handle.submit_frame(bytes)
    }

    pub async fn next_result(&mut self) -> Option<FrameOutcome> {
        self.results.next().await
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.handle.stats()
    }

    pub fn state(&self) -> PipelineState {
        self.handle.state()
    }

    pub fn close(&self) {
        self.handle.close();
    }

    /// 拆成提交端和结果端, 方便放进两个任务
    pub fn into_split(self) -> (SessionHandle, ResultStream) {
        (self.handle, self.results)
    }
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// 分配帧号并提交, 返回帧号
    pub fn submit_frame(&self, bytes: impl Into<Vec<u8>>) -> u64 {
        let frame_id = self.shared.next_frame_id.fetch_add(1, Ordering::Relaxed);
        self.shared.pipeline.submit(FramePayload {
            frame_id,
            bytes: bytes.into(),
        });
        frame_id
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.pipeline.stats()
    }

    pub fn state(&self) -> PipelineState {
        self.shared.pipeline.state()
    }

    /// 关闭会话 (不等待正在进行的推理)
    pub fn close(&self) {
        self.shared.pipeline.close();
        let s = self.stats();
        info!(
            session = self.shared.id,
            submitted = s.submitted,
            completed = s.completed,
            dropped = s.dropped,
            failed = s.failed,
            undelivered = s.undelivered,
            "session closed"
        );
    }
}
