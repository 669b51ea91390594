// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 帧处理流水线 (Frame Pipeline)
///
/// 每个会话一条流水线, 严格串行:
/// ```text
/// submit ─→ PipelineSlot ─(空闲)─→ Encoding ─→ Inferring ─→ Decoding ─→ Idle
///              │                      解码图片      spawn_blocking   逆letterbox
///              └─(忙)─→ 覆盖等待帧 (latest-wins)
/// ```
/// - 图片解码、letterbox、张量编码、检测解码都是同步 CPU 工作
/// - 只有推理调用放到阻塞线程池, 是唯一的挂起点
/// - 任何一步失败 → Failed → Idle, 会话继续
pub mod encoder;
pub mod slot;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::detection::{DetectionDecoder, FrameDetections};
use crate::error::{PipelineError, Result};
use crate::models::InferenceEngine;
use crate::utils::Letterbox;

pub use encoder::TensorEncoder;
pub use slot::{FramePayload, Offer, PipelineSlot, PipelineState};

/// 失败帧
#[derive(Debug)]
pub struct FrameFailure {
    pub frame_id: u64,
    pub error: PipelineError,
}

/// 一次流水线运行的结果, 按完成顺序发送到会话的结果通道
pub type FrameOutcome = std::result::Result<FrameDetections, FrameFailure>;

/// 结果通道容量。消费端跟不上时新结果直接丢弃 (计入 `undelivered`)
pub const RESULT_QUEUE: usize = 8;

/// 流水线计数器
#[derive(Debug, Default)]
pub struct PipelineStats {
    submitted: AtomicU64,
    dropped: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    undelivered: AtomicU64,
    last_inference_us: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsSnapshot {
    pub submitted: u64,
    pub dropped: u64,
    pub completed: u64,
    pub failed: u64,
    /// 已产生但因结果通道已满而丢弃的结果
    pub undelivered: u64,
    pub last_inference_ms: f64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            undelivered: self.undelivered.load(Ordering::Relaxed),
            last_inference_ms: self.last_inference_us.load(Ordering::Relaxed) as f64 / 1000.0,
        }
    }
}

/// 帧处理流水线句柄 (可克隆, 共享同一个槽位)
#[derive(Clone)]
pub struct FramePipeline {
    inner: Arc<Inner>,
}

struct Inner {
    session_id: u64,
    engine: Arc<dyn InferenceEngine>,
    input_name: String,
    letterbox: Letterbox,
    encoder: TensorEncoder,
    decoder: DetectionDecoder,
    slot: PipelineSlot,
    stats: PipelineStats,
    runtime: Handle,
    events: mpsc::Sender<FrameOutcome>,
}

impl FramePipeline {
    /// `runtime` 是处理任务运行的地方, `submit` 可以从任意线程调用
    pub fn new(
        session_id: u64,
        engine: Arc<dyn InferenceEngine>,
        config: &PipelineConfig,
        runtime: Handle,
        events: mpsc::Sender<FrameOutcome>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                session_id,
                engine,
                input_name: config.input_name.clone(),
                letterbox: Letterbox::new(
                    config.target_width,
                    config.target_height,
                    config.pad_color,
                ),
                encoder: TensorEncoder::new(config.target_width, config.target_height),
                decoder: DetectionDecoder::from_config(config),
                slot: PipelineSlot::new(),
                stats: PipelineStats::default(),
                runtime,
                events,
            }),
        }
    }

    /// 提交一帧 (立即返回)
    ///
    /// 空闲时在创建时绑定的运行时上启动处理任务; 忙时只替换等待帧。
    pub fn submit(&self, frame: FramePayload) {
        let inner = &self.inner;
        inner.stats.submitted.fetch_add(1, Ordering::Relaxed);

        match inner.slot.offer(frame) {
            Offer::Start(frame) => {
                let inner = Arc::clone(&self.inner);
                self.inner.runtime.spawn(inner.drive(frame));
            }
            Offer::Queued { replaced } => {
                if let Some(dropped) = replaced {
                    inner.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    debug!(session = inner.session_id, frame_id = dropped, "stale frame dropped");
                }
            }
            Offer::Closed => {
                inner.stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// 关闭流水线: 丢弃等待帧, 正在推理的帧完成后结果也会被丢弃
    pub fn close(&self) {
        if let Some(dropped) = self.inner.slot.close() {
            self.inner.stats.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(session = self.inner.session_id, frame_id = dropped, "pending frame discarded on close");
        }
    }

    pub fn state(&self) -> PipelineState {
        self.inner.slot.state()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }
}

impl Inner {
    /// 处理当前帧, 然后接着处理等待位里的最新帧, 直到槽位清空
    async fn drive(self: Arc<Self>, mut frame: FramePayload) {
        loop {
            let outcome = self.process(&frame).await;
            self.emit(outcome);
            match self.slot.finish() {
                Some(next) => frame = next,
                None => break,
            }
        }
    }

    async fn process(&self, frame: &FramePayload) -> FrameOutcome {
        let mut src_size = None;
        match self.run_stages(frame, &mut src_size).await {
            Ok(ys) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .last_inference_us
                    .store((ys.inference_ms * 1000.0) as u64, Ordering::Relaxed);
                Ok(ys)
            }
            Err(error) => {
                self.slot.set_state(PipelineState::Failed);
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    session = self.session_id,
                    frame_id = frame.frame_id,
                    bytes = frame.bytes.len(),
                    src_size = ?src_size,
                    kind = error.kind(),
                    error = %error,
                    "frame failed"
                );
                Err(FrameFailure {
                    frame_id: frame.frame_id,
                    error,
                })
            }
        }
    }

    async fn run_stages(
        &self,
        frame: &FramePayload,
        src_size: &mut Option<(u32, u32)>,
    ) -> Result<FrameDetections> {
        // Encoding
        let img = image::load_from_memory(&frame.bytes)
            .map_err(|e| PipelineError::Capture(e.to_string()))?
            .to_rgb8();
        let (src_w, src_h) = img.dimensions();
        *src_size = Some((src_w, src_h));

        let canvas = self.letterbox.apply(&img)?;
        let tensor = self.encoder.encode(&canvas.pixels, 3)?;

        // Inferring
        self.slot.set_state(PipelineState::Inferring);
        let engine = Arc::clone(&self.engine);
        let input_name = self.input_name.clone();
        let t = Instant::now();
        let outputs = tokio::task::spawn_blocking(move || engine.run(&input_name, tensor))
            .await
            .map_err(|e| PipelineError::InferenceEngine(format!("inference task aborted: {e}")))??;
        let inference_ms = t.elapsed().as_secs_f64() * 1000.0;

        // Decoding
        self.slot.set_state(PipelineState::Decoding);
        let detections = self.decoder.decode(&outputs, &canvas.plan, src_w, src_h)?;

        debug!(
            session = self.session_id,
            frame_id = frame.frame_id,
            n = detections.len(),
            inference_ms,
            "frame done"
        );

        Ok(FrameDetections {
            frame_id: frame.frame_id,
            width: src_w,
            height: src_h,
            detections,
            inference_ms,
        })
    }

    fn emit(&self, outcome: FrameOutcome) {
        if self.slot.is_closed() {
            debug!(session = self.session_id, "session closed, result discarded");
            return;
        }
        match self.events.try_send(outcome) {
            Ok(()) => {}
            Err(TrySendError::Full(outcome)) => {
                self.stats.undelivered.fetch_add(1, Ordering::Relaxed);
                let frame_id = match &outcome {
                    Ok(ys) => ys.frame_id,
                    Err(f) => f.frame_id,
                };
                debug!(session = self.session_id, frame_id, "result queue full, result dropped");
            }
            // 接收端已经走了: 等同于会话关闭
            Err(TrySendError::Closed(_)) => {}
        }
    }
}
