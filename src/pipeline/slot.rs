// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 单会话帧槽位 (latest-wins)
//!
//! 同一时刻最多一帧在处理, 最多一帧在等待。新帧到达时如果流水线忙,
//! 直接替换等待中的旧帧, 不排队。所有状态读写都在同一把锁内完成。

use parking_lot::Mutex;

/// 流水线状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Encoding,
    Inferring,
    Decoding,
    Failed,
}

impl PipelineState {
    pub fn is_busy(self) -> bool {
        !matches!(self, PipelineState::Idle)
    }
}

/// 待处理的一帧 (编码后的图片字节)
#[derive(Debug, Clone)]
pub struct FramePayload {
    pub frame_id: u64,
    pub bytes: Vec<u8>,
}

/// `offer` 的结果
#[derive(Debug)]
pub enum Offer {
    /// 流水线空闲: 调用方负责立即开始处理这一帧
    Start(FramePayload),
    /// 流水线忙: 帧已放入等待位, `replaced` 为被挤掉的旧帧
    Queued { replaced: Option<u64> },
    /// 会话已关闭, 帧被丢弃
    Closed,
}

#[derive(Debug)]
struct SlotInner {
    state: PipelineState,
    pending: Option<FramePayload>,
    closed: bool,
}

#[derive(Debug)]
pub struct PipelineSlot {
    inner: Mutex<SlotInner>,
}

impl Default for PipelineSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineSlot {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SlotInner {
                state: PipelineState::Idle,
                pending: None,
                closed: false,
            }),
        }
    }

    /// 提交一帧: 空闲则进入 Encoding, 否则覆盖等待位
    pub fn offer(&self, frame: FramePayload) -> Offer {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Offer::Closed;
        }
        if inner.state.is_busy() {
            let replaced = inner.pending.replace(frame).map(|old| old.frame_id);
            return Offer::Queued { replaced };
        }
        inner.state = PipelineState::Encoding;
        Offer::Start(frame)
    }

    pub fn set_state(&self, state: PipelineState) {
        self.inner.lock().state = state;
    }

    pub fn state(&self) -> PipelineState {
        self.inner.lock().state
    }

    /// 当前帧处理结束 (成功或失败)
    ///
    /// 有等待帧时直接转入 Encoding 并交还给调用方继续处理; 否则回到 Idle。
    pub fn finish(&self) -> Option<FramePayload> {
        let mut inner = self.inner.lock();
        if inner.closed {
            inner.pending = None;
            inner.state = PipelineState::Idle;
            return None;
        }
        match inner.pending.take() {
            Some(next) => {
                inner.state = PipelineState::Encoding;
                Some(next)
            }
            None => {
                inner.state = PipelineState::Idle;
                None
            }
        }
    }

    /// 关闭槽位并丢弃等待帧, 返回被丢弃的帧号
    pub fn close(&self) -> Option<u64> {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.pending.take().map(|f| f.frame_id)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}
