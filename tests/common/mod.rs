// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 测试用推理引擎 + 图片生成
#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc as std_mpsc;
use std::time::Duration;

use image::{ImageFormat, Rgb, RgbImage};
use ndarray::{Array, IxDyn};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use yolo_stream_rs::{EngineOutputs, InferenceEngine, PipelineError, PipelineState, Result};

type Respond = Box<dyn Fn(usize, &Array<f32, IxDyn>) -> Result<EngineOutputs> + Send + Sync>;

/// 可编程的推理引擎
///
/// `gated` 版本每次调用都会先通知 `entered`, 再阻塞直到测试放行一次。
pub struct MockEngine {
    calls: AtomicUsize,
    respond: Respond,
    gate: Option<(Mutex<std_mpsc::Receiver<()>>, mpsc::UnboundedSender<usize>)>,
}

pub struct Gate {
    release: std_mpsc::Sender<()>,
    entered: mpsc::UnboundedReceiver<usize>,
}

impl Gate {
    /// 等待下一次引擎调用开始, 返回调用序号
    pub async fn entered(&mut self) -> usize {
        tokio::time::timeout(Duration::from_secs(5), self.entered.recv())
            .await
            .expect("engine was never called")
            .expect("engine dropped")
    }

    pub fn release(&self) {
        self.release.send(()).expect("engine dropped");
    }
}

impl MockEngine {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(usize, &Array<f32, IxDyn>) -> Result<EngineOutputs> + Send + Sync + 'static,
    {
        Self {
            calls: AtomicUsize::new(0),
            respond: Box::new(respond),
            gate: None,
        }
    }

    pub fn gated<F>(respond: F) -> (Self, Gate)
    where
        F: Fn(usize, &Array<f32, IxDyn>) -> Result<EngineOutputs> + Send + Sync + 'static,
    {
        let (release, release_rx) = std_mpsc::channel();
        let (entered_tx, entered) = mpsc::unbounded_channel();
        let mut engine = Self::new(respond);
        engine.gate = Some((Mutex::new(release_rx), entered_tx));
        (engine, Gate { release, entered })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl InferenceEngine for MockEngine {
    fn run(&self, input_name: &str, input: Array<f32, IxDyn>) -> Result<EngineOutputs> {
        assert_eq!(input_name, "images");
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((release, entered)) = &self.gate {
            let _ = entered.send(call);
            release
                .lock()
                .recv()
                .map_err(|_| PipelineError::InferenceEngine("gate closed".to_string()))?;
        }
        (self.respond)(call, &input)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// 一个 `[1, n, 6]` 输出
pub fn records(data: Vec<f32>) -> EngineOutputs {
    let n = (data.len() / 6) as i64;
    let mut outputs = EngineOutputs::new();
    outputs.push("output0", vec![1, n, 6], data);
    outputs
}

/// 总是返回同一个模型空间框
pub fn one_box(_call: usize, _input: &Array<f32, IxDyn>) -> Result<EngineOutputs> {
    Ok(records(vec![100.0, 150.0, 200.0, 250.0, 0.9, 2.0]))
}

/// 类别由画面中心颜色决定: 偏红 → 0, 偏蓝 → 1
pub fn class_by_colour(_call: usize, input: &Array<f32, IxDyn>) -> Result<EngineOutputs> {
    let (h, w) = (input.shape()[2], input.shape()[3]);
    let r = input[[0, 0, h / 2, w / 2]];
    let b = input[[0, 2, h / 2, w / 2]];
    let class = if r > b { 0.0 } else { 1.0 };
    Ok(records(vec![10.0, 10.0, 20.0, 20.0, 0.9, class]))
}

/// 纯色 PNG
pub fn png(width: u32, height: u32, colour: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb(colour));
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, ImageFormat::Png)
        .expect("png encode");
    bytes.into_inner()
}

pub const RED: [u8; 3] = [220, 20, 20];
pub const BLUE: [u8; 3] = [20, 20, 220];

/// 等待流水线回到 Idle (结果发出后槽位才释放)
pub async fn wait_for_state<F>(state: F, want: PipelineState)
where
    F: Fn() -> PipelineState,
{
    for _ in 0..500 {
        if state() == want {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("pipeline never reached {want:?}, stuck in {:?}", state());
}
