// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// ONNX Runtime 推理引擎
// 包含: 模型加载、执行设备选择、推理、输出提取

use anyhow::Result;
use ndarray::{Array, IxDyn};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::Session;
use ort::value::Tensor;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::{EngineOutputs, InferenceEngine};
use crate::error::PipelineError;

/// 执行设备
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrtEP {
    CPU,
    CUDA(i32),
}

/// ONNX Runtime 引擎
///
/// `ort::Session::run` 需要独占访问, 这里用互斥锁串行化;
/// 多个会话并发调用时按到达顺序排队, 吞吐量由引擎本身决定。
pub struct OrtEngine {
    session: Mutex<Session>,
    name: String,
}

impl OrtEngine {
    pub fn build(model: &str, ep: OrtEP) -> Result<Self> {
        let mut builder = Session::builder()?;
        if let OrtEP::CUDA(device_id) = ep {
            builder = builder.with_execution_providers([CUDAExecutionProvider::default()
                .with_device_id(device_id)
                .build()])?;
        }
        let session = builder.commit_from_file(model)?;

        info!(model, ?ep, "ONNX model loaded");

        Ok(Self {
            session: Mutex::new(session),
            name: model.to_string(),
        })
    }
}

impl InferenceEngine for OrtEngine {
    fn run(
        &self,
        input_name: &str,
        input: Array<f32, IxDyn>,
    ) -> Result<EngineOutputs, PipelineError> {
        let engine_err = |e: ort::Error| PipelineError::InferenceEngine(e.to_string());

        let tensor = Tensor::from_array(input).map_err(engine_err)?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![input_name => tensor])
            .map_err(engine_err)?;

        let mut ys = EngineOutputs::new();
        for (name, value) in outputs.iter() {
            let (shape, data) = value.try_extract_tensor::<f32>().map_err(engine_err)?;
            let shape: Vec<i64> = shape.iter().copied().collect();
            debug!(output = name, ?shape, "engine output");
            ys.push(name, shape, data.to_vec());
        }

        if ys.is_empty() {
            return Err(PipelineError::InferenceEngine(
                "model returned no outputs".to_string(),
            ));
        }

        Ok(ys)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
