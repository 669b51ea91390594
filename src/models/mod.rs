// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 推理引擎接口
///
/// # 架构说明
///
/// 检测模型本身是外部协作者: 接收固定形状 `[1, 3, H, W]` 的输入张量,
/// 返回 "输出名 → 扁平 f32 缓冲区" 的映射。流水线只依赖这个 trait,
/// 所有会话共享同一个引擎实例 (`Arc<dyn InferenceEngine>`)。
///
/// ## 线程安全约定
/// 实现必须是 `Send + Sync`: 多个会话会从不同的阻塞线程并发调用 `run`。
/// 引擎内部可以串行化 (例如 `OrtEngine` 用互斥锁保护 Session),
/// 也可以真正并行; 流水线不做任何假设。
///
/// ## 核心流程
/// ```text
/// 原始帧 → letterbox → 张量编码
///          ↓
///     InferenceEngine::run   (唯一的长耗时步骤, 在阻塞线程池执行)
///          ↓
///     EngineOutputs → DetectionDecoder → Vec<Detection>
/// ```
use ndarray::{Array, IxDyn};

use crate::error::Result;

pub mod onnx;

pub use onnx::{OrtEP, OrtEngine};

/// 单个命名输出
#[derive(Debug, Clone, PartialEq)]
pub struct NamedOutput {
    pub name: String,
    pub shape: Vec<i64>,
    pub data: Vec<f32>,
}

/// 引擎返回的全部输出, 保持引擎给出的顺序
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOutputs {
    outputs: Vec<NamedOutput>,
}

impl EngineOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, shape: Vec<i64>, data: Vec<f32>) {
        self.outputs.push(NamedOutput {
            name: name.into(),
            shape,
            data,
        });
    }

    /// 按名字查找; 未指定名字时取第一个输出
    pub fn get(&self, name: Option<&str>) -> Option<&NamedOutput> {
        match name {
            Some(name) => self.outputs.iter().find(|o| o.name == name),
            None => self.outputs.first(),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.outputs.iter().map(|o| o.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// 统一的推理引擎接口
pub trait InferenceEngine: Send + Sync {
    /// 执行一次前向推理
    ///
    /// # Arguments
    /// * `input_name` - 输入绑定名 (例如 `images`)
    /// * `input` - NCHW 张量 `[1, 3, H, W]`
    fn run(&self, input_name: &str, input: Array<f32, IxDyn>) -> Result<EngineOutputs>;

    /// 引擎描述 (日志/健康检查用)
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_output_is_used_without_a_name() {
        let mut outputs = EngineOutputs::new();
        outputs.push("output0", vec![1, 1, 6], vec![0.0; 6]);
        outputs.push("extra", vec![1], vec![1.0]);

        assert_eq!(outputs.get(None).unwrap().name, "output0");
        assert_eq!(outputs.get(Some("extra")).unwrap().data, vec![1.0]);
        assert!(outputs.get(Some("boxes")).is_none());
        assert_eq!(outputs.names(), vec!["output0", "extra"]);
    }
}
