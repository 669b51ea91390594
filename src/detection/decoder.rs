// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 检测输出解码 (端到端模型, 无需 NMS)
//
// 输出格式: 扁平缓冲区, 每条记录 `record_width` 个 f32
// 前 6 个 = [x1, y1, x2, y2, score, class_id], 其余字段忽略
//
// 注意: 这里不做 NMS / 重叠抑制, 重叠框原样输出。

use crate::config::{CoordUnits, PipelineConfig};
use crate::detection::types::{BoxCoords, Detection};
use crate::error::{PipelineError, Result};
use crate::models::EngineOutputs;
use crate::utils::LetterboxPlan;

/// 每条记录的最少字段数
pub const MIN_RECORD_WIDTH: usize = 6;

#[derive(Debug, Clone)]
pub struct DetectionDecoder {
    conf_threshold: f32,
    record_width: usize,
    coord_units: CoordUnits,
    output_name: Option<String>,
}

impl DetectionDecoder {
    pub fn new(conf_threshold: f32, record_width: usize) -> Self {
        Self {
            conf_threshold,
            record_width,
            coord_units: CoordUnits::Pixels,
            output_name: None,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            conf_threshold: config.conf_threshold,
            record_width: config.record_width,
            coord_units: config.coord_units,
            output_name: config.output_name.clone(),
        }
    }

    pub fn with_coord_units(mut self, units: CoordUnits) -> Self {
        self.coord_units = units;
        self
    }

    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }

    /// 查找输出缓冲区, 校验形状后解码
    pub fn decode(
        &self,
        outputs: &EngineOutputs,
        plan: &LetterboxPlan,
        src_w: u32,
        src_h: u32,
    ) -> Result<Vec<Detection>> {
        let output = outputs.get(self.output_name.as_deref()).ok_or_else(|| {
            PipelineError::MalformedOutput(format!(
                "output {:?} not found (engine returned {:?})",
                self.output_name.as_deref().unwrap_or("<first>"),
                outputs.names()
            ))
        })?;

        if !output.shape.is_empty() {
            let numel: i64 = output.shape.iter().product();
            if numel < 0 || numel as usize != output.data.len() {
                return Err(PipelineError::MalformedOutput(format!(
                    "output '{}' shape {:?} does not match {} values",
                    output.name,
                    output.shape,
                    output.data.len()
                )));
            }
            if output.shape.len() >= 2
                && output.shape[output.shape.len() - 1] != self.record_width as i64
            {
                return Err(PipelineError::MalformedOutput(format!(
                    "output '{}' shape {:?} is not [.., {}] records",
                    output.name, output.shape, self.record_width
                )));
            }
        }

        self.decode_records(&output.data, plan, src_w, src_h)
    }

    /// 按记录遍历: 置信度过滤 → 类别取整 → 逆 letterbox → 裁剪到图像边界
    ///
    /// 输出顺序与原始缓冲区一致 (不按置信度排序)。
    pub fn decode_records(
        &self,
        raw: &[f32],
        plan: &LetterboxPlan,
        src_w: u32,
        src_h: u32,
    ) -> Result<Vec<Detection>> {
        if self.record_width < MIN_RECORD_WIDTH {
            return Err(PipelineError::MalformedOutput(format!(
                "record width {} < {}",
                self.record_width, MIN_RECORD_WIDTH
            )));
        }
        if raw.len() % self.record_width != 0 {
            return Err(PipelineError::MalformedOutput(format!(
                "{} values is not a multiple of record width {}",
                raw.len(),
                self.record_width
            )));
        }

        let (unit_x, unit_y) = match self.coord_units {
            CoordUnits::Pixels => (1.0, 1.0),
            CoordUnits::Normalized => (plan.target_w as f32, plan.target_h as f32),
        };
        let (max_x, max_y) = (src_w as f32, src_h as f32);

        let mut ys = Vec::new();
        for record in raw.chunks_exact(self.record_width) {
            let score = record[4];
            if score.is_nan() || score <= self.conf_threshold {
                continue;
            }

            let (x1, y1) = plan.to_source(record[0] * unit_x, record[1] * unit_y);
            let (x2, y2) = plan.to_source(record[2] * unit_x, record[3] * unit_y);

            ys.push(Detection {
                class_id: record[5].round() as i32,
                confidence: score.min(1.0),
                bbox: BoxCoords {
                    x1: x1.clamp(0.0, max_x),
                    y1: y1.clamp(0.0, max_y),
                    x2: x2.clamp(0.0, max_x),
                    y2: y2.clamp(0.0, max_y),
                },
            });
        }

        Ok(ys)
    }
}
