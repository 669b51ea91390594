// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 配置: 命令行参数 + JSON 流水线参数文件

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::detection::decoder::MIN_RECORD_WIDTH;
use crate::error::PipelineError;
use crate::models::OrtEP;

/// 实时检测服务
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "YOLO 实时检测 WebSocket 服务", long_about = None)]
pub struct Args {
    /// ONNX 模型路径
    #[arg(long, required = true)]
    pub model: String,

    /// 流水线参数文件 (JSON, 不存在时写入默认值)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// 监听地址
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// 监听端口
    #[arg(long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    /// 输入宽度 (覆盖配置文件)
    #[arg(long)]
    pub width: Option<u32>,

    /// 输入高度 (覆盖配置文件)
    #[arg(long)]
    pub height: Option<u32>,

    /// 置信度阈值 (覆盖配置文件)
    #[arg(long)]
    pub conf: Option<f32>,

    /// 使用 CUDA 执行
    #[arg(long)]
    pub cuda: bool,

    /// CUDA 设备号
    #[arg(long, default_value_t = 0)]
    pub device_id: i32,

    /// 允许跨域的前端地址
    #[arg(long, default_value = "http://localhost:5173")]
    pub allow_origin: String,

    /// 日志级别 (RUST_LOG 优先)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn ep(&self) -> OrtEP {
        if self.cuda {
            OrtEP::CUDA(self.device_id)
        } else {
            OrtEP::CPU
        }
    }

    /// 配置文件 + 命令行覆盖, 最后校验
    pub fn pipeline_config(&self) -> Result<PipelineConfig, PipelineError> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path),
            None => PipelineConfig::default(),
        };
        if let Some(width) = self.width {
            config.target_width = width;
        }
        if let Some(height) = self.height {
            config.target_height = height;
        }
        if let Some(conf) = self.conf {
            config.conf_threshold = conf;
        }
        config.validate()?;
        Ok(config)
    }
}

/// 检测记录中的坐标单位 (集成模型时确定一次, 全流水线不变)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordUnits {
    /// 模型输入像素 (0..W, 0..H)
    #[default]
    Pixels,
    /// 归一化 (0..1), 解码时先乘以模型输入尺寸
    Normalized,
}

/// 流水线参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // === Letterbox ===
    pub target_width: u32,
    pub target_height: u32,
    pub pad_color: [u8; 3], // 填充色, 默认中灰 #727272

    // === 解码 ===
    pub conf_threshold: f32,
    pub record_width: usize, // 每条检测记录的 f32 个数
    pub coord_units: CoordUnits,

    // === 推理引擎绑定 ===
    pub input_name: String,
    pub output_name: Option<String>, // None = 取第一个输出
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_width: 640,
            target_height: 640,
            pad_color: [114, 114, 114],
            conf_threshold: 0.5,
            record_width: 6,
            coord_units: CoordUnits::Pixels,
            input_name: "images".to_string(),
            output_name: None,
        }
    }
}

impl PipelineConfig {
    /// 从JSON文件加载配置; 文件不存在时写入默认值, 解析失败时使用默认值
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!(path = %path.display(), "pipeline config loaded");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "config parse failed, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                info!(path = %path.display(), "config file missing, writing defaults");
                let config = Self::default();
                config.save(path);
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &Path) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    warn!(path = %path.display(), error = %e, "failed to save config");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize config"),
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.target_width == 0 || self.target_height == 0 {
            return Err(PipelineError::Config(format!(
                "target size {}x{} must be non-zero",
                self.target_width, self.target_height
            )));
        }
        if self.record_width < MIN_RECORD_WIDTH {
            return Err(PipelineError::Config(format!(
                "record_width {} < {}",
                self.record_width, MIN_RECORD_WIDTH
            )));
        }
        if !(0.0..=1.0).contains(&self.conf_threshold) {
            return Err(PipelineError::Config(format!(
                "conf_threshold {} outside [0, 1]",
                self.conf_threshold
            )));
        }
        if self.input_name.is_empty() {
            return Err(PipelineError::Config("input_name is empty".to_string()));
        }
        Ok(())
    }

    /// 打印当前配置
    pub fn log_summary(&self) {
        info!(
            target_size = %format!("{}x{}", self.target_width, self.target_height),
            conf = self.conf_threshold,
            record_width = self.record_width,
            coord_units = ?self.coord_units,
            input = %self.input_name,
            output = %self.output_name.as_deref().unwrap_or("<first>"),
            "pipeline config"
        );
    }
}
