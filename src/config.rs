// 该文件是 Carsight 项目的一部分。
// src/config.rs - 校验阈值配置
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::class_id_of;

// 检测
const DEFAULT_DETECTION_CONFIDENCE: f32 = 0.5;
const DEFAULT_TARGET_CLASS: &str = "car";

// 判据
const DEFAULT_SIZE_FLOOR_SEGMENTED: f32 = 0.20;
const DEFAULT_SIZE_FLOOR_BOX: f32 = 0.25;
const DEFAULT_ASPECT_RATIO_FLOOR: f32 = 1.8;
const DEFAULT_MAX_SYMMETRY_MAGNITUDE: f32 = 0.6;
const DEFAULT_BACKGROUND_BRIGHTNESS_FLOOR: u8 = 180;
const DEFAULT_WHITENESS_FLOOR: f32 = 0.85;
const DEFAULT_ORIENTATION_CONFIDENCE_FLOOR: f32 = 0.5;

// 朝向分类
const DEFAULT_ORIENTATION_THRESHOLD: f32 = 0.1;
const DEFAULT_POSITION_BAND: (f32, f32) = (0.30, 0.80);

// 分割
const DEFAULT_SEGMENTATION_ITERATIONS: usize = 5;
const DEFAULT_SEGMENTATION_MARGIN: f32 = 0.05;
const DEFAULT_MIN_FOREGROUND_FRACTION: f32 = 0.05;
const DEFAULT_COLOR_COMPONENTS: usize = 5;
const DEFAULT_SMOOTHNESS: f32 = 2.0;

const DEFAULT_FALLBACK_QUALITY_PENALTY: f32 = 0.8;

const WEIGHT_SUM_TOLERANCE: f32 = 1e-3;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("配置项 {name} 超出范围: {value}")]
  OutOfRange { name: &'static str, value: f32 },
  #[error("朝向投票权重之和必须为 1, 实际为 {0}")]
  WeightSum(f32),
  #[error("未知的目标类别: {0}")]
  UnknownClass(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
}

/// 朝向分类器中三个投票者的权重
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoterWeights {
  pub aspect: f32,
  pub position: f32,
  pub density: f32,
}

impl Default for VoterWeights {
  fn default() -> Self {
    Self {
      aspect: 1.0 / 3.0,
      position: 1.0 / 3.0,
      density: 1.0 / 3.0,
    }
  }
}

impl VoterWeights {
  pub fn sum(&self) -> f32 {
    self.aspect + self.position + self.density
  }
}

/// 区域分割参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
  /// 颜色模型重估与像素重标记的迭代次数
  pub iterations: usize,
  /// 边界框外扩比例（相对框的宽高），外扩区域视为可能背景
  pub margin: f32,
  /// 前景像素数相对边界框面积的最低比例，低于该值视为分割失败
  pub min_foreground_fraction: f32,
  /// 每个颜色模型的高斯分量数
  pub components: usize,
  /// 平滑项权重
  pub smoothness: f32,
}

impl Default for SegmentationConfig {
  fn default() -> Self {
    Self {
      iterations: DEFAULT_SEGMENTATION_ITERATIONS,
      margin: DEFAULT_SEGMENTATION_MARGIN,
      min_foreground_fraction: DEFAULT_MIN_FOREGROUND_FRACTION,
      components: DEFAULT_COLOR_COMPONENTS,
      smoothness: DEFAULT_SMOOTHNESS,
    }
  }
}

/// 校验流水线的全部可调参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
  pub detection_confidence: f32,
  pub target_class: String,
  pub size_floor_segmented: f32,
  pub size_floor_box: f32,
  pub aspect_ratio_floor: f32,
  pub max_symmetry_magnitude: f32,
  pub background_brightness_floor: u8,
  pub whiteness_floor: f32,
  pub orientation_confidence_floor: f32,
  pub orientation_threshold: f32,
  pub position_band: (f32, f32),
  pub voter_weights: VoterWeights,
  pub segmentation: SegmentationConfig,
  pub fallback_quality_penalty: f32,
}

impl Default for ValidationConfig {
  fn default() -> Self {
    Self {
      detection_confidence: DEFAULT_DETECTION_CONFIDENCE,
      target_class: DEFAULT_TARGET_CLASS.to_string(),
      size_floor_segmented: DEFAULT_SIZE_FLOOR_SEGMENTED,
      size_floor_box: DEFAULT_SIZE_FLOOR_BOX,
      aspect_ratio_floor: DEFAULT_ASPECT_RATIO_FLOOR,
      max_symmetry_magnitude: DEFAULT_MAX_SYMMETRY_MAGNITUDE,
      background_brightness_floor: DEFAULT_BACKGROUND_BRIGHTNESS_FLOOR,
      whiteness_floor: DEFAULT_WHITENESS_FLOOR,
      orientation_confidence_floor: DEFAULT_ORIENTATION_CONFIDENCE_FLOOR,
      orientation_threshold: DEFAULT_ORIENTATION_THRESHOLD,
      position_band: DEFAULT_POSITION_BAND,
      voter_weights: VoterWeights::default(),
      segmentation: SegmentationConfig::default(),
      fallback_quality_penalty: DEFAULT_FALLBACK_QUALITY_PENALTY,
    }
  }
}

fn unit_range(name: &'static str, value: f32) -> Result<(), ConfigError> {
  if (0.0..=1.0).contains(&value) {
    Ok(())
  } else {
    Err(ConfigError::OutOfRange { name, value })
  }
}

impl ValidationConfig {
  pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("加载配置文件: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    let config: ValidationConfig = serde_json::from_str(&text)?;
    config.validate()?;
    debug!("配置内容: {:?}", config);
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    unit_range("detection_confidence", self.detection_confidence)?;
    unit_range("size_floor_segmented", self.size_floor_segmented)?;
    unit_range("size_floor_box", self.size_floor_box)?;
    unit_range("max_symmetry_magnitude", self.max_symmetry_magnitude)?;
    unit_range("whiteness_floor", self.whiteness_floor)?;
    unit_range("orientation_confidence_floor", self.orientation_confidence_floor)?;
    unit_range("orientation_threshold", self.orientation_threshold)?;
    unit_range("fallback_quality_penalty", self.fallback_quality_penalty)?;
    unit_range("segmentation.margin", self.segmentation.margin)?;
    unit_range(
      "segmentation.min_foreground_fraction",
      self.segmentation.min_foreground_fraction,
    )?;

    if self.aspect_ratio_floor <= 0.0 {
      return Err(ConfigError::OutOfRange {
        name: "aspect_ratio_floor",
        value: self.aspect_ratio_floor,
      });
    }

    let (low, high) = self.position_band;
    unit_range("position_band.0", low)?;
    unit_range("position_band.1", high)?;
    if low >= high {
      return Err(ConfigError::OutOfRange {
        name: "position_band",
        value: high - low,
      });
    }

    let weights = [
      self.voter_weights.aspect,
      self.voter_weights.position,
      self.voter_weights.density,
    ];
    for weight in weights {
      unit_range("voter_weights", weight)?;
    }
    let sum = self.voter_weights.sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
      return Err(ConfigError::WeightSum(sum));
    }

    if self.segmentation.iterations == 0 {
      return Err(ConfigError::OutOfRange {
        name: "segmentation.iterations",
        value: 0.0,
      });
    }
    if self.segmentation.components == 0 {
      return Err(ConfigError::OutOfRange {
        name: "segmentation.components",
        value: 0.0,
      });
    }
    if self.segmentation.smoothness < 0.0 {
      return Err(ConfigError::OutOfRange {
        name: "segmentation.smoothness",
        value: self.segmentation.smoothness,
      });
    }

    if class_id_of(&self.target_class).is_none() {
      return Err(ConfigError::UnknownClass(self.target_class.clone()));
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_are_valid() {
    let config = ValidationConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.background_brightness_floor, 180);
    assert_eq!(config.segmentation.iterations, 5);
  }

  #[test]
  fn rejects_weights_not_summing_to_one() {
    let config = ValidationConfig {
      voter_weights: VoterWeights {
        aspect: 0.5,
        position: 0.5,
        density: 0.5,
      },
      ..Default::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::WeightSum(_))));
  }

  #[test]
  fn rejects_inverted_position_band() {
    let config = ValidationConfig {
      position_band: (0.8, 0.3),
      ..Default::default()
    };
    assert!(matches!(
      config.validate(),
      Err(ConfigError::OutOfRange {
        name: "position_band",
        ..
      })
    ));
  }

  #[test]
  fn rejects_unknown_class() {
    let config = ValidationConfig {
      target_class: "spaceship".to_string(),
      ..Default::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::UnknownClass(_))));
  }

  #[test]
  fn partial_json_keeps_defaults() {
    let config: ValidationConfig =
      serde_json::from_str(r#"{ "aspect_ratio_floor": 2.0, "segmentation": { "iterations": 3 } }"#)
        .unwrap();
    assert_eq!(config.aspect_ratio_floor, 2.0);
    assert_eq!(config.segmentation.iterations, 3);
    assert_eq!(config.segmentation.components, 5);
    assert_eq!(config.whiteness_floor, 0.85);
  }

  #[test]
  fn loads_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{ "whiteness_floor": 0.9 }"#).unwrap();
    let config = ValidationConfig::from_json_file(&path).unwrap();
    assert_eq!(config.whiteness_floor, 0.9);
  }
}
