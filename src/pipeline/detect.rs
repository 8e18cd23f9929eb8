// 该文件是 Carsight 项目的一部分。
// src/pipeline/detect.rs - 检测器适配层
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

use image::RgbImage;
use tracing::{debug, info};

use crate::{
  config::{ConfigError, ValidationConfig},
  error::ValidationError,
  model::{DetectItem, Detector, class_id_of, label_of},
  types::BoundingBox,
};

/// 选出目标类别中置信度严格高于 `floor` 的最佳检测，并列时保留先出现者
pub fn select_best<'a>(
  items: impl IntoIterator<Item = &'a DetectItem>,
  class_id: u32,
  floor: f32,
) -> Option<&'a DetectItem> {
  items
    .into_iter()
    .filter(|item| item.class_id == class_id)
    .filter(|item| item.score > floor)
    .fold(None, |best: Option<&DetectItem>, item| match best {
      Some(b) if b.score >= item.score => Some(b),
      _ => Some(item),
    })
}

/// 将浮点检测框取整并截断到图像范围内
fn to_pixel_box(item: &DetectItem, (width, height): (u32, u32)) -> [u32; 4] {
  let clamp_x = |v: f32| v.clamp(0.0, width as f32) as u32;
  let clamp_y = |v: f32| v.clamp(0.0, height as f32) as u32;
  [
    clamp_x(item.bbox[0].floor()),
    clamp_y(item.bbox[1].floor()),
    clamp_x(item.bbox[2].ceil()),
    clamp_y(item.bbox[3].ceil()),
  ]
}

/// 包装外部检测器，每张图像至多给出一个目标边界框
pub struct DetectorAdapter<D> {
  detector: D,
  class_id: u32,
  class_name: String,
  floor: f32,
}

impl<D: Detector> DetectorAdapter<D> {
  pub fn new(detector: D, config: &ValidationConfig) -> Result<Self, ConfigError> {
    let class_id = class_id_of(&config.target_class)
      .ok_or_else(|| ConfigError::UnknownClass(config.target_class.clone()))?;
    Ok(Self {
      detector,
      class_id,
      class_name: config.target_class.clone(),
      floor: config.detection_confidence,
    })
  }

  pub fn locate(&self, image: &RgbImage) -> Result<BoundingBox, ValidationError> {
    let result = self
      .detector
      .detect(image)
      .map_err(|e| ValidationError::DetectionFailed(e.to_string()))?;
    debug!("检测器 {} 返回 {} 个结果", self.detector.name(), result.len());

    let best = select_best(result.iter(), self.class_id, self.floor).ok_or_else(|| {
      ValidationError::NoObjectDetected {
        class: self.class_name.clone(),
        floor: self.floor,
      }
    })?;

    let [left, top, right, bottom] = to_pixel_box(best, image.dimensions());
    let label = label_of(best.class_id).unwrap_or("unknown");
    let bbox = BoundingBox::new(
      left,
      top,
      right,
      bottom,
      best.score.clamp(0.0, 1.0),
      best.class_id,
      label,
      image.dimensions(),
    )?;
    info!(
      "检测到 {}: {:.2}% at ({}, {})-({}, {})",
      label,
      bbox.confidence * 100.0,
      bbox.left,
      bbox.top,
      bbox.right,
      bbox.bottom
    );
    Ok(bbox)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::FixedDetector;

  fn item(class_id: u32, score: f32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id,
      score,
      bbox,
    }
  }

  #[test]
  fn picks_highest_confidence_of_target_class() {
    let items = [
      item(2, 0.6, [0.0, 0.0, 10.0, 10.0]),
      item(0, 0.99, [0.0, 0.0, 20.0, 20.0]),
      item(2, 0.8, [5.0, 5.0, 15.0, 15.0]),
    ];
    let best = select_best(items.iter(), 2, 0.5).unwrap();
    assert_eq!(best.score, 0.8);
  }

  #[test]
  fn ties_keep_first_seen() {
    let items = [
      item(2, 0.7, [0.0, 0.0, 10.0, 10.0]),
      item(2, 0.7, [1.0, 1.0, 11.0, 11.0]),
    ];
    let best = select_best(items.iter(), 2, 0.5).unwrap();
    assert_eq!(best.bbox[0], 0.0);
  }

  #[test]
  fn floor_is_exclusive() {
    let items = [item(2, 0.5, [0.0, 0.0, 10.0, 10.0])];
    assert!(select_best(items.iter(), 2, 0.5).is_none());
  }

  #[test]
  fn low_confidence_is_no_detection() {
    let detector = FixedDetector::new(vec![item(2, 0.3, [100.0, 200.0, 700.0, 500.0])]);
    let adapter = DetectorAdapter::new(detector, &ValidationConfig::default()).unwrap();
    let err = adapter.locate(&RgbImage::new(1000, 600)).unwrap_err();
    assert!(matches!(err, ValidationError::NoObjectDetected { .. }));
  }

  #[test]
  fn box_is_clamped_to_image() {
    let detector = FixedDetector::new(vec![item(2, 0.9, [-5.2, 10.4, 1200.0, 599.5])]);
    let adapter = DetectorAdapter::new(detector, &ValidationConfig::default()).unwrap();
    let bbox = adapter.locate(&RgbImage::new(1000, 600)).unwrap();
    assert_eq!((bbox.left, bbox.top, bbox.right, bbox.bottom), (0, 10, 1000, 600));
    assert_eq!(bbox.label, "car");
  }

  #[test]
  fn degenerate_box_is_invalid_input() {
    let detector = FixedDetector::new(vec![item(2, 0.9, [1200.0, 0.0, 1300.0, 10.0])]);
    let adapter = DetectorAdapter::new(detector, &ValidationConfig::default()).unwrap();
    let err = adapter.locate(&RgbImage::new(1000, 600)).unwrap_err();
    assert!(matches!(err, ValidationError::InvalidInput(_)));
  }
}
