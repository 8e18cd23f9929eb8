// 该文件是 Carsight 项目的一部分。
// src/model.rs - 目标检测模型
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
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

pub fn class_id_of(name: &str) -> Option<u32> {
  COCO_CLASSES
    .iter()
    .position(|c| c.eq_ignore_ascii_case(name))
    .map(|i| i as u32)
}

pub fn label_of(class_id: u32) -> Option<&'static str> {
  COCO_CLASSES.get(class_id as usize).copied()
}

/// 外部检测器能力：给出整幅图像上的全部原始检测结果
///
/// 实现必须在推理期间保持只读；多个批处理线程会共享同一个检测器。
pub trait Detector: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn name(&self) -> &str;
  fn detect(&self, image: &RgbImage) -> Result<DetectResult, Self::Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，源图像像素坐标
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> impl Iterator<Item = &DetectItem> {
    self.items.iter()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

mod fixed;
mod saliency;
#[cfg(feature = "model_yolo26")]
mod yolo26;

pub use self::fixed::{FixedDetector, FixedDetectorError};
pub use self::saliency::{SaliencyDetector, SaliencyError};
#[cfg(feature = "model_yolo26")]
pub use self::yolo26::{Yolo26, Yolo26Builder, Yolo26Error};

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("显著性检测器错误: {0}")]
  SaliencyError(#[from] SaliencyError),
  #[error("固定检测器错误: {0}")]
  FixedDetectorError(#[from] FixedDetectorError),
  #[cfg(feature = "model_yolo26")]
  #[error("YOLO26 模型错误: {0}")]
  Yolo26Error(#[from] Yolo26Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 按 URL 方案选择的检测后端
pub enum DetectorWrapper {
  Saliency(SaliencyDetector),
  Fixed(FixedDetector),
  #[cfg(feature = "model_yolo26")]
  Yolo26(Yolo26),
}

impl FromUrl for DetectorWrapper {
  type Error = DetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      SaliencyDetector::SCHEME => Ok(DetectorWrapper::Saliency(SaliencyDetector::from_url(url)?)),
      FixedDetector::SCHEME => Ok(DetectorWrapper::Fixed(FixedDetector::from_url(url)?)),
      #[cfg(feature = "model_yolo26")]
      Yolo26Builder::SCHEME => {
        let model = Yolo26Builder::from_url(url)?.build()?;
        Ok(DetectorWrapper::Yolo26(model))
      }
      other => Err(DetectorError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Detector for DetectorWrapper {
  type Error = DetectorError;

  fn name(&self) -> &str {
    match self {
      DetectorWrapper::Saliency(d) => d.name(),
      DetectorWrapper::Fixed(d) => d.name(),
      #[cfg(feature = "model_yolo26")]
      DetectorWrapper::Yolo26(d) => d.name(),
    }
  }

  fn detect(&self, image: &RgbImage) -> Result<DetectResult, Self::Error> {
    match self {
      DetectorWrapper::Saliency(d) => d.detect(image).map_err(DetectorError::from),
      DetectorWrapper::Fixed(d) => d.detect(image).map_err(DetectorError::from),
      #[cfg(feature = "model_yolo26")]
      DetectorWrapper::Yolo26(d) => d.detect(image).map_err(DetectorError::from),
    }
  }
}
