// 该文件是 Carsight 项目的一部分。
// src/pipeline.rs - 校验流水线
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

use chrono::{DateTime, Utc};
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::{
  config::{ConfigError, ValidationConfig},
  error::ValidationError,
  model::Detector,
  types::ValidationVerdict,
};

pub mod criteria;
pub mod detect;
pub mod features;
pub mod orientation;
pub mod segment;

use self::{
  criteria::{DecisionEngine, Evidence},
  detect::DetectorAdapter,
  features::FeatureExtractor,
  orientation::OrientationClassifier,
  segment::RegionSegmenter,
};

const PIPELINE_STAGES: &str = "grabcut-gmm + voting-orientation";

/// 检测 → 分割 → 特征 → 朝向 → 判定 的同步流水线
///
/// 除检测器外不持有任何跨调用的可变状态，可在多个线程间共享。
pub struct Validator<D> {
  adapter: DetectorAdapter<D>,
  segmenter: RegionSegmenter,
  extractor: FeatureExtractor,
  classifier: OrientationClassifier,
  engine: DecisionEngine,
  model_used: String,
}

impl<D: Detector> Validator<D> {
  pub fn new(detector: D, config: ValidationConfig) -> Result<Self, ConfigError> {
    config.validate()?;
    let model_used = format!("{} + {}", detector.name(), PIPELINE_STAGES);
    Ok(Self {
      adapter: DetectorAdapter::new(detector, &config)?,
      segmenter: RegionSegmenter::new(config.segmentation),
      extractor: FeatureExtractor::new(config.background_brightness_floor),
      classifier: OrientationClassifier::from_config(&config),
      engine: DecisionEngine::new(config),
      model_used,
    })
  }

  pub fn model_used(&self) -> &str {
    &self.model_used
  }

  /// 以当前时间作为结论时间戳
  ///
  /// 两次调用的 `created_at` 不同，比较结论时应使用 [`Validator::validate_at`]。
  pub fn validate(&self, image: &RgbImage) -> ValidationVerdict {
    self.validate_at(image, Utc::now())
  }

  /// 以给定时间戳生成结论；相同输入与配置总是得到相同结论
  pub fn validate_at(&self, image: &RgbImage, created_at: DateTime<Utc>) -> ValidationVerdict {
    let (width, height) = image.dimensions();
    info!("开始校验 {}x{} 图像", width, height);

    if width == 0 || height == 0 {
      let cause = ValidationError::invalid("图像尺寸为 0");
      warn!("{}", cause);
      return self
        .engine
        .decide(Evidence::NoDetection { cause: &cause }, &self.model_used, created_at);
    }

    let bbox = match self.adapter.locate(image) {
      Ok(bbox) => bbox,
      Err(cause) => {
        info!("{}, 跳过后续阶段", cause);
        return self
          .engine
          .decide(Evidence::NoDetection { cause: &cause }, &self.model_used, created_at);
      }
    };

    let region = self.segmenter.segment_or_box(image, &bbox);
    debug!("掩码类型: {:?}", region.kind());

    let features = match self.extractor.extract(image, &bbox, region.mask()) {
      Ok(features) => features,
      Err(cause) => {
        warn!("特征提取失败: {}", cause);
        return self.engine.decide(
          Evidence::InvalidFeatures {
            bbox: &bbox,
            cause: &cause,
          },
          &self.model_used,
          created_at,
        );
      }
    };
    let mask_kind = region.kind();
    drop(region);

    let orientation = self.classifier.classify(&features);

    self.engine.decide(
      Evidence::Complete {
        bbox: &bbox,
        mask_kind,
        features: &features,
        orientation: &orientation,
      },
      &self.model_used,
      created_at,
    )
  }
}
