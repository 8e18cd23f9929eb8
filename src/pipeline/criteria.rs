// 该文件是 Carsight 项目的一部分。
// src/pipeline/criteria.rs - 判据汇总与最终判定
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

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::{
  config::ValidationConfig,
  error::ValidationError,
  pipeline::features::quality_issues,
  types::{
    BoundingBox, Criterion, CriterionVerdict, Direction, FeatureSet, MaskKind, OrientationResult,
    ValidationVerdict, VerdictDetail,
  },
};

/// 判定引擎的输入：流水线走到了哪一步
#[derive(Debug, Clone, Copy)]
pub enum Evidence<'a> {
  /// 检测阶段失败，其余阶段全部跳过
  NoDetection { cause: &'a ValidationError },
  /// 有检测框，但特征提取失败
  InvalidFeatures {
    bbox: &'a BoundingBox,
    cause: &'a ValidationError,
  },
  Complete {
    bbox: &'a BoundingBox,
    mask_kind: MaskKind,
    features: &'a FeatureSet,
    orientation: &'a OrientationResult,
  },
}

fn percent(v: f32) -> f32 {
  v * 100.0
}

/// 纯函数式的判据评估，不重试、不保留状态
#[derive(Debug, Clone)]
pub struct DecisionEngine {
  config: ValidationConfig,
}

impl DecisionEngine {
  pub fn new(config: ValidationConfig) -> Self {
    Self { config }
  }

  pub fn size_floor(&self, mask_kind: MaskKind) -> f32 {
    match mask_kind {
      MaskKind::Segmented => self.config.size_floor_segmented,
      MaskKind::Box => self.config.size_floor_box,
    }
  }

  fn detection_reason(&self, cause: &ValidationError) -> (String, String) {
    match cause {
      ValidationError::NoObjectDetected { class, floor } => (
        format!(
          "No car detected: no detection of class '{}' above confidence {:.2}",
          class, floor
        ),
        "Not evaluated: no detection".to_string(),
      ),
      ValidationError::DetectionFailed(msg) => (
        format!("No car detected: detector failed ({})", msg),
        "Not evaluated: detector failed".to_string(),
      ),
      other => (
        format!("No car detected: invalid input ({})", other),
        "Not evaluated: invalid input".to_string(),
      ),
    }
  }

  fn proper_size(&self, features: &FeatureSet, mask_kind: MaskKind) -> CriterionVerdict {
    let floor = self.size_floor(mask_kind);
    if features.area_ratio >= floor {
      CriterionVerdict::pass(Some(features.area_ratio))
    } else {
      CriterionVerdict::fail(
        Some(features.area_ratio),
        format!(
          "Car occupies only {:.0}% of frame, minimum {:.0}% required",
          percent(features.area_ratio),
          percent(floor)
        ),
      )
    }
  }

  fn side_view(&self, features: &FeatureSet) -> CriterionVerdict {
    let floor = self.config.aspect_ratio_floor;
    let band = self.config.max_symmetry_magnitude;
    if features.aspect_ratio < floor {
      CriterionVerdict::fail(
        Some(features.aspect_ratio),
        format!(
          "Aspect ratio {:.2} is below the side-view minimum of {:.2}",
          features.aspect_ratio, floor
        ),
      )
    } else if features.edge_symmetry.abs() > band {
      CriterionVerdict::fail(
        Some(features.aspect_ratio),
        format!(
          "Edge symmetry {:.2} is outside the side-view band of ±{:.2}",
          features.edge_symmetry, band
        ),
      )
    } else {
      CriterionVerdict::pass(Some(features.aspect_ratio))
    }
  }

  fn white_background(&self, features: &FeatureSet) -> CriterionVerdict {
    let floor = self.config.whiteness_floor;
    if features.background_whiteness >= floor {
      CriterionVerdict::pass(Some(features.background_whiteness))
    } else {
      CriterionVerdict::fail(
        Some(features.background_whiteness),
        format!(
          "Only {:.0}% of background pixels are white, minimum {:.0}% required",
          percent(features.background_whiteness),
          percent(floor)
        ),
      )
    }
  }

  fn correct_orientation(&self, orientation: &OrientationResult) -> CriterionVerdict {
    let floor = self.config.orientation_confidence_floor;
    let confidence = Some(orientation.confidence);
    match orientation.direction {
      Direction::Left if orientation.confidence >= floor => CriterionVerdict::pass(confidence),
      Direction::Left => CriterionVerdict::fail(
        confidence,
        format!(
          "Car appears to face left but orientation confidence {:.2} is below {:.2}",
          orientation.confidence, floor
        ),
      ),
      Direction::Right => CriterionVerdict::fail(
        confidence,
        format!(
          "Car appears to face right (confidence {:.2})",
          orientation.confidence
        ),
      ),
      Direction::Unknown => CriterionVerdict::fail(
        confidence,
        format!(
          "Car orientation could not be determined (combined score {:.2})",
          orientation.combined_score
        ),
      ),
    }
  }

  pub fn decide(
    &self,
    evidence: Evidence<'_>,
    model_used: &str,
    created_at: DateTime<Utc>,
  ) -> ValidationVerdict {
    let mut criteria = BTreeMap::new();
    let mut detail = VerdictDetail::default();

    match evidence {
      Evidence::NoDetection { cause } => {
        let (primary, skipped) = self.detection_reason(cause);
        criteria.insert(Criterion::ContainsCar, CriterionVerdict::fail(None, primary));
        for criterion in &Criterion::ALL[1..] {
          criteria.insert(*criterion, CriterionVerdict::fail(None, skipped.clone()));
        }
      }
      Evidence::InvalidFeatures { bbox, cause } => {
        criteria.insert(
          Criterion::ContainsCar,
          CriterionVerdict::pass(Some(bbox.confidence)),
        );
        let reason = format!("Not evaluated: feature extraction failed ({})", cause);
        for criterion in &Criterion::ALL[1..] {
          criteria.insert(*criterion, CriterionVerdict::fail(None, reason.clone()));
        }
        detail.bounding_box = Some(*bbox);
      }
      Evidence::Complete {
        bbox,
        mask_kind,
        features,
        orientation,
      } => {
        criteria.insert(
          Criterion::ContainsCar,
          CriterionVerdict::pass(Some(bbox.confidence)),
        );
        criteria.insert(Criterion::ProperSize, self.proper_size(features, mask_kind));
        criteria.insert(Criterion::SideView, self.side_view(features));
        criteria.insert(Criterion::WhiteBackground, self.white_background(features));
        criteria.insert(
          Criterion::CorrectOrientation,
          self.correct_orientation(orientation),
        );

        let quality = match mask_kind {
          MaskKind::Segmented => features.quality_score,
          MaskKind::Box => features.quality_score * self.config.fallback_quality_penalty,
        };
        detail.confidence =
          Some(((bbox.confidence + orientation.confidence + quality) / 3.0).clamp(0.0, 1.0));
        detail.bounding_box = Some(*bbox);
        detail.mask_kind = Some(mask_kind);
        detail.quality_score = Some(quality);
        detail.quality_issues = quality_issues(features);
        detail.orientation = Some(orientation.clone());
      }
    }

    let verdict = ValidationVerdict::new(criteria, detail, model_used.to_string(), created_at);
    info!(
      "校验结论: {} ({} 项失败)",
      if verdict.passed() { "通过" } else { "未通过" },
      verdict.failure_reasons().len()
    );
    verdict
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn scenario_box() -> BoundingBox {
    BoundingBox::new(100, 200, 700, 500, 0.9, 2, "car", (1000, 600)).unwrap()
  }

  fn scenario_features() -> FeatureSet {
    FeatureSet {
      area_ratio: 0.30,
      aspect_ratio: 2.0,
      background_whiteness: 0.95,
      edge_symmetry: 0.4,
      quality_score: 0.8,
      center_ratio: 0.4,
      nose_density: 0.3,
      mean_luma: 210.0,
      luma_std: 60.0,
      noise_level: 3.0,
      image_width: 1000,
      image_height: 600,
    }
  }

  fn left(confidence: f32) -> OrientationResult {
    OrientationResult {
      direction: Direction::Left,
      confidence,
      combined_score: confidence,
      component_scores: BTreeMap::new(),
    }
  }

  fn engine() -> DecisionEngine {
    DecisionEngine::new(ValidationConfig::default())
  }

  fn decide(features: &FeatureSet, mask_kind: MaskKind, orientation: &OrientationResult) -> ValidationVerdict {
    let bbox = scenario_box();
    engine().decide(
      Evidence::Complete {
        bbox: &bbox,
        mask_kind,
        features,
        orientation,
      },
      "test",
      Utc::now(),
    )
  }

  #[test]
  fn scenario_all_criteria_pass() {
    let verdict = decide(&scenario_features(), MaskKind::Segmented, &left(0.7));
    assert!(verdict.passed());
    assert_eq!(verdict.criteria().len(), 5);
    assert!(verdict.criteria().values().all(|c| c.passed));
    assert!(verdict.failure_reasons().is_empty());
    assert!(verdict.confidence().is_some());
  }

  #[test]
  fn scenario_narrow_aspect_fails_side_view() {
    let features = FeatureSet {
      aspect_ratio: 1.2,
      ..scenario_features()
    };
    let verdict = decide(&features, MaskKind::Segmented, &left(0.7));
    assert!(!verdict.passed());
    let side = verdict.criterion(Criterion::SideView).unwrap();
    assert!(!side.passed);
    assert!(side.reason.as_deref().unwrap().contains("below the side-view minimum of 1.80"));
    assert_eq!(verdict.failure_reasons().len(), 1);
  }

  #[test]
  fn scenario_no_detection_fails_everything() {
    let cause = ValidationError::NoObjectDetected {
      class: "car".to_string(),
      floor: 0.5,
    };
    let verdict = engine().decide(Evidence::NoDetection { cause: &cause }, "test", Utc::now());
    assert!(!verdict.passed());
    assert_eq!(verdict.criteria().len(), 5);
    for criterion in Criterion::ALL {
      let c = verdict.criterion(criterion).unwrap();
      assert!(!c.passed);
      assert!(c.reason.as_deref().unwrap().contains("no detection"));
    }
    assert_eq!(verdict.failure_reasons().len(), 5);
    assert!(verdict.confidence().is_none());
  }

  #[test]
  fn box_fallback_uses_stricter_size_floor() {
    let features = FeatureSet {
      area_ratio: 0.22,
      ..scenario_features()
    };
    assert!(
      decide(&features, MaskKind::Segmented, &left(0.7))
        .criterion(Criterion::ProperSize)
        .unwrap()
        .passed
    );
    let verdict = decide(&features, MaskKind::Box, &left(0.7));
    let size = verdict.criterion(Criterion::ProperSize).unwrap();
    assert!(!size.passed);
    assert_eq!(
      size.reason.as_deref(),
      Some("Car occupies only 22% of frame, minimum 25% required")
    );
  }

  #[test]
  fn box_fallback_penalises_quality() {
    let segmented = decide(&scenario_features(), MaskKind::Segmented, &left(0.7));
    let boxed = decide(&scenario_features(), MaskKind::Box, &left(0.7));
    assert!(boxed.quality_score().unwrap() < segmented.quality_score().unwrap());
  }

  #[test]
  fn low_orientation_confidence_fails() {
    let verdict = decide(&scenario_features(), MaskKind::Segmented, &left(0.3));
    assert!(!verdict.criterion(Criterion::CorrectOrientation).unwrap().passed);
  }

  #[test]
  fn extreme_symmetry_fails_side_view() {
    let features = FeatureSet {
      edge_symmetry: -0.8,
      ..scenario_features()
    };
    let verdict = decide(&features, MaskKind::Segmented, &left(0.7));
    assert!(!verdict.criterion(Criterion::SideView).unwrap().passed);
  }

  #[test]
  fn invalid_features_keep_detection_but_fail_the_rest() {
    let bbox = scenario_box();
    let cause = ValidationError::invalid("掩码前景为空");
    let verdict = engine().decide(
      Evidence::InvalidFeatures {
        bbox: &bbox,
        cause: &cause,
      },
      "test",
      Utc::now(),
    );
    assert!(verdict.criterion(Criterion::ContainsCar).unwrap().passed);
    assert_eq!(verdict.failure_reasons().len(), 4);
    assert!(!verdict.passed());
  }
}
