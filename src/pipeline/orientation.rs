// 该文件是 Carsight 项目的一部分。
// src/pipeline/orientation.rs - 多投票者朝向分类
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

use tracing::debug;

use crate::{
  config::ValidationConfig,
  types::{Direction, FeatureSet, OrientationResult},
};

pub const ASPECT_VOTER: &str = "aspect";
pub const POSITION_VOTER: &str = "position";
pub const DENSITY_VOTER: &str = "density";

/// 投票函数可读取的参数
#[derive(Debug, Clone, Copy)]
pub struct VoterParams {
  pub position_band: (f32, f32),
}

/// 返回 [-1, 1] 内的带符号投票，正值表示朝左
pub type ScoreFn = fn(&FeatureSet, &VoterParams) -> f32;

#[derive(Debug, Clone, Copy)]
pub struct Voter {
  pub name: &'static str,
  pub score: ScoreFn,
  pub weight: f32,
}

pub fn aspect_vote(features: &FeatureSet, _: &VoterParams) -> f32 {
  features.edge_symmetry.clamp(-1.0, 1.0)
}

/// 中心落在区间内时投 [0.5, 1]，越靠区间中点越高；区间外线性衰减到 0
pub fn position_vote(features: &FeatureSet, params: &VoterParams) -> f32 {
  let (low, high) = params.position_band;
  let half = (high - low) / 2.0;
  if half <= 0.0 {
    return 0.0;
  }
  let mid = low + half;
  let p = features.center_ratio;
  if (low..=high).contains(&p) {
    1.0 - 0.5 * ((p - mid).abs() / half)
  } else {
    let outside = if p < low { low - p } else { p - high };
    (0.5 * (1.0 - outside / half)).max(0.0)
  }
}

pub fn density_vote(features: &FeatureSet, _: &VoterParams) -> f32 {
  features.nose_density.clamp(-1.0, 1.0)
}

#[derive(Debug, Clone)]
pub struct OrientationClassifier {
  voters: Vec<Voter>,
  params: VoterParams,
  threshold: f32,
}

impl OrientationClassifier {
  pub fn new(voters: Vec<Voter>, params: VoterParams, threshold: f32) -> Self {
    Self {
      voters,
      params,
      threshold,
    }
  }

  pub fn from_config(config: &ValidationConfig) -> Self {
    let weights = &config.voter_weights;
    let voters = vec![
      Voter {
        name: ASPECT_VOTER,
        score: aspect_vote,
        weight: weights.aspect,
      },
      Voter {
        name: POSITION_VOTER,
        score: position_vote,
        weight: weights.position,
      },
      Voter {
        name: DENSITY_VOTER,
        score: density_vote,
        weight: weights.density,
      },
    ];
    Self::new(
      voters,
      VoterParams {
        position_band: config.position_band,
      },
      config.orientation_threshold,
    )
  }

  pub fn voters(&self) -> &[Voter] {
    &self.voters
  }

  pub fn classify(&self, features: &FeatureSet) -> OrientationResult {
    let mut component_scores = BTreeMap::new();
    let mut combined = 0.0f32;
    for voter in &self.voters {
      let vote = (voter.score)(features, &self.params).clamp(-1.0, 1.0);
      component_scores.insert(voter.name, vote);
      combined += voter.weight * vote;
    }
    let combined = combined.clamp(-1.0, 1.0);

    let direction = if combined > self.threshold {
      Direction::Left
    } else if combined < -self.threshold {
      Direction::Right
    } else {
      Direction::Unknown
    };

    debug!(
      "朝向投票: {:?}, 综合得分 {:.3} -> {:?}",
      component_scores, combined, direction
    );

    OrientationResult {
      direction,
      confidence: combined.abs().clamp(0.0, 1.0),
      combined_score: combined,
      component_scores,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn features(edge_symmetry: f32, center_ratio: f32, nose_density: f32) -> FeatureSet {
    FeatureSet {
      area_ratio: 0.3,
      aspect_ratio: 2.0,
      background_whiteness: 0.95,
      edge_symmetry,
      quality_score: 0.8,
      center_ratio,
      nose_density,
      mean_luma: 200.0,
      luma_std: 50.0,
      noise_level: 4.0,
      image_width: 1000,
      image_height: 600,
    }
  }

  fn classifier() -> OrientationClassifier {
    OrientationClassifier::from_config(&ValidationConfig::default())
  }

  #[test]
  fn default_weights_sum_to_one() {
    let sum: f32 = classifier().voters().iter().map(|v| v.weight).sum();
    assert!((sum - 1.0).abs() < 1e-6);
  }

  #[test]
  fn position_vote_peaks_mid_band_and_decays_outside() {
    let params = VoterParams {
      position_band: (0.3, 0.8),
    };
    assert!((position_vote(&features(0.0, 0.55, 0.0), &params) - 1.0).abs() < 1e-6);
    assert!((position_vote(&features(0.0, 0.3, 0.0), &params) - 0.5).abs() < 1e-6);
    assert!(position_vote(&features(0.0, 0.2, 0.0), &params) < 0.5);
    assert_eq!(position_vote(&features(0.0, 0.0, 0.0), &params), 0.0);
  }

  #[test]
  fn strong_left_signals_classify_left() {
    let result = classifier().classify(&features(0.6, 0.5, 0.6));
    assert_eq!(result.direction, Direction::Left);
    assert!(result.confidence > 0.5);
    assert_eq!(result.component_scores.len(), 3);
  }

  #[test]
  fn right_heavy_signals_classify_right() {
    let result = classifier().classify(&features(-0.9, 0.05, -0.9));
    assert_eq!(result.direction, Direction::Right);
  }

  #[test]
  fn weak_signals_are_unknown() {
    let result = classifier().classify(&features(-0.3, 0.55, -0.5));
    assert_eq!(result.direction, Direction::Unknown);
  }

  #[test]
  fn combined_score_is_monotone_in_edge_symmetry() {
    let c = classifier();
    let mut previous = f32::NEG_INFINITY;
    for step in 0..=20 {
      let symmetry = -1.0 + step as f32 * 0.1;
      let result = c.classify(&features(symmetry, 0.4, 0.1));
      assert!(result.combined_score >= previous);
      assert!((0.0..=1.0).contains(&result.confidence));
      previous = result.combined_score;
    }
  }
}
