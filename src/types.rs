// 该文件是 Carsight 项目的一部分。
// src/types.rs - 流水线数据模型
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
use image::{GrayImage, Luma};
use serde::Serialize;

use crate::error::ValidationError;

const MASK_FOREGROUND: u8 = 255;
const MASK_BACKGROUND: u8 = 0;

/// 图像坐标系下的边界框，右、下边界为开区间
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
  pub left: u32,
  pub top: u32,
  pub right: u32,
  pub bottom: u32,
  pub confidence: f32,
  pub class_id: u32,
  pub label: &'static str,
}

impl BoundingBox {
  /// 创建边界框并检查其落在 `width x height` 图像内
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    left: u32,
    top: u32,
    right: u32,
    bottom: u32,
    confidence: f32,
    class_id: u32,
    label: &'static str,
    (width, height): (u32, u32),
  ) -> Result<Self, ValidationError> {
    if left >= right || top >= bottom {
      return Err(ValidationError::invalid(format!(
        "边界框退化: ({}, {})-({}, {})",
        left, top, right, bottom
      )));
    }
    if right > width || bottom > height {
      return Err(ValidationError::invalid(format!(
        "边界框 ({}, {})-({}, {}) 超出图像 {}x{}",
        left, top, right, bottom, width, height
      )));
    }
    if !(0.0..=1.0).contains(&confidence) {
      return Err(ValidationError::invalid(format!(
        "置信度超出范围: {}",
        confidence
      )));
    }
    Ok(Self {
      left,
      top,
      right,
      bottom,
      confidence,
      class_id,
      label,
    })
  }

  pub fn width(&self) -> u32 {
    self.right - self.left
  }

  pub fn height(&self) -> u32 {
    self.bottom - self.top
  }

  pub fn area(&self) -> u64 {
    self.width() as u64 * self.height() as u64
  }

  pub fn aspect_ratio(&self) -> f32 {
    self.width() as f32 / self.height() as f32
  }

  pub fn center_x(&self) -> f32 {
    (self.left + self.right) as f32 / 2.0
  }

  pub fn contains(&self, x: u32, y: u32) -> bool {
    x >= self.left && x < self.right && y >= self.top && y < self.bottom
  }

  pub fn fits_in(&self, width: u32, height: u32) -> bool {
    self.left < self.right && self.top < self.bottom && self.right <= width && self.bottom <= height
  }

  /// 按比例外扩后的区域 `(left, top, right, bottom)`，截断在图像范围内
  pub fn expanded(&self, fraction: f32, min_pixels: u32, (width, height): (u32, u32)) -> [u32; 4] {
    let dx = ((self.width() as f32 * fraction).round() as u32).max(min_pixels);
    let dy = ((self.height() as f32 * fraction).round() as u32).max(min_pixels);
    [
      self.left.saturating_sub(dx),
      self.top.saturating_sub(dy),
      (self.right + dx).min(width),
      (self.bottom + dy).min(height),
    ]
  }
}

/// 与图像同尺寸的二值前景掩码
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
  inner: GrayImage,
}

impl Mask {
  pub fn empty(width: u32, height: u32) -> Self {
    Self {
      inner: GrayImage::from_pixel(width, height, Luma([MASK_BACKGROUND])),
    }
  }

  /// 以边界框矩形本身作为掩码
  pub fn from_box(bbox: &BoundingBox, width: u32, height: u32) -> Self {
    let mut mask = Self::empty(width, height);
    for y in bbox.top..bbox.bottom.min(height) {
      for x in bbox.left..bbox.right.min(width) {
        mask.set(x, y, true);
      }
    }
    mask
  }

  /// 非零像素视为前景
  pub fn from_gray(image: GrayImage) -> Self {
    let mut inner = image;
    for pixel in inner.pixels_mut() {
      pixel[0] = if pixel[0] > 0 {
        MASK_FOREGROUND
      } else {
        MASK_BACKGROUND
      };
    }
    Self { inner }
  }

  pub fn width(&self) -> u32 {
    self.inner.width()
  }

  pub fn height(&self) -> u32 {
    self.inner.height()
  }

  pub fn dimensions(&self) -> (u32, u32) {
    self.inner.dimensions()
  }

  pub fn is_foreground(&self, x: u32, y: u32) -> bool {
    self.inner.get_pixel(x, y)[0] == MASK_FOREGROUND
  }

  pub fn set(&mut self, x: u32, y: u32, foreground: bool) {
    let value = if foreground {
      MASK_FOREGROUND
    } else {
      MASK_BACKGROUND
    };
    self.inner.put_pixel(x, y, Luma([value]));
  }

  pub fn foreground_count(&self) -> u64 {
    self
      .inner
      .pixels()
      .filter(|p| p[0] == MASK_FOREGROUND)
      .count() as u64
  }

  /// 统计矩形 `[left, right) x [top, bottom)` 内的前景像素数
  pub fn count_in(&self, left: u32, top: u32, right: u32, bottom: u32) -> u64 {
    let mut count = 0;
    for y in top..bottom.min(self.height()) {
      for x in left..right.min(self.width()) {
        if self.is_foreground(x, y) {
          count += 1;
        }
      }
    }
    count
  }

  pub fn as_gray(&self) -> &GrayImage {
    &self.inner
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskKind {
  Segmented,
  Box,
}

/// 分割结果：像素级分割掩码，或分割失败时退化的边界框掩码
#[derive(Debug, Clone, PartialEq)]
pub enum RegionMask {
  Segmented(Mask),
  Box(Mask),
}

impl RegionMask {
  pub fn mask(&self) -> &Mask {
    match self {
      RegionMask::Segmented(mask) | RegionMask::Box(mask) => mask,
    }
  }

  pub fn kind(&self) -> MaskKind {
    match self {
      RegionMask::Segmented(_) => MaskKind::Segmented,
      RegionMask::Box(_) => MaskKind::Box,
    }
  }
}

/// 一次校验所提取的全部标量特征
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureSet {
  pub area_ratio: f32,
  pub aspect_ratio: f32,
  pub background_whiteness: f32,
  pub edge_symmetry: f32,
  pub quality_score: f32,
  /// 边界框中心横坐标 / 图像宽度
  pub center_ratio: f32,
  /// 前三分之一与后三分之一的前景密度差，符号约定同 `edge_symmetry`
  pub nose_density: f32,
  pub mean_luma: f32,
  pub luma_std: f32,
  pub noise_level: f32,
  pub image_width: u32,
  pub image_height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
  Left,
  Right,
  Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrientationResult {
  pub direction: Direction,
  pub confidence: f32,
  /// 加权后的带符号得分，正值偏向朝左
  pub combined_score: f32,
  pub component_scores: BTreeMap<&'static str, f32>,
}

/// 五项判据，声明顺序即评估顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
  ContainsCar,
  ProperSize,
  SideView,
  WhiteBackground,
  CorrectOrientation,
}

impl Criterion {
  pub const ALL: [Criterion; 5] = [
    Criterion::ContainsCar,
    Criterion::ProperSize,
    Criterion::SideView,
    Criterion::WhiteBackground,
    Criterion::CorrectOrientation,
  ];

  pub fn name(&self) -> &'static str {
    match self {
      Criterion::ContainsCar => "contains_car",
      Criterion::ProperSize => "proper_size",
      Criterion::SideView => "side_view",
      Criterion::WhiteBackground => "white_background",
      Criterion::CorrectOrientation => "correct_orientation",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriterionVerdict {
  pub passed: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub score: Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reason: Option<String>,
}

impl CriterionVerdict {
  pub fn pass(score: Option<f32>) -> Self {
    Self {
      passed: true,
      score,
      reason: None,
    }
  }

  pub fn fail(score: Option<f32>, reason: impl Into<String>) -> Self {
    Self {
      passed: false,
      score,
      reason: Some(reason.into()),
    }
  }
}

/// 单张图像的最终校验结论，构造后不可修改
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationVerdict {
  passed: bool,
  criteria: BTreeMap<Criterion, CriterionVerdict>,
  confidence: Option<f32>,
  failure_reasons: Vec<String>,
  model_used: String,
  created_at: DateTime<Utc>,
  bounding_box: Option<BoundingBox>,
  mask_kind: Option<MaskKind>,
  quality_score: Option<f32>,
  quality_issues: Vec<String>,
  orientation: Option<OrientationResult>,
}

/// 结论中除判据外的附加诊断信息
#[derive(Debug, Clone, Default)]
pub(crate) struct VerdictDetail {
  pub confidence: Option<f32>,
  pub bounding_box: Option<BoundingBox>,
  pub mask_kind: Option<MaskKind>,
  pub quality_score: Option<f32>,
  pub quality_issues: Vec<String>,
  pub orientation: Option<OrientationResult>,
}

impl ValidationVerdict {
  pub(crate) fn new(
    criteria: BTreeMap<Criterion, CriterionVerdict>,
    detail: VerdictDetail,
    model_used: String,
    created_at: DateTime<Utc>,
  ) -> Self {
    let passed = Criterion::ALL
      .iter()
      .all(|c| criteria.get(c).map(|v| v.passed).unwrap_or(false));
    let failure_reasons = criteria
      .values()
      .filter(|v| !v.passed)
      .filter_map(|v| v.reason.clone())
      .collect();
    Self {
      passed,
      criteria,
      confidence: detail.confidence,
      failure_reasons,
      model_used,
      created_at,
      bounding_box: detail.bounding_box,
      mask_kind: detail.mask_kind,
      quality_score: detail.quality_score,
      quality_issues: detail.quality_issues,
      orientation: detail.orientation,
    }
  }

  pub fn passed(&self) -> bool {
    self.passed
  }

  pub fn criteria(&self) -> &BTreeMap<Criterion, CriterionVerdict> {
    &self.criteria
  }

  pub fn criterion(&self, criterion: Criterion) -> Option<&CriterionVerdict> {
    self.criteria.get(&criterion)
  }

  pub fn confidence(&self) -> Option<f32> {
    self.confidence
  }

  pub fn failure_reasons(&self) -> &[String] {
    &self.failure_reasons
  }

  pub fn model_used(&self) -> &str {
    &self.model_used
  }

  pub fn created_at(&self) -> DateTime<Utc> {
    self.created_at
  }

  pub fn bounding_box(&self) -> Option<&BoundingBox> {
    self.bounding_box.as_ref()
  }

  pub fn mask_kind(&self) -> Option<MaskKind> {
    self.mask_kind
  }

  pub fn quality_score(&self) -> Option<f32> {
    self.quality_score
  }

  pub fn quality_issues(&self) -> &[String] {
    &self.quality_issues
  }

  pub fn orientation(&self) -> Option<&OrientationResult> {
    self.orientation.as_ref()
  }
}
