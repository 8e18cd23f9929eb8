// 该文件是 Carsight 项目的一部分。
// src/pipeline/features.rs - 几何与光度特征提取
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
use imageproc::filter::laplacian_filter;
use tracing::debug;

use crate::{
  error::ValidationError,
  types::{BoundingBox, FeatureSet, Mask},
};

// 质量分权重：亮度、对比度、噪声
const QUALITY_WEIGHTS: [f32; 3] = [0.3, 0.4, 0.3];
const CONTRAST_SCALE: f32 = 64.0;
const NOISE_SCALE: f32 = 32.0;

// 质量提示阈值
const TOO_DARK: f32 = 50.0;
const TOO_BRIGHT: f32 = 240.0;
const LOW_CONTRAST: f32 = 20.0;
const LOW_RESOLUTION: u32 = 200;

/// 纯计算的特征提取，不做任何模型推理
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
  brightness_floor: u8,
}

/// 左右两部分前景密度的相对差，范围 [-1, 1]
fn relative_density(mask: &Mask, bbox: &BoundingBox, left_end: u32, right_start: u32) -> Option<f32> {
  let height = bbox.height() as u64;
  let left_area = (left_end - bbox.left) as u64 * height;
  let right_area = (bbox.right - right_start) as u64 * height;
  let density = |count: u64, area: u64| {
    if area == 0 {
      0.0
    } else {
      count as f32 / area as f32
    }
  };
  let left = density(mask.count_in(bbox.left, bbox.top, left_end, bbox.bottom), left_area);
  let right = density(
    mask.count_in(right_start, bbox.top, bbox.right, bbox.bottom),
    right_area,
  );
  let sum = left + right;
  if sum <= 0.0 {
    None
  } else {
    Some(((left - right) / sum).clamp(-1.0, 1.0))
  }
}

struct Photometry {
  mean_luma: f32,
  luma_std: f32,
  noise_level: f32,
}

fn photometry(image: &RgbImage) -> Photometry {
  let gray = image::imageops::grayscale(image);
  let n = (gray.width() as f64) * (gray.height() as f64);

  let (sum, sum_sq) = gray.pixels().fold((0.0f64, 0.0f64), |(s, sq), p| {
    let v = p[0] as f64;
    (s + v, sq + v * v)
  });
  let mean = sum / n;
  let variance = (sum_sq / n - mean * mean).max(0.0);

  let laplacian = laplacian_filter(&gray);
  let noise = laplacian
    .pixels()
    .map(|p| (p[0] as f64).abs())
    .sum::<f64>()
    / n;

  Photometry {
    mean_luma: mean as f32,
    luma_std: variance.sqrt() as f32,
    noise_level: noise as f32,
  }
}

fn quality_score(p: &Photometry) -> f32 {
  let brightness = (p.mean_luma / 255.0).clamp(0.0, 1.0);
  let contrast = (p.luma_std / CONTRAST_SCALE).clamp(0.0, 1.0);
  let clean = (1.0 - p.noise_level / NOISE_SCALE).clamp(0.0, 1.0);
  let [wb, wc, wn] = QUALITY_WEIGHTS;
  (wb * brightness + wc * contrast + wn * clean).clamp(0.0, 1.0)
}

/// 与判定无关的图像质量提示
pub fn quality_issues(features: &FeatureSet) -> Vec<String> {
  let mut issues = Vec::new();
  if features.image_width < LOW_RESOLUTION || features.image_height < LOW_RESOLUTION {
    issues.push("Low resolution".to_string());
  }
  if features.mean_luma < TOO_DARK {
    issues.push("Too dark".to_string());
  } else if features.mean_luma > TOO_BRIGHT {
    issues.push("Too bright/overexposed".to_string());
  }
  if features.luma_std < LOW_CONTRAST {
    issues.push("Low contrast".to_string());
  }
  issues
}

impl FeatureExtractor {
  pub fn new(brightness_floor: u8) -> Self {
    Self { brightness_floor }
  }

  pub fn extract(
    &self,
    image: &RgbImage,
    bbox: &BoundingBox,
    mask: &Mask,
  ) -> Result<FeatureSet, ValidationError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Err(ValidationError::invalid("图像为空"));
    }
    if mask.dimensions() != (width, height) {
      return Err(ValidationError::invalid(format!(
        "掩码尺寸 {}x{} 与图像尺寸 {}x{} 不一致",
        mask.width(),
        mask.height(),
        width,
        height
      )));
    }
    if !bbox.fits_in(width, height) {
      return Err(ValidationError::invalid("边界框超出图像范围"));
    }

    let foreground = mask.foreground_count();
    if foreground == 0 {
      return Err(ValidationError::invalid("掩码前景为空"));
    }
    let total = width as u64 * height as u64;
    let area_ratio = (foreground as f32 / total as f32).clamp(0.0, 1.0);

    let mid = bbox.left + bbox.width() / 2;
    let edge_symmetry = relative_density(mask, bbox, mid, mid)
      .ok_or_else(|| ValidationError::invalid("边界框内没有前景像素"))?;

    let third = bbox.width() / 3;
    let nose_density = if third == 0 {
      0.0
    } else {
      relative_density(mask, bbox, bbox.left + third, bbox.right - third).unwrap_or(0.0)
    };

    // 只统计框外的背景像素，避免把车身阴影算进去
    let mut background = 0u64;
    let mut white = 0u64;
    for (x, y, p) in image.enumerate_pixels() {
      if bbox.contains(x, y) || mask.is_foreground(x, y) {
        continue;
      }
      background += 1;
      if p[0].min(p[1]).min(p[2]) > self.brightness_floor {
        white += 1;
      }
    }
    let background_whiteness = if background == 0 {
      debug!("没有可用的背景像素");
      0.0
    } else {
      white as f32 / background as f32
    };

    let photometry = photometry(image);
    let features = FeatureSet {
      area_ratio,
      aspect_ratio: bbox.aspect_ratio(),
      background_whiteness,
      edge_symmetry,
      quality_score: quality_score(&photometry),
      center_ratio: bbox.center_x() / width as f32,
      nose_density,
      mean_luma: photometry.mean_luma,
      luma_std: photometry.luma_std,
      noise_level: photometry.noise_level,
      image_width: width,
      image_height: height,
    };
    debug!("特征: {:?}", features);
    Ok(features)
  }
}
