// 该文件是 Carsight 项目的一部分。
// src/model/saliency.rs - 白底前景显著性检测器
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

use image::{GrayImage, Luma, RgbImage};
use imageproc::region_labelling::{Connectivity, connected_components};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DetectItem, DetectResult, Detector, class_id_of},
};

const SALIENCY_WHITE_CUTOFF: u8 = 240;
const SALIENCY_MIN_AREA: f32 = 0.005;
const SALIENCY_BASE_SCORE: f32 = 0.5;
const SALIENCY_SCORE_SPAN: f32 = 0.49;

#[derive(Error, Debug)]
pub enum SaliencyError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("未知类别: {0}")]
  UnknownClass(String),
  #[error("参数 {0} 无效: {1}")]
  InvalidParam(&'static str, String),
}

/// 面向白底商品图的类别无关检测器
///
/// 最小通道值低于 `white_cutoff` 的像素视为前景候选，取最大的 8 连通区域作为唯一检测结果，
/// 并以配置的类别上报。置信度由连通区域在其外接框中的填充率映射到 `[0.5, 1.0)`。
#[derive(Debug, Clone)]
pub struct SaliencyDetector {
  white_cutoff: u8,
  min_area: f32,
  class_id: u32,
}

impl Default for SaliencyDetector {
  fn default() -> Self {
    Self {
      white_cutoff: SALIENCY_WHITE_CUTOFF,
      min_area: SALIENCY_MIN_AREA,
      class_id: class_id_of("car").unwrap_or(2),
    }
  }
}

impl SaliencyDetector {
  pub fn white_cutoff(mut self, cutoff: u8) -> Self {
    self.white_cutoff = cutoff;
    self
  }

  pub fn min_area(mut self, fraction: f32) -> Self {
    self.min_area = fraction;
    self
  }

  fn candidates(&self, image: &RgbImage) -> GrayImage {
    let (width, height) = image.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
      let p = image.get_pixel(x, y);
      let min = p[0].min(p[1]).min(p[2]);
      if min < self.white_cutoff {
        Luma([255])
      } else {
        Luma([0])
      }
    })
  }
}

impl FromUrlWithScheme for SaliencyDetector {
  const SCHEME: &'static str = "saliency";
}

impl FromUrl for SaliencyDetector {
  type Error = SaliencyError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(SaliencyError::SchemeMismatch);
    }

    let mut detector = SaliencyDetector::default();
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "white" => {
          detector.white_cutoff = v
            .parse()
            .map_err(|_| SaliencyError::InvalidParam("white", v.to_string()))?
        }
        "min_area" => {
          detector.min_area = v
            .parse()
            .map_err(|_| SaliencyError::InvalidParam("min_area", v.to_string()))?
        }
        "class" => {
          detector.class_id =
            class_id_of(&v).ok_or_else(|| SaliencyError::UnknownClass(v.to_string()))?
        }
        _ => {}
      }
    }
    Ok(detector)
  }
}

impl Detector for SaliencyDetector {
  type Error = SaliencyError;

  fn name(&self) -> &str {
    "saliency"
  }

  fn detect(&self, image: &RgbImage) -> Result<DetectResult, Self::Error> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Ok(DetectResult::default());
    }

    let candidates = self.candidates(image);
    let labels = connected_components(&candidates, Connectivity::Eight, Luma([0u8]));

    // 每个标签: (像素数, min_x, min_y, max_x, max_y)
    let mut regions: Vec<(u64, u32, u32, u32, u32)> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
      let label = label[0] as usize;
      if label == 0 {
        continue;
      }
      if regions.len() < label {
        regions.resize(label, (0, u32::MAX, u32::MAX, 0, 0));
      }
      let region = &mut regions[label - 1];
      region.0 += 1;
      region.1 = region.1.min(x);
      region.2 = region.2.min(y);
      region.3 = region.3.max(x);
      region.4 = region.4.max(y);
    }

    // 并列时保留先出现的区域
    let best = regions
      .iter()
      .filter(|r| r.0 > 0)
      .fold(None::<&(u64, u32, u32, u32, u32)>, |best, r| match best {
        Some(b) if b.0 >= r.0 => Some(b),
        _ => Some(r),
      });

    let Some(&(count, min_x, min_y, max_x, max_y)) = best else {
      debug!("未找到前景候选区域");
      return Ok(DetectResult::default());
    };

    let total = width as u64 * height as u64;
    if (count as f32) < self.min_area * total as f32 {
      debug!(
        "最大前景区域过小: {} 像素 ({:.3}%)",
        count,
        count as f32 / total as f32 * 100.0
      );
      return Ok(DetectResult::default());
    }

    let box_area = (max_x - min_x + 1) as u64 * (max_y - min_y + 1) as u64;
    let fill = count as f32 / box_area as f32;
    let score = SALIENCY_BASE_SCORE + SALIENCY_SCORE_SPAN * fill.clamp(0.0, 1.0);
    debug!(
      "显著区域: ({}, {})-({}, {}), 像素 {}, 填充率 {:.3}",
      min_x, min_y, max_x, max_y, count, fill
    );

    Ok(DetectResult::from(vec![DetectItem {
      class_id: self.class_id,
      score,
      bbox: [
        min_x as f32,
        min_y as f32,
        (max_x + 1) as f32,
        (max_y + 1) as f32,
      ],
    }]))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  fn canvas(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([255, 255, 255]))
  }

  fn fill(image: &mut RgbImage, l: u32, t: u32, r: u32, b: u32) {
    for y in t..b {
      for x in l..r {
        image.put_pixel(x, y, Rgb([30, 30, 40]));
      }
    }
  }

  #[test]
  fn finds_largest_dark_region() {
    let mut image = canvas(200, 100);
    fill(&mut image, 20, 30, 150, 80);
    fill(&mut image, 170, 5, 180, 15);
    let result = SaliencyDetector::default().detect(&image).unwrap();
    assert_eq!(result.len(), 1);
    let item = &result.items[0];
    assert_eq!(item.bbox, [20.0, 30.0, 150.0, 80.0]);
    assert_eq!(item.class_id, 2);
    assert!(item.score > 0.98 && item.score < 1.0);
  }

  #[test]
  fn blank_canvas_has_no_detection() {
    let result = SaliencyDetector::default().detect(&canvas(64, 64)).unwrap();
    assert!(result.is_empty());
  }

  #[test]
  fn tiny_speck_is_ignored() {
    let mut image = canvas(100, 100);
    fill(&mut image, 10, 10, 12, 12);
    let result = SaliencyDetector::default().detect(&image).unwrap();
    assert!(result.is_empty());
  }

  #[test]
  fn parses_query_parameters() {
    let url = Url::parse("saliency:?white=200&min_area=0.1&class=truck").unwrap();
    let detector = SaliencyDetector::from_url(&url).unwrap();
    assert_eq!(detector.white_cutoff, 200);
    assert_eq!(detector.min_area, 0.1);
    assert_eq!(detector.class_id, 7);
  }
}
