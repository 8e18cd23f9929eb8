// 该文件是 Carsight 项目的一部分。
// src/model/fixed.rs - 固定结果检测器（调试与测试用）
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
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DetectItem, DetectResult, Detector, class_id_of},
};

#[derive(Error, Debug)]
pub enum FixedDetectorError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("未知类别: {0}")]
  UnknownClass(String),
  #[error("参数 {0} 无效: {1}")]
  InvalidParam(&'static str, String),
}

/// 无论输入图像如何都返回同一组检测结果
#[derive(Debug, Clone, Default)]
pub struct FixedDetector {
  items: Vec<DetectItem>,
}

impl FixedDetector {
  pub fn new(items: Vec<DetectItem>) -> Self {
    Self { items }
  }

  pub fn empty() -> Self {
    Self::default()
  }
}

impl FromUrlWithScheme for FixedDetector {
  const SCHEME: &'static str = "fixed";
}

fn parse_bbox(value: &str) -> Result<[f32; 4], FixedDetectorError> {
  let parts = value
    .split(',')
    .map(|v| v.trim().parse::<f32>())
    .collect::<Result<Vec<_>, _>>()
    .map_err(|e| FixedDetectorError::InvalidParam("bbox", e.to_string()))?;
  match parts.as_slice() {
    &[l, t, r, b] => Ok([l, t, r, b]),
    _ => Err(FixedDetectorError::InvalidParam(
      "bbox",
      format!("需要 4 个坐标, 实际 {}", parts.len()),
    )),
  }
}

impl FromUrl for FixedDetector {
  type Error = FixedDetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(FixedDetectorError::SchemeMismatch);
    }

    let mut class_id = class_id_of("car").unwrap_or(2);
    let mut score = 1.0f32;
    let mut bbox = None;
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "class" => {
          class_id = class_id_of(&v).ok_or_else(|| FixedDetectorError::UnknownClass(v.to_string()))?
        }
        "score" => {
          score = v
            .parse()
            .map_err(|_| FixedDetectorError::InvalidParam("score", v.to_string()))?
        }
        "bbox" => bbox = Some(parse_bbox(&v)?),
        _ => {}
      }
    }

    let items = bbox
      .map(|bbox| {
        vec![DetectItem {
          class_id,
          score,
          bbox,
        }]
      })
      .unwrap_or_default();
    debug!("固定检测结果: {:?}", items);
    Ok(FixedDetector { items })
  }
}

impl Detector for FixedDetector {
  type Error = FixedDetectorError;

  fn name(&self) -> &str {
    "fixed"
  }

  fn detect(&self, _image: &RgbImage) -> Result<DetectResult, Self::Error> {
    Ok(DetectResult::from(self.items.clone()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_detection_from_query() {
    let url = Url::parse("fixed:?class=truck&score=0.75&bbox=10,20,110,70").unwrap();
    let detector = FixedDetector::from_url(&url).unwrap();
    let result = detector.detect(&RgbImage::new(200, 100)).unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.items[0].class_id, 7);
    assert_eq!(result.items[0].score, 0.75);
    assert_eq!(result.items[0].bbox, [10.0, 20.0, 110.0, 70.0]);
  }

  #[test]
  fn without_bbox_detects_nothing() {
    let url = Url::parse("fixed:").unwrap();
    let detector = FixedDetector::from_url(&url).unwrap();
    assert!(detector.detect(&RgbImage::new(8, 8)).unwrap().is_empty());
  }

  #[test]
  fn rejects_malformed_bbox() {
    let url = Url::parse("fixed:?bbox=1,2,3").unwrap();
    assert!(matches!(
      FixedDetector::from_url(&url),
      Err(FixedDetectorError::InvalidParam("bbox", _))
    ));
  }
}
