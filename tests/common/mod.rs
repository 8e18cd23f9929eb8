// 该文件是 Carsight 项目的一部分。
// tests/common/mod.rs - 集成测试用的合成图像
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

#![allow(dead_code)]

use carsight::{
  ValidationConfig, Validator,
  model::{DetectItem, FixedDetector},
};
use image::{Rgb, RgbImage};

pub const WIDTH: u32 = 400;
pub const HEIGHT: u32 = 200;
pub const CAR_CLASS: u32 = 2;

pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub const BODY: Rgb<u8> = Rgb([30, 30, 45]);

/// 白色背景上的车身剪影
///
/// 左半部分占满整个高度，右半部分只占下方三分之一，
/// 车头（质量更大的一侧）朝左。
pub struct Scene {
  pub image: RgbImage,
  pub bbox: [u32; 4],
}

pub fn left_facing_car() -> Scene {
  let (left, top, mid, right, bottom) = (60, 40, 200, 340, 160);
  let mut image = RgbImage::from_pixel(WIDTH, HEIGHT, WHITE);
  for y in top..bottom {
    for x in left..mid {
      image.put_pixel(x, y, BODY);
    }
  }
  for y in 120..bottom {
    for x in mid..right {
      image.put_pixel(x, y, BODY);
    }
  }
  Scene {
    image,
    bbox: [left, top, right, bottom],
  }
}

/// 水平翻转后车头朝右
pub fn right_facing_car() -> Scene {
  let scene = left_facing_car();
  let [l, t, r, b] = scene.bbox;
  Scene {
    image: image::imageops::flip_horizontal(&scene.image),
    bbox: [WIDTH - r, t, WIDTH - l, b],
  }
}

/// 把背景换成灰色
pub fn on_grey_backdrop(scene: Scene) -> Scene {
  let mut image = scene.image;
  for p in image.pixels_mut() {
    if *p == WHITE {
      *p = Rgb([128, 128, 128]);
    }
  }
  Scene { image, ..scene }
}

pub fn detection(bbox: [u32; 4], score: f32) -> DetectItem {
  DetectItem {
    class_id: CAR_CLASS,
    score,
    bbox: bbox.map(|v| v as f32),
  }
}

pub fn validator_with(items: Vec<DetectItem>) -> Validator<FixedDetector> {
  Validator::new(FixedDetector::new(items), ValidationConfig::default()).unwrap()
}
