// 该文件是 Carsight 项目的一部分。
// src/frame.rs - NHWC 模型输入帧定义
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

use image::{RgbImage, imageops::FilterType};

const RGB_CHANNELS: usize = 3;

/// 固定尺寸的 RGB NHWC 帧，源图像被直接拉伸到 `W x H`
#[derive(Debug, Clone)]
pub struct RgbNhwcFrame<const W: u32, const H: u32> {
  data: Box<[u8]>,
  source_width: u32,
  source_height: u32,
}

impl<const W: u32, const H: u32> From<&RgbImage> for RgbNhwcFrame<W, H> {
  fn from(image: &RgbImage) -> Self {
    let (source_width, source_height) = image.dimensions();
    let resized = if (source_width, source_height) == (W, H) {
      image.clone()
    } else {
      image::imageops::resize(image, W, H, FilterType::Triangle)
    };
    // RgbImage 的内存布局本身就是 HWC
    Self {
      data: resized.into_raw().into_boxed_slice(),
      source_width,
      source_height,
    }
  }
}

impl<const W: u32, const H: u32> RgbNhwcFrame<W, H> {
  pub fn height(&self) -> usize {
    H as usize
  }

  pub fn width(&self) -> usize {
    W as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn as_nhwc(&self) -> &[u8] {
    &self.data
  }

  /// 将归一化坐标 `[x_min, y_min, x_max, y_max]` 映射回源图像像素坐标
  pub fn to_source(&self, bbox: [f32; 4]) -> [f32; 4] {
    let sw = self.source_width as f32;
    let sh = self.source_height as f32;
    [bbox[0] * sw, bbox[1] * sh, bbox[2] * sw, bbox[3] * sh]
  }
}
