// 该文件是 Carsight 项目的一部分。
// src/pipeline/segment.rs - 基于边界框的迭代前景分割
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

//! 区域分割
//!
//! 以边界框为种子：框内视为可能前景，外扩边带视为可能背景。每轮迭代先用当前标记
//! 分别拟合前景/背景的高斯混合颜色模型，再以负对数似然为数据项、对比度敏感的 Potts
//! 模型为平滑项，用 ICM 重新标记像素。全过程无随机性。

use image::{GrayImage, Luma, RgbImage};
use imageproc::{
  distance_transform::Norm,
  morphology::close,
  region_labelling::{Connectivity, connected_components},
};
use tracing::{debug, warn};

use crate::{
  config::SegmentationConfig,
  error::ValidationError,
  types::{BoundingBox, Mask, RegionMask},
};

const MIN_MARGIN_PIXELS: u32 = 2;
const ICM_SWEEPS: usize = 2;
const KMEANS_ITERATIONS: usize = 5;
const MAX_MODEL_SAMPLES: usize = 20_000;
const VARIANCE_FLOOR: f32 = 4.0;
const CLOSE_RADIUS: u8 = 2;
const LN_2PI: f32 = 1.837_877;

type Color = [f32; 3];

fn distance2(a: &Color, b: &Color) -> f32 {
  (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

fn luma(c: &Color) -> f32 {
  0.299 * c[0] + 0.587 * c[1] + 0.114 * c[2]
}

#[derive(Debug, Clone)]
struct Gaussian {
  mean: Color,
  var: Color,
  // ln(weight) - 0.5 * sum(ln(2π var))
  log_norm: f32,
}

impl Gaussian {
  fn log_density(&self, c: &Color) -> f32 {
    let mut q = 0.0;
    for i in 0..3 {
      q += (c[i] - self.mean[i]).powi(2) / self.var[i];
    }
    self.log_norm - 0.5 * q
  }
}

/// 对角协方差高斯混合颜色模型
#[derive(Debug, Clone)]
struct ColorModel {
  components: Vec<Gaussian>,
}

impl ColorModel {
  fn fit(samples: &[Color], k: usize) -> Option<Self> {
    if samples.is_empty() {
      return None;
    }

    let stride = samples.len().div_ceil(MAX_MODEL_SAMPLES);
    let mut points: Vec<Color> = samples.iter().step_by(stride).copied().collect();
    // 按亮度排序后等距取种子，保证初始化确定
    points.sort_by(|a, b| luma(a).total_cmp(&luma(b)));
    let k = k.min(points.len());
    let mut centers: Vec<Color> = (0..k)
      .map(|j| points[(2 * j + 1) * points.len() / (2 * k)])
      .collect();

    let mut assignment = vec![0usize; points.len()];
    for round in 0..=KMEANS_ITERATIONS {
      for (p, slot) in points.iter().zip(assignment.iter_mut()) {
        *slot = nearest(&centers, p);
      }
      if round == KMEANS_ITERATIONS {
        break;
      }
      let mut sums = vec![[0.0f32; 3]; k];
      let mut counts = vec![0usize; k];
      for (p, &a) in points.iter().zip(assignment.iter()) {
        for i in 0..3 {
          sums[a][i] += p[i];
        }
        counts[a] += 1;
      }
      for j in 0..k {
        if counts[j] > 0 {
          let n = counts[j] as f32;
          centers[j] = [sums[j][0] / n, sums[j][1] / n, sums[j][2] / n];
        }
      }
    }

    let total = points.len() as f32;
    let mut components = Vec::with_capacity(k);
    for j in 0..k {
      let members: Vec<&Color> = points
        .iter()
        .zip(assignment.iter())
        .filter(|(_, a)| **a == j)
        .map(|(p, _)| p)
        .collect();
      if members.is_empty() {
        continue;
      }
      let n = members.len() as f32;
      let mut mean = [0.0f32; 3];
      for p in &members {
        for i in 0..3 {
          mean[i] += p[i] / n;
        }
      }
      let mut var = [0.0f32; 3];
      for p in &members {
        for i in 0..3 {
          var[i] += (p[i] - mean[i]).powi(2) / n;
        }
      }
      let var = var.map(|v| v.max(VARIANCE_FLOOR));
      let weight = n / total;
      let log_norm = weight.ln() - 0.5 * var.iter().map(|v| LN_2PI + v.ln()).sum::<f32>();
      components.push(Gaussian {
        mean,
        var,
        log_norm,
      });
    }

    Some(ColorModel { components })
  }

  fn neg_log_likelihood(&self, c: &Color) -> f32 {
    let max = self
      .components
      .iter()
      .map(|g| g.log_density(c))
      .fold(f32::NEG_INFINITY, f32::max);
    let sum: f32 = self
      .components
      .iter()
      .map(|g| (g.log_density(c) - max).exp())
      .sum();
    -(max + sum.ln())
  }
}

fn nearest(centers: &[Color], p: &Color) -> usize {
  let mut best = 0;
  let mut best_d = f32::INFINITY;
  for (j, c) in centers.iter().enumerate() {
    let d = distance2(c, p);
    if d < best_d {
      best_d = d;
      best = j;
    }
  }
  best
}

/// 工作区域内的像素网格
struct Region {
  x0: u32,
  y0: u32,
  width: usize,
  height: usize,
  colors: Vec<Color>,
  // 向右、向下邻居的平滑权重
  right: Vec<f32>,
  down: Vec<f32>,
}

impl Region {
  fn new(image: &RgbImage, [x0, y0, x1, y1]: [u32; 4]) -> Self {
    let width = (x1 - x0) as usize;
    let height = (y1 - y0) as usize;
    let mut colors = Vec::with_capacity(width * height);
    for y in y0..y1 {
      for x in x0..x1 {
        let p = image.get_pixel(x, y);
        colors.push([p[0] as f32, p[1] as f32, p[2] as f32]);
      }
    }

    let mut right = vec![0.0f32; width * height];
    let mut down = vec![0.0f32; width * height];
    let mut total = 0.0f64;
    let mut pairs = 0u64;
    for y in 0..height {
      for x in 0..width {
        let i = y * width + x;
        if x + 1 < width {
          right[i] = distance2(&colors[i], &colors[i + 1]);
          total += right[i] as f64;
          pairs += 1;
        }
        if y + 1 < height {
          down[i] = distance2(&colors[i], &colors[i + width]);
          total += down[i] as f64;
          pairs += 1;
        }
      }
    }
    let mean = if pairs > 0 { total / pairs as f64 } else { 0.0 };
    let beta = if mean > 0.0 { (1.0 / (2.0 * mean)) as f32 } else { 0.0 };
    for y in 0..height {
      for x in 0..width {
        let i = y * width + x;
        right[i] = if x + 1 < width { (-beta * right[i]).exp() } else { 0.0 };
        down[i] = if y + 1 < height { (-beta * down[i]).exp() } else { 0.0 };
      }
    }

    Self {
      x0,
      y0,
      width,
      height,
      colors,
      right,
      down,
    }
  }

  fn len(&self) -> usize {
    self.colors.len()
  }

  fn samples(&self, labels: &[bool], foreground: bool) -> Vec<Color> {
    self
      .colors
      .iter()
      .zip(labels)
      .filter(|(_, l)| **l == foreground)
      .map(|(c, _)| *c)
      .collect()
  }

  /// 一次光栅顺序的 ICM 扫描，原地更新标记
  fn icm_sweep(&self, labels: &mut [bool], cost_fg: &[f32], cost_bg: &[f32], lambda: f32) {
    let w = self.width;
    for y in 0..self.height {
      for x in 0..w {
        let i = y * w + x;
        let mut neighbours: [(usize, f32); 4] = [(0, 0.0); 4];
        let mut n = 0;
        if x > 0 {
          neighbours[n] = (i - 1, self.right[i - 1]);
          n += 1;
        }
        if x + 1 < w {
          neighbours[n] = (i + 1, self.right[i]);
          n += 1;
        }
        if y > 0 {
          neighbours[n] = (i - w, self.down[i - w]);
          n += 1;
        }
        if y + 1 < self.height {
          neighbours[n] = (i + w, self.down[i]);
          n += 1;
        }

        let mut fg = cost_fg[i];
        let mut bg = cost_bg[i];
        for &(j, weight) in &neighbours[..n] {
          if labels[j] {
            bg += lambda * weight;
          } else {
            fg += lambda * weight;
          }
        }
        labels[i] = fg < bg;
      }
    }
  }
}

/// 将边界框细化为像素级前景掩码
#[derive(Debug, Clone)]
pub struct RegionSegmenter {
  config: SegmentationConfig,
}

impl RegionSegmenter {
  pub fn new(config: SegmentationConfig) -> Self {
    Self { config }
  }

  fn minimum_foreground(&self, bbox: &BoundingBox) -> u64 {
    ((bbox.area() as f64) * self.config.min_foreground_fraction as f64).ceil() as u64
  }

  /// 分割失败时退化为边界框矩形掩码
  pub fn segment_or_box(&self, image: &RgbImage, bbox: &BoundingBox) -> RegionMask {
    match self.segment(image, bbox) {
      Ok(mask) => RegionMask::Segmented(mask),
      Err(e) => {
        warn!("{}, 使用边界框作为掩码", e);
        let (width, height) = image.dimensions();
        RegionMask::Box(Mask::from_box(bbox, width, height))
      }
    }
  }

  pub fn segment(&self, image: &RgbImage, bbox: &BoundingBox) -> Result<Mask, ValidationError> {
    let (width, height) = image.dimensions();
    if !bbox.fits_in(width, height) {
      return Err(ValidationError::invalid(format!(
        "边界框 ({}, {})-({}, {}) 不在图像 {}x{} 内",
        bbox.left, bbox.top, bbox.right, bbox.bottom, width, height
      )));
    }
    let minimum = self.minimum_foreground(bbox);

    let bounds = bbox.expanded(self.config.margin, MIN_MARGIN_PIXELS, (width, height));
    let region = Region::new(image, bounds);

    let mut labels: Vec<bool> = (0..region.len())
      .map(|i| {
        let x = region.x0 + (i % region.width) as u32;
        let y = region.y0 + (i / region.width) as u32;
        bbox.contains(x, y)
      })
      .collect();

    let seeds = labels.iter().filter(|l| !**l).count();
    if seeds < self.config.components {
      debug!("可能背景种子像素不足: {}", seeds);
      return Err(ValidationError::SegmentationFailed {
        foreground: bbox.area(),
        minimum,
      });
    }

    let mut cost_fg = vec![0.0f32; region.len()];
    let mut cost_bg = vec![0.0f32; region.len()];
    for iteration in 0..self.config.iterations {
      let fg_model = ColorModel::fit(&region.samples(&labels, true), self.config.components);
      let bg_model = ColorModel::fit(&region.samples(&labels, false), self.config.components);
      let (Some(fg_model), Some(bg_model)) = (fg_model, bg_model) else {
        debug!("第 {} 轮迭代中某一类别为空", iteration);
        break;
      };

      for (i, c) in region.colors.iter().enumerate() {
        cost_fg[i] = fg_model.neg_log_likelihood(c);
        cost_bg[i] = bg_model.neg_log_likelihood(c);
      }

      let mut next: Vec<bool> = cost_fg
        .iter()
        .zip(cost_bg.iter())
        .map(|(f, b)| f < b)
        .collect();
      for _ in 0..ICM_SWEEPS {
        region.icm_sweep(&mut next, &cost_fg, &cost_bg, self.config.smoothness);
      }

      let changed = next.iter().zip(labels.iter()).filter(|(a, b)| a != b).count();
      labels = next;
      debug!("分割迭代 {}: {} 个像素改变标记", iteration, changed);
      if changed == 0 {
        break;
      }
    }

    let mut gray = GrayImage::new(width, height);
    for (i, &fg) in labels.iter().enumerate() {
      if fg {
        let x = region.x0 + (i % region.width) as u32;
        let y = region.y0 + (i / region.width) as u32;
        gray.put_pixel(x, y, Luma([255]));
      }
    }

    let mut cleaned = close(&keep_largest_component(&gray), Norm::LInf, CLOSE_RADIUS);
    let [x0, y0, x1, y1] = bounds;
    for (x, y, p) in cleaned.enumerate_pixels_mut() {
      if x < x0 || x >= x1 || y < y0 || y >= y1 {
        p[0] = 0;
      }
    }

    let mask = Mask::from_gray(cleaned);
    let foreground = mask.foreground_count();
    debug!("分割前景像素: {} (最少 {})", foreground, minimum);
    if foreground == 0 || foreground < minimum || foreground == width as u64 * height as u64 {
      return Err(ValidationError::SegmentationFailed {
        foreground,
        minimum,
      });
    }
    Ok(mask)
  }
}

/// 只保留面积最大的 8 连通前景区域，并列时保留先出现者
fn keep_largest_component(gray: &GrayImage) -> GrayImage {
  let labels = connected_components(gray, Connectivity::Eight, Luma([0u8]));
  let mut counts: Vec<u64> = Vec::new();
  for p in labels.pixels() {
    let label = p[0] as usize;
    if label == 0 {
      continue;
    }
    if counts.len() < label {
      counts.resize(label, 0);
    }
    counts[label - 1] += 1;
  }

  let mut best = None;
  let mut best_count = 0;
  for (i, &count) in counts.iter().enumerate() {
    if count > best_count {
      best_count = count;
      best = Some(i as u32 + 1);
    }
  }

  let (width, height) = gray.dimensions();
  GrayImage::from_fn(width, height, |x, y| match best {
    Some(label) if labels.get_pixel(x, y)[0] == label => Luma([255]),
    _ => Luma([0]),
  })
}
