// 该文件是 Carsight 项目的一部分。
// src/model/yolo26.rs - RKNN YOLO26 检测模型
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

use std::sync::Mutex;

use image::RgbImage;
use rknpu::{Context, InitFlags, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbNhwcFrame,
  model::{DetectItem, DetectResult, Detector},
};

const YOLO26_NUM_INPUTS: u32 = 1;
const YOLO26_NUM_OUTPUTS: u32 = 6;
const YOLO26_CLASS_NUM: usize = 80;
const YOLO26_INPUT_W: f32 = 640.0;
const YOLO26_INPUT_H: f32 = 640.0;
const YOLO26_HEAD_SIZES: [(usize, usize); 3] = [(80, 80), (40, 40), (20, 20)];
const YOLO26_STRIDES: [f32; 3] = [8.0, 16.0, 32.0];
// 只做粗筛，最终的置信度下限由 DetectorAdapter 决定
const YOLO26_OBJECT_THRESH: f32 = 0.25;

type Yolo26Frame = RgbNhwcFrame<640, 640>;

/// RKNN 上下文不保证可并发推理，所有调用经由互斥锁串行化
pub struct Yolo26 {
  context: Mutex<Context>,
}

#[derive(Error, Debug)]
pub enum Yolo26Error {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  RknnError(#[from] rknpu::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("推理上下文锁已损坏")]
  Poisoned,
}

impl Yolo26Error {
  pub fn invalid(msg: &str, e: rknpu::Error) -> Self {
    Yolo26Error::ModelInvalid(msg.to_string(), e)
  }
}

pub struct Yolo26Builder {
  model_path: String,
  flags: InitFlags,
}

impl FromUrlWithScheme for Yolo26Builder {
  const SCHEME: &'static str = "yolo26";
}

impl FromUrl for Yolo26Builder {
  type Error = Yolo26Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(Yolo26Error::SchemeMismatch(url.scheme().to_string()));
    }

    Ok(Yolo26Builder {
      model_path: url.path().to_string(),
      flags: InitFlags::default(),
    })
  }
}

impl Yolo26Builder {
  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn build(self) -> Result<Yolo26, Yolo26Error> {
    info!("加载模型文件: {}", self.model_path);
    let mode_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      mode_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&mode_data, self.flags)?;

    let num_inputs = context
      .num_inputs()
      .map_err(|e| Yolo26Error::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| Yolo26Error::invalid("无法获取输出数量", e))?;

    if num_inputs != YOLO26_NUM_INPUTS || num_outputs != YOLO26_NUM_OUTPUTS {
      let msg = format!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        YOLO26_NUM_INPUTS, YOLO26_NUM_OUTPUTS, num_inputs, num_outputs
      );
      error!("{}", msg);
      return Err(Yolo26Error::invalid(&msg, rknpu::Error::InvalidModel));
    }

    info!("模型加载完成");
    Ok(Yolo26 {
      context: Mutex::new(context),
    })
  }
}

/// 根据张量大小匹配回归和分类输出
fn match_reg_cls_tensors<'a>(
  tensor1: &'a [f32],
  tensor2: &'a [f32],
  reg_expected: usize,
  cls_expected: usize,
) -> Option<(&'a [f32], &'a [f32])> {
  if tensor1.len() == reg_expected && tensor2.len() == cls_expected {
    Some((tensor1, tensor2))
  } else if tensor1.len() == cls_expected && tensor2.len() == reg_expected {
    Some((tensor2, tensor1))
  } else {
    error!(
      "输出大小不匹配 - 张量1: {}, 张量2: {}, 期望回归: {}, 期望分类: {}",
      tensor1.len(),
      tensor2.len(),
      reg_expected,
      cls_expected
    );
    None
  }
}

impl Yolo26 {
  /// 解码三个检测头，返回归一化坐标
  fn postprocess(output: &rknpu::Output) -> Vec<DetectItem> {
    let mut items = Vec::new();

    for (head_idx, (&(map_h, map_w), stride)) in
      YOLO26_HEAD_SIZES.iter().zip(YOLO26_STRIDES).enumerate()
    {
      let spatial = map_h * map_w;
      let reg_expected = 4 * spatial;
      let cls_expected = YOLO26_CLASS_NUM * spatial;

      let (tensor1, tensor2) = match (
        output.get_f32(head_idx * 2),
        output.get_f32(head_idx * 2 + 1),
      ) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(e), _) | (_, Err(e)) => {
          error!("获取检测头 {} 输出失败: {}", head_idx, e);
          continue;
        }
      };

      let Some((reg, cls)) = match_reg_cls_tensors(tensor1, tensor2, reg_expected, cls_expected)
      else {
        continue;
      };

      for h in 0..map_h {
        for w in 0..map_w {
          let idx = h * map_w + w;

          let (score, class_id) = {
            let mut max_logit = f32::MIN;
            let mut cls_idx = 0usize;
            for c in 0..YOLO26_CLASS_NUM {
              let logit = cls[c * spatial + idx];
              if logit > max_logit {
                max_logit = logit;
                cls_idx = c;
              }
            }
            (sigmoid(max_logit), cls_idx as u32)
          };

          if score <= YOLO26_OBJECT_THRESH {
            continue;
          }

          let grid_x = (w as f32) + 0.5;
          let grid_y = (h as f32) + 0.5;

          let xmin = ((grid_x - reg[idx]) * stride).clamp(0.0, YOLO26_INPUT_W);
          let ymin = ((grid_y - reg[spatial + idx]) * stride).clamp(0.0, YOLO26_INPUT_H);
          let xmax = ((grid_x + reg[2 * spatial + idx]) * stride).clamp(0.0, YOLO26_INPUT_W);
          let ymax = ((grid_y + reg[3 * spatial + idx]) * stride).clamp(0.0, YOLO26_INPUT_H);

          items.push(DetectItem {
            class_id,
            score,
            bbox: [
              xmin / YOLO26_INPUT_W,
              ymin / YOLO26_INPUT_H,
              xmax / YOLO26_INPUT_W,
              ymax / YOLO26_INPUT_H,
            ],
          });
        }
      }
    }

    items
  }
}

impl Detector for Yolo26 {
  type Error = Yolo26Error;

  fn name(&self) -> &str {
    "yolo26"
  }

  fn detect(&self, image: &RgbImage) -> Result<DetectResult, Self::Error> {
    let frame = Yolo26Frame::from(image);

    let items = {
      let context = self.context.lock().map_err(|_| Yolo26Error::Poisoned)?;
      debug!("设置模型输入");
      context.set_input(
        0,
        frame.as_nhwc(),
        rknpu::TensorFormat::NHWC,
        TensorType::UInt8,
      )?;
      debug!("执行模型推理");
      context.run()?;
      let output = context.get_outputs()?;
      Self::postprocess(&output)
    };

    let items = items
      .into_iter()
      .map(|item| DetectItem {
        bbox: frame.to_source(item.bbox),
        ..item
      })
      .collect::<Vec<_>>();
    debug!("检测到 {} 个物体", items.len());
    Ok(DetectResult::from(items))
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}
