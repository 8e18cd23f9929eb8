// 该文件是 Carsight 项目的一部分。
// src/args.rs - 命令行参数
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

use std::path::PathBuf;

use carsight::{ValidationConfig, output::ReportMode};
use clap::Parser;
use url::Url;

/// Carsight 车辆照片校验
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 图像文件或包含图像的目录
  #[arg(long, value_name = "PATH")]
  pub input: PathBuf,

  /// 检测器
  /// 支持格式:
  /// - saliency:（白底前景检测，默认）
  /// - fixed:?class=car&score=0.9&bbox=l,t,r,b
  /// - yolo26:///path/model.rknn（需要 model_yolo26 特性）
  #[arg(long, default_value = "saliency:", value_name = "DETECTOR")]
  pub detector: Url,

  /// 输出，可重复
  /// 支持格式:
  /// - json:-（标准输出）或 json:///path/report.json
  /// - folder:///dir（保存标注图像）
  #[arg(long, default_value = "json:-", value_name = "OUTPUT")]
  pub output: Vec<Url>,

  /// 报告模式: simple 或 detailed
  #[arg(long, default_value = "detailed", value_name = "MODE")]
  pub mode: ReportMode,

  /// 批量模式下的工作线程数
  #[arg(long, default_value = "1", value_name = "COUNT")]
  pub workers: usize,

  /// JSON 配置文件
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,

  /// 检测置信度阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,

  /// 目标类别名称
  #[arg(long, value_name = "CLASS")]
  pub target_class: Option<String>,

  /// 最小长宽比
  #[arg(long, value_name = "RATIO")]
  pub aspect_ratio: Option<f32>,

  /// 白色背景像素的最低比例 (0.0 - 1.0)
  #[arg(long, value_name = "FRACTION")]
  pub whiteness: Option<f32>,

  /// 朝向置信度阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub orientation_confidence: Option<f32>,
}

impl Args {
  /// 以命令行参数覆盖配置文件中的值
  pub fn apply(&self, config: &mut ValidationConfig) {
    if let Some(v) = self.confidence {
      config.detection_confidence = v;
    }
    if let Some(v) = &self.target_class {
      config.target_class = v.clone();
    }
    if let Some(v) = self.aspect_ratio {
      config.aspect_ratio_floor = v;
    }
    if let Some(v) = self.whiteness {
      config.whiteness_floor = v;
    }
    if let Some(v) = self.orientation_confidence {
      config.orientation_confidence_floor = v;
    }
  }
}
