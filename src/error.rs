// 该文件是 Carsight 项目的一部分。
// src/error.rs - 校验流水线错误定义
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

use thiserror::Error;

/// 流水线内部的失败信号。
///
/// 这些错误永远不会从 [`crate::Validator::validate`] 中逃逸，
/// 而是被判定引擎转换为具体判据的失败原因。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
  #[error("未检测到目标: 没有超过置信度阈值 {floor:.2} 的 '{class}' 检测结果")]
  NoObjectDetected { class: String, floor: f32 },
  #[error("检测器运行失败: {0}")]
  DetectionFailed(String),
  #[error("分割失败: 前景像素 {foreground} 个, 最少需要 {minimum} 个")]
  SegmentationFailed { foreground: u64, minimum: u64 },
  #[error("输入无效: {0}")]
  InvalidInput(String),
}

impl ValidationError {
  pub fn invalid(msg: impl Into<String>) -> Self {
    ValidationError::InvalidInput(msg.into())
  }
}
