// 该文件是 Carsight 项目的一部分。
// src/output.rs - 校验结果输出
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

use std::path::Path;

use image::RgbImage;
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, types::ValidationVerdict};

mod directory_record;
mod json_report;

pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};
pub use self::json_report::{JsonReportError, JsonReportOutput, Report, ReportMode};

/// 一张图像的处理结果：校验结论，或无法加载时的错误描述
#[derive(Debug, Clone)]
pub enum Outcome {
  Verdict(ValidationVerdict),
  Error(String),
}

/// 被校验的图像记录
#[derive(Debug, Clone, Copy)]
pub struct ImageRecord<'a> {
  pub path: &'a Path,
  pub image: Option<&'a RgbImage>,
}

impl ImageRecord<'_> {
  pub fn name(&self) -> String {
    self
      .path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| self.path.display().to_string())
  }
}

pub trait Render<Frame, Output> {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;

  fn finish(&self) -> Result<(), Self::Error> {
    Ok(())
  }
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("JSON 报告输出错误: {0}")]
  JsonReportError(#[from] JsonReportError),
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  JsonReport(JsonReportOutput),
  DirectoryRecord(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      JsonReportOutput::SCHEME => Ok(OutputWrapper::JsonReport(JsonReportOutput::from_url(url)?)),
      DirectoryRecordOutput::SCHEME => Ok(OutputWrapper::DirectoryRecord(
        DirectoryRecordOutput::from_url(url)?,
      )),
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl OutputWrapper {
  /// 只影响 JSON 报告输出
  pub fn with_mode(self, mode: ReportMode) -> Self {
    match self {
      OutputWrapper::JsonReport(output) => OutputWrapper::JsonReport(output.with_mode(mode)),
      other => other,
    }
  }
}

impl<'a> Render<ImageRecord<'a>, Outcome> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &ImageRecord<'a>, result: &Outcome) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::JsonReport(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      OutputWrapper::DirectoryRecord(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }

  fn finish(&self) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::JsonReport(output) => output.finish().map_err(OutputError::from),
      OutputWrapper::DirectoryRecord(output) => output.finish().map_err(OutputError::from),
    }
  }
}

/// 同时写入多个输出；某个输出失败时其余输出仍会执行，返回第一个错误
impl<'a, T: Render<ImageRecord<'a>, Outcome>> Render<ImageRecord<'a>, Outcome> for Vec<T> {
  type Error = T::Error;

  fn render_result(&self, frame: &ImageRecord<'a>, result: &Outcome) -> Result<(), Self::Error> {
    self
      .iter()
      .map(|output| output.render_result(frame, result))
      .fold(Ok(()), Result::and)
  }

  fn finish(&self) -> Result<(), Self::Error> {
    self
      .iter()
      .map(|output| output.finish())
      .fold(Ok(()), Result::and)
  }
}
