// 该文件是 Carsight 项目的一部分。
// src/output/directory_record.rs - 将标注后的图像记录到目录
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

use std::{
  path::{Path, PathBuf},
  sync::{Mutex, PoisonError},
};

use chrono::{Datelike, Utc};
use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{ImageRecord, Outcome, Render},
  types::{BoundingBox, ValidationVerdict},
};

const PASS_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
const FAIL_COLOR: Rgb<u8> = Rgb([220, 0, 0]);
const BORDER: u32 = 3;

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("计数器锁已损坏")]
  Poisoned,
}

impl<T> From<PoisonError<T>> for DirectoryRecordOutputError {
  fn from(_: PoisonError<T>) -> Self {
    DirectoryRecordOutputError::Poisoned
  }
}

/// 通过时用绿色、未通过时用红色画出检测框
pub fn draw_verdict(image: &RgbImage, verdict: &ValidationVerdict) -> RgbImage {
  let mut canvas = image.clone();
  if let Some(bbox) = verdict.bounding_box() {
    let color = if verdict.passed() {
      PASS_COLOR
    } else {
      FAIL_COLOR
    };
    draw_box(&mut canvas, bbox, color);
  }
  canvas
}

fn draw_box(canvas: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
  for inset in 0..BORDER {
    let width = bbox.width().saturating_sub(2 * inset);
    let height = bbox.height().saturating_sub(2 * inset);
    if width == 0 || height == 0 {
      break;
    }
    let rect = Rect::at((bbox.left + inset) as i32, (bbox.top + inset) as i32).of_size(width, height);
    draw_hollow_rect_mut(canvas, rect, color);
  }
}

/// `folder:///dir` 输出，按日期分目录保存标注图像
///
/// 默认只记录有检测框的图像；`?always` 时所有成功加载的图像都会保存。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  counter: Mutex<u16>,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      counter: Mutex::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  pub fn directory(&self) -> &Path {
    &self.directory
  }

  fn record_id(&self) -> Result<u16, DirectoryRecordOutputError> {
    let mut counter = self.counter.lock()?;
    let id = counter.wrapping_add(1);
    *counter = id;
    Ok(id)
  }

  fn record_path(&self, name: &str) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }

    let stem = Path::new(name)
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_else(|| "image".to_string());
    Ok(directory.join(format!(
      "{}-{:04X}-{}.png",
      now.format("%H-%M-%S"),
      self.record_id()?,
      stem
    )))
  }
}

impl<'a> Render<ImageRecord<'a>, Outcome> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &ImageRecord<'a>, result: &Outcome) -> Result<(), Self::Error> {
    let (Some(image), Outcome::Verdict(verdict)) = (frame.image, result) else {
      return Ok(());
    };
    if !self.always && verdict.bounding_box().is_none() {
      return Ok(());
    }

    let path = self.record_path(&frame.name())?;
    draw_verdict(image, verdict).save(&path)?;
    debug!("标注图像已保存到 {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use url::Url;

  use super::*;

  #[test]
  fn parses_directory_and_flags() {
    let output =
      DirectoryRecordOutput::from_url(&Url::parse("folder:///tmp/records?always").unwrap()).unwrap();
    assert_eq!(output.directory(), Path::new("/tmp/records"));
    assert!(output.always);
    assert!(DirectoryRecordOutput::from_url(&Url::parse("json:-").unwrap()).is_err());
  }

  #[test]
  fn box_outline_is_drawn_inside_the_box() {
    let mut canvas = RgbImage::from_pixel(50, 40, Rgb([255, 255, 255]));
    let bbox = BoundingBox::new(10, 10, 30, 25, 0.9, 2, "car", (50, 40)).unwrap();
    draw_box(&mut canvas, &bbox, FAIL_COLOR);
    assert_eq!(*canvas.get_pixel(10, 10), FAIL_COLOR);
    assert_eq!(*canvas.get_pixel(29, 24), FAIL_COLOR);
    assert_eq!(*canvas.get_pixel(20, 17), Rgb([255, 255, 255]));
    assert_eq!(*canvas.get_pixel(30, 25), Rgb([255, 255, 255]));
  }

  #[test]
  fn error_outcomes_are_not_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let output = DirectoryRecordOutput {
      directory: dir.path().to_path_buf(),
      counter: Mutex::new(0),
      always: true,
    };
    let record = ImageRecord {
      path: Path::new("missing.jpg"),
      image: None,
    };
    output
      .render_result(&record, &Outcome::Error("missing".into()))
      .unwrap();
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
  }
}
