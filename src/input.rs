// 该文件是 Carsight 项目的一部分。
// src/input.rs - 图像文件输入
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

use std::path::{Path, PathBuf};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, info};

const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "bmp", "tif", "tiff", "webp"];

#[derive(Error, Debug)]
pub enum InputError {
  #[error("文件不存在: {}", .0.display())]
  NotFound(PathBuf),
  #[error("目录中没有图像文件: {}", .0.display())]
  EmptyDirectory(PathBuf),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像格式无效: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

pub fn is_image_file(path: &Path) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .map(|e| IMAGE_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
    .unwrap_or(false)
}

/// 解码为 8 位 RGB 图像
pub fn load_image(path: &Path) -> Result<RgbImage, InputError> {
  if !path.exists() {
    return Err(InputError::NotFound(path.to_path_buf()));
  }
  let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
  debug!(
    "已加载 {}: {}x{}",
    path.display(),
    image.width(),
    image.height()
  );
  Ok(image.into_rgb8())
}

/// 单个图像文件或一个目录中的全部图像（按文件名排序）
#[derive(Debug, Clone)]
pub struct ImageInput {
  paths: Vec<PathBuf>,
  directory: bool,
}

impl ImageInput {
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, InputError> {
    let path = path.as_ref();
    if !path.exists() {
      return Err(InputError::NotFound(path.to_path_buf()));
    }

    if path.is_file() {
      return Ok(Self {
        paths: vec![path.to_path_buf()],
        directory: false,
      });
    }

    let mut paths = std::fs::read_dir(path)?
      .filter_map(|entry| entry.ok().map(|e| e.path()))
      .filter(|p| p.is_file() && is_image_file(p))
      .collect::<Vec<_>>();
    paths.sort();
    if paths.is_empty() {
      return Err(InputError::EmptyDirectory(path.to_path_buf()));
    }
    info!("在 {} 中找到 {} 张图像", path.display(), paths.len());
    Ok(Self {
      paths,
      directory: true,
    })
  }

  pub fn is_directory(&self) -> bool {
    self.directory
  }

  pub fn len(&self) -> usize {
    self.paths.len()
  }

  pub fn is_empty(&self) -> bool {
    self.paths.is_empty()
  }
}

impl IntoIterator for ImageInput {
  type Item = PathBuf;
  type IntoIter = std::vec::IntoIter<PathBuf>;

  fn into_iter(self) -> Self::IntoIter {
    self.paths.into_iter()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lists_only_images_sorted() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["b.png", "a.JPG", "notes.txt"] {
      std::fs::write(dir.path().join(name), b"x").unwrap();
    }
    let input = ImageInput::from_path(dir.path()).unwrap();
    assert!(input.is_directory());
    let names: Vec<_> = input
      .into_iter()
      .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
      .collect();
    assert_eq!(names, ["a.JPG", "b.png"]);
  }

  #[test]
  fn missing_path_is_reported() {
    let err = ImageInput::from_path("/definitely/not/here").unwrap_err();
    assert!(matches!(err, InputError::NotFound(_)));
    assert_eq!(err.to_string(), "文件不存在: /definitely/not/here");
  }

  #[test]
  fn corrupt_file_is_an_image_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.png");
    std::fs::write(&path, b"not a png").unwrap();
    assert!(load_image(&path).is_err());
  }
}
