// 该文件是 Carsight 项目的一部分。
// tests/batch.rs - 批量任务与报告输出测试
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

mod common;

use std::path::Path;

use carsight::{
  FromUrl,
  input::ImageInput,
  output::{OutputWrapper, ReportMode},
  task::{BatchTask, OneShotTask, Summary, Task},
};
use serde_json::Value;
use url::Url;

use common::*;

fn json_output(path: &Path, mode: ReportMode) -> OutputWrapper {
  let url = Url::parse(&format!("json://{}", path.display())).unwrap();
  OutputWrapper::from_url(&url).unwrap().with_mode(mode)
}

fn photo_directory() -> tempfile::TempDir {
  let dir = tempfile::tempdir().unwrap();
  left_facing_car().image.save(dir.path().join("a_good.png")).unwrap();
  on_grey_backdrop(left_facing_car())
    .image
    .save(dir.path().join("b_grey.png"))
    .unwrap();
  std::fs::write(dir.path().join("c_broken.jpg"), b"definitely not a jpeg").unwrap();
  std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
  dir
}

#[test]
fn batch_reports_every_image_and_keeps_going_on_errors() {
  let photos = photo_directory();
  let out = tempfile::tempdir().unwrap();
  let report = out.path().join("report.json");

  let validator = validator_with(vec![detection(left_facing_car().bbox, 0.95)]);
  let input = ImageInput::from_path(photos.path()).unwrap();
  assert_eq!(input.len(), 3);

  let summary = BatchTask::new(2)
    .run_task(input, &validator, vec![json_output(&report, ReportMode::Detailed)])
    .unwrap();
  assert_eq!(
    summary,
    Summary {
      total: 3,
      passed: 1,
      failed: 1,
      errors: 1
    }
  );

  let value: Value = serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
  assert_eq!(value["a_good.png"]["result"], "Yes");
  assert_eq!(value["a_good.png"]["criteria"]["white_background"], true);
  assert_eq!(value["b_grey.png"]["result"], "No");
  assert_eq!(value["b_grey.png"]["criteria"]["white_background"], false);
  assert!(value["b_grey.png"]["model_used"].as_str().unwrap().starts_with("fixed"));
  assert_eq!(value["c_broken.jpg"]["result"], "Error");
  assert!(value.get("notes.txt").is_none());
}

#[test]
fn stopped_batch_dispatches_nothing() {
  let photos = photo_directory();
  let out = tempfile::tempdir().unwrap();
  let report = out.path().join("report.json");

  let validator = validator_with(vec![]);
  let task = BatchTask::new(4);
  task
    .stop_flag()
    .store(true, std::sync::atomic::Ordering::SeqCst);
  let summary = task
    .run_task(
      ImageInput::from_path(photos.path()).unwrap(),
      &validator,
      vec![json_output(&report, ReportMode::Simple)],
    )
    .unwrap();
  assert_eq!(summary.total, 0);
}

#[test]
fn single_image_simple_report() {
  let photos = photo_directory();
  let out = tempfile::tempdir().unwrap();
  let report = out.path().join("single.json");

  let validator = validator_with(vec![detection(left_facing_car().bbox, 0.3)]);
  let input = ImageInput::from_path(photos.path().join("a_good.png")).unwrap();
  assert!(!input.is_directory());

  let summary = OneShotTask
    .run_task(input, &validator, vec![json_output(&report, ReportMode::Simple)])
    .unwrap();
  assert_eq!(summary.failed, 1);

  let value: Value = serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
  assert_eq!(value["result"], "No");
  assert!(value.get("criteria").is_none());
  assert!(value.get("timestamp").is_none());
  let reasons = value["failure_reasons"].as_array().unwrap();
  assert_eq!(reasons.len(), 5);
}

#[test]
fn folder_output_saves_annotated_images() {
  let photos = photo_directory();
  let records = tempfile::tempdir().unwrap();
  let url = Url::parse(&format!("folder://{}", records.path().display())).unwrap();

  let validator = validator_with(vec![detection(left_facing_car().bbox, 0.95)]);
  let input = ImageInput::from_path(photos.path().join("a_good.png")).unwrap();
  OneShotTask
    .run_task(input, &validator, vec![OutputWrapper::from_url(&url).unwrap()])
    .unwrap();

  let mut saved = Vec::new();
  let mut pending = vec![records.path().to_path_buf()];
  while let Some(dir) = pending.pop() {
    for entry in std::fs::read_dir(dir).unwrap() {
      let path = entry.unwrap().path();
      if path.is_dir() {
        pending.push(path);
      } else {
        saved.push(path);
      }
    }
  }
  assert_eq!(saved.len(), 1);
  let image = image::open(&saved[0]).unwrap().into_rgb8();
  let [left, top, _, _] = left_facing_car().bbox;
  // 通过的图像用绿色框标注
  assert_eq!(image.get_pixel(left, top)[1], 200);
}
