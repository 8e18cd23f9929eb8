// 该文件是 Carsight 项目的一部分。
// src/task.rs - 单张与批量校验任务
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
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
  },
  thread,
};

use anyhow::anyhow;
use tracing::{error, info, warn};

use crate::{
  input::load_image,
  model::Detector,
  output::{ImageRecord, Outcome, Render},
  pipeline::Validator,
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Summary, Self::Error>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
  pub total: usize,
  pub passed: usize,
  pub failed: usize,
  pub errors: usize,
}

impl Summary {
  pub fn record(&mut self, outcome: &Outcome) {
    self.total += 1;
    match outcome {
      Outcome::Verdict(v) if v.passed() => self.passed += 1,
      Outcome::Verdict(_) => self.failed += 1,
      Outcome::Error(_) => self.errors += 1,
    }
  }

  fn log(&self) {
    info!(
      "校验完成: 共 {} 张, 通过 {}, 未通过 {}, 错误 {}",
      self.total, self.passed, self.failed, self.errors
    );
  }
}

/// 加载、校验并渲染一张图像
///
/// 加载失败记为错误结果；渲染失败只记录日志，不影响其余图像与最终的 `finish`。
fn process<D, O, RE>(validator: &Validator<D>, path: &Path, output: &O) -> Outcome
where
  D: Detector,
  RE: std::error::Error + Sync + Send + 'static,
  O: for<'a> Render<ImageRecord<'a>, Outcome, Error = RE>,
{
  let now = std::time::Instant::now();
  let (outcome, rendered) = match load_image(path) {
    Ok(image) => {
      let verdict = validator.validate(&image);
      info!(
        "{}: {}，耗时: {:.2?}",
        path.display(),
        if verdict.passed() { "通过" } else { "未通过" },
        now.elapsed()
      );
      let outcome = Outcome::Verdict(verdict);
      let rendered = output.render_result(
        &ImageRecord {
          path,
          image: Some(&image),
        },
        &outcome,
      );
      (outcome, rendered)
    }
    Err(e) => {
      warn!("无法加载 {}: {}", path.display(), e);
      let outcome = Outcome::Error(e.to_string());
      let rendered = output.render_result(&ImageRecord { path, image: None }, &outcome);
      (outcome, rendered)
    }
  };
  if let Err(e) = rendered {
    error!("输出 {} 的结果失败: {}", path.display(), e);
  }
  outcome
}

pub struct OneShotTask;

impl<'v, D, RE, I, O> Task<I, &'v Validator<D>, O> for OneShotTask
where
  D: Detector,
  RE: std::error::Error + Sync + Send + 'static,
  I: IntoIterator<Item = PathBuf>,
  O: for<'a> Render<ImageRecord<'a>, Outcome, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: &'v Validator<D>, output: O) -> Result<Summary, Self::Error> {
    info!("开始任务...");
    let path = input
      .into_iter()
      .next()
      .ok_or_else(|| anyhow!("没有输入图像"))?;
    let mut summary = Summary::default();
    summary.record(&process(model, &path, &output));
    output.finish()?;
    summary.log();
    Ok(summary)
  }
}

/// 多个工作线程共享同一个 `Validator` 并行校验
#[derive(Debug, Clone)]
pub struct BatchTask {
  workers: usize,
  stop: Arc<AtomicBool>,
}

impl Default for BatchTask {
  fn default() -> Self {
    Self::new(1)
  }
}

impl BatchTask {
  pub fn new(workers: usize) -> Self {
    Self {
      workers: workers.max(1),
      stop: Arc::new(AtomicBool::new(false)),
    }
  }

  /// 置位后不再派发新图像，正在校验的图像会完成
  pub fn stop_flag(&self) -> Arc<AtomicBool> {
    self.stop.clone()
  }
}

impl<'v, D, RE, I, O> Task<I, &'v Validator<D>, O> for BatchTask
where
  D: Detector,
  RE: std::error::Error + Sync + Send + 'static,
  I: IntoIterator<Item = PathBuf>,
  I::IntoIter: Send,
  O: for<'a> Render<ImageRecord<'a>, Outcome, Error = RE> + Sync,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: &'v Validator<D>, output: O) -> Result<Summary, Self::Error> {
    info!("开始批量任务，工作线程数: {}", self.workers);
    let queue = Mutex::new(input.into_iter());
    let summary = Mutex::new(Summary::default());

    thread::scope(|scope| -> anyhow::Result<()> {
      let handles = (0..self.workers)
        .map(|_| {
          let (queue, summary, output, stop) = (&queue, &summary, &output, &self.stop);
          scope.spawn(move || -> anyhow::Result<()> {
            loop {
              if stop.load(Ordering::SeqCst) {
                warn!("中断信号接收，停止派发");
                break;
              }
              let next = queue
                .lock()
                .map_err(|_| anyhow!("任务队列锁已损坏"))?
                .next();
              let Some(path) = next else {
                break;
              };
              let outcome = process(model, &path, output);
              summary
                .lock()
                .map_err(|_| anyhow!("统计锁已损坏"))?
                .record(&outcome);
            }
            Ok(())
          })
        })
        .collect::<Vec<_>>();

      for handle in handles {
        handle.join().map_err(|_| anyhow!("工作线程异常退出"))??;
      }
      Ok(())
    })?;

    output.finish()?;
    let summary = *summary.lock().map_err(|_| anyhow!("统计锁已损坏"))?;
    summary.log();
    Ok(summary)
  }
}

#[cfg(test)]
mod tests {
  use std::{collections::BTreeSet, sync::atomic::AtomicUsize};

  use image::{Rgb, RgbImage};
  use thiserror::Error;

  use super::*;
  use crate::{ValidationConfig, model::FixedDetector};

  #[derive(Error, Debug)]
  #[error("写入失败")]
  struct WriteFailed;

  /// 对指定文件名渲染失败，其余照常记录
  #[derive(Default)]
  struct FlakyOutput {
    fail_on: &'static str,
    seen: Mutex<BTreeSet<String>>,
    finished: AtomicUsize,
  }

  impl<'a> Render<ImageRecord<'a>, Outcome> for FlakyOutput {
    type Error = WriteFailed;

    fn render_result(&self, frame: &ImageRecord<'a>, _: &Outcome) -> Result<(), Self::Error> {
      let name = frame.name();
      if name == self.fail_on {
        return Err(WriteFailed);
      }
      self.seen.lock().unwrap().insert(name);
      Ok(())
    }

    fn finish(&self) -> Result<(), Self::Error> {
      self.finished.fetch_add(1, Ordering::SeqCst);
      Ok(())
    }
  }

  impl<'a> Render<ImageRecord<'a>, Outcome> for &FlakyOutput {
    type Error = WriteFailed;

    fn render_result(&self, frame: &ImageRecord<'a>, result: &Outcome) -> Result<(), Self::Error> {
      (**self).render_result(frame, result)
    }

    fn finish(&self) -> Result<(), Self::Error> {
      (**self).finish()
    }
  }

  #[test]
  fn render_failure_does_not_stop_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<PathBuf> = ["a.png", "b.png", "c.png", "d.png"]
      .iter()
      .map(|name| dir.path().join(name))
      .collect();
    for path in &paths {
      RgbImage::from_pixel(8, 8, Rgb([255, 255, 255]))
        .save(path)
        .unwrap();
    }

    let validator = Validator::new(FixedDetector::empty(), ValidationConfig::default()).unwrap();
    let output = FlakyOutput {
      fail_on: "b.png",
      ..Default::default()
    };
    let summary = BatchTask::new(1)
      .run_task(paths, &validator, &output)
      .unwrap();

    assert_eq!(summary.total, 4);
    assert_eq!(summary.failed, 4);
    assert_eq!(output.finished.load(Ordering::SeqCst), 1);
    let seen = output.seen.lock().unwrap();
    assert_eq!(
      seen.iter().map(String::as_str).collect::<Vec<_>>(),
      ["a.png", "c.png", "d.png"]
    );
  }
}
