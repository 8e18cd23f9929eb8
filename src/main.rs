// 该文件是 Carsight 项目的一部分。
// src/main.rs - 车辆照片校验命令行程序
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

mod args;

use std::sync::atomic::Ordering;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use carsight::{
  FromUrl, ValidationConfig, Validator,
  input::ImageInput,
  model::DetectorWrapper,
  output::OutputWrapper,
  task::{BatchTask, OneShotTask, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let args = args::Args::parse();

  info!("输入: {}", args.input.display());
  info!("检测器: {}", args.detector);
  for output in &args.output {
    info!("输出: {}", output);
  }

  let mut config = match &args.config {
    Some(path) => ValidationConfig::from_json_file(path)?,
    None => ValidationConfig::default(),
  };
  args.apply(&mut config);

  let input = ImageInput::from_path(&args.input)?;
  let detector = DetectorWrapper::from_url(&args.detector)?;
  let validator = Validator::new(detector, config)?;
  info!("使用模型: {}", validator.model_used());

  let outputs = args
    .output
    .iter()
    .map(|url| OutputWrapper::from_url(url).map(|o| o.with_mode(args.mode)))
    .collect::<Result<Vec<_>, _>>()?;

  let summary = if input.is_directory() {
    let task = BatchTask::new(args.workers);
    let stop = task.stop_flag();
    ctrlc::set_handler(move || {
      warn!("收到中断信号，等待正在处理的图像完成...");
      stop.store(true, Ordering::SeqCst);
    })?;
    task.run_task(input, &validator, outputs)?
  } else {
    OneShotTask.run_task(input, &validator, outputs)?
  };

  if summary.errors > 0 {
    warn!("{} 张图像无法处理", summary.errors);
  }
  Ok(())
}
