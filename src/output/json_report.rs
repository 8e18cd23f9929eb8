// 该文件是 Carsight 项目的一部分。
// src/output/json_report.rs - JSON 报告输出
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
  collections::BTreeMap,
  io::Write,
  path::PathBuf,
  str::FromStr,
  sync::{Mutex, PoisonError},
};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{ImageRecord, Outcome, Render},
};

#[derive(Error, Debug)]
pub enum JsonReportError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("未知的报告模式: {0}")]
  UnknownMode(String),
  #[error("序列化错误: {0}")]
  SerdeError(#[from] serde_json::Error),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("报告缓存锁已损坏")]
  Poisoned,
}

impl<T> From<PoisonError<T>> for JsonReportError {
  fn from(_: PoisonError<T>) -> Self {
    JsonReportError::Poisoned
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportMode {
  Simple,
  #[default]
  Detailed,
}

impl FromStr for ReportMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "simple" => Ok(ReportMode::Simple),
      "detailed" => Ok(ReportMode::Detailed),
      other => Err(format!("unknown report mode '{other}', expected simple or detailed")),
    }
  }
}

/// 单张图像的报告
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
  pub result: &'static str,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub criteria: Option<BTreeMap<&'static str, bool>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub failure_reasons: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub confidence: Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub quality_score: Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub orientation: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub timestamp: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub model_used: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub image_path: Option<String>,
}

impl Report {
  pub fn new(record: &ImageRecord<'_>, outcome: &Outcome, mode: ReportMode) -> Self {
    let verdict = match outcome {
      Outcome::Error(message) => {
        return Report {
          result: "Error",
          error: Some(message.clone()),
          criteria: None,
          failure_reasons: None,
          confidence: None,
          quality_score: None,
          orientation: None,
          timestamp: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
          model_used: None,
          image_path: Some(record.path.display().to_string()),
        };
      }
      Outcome::Verdict(verdict) => verdict,
    };

    let result = if verdict.passed() { "Yes" } else { "No" };
    let failure_reasons =
      (!verdict.passed()).then(|| verdict.failure_reasons().to_vec());

    match mode {
      ReportMode::Simple => Report {
        result,
        error: None,
        criteria: None,
        failure_reasons,
        confidence: None,
        quality_score: None,
        orientation: None,
        timestamp: None,
        model_used: None,
        image_path: None,
      },
      ReportMode::Detailed => Report {
        result,
        error: None,
        criteria: Some(
          verdict
            .criteria()
            .iter()
            .map(|(c, v)| (c.name(), v.passed))
            .collect(),
        ),
        failure_reasons: Some(verdict.failure_reasons().to_vec()),
        confidence: verdict.confidence(),
        quality_score: verdict.quality_score(),
        orientation: verdict
          .orientation()
          .map(|o| format!("{:?}", o.direction).to_uppercase()),
        timestamp: Some(
          verdict
            .created_at()
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        ),
        model_used: Some(verdict.model_used().to_string()),
        image_path: Some(record.path.display().to_string()),
      },
    }
  }
}

enum Target {
  Stdout,
  File(PathBuf),
}

/// 收集所有报告，在 `finish` 时一次写出
///
/// 只有一份报告时直接写出该报告，否则写出 文件名 → 报告 的映射。
pub struct JsonReportOutput {
  target: Target,
  mode: ReportMode,
  reports: Mutex<BTreeMap<String, Report>>,
}

impl FromUrlWithScheme for JsonReportOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonReportOutput {
  type Error = JsonReportError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(JsonReportError::SchemeMismatch);
    }

    let mut mode = ReportMode::default();
    for (k, v) in url.query_pairs() {
      if k == "mode" {
        mode = v.parse().map_err(JsonReportError::UnknownMode)?;
      }
    }

    let path = url.path();
    let target = if path.is_empty() || path == "-" {
      Target::Stdout
    } else {
      Target::File(PathBuf::from(path))
    };

    Ok(Self {
      target,
      mode,
      reports: Mutex::new(BTreeMap::new()),
    })
  }
}

impl JsonReportOutput {
  pub fn with_mode(mut self, mode: ReportMode) -> Self {
    self.mode = mode;
    self
  }

  pub fn mode(&self) -> ReportMode {
    self.mode
  }

  /// 当前缓存的报告内容
  pub fn to_json(&self) -> Result<String, JsonReportError> {
    let reports = self.reports.lock()?;
    let text = if reports.len() == 1 {
      match reports.values().next() {
        Some(report) => serde_json::to_string_pretty(report)?,
        None => String::new(),
      }
    } else {
      serde_json::to_string_pretty(&*reports)?
    };
    Ok(text)
  }
}

impl<'a> Render<ImageRecord<'a>, Outcome> for JsonReportOutput {
  type Error = JsonReportError;

  fn render_result(&self, frame: &ImageRecord<'a>, result: &Outcome) -> Result<(), Self::Error> {
    let report = Report::new(frame, result, self.mode);
    self.reports.lock()?.insert(frame.name(), report);
    Ok(())
  }

  fn finish(&self) -> Result<(), Self::Error> {
    let text = self.to_json()?;
    match &self.target {
      Target::Stdout => {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{text}")?;
      }
      Target::File(path) => {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
          std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
        info!("报告已写入 {}", path.display());
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::path::Path;

  use url::Url;

  use super::*;

  fn record(path: &Path) -> ImageRecord<'_> {
    ImageRecord { path, image: None }
  }

  #[test]
  fn parses_target_and_mode() {
    let output = JsonReportOutput::from_url(&Url::parse("json:-?mode=simple").unwrap()).unwrap();
    assert!(matches!(output.target, Target::Stdout));
    assert_eq!(output.mode(), ReportMode::Simple);

    let output = JsonReportOutput::from_url(&Url::parse("json:///tmp/out.json").unwrap()).unwrap();
    assert!(matches!(output.target, Target::File(ref p) if p == Path::new("/tmp/out.json")));
    assert_eq!(output.mode(), ReportMode::Detailed);

    assert!(JsonReportOutput::from_url(&Url::parse("json:-?mode=loud").unwrap()).is_err());
    assert!(JsonReportOutput::from_url(&Url::parse("folder:///tmp").unwrap()).is_err());
  }

  #[test]
  fn error_outcome_reports_error() {
    let path = Path::new("/photos/broken.jpg");
    let report = Report::new(
      &record(path),
      &Outcome::Error("Invalid image format".into()),
      ReportMode::Simple,
    );
    assert_eq!(report.result, "Error");
    assert_eq!(report.error.as_deref(), Some("Invalid image format"));
  }

  #[test]
  fn batch_writes_a_map_keyed_by_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("nested").join("report.json");
    let url = Url::from_file_path(&file).unwrap();
    let url = Url::parse(&format!("json://{}", url.path())).unwrap();
    let output = JsonReportOutput::from_url(&url).unwrap();

    for name in ["b.jpg", "a.jpg"] {
      let path = dir.path().join(name);
      output
        .render_result(&record(&path), &Outcome::Error("missing".into()))
        .unwrap();
    }
    output.finish().unwrap();

    let text = std::fs::read_to_string(&file).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["a.jpg"]["result"], "Error");
    assert_eq!(value["b.jpg"]["result"], "Error");
  }
}
