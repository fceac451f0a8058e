// 该文件是 IoTBike （单车守望） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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
  sync::atomic::{AtomicU16, Ordering},
};

use chrono::{DateTime, Datelike, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::{FromUrl, FromUrlWithScheme, model::DetectionResult, output::Render};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 保存方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
  /// 保存绘制了检测框的图像
  Draw,
  /// 保存原图，另写一份 JSON 记录，类别用编号
  RecordId,
  /// 同上，类别用名称
  RecordName,
}

/// 按日期分目录保存检测到目标的帧
///
/// `folder:///var/iotbike?always&record=name`
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  kind: RecordKind,
  frame_counters: AtomicU16,
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

    let kind = uri
      .query_pairs()
      .find(|(k, _)| k == "record")
      .map(|(_, v)| {
        if v == "id" {
          RecordKind::RecordId
        } else {
          RecordKind::RecordName
        }
      })
      .unwrap_or(RecordKind::Draw);

    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput::new(uri.path(), kind, always))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>, kind: RecordKind, always: bool) -> Self {
    Self {
      directory: directory.into(),
      kind,
      frame_counters: AtomicU16::new(0),
      always,
    }
  }

  fn frame_id(&self) -> u16 {
    // fetch_add 溢出时回绕
    self.frame_counters.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self, now: DateTime<Utc>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }

  fn write_record(
    &self,
    path: &Path,
    now: DateTime<Utc>,
    result: &DetectionResult,
  ) -> Result<(), DirectoryRecordOutputError> {
    let detections: Vec<_> = result
      .iter()
      .enumerate()
      .map(|(index, (rect, confidence, class_id))| {
        let class = match self.kind {
          RecordKind::RecordName => json!(result.label_of(index).unwrap_or("unknown")),
          _ => json!(class_id),
        };
        json!({
          "class": class,
          "confidence": confidence,
          "box": [rect.x, rect.y, rect.width, rect.height],
        })
      })
      .collect();

    let record = json!({
      "image": path.file_name().map(|n| n.to_string_lossy().into_owned()),
      "timestamp": now.to_rfc3339(),
      "width": result.image().width(),
      "height": result.image().height(),
      "elapsed_ms": result.elapsed().as_secs_f64() * 1000.0,
      "detections": detections,
    });

    let record_path = path.with_extension("json");
    std::fs::write(&record_path, serde_json::to_vec_pretty(&record)?)?;
    debug!("写入记录: {}", record_path.display());
    Ok(())
  }
}

impl Render<DetectionResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, result: &DetectionResult) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      return Ok(());
    }

    let now = Utc::now();
    let path = self.frame_path(now)?;
    match self.kind {
      RecordKind::Draw => result.render().save(&path)?,
      RecordKind::RecordId | RecordKind::RecordName => {
        result.image().save(&path)?;
        self.write_record(&path, now, result)?;
      }
    }
    info!("保存 {} 个目标的帧: {}", result.count(), path.display());
    Ok(())
  }
}
