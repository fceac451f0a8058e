// 该文件是 IoTBike （单车守望） 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

use std::ops::Deref;

use tracing::debug;

use crate::model::Candidate;

/// 默认重叠阈值，交并比超过该值的低分框被抑制
pub const DEFAULT_OVERLAP_THRESHOLD: f32 = 0.2;

/// 抑制后保留的候选框，按置信度降序
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Suppressed(Box<[Candidate]>);

impl Suppressed {
  pub fn into_inner(self) -> Box<[Candidate]> {
    self.0
  }
}

impl Deref for Suppressed {
  type Target = [Candidate];

  fn deref(&self) -> &Self::Target {
    &self.0
  }
}

/// 贪心非极大值抑制
#[derive(Debug, Clone, Copy)]
pub struct Suppressor {
  overlap_threshold: f32,
}

impl Default for Suppressor {
  fn default() -> Self {
    Self {
      overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
    }
  }
}

impl Suppressor {
  pub fn new(overlap_threshold: f32) -> Self {
    Self { overlap_threshold }
  }

  pub fn overlap_threshold(&self) -> f32 {
    self.overlap_threshold
  }

  /// 置信度不大于 `score_threshold` 的候选框先被丢弃，其余按置信度降序贪心保留
  pub fn filter(&self, candidates: Vec<Candidate>, score_threshold: f32) -> Suppressed {
    let total = candidates.len();
    let mut candidates: Vec<Candidate> = candidates
      .into_iter()
      .filter(|c| c.confidence > score_threshold)
      .collect();

    // 稳定排序，同分时保持输入顺序
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
      let overlapped = kept
        .iter()
        .any(|k| k.rect.iou(&candidate.rect) > self.overlap_threshold);
      if !overlapped {
        kept.push(candidate);
      }
    }

    debug!("非极大值抑制: {} -> {}", total, kept.len());
    Suppressed(kept.into_boxed_slice())
  }
}
