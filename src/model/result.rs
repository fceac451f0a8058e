// 该文件是 IoTBike （单车守望） 项目的一部分。
// src/model/result.rs - 检测结果
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

use std::{sync::Arc, time::Duration};

use image::RgbImage;
use thiserror::Error;

use crate::{
  model::{ClassCatalog, Detections, PixelRect, Suppressed},
  output::draw::Draw,
};

const UNKNOWN_LABEL: &str = "unknown";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ResultError {
  #[error("检测序号越界: {index} (共 {count} 个)")]
  DetectionOutOfRange { index: usize, count: usize },
  #[error("类别编号越界: {class_id} (共 {count} 个类别)")]
  ClassOutOfRange { class_id: usize, count: usize },
}

/// 一次 `detect` 的最终结果，构造后不可修改
///
/// `rects`、`confidences`、`class_ids` 三个序列长度始终相同。
pub struct DetectionResult {
  rects: Box<[PixelRect]>,
  confidences: Box<[f32]>,
  class_ids: Box<[usize]>,
  elapsed: Duration,
  image: RgbImage,
  catalog: ClassCatalog,
  draw: Arc<Draw>,
}

impl std::fmt::Debug for DetectionResult {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("DetectionResult")
      .field("rects", &self.rects)
      .field("confidences", &self.confidences)
      .field("class_ids", &self.class_ids)
      .field("elapsed", &self.elapsed)
      .field("image", &format_args!("{}x{}", self.image.width(), self.image.height()))
      .finish()
  }
}

impl DetectionResult {
  pub fn new(
    kept: Suppressed,
    image: RgbImage,
    elapsed: Duration,
    catalog: ClassCatalog,
    draw: Arc<Draw>,
  ) -> Self {
    let kept = kept.into_inner();
    Self {
      rects: kept.iter().map(|c| c.rect).collect(),
      confidences: kept.iter().map(|c| c.confidence).collect(),
      class_ids: kept.iter().map(|c| c.class_id).collect(),
      elapsed,
      image,
      catalog,
      draw,
    }
  }

  pub fn count(&self) -> usize {
    self.rects.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rects.is_empty()
  }

  pub fn rects(&self) -> &[PixelRect] {
    &self.rects
  }

  pub fn confidences(&self) -> &[f32] {
    &self.confidences
  }

  pub fn class_ids(&self) -> &[usize] {
    &self.class_ids
  }

  /// 前向推理耗时
  pub fn elapsed(&self) -> Duration {
    self.elapsed
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn catalog(&self) -> &ClassCatalog {
    &self.catalog
  }

  pub fn iter(&self) -> impl Iterator<Item = (&PixelRect, f32, usize)> + '_ {
    self
      .rects
      .iter()
      .zip(self.confidences.iter().copied())
      .zip(self.class_ids.iter().copied())
      .map(|((rect, confidence), class_id)| (rect, confidence, class_id))
  }

  /// 第 `index` 个检测的类别名称
  pub fn label_of(&self, index: usize) -> Result<&str, ResultError> {
    let class_id = *self
      .class_ids
      .get(index)
      .ok_or(ResultError::DetectionOutOfRange {
        index,
        count: self.count(),
      })?;

    self
      .catalog
      .name(class_id)
      .ok_or(ResultError::ClassOutOfRange {
        class_id,
        count: self.catalog.len(),
      })
  }

  /// `"<类别>: <置信度>"`，置信度保留 4 位小数
  pub fn caption_of(&self, index: usize) -> Option<String> {
    let class_id = *self.class_ids.get(index)?;
    let name = self.catalog.name(class_id).unwrap_or(UNKNOWN_LABEL);
    Some(format!("{}: {:.4}", name, self.confidences[index]))
  }

  /// 在图像副本上绘制所有检测框；没有检测时返回原图副本
  pub fn render(&self) -> RgbImage {
    let mut image = self.image.clone();
    self.draw_on(&mut image);
    image
  }

  /// 与 `render` 相同，但直接使用自身持有的图像
  pub fn into_rendered(mut self) -> RgbImage {
    let mut image = std::mem::take(&mut self.image);
    self.draw_on(&mut image);
    image
  }

  fn draw_on(&self, image: &mut RgbImage) {
    for (index, rect) in self.rects.iter().enumerate() {
      if let Some(caption) = self.caption_of(index) {
        self.draw.draw_box(image, rect, &caption);
      }
    }
  }
}

impl Detections for DetectionResult {
  fn count(&self) -> usize {
    self.rects.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{Candidate, Suppressor};
  use image::Rgb;

  fn result(candidates: Vec<Candidate>) -> DetectionResult {
    let kept = Suppressor::default().filter(candidates, 0.0);
    DetectionResult::new(
      kept,
      RgbImage::from_pixel(100, 100, Rgb([10, 20, 30])),
      Duration::from_millis(12),
      ClassCatalog::from_names(["person", "bicycle"]),
      Arc::new(Draw::without_font()),
    )
  }

  fn candidate(x: u32, class_id: usize, confidence: f32) -> Candidate {
    Candidate {
      rect: PixelRect {
        x,
        y: 10,
        width: 20,
        height: 20,
      },
      confidence,
      class_id,
    }
  }

  #[test]
  fn empty_result_counts_zero_and_renders_source() {
    let result = result(Vec::new());
    assert_eq!(result.count(), 0);
    assert!(result.is_empty());
    assert_eq!(result.render(), *result.image());
    assert_eq!(result.elapsed(), Duration::from_millis(12));
  }

  #[test]
  fn parallel_sequences_have_equal_length() {
    let result = result(vec![candidate(0, 0, 0.9), candidate(50, 1, 0.8), candidate(2, 1, 0.7)]);
    assert_eq!(result.count(), 2);
    assert_eq!(result.rects().len(), result.confidences().len());
    assert_eq!(result.rects().len(), result.class_ids().len());
    assert_eq!(result.iter().count(), 2);
  }

  #[test]
  fn labels_and_captions() {
    let result = result(vec![candidate(0, 0, 0.9), candidate(50, 5, 0.8)]);
    assert_eq!(result.label_of(0), Ok("person"));
    assert_eq!(
      result.label_of(1),
      Err(ResultError::ClassOutOfRange {
        class_id: 5,
        count: 2
      })
    );
    assert_eq!(
      result.label_of(2),
      Err(ResultError::DetectionOutOfRange { index: 2, count: 2 })
    );
    assert_eq!(result.caption_of(0).as_deref(), Some("person: 0.9000"));
    assert_eq!(result.caption_of(1).as_deref(), Some("unknown: 0.8000"));
  }

  #[test]
  fn render_draws_on_a_copy() {
    let result = result(vec![candidate(30, 1, 0.9)]);
    let rendered = result.render();

    assert_eq!(*rendered.get_pixel(30, 10), Rgb([255, 0, 0]));
    assert_eq!(*result.image().get_pixel(30, 10), Rgb([10, 20, 30]));
    assert_eq!(result.into_rendered(), rendered);
  }
}
