// 该文件是 IoTBike （单车守望） 项目的一部分。
// src/model/decode.rs - 原始张量解码
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

use ndarray::{ArrayView1, Axis, Ix2, s};
use thiserror::Error;
use tracing::{debug, error};

use crate::model::{Candidate, DetectorFamily, ImageShape, PixelRect, RawTensor};

/// 网格式输出每行的几何列数 `[cx, cy, w, h]`
const GRID_GEOMETRY: usize = 4;
/// 候选框式输出每行 `[image_id, class_id, confidence, x_min, y_min, x_max, y_max]`
const PROPOSAL_ROW: usize = 7;

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("没有可解码的张量")]
  NoTensor,
  #[error("{family} 输出形状 {shape:?} 无效，期望 {expected}")]
  Shape {
    family: DetectorFamily,
    shape: Vec<usize>,
    expected: &'static str,
  },
}

/// 按检测器类型把原始张量解码为像素坐标下的候选框
pub struct TensorDecoder;

impl TensorDecoder {
  /// 置信度严格大于 `threshold` 的行才会保留
  pub fn decode(
    raw: &[RawTensor],
    shape: ImageShape,
    family: DetectorFamily,
    threshold: f32,
  ) -> Result<Vec<Candidate>, DecodeError> {
    if raw.is_empty() {
      return Err(DecodeError::NoTensor);
    }

    let candidates = match family {
      DetectorFamily::GridBased => decode_grid(raw, shape, threshold)?,
      DetectorFamily::ProposalBased => decode_proposals(raw, shape, threshold)?,
    };

    debug!(
      "{} 解码得到 {} 个候选框 (阈值 {})",
      family,
      candidates.len(),
      threshold
    );
    Ok(candidates)
  }
}

fn shape_error(family: DetectorFamily, tensor: &RawTensor, expected: &'static str) -> DecodeError {
  error!("{} 输出形状不匹配: {:?}, 期望 {}", family, tensor.shape(), expected);
  DecodeError::Shape {
    family,
    shape: tensor.shape().to_vec(),
    expected,
  }
}

/// 取最大分数及其类别，分数相同时取较小的类别编号
fn best_class(scores: ArrayView1<f32>) -> Option<(usize, f32)> {
  let mut best: Option<(usize, f32)> = None;
  for (class_id, &score) in scores.iter().enumerate() {
    match best {
      Some((_, best_score)) if score <= best_score => {}
      _ => best = Some((class_id, score)),
    }
  }
  best
}

fn decode_grid(raw: &[RawTensor], shape: ImageShape, threshold: f32) -> Result<Vec<Candidate>, DecodeError> {
  const EXPECTED: &str = "[..., 4 + 类别数]";
  let family = DetectorFamily::GridBased;
  let (w, h) = (shape.width as f32, shape.height as f32);

  // 多个输出层按行拼接，列数必须一致
  let columns = raw[0].shape().last().copied().unwrap_or(0);
  if columns <= GRID_GEOMETRY {
    return Err(shape_error(family, &raw[0], EXPECTED));
  }

  let mut candidates = Vec::new();
  for tensor in raw {
    if tensor.ndim() < 2 || tensor.shape().last() != Some(&columns) {
      return Err(shape_error(family, tensor, EXPECTED));
    }

    for row in tensor.lanes(Axis(tensor.ndim() - 1)) {
      let Some((class_id, confidence)) = best_class(row.slice(s![GRID_GEOMETRY..])) else {
        continue;
      };

      if !(confidence > threshold) {
        continue;
      }

      let Some(rect) = PixelRect::from_center(row[0] * w, row[1] * h, row[2] * w, row[3] * h, shape) else {
        debug!("候选框落在图像之外，已忽略: {:?}", row);
        continue;
      };

      candidates.push(Candidate {
        rect,
        confidence,
        class_id,
      });
    }
  }

  Ok(candidates)
}

fn decode_proposals(raw: &[RawTensor], shape: ImageShape, threshold: f32) -> Result<Vec<Candidate>, DecodeError> {
  const EXPECTED: &str = "[batch, 1, N, 7]";
  let family = DetectorFamily::ProposalBased;
  let (w, h) = (shape.width as f32, shape.height as f32);

  // 只解码第一个输出的第一张图
  let tensor = &raw[0];
  let dims = tensor.shape();
  if dims.len() != 4 || dims[0] == 0 || dims[1] == 0 || dims[3] != PROPOSAL_ROW {
    return Err(shape_error(family, tensor, EXPECTED));
  }

  let rows = tensor
    .index_axis(Axis(0), 0)
    .index_axis_move(Axis(0), 0)
    .into_dimensionality::<Ix2>()
    .map_err(|_| shape_error(family, tensor, EXPECTED))?;

  let mut candidates = Vec::new();
  for row in rows.outer_iter() {
    let confidence = row[2];
    if !(confidence > threshold) {
      continue;
    }

    let Some(rect) = PixelRect::from_corners(row[3] * w, row[4] * h, row[5] * w, row[6] * h, shape) else {
      debug!("候选框落在图像之外，已忽略: {:?}", row);
      continue;
    };

    candidates.push(Candidate {
      rect,
      confidence,
      // 负数与 NaN 饱和为 0
      class_id: row[1] as usize,
    });
  }

  Ok(candidates)
}

#[cfg(test)]
mod tests {
  use super::*;
  use ndarray::{ArrayD, IxDyn};

  fn tensor(shape: &[usize], data: Vec<f32>) -> RawTensor {
    ArrayD::from_shape_vec(IxDyn(shape), data).unwrap()
  }

  #[test]
  fn grid_row_decodes_to_pixel_box() {
    let raw = [tensor(&[1, 6], vec![0.5, 0.5, 0.2, 0.2, 0.9, 0.05])];
    let candidates = TensorDecoder::decode(
      &raw,
      ImageShape::new(100, 100),
      DetectorFamily::GridBased,
      0.8,
    )
    .unwrap();

    assert_eq!(candidates.len(), 1);
    let c = candidates[0];
    assert_eq!(c.class_id, 0);
    assert!((c.confidence - 0.9).abs() < 1e-6);
    assert!((c.rect.x as i32 - 40).abs() <= 1);
    assert!((c.rect.y as i32 - 40).abs() <= 1);
    assert!((c.rect.width as i32 - 20).abs() <= 1);
    assert!((c.rect.height as i32 - 20).abs() <= 1);
  }

  #[test]
  fn proposal_row_decodes_to_pixel_box() {
    let raw = [tensor(&[1, 1, 1, 7], vec![0.0, 2.0, 0.95, 0.1, 0.1, 0.4, 0.4])];
    let candidates = TensorDecoder::decode(
      &raw,
      ImageShape::new(200, 200),
      DetectorFamily::ProposalBased,
      0.5,
    )
    .unwrap();

    assert_eq!(candidates.len(), 1);
    let c = candidates[0];
    assert_eq!(
      c.rect,
      PixelRect {
        x: 20,
        y: 20,
        width: 60,
        height: 60
      }
    );
    assert_eq!(c.class_id, 2);
    assert!((c.confidence - 0.95).abs() < 1e-6);
  }

  #[test]
  fn confidence_equal_to_threshold_is_excluded() {
    let grid = [tensor(&[1, 6], vec![0.5, 0.5, 0.2, 0.2, 0.5, 0.1])];
    let shape = ImageShape::new(100, 100);
    assert!(
      TensorDecoder::decode(&grid, shape, DetectorFamily::GridBased, 0.5)
        .unwrap()
        .is_empty()
    );

    let proposals = [tensor(&[1, 1, 1, 7], vec![0.0, 1.0, 0.5, 0.1, 0.1, 0.4, 0.4])];
    assert!(
      TensorDecoder::decode(&proposals, shape, DetectorFamily::ProposalBased, 0.5)
        .unwrap()
        .is_empty()
    );
  }

  #[test]
  fn grid_picks_highest_scoring_class() {
    let raw = [tensor(
      &[2, 7],
      vec![
        0.5, 0.5, 0.1, 0.1, 0.1, 0.2, 0.85, //
        0.2, 0.2, 0.1, 0.1, 0.9, 0.9, 0.1,
      ],
    )];
    let candidates =
      TensorDecoder::decode(&raw, ImageShape::new(100, 100), DetectorFamily::GridBased, 0.8).unwrap();

    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].class_id, 2);
    // 同分时取第一个类别
    assert_eq!(candidates[1].class_id, 0);
  }

  #[test]
  fn grid_outputs_are_stacked_in_order() {
    let raw = [
      tensor(&[1, 6], vec![0.25, 0.25, 0.1, 0.1, 0.95, 0.0]),
      tensor(&[2, 6], vec![
        0.75, 0.75, 0.1, 0.1, 0.0, 0.99, //
        0.5, 0.5, 0.1, 0.1, 0.1, 0.1,
      ]),
    ];
    let candidates =
      TensorDecoder::decode(&raw, ImageShape::new(400, 400), DetectorFamily::GridBased, 0.5).unwrap();

    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].class_id, 0);
    assert_eq!(candidates[0].rect.x, 80);
    assert_eq!(candidates[1].class_id, 1);
    assert_eq!(candidates[1].rect.x, 280);
  }

  #[test]
  fn decoding_is_deterministic() {
    let raw = [tensor(
      &[3, 6],
      vec![
        0.3, 0.3, 0.2, 0.2, 0.91, 0.0, //
        0.31, 0.31, 0.2, 0.2, 0.92, 0.0, //
        0.7, 0.6, 0.3, 0.1, 0.0, 0.93,
      ],
    )];
    let shape = ImageShape::new(321, 123);
    let first = TensorDecoder::decode(&raw, shape, DetectorFamily::GridBased, 0.5).unwrap();
    for _ in 0..10 {
      let again = TensorDecoder::decode(&raw, shape, DetectorFamily::GridBased, 0.5).unwrap();
      assert_eq!(first, again);
    }
  }

  #[test]
  fn proposals_only_read_first_image() {
    let raw = [tensor(
      &[2, 1, 2, 7],
      vec![
        0.0, 1.0, 0.9, 0.0, 0.0, 0.5, 0.5, //
        0.0, 3.0, 0.2, 0.0, 0.0, 0.5, 0.5, //
        1.0, 4.0, 0.99, 0.5, 0.5, 1.0, 1.0, //
        1.0, 5.0, 0.99, 0.5, 0.5, 1.0, 1.0,
      ],
    )];
    let candidates =
      TensorDecoder::decode(&raw, ImageShape::new(10, 10), DetectorFamily::ProposalBased, 0.3).unwrap();

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].class_id, 1);
  }

  #[test]
  fn out_of_image_boxes_are_clipped_or_dropped() {
    let raw = [tensor(
      &[1, 1, 2, 7],
      vec![
        0.0, 0.0, 0.9, -0.2, -0.2, 0.5, 0.5, //
        0.0, 0.0, 0.9, 1.1, 1.1, 1.5, 1.5,
      ],
    )];
    let candidates =
      TensorDecoder::decode(&raw, ImageShape::new(100, 100), DetectorFamily::ProposalBased, 0.5).unwrap();

    assert_eq!(candidates.len(), 1);
    assert_eq!(
      candidates[0].rect,
      PixelRect {
        x: 0,
        y: 0,
        width: 50,
        height: 50
      }
    );
  }

  #[test]
  fn malformed_shapes_are_rejected() {
    let shape = ImageShape::new(100, 100);

    let narrow = [tensor(&[2, 4], vec![0.0; 8])];
    assert!(matches!(
      TensorDecoder::decode(&narrow, shape, DetectorFamily::GridBased, 0.5),
      Err(DecodeError::Shape { .. })
    ));

    let mismatched = [tensor(&[1, 6], vec![0.0; 6]), tensor(&[1, 7], vec![0.0; 7])];
    assert!(matches!(
      TensorDecoder::decode(&mismatched, shape, DetectorFamily::GridBased, 0.5),
      Err(DecodeError::Shape { .. })
    ));

    let flat = [tensor(&[1, 7], vec![0.0; 7])];
    assert!(matches!(
      TensorDecoder::decode(&flat, shape, DetectorFamily::ProposalBased, 0.5),
      Err(DecodeError::Shape { .. })
    ));

    assert!(matches!(
      TensorDecoder::decode(&[], shape, DetectorFamily::ProposalBased, 0.5),
      Err(DecodeError::NoTensor)
    ));
  }
}
