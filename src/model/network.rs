// 该文件是 IoTBike （单车守望） 项目的一部分。
// src/model/network.rs - 网络前向推理
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
  borrow::Cow,
  time::{Duration, Instant},
};

use image::{RgbImage, imageops::FilterType};
use ndarray::{Array4, ArrayD};
use thiserror::Error;
use tracing::debug;

/// 网络输入边长（正方形）
pub const BLOB_SIZE: u32 = 416;
/// 像素值缩放系数
pub const BLOB_SCALE: f32 = 1.0 / 255.0;
/// 高于该行数的图像先整体缩小，限制大帧的计算量
pub const DOWNSCALE_ROW_LIMIT: u32 = 1080;
/// 大帧缩小系数
pub const DOWNSCALE_FACTOR: f32 = 0.2;

/// 前向推理得到的原始张量，形状与含义由检测器类型决定
pub type RawTensor = ArrayD<f32>;

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("网络未加载或为空: {0}")]
  EmptyNetwork(String),
  #[error("网络没有输出")]
  NoOutput,
  #[error("网络输入无效: {0}")]
  InvalidInput(String),
  #[error("网络输出无效: {0}")]
  MalformedOutput(String),
  #[error("推理后端错误: {0}")]
  Backend(String),
  #[cfg(feature = "opencv_dnn")]
  #[error("OpenCV 错误: {0}")]
  OpenCv(#[from] opencv::Error),
}

/// 归一化后的网络输入，NCHW，`[1, 3, 416, 416]`
#[derive(Debug, Clone)]
pub struct Blob {
  tensor: Array4<f32>,
}

impl Blob {
  /// 缩放到 416x416 并归一化到 `[0, 1]`；`swap_rb` 交换第一与第三通道
  pub fn from_image(image: &RgbImage, swap_rb: bool) -> Self {
    let resized = image::imageops::resize(image, BLOB_SIZE, BLOB_SIZE, FilterType::Triangle);
    let size = BLOB_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for (x, y, pixel) in resized.enumerate_pixels() {
      for c in 0..3 {
        let src = if swap_rb { 2 - c } else { c };
        tensor[[0, c, y as usize, x as usize]] = pixel[src] as f32 * BLOB_SCALE;
      }
    }

    Blob { tensor }
  }

  pub fn tensor(&self) -> &Array4<f32> {
    &self.tensor
  }

  pub fn shape(&self) -> &[usize] {
    self.tensor.shape()
  }
}

/// 前向推理原语：输入 blob，输出一个或多个原始张量
pub trait Network {
  fn forward(&mut self, blob: &Blob) -> Result<Vec<RawTensor>, InferenceError>;
}

impl<N: Network + ?Sized> Network for Box<N> {
  fn forward(&mut self, blob: &Blob) -> Result<Vec<RawTensor>, InferenceError> {
    (**self).forward(blob)
  }
}

/// 持有网络，负责预处理与计时
pub struct NetworkRunner<N> {
  network: N,
  swap_rb: bool,
}

impl<N: Network> NetworkRunner<N> {
  pub fn new(network: N) -> Self {
    Self {
      network,
      swap_rb: false,
    }
  }

  pub fn swap_rb(mut self, swap_rb: bool) -> Self {
    self.swap_rb = swap_rb;
    self
  }

  /// 过高的图像按固定系数缩小
  pub fn downscale(image: &RgbImage) -> Cow<'_, RgbImage> {
    if image.height() <= DOWNSCALE_ROW_LIMIT {
      return Cow::Borrowed(image);
    }

    let width = ((image.width() as f32 * DOWNSCALE_FACTOR).round() as u32).max(1);
    let height = ((image.height() as f32 * DOWNSCALE_FACTOR).round() as u32).max(1);
    debug!(
      "图像高度 {} 超过 {}，缩小到 {}x{}",
      image.height(),
      DOWNSCALE_ROW_LIMIT,
      width,
      height
    );
    Cow::Owned(image::imageops::resize(
      image,
      width,
      height,
      FilterType::Triangle,
    ))
  }

  pub fn preprocess(&self, image: &RgbImage) -> Blob {
    let image = Self::downscale(image);
    Blob::from_image(&image, self.swap_rb)
  }

  /// 执行一次前向推理，返回原始张量与推理耗时（不含预处理）
  pub fn forward(&mut self, image: &RgbImage) -> Result<(Vec<RawTensor>, Duration), InferenceError> {
    if image.width() == 0 || image.height() == 0 {
      return Err(InferenceError::InvalidInput(format!(
        "图像尺寸为 {}x{}",
        image.width(),
        image.height()
      )));
    }

    let blob = self.preprocess(image);

    let now = Instant::now();
    let outputs = self.network.forward(&blob)?;
    let elapsed = now.elapsed();

    if outputs.is_empty() {
      return Err(InferenceError::NoOutput);
    }

    debug!(
      "前向推理完成，耗时: {:.2?}，输出形状: {:?}",
      elapsed,
      outputs.iter().map(|t| t.shape().to_vec()).collect::<Vec<_>>()
    );

    Ok((outputs, elapsed))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;
  use ndarray::IxDyn;

  struct Recorder {
    shapes: Vec<Vec<usize>>,
    outputs: usize,
  }

  impl Network for Recorder {
    fn forward(&mut self, blob: &Blob) -> Result<Vec<RawTensor>, InferenceError> {
      self.shapes.push(blob.shape().to_vec());
      Ok(
        (0..self.outputs)
          .map(|_| ArrayD::zeros(IxDyn(&[1, 6])))
          .collect(),
      )
    }
  }

  #[test]
  fn blob_is_normalized_nchw() {
    let image = RgbImage::from_pixel(32, 24, Rgb([255, 0, 51]));
    let blob = Blob::from_image(&image, false);

    assert_eq!(blob.shape(), &[1, 3, 416, 416]);
    let t = blob.tensor();
    // 线性插值可能带来 1 个灰度级的误差
    assert!((t[[0, 0, 100, 100]] - 1.0).abs() < 5e-3);
    assert!(t[[0, 1, 100, 100]].abs() < 5e-3);
    assert!((t[[0, 2, 100, 100]] - 0.2).abs() < 5e-3);
    assert!(t.iter().all(|v| (0.0..=1.0).contains(v)));
  }

  #[test]
  fn blob_swaps_red_and_blue() {
    let image = RgbImage::from_pixel(8, 8, Rgb([255, 0, 0]));
    let blob = Blob::from_image(&image, true);
    let t = blob.tensor();
    assert!(t[[0, 0, 3, 3]].abs() < 5e-3);
    assert!((t[[0, 2, 3, 3]] - 1.0).abs() < 5e-3);
  }

  #[test]
  fn tall_images_are_downscaled() {
    let tall = RgbImage::new(1920, 1200);
    let small = NetworkRunner::<Recorder>::downscale(&tall);
    assert_eq!(small.dimensions(), (384, 240));

    let hd = RgbImage::new(1920, 1080);
    assert!(matches!(NetworkRunner::<Recorder>::downscale(&hd), Cow::Borrowed(_)));
  }

  #[test]
  fn forward_passes_blob_and_returns_outputs() {
    let mut runner = NetworkRunner::new(Recorder {
      shapes: Vec::new(),
      outputs: 2,
    });
    let (outputs, _elapsed) = runner.forward(&RgbImage::new(64, 48)).unwrap();

    assert_eq!(outputs.len(), 2);
    assert_eq!(runner.network.shapes, vec![vec![1, 3, 416, 416]]);
  }

  #[test]
  fn forward_without_outputs_fails() {
    let mut runner = NetworkRunner::new(Recorder {
      shapes: Vec::new(),
      outputs: 0,
    });
    assert!(matches!(
      runner.forward(&RgbImage::new(64, 48)),
      Err(InferenceError::NoOutput)
    ));
    assert!(matches!(
      runner.forward(&RgbImage::new(0, 0)),
      Err(InferenceError::InvalidInput(_))
    ));
  }
}
