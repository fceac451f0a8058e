// 该文件是 IoTBike （单车守望） 项目的一部分。
// src/model/detector.rs - 检测器
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

use std::{path::PathBuf, sync::Arc};

use image::RgbImage;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl,
  model::{
    ClassCatalog, DEFAULT_OVERLAP_THRESHOLD, DescriptorError, DetectError, DetectionResult,
    DetectorFamily, ImageShape, Model, ModelDescriptor, Network, NetworkRunner, Suppressor,
    TensorDecoder,
  },
  output::draw::Draw,
};

#[cfg(feature = "opencv_dnn")]
use crate::model::OpenCvNetwork;

/// 默认置信度阈值
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
  pub threshold: f32,
  pub overlap_threshold: f32,
  /// 交换输入的 R/B 通道，`image` 读入的缓冲区已是 RGB，默认不交换
  pub swap_rb: bool,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
      swap_rb: false,
    }
  }
}

pub struct DetectorBuilder {
  descriptor: ModelDescriptor,
  config: DetectorConfig,
  font: Option<PathBuf>,
}

/// `model:///path/to/dir?catalog=...&threshold=0.6&font=/path/font.ttf`
impl FromUrl for DetectorBuilder {
  type Error = DetectError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let descriptor = ModelDescriptor::from_url(url)?;
    let mut builder = DetectorBuilder::new(descriptor);

    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "threshold" => {
          let threshold = value
            .parse::<f32>()
            .map_err(|e| DescriptorError::InvalidParameter("threshold", e.to_string()))?;
          builder = builder.threshold(threshold);
        }
        "overlap" => {
          let overlap = value
            .parse::<f32>()
            .map_err(|e| DescriptorError::InvalidParameter("overlap", e.to_string()))?;
          builder.config.overlap_threshold = overlap;
        }
        "swap_rb" => builder.config.swap_rb = value != "false",
        "font" => builder = builder.font(value.into_owned()),
        _ => {}
      }
    }

    Ok(builder)
  }
}

impl DetectorBuilder {
  pub fn new(descriptor: ModelDescriptor) -> Self {
    Self {
      descriptor,
      config: DetectorConfig::default(),
      font: None,
    }
  }

  pub fn descriptor(&self) -> &ModelDescriptor {
    &self.descriptor
  }

  pub fn config(mut self, config: DetectorConfig) -> Self {
    self.config = config;
    self
  }

  pub fn threshold(mut self, threshold: f32) -> Self {
    self.config.threshold = threshold;
    self
  }

  /// 命令行指定的阈值覆盖 URL 中的设置；`None` 时保持不变
  pub fn override_threshold(self, threshold: Option<f32>) -> Self {
    match threshold {
      Some(threshold) => self.threshold(threshold),
      None => self,
    }
  }

  /// 标签字体，未指定时使用内置字体
  pub fn font(mut self, path: impl Into<PathBuf>) -> Self {
    self.font = Some(path.into());
    self
  }

  /// 使用给定的网络构造检测器
  pub fn build_with<N: Network>(self, network: N) -> Result<Detector<N>, DetectError> {
    let family = self.descriptor.require_family().map_err(|e| {
      error!("{}", e);
      DetectError::UnsupportedFamily(format!("{:?}", self.descriptor.format()))
    })?;

    let catalog_path = self.descriptor.catalog_path().ok_or_else(|| {
      DescriptorError::NoCatalog(self.descriptor.directory().display().to_string())
    })?;
    let catalog = ClassCatalog::load(catalog_path)?;
    info!("加载类别表: {} 个类别", catalog.len());

    let draw = match &self.font {
      Some(path) => Draw::with_font_file(path)?,
      None => Draw::default(),
    };
    if !draw.has_font() {
      warn!("没有可用字体，只绘制检测框");
    }

    info!("检测器类型: {}", family);
    debug!("检测器参数: {:?}", self.config);

    Ok(Detector {
      runner: NetworkRunner::new(network).swap_rb(self.config.swap_rb),
      family,
      catalog,
      draw: Arc::new(draw),
      suppressor: Suppressor::new(self.config.overlap_threshold),
      config: self.config,
    })
  }

  /// 通过 OpenCV DNN 加载模型目录中的网络
  #[cfg(feature = "opencv_dnn")]
  pub fn build(self) -> Result<Detector<OpenCvNetwork>, DetectError> {
    let network = OpenCvNetwork::load(&self.descriptor)?;
    self.build_with(network)
  }
}

/// 预处理、前向推理、解码与抑制的完整流程
pub struct Detector<N> {
  runner: NetworkRunner<N>,
  family: DetectorFamily,
  catalog: ClassCatalog,
  draw: Arc<Draw>,
  suppressor: Suppressor,
  config: DetectorConfig,
}

impl<N: Network> Detector<N> {
  pub fn family(&self) -> DetectorFamily {
    self.family
  }

  pub fn catalog(&self) -> &ClassCatalog {
    &self.catalog
  }

  pub fn config(&self) -> &DetectorConfig {
    &self.config
  }

  /// 检测一帧图像，框坐标相对于传入图像
  pub fn detect(&mut self, image: RgbImage, threshold: f32) -> Result<DetectionResult, DetectError> {
    let shape = ImageShape::from(&image);
    let (raw, elapsed) = self.runner.forward(&image)?;

    let candidates = TensorDecoder::decode(&raw, shape, self.family, threshold)?;
    let decoded = candidates.len();
    let kept = self.suppressor.filter(candidates, threshold);
    debug!("解码 {} 个候选框，保留 {} 个", decoded, kept.len());

    Ok(DetectionResult::new(
      kept,
      image,
      elapsed,
      self.catalog.clone(),
      self.draw.clone(),
    ))
  }
}

impl<N: Network> Model for Detector<N> {
  type Input = RgbImage;
  type Output = DetectionResult;
  type Error = DetectError;

  fn infer(&mut self, input: Self::Input) -> Result<Self::Output, Self::Error> {
    let threshold = self.config.threshold;
    self.detect(input, threshold)
  }
}
