// 该文件是 IoTBike （单车守望） 项目的一部分。
// src/model.rs - 模型
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

use thiserror::Error;

use crate::output::draw::DrawError;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&mut self, input: Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 可以统计目标数量的推理结果
pub trait Detections {
  fn count(&self) -> usize;

  fn is_empty(&self) -> bool {
    self.count() == 0
  }
}

/// 检测网络的输出结构约定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectorFamily {
  /// 网格式检测器（Darknet/YOLO），每行 `[cx, cy, w, h, score_0, ...]`
  GridBased,
  /// 候选框式检测器（TensorFlow SSD 等），`[batch, 1, N, 7]`
  ProposalBased,
}

impl DetectorFamily {
  pub fn framework_tag(&self) -> &'static str {
    match self {
      DetectorFamily::GridBased => "dn",
      DetectorFamily::ProposalBased => "tf",
    }
  }
}

impl std::fmt::Display for DetectorFamily {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      DetectorFamily::GridBased => write!(f, "grid-based ({})", self.framework_tag()),
      DetectorFamily::ProposalBased => write!(f, "proposal-based ({})", self.framework_tag()),
    }
  }
}

/// 抑制前的单个检测假设
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
  pub rect: PixelRect,
  pub confidence: f32,
  pub class_id: usize,
}

/// `detect()` 路径上的错误
#[derive(Error, Debug)]
pub enum DetectError {
  #[error("配置错误: {0}")]
  Configuration(#[from] DescriptorError),
  #[error("类别表错误: {0}")]
  Catalog(#[from] CatalogError),
  #[error("推理错误: {0}")]
  Inference(#[from] InferenceError),
  #[error("张量解码错误: {0}")]
  Decode(#[from] DecodeError),
  #[error("不支持的检测器类型: {0}")]
  UnsupportedFamily(String),
  #[error("绘制配置错误: {0}")]
  Draw(#[from] DrawError),
}

pub mod bbox;
pub use self::bbox::{ImageShape, PixelRect};

mod catalog;
pub use self::catalog::{CatalogError, ClassCatalog};

mod descriptor;
pub use self::descriptor::{DescriptorError, ModelDescriptor, ModelFormat};

mod network;
pub use self::network::{
  BLOB_SCALE, BLOB_SIZE, Blob, DOWNSCALE_FACTOR, DOWNSCALE_ROW_LIMIT, InferenceError, Network,
  NetworkRunner, RawTensor,
};

#[cfg(feature = "opencv_dnn")]
mod opencv_dnn;
#[cfg(feature = "opencv_dnn")]
pub use self::opencv_dnn::OpenCvNetwork;

mod decode;
pub use self::decode::{DecodeError, TensorDecoder};

mod nms;
pub use self::nms::{DEFAULT_OVERLAP_THRESHOLD, Suppressed, Suppressor};

mod result;
pub use self::result::{DetectionResult, ResultError};

mod detector;
pub use self::detector::{DEFAULT_CONFIDENCE_THRESHOLD, Detector, DetectorBuilder, DetectorConfig};
