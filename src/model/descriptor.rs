// 该文件是 IoTBike （单车守望） 项目的一部分。
// src/model/descriptor.rs - 模型目录解析
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, model::DetectorFamily};

const CONFIG_EXTENSIONS: [&str; 4] = ["prototxt", "pbtxt", "cfg", "xml"];
const CATALOG_EXTENSION: &str = "names";

#[derive(Error, Debug)]
pub enum DescriptorError {
  #[error("URI 方案不匹配: 期望 '{0}', 实际 '{1}'")]
  SchemeMismatch(&'static str, String),
  #[error("无法读取模型目录 {0}: {1}")]
  Io(String, std::io::Error),
  #[error("模型目录中没有可识别的模型文件: {0}")]
  NoModel(String),
  #[error("模型目录中存在多个{0}文件: {1} 与 {2}")]
  Ambiguous(&'static str, String, String),
  #[error("模型格式 {0:?} 没有对应的检测器类型")]
  UnsupportedFormat(ModelFormat),
  #[error("没有指定类别文件: {0}")]
  NoCatalog(String),
  #[error("参数 {0} 无效: {1}")]
  InvalidParameter(&'static str, String),
}

/// 按扩展名识别的模型文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
  Caffe,
  TensorFlow,
  Torch,
  Darknet,
  OpenVino,
  Onnx,
}

impl ModelFormat {
  pub fn from_extension(ext: &str) -> Option<Self> {
    match ext {
      "caffemodel" => Some(ModelFormat::Caffe),
      "pb" => Some(ModelFormat::TensorFlow),
      "t7" | "net" => Some(ModelFormat::Torch),
      "weights" => Some(ModelFormat::Darknet),
      "bin" => Some(ModelFormat::OpenVino),
      "onnx" => Some(ModelFormat::Onnx),
      _ => None,
    }
  }

  /// 只有 TensorFlow 与 Darknet 两类输出有解码实现
  pub fn family(&self) -> Option<DetectorFamily> {
    match self {
      ModelFormat::TensorFlow => Some(DetectorFamily::ProposalBased),
      ModelFormat::Darknet => Some(DetectorFamily::GridBased),
      _ => None,
    }
  }
}

/// 模型目录的解析结果
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
  directory: PathBuf,
  model: PathBuf,
  format: ModelFormat,
  config: Option<PathBuf>,
  catalog: Option<PathBuf>,
}

impl ModelDescriptor {
  /// 扫描模型目录，按扩展名识别模型、配置与类别文件
  pub fn scan(directory: impl AsRef<Path>) -> Result<Self, DescriptorError> {
    let directory = directory.as_ref();
    let dir_name = directory.display().to_string();
    info!("扫描模型目录: {}", dir_name);

    let mut entries = std::fs::read_dir(directory)
      .map_err(|e| DescriptorError::Io(dir_name.clone(), e))?
      .map(|entry| entry.map(|e| e.path()))
      .collect::<Result<Vec<_>, _>>()
      .map_err(|e| DescriptorError::Io(dir_name.clone(), e))?;
    // 目录遍历顺序不固定
    entries.sort();

    let mut model: Option<(PathBuf, ModelFormat)> = None;
    let mut config: Option<PathBuf> = None;
    let mut catalog: Option<PathBuf> = None;

    for path in entries.into_iter().filter(|p| p.is_file()) {
      let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        continue;
      };

      if let Some(format) = ModelFormat::from_extension(ext) {
        debug!("模型文件: {} ({:?})", path.display(), format);
        if let Some((previous, _)) = &model {
          return Err(ambiguous("模型", previous, &path));
        }
        model = Some((path, format));
      } else if CONFIG_EXTENSIONS.contains(&ext) {
        debug!("配置文件: {}", path.display());
        if let Some(previous) = &config {
          return Err(ambiguous("配置", previous, &path));
        }
        config = Some(path);
      } else if ext == CATALOG_EXTENSION && catalog.is_none() {
        debug!("类别文件: {}", path.display());
        catalog = Some(path);
      }
    }

    let Some((model, format)) = model else {
      error!("模型目录中没有可识别的模型文件: {}", dir_name);
      return Err(DescriptorError::NoModel(dir_name));
    };

    info!(
      "模型: {}, 配置: {}",
      model.display(),
      config
        .as_deref()
        .map(|c| c.display().to_string())
        .unwrap_or_else(|| "无".to_string())
    );

    Ok(ModelDescriptor {
      directory: directory.to_path_buf(),
      model,
      format,
      config,
      catalog,
    })
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  pub fn model_path(&self) -> &Path {
    &self.model
  }

  pub fn config_path(&self) -> Option<&Path> {
    self.config.as_deref()
  }

  pub fn catalog_path(&self) -> Option<&Path> {
    self.catalog.as_deref()
  }

  pub fn format(&self) -> ModelFormat {
    self.format
  }

  /// 检测器类型；`None` 表示该格式没有解码实现
  pub fn family(&self) -> Option<DetectorFamily> {
    self.format.family()
  }

  pub fn require_family(&self) -> Result<DetectorFamily, DescriptorError> {
    self
      .family()
      .ok_or(DescriptorError::UnsupportedFormat(self.format))
  }

  /// 覆盖目录中的类别文件
  pub fn with_catalog(mut self, path: impl Into<PathBuf>) -> Self {
    self.catalog = Some(path.into());
    self
  }
}

fn ambiguous(kind: &'static str, a: &Path, b: &Path) -> DescriptorError {
  error!("模型目录中存在多个{}文件: {} 与 {}", kind, a.display(), b.display());
  DescriptorError::Ambiguous(kind, a.display().to_string(), b.display().to_string())
}

impl FromUrlWithScheme for ModelDescriptor {
  const SCHEME: &'static str = "model";
}

/// `model:///path/to/dir?catalog=/path/to/coco.names`
impl FromUrl for ModelDescriptor {
  type Error = DescriptorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DescriptorError::SchemeMismatch(
        Self::SCHEME,
        url.scheme().to_string(),
      ));
    }

    let descriptor = ModelDescriptor::scan(url.path())?;
    let catalog = url
      .query_pairs()
      .find(|(k, _)| k == "catalog")
      .map(|(_, v)| v.into_owned());

    Ok(match catalog {
      Some(path) => descriptor.with_catalog(path),
      None => descriptor,
    })
  }
}
