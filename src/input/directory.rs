// 该文件是 IoTBike （单车守望） 项目的一部分。
// src/input/directory.rs - 目录图像输入
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
  collections::VecDeque,
  path::{Path, PathBuf},
};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum DirectoryInputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无法读取目录 {0}: {1}")]
  Io(String, std::io::Error),
}

/// 递归遍历目录，按路径顺序逐张解码；无法解码的文件被跳过
pub struct DirectoryInput {
  pending: VecDeque<PathBuf>,
}

fn collect(directory: &Path, files: &mut Vec<PathBuf>) -> Result<(), DirectoryInputError> {
  let entries = std::fs::read_dir(directory)
    .map_err(|e| DirectoryInputError::Io(directory.display().to_string(), e))?;

  for entry in entries {
    let path = entry
      .map_err(|e| DirectoryInputError::Io(directory.display().to_string(), e))?
      .path();
    if path.is_dir() {
      collect(&path, files)?;
    } else if path.is_file() {
      files.push(path);
    }
  }
  Ok(())
}

impl DirectoryInput {
  pub fn open(directory: impl AsRef<Path>) -> Result<Self, DirectoryInputError> {
    let directory = directory.as_ref();
    let mut files = Vec::new();
    collect(directory, &mut files)?;
    files.sort();
    info!("目录 {} 中共 {} 个文件", directory.display(), files.len());

    Ok(Self {
      pending: files.into(),
    })
  }

  /// 尚未读取的文件数
  pub fn remaining(&self) -> usize {
    self.pending.len()
  }
}

impl FromUrlWithScheme for DirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryInput {
  type Error = DirectoryInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DirectoryInputError::SchemeMismatch(url.scheme().to_string()));
    }
    Self::open(url.path())
  }
}

fn decode(path: &Path) -> Result<RgbImage, image::ImageError> {
  Ok(ImageReader::open(path)?.with_guessed_format()?.decode()?.into_rgb8())
}

impl Iterator for DirectoryInput {
  type Item = RgbImage;

  fn next(&mut self) -> Option<Self::Item> {
    while let Some(path) = self.pending.pop_front() {
      match decode(&path) {
        Ok(image) => {
          debug!("读取图像: {}", path.display());
          return Some(image);
        }
        Err(e) => warn!("跳过无法解码的文件 {}: {}", path.display(), e),
      }
    }
    None
  }
}
