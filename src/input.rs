// 该文件是 IoTBike （单车守望） 项目的一部分。
// src/input.rs - 图像输入
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

use image::RgbImage;
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

mod directory;
pub use self::directory::{DirectoryInput, DirectoryInputError};

mod frame_grabber;
pub use self::frame_grabber::FrameGrabber;

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("图像文件输入错误: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[error("目录输入错误: {0}")]
  DirectoryInputError(#[from] DirectoryInputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum InputWrapper {
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInput),
  Directory(DirectoryInput),
  /// `?live` 时由后台线程采集，只交付最新帧
  Live(FrameGrabber),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let live = url.query_pairs().any(|(k, _)| k == "live");

    let input = match url.scheme() {
      #[cfg(feature = "read_image_file")]
      ImageFileInput::SCHEME => InputWrapper::ReadImageFile(ImageFileInput::from_url(url)?),
      DirectoryInput::SCHEME => InputWrapper::Directory(DirectoryInput::from_url(url)?),
      other => return Err(InputError::SchemeMismatch(other.to_string())),
    };

    Ok(if live { input.live() } else { input })
  }
}

impl InputWrapper {
  /// 转为后台采集
  pub fn live(self) -> Self {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => InputWrapper::Live(FrameGrabber::spawn(input)),
      InputWrapper::Directory(input) => InputWrapper::Live(FrameGrabber::spawn(input)),
      live @ InputWrapper::Live(_) => live,
    }
  }
}

impl Iterator for InputWrapper {
  type Item = RgbImage;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.next(),
      InputWrapper::Directory(input) => input.next(),
      InputWrapper::Live(input) => input.next(),
    }
  }
}
