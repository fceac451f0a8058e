// 该文件是 IoTBike （单车守望） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::path::Path;

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像解码错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 单张图像，迭代一次后结束
pub struct ImageFileInput {
  image: Option<RgbImage>,
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref();
    info!("读取图像文件: {}", path.display());
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;

    Ok(Self {
      image: Some(image.into_rgb8()),
    })
  }
}

impl From<RgbImage> for ImageFileInput {
  fn from(image: RgbImage) -> Self {
    Self { image: Some(image) }
  }
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemeMismatch(url.scheme().to_string()));
    }

    Self::open(url.path())
  }
}

impl Iterator for ImageFileInput {
  type Item = RgbImage;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn yields_the_image_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bike.png");
    RgbImage::from_pixel(8, 6, Rgb([1, 2, 3])).save(&path).unwrap();

    let url = Url::parse(&format!("image://{}", path.display())).unwrap();
    let mut input = ImageFileInput::from_url(&url).unwrap();

    let image = input.next().unwrap();
    assert_eq!(image.dimensions(), (8, 6));
    assert_eq!(*image.get_pixel(0, 0), Rgb([1, 2, 3]));
    assert!(input.next().is_none());
  }

  #[test]
  fn missing_file_and_wrong_scheme_fail() {
    assert!(matches!(
      ImageFileInput::open("/nonexistent/bike.png"),
      Err(ImageFileInputError::IoError(_))
    ));

    let url = Url::parse("folder:///tmp").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemeMismatch(_))
    ));
  }
}
