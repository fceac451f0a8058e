// 该文件是 IoTBike （单车守望） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, error};

use crate::model::PixelRect;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_VERTICAL_OFFSET: i32 = 5;
const BOX_COLOR: [u8; 3] = [255, 0, 0]; // 红色
const BOX_THICKNESS: u32 = 2;

// DejaVu Sans，许可见 assets/font-LICENSE
const DEFAULT_FONT: &[u8] = include_bytes!("../../assets/font.ttf");

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("无法读取字体文件 {0}: {1}")]
  Io(String, std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(String),
}

/// 边框与标签绘制工具
pub struct Draw {
  font: Option<FontArc>,
  font_scale: PxScale,
  color: Rgb<u8>,
  thickness: u32,
}

impl Default for Draw {
  fn default() -> Self {
    match FontArc::try_from_slice(DEFAULT_FONT) {
      Ok(font) => Self {
        font: Some(font),
        ..Self::without_font()
      },
      Err(e) => {
        error!("内置字体无效，标签文字将不会绘制: {}", e);
        Draw::without_font()
      }
    }
  }
}

impl Draw {
  /// 只绘制边框
  pub fn without_font() -> Self {
    Self {
      font: None,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
      color: Rgb(BOX_COLOR),
      thickness: BOX_THICKNESS,
    }
  }

  pub fn with_font_file(path: impl AsRef<Path>) -> Result<Self, DrawError> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| DrawError::Io(path.display().to_string(), e))?;
    let font =
      FontArc::try_from_vec(data).map_err(|_| DrawError::InvalidFont(path.display().to_string()))?;

    debug!("使用字体: {}", path.display());

    Ok(Self {
      font: Some(font),
      ..Self::without_font()
    })
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  /// 绘制边框并在其上方写标签
  pub fn draw_box(&self, image: &mut RgbImage, rect: &PixelRect, label: &str) {
    if rect.width == 0 || rect.height == 0 {
      return;
    }

    // 由外向内逐像素加粗
    for t in 0..self.thickness {
      let (w, h) = (
        rect.width.saturating_sub(2 * t),
        rect.height.saturating_sub(2 * t),
      );
      if w == 0 || h == 0 {
        break;
      }
      let r = Rect::at((rect.x + t) as i32, (rect.y + t) as i32).of_size(w, h);
      draw_hollow_rect_mut(image, r, self.color);
    }

    if let Some(font) = &self.font {
      let text_y = (rect.y as i32 - self.font_scale.y as i32 - LABEL_VERTICAL_OFFSET).max(0);
      draw_text_mut(
        image,
        self.color,
        rect.x as i32,
        text_y,
        self.font_scale,
        font,
        label,
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn box_edges_are_painted() {
    let mut image = RgbImage::new(50, 50);
    let rect = PixelRect {
      x: 10,
      y: 10,
      width: 20,
      height: 20,
    };
    Draw::without_font().draw_box(&mut image, &rect, "person: 0.9000");

    assert_eq!(*image.get_pixel(10, 10), Rgb(BOX_COLOR));
    assert_eq!(*image.get_pixel(11, 20), Rgb(BOX_COLOR));
    assert_eq!(*image.get_pixel(29, 29), Rgb(BOX_COLOR));
    assert_eq!(*image.get_pixel(20, 20), Rgb([0, 0, 0]));
    assert_eq!(*image.get_pixel(40, 40), Rgb([0, 0, 0]));
  }

  #[test]
  fn thin_boxes_do_not_panic() {
    let mut image = RgbImage::new(10, 10);
    let rect = PixelRect {
      x: 9,
      y: 0,
      width: 1,
      height: 10,
    };
    Draw::without_font().draw_box(&mut image, &rect, "x");
    assert_eq!(*image.get_pixel(9, 5), Rgb(BOX_COLOR));
  }

  #[test]
  fn default_draws_the_caption_above_the_box() {
    let draw = Draw::default();
    assert!(draw.has_font());

    let mut image = RgbImage::new(120, 80);
    let rect = PixelRect {
      x: 10,
      y: 40,
      width: 60,
      height: 30,
    };
    draw.draw_box(&mut image, &rect, "person: 0.9000");

    let caption_pixels = (0..rect.y)
      .flat_map(|y| (0..image.width()).map(move |x| (x, y)))
      .filter(|&(x, y)| image.get_pixel(x, y)[0] > 0)
      .count();
    assert!(caption_pixels > 20);
  }

  #[test]
  fn missing_font_file_is_an_error() {
    assert!(matches!(
      Draw::with_font_file("/nonexistent/font.ttf"),
      Err(DrawError::Io(..))
    ));
  }
}
