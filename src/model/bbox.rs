// 该文件是 IoTBike （单车守望） 项目的一部分。
// src/model/bbox.rs - 边界框坐标转换
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

/// 图像尺寸（像素）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageShape {
  pub width: u32,
  pub height: u32,
}

impl ImageShape {
  pub fn new(width: u32, height: u32) -> Self {
    Self { width, height }
  }
}

impl From<&RgbImage> for ImageShape {
  fn from(image: &RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self { width, height }
  }
}

/// 像素坐标下的边界框，左上角 + 宽高
///
/// 构造时裁剪到图像范围内：`x + width <= 图像宽度`，`y + height <= 图像高度`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelRect {
  pub x: u32,
  pub y: u32,
  pub width: u32,
  pub height: u32,
}

impl PixelRect {
  /// 由中心点格式 `[cx, cy, w, h]`（像素）转换，坐标向零截断
  ///
  /// 半宽/半高先向下取整，还原的中心点与原值相差不超过 1 像素。
  pub fn from_center(cx: f32, cy: f32, w: f32, h: f32, shape: ImageShape) -> Option<Self> {
    let x = (cx - (w / 2.0).floor()) as i64;
    let y = (cy - (h / 2.0).floor()) as i64;
    Self::clipped(x, y, w as i64, h as i64, shape)
  }

  /// 由角点格式 `[x_min, y_min, x_max, y_max]`（像素）转换
  pub fn from_corners(x_min: f32, y_min: f32, x_max: f32, y_max: f32, shape: ImageShape) -> Option<Self> {
    let x = x_min as i64;
    let y = y_min as i64;
    let w = (x_max - x_min) as i64;
    let h = (y_max - y_min) as i64;
    Self::clipped(x, y, w, h, shape)
  }

  /// 裁剪到 `[0, width) x [0, height)`，面积为零时返回 `None`
  pub fn clipped(x: i64, y: i64, w: i64, h: i64, shape: ImageShape) -> Option<Self> {
    let (img_w, img_h) = (shape.width as i64, shape.height as i64);

    let x0 = x.clamp(0, img_w);
    let y0 = y.clamp(0, img_h);
    let x1 = x.saturating_add(w).clamp(0, img_w);
    let y1 = y.saturating_add(h).clamp(0, img_h);

    if x1 <= x0 || y1 <= y0 {
      return None;
    }

    Some(Self {
      x: x0 as u32,
      y: y0 as u32,
      width: (x1 - x0) as u32,
      height: (y1 - y0) as u32,
    })
  }

  // 字段是公开的，手工构造的框可能越过 u32 上界
  pub fn right(&self) -> u32 {
    self.x.saturating_add(self.width)
  }

  pub fn bottom(&self) -> u32 {
    self.y.saturating_add(self.height)
  }

  pub fn area(&self) -> u64 {
    self.width as u64 * self.height as u64
  }

  /// 中心点（像素）
  pub fn center(&self) -> (f32, f32) {
    (
      self.x as f32 + self.width as f32 / 2.0,
      self.y as f32 + self.height as f32 / 2.0,
    )
  }

  pub fn intersection(&self, other: &Self) -> u64 {
    let x0 = self.x.max(other.x);
    let y0 = self.y.max(other.y);
    let x1 = self.right().min(other.right());
    let y1 = self.bottom().min(other.bottom());

    if x1 <= x0 || y1 <= y0 {
      0
    } else {
      (x1 - x0) as u64 * (y1 - y0) as u64
    }
  }

  /// 交并比
  pub fn iou(&self, other: &Self) -> f32 {
    let intersection = self.intersection(other);
    let union = self.area() + other.area() - intersection;
    if union == 0 {
      0.0
    } else {
      intersection as f32 / union as f32
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SHAPE: ImageShape = ImageShape {
    width: 640,
    height: 480,
  };

  #[test]
  fn center_to_top_left() {
    let rect = PixelRect::from_center(50.0, 50.0, 20.0, 20.0, ImageShape::new(100, 100)).unwrap();
    assert_eq!(
      rect,
      PixelRect {
        x: 40,
        y: 40,
        width: 20,
        height: 20
      }
    );
  }

  #[test]
  fn corners_to_top_left() {
    let rect = PixelRect::from_corners(20.0, 20.0, 80.0, 80.0, ImageShape::new(200, 200)).unwrap();
    assert_eq!(
      rect,
      PixelRect {
        x: 20,
        y: 20,
        width: 60,
        height: 60
      }
    );
  }

  #[test]
  fn center_round_trip_within_one_pixel() {
    let centers = [
      (100.0, 100.0, 33.0, 17.0),
      (320.5, 240.25, 101.3, 55.7),
      (17.9, 401.1, 9.9, 21.3),
      (600.0, 300.0, 50.0, 80.0),
    ];
    for (cx, cy, w, h) in centers {
      let rect = PixelRect::from_center(cx, cy, w, h, SHAPE).unwrap();
      let (rx, ry) = rect.center();
      assert!((rx - cx).abs() <= 1.0, "cx {} -> {}", cx, rx);
      assert!((ry - cy).abs() <= 1.0, "cy {} -> {}", cy, ry);
    }
  }

  #[test]
  fn boxes_are_clipped_to_image() {
    let rect = PixelRect::from_center(5.0, 470.0, 40.0, 40.0, SHAPE).unwrap();
    assert_eq!(rect.x, 0);
    assert_eq!(rect.y, 450);
    assert_eq!(rect.right(), 25);
    assert_eq!(rect.bottom(), 480);
  }

  #[test]
  fn boxes_outside_image_are_dropped() {
    assert!(PixelRect::from_center(-50.0, -50.0, 20.0, 20.0, SHAPE).is_none());
    assert!(PixelRect::from_corners(700.0, 10.0, 720.0, 30.0, SHAPE).is_none());
    assert!(PixelRect::from_corners(10.0, 10.0, 10.0, 30.0, SHAPE).is_none());
  }

  #[test]
  fn iou_of_identical_and_disjoint_boxes() {
    let a = PixelRect {
      x: 10,
      y: 10,
      width: 20,
      height: 20,
    };
    let b = PixelRect {
      x: 100,
      y: 100,
      width: 20,
      height: 20,
    };
    assert_eq!(a.iou(&a), 1.0);
    assert_eq!(a.iou(&b), 0.0);
  }

  #[test]
  fn iou_of_half_overlap() {
    let a = PixelRect {
      x: 0,
      y: 0,
      width: 20,
      height: 10,
    };
    let b = PixelRect {
      x: 10,
      y: 0,
      width: 20,
      height: 10,
    };
    // 交集 100，并集 300
    assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
  }

  #[test]
  fn edges_near_the_u32_limit_saturate() {
    let far = PixelRect {
      x: u32::MAX - 1,
      y: u32::MAX - 1,
      width: 10,
      height: 10,
    };
    let near = PixelRect {
      x: u32::MAX - 5,
      y: u32::MAX - 5,
      width: 10,
      height: 10,
    };
    assert_eq!(far.right(), u32::MAX);
    assert_eq!(far.bottom(), u32::MAX);
    assert_eq!(far.intersection(&near), 1);
    assert!(far.iou(&near) > 0.0);
    let whole = PixelRect {
      x: 0,
      y: 0,
      width: 640,
      height: 480,
    };
    assert_eq!(far.iou(&whole), 0.0);
  }
}
