// 该文件是 IoTBike （单车守望） 项目的一部分。
// src/input/frame_grabber.rs - 后台帧采集
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
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread::{self, JoinHandle},
};

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::frame::{Frame, FrameSlot};

/// 在后台线程中不断读取来源，只保留最新一帧
///
/// 推理慢于采集时，中间的帧被直接覆盖。
pub struct FrameGrabber {
  slot: FrameSlot,
  stop: Arc<AtomicBool>,
  handle: Option<JoinHandle<()>>,
  last_index: Option<u64>,
}

impl FrameGrabber {
  pub fn spawn<S>(source: S) -> Self
  where
    S: Iterator<Item = RgbImage> + Send + 'static,
  {
    let slot = FrameSlot::new();
    let stop = Arc::new(AtomicBool::new(false));

    let handle = {
      let slot = slot.clone();
      let stop = stop.clone();
      thread::spawn(move || {
        info!("采集线程启动");
        for (index, image) in (0u64..).zip(source) {
          if stop.load(Ordering::Relaxed) {
            break;
          }
          slot.publish(Frame::new(image, index));
        }
        slot.close();
        info!("采集线程退出");
      })
    };

    Self {
      slot,
      stop,
      handle: Some(handle),
      last_index: None,
    }
  }

  /// 阻塞获取最新一帧，来源耗尽后返回 `None`
  pub fn next_frame(&mut self) -> Option<Frame> {
    let frame = self.slot.take()?;
    if let Some(last) = self.last_index
      && frame.index > last + 1
    {
      debug!("跳过 {} 帧", frame.index - last - 1);
    }
    self.last_index = Some(frame.index);
    Some(frame)
  }

  pub fn dropped(&self) -> u64 {
    self.slot.dropped()
  }

  pub fn stop(&mut self) {
    self.stop.store(true, Ordering::Relaxed);
    self.slot.close();
    if let Some(handle) = self.handle.take()
      && handle.join().is_err()
    {
      warn!("采集线程异常退出");
    }
  }
}

impl Iterator for FrameGrabber {
  type Item = RgbImage;

  fn next(&mut self) -> Option<Self::Item> {
    self.next_frame().map(|frame| frame.image)
  }
}

impl Drop for FrameGrabber {
  fn drop(&mut self) {
    self.stop();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn frames_arrive_in_order_and_the_stream_ends() {
    let source = (0..20u8).map(|i| RgbImage::from_pixel(1, 1, image::Rgb([i, 0, 0])));
    let mut grabber = FrameGrabber::spawn(source);

    let mut seen = Vec::new();
    while let Some(frame) = grabber.next_frame() {
      seen.push(frame.index);
    }

    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(seen.last(), Some(&19));
    assert_eq!(seen.len() as u64 + grabber.dropped(), 20);
  }

  #[test]
  fn dropping_stops_an_endless_source() {
    let source = std::iter::repeat_with(|| RgbImage::new(1, 1));
    let mut grabber = FrameGrabber::spawn(source);
    assert!(grabber.next().is_some());
    drop(grabber);
  }
}
