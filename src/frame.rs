// 该文件是 IoTBike （单车守望） 项目的一部分。
// src/frame.rs - 帧与单槽帧缓冲
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

use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use image::RgbImage;
use tracing::trace;

/// 采集到的一帧图像
#[derive(Debug, Clone)]
pub struct Frame {
  pub image: RgbImage,
  /// 采集序号，从 0 开始
  pub index: u64,
  /// 采集时刻，Unix 毫秒
  pub timestamp_ms: i64,
}

impl Frame {
  pub fn new(image: RgbImage, index: u64) -> Self {
    Self {
      image,
      index,
      timestamp_ms: chrono::Utc::now().timestamp_millis(),
    }
  }
}

#[derive(Default)]
struct SlotState {
  latest: Option<Frame>,
  closed: bool,
  dropped: u64,
}

/// 只保存最新一帧的缓冲区
///
/// 生产者用 `publish` 覆盖旧帧，消费者用 `take` 取走整帧所有权，
/// 不会读到写了一半的图像。
#[derive(Clone, Default)]
pub struct FrameSlot {
  inner: Arc<(Mutex<SlotState>, Condvar)>,
}

impl FrameSlot {
  pub fn new() -> Self {
    Self::default()
  }

  // 持锁方只做指针交换，不会在持锁时 panic；中毒时直接沿用内部状态
  fn state(&self) -> MutexGuard<'_, SlotState> {
    self.inner.0.lock().unwrap_or_else(|e| e.into_inner())
  }

  pub fn publish(&self, frame: Frame) {
    let mut state = self.state();
    if state.closed {
      return;
    }
    if state.latest.replace(frame).is_some() {
      state.dropped += 1;
      trace!("覆盖未被取走的帧，累计丢弃 {}", state.dropped);
    }
    self.inner.1.notify_one();
  }

  /// 阻塞直到有新帧；缓冲区已关闭且为空时返回 `None`
  pub fn take(&self) -> Option<Frame> {
    let mut state = self.state();
    loop {
      if let Some(frame) = state.latest.take() {
        return Some(frame);
      }
      if state.closed {
        return None;
      }
      state = self
        .inner
        .1
        .wait(state)
        .unwrap_or_else(|e| e.into_inner());
    }
  }

  pub fn try_take(&self) -> Option<Frame> {
    self.state().latest.take()
  }

  /// 关闭后不再接受新帧，等待中的消费者被唤醒
  pub fn close(&self) {
    self.state().closed = true;
    self.inner.1.notify_all();
  }

  pub fn is_closed(&self) -> bool {
    self.state().closed
  }

  /// 被新帧覆盖而未被消费的帧数
  pub fn dropped(&self) -> u64 {
    self.state().dropped
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::thread;

  fn frame(index: u64) -> Frame {
    Frame::new(RgbImage::new(2, 2), index)
  }

  #[test]
  fn only_the_latest_frame_is_kept() {
    let slot = FrameSlot::new();
    slot.publish(frame(0));
    slot.publish(frame(1));
    slot.publish(frame(2));

    assert_eq!(slot.try_take().map(|f| f.index), Some(2));
    assert!(slot.try_take().is_none());
    assert_eq!(slot.dropped(), 2);
  }

  #[test]
  fn closed_slot_drains_then_ends() {
    let slot = FrameSlot::new();
    slot.publish(frame(7));
    slot.close();
    slot.publish(frame(8));

    assert!(slot.is_closed());
    assert_eq!(slot.take().map(|f| f.index), Some(7));
    assert!(slot.take().is_none());
  }

  #[test]
  fn take_waits_for_a_producer() {
    let slot = FrameSlot::new();
    let producer = {
      let slot = slot.clone();
      thread::spawn(move || {
        slot.publish(frame(3));
        slot.close();
      })
    };

    let first = slot.take();
    producer.join().unwrap();
    assert_eq!(first.map(|f| f.index), Some(3));
  }
}
