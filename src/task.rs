// 该文件是 IoTBike （单车守望） 项目的一部分。
// src/task.rs - 任务循环
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
  thread,
  time::{Duration, Instant},
};

use chrono::Local;
use tracing::{info, warn};

use crate::{
  model::{Detections, Model},
  output::Render,
};

/// 默认处理帧率
pub const DEFAULT_FRAME_RATE: f64 = 30.0;

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

pub struct OneShotTask;

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = Instant::now();
    let result = model.infer(frame)?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());
    output.render_result(&result)?;
    info!("渲染完成，总耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 对同一帧重复推理，统计平均耗时
pub struct RepeatShotTask {
  repeat: usize,
  warmup: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self {
      repeat: 1000,
      warmup: 2,
    }
  }
}

impl RepeatShotTask {
  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat.max(1);
    self
  }

  /// 统计时忽略的前若干次
  pub fn with_warmup(mut self, warmup: usize) -> Self {
    self.warmup = warmup;
    self
  }
}

impl<
  F: Clone,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<D, Error = RE>,
> Task<I, M, O> for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let mut times = Vec::with_capacity(self.repeat);
    for i in 0..self.repeat {
      let now = Instant::now();
      let result = model.infer(frame.clone())?;
      let elapsed = now.elapsed();
      info!("({})推理完成，耗时: {:.2?}", i, elapsed);
      output.render_result(&result)?;
      times.push(elapsed);
    }

    let measured = skip_warmup(&times, self.warmup);
    warn!(
      "平均推理时间: {:.2?} ({} 次)",
      mean(measured),
      measured.len()
    );

    Ok(())
  }
}

/// 次数不够时不跳过
fn skip_warmup(times: &[Duration], warmup: usize) -> &[Duration] {
  if times.len() > warmup {
    &times[warmup..]
  } else {
    times
  }
}

fn mean(times: &[Duration]) -> Duration {
  if times.is_empty() {
    return Duration::ZERO;
  }
  times.iter().sum::<Duration>() / times.len() as u32
}

/// 连续帧上的目标出现状态变化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceEvent {
  Idle,
  /// 连续若干帧检测到目标
  Raised,
  /// 报警后首次没有目标
  Cleared,
}

/// 连续 `consecutive` 帧有目标才报警，避免单帧误检
#[derive(Debug, Clone)]
pub struct PresenceDebouncer {
  consecutive: usize,
  streak: usize,
  raised: bool,
}

impl PresenceDebouncer {
  pub fn new(consecutive: usize) -> Self {
    Self {
      consecutive: consecutive.max(1),
      streak: 0,
      raised: false,
    }
  }

  pub fn observe(&mut self, count: usize) -> PresenceEvent {
    if count == 0 {
      self.streak = 0;
      if std::mem::take(&mut self.raised) {
        return PresenceEvent::Cleared;
      }
      return PresenceEvent::Idle;
    }

    self.streak = self.streak.saturating_add(1);
    if !self.raised && self.streak >= self.consecutive {
      self.raised = true;
      return PresenceEvent::Raised;
    }
    PresenceEvent::Idle
  }

  pub fn is_raised(&self) -> bool {
    self.raised
  }
}

#[derive(Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  frame_interval: Option<Duration>,
  consecutive: usize,
}

impl Default for ContinuousTask {
  fn default() -> Self {
    Self {
      frame_number: None,
      frame_interval: Some(Duration::from_secs_f64(1.0 / DEFAULT_FRAME_RATE)),
      consecutive: 1,
    }
  }
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 帧率上限，非正数表示不限制
  pub fn with_frame_rate(mut self, frame_rate: f64) -> Self {
    self.frame_interval = (frame_rate > 0.0).then(|| Duration::from_secs_f64(1.0 / frame_rate));
    self
  }

  pub fn with_consecutive(mut self, consecutive: usize) -> Self {
    self.consecutive = consecutive;
    self
  }
}

impl<
  F,
  D: Detections,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<D, Error = RE>,
> Task<I, M, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = std::sync::mpsc::channel();

    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;

    let mut debouncer = PresenceDebouncer::new(self.consecutive);
    let mut frame_index = 0usize;
    for frame in input {
      let started = Instant::now();
      frame_index = frame_index.wrapping_add(1);
      info!("处理第 {} 帧图像", frame_index);

      let result = model.infer(frame)?;
      let elapsed_a = started.elapsed();
      output.render_result(&result)?;
      let elapsed_b = started.elapsed();
      info!("推理完成，耗时: {:.2?} / {:.2?}", elapsed_a, elapsed_b);

      match debouncer.observe(result.count()) {
        PresenceEvent::Raised => warn!(
          "{} 连续 {} 帧检测到目标，当前 {} 个",
          Local::now().format("%Y-%m-%d %H:%M:%S"),
          self.consecutive,
          result.count()
        ),
        PresenceEvent::Cleared => info!("{} 目标离开", Local::now().format("%Y-%m-%d %H:%M:%S")),
        PresenceEvent::Idle => {}
      }

      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
      if let Some(interval) = self.frame_interval {
        let spent = started.elapsed();
        if spent < interval {
          thread::sleep(interval - spent);
        }
      }
    }

    info!("任务完成，退出");
    Ok(())
  }
}
