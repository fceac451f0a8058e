// 该文件是 IoTBike （单车守望） 项目的一部分。
// src/bin/watch.rs - 连续监视
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use url::Url;

use iotbike::{
  FromUrl,
  input::InputWrapper,
  model::DetectorBuilder,
  output::OutputWrapper,
  task::{ContinuousTask, DEFAULT_FRAME_RATE, Task},
};
use tracing::info;

/// 单车守望：连续检测并在目标持续出现时报警
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型目录，例如 model:///opt/models/yolov7-tiny
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，例如 folder:///data/frames?live
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，例如 folder:///var/iotbike?record=name
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 置信度阈值，缺省时使用模型 URL 中的 threshold，否则为 0.8
  #[arg(long)]
  pub threshold: Option<f32>,
  /// 处理帧率上限，0 表示不限制
  #[arg(long, default_value_t = DEFAULT_FRAME_RATE)]
  pub frame_rate: f64,
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
  /// 连续多少帧有目标才报警
  #[arg(long, default_value_t = 3)]
  pub consecutive: usize,
  /// 标签字体文件
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型目录: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input = InputWrapper::from_url(&args.input)?;
  let mut builder = DetectorBuilder::from_url(&args.model)?.override_threshold(args.threshold);
  if let Some(font) = args.font {
    builder = builder.font(font);
  }
  let model = builder.build()?;
  let output = OutputWrapper::from_url(&args.output)?;

  ContinuousTask::default()
    .with_frame_number(args.frame_number)
    .with_frame_rate(args.frame_rate)
    .with_consecutive(args.consecutive)
    .run_task(input, model, output)?;

  Ok(())
}
