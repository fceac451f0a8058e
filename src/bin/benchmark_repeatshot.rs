// 该文件是 IoTBike （单车守望） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 重复推理测速
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use iotbike::{
  FromUrl,
  input::InputWrapper,
  model::DetectorBuilder,
  output::OutputWrapper,
  task::{RepeatShotTask, Task},
};
use tracing::info;

/// 对同一张图像重复推理，输出平均耗时
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 默认只写日志
  #[arg(long, value_name = "OUTPUT", default_value = "log:///")]
  pub output: Url,
  #[arg(long, default_value_t = 1000)]
  pub repeat: usize,
  /// 统计平均耗时时忽略的前若干次
  #[arg(long, default_value_t = 2)]
  pub warmup: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型目录: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("重复次数: {}", args.repeat);

  let input = InputWrapper::from_url(&args.input)?;
  let model = DetectorBuilder::from_url(&args.model)?.build()?;
  let output = OutputWrapper::from_url(&args.output)?;

  RepeatShotTask::default()
    .with_repeat(args.repeat)
    .with_warmup(args.warmup)
    .run_task(input, model, output)?;

  Ok(())
}
