// 该文件是 IoTBike （单车守望） 项目的一部分。
// src/model/opencv_dnn.rs - OpenCV DNN 推理后端
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

use ndarray::{ArrayD, IxDyn};
use opencv::{
  core::{Mat, Scalar, Vector},
  dnn::{self, Net, NetTrait, NetTraitConst},
  prelude::*,
};
use tracing::{debug, error, info};

use crate::model::{BLOB_SIZE, Blob, InferenceError, ModelDescriptor, Network, RawTensor};

pub struct OpenCvNetwork {
  net: Net,
  output_names: Vector<String>,
}

fn path_str(path: &Path) -> Result<&str, InferenceError> {
  path
    .to_str()
    .ok_or_else(|| InferenceError::InvalidInput(format!("路径不是有效的 UTF-8: {}", path.display())))
}

impl OpenCvNetwork {
  /// 读取模型目录中的模型与配置，使用 CPU 推理
  pub fn load(descriptor: &ModelDescriptor) -> Result<Self, InferenceError> {
    let model = path_str(descriptor.model_path())?;
    let config = match descriptor.config_path() {
      Some(path) => path_str(path)?,
      None => "",
    };

    info!("加载模型文件: {}", model);
    let mut net = dnn::read_net(model, config, "")?;
    if net.empty()? {
      error!("模型加载后网络为空: {}", model);
      return Err(InferenceError::EmptyNetwork(model.to_string()));
    }

    net.set_preferable_backend(dnn::DNN_BACKEND_OPENCV)?;
    net.set_preferable_target(dnn::DNN_TARGET_CPU)?;

    let output_names = net.get_unconnected_out_layers_names()?;
    debug!("输出层: {:?}", output_names.to_vec());
    info!("模型加载完成");

    Ok(Self { net, output_names })
  }
}

fn to_tensor(mat: &Mat) -> Result<RawTensor, InferenceError> {
  let shape = mat
    .mat_size()
    .iter()
    .map(|&d| d as usize)
    .collect::<Vec<_>>();
  let data = mat.data_typed::<f32>()?.to_vec();
  ArrayD::from_shape_vec(IxDyn(&shape), data)
    .map_err(|e| InferenceError::MalformedOutput(format!("形状 {:?}: {}", shape, e)))
}

impl Network for OpenCvNetwork {
  fn forward(&mut self, blob: &Blob) -> Result<Vec<RawTensor>, InferenceError> {
    let data = blob
      .tensor()
      .as_slice()
      .ok_or_else(|| InferenceError::InvalidInput("输入张量不连续".to_string()))?;
    let size = BLOB_SIZE as i32;
    let input = Mat::from_slice(data)?
      .reshape_nd(1, &[1, 3, size, size])?
      .try_clone()?;

    self.net.set_input(&input, "", 1.0, Scalar::default())?;
    let mut outputs = Vector::<Mat>::new();
    self.net.forward(&mut outputs, &self.output_names)?;

    outputs.iter().map(|mat| to_tensor(&mat)).collect()
  }
}
