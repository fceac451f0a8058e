// 该文件是 IoTBike （单车守望） 项目的一部分。
// src/model/catalog.rs - 类别名称表
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

use std::{path::Path, sync::Arc};

use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum CatalogError {
  #[error("无法读取类别文件 {0}: {1}")]
  Io(String, std::io::Error),
  #[error("类别文件为空: {0}")]
  Empty(String),
}

/// 只读共享的类别名称表，下标与检测器输出的类别编号对齐
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassCatalog {
  names: Arc<[String]>,
}

impl ClassCatalog {
  /// 从按行分隔的类别文件加载（如 `coco.names`）
  pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
    let path = path.as_ref();
    info!("加载类别文件: {}", path.display());
    let text = std::fs::read_to_string(path)
      .map_err(|e| CatalogError::Io(path.display().to_string(), e))?;

    let catalog = Self::parse(&text).ok_or_else(|| CatalogError::Empty(path.display().to_string()))?;
    debug!("类别数量: {}", catalog.len());
    Ok(catalog)
  }

  /// 解析类别文本，首尾空白被忽略，内部空行保留以维持下标对齐
  pub fn parse(text: &str) -> Option<Self> {
    let text = text.trim();
    if text.is_empty() {
      return None;
    }
    Some(Self::from_names(text.lines().map(|line| line.trim_end_matches('\r'))))
  }

  pub fn from_names<I, S>(names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      names: names.into_iter().map(Into::into).collect(),
    }
  }

  pub fn name(&self, class_id: usize) -> Option<&str> {
    self.names.get(class_id).map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_keeps_index_alignment() {
    let catalog = ClassCatalog::parse("person\nbicycle\r\n\ncar\n").unwrap();
    assert_eq!(catalog.len(), 4);
    assert_eq!(catalog.name(0), Some("person"));
    assert_eq!(catalog.name(1), Some("bicycle"));
    assert_eq!(catalog.name(2), Some(""));
    assert_eq!(catalog.name(3), Some("car"));
    assert_eq!(catalog.name(4), None);
  }

  #[test]
  fn empty_text_is_rejected() {
    assert!(ClassCatalog::parse(" \n\n").is_none());
  }

  #[test]
  fn load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("coco.names");
    std::fs::write(&path, "person\nbicycle\n").unwrap();

    let catalog = ClassCatalog::load(&path).unwrap();
    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.name(1), Some("bicycle"));

    let missing = ClassCatalog::load(dir.path().join("missing.names"));
    assert!(matches!(missing, Err(CatalogError::Io(..))));
  }

  #[test]
  fn shipped_coco_labels() {
    let catalog = ClassCatalog::load(concat!(env!("CARGO_MANIFEST_DIR"), "/labels/coco.names")).unwrap();
    assert_eq!(catalog.len(), 80);
    assert_eq!(catalog.name(0), Some("person"));
    assert_eq!(catalog.name(79), Some("toothbrush"));
  }

  #[test]
  fn clones_share_storage() {
    let a = ClassCatalog::from_names(["person"]);
    let b = a.clone();
    assert!(Arc::ptr_eq(&a.names, &b.names));
  }
}
