//! 引擎配置
//!
//! ```toml
//! data_dir       = "Experiments/bitmap_raw_attr10_card100"
//! file_prefix    = "col_"
//! file_extension = ".dat"
//! encoding       = "wah32"
//! worker_threads = 8
//! ```
//! 未给出的字段取默认值。

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::codec::BitmapEncoding;
use crate::common::{BitmapError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// 压缩列文件所在目录
    pub data_dir:       PathBuf,
    pub file_prefix:    String,
    pub file_extension: String,
    pub encoding:       BitmapEncoding,
    /// 并行跑查询集时的线程数；0 表示交给 rayon 决定
    pub worker_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir:       PathBuf::from("."),
            file_prefix:    "col_".into(),
            file_extension: ".dat".into(),
            encoding:       BitmapEncoding::Wah32,
            worker_threads: 0,
        }
    }
}

impl EngineConfig {
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into(), ..Self::default() }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| BitmapError::Config(e.to_string()))
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| BitmapError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }
}
