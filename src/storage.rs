//! 列存储边界：按列编号打开字节流
//!
//! 引擎只依赖 `open(column_id)`；列如何分布到多台机器上不在这里处理。

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use log::debug;
use parking_lot::RwLock;

use crate::codec::BitmapEncoding;
use crate::column::CompressedColumn;
use crate::column_writer::ColumnWriter;
use crate::common::{BitmapError, ColumnId, Result};
use crate::config::EngineConfig;

pub trait StorageProvider: Send + Sync {
    /// 打开一列的原始字节流；不存在或不可读时返回 I/O 错误
    fn open(&self, column: ColumnId) -> Result<Box<dyn Read + Send>>;
}

// ── 目录存储 ──────────────────────────────────────────────────────────────────

/// 单目录布局：`{data_dir}/{prefix}{id}{extension}`，例如 `data/col_3.dat`
#[derive(Debug, Clone)]
pub struct DirectoryStorage {
    data_dir:  PathBuf,
    prefix:    String,
    extension: String,
}

impl DirectoryStorage {
    pub fn new(data_dir: impl Into<PathBuf>, prefix: &str, extension: &str) -> Self {
        Self {
            data_dir:  data_dir.into(),
            prefix:    prefix.into(),
            extension: extension.into(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(&config.data_dir, &config.file_prefix, &config.file_extension)
    }

    pub fn data_dir(&self) -> &Path { &self.data_dir }

    /// 生成列文件在磁盘上的路径
    pub fn column_path(&self, column: ColumnId) -> PathBuf {
        self.data_dir.join(format!("{}{}{}", self.prefix, column, self.extension))
    }

    /// 把一列写到它对应的文件（覆盖已有文件）
    pub fn write_column(
        &self,
        column_id: ColumnId,
        column:    &CompressedColumn,
        encoding:  BitmapEncoding,
    ) -> Result<u64> {
        let path = self.column_path(column_id);
        let file = File::create(&path).map_err(|e| BitmapError::from(e).for_column(column_id))?;
        let n = ColumnWriter::new(encoding)
            .write_column(column, std::io::BufWriter::new(file))
            .map_err(|e| e.for_column(column_id))?;
        debug!("wrote column {column_id} to {} ({n} bytes)", path.display());
        Ok(n)
    }
}

impl StorageProvider for DirectoryStorage {
    fn open(&self, column: ColumnId) -> Result<Box<dyn Read + Send>> {
        let path = self.column_path(column);
        let file = File::open(&path).map_err(|e| BitmapError::ColumnIo { column, source: e })?;
        debug!("opened {}", path.display());
        Ok(Box::new(BufReader::new(file)))
    }
}

// ── 内存存储 ──────────────────────────────────────────────────────────────────

/// 进程内的列字节表，嵌入式使用和测试用
#[derive(Debug, Default)]
pub struct MemoryStorage {
    columns: RwLock<HashMap<ColumnId, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self { Self::default() }

    pub fn put(&self, column: ColumnId, bytes: Vec<u8>) {
        self.columns.write().insert(column, bytes);
    }

    pub fn put_column(
        &self,
        column_id: ColumnId,
        column:    &CompressedColumn,
        encoding:  BitmapEncoding,
    ) -> Result<()> {
        let bytes = ColumnWriter::new(encoding).to_bytes(column)?;
        self.put(column_id, bytes);
        Ok(())
    }

    pub fn remove(&self, column: ColumnId) -> Option<Vec<u8>> {
        self.columns.write().remove(&column)
    }

    pub fn len(&self) -> usize { self.columns.read().len() }
    pub fn is_empty(&self) -> bool { self.columns.read().is_empty() }
}

impl StorageProvider for MemoryStorage {
    fn open(&self, column: ColumnId) -> Result<Box<dyn Read + Send>> {
        let bytes = self.columns.read().get(&column).cloned().ok_or_else(|| BitmapError::ColumnIo {
            column,
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "column not in memory storage"),
        })?;
        Ok(Box::new(Cursor::new(bytes)))
    }
}
