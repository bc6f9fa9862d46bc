//! 列读取器：磁盘字节流 → CompressedColumn
//!
//! 文件格式：
//! ```text
//! ┌──────────────────────────────┐
//! │ word 0  (W/8 bytes, BE)      │
//! │ word 1                       │
//! │ ...                          │
//! │ word n-1                     │  ← EOF 即列结束，无长度前缀
//! └──────────────────────────────┘
//! ```

use std::io::Read;

use byteorder::{BigEndian, ByteOrder};

use crate::codec::BitmapEncoding;
use crate::column::CompressedColumn;
use crate::common::{BitmapError, Result};

/// 按编码方式可插拔的读取器；引擎构造时选定，不按字切换
pub trait ColumnReader: Send + Sync {
    fn encoding(&self) -> BitmapEncoding;

    /// 读入整个字节流，返回可遍历的列
    fn read_column(&self, id: &str, input: &mut dyn Read) -> Result<CompressedColumn>;
}

/// 为给定编码返回默认读取器
pub fn reader_for(encoding: BitmapEncoding) -> Box<dyn ColumnReader> {
    Box::new(WahColumnReader::new(encoding))
}

// ── WAH32 / WAH64 ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct WahColumnReader {
    encoding: BitmapEncoding,
    /// 打开后逐字校验（拒绝空 fill）
    validate: bool,
}

impl WahColumnReader {
    pub fn new(encoding: BitmapEncoding) -> Self {
        Self { encoding, validate: false }
    }

    pub fn validating(mut self, on: bool) -> Self {
        self.validate = on;
        self
    }
}

impl ColumnReader for WahColumnReader {
    fn encoding(&self) -> BitmapEncoding { self.encoding }

    fn read_column(&self, id: &str, input: &mut dyn Read) -> Result<CompressedColumn> {
        let mut data = Vec::new();
        input.read_to_end(&mut data)?;

        let word_bytes = self.encoding.word_bytes();
        if data.len() % word_bytes != 0 {
            return Err(BitmapError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "truncated column {id}: {} trailing bytes after {} whole words",
                    data.len() % word_bytes,
                    data.len() / word_bytes,
                ),
            )));
        }

        let codec = self.encoding.codec();
        let mut words = Vec::with_capacity(data.len() / word_bytes);
        for chunk in data.chunks_exact(word_bytes) {
            let w = match self.encoding {
                BitmapEncoding::Wah32 => u64::from(BigEndian::read_u32(chunk)),
                BitmapEncoding::Wah64 => BigEndian::read_u64(chunk),
            };
            if self.validate {
                codec.decode_checked(w)?;
            }
            words.push(w);
        }
        Ok(CompressedColumn::from_words(id, codec, words))
    }
}
