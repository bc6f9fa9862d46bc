//! 列写入器：CompressedColumn → 磁盘字节流（与 `reader` 的格式对称）

use std::io::Write;

use byteorder::{BigEndian, WriteBytesExt};

use crate::codec::BitmapEncoding;
use crate::column::CompressedColumn;
use crate::common::{BitmapError, Result};

pub struct ColumnWriter {
    encoding: BitmapEncoding,
}

impl ColumnWriter {
    pub fn new(encoding: BitmapEncoding) -> Self {
        Self { encoding }
    }

    /// 逐字大端写出，返回写入的字节数
    pub fn write_column<W: Write>(&self, column: &CompressedColumn, mut writer: W) -> Result<u64> {
        let width = column.codec().width();
        if width != self.encoding.word_bits() {
            return Err(BitmapError::UnsupportedWordWidth(width));
        }
        for &w in column.words() {
            match self.encoding {
                BitmapEncoding::Wah32 => writer.write_u32::<BigEndian>(w as u32)?,
                BitmapEncoding::Wah64 => writer.write_u64::<BigEndian>(w)?,
            }
        }
        writer.flush()?;
        Ok((column.word_count() * self.encoding.word_bytes()) as u64)
    }

    pub fn to_bytes(&self, column: &CompressedColumn) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(column.word_count() * self.encoding.word_bytes());
        self.write_column(column, &mut out)?;
        Ok(out)
    }
}
