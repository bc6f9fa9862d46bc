//! WAH 字编解码
//!
//! 一个原始字（宽度 W）的布局：
//! ```text
//!  bit W-1   bit W-2            bits W-3 .. 0
//! ┌───────┬──────────────────────────────────────────┐
//! │   0   │        W-1 位字面量（MSB 优先）           │  literal
//! ├───────┼──────────┬───────────────────────────────┤
//! │   1   │ 填充值 v │   run length N（W-2 位）       │  fill
//! └───────┴──────────┴───────────────────────────────┘
//! ```
//!
//! fill 表示 N 个连续的 (W-1) 位块，每一位都等于 v。
//! 字面量按 MSB 优先：块内第 k 个逻辑位存放在字的第 W-2-k 位。
//! 内存中统一用 `u64` 承载，W ≤ 64。

use crate::common::{BitmapError, Result};
use serde::Deserialize;

// ── 编码方式 ──────────────────────────────────────────────────────────────────

/// 支持的位图编码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitmapEncoding {
    Wah32,
    Wah64,
}

impl BitmapEncoding {
    pub fn word_bits(self) -> u32 {
        match self {
            BitmapEncoding::Wah32 => 32,
            BitmapEncoding::Wah64 => 64,
        }
    }

    /// 磁盘上每个字占用的字节数
    pub fn word_bytes(self) -> usize {
        self.word_bits() as usize / 8
    }

    pub fn codec(self) -> WordCodec {
        WordCodec { width: self.word_bits() }
    }
}

impl std::str::FromStr for BitmapEncoding {
    type Err = BitmapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "wah32" => Ok(BitmapEncoding::Wah32),
            "wah64" => Ok(BitmapEncoding::Wah64),
            other   => Err(BitmapError::Config(format!("unknown encoding: {other}"))),
        }
    }
}

impl std::fmt::Display for BitmapEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BitmapEncoding::Wah32 => f.write_str("WAH32"),
            BitmapEncoding::Wah64 => f.write_str("WAH64"),
        }
    }
}

// ── 解码后的段 ────────────────────────────────────────────────────────────────

/// 合并游标当前停留的段（一个原始字的解码视图）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedSegment {
    /// `remaining` 个尚未消费的全 `value` 块
    Fill { value: bool, remaining: u64 },
    /// W-1 位字面量；`consumed` 为真表示已被使用
    Literal { bits: u64, consumed: bool },
}

impl DecodedSegment {
    pub fn is_fill(&self) -> bool {
        matches!(self, DecodedSegment::Fill { .. })
    }

    /// 剩余的逻辑块数；0 表示该段已耗尽，需要取下一个字
    pub fn remaining(&self) -> u64 {
        match *self {
            DecodedSegment::Fill { remaining, .. }  => remaining,
            DecodedSegment::Literal { consumed, .. } => u64::from(!consumed),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// 消费 `n` 个块；字面量只有一个块，任何正数都会把它用完
    pub fn consume(&mut self, n: u64) {
        match self {
            DecodedSegment::Fill { remaining, .. } => *remaining = remaining.saturating_sub(n),
            DecodedSegment::Literal { consumed, .. } => {
                if n > 0 {
                    *consumed = true;
                }
            }
        }
    }
}

// ── WordCodec ─────────────────────────────────────────────────────────────────

/// 固定位宽的 WAH 字编解码器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordCodec {
    width: u32,
}

impl WordCodec {
    pub const MIN_WIDTH: u32 = 3;
    pub const MAX_WIDTH: u32 = 64;

    /// 任意位宽（3..=64）；窄位宽主要用于穷举测试
    pub fn with_width(width: u32) -> Result<Self> {
        if !(Self::MIN_WIDTH..=Self::MAX_WIDTH).contains(&width) {
            return Err(BitmapError::UnsupportedWordWidth(width));
        }
        Ok(Self { width })
    }

    pub fn width(&self) -> u32 { self.width }

    /// 每个逻辑块（一个字面量）的位数，即 W-1
    pub fn block_bits(&self) -> u32 { self.width - 1 }

    fn type_flag(&self) -> u64 { 1u64 << (self.width - 1) }
    fn fill_value_bit(&self) -> u64 { 1u64 << (self.width - 2) }

    /// 低 W-1 位全 1
    pub fn literal_mask(&self) -> u64 {
        low_mask(self.width - 1)
    }

    /// 单个 fill 字能表示的最大 run length：2^(W-2) - 1
    pub fn max_run_length(&self) -> u64 {
        low_mask(self.width - 2)
    }

    /// 整个字的有效位
    pub fn word_mask(&self) -> u64 {
        low_mask(self.width)
    }

    pub fn is_fill_word(&self, word: u64) -> bool {
        word & self.type_flag() != 0
    }

    /// 解码一个原始字；在整数域上是全函数
    pub fn decode(&self, word: u64) -> DecodedSegment {
        let word = word & self.word_mask();
        if self.is_fill_word(word) {
            DecodedSegment::Fill {
                value:     word & self.fill_value_bit() != 0,
                remaining: word & self.max_run_length(),
            }
        } else {
            DecodedSegment::Literal { bits: word & self.literal_mask(), consumed: false }
        }
    }

    /// 带校验的解码：拒绝超出位宽的字和 run length 为 0 的 fill
    pub fn decode_checked(&self, word: u64) -> Result<DecodedSegment> {
        if word & !self.word_mask() != 0 {
            return Err(BitmapError::MalformedWord(word));
        }
        let seg = self.decode(word);
        if let DecodedSegment::Fill { remaining: 0, .. } = seg {
            return Err(BitmapError::MalformedWord(word));
        }
        Ok(seg)
    }

    /// 置字面量标志并把 `bits` 截断到低 W-1 位
    pub fn encode_literal(&self, bits: u64) -> u64 {
        bits & self.literal_mask()
    }

    pub fn encode_fill(&self, value: bool, run_length: u64) -> Result<u64> {
        let max = self.max_run_length();
        if run_length > max {
            return Err(BitmapError::RunLengthOverflow { run: run_length, max });
        }
        Ok(self.fill_word(value, run_length))
    }

    /// 不做容量检查的 fill 构造；run 已由调用方保证不超过 `max_run_length`
    pub(crate) fn fill_word(&self, value: bool, run_length: u64) -> u64 {
        let value_bit = if value { self.fill_value_bit() } else { 0 };
        self.type_flag() | value_bit | (run_length & self.max_run_length())
    }

    /// fill 的单个逻辑块展开成字面量：全 0 或全 1
    pub fn literal_equivalent_of_fill(&self, value: bool) -> u64 {
        if value { self.literal_mask() } else { 0 }
    }

    /// 字面量中第 `k` 个逻辑位（MSB 优先）
    pub fn literal_bit(&self, bits: u64, k: u32) -> bool {
        debug_assert!(k < self.block_bits());
        bits >> (self.block_bits() - 1 - k) & 1 == 1
    }
}

impl Default for WordCodec {
    fn default() -> Self {
        BitmapEncoding::Wah32.codec()
    }
}

#[inline]
fn low_mask(bits: u32) -> u64 {
    if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 }
}
