//! 压缩列：一列位图的 WAH 原始字序列
//!
//! 生命周期分两段：构造期只允许 `append_literal` / `append_fill` 按位序追加，
//! 一旦包进 `Arc` 发布给缓存或查询方，就只读遍历，不再修改。

use crate::codec::{DecodedSegment, WordCodec};

#[derive(Debug, Clone)]
pub struct CompressedColumn {
    id:    String,
    codec: WordCodec,
    words: Vec<u64>,
}

impl CompressedColumn {
    pub fn new(id: impl Into<String>, codec: WordCodec) -> Self {
        Self { id: id.into(), codec, words: Vec::new() }
    }

    /// 直接接管已编码的原始字（读盘路径使用），超出位宽的高位被截掉
    pub fn from_words(id: impl Into<String>, codec: WordCodec, mut words: Vec<u64>) -> Self {
        let mask = codec.word_mask();
        for w in &mut words {
            *w &= mask;
        }
        Self { id: id.into(), codec, words }
    }

    /// 把未压缩的位序列压成 WAH：整块全 0/全 1 变成 fill，
    /// 末尾不足一块的部分补 0 作为字面量
    pub fn from_bits(id: impl Into<String>, codec: WordCodec, bits: &[bool]) -> Self {
        let mut col   = Self::new(id, codec);
        let block     = codec.block_bits() as usize;
        for chunk in bits.chunks(block) {
            if chunk.len() == block {
                if chunk.iter().all(|b| !*b) {
                    col.append_fill(1, false);
                    continue;
                }
                if chunk.iter().all(|b| *b) {
                    col.append_fill(1, true);
                    continue;
                }
            }
            let mut lit = 0u64;
            for (k, &bit) in chunk.iter().enumerate() {
                if bit {
                    lit |= 1u64 << (block - 1 - k);
                }
            }
            col.append_literal(lit);
        }
        col
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn codec(&self) -> WordCodec { self.codec }
    pub fn words(&self) -> &[u64] { &self.words }
    pub fn word_count(&self) -> usize { self.words.len() }
    pub fn is_empty(&self) -> bool { self.words.is_empty() }

    // ── 构造 ──────────────────────────────────────────────────────────────────

    /// 追加一个字面量字（不与相邻字合并）
    pub fn append_literal(&mut self, bits: u64) {
        self.words.push(self.codec.encode_literal(bits));
    }

    /// 追加 `run_length` 个全 `value` 块。
    ///
    /// 先尽量续到前一个同值 fill 字上，超出单字容量的部分拆成多个 fill 字；
    /// `run_length == 0` 什么也不做。
    pub fn append_fill(&mut self, run_length: u64, value: bool) {
        if run_length == 0 {
            return;
        }
        let max = self.codec.max_run_length();
        let mut left = run_length;

        if let Some(last) = self.words.last_mut() {
            if let DecodedSegment::Fill { value: v, remaining: run } = self.codec.decode(*last) {
                if v == value && run < max {
                    let take = left.min(max - run);
                    *last = self.codec.fill_word(value, run + take);
                    left -= take;
                }
            }
        }

        while left > 0 {
            let take = left.min(max);
            self.words.push(self.codec.fill_word(value, take));
            left -= take;
        }
    }

    // ── 读取 ──────────────────────────────────────────────────────────────────

    /// 单向、一次性的段序列，按需解码每个原始字
    pub fn segments(&self) -> Segments<'_> {
        Segments { codec: self.codec, words: self.words.iter() }
    }

    /// 逐块展开成字面量等价值（fill 的每个块都展开一次）
    pub fn blocks(&self) -> impl Iterator<Item = u64> + '_ {
        let codec = self.codec;
        self.segments().flat_map(move |seg| {
            let (bits, n) = match seg {
                DecodedSegment::Fill { value, remaining } =>
                    (codec.literal_equivalent_of_fill(value), remaining),
                DecodedSegment::Literal { bits, .. } => (bits, 1),
            };
            std::iter::repeat(bits).take(n as usize)
        })
    }

    /// 逻辑位长度（含末尾对齐填充位）
    ///
    /// WAH64 单个 fill 最多 2^62-1 块，乘上块宽会超出 u64，所以计数一律用 u128。
    pub fn bit_len(&self) -> u128 {
        self.block_count() * u128::from(self.codec.block_bits())
    }

    pub fn block_count(&self) -> u128 {
        self.segments().map(|s| u128::from(s.remaining())).sum()
    }

    /// 置位的个数，fill 按 run 直接计数，不展开
    pub fn count_ones(&self) -> u128 {
        let block = u128::from(self.codec.block_bits());
        self.segments()
            .map(|seg| match seg {
                DecodedSegment::Fill { value: true, remaining } => u128::from(remaining) * block,
                DecodedSegment::Fill { .. } => 0,
                DecodedSegment::Literal { bits, .. } => u128::from(bits.count_ones()),
            })
            .sum()
    }

    /// 完全解压成位序列（朴素参考实现，测试与调试用）
    pub fn to_bits(&self) -> Vec<bool> {
        let block = self.codec.block_bits();
        let mut out = Vec::with_capacity(self.bit_len() as usize);
        for lit in self.blocks() {
            out.extend((0..block).map(|k| self.codec.literal_bit(lit, k)));
        }
        out
    }

    /// 逻辑位是否完全相同（与压缩形态无关）
    pub fn same_bits(&self, other: &CompressedColumn) -> bool {
        self.codec.block_bits() == other.codec.block_bits() && self.blocks().eq(other.blocks())
    }

    /// 原始字流（大端、按编码字宽）的 CRC32，用于跨次运行比较结果
    pub fn digest(&self) -> u32 {
        let nbytes = self.codec.width().div_ceil(8) as usize;
        let mut hasher = crc32fast::Hasher::new();
        for w in &self.words {
            hasher.update(&w.to_be_bytes()[8 - nbytes..]);
        }
        hasher.finalize()
    }
}

// ── 段迭代器 ──────────────────────────────────────────────────────────────────

pub struct Segments<'a> {
    codec: WordCodec,
    words: std::slice::Iter<'a, u64>,
}

impl Iterator for Segments<'_> {
    type Item = DecodedSegment;

    fn next(&mut self) -> Option<DecodedSegment> {
        self.words.next().map(|&w| self.codec.decode(w))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.words.size_hint()
    }
}

impl ExactSizeIterator for Segments<'_> {}
