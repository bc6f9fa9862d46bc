//! 压缩域上的 AND / OR 合并
//!
//! 两个游标各自停在一个解码段上，按段类型配对：
//! - **fill × fill**       — 取两者剩余 run 的较小值 n，输出一个长度 n 的 fill，两边各扣 n
//! - **fill × literal**    — fill 展开一个块与字面量按位运算，输出字面量；fill 扣 1，字面量用完
//! - **literal × literal** — 直接按位运算输出字面量，两边都用完
//!
//! 游标耗尽就从各自的字流取下一个字；任一字流取不到下一个字时合并结束，
//! 另一侧尚未消费的尾部位视为对齐填充，直接丢弃。两个操作数应当表示同样长度的位图，
//! 因此结果长度等于较短操作数的逻辑长度。
//!
//! 复杂度 O(|A| + |B|)（按原始字计），与逻辑位长无关。

use std::sync::Arc;

use log::debug;

use crate::codec::DecodedSegment;
use crate::column::{CompressedColumn, Segments};
use crate::common::{BitmapError, Operator, Result};

pub fn and(a: &Arc<CompressedColumn>, b: &Arc<CompressedColumn>) -> Result<Arc<CompressedColumn>> {
    merge(Operator::And, a, b)
}

pub fn or(a: &Arc<CompressedColumn>, b: &Arc<CompressedColumn>) -> Result<Arc<CompressedColumn>> {
    merge(Operator::Or, a, b)
}

/// 合并两个已发布的列。
///
/// 同一个实例与自身合并时原样返回（AND/OR 幂等），不会重复消费同一游标。
/// 两列字宽不一致时报 `UnsupportedWordWidth`。
pub fn merge(
    op: Operator,
    a:  &Arc<CompressedColumn>,
    b:  &Arc<CompressedColumn>,
) -> Result<Arc<CompressedColumn>> {
    if Arc::ptr_eq(a, b) {
        return Ok(Arc::clone(a));
    }
    if a.codec() != b.codec() {
        return Err(BitmapError::UnsupportedWordWidth(b.codec().width()));
    }
    Ok(Arc::new(merge_columns(op, a, b)))
}

/// 双游标流式合并，输出新的压缩列
pub fn merge_columns(op: Operator, a: &CompressedColumn, b: &CompressedColumn) -> CompressedColumn {
    let codec   = a.codec();
    let mut out = CompressedColumn::new(format!("({} {} {})", a.id(), op, b.id()), codec);

    let mut words_a = a.segments();
    let mut words_b = b.segments();
    let mut seg_a   = EXHAUSTED;
    let mut seg_b   = EXHAUSTED;

    loop {
        if !advance(&mut seg_a, &mut words_a) || !advance(&mut seg_b, &mut words_b) {
            break;
        }

        match (&mut seg_a, &mut seg_b) {
            (
                DecodedSegment::Fill { value: va, remaining: ra },
                DecodedSegment::Fill { value: vb, remaining: rb },
            ) => {
                let n = (*ra).min(*rb);
                out.append_fill(n, op.apply_bit(*va, *vb));
                *ra -= n;
                *rb -= n;
            }
            (
                DecodedSegment::Fill { value, remaining },
                DecodedSegment::Literal { bits, consumed },
            )
            | (
                DecodedSegment::Literal { bits, consumed },
                DecodedSegment::Fill { value, remaining },
            ) => {
                out.append_literal(op.apply(codec.literal_equivalent_of_fill(*value), *bits));
                *remaining -= 1;
                *consumed = true;
            }
            (
                DecodedSegment::Literal { bits: ba, consumed: ca },
                DecodedSegment::Literal { bits: bb, consumed: cb },
            ) => {
                out.append_literal(op.apply(*ba, *bb));
                *ca = true;
                *cb = true;
            }
        }
    }

    debug!(
        "merge {op}: {} ({} words) × {} ({} words) → {} words",
        a.id(), a.word_count(), b.id(), b.word_count(), out.word_count(),
    );
    out
}

/// 游标起始状态：视作一个已用完的字面量
const EXHAUSTED: DecodedSegment = DecodedSegment::Literal { bits: 0, consumed: true };

/// 游标耗尽时取下一个非空段（跳过 run 为 0 的 fill）；字流结束返回 false
fn advance(seg: &mut DecodedSegment, words: &mut Segments<'_>) -> bool {
    while seg.is_exhausted() {
        match words.next() {
            Some(next) => *seg = next,
            None       => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BitmapEncoding, WordCodec};

    fn wah32() -> WordCodec {
        BitmapEncoding::Wah32.codec()
    }

    fn column(id: &str, codec: WordCodec, words: Vec<u64>) -> Arc<CompressedColumn> {
        Arc::new(CompressedColumn::from_words(id, codec, words))
    }

    /// 逐块朴素计算的参考结果
    fn naive(op: Operator, a: &CompressedColumn, b: &CompressedColumn) -> Vec<u64> {
        a.blocks().zip(b.blocks()).map(|(x, y)| op.apply(x, y)).collect()
    }

    /// 确定性的小随机源，避免测试引入额外依赖
    struct XorShift(u64);

    impl XorShift {
        fn next(&mut self) -> u64 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            self.0
        }
    }

    fn random_column(rng: &mut XorShift, codec: WordCodec, blocks: u64) -> CompressedColumn {
        let mut col  = CompressedColumn::new("r", codec);
        let mut left = blocks;
        while left > 0 {
            match rng.next() % 4 {
                0 | 1 => {
                    let run = 1 + rng.next() % left.min(9);
                    col.append_fill(run, rng.next() % 2 == 0);
                    left -= run;
                }
                _ => {
                    col.append_literal(rng.next());
                    left -= 1;
                }
            }
        }
        col
    }

    #[test]
    fn literal_pair_scenario() {
        let c = wah32();
        let a = column("a", c, vec![0b1010 << 27]);
        let b = column("b", c, vec![0b1100 << 27]);
        assert_eq!(and(&a, &b).unwrap().words(), &[0b1000 << 27]);
        assert_eq!(or(&a, &b).unwrap().words(), &[0b1110 << 27]);
    }

    #[test]
    fn ones_fill_and_literals_yields_literals() {
        let c = wah32();
        let a = column("a", c, vec![c.encode_fill(true, 3).unwrap()]);
        let b = column("b", c, vec![0x1234_5678, 0x7FFF_0000, 0x0000_0001]);
        let r = and(&a, &b).unwrap();
        assert!(r.same_bits(&b));
        assert_eq!(r.words(), b.words());
    }

    #[test]
    fn zeros_fill_or_literals_yields_literals() {
        let c = wah32();
        let a = column("a", c, vec![0x0F0F_0F0F, 0x7000_0000]);
        let b = column("b", c, vec![c.encode_fill(false, 2).unwrap()]);
        let r = or(&a, &b).unwrap();
        assert!(r.same_bits(&a));
    }

    #[test]
    fn unequal_length_stops_at_shorter_operand() {
        let c = wah32();
        let a = column("a", c, vec![0x7FFF_FFFF, 0x1111_1111]);
        let b = column("b", c, vec![0x5555_5555]);
        for op in [Operator::And, Operator::Or] {
            let r = merge(op, &a, &b).unwrap();
            assert_eq!(r.word_count(), 1);
            assert_eq!(r.bit_len(), b.bit_len());
        }
    }

    #[test]
    fn trailing_fill_run_is_discarded() {
        let c = wah32();
        let a = column("a", c, vec![c.encode_fill(true, 10).unwrap()]);
        let b = column("b", c, vec![0x1, 0x2]);
        let r = or(&a, &b).unwrap();
        assert_eq!(r.block_count(), 2);
    }

    #[test]
    fn fill_runs_resynchronize() {
        let c = wah32();
        // A: 0×5, 1×4   B: 0×2, 1×7
        let a = column("a", c, vec![c.encode_fill(false, 5).unwrap(), c.encode_fill(true, 4).unwrap()]);
        let b = column("b", c, vec![c.encode_fill(false, 2).unwrap(), c.encode_fill(true, 7).unwrap()]);

        let r = and(&a, &b).unwrap();
        let segs: Vec<_> = r.segments().collect();
        assert_eq!(segs, vec![
            DecodedSegment::Fill { value: false, remaining: 5 },
            DecodedSegment::Fill { value: true,  remaining: 4 },
        ]);

        let r = or(&a, &b).unwrap();
        let segs: Vec<_> = r.segments().collect();
        assert_eq!(segs, vec![
            DecodedSegment::Fill { value: false, remaining: 2 },
            DecodedSegment::Fill { value: true,  remaining: 7 },
        ]);
    }

    #[test]
    fn self_merge_returns_same_instance() {
        let c = wah32();
        let a = column("a", c, vec![0x1, c.encode_fill(true, 4).unwrap()]);
        for op in [Operator::And, Operator::Or] {
            let r = merge(op, &a, &a).unwrap();
            assert!(Arc::ptr_eq(&r, &a));
        }
    }

    #[test]
    fn zero_run_fills_are_skipped() {
        let c = wah32();
        let a = column("a", c, vec![c.encode_fill(true, 0).unwrap(), 0x3]);
        let b = column("b", c, vec![0x5]);
        assert_eq!(and(&a, &b).unwrap().words(), &[0x1]);
    }

    #[test]
    fn mismatched_widths_are_rejected() {
        let a = column("a", wah32(), vec![1]);
        let b = column("b", BitmapEncoding::Wah64.codec(), vec![1]);
        assert!(and(&a, &b).is_err());
    }

    #[test]
    fn empty_operand_gives_empty_result() {
        let c = wah32();
        let a = column("a", c, vec![]);
        let b = column("b", c, vec![0x1]);
        assert!(or(&a, &b).unwrap().is_empty());
    }

    #[test]
    fn matches_naive_and_commutes_on_random_columns() {
        let mut rng = XorShift(0x9E37_79B9_7F4A_7C15);
        for width in [8u32, 32, 64] {
            let codec = WordCodec::with_width(width).unwrap();
            for _ in 0..200 {
                let blocks = 1 + rng.next() % 40;
                let a = Arc::new(random_column(&mut rng, codec, blocks));
                let b = Arc::new(random_column(&mut rng, codec, blocks));
                for op in [Operator::And, Operator::Or] {
                    let ab = merge(op, &a, &b).unwrap();
                    let ba = merge(op, &b, &a).unwrap();
                    let expected = naive(op, &a, &b);
                    assert!(ab.blocks().eq(expected.iter().copied()), "width={width} op={op}");
                    assert!(ab.same_bits(&ba));
                }
            }
        }
    }

    #[test]
    fn merge_result_reuses_fills() {
        let c = wah32();
        let a = column("a", c, vec![c.encode_fill(false, 1000).unwrap()]);
        let b = column("b", c, vec![c.encode_fill(true, 600).unwrap(), c.encode_fill(false, 400).unwrap()]);
        let r = and(&a, &b).unwrap();
        assert_eq!(r.word_count(), 1);
        assert_eq!(r.block_count(), 1000);
        assert_eq!(r.count_ones(), 0);
    }
}
