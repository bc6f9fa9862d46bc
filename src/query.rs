//! 查询表示与执行
//!
//! 查询文本（每行一条）：
//! ```text
//! [p,&,3,9]     点查询：col3 AND col9
//! [r,|,2,5]     范围查询：col2 OR col3 OR col4 OR col5
//! ```

use std::str::FromStr;
use std::sync::Arc;

use log::{debug, info};

use crate::cache::ColumnCache;
use crate::codec::BitmapEncoding;
use crate::column::CompressedColumn;
use crate::common::{BitmapError, ColumnId, Operator, Result};
use crate::config::EngineConfig;
use crate::merge;
use crate::reader::{reader_for, ColumnReader};
use crate::storage::{DirectoryStorage, StorageProvider};

// ── Query ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Query {
    /// 两列直接合并；列号先后顺序任意
    Point { op: Operator, left: ColumnId, right: ColumnId },
    /// [start, end] 闭区间内的列从左到右折叠
    Range { op: Operator, start: ColumnId, end: ColumnId },
}

impl Query {
    pub fn point(op: Operator, left: ColumnId, right: ColumnId) -> Self {
        Query::Point { op, left, right }
    }

    /// `start > end` 在构造时即拒绝，不会产生任何 I/O
    pub fn range(op: Operator, start: ColumnId, end: ColumnId) -> Result<Self> {
        if start > end {
            return Err(BitmapError::InvalidRange { start, end });
        }
        Ok(Query::Range { op, start, end })
    }

    pub fn operator(&self) -> Operator {
        match *self {
            Query::Point { op, .. } | Query::Range { op, .. } => op,
        }
    }

    /// 查询涉及的列数
    pub fn column_count(&self) -> usize {
        match *self {
            Query::Point { left, right, .. } => if left == right { 1 } else { 2 },
            Query::Range { start, end, .. }  => (end - start) as usize + 1,
        }
    }

    /// 解析一行查询文本；`line` 只用于错误信息
    pub fn parse_line(text: &str, line: usize) -> Result<Self> {
        let bad = |reason: String| BitmapError::QueryParse { line, reason };

        let inner = text
            .trim()
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .ok_or_else(|| bad(format!("expected [kind,op,a,b], got {text:?}")))?;

        let fields: Vec<&str> = inner.split(',').map(str::trim).collect();
        if fields.len() != 4 {
            return Err(bad(format!("expected 4 fields, got {}", fields.len())));
        }

        let op: Operator = fields[1].parse()?;
        let id = |s: &str| {
            s.parse::<ColumnId>()
                .map_err(|e| bad(format!("bad column id {s:?}: {e}")))
        };
        let a = id(fields[2])?;
        let b = id(fields[3])?;

        match fields[0] {
            "p" => Ok(Query::point(op, a, b)),
            "r" => Query::range(op, a, b),
            kind => Err(bad(format!("unknown query kind {kind:?}"))),
        }
    }
}

impl FromStr for Query {
    type Err = BitmapError;

    fn from_str(s: &str) -> Result<Self> {
        Query::parse_line(s, 1)
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Query::Point { op, left, right } => write!(f, "[p,{op},{left},{right}]"),
            Query::Range { op, start, end }  => write!(f, "[r,{op},{start},{end}]"),
        }
    }
}

// ── QueryEngine ───────────────────────────────────────────────────────────────

/// 单节点查询引擎：持有列缓存，按构造时选定的编码读取列
pub struct QueryEngine {
    storage:        Arc<dyn StorageProvider>,
    reader:         Box<dyn ColumnReader>,
    cache:          ColumnCache,
    worker_threads: usize,
}

impl QueryEngine {
    pub fn new(storage: Arc<dyn StorageProvider>, reader: Box<dyn ColumnReader>) -> Self {
        Self { storage, reader, cache: ColumnCache::new(), worker_threads: 0 }
    }

    /// 目录存储 + 配置的编码
    pub fn from_config(config: &EngineConfig) -> Self {
        info!(
            "query engine: data_dir={} encoding={}",
            config.data_dir.display(),
            config.encoding,
        );
        Self::new(Arc::new(DirectoryStorage::from_config(config)), reader_for(config.encoding))
            .with_worker_threads(config.worker_threads)
    }

    pub fn with_worker_threads(mut self, n: usize) -> Self {
        self.worker_threads = n;
        self
    }

    pub fn encoding(&self) -> BitmapEncoding { self.reader.encoding() }
    pub fn cache(&self) -> &ColumnCache { &self.cache }
    /// 并行执行查询集时的线程数，0 表示用满全部核心
    pub fn worker_threads(&self) -> usize { self.worker_threads }

    /// 缓存命中直接返回，否则读盘并放入缓存；I/O 失败原样上抛
    pub fn load_column(&self, column: ColumnId) -> Result<Arc<CompressedColumn>> {
        self.cache.get_or_load(column, || {
            let mut input = self.storage.open(column)?;
            let col = self
                .reader
                .read_column(&column.to_string(), &mut input)
                .map_err(|e| e.for_column(column))?;
            debug!("loaded column {column}: {} words, {} bits", col.word_count(), col.bit_len());
            Ok(col)
        })
    }

    pub fn execute(&self, query: &Query) -> Result<Arc<CompressedColumn>> {
        match *query {
            Query::Point { op, left, right } => self.execute_point(op, left, right),
            Query::Range { op, start, end }  => self.execute_range(op, start, end),
        }
    }

    fn execute_point(&self, op: Operator, left: ColumnId, right: ColumnId) -> Result<Arc<CompressedColumn>> {
        let a = self.load_column(left)?;
        let b = self.load_column(right)?;
        merge::merge(op, &a, &b)
    }

    /// 严格左折叠：acc = merge(op, acc, col(i))，i = start+1 ..= end。
    /// 中间结果只在本次调用内持有，不进入共享缓存。
    fn execute_range(&self, op: Operator, start: ColumnId, end: ColumnId) -> Result<Arc<CompressedColumn>> {
        if start > end {
            return Err(BitmapError::InvalidRange { start, end });
        }
        let mut acc = self.load_column(start)?;
        // start 可能就是 ColumnId::MAX，不能写 start + 1
        for column in (start..=end).skip(1) {
            let next = self.load_column(column)?;
            acc = merge::merge(op, &acc, &next)?;
        }
        debug!(
            "range [{start},{end}] {op}: {} words, {} ones",
            acc.word_count(),
            acc.count_ones(),
        );
        Ok(acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn parses_point_and_range() {
        assert_eq!("[p,&,3,9]".parse::<Query>().unwrap(), Query::point(Operator::And, 3, 9));
        assert_eq!(
            " [r, |, 2, 5] ".parse::<Query>().unwrap(),
            Query::Range { op: Operator::Or, start: 2, end: 5 }
        );
        // 点查询不要求列号有序
        assert_eq!("[p,|,9,3]".parse::<Query>().unwrap(), Query::point(Operator::Or, 9, 3));
    }

    #[test]
    fn display_round_trips() {
        for text in ["[p,&,3,9]", "[r,|,0,12]"] {
            assert_eq!(text.parse::<Query>().unwrap().to_string(), text);
        }
    }

    #[test]
    fn rejects_bad_queries() {
        assert!(matches!("[r,&,5,2]".parse::<Query>(), Err(BitmapError::InvalidRange { start: 5, end: 2 })));
        assert!(matches!("[p,^,1,2]".parse::<Query>(), Err(BitmapError::UnsupportedOperator(_))));
        assert!(matches!("[x,&,1,2]".parse::<Query>(), Err(BitmapError::QueryParse { .. })));
        assert!(matches!("[p,&,1]".parse::<Query>(), Err(BitmapError::QueryParse { .. })));
        assert!(matches!("p,&,1,2".parse::<Query>(), Err(BitmapError::QueryParse { .. })));
        assert!(matches!(Query::parse_line("[p,&,a,2]", 7), Err(BitmapError::QueryParse { line: 7, .. })));
    }

    #[test]
    fn column_counts() {
        assert_eq!(Query::point(Operator::And, 1, 1).column_count(), 1);
        assert_eq!(Query::range(Operator::Or, 3, 7).unwrap().column_count(), 5);
    }

    fn engine_with(columns: &[(ColumnId, Vec<u64>)]) -> QueryEngine {
        let storage = MemoryStorage::new();
        let codec = BitmapEncoding::Wah32.codec();
        for (id, words) in columns {
            let col = CompressedColumn::from_words(id.to_string(), codec, words.clone());
            storage.put_column(*id, &col, BitmapEncoding::Wah32).unwrap();
        }
        QueryEngine::new(Arc::new(storage), reader_for(BitmapEncoding::Wah32))
    }

    #[test]
    fn point_query_merges_both_columns() {
        let engine = engine_with(&[(3, vec![0b1010 << 27]), (9, vec![0b1100 << 27])]);
        let r = engine.execute(&"[p,&,3,9]".parse().unwrap()).unwrap();
        assert_eq!(r.words(), &[0b1000 << 27]);
        let r = engine.execute(&"[p,|,9,3]".parse().unwrap()).unwrap();
        assert_eq!(r.words(), &[0b1110 << 27]);
    }

    #[test]
    fn same_column_point_query_returns_cached_column() {
        let engine = engine_with(&[(4, vec![0x1234])]);
        let r = engine.execute(&Query::point(Operator::And, 4, 4)).unwrap();
        let cached = engine.cache().get(4).unwrap();
        assert!(Arc::ptr_eq(&r, &cached));
    }

    #[test]
    fn range_query_folds_left_to_right() {
        let engine = engine_with(&[(0, vec![0x1]), (1, vec![0x2]), (2, vec![0x4]), (3, vec![0x8])]);
        let r = engine.execute(&Query::range(Operator::Or, 1, 3).unwrap()).unwrap();
        assert_eq!(r.words(), &[0xE]);
        // 中间结果不占用缓存
        assert_eq!(engine.cache().len(), 3);
    }

    #[test]
    fn single_column_range_is_the_column() {
        let engine = engine_with(&[(5, vec![0x77])]);
        let r = engine.execute(&Query::range(Operator::And, 5, 5).unwrap()).unwrap();
        assert!(Arc::ptr_eq(&r, &engine.cache().get(5).unwrap()));
    }

    #[test]
    fn missing_column_propagates_io_error() {
        let engine = engine_with(&[(1, vec![0x1])]);
        let err = engine.execute(&Query::point(Operator::And, 1, 2)).unwrap_err();
        assert!(matches!(err, BitmapError::ColumnIo { column: 2, .. }));
        assert!(!engine.cache().contains(2));

        let err = engine.execute(&Query::range(Operator::Or, 0, 1).unwrap()).unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn range_at_max_column_id() {
        let engine = engine_with(&[(ColumnId::MAX - 1, vec![0x3]), (ColumnId::MAX, vec![0x5])]);

        let q: Query = "[r,|,4294967295,4294967295]".parse().unwrap();
        assert_eq!(q, Query::Range { op: Operator::Or, start: ColumnId::MAX, end: ColumnId::MAX });
        let r = engine.execute(&q).unwrap();
        assert!(Arc::ptr_eq(&r, &engine.cache().get(ColumnId::MAX).unwrap()));

        let r = engine.execute(&"[r,&,4294967294,4294967295]".parse().unwrap()).unwrap();
        assert_eq!(r.words(), &[0x1]);
        assert_eq!(engine.cache().len(), 2);
    }

    #[test]
    fn worker_threads_getter() {
        let engine = engine_with(&[]);
        assert_eq!(engine.worker_threads(), 0);
        assert_eq!(engine.with_worker_threads(4).worker_threads(), 4);
    }
}
