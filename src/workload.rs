//! 查询集读取与批量执行
//!
//! 查询集文件每行一条查询，`#` 开头的行和空行跳过。
//! 单条查询失败只影响它自己，批量执行继续进行。

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use std::time::{Duration, Instant};

use log::{info, warn};
use rayon::prelude::*;

use crate::cache::CacheStats;
use crate::column::CompressedColumn;
use crate::common::{BitmapError, Result};
use crate::query::{Query, QueryEngine};

// ── QuerySet ──────────────────────────────────────────────────────────────────

pub struct QuerySet<R> {
    lines:   Lines<R>,
    line_no: usize,
}

impl QuerySet<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self::from_reader(BufReader::new(file)))
    }
}

impl<R: BufRead> QuerySet<R> {
    pub fn from_reader(reader: R) -> Self {
        Self { lines: reader.lines(), line_no: 0 }
    }
}

impl<R: BufRead> Iterator for QuerySet<R> {
    type Item = Result<Query>;

    fn next(&mut self) -> Option<Result<Query>> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e)   => return Some(Err(BitmapError::Io(e))),
            };
            self.line_no += 1;
            let text = line.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
            return Some(Query::parse_line(text, self.line_no));
        }
    }
}

// ── 执行结果 ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub query:   Query,
    pub bits:    u128,
    pub ones:    u128,
    pub words:   usize,
    pub digest:  u32,
    pub elapsed: Duration,
}

impl QueryOutcome {
    fn new(query: Query, result: &CompressedColumn, elapsed: Duration) -> Self {
        Self {
            query,
            bits:   result.bit_len(),
            ones:   result.count_ones(),
            words:  result.word_count(),
            digest: result.digest(),
            elapsed,
        }
    }
}

impl std::fmt::Display for QueryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} bits={} ones={} words={} digest={:08x} {}us",
            self.query, self.bits, self.ones, self.words, self.digest,
            self.elapsed.as_micros(),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkloadSummary {
    pub queries:       usize,
    pub point_queries: usize,
    pub range_queries: usize,
    pub failed:        usize,
    pub elapsed:       Duration,
    pub cache:         CacheStats,
}

impl WorkloadSummary {
    fn collect(results: &[Result<QueryOutcome>], elapsed: Duration, cache: CacheStats) -> Self {
        let mut s = Self { elapsed, cache, ..Self::default() };
        for r in results {
            s.queries += 1;
            match r {
                Ok(o) => match o.query {
                    Query::Point { .. } => s.point_queries += 1,
                    Query::Range { .. } => s.range_queries += 1,
                },
                Err(_) => s.failed += 1,
            }
        }
        s
    }
}

impl std::fmt::Display for WorkloadSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} queries ({} point, {} range, {} failed) in {:.3}s; cache hits={} loads={} coalesced={}",
            self.queries, self.point_queries, self.range_queries, self.failed,
            self.elapsed.as_secs_f64(),
            self.cache.hits, self.cache.loads, self.cache.coalesced,
        )
    }
}

// ── 批量执行 ──────────────────────────────────────────────────────────────────

impl QueryEngine {
    /// 执行一条查询并计时
    pub fn run_query(&self, query: &Query) -> Result<QueryOutcome> {
        let t0 = Instant::now();
        let result = self.execute(query).inspect_err(|e| warn!("{query} failed: {e}"))?;
        Ok(QueryOutcome::new(*query, &result, t0.elapsed()))
    }

    /// 在当前线程上按顺序执行
    pub fn run_workload<I>(&self, queries: I) -> (Vec<Result<QueryOutcome>>, WorkloadSummary)
    where
        I: IntoIterator<Item = Query>,
    {
        let t0 = Instant::now();
        let results: Vec<_> = queries.into_iter().map(|q| self.run_query(&q)).collect();
        let summary = WorkloadSummary::collect(&results, t0.elapsed(), self.cache().stats());
        info!("{summary}");
        (results, summary)
    }

    /// 在 rayon 线程池上并行执行，共享同一个列缓存；结果顺序与输入一致
    pub fn run_workload_parallel(
        &self,
        queries: &[Query],
    ) -> Result<(Vec<Result<QueryOutcome>>, WorkloadSummary)> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.worker_threads())
            .build()
            .map_err(|e| BitmapError::Config(format!("thread pool: {e}")))?;

        let t0 = Instant::now();
        let results: Vec<_> = pool.install(|| queries.par_iter().map(|q| self.run_query(q)).collect());
        let summary = WorkloadSummary::collect(&results, t0.elapsed(), self.cache().stats());
        info!("{summary} on {} threads", pool.current_num_threads());
        Ok((results, summary))
    }
}
