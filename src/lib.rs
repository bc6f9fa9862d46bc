//! # bitmap-query-engine
//!
//! 位图索引查询引擎：属性值预先分箱成列，每列以 WAH 压缩位图存盘；
//! 点查询 / 范围查询直接在压缩字上做 AND / OR，结果仍是压缩列。
//!
//! ## 整体架构
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      QueryEngine                          │
//! │   Query::Point / Query::Range     run_workload(_parallel) │
//! │           │                                               │
//! │           ▼                                               │
//! │   ┌───────────────┐   miss   ┌──────────────────────────┐ │
//! │   │  ColumnCache  │ ───────▶ │ StorageProvider::open    │ │
//! │   │ (64 分片,单飞) │ ◀─────── │ ColumnReader::read_column│ │
//! │   └───────┬───────┘          └──────────────────────────┘ │
//! │           │ Arc<CompressedColumn>                          │
//! │           ▼                                               │
//! │   merge::merge(op, A, B)  ── 双游标流式合并               │
//! │     ├─ fill × fill        → fill(min run)                 │
//! │     ├─ fill × literal     → literal                       │
//! │     └─ literal × literal  → literal                       │
//! │           │                                               │
//! │           ▼                                               │
//! │   CompressedColumn  ←  WordCodec (WAH32 / WAH64)          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! 完整演示见 `demos/basic_usage.rs`（仓库根目录的 `examples/` 另作他用，
//! Cargo.toml 里用 `[[example]]` 指过去），运行 `cargo run --example basic_usage`。

// ── 基础 ─────────────────────────────────────────────────────────────────────
pub mod common;
pub mod config;

// ── 压缩列 ───────────────────────────────────────────────────────────────────
pub mod codec;
pub mod column;
pub mod reader;
pub mod column_writer;
pub mod merge;

// ── 查询 ─────────────────────────────────────────────────────────────────────
pub mod storage;
pub mod cache;
pub mod query;
pub mod workload;

pub use codec::{BitmapEncoding, DecodedSegment, WordCodec};
pub use column::CompressedColumn;
pub use common::{BitmapError, ColumnId, Operator, Result};
pub use config::EngineConfig;
pub use query::{Query, QueryEngine};
