//! 全局基础类型与错误定义

use std::str::FromStr;
use thiserror::Error;

// ── ID 类型别名 ───────────────────────────────────────────────────────────────

/// 列编号：一个 (属性, 分箱) 对应一列位图
pub type ColumnId = u32;

// ── 运算符 ────────────────────────────────────────────────────────────────────

/// 查询运算符，目前只支持 AND / OR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    And,
    Or,
}

impl Operator {
    /// 查询文本中使用的符号
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::And => "&",
            Operator::Or  => "|",
        }
    }

    /// 按位作用于两个字（调用方负责截断到有效位宽）
    #[inline]
    pub fn apply(self, a: u64, b: u64) -> u64 {
        match self {
            Operator::And => a & b,
            Operator::Or  => a | b,
        }
    }

    #[inline]
    pub fn apply_bit(self, a: bool, b: bool) -> bool {
        match self {
            Operator::And => a && b,
            Operator::Or  => a || b,
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Operator {
    type Err = BitmapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "&" => Ok(Operator::And),
            "|" => Ok(Operator::Or),
            other => Err(BitmapError::UnsupportedOperator(other.to_string())),
        }
    }
}

// ── 错误 ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum BitmapError {
    #[error("column {column}: I/O error: {source}")]
    ColumnIo {
        column: ColumnId,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid range: {start} to {end}")]
    InvalidRange { start: ColumnId, end: ColumnId },
    #[error("fill run length {run} exceeds per-word capacity {max}")]
    RunLengthOverflow { run: u64, max: u64 },
    #[error("unsupported operator: {0:?}")]
    UnsupportedOperator(String),
    #[error("malformed word: {0:#x}")]
    MalformedWord(u64),
    #[error("query parse error at line {line}: {reason}")]
    QueryParse { line: usize, reason: String },
    #[error("unsupported word width: {0} bits")]
    UnsupportedWordWidth(u32),
    #[error("config error: {0}")]
    Config(String),
}

impl BitmapError {
    /// 是否属于 I/O 类错误（文件缺失、截断、读失败）
    pub fn is_io(&self) -> bool {
        matches!(self, BitmapError::ColumnIo { .. } | BitmapError::Io(_))
    }

    /// 给一个裸 I/O 错误补上列编号
    pub(crate) fn for_column(self, column: ColumnId) -> Self {
        match self {
            BitmapError::Io(source) => BitmapError::ColumnIo { column, source },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, BitmapError>;
