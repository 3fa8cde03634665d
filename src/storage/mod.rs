//! Store adapter - document store primitives consumed by search / 文档存储适配器
//!
//! Architecture principle: the store only provides primitives, search controls flow.
//! 架构原则：存储只提供原语操作，由搜索引擎控制流程

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::models::ParticipantRecord;

pub mod dump;
pub mod memory;

pub use dump::{load_dump, parse_dump, DumpOptions};
pub use memory::{MemoryStore, StoreOp};

/// Store-level failure / 存储层错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("document update conflict: {id}")]
    Conflict { id: String },
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("invalid selector pattern {pattern:?}: {reason}")]
    InvalidSelector { pattern: String, reason: String },
    #[error("failed to decode documents: {0}")]
    Decode(String),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Fetch options / 获取选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Return attachment bodies instead of stubs / 返回附件内容
    pub include_attachments: bool,
}

impl FetchOptions {
    pub fn with_attachments() -> Self {
        Self { include_attachments: true }
    }
}

/// One row of a bulk fetch / 批量获取的一行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocRow {
    pub id: String,
    #[serde(rename = "doc", default, skip_serializing_if = "Option::is_none")]
    pub record: Option<ParticipantRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocRow {
    pub fn found(record: ParticipantRecord) -> Self {
        Self { id: record.id.clone(), record: Some(record), error: None }
    }

    pub fn failed(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self { id: id.into(), record: None, error: Some(error.into()) }
    }

    /// Usable record, if the row carries no error / 可用记录
    pub fn into_record(self) -> Option<ParticipantRecord> {
        match self.error {
            Some(_) => None,
            None => self.record,
        }
    }
}

/// One clause: some element of `field` must match `pattern` / 元素匹配子句
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElemMatch {
    pub field: String,
    pub pattern: String,
}

/// Conjunction of element-match clauses over array fields / 元素匹配的合取
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    pub clauses: Vec<ElemMatch>,
}

impl Selector {
    /// Every token must be contained in some element of `field` / 每个词都需匹配
    ///
    /// Tokens are passed to the store as patterns, unescaped. A token the store
    /// can't compile fails the lookup with `InvalidSelector`.
    pub fn all_elements_match(field: &str, tokens: &[String]) -> Self {
        Self {
            clauses: tokens
                .iter()
                .map(|token| ElemMatch {
                    field: field.to_string(),
                    pattern: token.clone(),
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Mango-style form, for logging and for stores that speak it / Mango 查询格式
    pub fn to_mango(&self) -> Value {
        let clauses: Vec<Value> = self
            .clauses
            .iter()
            .map(|clause| {
                let mut object = serde_json::Map::new();
                object.insert(
                    clause.field.clone(),
                    json!({ "$elemMatch": { "$regex": clause.pattern } }),
                );
                Value::Object(object)
            })
            .collect();
        json!({ "$and": clauses })
    }
}

/// Document store interface (only the primitives search needs) / 文档存储接口
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Every live document / 获取全部文档
    async fn fetch_all(&self, options: FetchOptions) -> Result<Vec<DocRow>, StoreError>;

    /// Ids of documents matching the selector, no bodies / 仅返回匹配文档的ID
    async fn find_ids(&self, selector: &Selector) -> Result<Vec<String>, StoreError>;

    /// Documents for exactly these ids, one row per id / 按ID批量获取
    async fn fetch_by_ids(
        &self,
        ids: &[String],
        options: FetchOptions,
    ) -> Result<Vec<DocRow>, StoreError>;
}
