//! In-memory document store / 内存文档存储
//!
//! Reference adapter used by the CLI and tests:
//! - Documents kept in id order, deletions leave tombstones / 按ID排序，删除保留墓碑
//! - Optimistic concurrency via revisions / 基于修订号的乐观并发
//! - Selectors evaluated with regex / 使用正则匹配选择器

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::{DocRow, FetchOptions, Selector, StoreAdapter, StoreError};
use crate::models::ParticipantRecord;

/// Store operation, for call accounting and fault injection / 存储操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    FetchAll,
    FindIds,
    FetchByIds,
}

impl StoreOp {
    fn index(self) -> usize {
        match self {
            StoreOp::FetchAll => 0,
            StoreOp::FindIds => 1,
            StoreOp::FetchByIds => 2,
        }
    }
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreOp::FetchAll => "fetch_all",
            StoreOp::FindIds => "find_ids",
            StoreOp::FetchByIds => "fetch_by_ids",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
struct StoredDoc {
    record: ParticipantRecord,
    seq: u64,
    deleted: bool,
}

/// In-memory store / 内存存储
#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<BTreeMap<String, StoredDoc>>,
    /// Operations whose next call fails / 下一次调用将失败的操作
    faults: Mutex<HashSet<StoreOp>>,
    calls: [AtomicUsize; 3],
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or update a document, returns the new revision / 写入文档
    ///
    /// Updating a live document requires its current revision.
    pub async fn put(&self, mut record: ParticipantRecord) -> Result<String, StoreError> {
        let mut docs = self.docs.write().await;

        let seq = match docs.get(&record.id) {
            Some(existing) if !existing.deleted => {
                if record.revision != existing.record.revision {
                    return Err(StoreError::Conflict { id: record.id });
                }
                existing.seq + 1
            }
            Some(existing) => existing.seq + 1,
            None => 1,
        };

        record.revision = None;
        let rev = revision_for(seq, &record)?;
        record.revision = Some(rev.clone());

        tracing::debug!("Stored participant {} at {}", record.id, rev);
        docs.insert(record.id.clone(), StoredDoc { record, seq, deleted: false });
        Ok(rev)
    }

    /// Delete a document, leaving a tombstone / 删除文档
    pub async fn remove(&self, id: &str, rev: &str) -> Result<String, StoreError> {
        let mut docs = self.docs.write().await;
        let stored = docs
            .get_mut(id)
            .filter(|stored| !stored.deleted)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if stored.record.revision.as_deref() != Some(rev) {
            return Err(StoreError::Conflict { id: id.to_string() });
        }

        stored.seq += 1;
        stored.deleted = true;
        let mut tombstone = ParticipantRecord::new(id);
        let new_rev = revision_for(stored.seq, &tombstone)?;
        tombstone.revision = Some(new_rev.clone());
        stored.record = tombstone;

        tracing::debug!("Deleted participant {} at {}", id, new_rev);
        Ok(new_rev)
    }

    /// Fetch one live document with attachments / 获取单个文档
    pub async fn get(&self, id: &str) -> Result<ParticipantRecord, StoreError> {
        let docs = self.docs.read().await;
        docs.get(id)
            .filter(|stored| !stored.deleted)
            .map(|stored| stored.record.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Number of live documents / 文档数量
    pub async fn len(&self) -> usize {
        self.docs.read().await.values().filter(|stored| !stored.deleted).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Make the next call of `op` fail with `Unavailable` / 注入一次故障
    pub fn fail_next(&self, op: StoreOp) {
        self.faults.lock().insert(op);
    }

    /// How many times `op` has been called / 调用次数
    pub fn call_count(&self, op: StoreOp) -> usize {
        self.calls[op.index()].load(Ordering::SeqCst)
    }

    fn enter(&self, op: StoreOp) -> Result<(), StoreError> {
        self.calls[op.index()].fetch_add(1, Ordering::SeqCst);
        if self.faults.lock().remove(&op) {
            return Err(StoreError::Unavailable(format!("injected failure in {}", op)));
        }
        Ok(())
    }
}

fn shape(record: &ParticipantRecord, options: FetchOptions) -> ParticipantRecord {
    if options.include_attachments {
        record.clone()
    } else {
        record.without_attachment_data()
    }
}

/// `<seq>-<first 32 hex chars of sha256(body)>` / 生成修订号
fn revision_for(seq: u64, record: &ParticipantRecord) -> Result<String, StoreError> {
    let body = serde_json::to_vec(record)?;
    let digest = hex::encode(Sha256::digest(&body));
    Ok(format!("{}-{}", seq, &digest[..32]))
}

fn compile(selector: &Selector) -> Result<Vec<(&str, Regex)>, StoreError> {
    selector
        .clauses
        .iter()
        .map(|clause| {
            Regex::new(&clause.pattern)
                .map(|re| (clause.field.as_str(), re))
                .map_err(|e| StoreError::InvalidSelector {
                    pattern: clause.pattern.clone(),
                    reason: e.to_string(),
                })
        })
        .collect()
}

#[async_trait]
impl StoreAdapter for MemoryStore {
    async fn fetch_all(&self, options: FetchOptions) -> Result<Vec<DocRow>, StoreError> {
        self.enter(StoreOp::FetchAll)?;
        let docs = self.docs.read().await;
        Ok(docs
            .values()
            .filter(|stored| !stored.deleted)
            .map(|stored| DocRow::found(shape(&stored.record, options)))
            .collect())
    }

    async fn find_ids(&self, selector: &Selector) -> Result<Vec<String>, StoreError> {
        self.enter(StoreOp::FindIds)?;
        let clauses = compile(selector)?;
        let docs = self.docs.read().await;

        let ids: Vec<String> = docs
            .values()
            .filter(|stored| !stored.deleted)
            .filter(|stored| {
                clauses.iter().all(|(field, re)| {
                    stored.record.string_array(field).iter().any(|element| re.is_match(element))
                })
            })
            .map(|stored| stored.record.id.clone())
            .collect();

        tracing::debug!("Selector {} matched {} documents", selector.to_mango(), ids.len());
        Ok(ids)
    }

    async fn fetch_by_ids(
        &self,
        ids: &[String],
        options: FetchOptions,
    ) -> Result<Vec<DocRow>, StoreError> {
        self.enter(StoreOp::FetchByIds)?;
        let docs = self.docs.read().await;
        Ok(ids
            .iter()
            .map(|id| match docs.get(id) {
                Some(stored) if stored.deleted => DocRow { id: id.clone(), record: None, error: None },
                Some(stored) => DocRow::found(shape(&stored.record, options)),
                None => DocRow::failed(id.clone(), "not_found"),
            })
            .collect())
    }
}
