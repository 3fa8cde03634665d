//! Document dump loader / 文档导入
//!
//! Accepts a JSON array of documents or `{ "docs": [...] }`, with attachments
//! in the store's base64 encoding. Attachments are decoded to binary on load.

use serde::Deserialize;
use std::path::Path;

use super::{MemoryStore, StoreError};
use crate::models::ParticipantRecord;
use crate::search::{normalize, payload_tokens};

#[derive(Deserialize)]
#[serde(untagged)]
enum DumpFile {
    Docs(Vec<ParticipantRecord>),
    Wrapped { docs: Vec<ParticipantRecord> },
}

/// Import options / 导入选项
#[derive(Debug, Clone, Copy, Default)]
pub struct DumpOptions {
    /// Build tokens from the payload when a document has none / 缺失时生成分词
    pub derive_missing_tokens: bool,
}

/// Parse dump content and decode attachments / 解析导出内容
pub fn parse_dump(content: &str, options: DumpOptions) -> Result<Vec<ParticipantRecord>, StoreError> {
    let docs = match serde_json::from_str(content)? {
        DumpFile::Docs(docs) => docs,
        DumpFile::Wrapped { docs } => docs,
    };

    Ok(docs.into_iter().map(|record| prepare(record, options)).collect())
}

fn prepare(mut record: ParticipantRecord, options: DumpOptions) -> ParticipantRecord {
    if let Some(attachments) = record.attachments.as_mut() {
        for (name, blob) in attachments.iter_mut() {
            // Undecodable content stays base64 and simply won't render
            if let Err(e) = blob.decode() {
                tracing::warn!("Attachment {} of {} is not valid base64: {}", name, record.id, e);
            }
        }
    }

    if options.derive_missing_tokens && record.search_tokens.is_none() {
        if let Some(payload) = normalize(&record) {
            let tokens = payload_tokens(payload);
            record.search_tokens = Some(tokens);
        }
    }

    record
}

/// Load a dump file into the store, returns how many documents were stored / 导入文件
pub async fn load_dump(
    store: &MemoryStore,
    path: &Path,
    options: DumpOptions,
) -> Result<usize, StoreError> {
    let content = tokio::fs::read_to_string(path).await?;
    let records = parse_dump(&content, options)?;

    let mut loaded = 0;
    for mut record in records {
        // Revisions from the source store mean nothing here
        record.revision = None;
        let id = record.id.clone();
        match store.put(record).await {
            Ok(_) => loaded += 1,
            Err(e) => tracing::warn!("Skipping participant {}: {}", id, e),
        }
    }

    tracing::info!("Loaded {} participants from {:?}", loaded, path);
    Ok(loaded)
}
