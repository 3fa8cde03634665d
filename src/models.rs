//! Participant document model / 参与者文档模型
//!
//! Field names follow the document store's wire shape (`_id`, `_rev`,
//! `jsonData`, `_attachments`, `searchTextTokens`).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Name of the precomputed token array field / 预计算分词字段名
pub const SEARCH_TOKENS_FIELD: &str = "searchTextTokens";

/// Participant record as stored / 存储中的参与者记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    #[serde(rename = "_id")]
    pub id: String,
    /// Optimistic concurrency marker, opaque to the search core / 修订号
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// Container whose single (first) key holds the case payload / 负载容器
    #[serde(rename = "jsonData", default, skip_serializing_if = "Option::is_none")]
    pub payload_container: Option<Value>,
    #[serde(rename = "_attachments", default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<BTreeMap<String, AttachmentBlob>>,
    #[serde(rename = "searchTextTokens", default, skip_serializing_if = "Option::is_none")]
    pub search_tokens: Option<Vec<String>>,
    /// Any other top-level fields (e.g. `name`) / 其他顶层字段
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ParticipantRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            revision: None,
            payload_container: None,
            attachments: None,
            search_tokens: None,
            extra: Map::new(),
        }
    }

    /// Wrap `payload` under the container key `form` / 设置负载
    pub fn with_payload(mut self, form: &str, payload: Value) -> Self {
        let mut container = Map::new();
        container.insert(form.to_string(), payload);
        self.payload_container = Some(Value::Object(container));
        self
    }

    pub fn with_tokens<I, T>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.search_tokens = Some(tokens.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_attachment(mut self, name: &str, blob: AttachmentBlob) -> Self {
        self.attachments
            .get_or_insert_with(BTreeMap::new)
            .insert(name.to_string(), blob);
        self
    }

    /// Precomputed tokens, empty when absent / 预计算分词
    pub fn tokens(&self) -> &[String] {
        self.search_tokens.as_deref().unwrap_or(&[])
    }

    /// String elements of a named array field, as a selector sees them / 数组字段的字符串元素
    pub fn string_array(&self, field: &str) -> Vec<&str> {
        if field == SEARCH_TOKENS_FIELD {
            return self.tokens().iter().map(String::as_str).collect();
        }
        match self.extra.get(field) {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Copy with attachment bodies replaced by stubs / 附件替换为存根
    pub fn without_attachment_data(&self) -> Self {
        let mut record = self.clone();
        if let Some(attachments) = record.attachments.as_mut() {
            for blob in attachments.values_mut() {
                blob.data = AttachmentData::Stub { length: blob.data.len() };
            }
        }
        record
    }
}

/// Attachment body as handed back by the store / 附件内容
#[derive(Debug, Clone, PartialEq)]
pub enum AttachmentData {
    /// Raw octets / 原始二进制
    Binary(Bytes),
    /// Base64 text, as stored on the wire / Base64 文本
    Base64(String),
    /// Metadata only / 仅元数据
    Stub { length: u64 },
}

impl AttachmentData {
    /// Length of the decoded content / 内容长度
    pub fn len(&self) -> u64 {
        match self {
            AttachmentData::Binary(bytes) => bytes.len() as u64,
            // 4 base64 chars carry 3 bytes, minus padding
            AttachmentData::Base64(text) => {
                let padding = text.bytes().rev().take_while(|b| *b == b'=').count();
                ((text.len() / 4) * 3).saturating_sub(padding) as u64
            }
            AttachmentData::Stub { length } => *length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, AttachmentData::Binary(_))
    }
}

/// Binary attachment (e.g. a participant photo) / 二进制附件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawAttachment", into = "RawAttachment")]
pub struct AttachmentBlob {
    pub mime_type: String,
    /// Content hash, not verified here / 内容摘要
    pub digest: String,
    pub data: AttachmentData,
}

impl AttachmentBlob {
    /// Build a binary blob and compute its `md5-<base64>` digest / 构建二进制附件
    pub fn binary(mime_type: &str, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self {
            mime_type: mime_type.to_string(),
            digest: content_digest(&bytes),
            data: AttachmentData::Binary(bytes),
        }
    }

    /// Decode base64 content into binary in place / 将 Base64 解码为二进制
    pub fn decode(&mut self) -> Result<(), base64::DecodeError> {
        if let AttachmentData::Base64(text) = &self.data {
            let bytes = STANDARD.decode(text)?;
            self.data = AttachmentData::Binary(Bytes::from(bytes));
        }
        Ok(())
    }
}

/// Store-style content digest / 存储格式的摘要
pub fn content_digest(bytes: &[u8]) -> String {
    format!("md5-{}", STANDARD.encode(md5::compute(bytes).0))
}

/// Wire representation of an attachment / 附件的传输格式
#[derive(Serialize, Deserialize)]
struct RawAttachment {
    content_type: String,
    #[serde(default)]
    digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    stub: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    length: Option<u64>,
}

impl From<RawAttachment> for AttachmentBlob {
    fn from(raw: RawAttachment) -> Self {
        let data = match raw.data {
            Some(text) => AttachmentData::Base64(text),
            None => AttachmentData::Stub { length: raw.length.unwrap_or(0) },
        };
        Self {
            mime_type: raw.content_type,
            digest: raw.digest,
            data,
        }
    }
}

impl From<AttachmentBlob> for RawAttachment {
    fn from(blob: AttachmentBlob) -> Self {
        let (data, stub, length) = match blob.data {
            AttachmentData::Binary(bytes) => (Some(STANDARD.encode(&bytes)), false, None),
            AttachmentData::Base64(text) => (Some(text), false, None),
            AttachmentData::Stub { length } => (None, true, Some(length)),
        };
        Self {
            content_type: blob.mime_type,
            digest: blob.digest,
            data,
            stub,
            length,
        }
    }
}
