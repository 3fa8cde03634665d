//! Search result schema / 搜索结果定义

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::avatar::DisplayHandle;
use crate::models::{AttachmentBlob, ParticipantRecord};

/// Participant as returned by search / 搜索返回的参与者
///
/// Raw record fields, with the payload unwrapped and the avatar handle attached.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedParticipant {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// Unwrapped payload (replaces the container) / 已解包的负载
    #[serde(rename = "jsonData")]
    pub payload: Map<String, Value>,
    /// Bodies are reachable through `display_handle` / 附件
    #[serde(skip)]
    pub attachments: Option<BTreeMap<String, AttachmentBlob>>,
    #[serde(rename = "searchTextTokens")]
    pub search_tokens: Vec<String>,
    #[serde(rename = "avatarUrl")]
    pub display_handle: Option<DisplayHandle>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EnrichedParticipant {
    pub fn from_record(
        record: ParticipantRecord,
        payload: Map<String, Value>,
        display_handle: Option<DisplayHandle>,
    ) -> Self {
        Self {
            id: record.id,
            revision: record.revision,
            payload,
            attachments: record.attachments,
            search_tokens: record.search_tokens.unwrap_or_default(),
            display_handle,
            extra: record.extra,
        }
    }
}
