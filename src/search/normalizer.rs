//! Document normalizer - unwraps the single dynamically-named payload / 文档规范化
//!
//! Stored documents nest the case data one level down, under a key that is not
//! known in advance (`jsonData.<form name>`). The first key is authoritative;
//! producers are expected to write exactly one.

use serde_json::{Map, Value};

use crate::models::ParticipantRecord;

/// Payload mapping of a record, or `None` when the record must be excluded / 提取负载
pub fn normalize(record: &ParticipantRecord) -> Option<&Map<String, Value>> {
    let container = match record.payload_container.as_ref().and_then(Value::as_object) {
        Some(container) if !container.is_empty() => container,
        _ => {
            tracing::warn!("Participant {} has no payload data, skipping", record.id);
            return None;
        }
    };

    if container.len() > 1 {
        tracing::debug!(
            "Participant {} has {} payload keys, using the first",
            record.id,
            container.len()
        );
    }

    let (key, value) = container.iter().next()?;
    match value.as_object() {
        Some(payload) => Some(payload),
        None => {
            tracing::warn!(
                "Payload {:?} of participant {} is not an object, skipping",
                key,
                record.id
            );
            None
        }
    }
}

/// Attachment name referenced by `payload[field][text_key]` / 图像引用
pub fn image_reference<'a>(
    payload: &'a Map<String, Value>,
    field: &str,
    text_key: &str,
) -> Option<&'a str> {
    payload
        .get(field)?
        .as_object()?
        .get(text_key)?
        .as_str()
        .filter(|name| !name.is_empty())
}
