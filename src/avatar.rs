//! Avatar handle cache / 头像句柄缓存
//!
//! Derives a display handle from a participant's photo attachment at most once
//! per document id, and releases every handle on teardown.
//! 每个文档ID最多生成一次显示句柄，拆除时统一释放

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::models::{AttachmentBlob, AttachmentData};
use crate::search::normalizer::image_reference;

/// Payload field holding the image reference / 图像引用字段
pub const DEFAULT_IMAGE_FIELD: &str = "image";
/// Key of the attachment name inside the image field / 附件名所在键
pub const DEFAULT_IMAGE_TEXT_KEY: &str = "#text";

const HANDLE_SCHEME: &str = "blob:participants/";

/// Ephemeral, revocable reference to attachment bytes / 可撤销的显示句柄
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DisplayHandle(Arc<str>);

impl DisplayHandle {
    pub fn new(handle: impl Into<Arc<str>>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplayHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for DisplayHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Whether handles can be created at all / 运行环境
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderContext {
    /// Presentation layer present, handles can be allocated / 交互式
    Interactive,
    /// No presentation layer (batch, prerender) / 无界面
    Headless,
}

impl RenderContext {
    pub fn from_client_flag(is_client: bool) -> Self {
        if is_client {
            RenderContext::Interactive
        } else {
            RenderContext::Headless
        }
    }

    pub fn is_interactive(self) -> bool {
        self == RenderContext::Interactive
    }
}

/// Allocates and releases display handles / 句柄分配器
pub trait HandleAllocator: Send + Sync {
    fn allocate(&self, mime_type: &str, bytes: &Bytes) -> DisplayHandle;

    fn release(&self, handle: &DisplayHandle);
}

/// Resolved handle contents / 句柄指向的内容
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectBody {
    pub mime_type: String,
    pub bytes: Bytes,
}

/// Registry of live object handles (`blob:participants/<uuid>`) / 对象句柄注册表
///
/// Bytes are shared with the attachment, not copied.
#[derive(Default)]
pub struct ObjectUrlRegistry {
    live: RwLock<HashMap<DisplayHandle, ObjectBody>>,
    allocated: AtomicUsize,
}

impl ObjectUrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contents behind a live handle / 查找句柄内容
    pub fn lookup(&self, handle: &DisplayHandle) -> Option<ObjectBody> {
        self.live.read().get(handle).cloned()
    }

    /// Handles allocated and not yet released / 未释放的句柄数
    pub fn live_count(&self) -> usize {
        self.live.read().len()
    }

    /// Handles ever allocated / 累计分配数
    pub fn allocated_count(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }
}

impl HandleAllocator for ObjectUrlRegistry {
    fn allocate(&self, mime_type: &str, bytes: &Bytes) -> DisplayHandle {
        let handle = DisplayHandle::new(format!("{}{}", HANDLE_SCHEME, uuid::Uuid::new_v4()));
        self.live.write().insert(
            handle.clone(),
            ObjectBody { mime_type: mime_type.to_string(), bytes: bytes.clone() },
        );
        self.allocated.fetch_add(1, Ordering::SeqCst);
        handle
    }

    fn release(&self, handle: &DisplayHandle) {
        if self.live.write().remove(handle).is_none() {
            tracing::debug!("Release of unknown handle {}", handle);
        }
    }
}

/// Per-document display handle cache / 按文档缓存显示句柄
pub struct AvatarCache {
    /// doc id -> handle; one lock so check-then-insert is atomic per id
    handles: Mutex<HashMap<String, DisplayHandle>>,
    allocator: Arc<dyn HandleAllocator>,
    image_field: String,
    image_text_key: String,
}

impl AvatarCache {
    pub fn new(allocator: Arc<dyn HandleAllocator>) -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
            allocator,
            image_field: DEFAULT_IMAGE_FIELD.to_string(),
            image_text_key: DEFAULT_IMAGE_TEXT_KEY.to_string(),
        }
    }

    /// Read the image reference from another payload field / 自定义图像字段
    pub fn with_image_field(mut self, field: &str, text_key: &str) -> Self {
        self.image_field = field.to_string();
        self.image_text_key = text_key.to_string();
        self
    }

    /// Display handle for a participant's photo, if one can be produced / 获取头像句柄
    ///
    /// Returns the cached handle when `id` already has one; otherwise derives
    /// a new handle from the referenced attachment's binary data.
    pub fn resolve(
        &self,
        payload: &Map<String, Value>,
        id: &str,
        attachments: Option<&BTreeMap<String, AttachmentBlob>>,
        context: RenderContext,
    ) -> Option<DisplayHandle> {
        if !context.is_interactive() {
            return None;
        }

        let file_name = image_reference(payload, &self.image_field, &self.image_text_key)?;
        let blob = attachments?.get(file_name)?;

        let mut handles = self.handles.lock();
        if let Some(handle) = handles.get(id) {
            return Some(handle.clone());
        }

        let bytes = match &blob.data {
            AttachmentData::Binary(bytes) => bytes,
            _ => {
                tracing::debug!("Attachment {} of {} is not binary, no avatar", file_name, id);
                return None;
            }
        };

        let handle = self.allocator.allocate(&blob.mime_type, bytes);
        handles.insert(id.to_string(), handle.clone());
        Some(handle)
    }

    /// Release every cached handle and empty the cache / 释放全部句柄
    ///
    /// Returns how many handles were released.
    pub fn release_all(&self) -> usize {
        let drained: Vec<DisplayHandle> = {
            let mut handles = self.handles.lock();
            handles.drain().map(|(_, handle)| handle).collect()
        };

        for handle in &drained {
            self.allocator.release(handle);
        }

        if !drained.is_empty() {
            tracing::info!("Released {} avatar handles", drained.len());
        }
        drained.len()
    }

    /// Cached handle for `id`, without deriving one / 查看缓存
    pub fn cached(&self, id: &str) -> Option<DisplayHandle> {
        self.handles.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }
}

impl Default for AvatarCache {
    fn default() -> Self {
        Self::new(Arc::new(ObjectUrlRegistry::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload_with_image(name: &str) -> Map<String, Value> {
        json!({ "name": "Alice", "image": { "#text": name } })
            .as_object()
            .cloned()
            .unwrap()
    }

    fn photo_attachments(name: &str) -> BTreeMap<String, AttachmentBlob> {
        let mut attachments = BTreeMap::new();
        attachments.insert(name.to_string(), AttachmentBlob::binary("image/jpeg", vec![0xFFu8, 0xD8, 0xFF]));
        attachments
    }

    fn cache() -> (Arc<ObjectUrlRegistry>, AvatarCache) {
        let registry = Arc::new(ObjectUrlRegistry::new());
        let cache = AvatarCache::new(registry.clone());
        (registry, cache)
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let (registry, cache) = cache();
        let payload = payload_with_image("photo.jpg");
        let attachments = photo_attachments("photo.jpg");

        let first = cache.resolve(&payload, "p-1", Some(&attachments), RenderContext::Interactive);
        let second = cache.resolve(&payload, "p-1", Some(&attachments), RenderContext::Interactive);

        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(registry.allocated_count(), 1);
        assert!(first.unwrap().as_str().starts_with("blob:participants/"));
    }

    #[test]
    fn test_handle_resolves_to_attachment_bytes() {
        let (registry, cache) = cache();
        let attachments = photo_attachments("photo.jpg");
        let handle = cache
            .resolve(&payload_with_image("photo.jpg"), "p-1", Some(&attachments), RenderContext::Interactive)
            .unwrap();

        let body = registry.lookup(&handle).unwrap();
        assert_eq!(body.mime_type, "image/jpeg");
        assert_eq!(&body.bytes[..], &[0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn test_release_all_then_rederive() {
        let (registry, cache) = cache();
        let payload = payload_with_image("photo.jpg");
        let attachments = photo_attachments("photo.jpg");

        let first = cache.resolve(&payload, "p-1", Some(&attachments), RenderContext::Interactive).unwrap();
        assert_eq!(cache.release_all(), 1);
        assert!(cache.is_empty());
        assert_eq!(registry.live_count(), 0);
        assert!(registry.lookup(&first).is_none());

        let second = cache.resolve(&payload, "p-1", Some(&attachments), RenderContext::Interactive).unwrap();
        assert_ne!(first, second);
        assert_eq!(registry.allocated_count(), 2);
    }

    #[test]
    fn test_release_all_on_empty_cache() {
        let (_, cache) = cache();
        assert_eq!(cache.release_all(), 0);
        assert_eq!(cache.release_all(), 0);
    }

    #[test]
    fn test_headless_context_never_allocates() {
        let (registry, cache) = cache();
        let attachments = photo_attachments("photo.jpg");
        let handle = cache.resolve(&payload_with_image("photo.jpg"), "p-1", Some(&attachments), RenderContext::Headless);
        assert!(handle.is_none());
        assert_eq!(registry.allocated_count(), 0);
        assert!(cache.cached("p-1").is_none());
    }

    #[test]
    fn test_missing_image_or_attachment() {
        let (_, cache) = cache();
        let attachments = photo_attachments("photo.jpg");
        let no_image = json!({ "name": "Bob" }).as_object().cloned().unwrap();

        assert!(cache.resolve(&no_image, "p-1", Some(&attachments), RenderContext::Interactive).is_none());
        assert!(cache
            .resolve(&payload_with_image("other.jpg"), "p-1", Some(&attachments), RenderContext::Interactive)
            .is_none());
        assert!(cache
            .resolve(&payload_with_image("photo.jpg"), "p-1", None, RenderContext::Interactive)
            .is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_non_binary_attachment_is_skipped() {
        let (registry, cache) = cache();
        let mut attachments = BTreeMap::new();
        attachments.insert(
            "photo.jpg".to_string(),
            AttachmentBlob {
                mime_type: "image/jpeg".to_string(),
                digest: String::new(),
                data: AttachmentData::Base64("/9j/".to_string()),
            },
        );

        let handle = cache.resolve(&payload_with_image("photo.jpg"), "p-1", Some(&attachments), RenderContext::Interactive);
        assert!(handle.is_none());
        assert_eq!(registry.allocated_count(), 0);
    }

    #[test]
    fn test_custom_image_field() {
        let registry = Arc::new(ObjectUrlRegistry::new());
        let cache = AvatarCache::new(registry).with_image_field("photo", "file");
        let payload = json!({ "photo": { "file": "me.png" } }).as_object().cloned().unwrap();
        let attachments = photo_attachments("me.png");
        assert!(cache.resolve(&payload, "p-1", Some(&attachments), RenderContext::Interactive).is_some());
    }

    #[test]
    fn test_render_context_from_flag() {
        assert_eq!(RenderContext::from_client_flag(true), RenderContext::Interactive);
        assert_eq!(RenderContext::from_client_flag(false), RenderContext::Headless);
    }
}
