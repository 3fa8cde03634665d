pub mod avatar;
pub mod config;
pub mod models;
pub mod search;
pub mod storage;

pub use avatar::{AvatarCache, DisplayHandle, ObjectUrlRegistry, RenderContext};
pub use models::{AttachmentBlob, AttachmentData, ParticipantRecord};
pub use search::{EnrichedParticipant, SearchEngine};
pub use storage::{MemoryStore, StoreAdapter, StoreError};
