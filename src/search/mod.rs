//! Search module - participant retrieval / 搜索模块
//!
//! Architecture principles / 架构原则：
//! - Store adapter only exposes primitives: fetch_all, find_ids, fetch_by_ids
//! - Search controls the flow: path selection, hydration, enrichment
//! - Call direction: Search → Store (unidirectional) / 调用方向
//!
//! Pieces / 组成：
//! - normalizer: unwraps the dynamically-keyed payload / 负载解包
//! - tokenizer: query and index tokens / 分词
//! - engine: two-phase token search and full browse / 两阶段检索

pub mod engine;
pub mod normalizer;
pub mod schema;
pub mod tokenizer;

pub use engine::SearchEngine;
pub use normalizer::{image_reference, normalize};
pub use schema::EnrichedParticipant;
pub use tokenizer::{index_tokens, payload_tokens, tokenize_query};
