//! Search engine - participant retrieval over a document store / 搜索引擎
//!
//! Two retrieval paths / 两种检索路径:
//! - Empty query: fetch every document with attachments / 空查询：全量获取
//! - Token query: ids via the token index first, then hydrate only those ids
//!   with attachments, since the index path cannot return binaries
//!   / 分词查询：先按索引取ID，再批量获取带附件的完整文档
//!
//! Result order is whatever the hydration fetch returns; callers must not
//! assume it follows phase-1 order.

use std::sync::Arc;

use super::normalizer::normalize;
use super::schema::EnrichedParticipant;
use super::tokenizer::tokenize_query;
use crate::avatar::{AvatarCache, RenderContext};
use crate::models::{ParticipantRecord, SEARCH_TOKENS_FIELD};
use crate::storage::{DocRow, FetchOptions, Selector, StoreAdapter, StoreError};

/// Search engine / 搜索引擎
///
/// Stateless apart from the shared avatar cache; concurrent searches are fine.
pub struct SearchEngine<S: StoreAdapter> {
    store: Arc<S>,
    cache: Arc<AvatarCache>,
    token_field: String,
}

impl<S: StoreAdapter> Clone for SearchEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            cache: self.cache.clone(),
            token_field: self.token_field.clone(),
        }
    }
}

impl<S: StoreAdapter> SearchEngine<S> {
    pub fn new(store: Arc<S>, cache: Arc<AvatarCache>) -> Self {
        Self {
            store,
            cache,
            token_field: SEARCH_TOKENS_FIELD.to_string(),
        }
    }

    /// Match query tokens against another array field / 指定分词字段
    pub fn with_token_field(mut self, field: &str) -> Self {
        self.token_field = field.to_string();
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Shared avatar cache, for `release_all` on scope teardown / 头像缓存
    pub fn cache(&self) -> &Arc<AvatarCache> {
        &self.cache
    }

    /// Search participants (never fails) / 搜索参与者
    ///
    /// Store failures are logged and reported as an empty result.
    pub async fn search(&self, query: &str, context: RenderContext) -> Vec<EnrichedParticipant> {
        let tokens = tokenize_query(query);

        let result = if tokens.is_empty() {
            self.browse(context).await
        } else {
            self.search_tokens(&tokens, context).await
        };

        match result {
            Ok(participants) => {
                tracing::debug!("Search {:?} returned {} participants", query, participants.len());
                participants
            }
            Err(e) => {
                tracing::error!("Participant search {:?} failed: {}", query, e);
                Vec::new()
            }
        }
    }

    /// Every well-formed participant / 全部参与者
    pub async fn browse(&self, context: RenderContext) -> Result<Vec<EnrichedParticipant>, StoreError> {
        let rows = self.store.fetch_all(FetchOptions::with_attachments()).await?;
        Ok(self.enrich_rows(rows, context))
    }

    async fn search_tokens(
        &self,
        tokens: &[String],
        context: RenderContext,
    ) -> Result<Vec<EnrichedParticipant>, StoreError> {
        let ids = self.select_ids(tokens).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.hydrate(&ids, context).await
    }

    /// Phase 1: ids whose tokens contain every query token / 阶段一：按索引选ID
    pub async fn select_ids(&self, tokens: &[String]) -> Result<Vec<String>, StoreError> {
        let selector = Selector::all_elements_match(&self.token_field, tokens);
        let ids = self.store.find_ids(&selector).await?;
        tracing::debug!("Token query {:?} selected {} ids", tokens, ids.len());
        Ok(ids)
    }

    /// Phase 2: full documents with attachments for these ids / 阶段二：批量获取完整文档
    pub async fn hydrate(
        &self,
        ids: &[String],
        context: RenderContext,
    ) -> Result<Vec<EnrichedParticipant>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.store.fetch_by_ids(ids, FetchOptions::with_attachments()).await?;
        Ok(self.enrich_rows(rows, context))
    }

    fn enrich_rows(&self, rows: Vec<DocRow>, context: RenderContext) -> Vec<EnrichedParticipant> {
        rows.into_iter()
            .filter_map(|row| {
                if let Some(error) = &row.error {
                    tracing::debug!("Skipping row {}: {}", row.id, error);
                }
                row.into_record()
            })
            .filter_map(|record| self.enrich(record, context))
            .collect()
    }

    /// Unwrap the payload and attach the avatar handle / 补全单条记录
    fn enrich(&self, record: ParticipantRecord, context: RenderContext) -> Option<EnrichedParticipant> {
        let payload = normalize(&record)?.clone();
        let display_handle =
            self.cache
                .resolve(&payload, &record.id, record.attachments.as_ref(), context);
        Some(EnrichedParticipant::from_record(record, payload, display_handle))
    }
}
