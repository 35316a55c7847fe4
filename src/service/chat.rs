//! Chat Service - 질문 → 근거 기반 답변 파이프라인
//!
//! 질문 하나의 처리 순서:
//! 1. 입력 검증, 모델 식별자 해석 (인덱스 접근 전)
//! 2. 질의 확장 (선택, 실패해도 계속)
//! 3. 하이브리드 검색
//! 4. 재순위화 (Reranker가 없으면 생략)
//! 5. 답변 생성
//! 6. 대화/메시지 저장 (하나의 트랜잭션)

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::RagConfig;
use crate::error::{RagError, RagResult};
use crate::knowledge::{
    Conversation, HybridRetriever, Message, NewExchange, Passage, RecordStore, RetrievalMode,
    Retriever,
};
use crate::llm::{ModelBackend, ModelProvider, ModelRegistry};
use crate::rag::{AnswerGenerator, QueryAugmenter, Reranker};

/// 질의응답 결과
#[derive(Debug, Clone, Serialize)]
pub struct AnswerRecord {
    pub conversation_id: Uuid,
    pub answer: String,
    pub created_at: DateTime<Utc>,
    /// 답변 근거 Passage (저장되지 않음)
    #[serde(skip)]
    pub sources: Vec<Passage>,
}

/// 서비스 상태
#[derive(Debug, Clone, Serialize)]
pub struct ChatStatus {
    pub vector_count: usize,
    pub lexical_enabled: bool,
    pub retrieval_mode: String,
    pub reranker_enabled: bool,
    pub augmenter_enabled: bool,
}

/// 질의응답 서비스
pub struct ChatService {
    retriever: HybridRetriever,
    reranker: Option<Reranker>,
    augmenter: Option<QueryAugmenter>,
    generator: AnswerGenerator,
    registry: ModelRegistry,
    provider: Arc<dyn ModelProvider>,
    records: Arc<RecordStore>,
    answer_temperature: f32,
    candidate_limit: usize,
}

impl ChatService {
    /// 서비스 시작
    ///
    /// 어휘 인덱스를 현재 밀집 인덱스 내용으로 구축하고,
    /// 질의 확장 모델 연결을 시도합니다 (실패 시 확장 없이 동작).
    pub async fn start(
        retriever: HybridRetriever,
        reranker: Option<Reranker>,
        records: Arc<RecordStore>,
        provider: Arc<dyn ModelProvider>,
        config: &RagConfig,
    ) -> RagResult<Self> {
        let indexed = retriever.resync().await?;
        tracing::info!("Chat service starting with {} lexically indexed passages", indexed);

        let augment_backend = ModelBackend::Hosted {
            model: config.models.augment_model.clone(),
        };
        let augmenter = match provider.connect(&augment_backend, config.models.augment_temperature) {
            Ok(model) => Some(QueryAugmenter::new(model)),
            Err(e) => {
                tracing::warn!("Query augmentation disabled: {}", e);
                None
            }
        };

        if reranker.is_none() {
            tracing::warn!("No reranker available; retrieval candidates will be used as-is");
        }

        Ok(Self {
            retriever,
            reranker,
            augmenter,
            generator: AnswerGenerator::new(),
            registry: ModelRegistry::new(&config.models),
            provider,
            records,
            answer_temperature: config.models.answer_temperature,
            candidate_limit: config.retrieval.candidate_limit,
        })
    }

    /// 질의 확장 끄기/바꾸기
    pub fn with_augmenter(mut self, augmenter: Option<QueryAugmenter>) -> Self {
        self.augmenter = augmenter;
        self
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// 질문에 답하고 대화에 기록
    pub async fn answer_question(
        &self,
        user_id: i64,
        question: &str,
        conversation_id: Option<Uuid>,
        model_identifier: &str,
    ) -> RagResult<AnswerRecord> {
        let result = self
            .answer_inner(user_id, question, conversation_id, model_identifier)
            .await;

        if let Err(e) = &result {
            tracing::error!(
                user_id,
                model = model_identifier,
                question = question,
                kind = ?e.kind(),
                "Failed to answer question: {:#}",
                e
            );
        }
        result
    }

    async fn answer_inner(
        &self,
        user_id: i64,
        question: &str,
        conversation_id: Option<Uuid>,
        model_identifier: &str,
    ) -> RagResult<AnswerRecord> {
        if question.trim().is_empty() {
            return Err(RagError::Validation("question must not be empty".into()));
        }

        let backend = self.registry.resolve(model_identifier)?;
        let model = self.provider.connect(&backend, self.answer_temperature)?;

        let retrieval_query = match &self.augmenter {
            Some(augmenter) => augmenter.augment(question).await,
            None => question.to_string(),
        };

        let candidates = self
            .retriever
            .retrieve(&retrieval_query, self.candidate_limit)
            .await?;
        if candidates.is_empty() {
            tracing::warn!("No context retrieved for user {}", user_id);
        }

        let ranked = match &self.reranker {
            Some(reranker) => reranker.rerank(question, candidates).await?,
            None => {
                tracing::warn!("Reranking bypassed: relevance model unavailable");
                candidates
            }
        };

        let passages: Vec<Passage> = ranked.into_iter().map(|r| r.passage).collect();
        let generated = self
            .generator
            .generate(model.as_ref(), question, passages)
            .await?;

        let message = self.records.record_exchange(NewExchange {
            user_id,
            conversation_id,
            question,
            answer: &generated.answer_text,
            model_identifier,
        })?;

        tracing::info!(
            "Answered question for user {} in conversation {} with {} ({} sources)",
            user_id,
            message.conversation_id,
            backend.model(),
            generated.source_passages.len()
        );

        Ok(AnswerRecord {
            conversation_id: message.conversation_id,
            answer: message.answer,
            created_at: message.created_at,
            sources: generated.source_passages,
        })
    }

    /// 사용자의 대화 목록 (최근순)
    pub fn list_conversations(&self, user_id: i64) -> RagResult<Vec<Conversation>> {
        Ok(self.records.list_conversations(user_id)?)
    }

    /// 대화 기록 (소유하지 않은 대화는 빈 목록)
    pub fn get_history(&self, user_id: i64, conversation_id: Uuid) -> RagResult<Vec<Message>> {
        Ok(self.records.get_history(user_id, conversation_id)?)
    }

    /// 어휘 인덱스 재구축 (명시적으로만 호출)
    pub async fn resync_lexical(&self) -> RagResult<usize> {
        self.retriever.resync().await
    }

    /// 서비스 상태
    pub async fn status(&self) -> RagResult<ChatStatus> {
        let mode = self.retriever.mode().await?;
        Ok(ChatStatus {
            vector_count: self.retriever.dense().count().await?,
            lexical_enabled: self.retriever.lexical_enabled(),
            retrieval_mode: mode_label(mode).to_string(),
            reranker_enabled: self.reranker.is_some(),
            augmenter_enabled: self.augmenter.is_some(),
        })
    }
}

fn mode_label(mode: RetrievalMode) -> &'static str {
    match mode {
        RetrievalMode::Hybrid => "hybrid",
        RetrievalMode::DenseOnly => "dense-only",
        RetrievalMode::LexicalOnly => "lexical-only",
        RetrievalMode::Empty => "empty",
    }
}
