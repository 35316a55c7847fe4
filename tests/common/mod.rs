//! 통합 테스트용 결정적 가짜 구현 (네트워크 없음)

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use ata_rag::knowledge::{default_chunker, RecordStore};
use ata_rag::llm::{LanguageModel, ModelBackend, ModelProvider};
use ata_rag::rag::RelevanceModel;
use ata_rag::{
    AtaService, ChatService, DenseIndex, EmbeddingProvider, HybridRetriever, MemoryVectorStore,
    RagConfig, RagError, RagResult, Reranker,
};

pub const DIM: usize = 64;

/// 단어 해시 버킷 임베딩 (`down`이 켜지면 API 장애처럼 실패)
#[derive(Default)]
pub struct HashEmbedding {
    pub down: AtomicBool,
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        if self.down.load(Ordering::SeqCst) {
            return Err(RagError::BackendUnavailable("embedding API unreachable".into()).into());
        }
        let mut v = vec![0.0f32; DIM];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(17usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize))
                % DIM;
            v[bucket] += 1.0;
        }
        Ok(v)
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn name(&self) -> &str {
        "hash"
    }
}

/// 질문 단어 겹침 수로 채점하는 관련도 모델
pub struct KeywordRelevance;

#[async_trait]
impl RelevanceModel for KeywordRelevance {
    async fn score(&self, query: &str, documents: &[String]) -> anyhow::Result<Vec<f32>> {
        let terms: Vec<String> = query
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > 2)
            .map(|w| w.to_lowercase())
            .collect();
        Ok(documents
            .iter()
            .map(|d| {
                let lower = d.to_lowercase();
                terms.iter().filter(|t| lower.contains(t.as_str())).count() as f32
            })
            .collect())
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

/// 미리 정한 응답을 돌려주고 프롬프트를 기록하는 모델
pub struct ScriptedModel {
    reply: Option<String>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            prompts: Mutex::new(vec![]),
        })
    }

    /// 항상 연결 실패
    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            prompts: Mutex::new(vec![]),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, prompt: &str) -> RagResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => Err(RagError::BackendUnavailable("scripted backend down".into())),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// 모든 백엔드에 같은 모델을 주는 프로바이더
pub struct FakeProvider {
    pub model: Arc<ScriptedModel>,
    /// false면 호스팅 백엔드는 자격증명 없음
    pub hosted_credential: bool,
}

impl ModelProvider for FakeProvider {
    fn connect(&self, backend: &ModelBackend, _temperature: f32) -> RagResult<Arc<dyn LanguageModel>> {
        if matches!(backend, ModelBackend::Hosted { .. }) && !self.hosted_credential {
            return Err(RagError::MissingCredential("GOOGLE_API_KEY"));
        }
        Ok(self.model.clone())
    }
}

/// 임시 디렉토리 위의 전체 파이프라인
pub struct Harness {
    pub dir: TempDir,
    pub config: RagConfig,
    pub embedding: Arc<HashEmbedding>,
    pub dense: DenseIndex,
    pub records: Arc<RecordStore>,
    pub ingest: AtaService,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = RagConfig::default();
        config.data_dir = dir.path().to_path_buf();

        let embedding = Arc::new(HashEmbedding::default());
        let dense = DenseIndex::new(embedding.clone(), Arc::new(MemoryVectorStore::new()));
        let records = Arc::new(RecordStore::open_in(&config.data_dir).unwrap());
        let ingest = AtaService::new(
            default_chunker().unwrap(),
            dense.clone(),
            records.clone(),
            config.uploads_dir(),
        );

        Self {
            dir,
            config,
            embedding,
            dense,
            records,
            ingest,
        }
    }

    /// 임베딩 API 장애 흉내
    pub fn set_embedding_down(&self, down: bool) {
        self.embedding.down.store(down, Ordering::SeqCst);
    }

    /// 질의 확장 없이 채팅 서비스 시작
    pub async fn chat(&self, provider: FakeProvider, reranker: Option<Reranker>) -> ChatService {
        let retriever = HybridRetriever::new(self.dense.clone(), self.config.retrieval.clone()).unwrap();
        ChatService::start(
            retriever,
            reranker,
            self.records.clone(),
            Arc::new(provider),
            &self.config,
        )
        .await
        .unwrap()
        .with_augmenter(None)
    }
}

pub fn provider(reply: &str) -> (FakeProvider, Arc<ScriptedModel>) {
    let model = ScriptedModel::replying(reply);
    (
        FakeProvider {
            model: model.clone(),
            hosted_credential: true,
        },
        model,
    )
}

pub const THREE_PARAGRAPHS: &str = "A reunião ordinária do colegiado do curso foi aberta pela coordenadora.\n\n\
O colegiado aprovou o calendário acadêmico do próximo semestre por unanimidade.\n\n\
Foram discutidas as bolsas de monitoria e a distribuição entre os departamentos.";
