//! CLI 모듈
//!
//! ata-rag CLI 명령어 정의 및 구현.
//! 프로세스의 조립 지점(composition root)으로, 각 명령이 필요한 서비스를 직접 만듭니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::collector::{CollectionStats, FileCollector, FileType};
use crate::config::RagConfig;
use crate::embedding::{has_api_key, EmbeddingProvider, OpenAiEmbedding};
use crate::error::{ErrorKind, RagError};
use crate::knowledge::{recursive_chunker, DenseIndex, HybridRetriever, LanceVectorStore, RecordStore};
use crate::llm::{gemini_api_key, HttpModelProvider, ModelRegistry, DEFAULT_LOCAL_MODEL, DEFAULT_MODEL};
use crate::rag::{try_init_relevance_model, Reranker};
use crate::service::{
    generate_dataset, load_cases, write_dataset, AtaService, ChatService, SourceMetadata,
};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "ata-rag")]
#[command(version, about = "회의록(ata) 질의응답 하이브리드 RAG", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 회의록 파일, 폴더, 또는 텍스트 수집
    Ingest {
        /// 직접 입력할 텍스트
        #[arg(short, long)]
        text: Option<String>,

        /// 수집할 파일 경로 (.pdf, .txt)
        #[arg(long)]
        file: Option<PathBuf>,

        /// 수집할 폴더 경로 (재귀)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// 회의록 제목 (없으면 파일 이름)
        #[arg(long)]
        title: Option<String>,
    },

    /// 질문하기
    Ask {
        /// 질문
        question: String,

        /// 사용자 ID
        #[arg(short, long, default_value_t = 1)]
        user: i64,

        /// 이어갈 대화 ID
        #[arg(short, long)]
        conversation: Option<Uuid>,

        /// 모델 식별자 (예: gemini-1.5-flash, ollama/llama3)
        #[arg(short, long, default_value = DEFAULT_MODEL)]
        model: String,

        /// 질의 확장 끄기
        #[arg(long)]
        no_augment: bool,

        /// 근거 Passage 표시
        #[arg(long)]
        sources: bool,
    },

    /// 대화 목록
    Conversations {
        #[arg(short, long, default_value_t = 1)]
        user: i64,
    },

    /// 대화 기록
    History {
        #[arg(short, long, default_value_t = 1)]
        user: i64,

        /// 대화 ID
        conversation: Uuid,
    },

    /// 수집된 회의록 목록
    Atas {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// 질문/정답 세트로 평가 데이터셋 생성
    Eval {
        /// 질문 파일 (JSON 배열: question, ground_truth)
        questions: PathBuf,

        /// 출력 파일
        #[arg(short, long, default_value = "ragas_evaluation_dataset.json")]
        output: PathBuf,

        /// 모델 식별자
        #[arg(short, long, default_value = DEFAULT_MODEL)]
        model: String,

        /// 평가 대화를 기록할 사용자 ID
        #[arg(short, long, default_value_t = 0)]
        user: i64,

        /// 질의 확장 끄기
        #[arg(long)]
        no_augment: bool,
    },

    /// 선택 가능한 모델
    Models,

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = RagConfig::from_env();
    config.validate().map_err(report)?;

    match cli.command {
        Commands::Ingest {
            text,
            file,
            dir,
            title,
        } => cmd_ingest(&config, text, file, dir, title).await,
        Commands::Ask {
            question,
            user,
            conversation,
            model,
            no_augment,
            sources,
        } => cmd_ask(&config, &question, user, conversation, &model, no_augment, sources).await,
        Commands::Conversations { user } => cmd_conversations(&config, user),
        Commands::History { user, conversation } => cmd_history(&config, user, conversation),
        Commands::Atas { limit } => cmd_atas(&config, limit),
        Commands::Eval {
            questions,
            output,
            model,
            user,
            no_augment,
        } => cmd_eval(&config, &questions, &output, &model, user, no_augment).await,
        Commands::Models => cmd_models(&config),
        Commands::Status => cmd_status(&config).await,
    }
}

// ============================================================================
// Composition
// ============================================================================

async fn open_dense(config: &RagConfig) -> Result<DenseIndex> {
    let embedder = OpenAiEmbedding::from_env().map_err(report)?;
    let store = LanceVectorStore::open(&config.vectors_dir(), embedder.dimension()).await?;
    Ok(DenseIndex::new(Arc::new(embedder), Arc::new(store)))
}

fn open_records(config: &RagConfig) -> Result<Arc<RecordStore>> {
    Ok(Arc::new(RecordStore::open_in(&config.data_dir)?))
}

async fn build_chat_service(config: &RagConfig) -> Result<ChatService> {
    let dense = open_dense(config).await?;
    let retriever = HybridRetriever::new(dense, config.retrieval.clone()).map_err(report)?;
    let reranker = try_init_relevance_model()
        .await
        .map(|model| Reranker::new(model, &config.rerank));
    let provider = Arc::new(HttpModelProvider::from_env(&config.models).map_err(report)?);

    ChatService::start(retriever, reranker, open_records(config)?, provider, config)
        .await
        .map_err(report)
}

/// 파이프라인 에러를 사용자 메시지로 출력
fn report(e: RagError) -> anyhow::Error {
    if e.kind() == ErrorKind::Internal {
        tracing::error!("Command failed: {}", e);
    }
    println!("[!] {} (status {})", e.public_message(), e.status_code());
    if let RagError::MissingCredential(var) = &e {
        println!("    설정: export {}=your-api-key", var);
    }
    anyhow::anyhow!(e.public_message())
}

// ============================================================================
// Commands
// ============================================================================

/// 수집 명령어 (ingest)
async fn cmd_ingest(
    config: &RagConfig,
    text: Option<String>,
    file: Option<PathBuf>,
    dir: Option<PathBuf>,
    title: Option<String>,
) -> Result<()> {
    if text.is_none() && file.is_none() && dir.is_none() {
        bail!("--text, --file, --dir 중 하나를 지정해야 합니다");
    }

    let chunker = recursive_chunker(config.chunk.clone()).map_err(report)?;
    let service = AtaService::new(
        chunker,
        open_dense(config).await?,
        open_records(config)?,
        config.uploads_dir(),
    );

    if let Some(text) = text {
        println!("[*] 텍스트 분할 및 임베딩 생성 중...");
        let ingested = service
            .ingest_document(&text, SourceMetadata { title, raw_path: None })
            .await
            .map_err(report)?;
        println!(
            "[OK] '{}' 수집 완료: {} passages (ata ID: {})",
            ingested.title, ingested.passage_count, ingested.ata_id
        );
        return Ok(());
    }

    if let Some(path) = file {
        println!("[*] 파일 수집 중: {}", path.display());
        let ingested = service.ingest_file(&path, title).await.map_err(report)?;
        println!(
            "[OK] '{}' 수집 완료: {} passages (ata ID: {})",
            ingested.title, ingested.passage_count, ingested.ata_id
        );
        return Ok(());
    }

    let Some(dir) = dir else {
        return Ok(());
    };

    let files = FileCollector::with_defaults().collect_directory(&dir)?;
    if files.is_empty() {
        println!("[!] 수집할 파일이 없습니다.");
        return Ok(());
    }

    let stats = CollectionStats::from_files(&files);
    println!("[*] 수집 대상: {} 파일", stats.total_files);
    println!("    텍스트: {}, PDF: {}", stats.text_files, stats.pdf_files);
    println!("    총 크기: {}", format_bytes(stats.total_size as usize));
    println!();

    let mut success_count = 0;
    let mut error_count = 0;

    for (i, collected) in files.iter().enumerate() {
        let file_name = collected
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown");
        let type_str = match collected.file_type {
            FileType::Text => "TXT",
            FileType::Pdf => "PDF",
        };

        print!("[{}/{}] [{}] {}... ", i + 1, files.len(), type_str, file_name);

        match service.ingest_file(&collected.path, None).await {
            Ok(ingested) => {
                println!("완료 ({} passages)", ingested.passage_count);
                success_count += 1;
            }
            Err(e) => {
                println!("실패: {}", e.public_message());
                error_count += 1;
            }
        }
    }

    println!();
    println!("[OK] 완료: 성공 {}, 실패 {}", success_count, error_count);
    Ok(())
}

/// 질문 명령어 (ask)
async fn cmd_ask(
    config: &RagConfig,
    question: &str,
    user: i64,
    conversation: Option<Uuid>,
    model: &str,
    no_augment: bool,
    show_sources: bool,
) -> Result<()> {
    // 모델 식별자는 인덱스를 열기 전에 확인
    ModelRegistry::new(&config.models)
        .resolve(model)
        .map_err(report)?;

    let mut service = build_chat_service(config).await?;
    if no_augment {
        service = service.with_augmenter(None);
    }

    let record = service
        .answer_question(user, question, conversation, model)
        .await
        .map_err(report)?;

    println!("{}", record.answer);
    println!();
    println!(
        "[*] 대화 ID: {} ({})",
        record.conversation_id,
        record.created_at.format("%Y-%m-%d %H:%M:%S")
    );

    if show_sources {
        println!("[*] 근거 {} 건", record.sources.len());
        for (i, passage) in record.sources.iter().enumerate() {
            println!(
                "  {}. [{} #{}] {}",
                i + 1,
                passage.metadata.title.as_deref().unwrap_or("-"),
                passage.metadata.chunk_index,
                truncate_text(&passage.content, 100)
            );
        }
    }

    Ok(())
}

/// 대화 목록 명령어 (conversations)
fn cmd_conversations(config: &RagConfig, user: i64) -> Result<()> {
    let conversations = open_records(config)?.list_conversations(user)?;

    if conversations.is_empty() {
        println!("[*] 사용자 {}의 대화가 없습니다.", user);
        return Ok(());
    }

    println!("[*] 대화 {} 건", conversations.len());
    for c in conversations {
        println!(
            "  {}  {}  {}",
            c.id,
            c.updated_at.format("%Y-%m-%d %H:%M"),
            truncate_text(&c.title, 60)
        );
    }
    Ok(())
}

/// 대화 기록 명령어 (history)
fn cmd_history(config: &RagConfig, user: i64, conversation: Uuid) -> Result<()> {
    let history = open_records(config)?.get_history(user, conversation)?;

    if history.is_empty() {
        println!("[!] 대화를 찾을 수 없습니다: {}", conversation);
        return Ok(());
    }

    for m in history {
        println!("[{}] ({})", m.created_at.format("%Y-%m-%d %H:%M:%S"), m.model_identifier);
        println!("  Q: {}", m.question);
        println!("  A: {}", truncate_text(&m.answer, 300));
        println!();
    }
    Ok(())
}

/// 회의록 목록 명령어 (atas)
fn cmd_atas(config: &RagConfig, limit: usize) -> Result<()> {
    let atas = open_records(config)?.list_atas(limit)?;

    if atas.is_empty() {
        println!("[*] 수집된 회의록이 없습니다.");
        return Ok(());
    }

    for ata in atas {
        println!(
            "  #{:<4} {}  {}",
            ata.id,
            ata.created_at.format("%Y-%m-%d %H:%M"),
            truncate_text(&ata.title, 60)
        );
    }
    Ok(())
}

/// 평가 데이터셋 명령어 (eval)
async fn cmd_eval(
    config: &RagConfig,
    questions: &Path,
    output: &Path,
    model: &str,
    user: i64,
    no_augment: bool,
) -> Result<()> {
    let cases = load_cases(questions).map_err(report)?;
    ModelRegistry::new(&config.models)
        .resolve(model)
        .map_err(report)?;

    let mut service = build_chat_service(config).await?;
    if no_augment {
        service = service.with_augmenter(None);
    }

    println!("[*] 평가 질문 {} 건 처리 중 (모델: {})...", cases.len(), model);
    let result = generate_dataset(&service, &cases, user, model)
        .await
        .map_err(report)?;

    for failure in &result.failures {
        println!("[!] 실패: {} ({})", truncate_text(&failure.question, 60), failure.error);
    }

    write_dataset(output, &result.samples).map_err(report)?;
    println!(
        "[OK] {} 건 저장: {} (평균 문맥 {:.1} 개, 실패 {} 건)",
        result.samples.len(),
        output.display(),
        result.mean_contexts(),
        result.failures.len()
    );
    Ok(())
}

/// 모델 목록 명령어 (models)
fn cmd_models(config: &RagConfig) -> Result<()> {
    let registry = ModelRegistry::new(&config.models);

    println!("[*] Gemini (GOOGLE_API_KEY 필요)");
    for (alias, api_name) in registry.aliases() {
        let marker = if alias == DEFAULT_MODEL { " (기본)" } else { "" };
        println!("  {} -> {}{}", alias, api_name, marker);
    }
    println!();
    println!("[*] Ollama ({})", config.models.ollama_host);
    println!(
        "  {}<model>  예: {}{}",
        registry.local_prefix(),
        registry.local_prefix(),
        DEFAULT_LOCAL_MODEL
    );
    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: &RagConfig) -> Result<()> {
    println!("ata-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());

    if has_api_key() {
        println!("[OK] OPENAI_API_KEY: 설정됨");
    } else {
        println!("[!] OPENAI_API_KEY: 미설정 (임베딩 불가)");
    }
    if gemini_api_key().is_some() {
        println!("[OK] GOOGLE_API_KEY: 설정됨");
    } else {
        println!("[!] GOOGLE_API_KEY: 미설정 (Gemini 모델/질의 확장 불가)");
    }

    match open_records(config).and_then(|r| Ok(r.stats()?)) {
        Ok(stats) => {
            println!("[OK] 회의록: {} 건", stats.ata_count);
            println!(
                "     대화: {} 건, 메시지: {} 건",
                stats.conversation_count, stats.message_count
            );
        }
        Err(e) => println!("[!] 저장소 열기 실패: {}", e),
    }

    if has_api_key() {
        match build_chat_service(config).await {
            Ok(service) => match service.status().await {
                Ok(status) => {
                    println!("[OK] 벡터 인덱스: {} passages", status.vector_count);
                    println!(
                        "     키워드 인덱스: {}",
                        if status.lexical_enabled { "활성" } else { "비활성" }
                    );
                    println!("     검색 방식: {}", status.retrieval_mode);
                    println!(
                        "     재순위화: {}, 질의 확장: {}",
                        on_off(status.reranker_enabled),
                        on_off(status.augmenter_enabled)
                    );
                }
                Err(e) => tracing::debug!("Status query failed: {}", e),
            },
            Err(e) => tracing::debug!("Chat service initialization failed: {}", e),
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "켜짐"
    } else {
        "꺼짐"
    }
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
