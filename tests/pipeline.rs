//! 수집 → 질의응답 → 기록 전체 흐름 테스트

mod common;

use std::sync::Arc;

use ata_rag::knowledge::{conversation_title, DEFAULT_CONVERSATION_TITLE, TITLE_MAX_CHARS};
use ata_rag::rag::{QueryAugmenter, RerankConfig, FALLBACK_ANSWER};
use ata_rag::{ErrorKind, RagError, Reranker, SourceMetadata};

use common::{provider, FakeProvider, Harness, KeywordRelevance, ScriptedModel, THREE_PARAGRAPHS};

async fn ingest_three_paragraphs(harness: &Harness) -> usize {
    harness
        .ingest
        .ingest_document(
            THREE_PARAGRAPHS,
            SourceMetadata {
                title: Some("Ata 03/2024".to_string()),
                raw_path: None,
            },
        )
        .await
        .unwrap()
        .passage_count
}

#[tokio::test]
async fn test_ingest_then_answer_then_history() {
    let harness = Harness::new();
    let passages = ingest_three_paragraphs(&harness).await;
    assert!((1..=3).contains(&passages));

    let (provider, model) = provider("O colegiado aprovou o calendário acadêmico.");
    let chat = harness.chat(provider, None).await;

    let question = "O que o documento diz sobre o calendário acadêmico?";
    let record = chat
        .answer_question(1, question, None, "gemini-1.5-flash")
        .await
        .unwrap();

    assert_eq!(record.answer, "O colegiado aprovou o calendário acadêmico.");
    assert!(!record.sources.is_empty());

    let history = chat.get_history(1, record.conversation_id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].question, question);
    assert_eq!(history[0].model_identifier, "gemini-1.5-flash");

    // 생성 모델은 한 번만 호출되고 근거 문맥을 받음
    let prompts = model.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("calendário acadêmico do próximo semestre"));
}

#[tokio::test]
async fn test_follow_up_extends_same_conversation() {
    let harness = Harness::new();
    ingest_three_paragraphs(&harness).await;
    let (provider, _) = provider("resposta");
    let chat = harness.chat(provider, None).await;

    let first = chat
        .answer_question(1, "Quem abriu a reunião?", None, "gemini-1.5-flash")
        .await
        .unwrap();
    let second = chat
        .answer_question(
            1,
            "E as bolsas de monitoria?",
            Some(first.conversation_id),
            "ollama/llama3",
        )
        .await
        .unwrap();

    assert_eq!(first.conversation_id, second.conversation_id);
    let history = chat.get_history(1, first.conversation_id).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].model_identifier, "ollama/llama3");
    assert_eq!(chat.list_conversations(1).unwrap().len(), 1);
}

#[tokio::test]
async fn test_unsupported_model_writes_nothing() {
    let harness = Harness::new();
    ingest_three_paragraphs(&harness).await;
    let (provider, model) = provider("não deveria ser chamado");
    let chat = harness.chat(provider, None).await;

    let err = chat
        .answer_question(1, "Qual a pauta?", None, "gpt-4")
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::UnsupportedModel(_)));
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(err.status_code(), 400);
    assert!(model.prompts().is_empty());

    let stats = harness.records.stats().unwrap();
    assert_eq!(stats.conversation_count, 0);
    assert_eq!(stats.message_count, 0);
}

#[tokio::test]
async fn test_missing_credential_is_configuration_error() {
    let harness = Harness::new();
    let model = ScriptedModel::replying("x");
    let chat = harness
        .chat(
            FakeProvider {
                model: model.clone(),
                hosted_credential: false,
            },
            None,
        )
        .await;

    let err = chat
        .answer_question(1, "Qual a pauta?", None, "gemma-3")
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::MissingCredential(_)));
    assert_eq!(err.status_code(), 400);

    // 로컬 백엔드는 자격증명 없이 동작
    let ok = chat
        .answer_question(1, "Qual a pauta?", None, "ollama/deepseek-r1:1.5b")
        .await;
    assert!(ok.is_ok());
}

#[tokio::test]
async fn test_backend_failure_rolls_back() {
    let harness = Harness::new();
    ingest_three_paragraphs(&harness).await;
    let chat = harness
        .chat(
            FakeProvider {
                model: ScriptedModel::unreachable(),
                hosted_credential: true,
            },
            None,
        )
        .await;

    let err = chat
        .answer_question(1, "Quem abriu a reunião?", None, "ollama/llama3")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    assert_eq!(err.status_code(), 503);

    assert!(chat.list_conversations(1).unwrap().is_empty());
    assert_eq!(harness.records.stats().unwrap().message_count, 0);
}

#[tokio::test]
async fn test_users_are_isolated() {
    let harness = Harness::new();
    ingest_three_paragraphs(&harness).await;
    let (provider, _) = provider("resposta");
    let chat = harness.chat(provider, None).await;

    let a = chat
        .answer_question(1, "pergunta de A", None, "gemini-1.5-flash")
        .await
        .unwrap();
    let b = chat
        .answer_question(2, "pergunta de B", None, "gemini-1.5-flash")
        .await
        .unwrap();

    let ids_a: Vec<_> = chat.list_conversations(1).unwrap().into_iter().map(|c| c.id).collect();
    let ids_b: Vec<_> = chat.list_conversations(2).unwrap().into_iter().map(|c| c.id).collect();
    assert_eq!(ids_a, vec![a.conversation_id]);
    assert_eq!(ids_b, vec![b.conversation_id]);

    // 다른 사용자의 대화는 읽을 수 없음
    assert!(chat.get_history(2, a.conversation_id).unwrap().is_empty());

    // 다른 사용자의 대화 ID로 질문하면 새 대화가 생김
    let c = chat
        .answer_question(2, "intrusão", Some(a.conversation_id), "gemini-1.5-flash")
        .await
        .unwrap();
    assert_ne!(c.conversation_id, a.conversation_id);
    assert_eq!(chat.get_history(1, a.conversation_id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_conversation_titles() {
    let harness = Harness::new();
    let (provider, _) = provider("resposta");
    let chat = harness.chat(provider, None).await;

    let long_question = "q".repeat(100);
    let record = chat
        .answer_question(1, &long_question, None, "gemini-1.5-flash")
        .await
        .unwrap();

    let conversations = chat.list_conversations(1).unwrap();
    let title = &conversations[0].title;
    assert_eq!(conversations[0].id, record.conversation_id);
    assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 3);
    assert_eq!(title, &format!("{}...", "q".repeat(TITLE_MAX_CHARS)));

    assert_eq!(conversation_title(""), DEFAULT_CONVERSATION_TITLE);

    // 빈 질문은 입력 오류
    let err = chat
        .answer_question(1, "   ", None, "gemini-1.5-flash")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_empty_corpus_still_answers_without_context() {
    let harness = Harness::new();
    let (provider, model) = provider("");
    let chat = harness.chat(provider, None).await;

    let status = chat.status().await.unwrap();
    assert_eq!(status.vector_count, 0);
    assert!(!status.lexical_enabled);
    assert_eq!(status.retrieval_mode, "empty");

    let record = chat
        .answer_question(1, "bom dia", None, "gemini-1.5-flash")
        .await
        .unwrap();
    assert!(record.sources.is_empty());
    assert_eq!(record.answer, FALLBACK_ANSWER);
    assert!(model.prompts()[0].contains("bom dia"));
}

#[tokio::test]
async fn test_reranker_limits_sources_to_top_n() {
    let harness = Harness::new();
    for i in 0..4 {
        harness
            .ingest
            .ingest_document(
                &format!(
                    "Ata {i}. O conselho discutiu o orçamento do ano {}.\n\n\
                     Ata {i}. A comissão de estágio apresentou o relatório {}.",
                    2020 + i,
                    i
                ),
                SourceMetadata::default(),
            )
            .await
            .unwrap();
    }
    let corpus: Vec<String> = harness
        .dense
        .snapshot()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.content)
        .collect();

    let reranker = Reranker::new(Arc::new(KeywordRelevance), &RerankConfig { top_n: 2 });
    let (provider, _) = provider("resposta");
    let chat = harness.chat(provider, Some(reranker)).await;

    let status = chat.status().await.unwrap();
    assert!(status.reranker_enabled);
    assert_eq!(status.retrieval_mode, "hybrid");

    let record = chat
        .answer_question(1, "O que foi dito sobre o orçamento?", None, "gemini-1.5-flash")
        .await
        .unwrap();

    assert!(record.sources.len() <= 2);
    assert!(!record.sources.is_empty());
    for source in &record.sources {
        assert!(corpus.contains(&source.content));
        assert!(source.content.contains("orçamento"));
    }
}

#[tokio::test]
async fn test_augmented_query_used_for_retrieval_only() {
    let harness = Harness::new();
    ingest_three_paragraphs(&harness).await;

    let (provider, answer_model) = provider("resposta final");
    let rewriter = ScriptedModel::replying("bolsas de monitoria distribuídas entre departamentos");
    let chat = harness
        .chat(provider, None)
        .await
        .with_augmenter(Some(QueryAugmenter::new(rewriter.clone())));

    let record = chat
        .answer_question(1, "e o dinheiro?", None, "gemini-1.5-flash")
        .await
        .unwrap();

    assert_eq!(rewriter.prompts().len(), 1);
    assert!(record
        .sources
        .iter()
        .any(|p| p.content.contains("bolsas de monitoria")));

    let answer_prompt = &answer_model.prompts()[0];
    assert!(answer_prompt.contains("e o dinheiro?"));
    assert!(!answer_prompt.contains("distribuídas entre departamentos"));

    let history = chat.get_history(1, record.conversation_id).unwrap();
    assert_eq!(history[0].question, "e o dinheiro?");
}

#[tokio::test]
async fn test_failed_augmentation_is_not_fatal() {
    let harness = Harness::new();
    ingest_three_paragraphs(&harness).await;

    let (provider, _) = provider("resposta");
    let chat = harness
        .chat(provider, None)
        .await
        .with_augmenter(Some(QueryAugmenter::new(ScriptedModel::unreachable())));

    let record = chat
        .answer_question(1, "Quem abriu a reunião?", None, "gemini-1.5-flash")
        .await
        .unwrap();
    assert_eq!(record.answer, "resposta");
}

#[tokio::test]
async fn test_lexical_index_sees_new_uploads_only_after_resync() {
    let harness = Harness::new();
    ingest_three_paragraphs(&harness).await;

    let (provider, _) = provider("resposta");
    let chat = harness.chat(provider, None).await;
    let before = chat.status().await.unwrap();

    harness
        .ingest
        .ingest_document(
            "Nova ata sobre a reforma do laboratório de química.",
            SourceMetadata::default(),
        )
        .await
        .unwrap();

    let after = chat.status().await.unwrap();
    assert_eq!(after.vector_count, before.vector_count + 1);

    let indexed = chat.resync_lexical().await.unwrap();
    assert_eq!(indexed, after.vector_count);
}

#[tokio::test]
async fn test_embedding_outage_still_answers_from_keywords() {
    let harness = Harness::new();
    ingest_three_paragraphs(&harness).await;

    let (provider, model) = provider("resposta pelo índice de palavras");
    let chat = harness.chat(provider, None).await;
    harness.set_embedding_down(true);

    let record = chat
        .answer_question(1, "bolsas de monitoria", None, "gemini-1.5-flash")
        .await
        .unwrap();

    assert_eq!(record.answer, "resposta pelo índice de palavras");
    assert!(record
        .sources
        .iter()
        .any(|p| p.content.contains("bolsas de monitoria")));
    assert!(model.prompts()[0].contains("bolsas de monitoria"));
    assert_eq!(chat.get_history(1, record.conversation_id).unwrap().len(), 1);
}
