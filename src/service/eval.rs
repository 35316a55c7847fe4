//! Eval - 고정 질문/정답 세트로 평가 데이터셋 생성
//!
//! 각 질문을 실제 질의응답 파이프라인에 통과시키고
//! (question, answer, contexts, ground_truth) 레코드를 JSON으로 내보냅니다.
//! 외부 평가 도구(RAGAS 등)가 이 파일을 그대로 읽습니다.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, RagResult};

use super::chat::ChatService;

/// 평가 질문 하나
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalCase {
    pub question: String,
    /// 기대 답변
    pub ground_truth: String,
}

/// 평가 데이터셋 레코드
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalSample {
    pub question: String,
    pub answer: String,
    /// 답변 생성에 쓰인 Passage 본문 (재순위화 후 순서)
    pub contexts: Vec<String>,
    pub ground_truth: String,
}

/// 처리하지 못한 질문
#[derive(Debug, Clone, Serialize)]
pub struct EvalFailure {
    pub question: String,
    pub error: String,
}

/// 데이터셋 생성 결과
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvalReport {
    pub samples: Vec<EvalSample>,
    pub failures: Vec<EvalFailure>,
}

impl EvalReport {
    /// 레코드당 평균 문맥 수
    pub fn mean_contexts(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let total: usize = self.samples.iter().map(|s| s.contexts.len()).sum();
        total as f32 / self.samples.len() as f32
    }
}

/// 질문 파일 읽기 (`[{"question": ..., "ground_truth": ...}]`)
pub fn load_cases(path: &Path) -> RagResult<Vec<EvalCase>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| RagError::Validation(format!("cannot read {:?}: {}", path, e)))?;
    let cases: Vec<EvalCase> = serde_json::from_str(&raw)
        .map_err(|e| RagError::Validation(format!("invalid evaluation file {:?}: {}", path, e)))?;

    if cases.is_empty() {
        return Err(RagError::Validation(format!("no questions in {:?}", path)));
    }
    if let Some(i) = cases.iter().position(|c| c.question.trim().is_empty()) {
        return Err(RagError::Validation(format!("question #{} is empty", i + 1)));
    }
    Ok(cases)
}

/// 모든 질문에 답해 데이터셋 생성
///
/// 모델 식별자가 잘못되면 즉시 실패하고, 개별 질문의 실패는 기록만 하고 계속합니다.
/// 질문마다 새 대화가 만들어집니다.
pub async fn generate_dataset(
    chat: &ChatService,
    cases: &[EvalCase],
    user_id: i64,
    model_identifier: &str,
) -> RagResult<EvalReport> {
    chat.registry().resolve(model_identifier)?;

    let mut report = EvalReport::default();
    for (i, case) in cases.iter().enumerate() {
        tracing::info!("Evaluating question {}/{}", i + 1, cases.len());

        match chat
            .answer_question(user_id, &case.question, None, model_identifier)
            .await
        {
            Ok(record) => report.samples.push(EvalSample {
                question: case.question.clone(),
                answer: record.answer,
                contexts: record.sources.into_iter().map(|p| p.content).collect(),
                ground_truth: case.ground_truth.clone(),
            }),
            Err(e) => {
                tracing::warn!("Skipping evaluation question {}: {}", i + 1, e);
                report.failures.push(EvalFailure {
                    question: case.question.clone(),
                    error: e.public_message(),
                });
            }
        }
    }

    tracing::info!(
        "Evaluation dataset: {} samples, {} failures",
        report.samples.len(),
        report.failures.len()
    );
    Ok(report)
}

/// 데이터셋을 JSON 배열로 저장
pub fn write_dataset(path: &Path, samples: &[EvalSample]) -> RagResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("Failed to create output directory")?;
    }
    let json = serde_json::to_string_pretty(samples).context("Failed to serialize dataset")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
