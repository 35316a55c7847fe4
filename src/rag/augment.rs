//! Query Augmenter - 검색용 질문 확장
//!
//! 빠른 보조 모델로 질문을 회의록 용어가 풍부한 형태로 다시 씁니다.
//! 확장된 질문은 검색에만 쓰이고, 저장/표시되는 질문은 원래 질문입니다.
//! 어떤 실패도 호출자에게 전달되지 않습니다 (원래 질문으로 진행).

use std::sync::Arc;

use crate::llm::LanguageModel;

/// 질문 재작성 지시문
const AUGMENT_INSTRUCTION: &str = "Você otimiza consultas para um sistema de busca sobre atas e \
documentos institucionais de uma universidade. Reescreva a pergunta abaixo de forma mais clara e \
específica, acrescentando termos que um documento oficial provavelmente conteria. Se a pergunta \
for curta ou vaga, expanda-a com detalhes plausíveis. Não responda à pergunta. Use o mesmo idioma \
da pergunta original. Devolva somente a pergunta reescrita, sem explicações.";

/// 재작성 결과 최대 길이 (문자 수)
const MAX_AUGMENTED_CHARS: usize = 1000;

/// 질의 확장기
#[derive(Clone)]
pub struct QueryAugmenter {
    model: Arc<dyn LanguageModel>,
}

impl QueryAugmenter {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// 질문 확장 (실패 시 원래 질문)
    pub async fn augment(&self, question: &str) -> String {
        let prompt = build_prompt(question);

        match self.model.generate(&prompt).await {
            Ok(output) => match clean_output(&output) {
                Some(rewritten) => {
                    tracing::info!("Augmented question: '{}' -> '{}'", question, rewritten);
                    rewritten
                }
                None => {
                    tracing::warn!("Augmentation returned unusable output; using original question");
                    question.to_string()
                }
            },
            Err(e) => {
                tracing::warn!("Augmentation failed ({}); using original question", e);
                question.to_string()
            }
        }
    }
}

fn build_prompt(question: &str) -> String {
    format!("{}\n\nPergunta: {}\n\nPergunta reescrita:", AUGMENT_INSTRUCTION, question)
}

/// 모델 출력 정리 (빈 출력/과도한 길이는 사용 불가)
fn clean_output(output: &str) -> Option<String> {
    let cleaned = output
        .trim()
        .trim_start_matches("Pergunta reescrita:")
        .trim()
        .trim_matches('"')
        .trim();

    if cleaned.is_empty() || cleaned.chars().count() > MAX_AUGMENTED_CHARS {
        None
    } else {
        Some(cleaned.to_string())
    }
}
