//! Answer Generator - 근거 기반 답변 생성
//!
//! 페르소나, 근거 지침, 검색된 Passage, 질문을 하나의 프롬프트로 묶어
//! 생성 모델을 한 번 호출합니다.

use crate::error::RagResult;
use crate::knowledge::Passage;
use crate::llm::LanguageModel;

/// 모델이 빈 답변을 돌려줬을 때 저장되는 문구
pub const FALLBACK_ANSWER: &str = "Não foi possível gerar uma resposta.";

/// 문맥이 없을 때 프롬프트에 들어가는 표시
const NO_CONTEXT_MARKER: &str = "(nenhum material encontrado)";

/// Passage 구분자
const PASSAGE_SEPARATOR: &str = "\n\n---\n\n";

const PERSONA: &str = "Você é um assessor pedagógico da universidade, cordial e prestativo. \
Sua função é responder dúvidas com base nas atas e documentos institucionais fornecidos.";

const GROUNDING_RULES: &str = "Analise a pergunta do usuário:
1. Se for uma saudação, despedida ou conversa casual que não busca informação institucional, \
responda de forma cordial sem depender do contexto.
2. Se for uma consulta sobre atas, documentos ou procedimentos institucionais:
   a. Use APENAS as informações do contexto institucional abaixo.
   b. Se a informação não estiver no contexto, diga explicitamente que ela não foi encontrada \
no material disponível. Nunca invente.
   c. Responda de forma clara e objetiva.";

/// 생성 결과
#[derive(Debug, Clone)]
pub struct GeneratedAnswer {
    pub answer_text: String,
    pub source_passages: Vec<Passage>,
}

/// 답변 생성기
#[derive(Debug, Default, Clone, Copy)]
pub struct AnswerGenerator;

impl AnswerGenerator {
    pub fn new() -> Self {
        Self
    }

    /// 프롬프트 구성
    pub fn build_prompt(&self, question: &str, passages: &[Passage]) -> String {
        let context = if passages.is_empty() {
            NO_CONTEXT_MARKER.to_string()
        } else {
            passages
                .iter()
                .map(|p| p.content.trim())
                .collect::<Vec<_>>()
                .join(PASSAGE_SEPARATOR)
        };

        format!(
            "{persona}\n\n{rules}\n\nContexto institucional:\n{context}\n\nPergunta do usuário:\n{question}\n\nResposta:",
            persona = PERSONA,
            rules = GROUNDING_RULES,
            context = context,
            question = question.trim(),
        )
    }

    /// 단일 호출로 답변 생성
    pub async fn generate(
        &self,
        model: &dyn LanguageModel,
        question: &str,
        passages: Vec<Passage>,
    ) -> RagResult<GeneratedAnswer> {
        let prompt = self.build_prompt(question, &passages);
        tracing::debug!(
            "Generating answer with {} ({} passages, {} prompt chars)",
            model.model_name(),
            passages.len(),
            prompt.chars().count()
        );

        let raw = model.generate(&prompt).await?;
        let answer_text = if raw.trim().is_empty() {
            tracing::warn!("Model {} returned an empty answer", model.model_name());
            FALLBACK_ANSWER.to_string()
        } else {
            raw.trim().to_string()
        };

        Ok(GeneratedAnswer {
            answer_text,
            source_passages: passages,
        })
    }
}
