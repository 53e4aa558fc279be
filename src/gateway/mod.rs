//! Gateway capability traits and implementations
//!
//! The classification and answer webhooks are opaque third-party automations.
//! They are injected as explicit capability objects so the engine never touches
//! a process-wide client and tests can substitute fakes.

use crate::models::{AnswerRecord, ClassificationResult, Selection};
use crate::Result;
use async_trait::async_trait;

pub mod webhook;
pub use webhook::{AnswerWebhook, ClassificationWebhook};

/// Source tag sent with every webhook payload.
pub const SOURCE_TAG: &str = "budget_qa_system";

/// Classifies a free-text question into a budget category.
#[async_trait]
pub trait ClassificationGateway: Send + Sync {
    async fn classify(&self, question: &str) -> Result<ClassificationResult>;
}

/// Produces the final answer for a classified question plus selection.
#[async_trait]
pub trait AnswerGateway: Send + Sync {
    async fn answer(
        &self,
        classification: &ClassificationResult,
        selection: &Selection,
    ) -> Result<AnswerRecord>;
}

/// Mock classification gateway for development & testing.
/// Keeps the engine functional without the external automation.
pub struct MockClassificationGateway {
    pub category: String,
    pub confidence: f64,
}

impl Default for MockClassificationGateway {
    fn default() -> Self {
        Self {
            category: "예산 승인 절차".to_string(),
            confidence: 0.92,
        }
    }
}

#[async_trait]
impl ClassificationGateway for MockClassificationGateway {
    async fn classify(&self, question: &str) -> Result<ClassificationResult> {
        Ok(ClassificationResult {
            question: question.to_string(),
            category: self.category.clone(),
            confidence: self.confidence,
        })
    }
}

/// Mock answer gateway returning a canned approval line.
pub struct MockAnswerGateway;

#[async_trait]
impl AnswerGateway for MockAnswerGateway {
    async fn answer(
        &self,
        classification: &ClassificationResult,
        selection: &Selection,
    ) -> Result<AnswerRecord> {
        Ok(AnswerRecord::Structured {
            approval_line: if selection.amount_won > 500_000_000 {
                "부서장, 예산팀장, 경영진".to_string()
            } else {
                "부서장, 예산팀장".to_string()
            },
            regulation_reference: "예산 집행 규정 제12조".to_string(),
            explanation: format!(
                "{} 관련 요청({}원, {})은 금액 구간에 따른 결재라인을 따릅니다.",
                classification.category, selection.amount_won, selection.procedure
            ),
        })
    }
}
