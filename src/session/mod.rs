//! Session state machine
//!
//! Drives the question → selection → result flow and mediates every call to
//! the two gateways and the history feed. One step is active at a time and a
//! transition fully replaces the state slice it owns, so stale cross-step data
//! never leaks into a new flow.
//!
//! Failure policy is asymmetric on purpose: classification fails open (a
//! third-party outage must never block the user at the first step), while the
//! answer call fails closed (an incomplete answer is not acceptable to show).

use crate::error::SessionError;
use crate::gateway::{AnswerGateway, ClassificationGateway};
use crate::history::HistoryFeed;
use crate::models::{ClassificationResult, HistoryEntry, Selection, Session, Step};
use crate::Result;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Serializable snapshot of the engine state.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub step: Step,
    pub classification: Option<ClassificationResult>,
    pub session: Option<Session>,
    pub is_loading: bool,
}

struct EngineState {
    step: Step,
    classification: Option<ClassificationResult>,
    session: Option<Session>,
    loading: bool,
    /// Bumped on every applied transition. A gateway continuation is applied
    /// only if the generation it captured at dispatch still matches, so a
    /// request that outlives a navigation is dropped instead of mutating a
    /// step no longer displayed.
    generation: u64,
}

impl EngineState {
    fn new() -> Self {
        Self {
            step: Step::Question,
            classification: None,
            session: None,
            loading: false,
            generation: 0,
        }
    }
}

pub struct SessionEngine {
    classifier: Box<dyn ClassificationGateway>,
    answerer: Box<dyn AnswerGateway>,
    feed: Arc<HistoryFeed>,
    state: RwLock<EngineState>,
}

impl SessionEngine {
    pub fn new(
        classifier: Box<dyn ClassificationGateway>,
        answerer: Box<dyn AnswerGateway>,
        feed: Arc<HistoryFeed>,
    ) -> Self {
        Self {
            classifier,
            answerer,
            feed,
            state: RwLock::new(EngineState::new()),
        }
    }

    pub fn history(&self) -> &Arc<HistoryFeed> {
        &self.feed
    }

    pub async fn view(&self) -> SessionView {
        let state = self.state.read().await;
        SessionView {
            step: state.step,
            classification: state.classification.clone(),
            session: state.session.clone(),
            is_loading: state.loading,
        }
    }

    /// Submit a question for classification.
    ///
    /// Fail-open: if the gateway errors, the flow continues with the default
    /// category so the user is never blocked by an outage. The step advances
    /// to `selection` in every non-validation case.
    pub async fn submit_question(&self, question: &str) -> Result<ClassificationResult> {
        let question = question.trim();
        if question.is_empty() {
            return Err(SessionError::Validation(
                "질문을 입력해주세요.".to_string(),
            ));
        }

        let generation = {
            let mut state = self.state.write().await;
            if state.step != Step::Question {
                return Err(SessionError::InvalidStep(format!(
                    "cannot submit a question from step {:?}",
                    state.step
                )));
            }
            if state.loading {
                return Err(SessionError::Validation(
                    "이미 처리 중인 요청이 있습니다.".to_string(),
                ));
            }
            state.loading = true;
            state.generation
        };

        info!(question = %question, "Classifying question");

        let classification = match self.classifier.classify(question).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Classification gateway failed, continuing with default category: {}", e);
                ClassificationResult::fallback(question)
            }
        };

        let mut state = self.state.write().await;
        if state.generation != generation {
            info!("Dropping stale classification result");
            return Err(SessionError::InvalidStep(
                "request superseded by navigation".to_string(),
            ));
        }

        state.classification = Some(classification.clone());
        state.session = None;
        state.step = Step::Selection;
        state.loading = false;
        state.generation += 1;

        info!(
            category = %classification.category,
            confidence = classification.confidence,
            "Question classified"
        );

        Ok(classification)
    }

    /// Confirm amount + procedure and request the final answer.
    ///
    /// Fail-closed: a gateway error leaves the step at `selection` and is
    /// surfaced to the caller. A malformed body is not an error; the adapter
    /// sentinel-fills it before it reaches this point.
    pub async fn confirm_selection(
        &self,
        amount: &str,
        procedure: &str,
        user_id: Option<Uuid>,
    ) -> Result<Session> {
        if amount.trim().is_empty() || procedure.trim().is_empty() {
            return Err(SessionError::Validation(
                "예산 금액과 집행 절차를 모두 선택해주세요.".to_string(),
            ));
        }
        let selection = Selection::from_input(amount, procedure)?;

        let (generation, classification) = {
            let mut state = self.state.write().await;
            let Some(classification) = state.classification.clone() else {
                return Err(SessionError::InvalidStep(
                    "no classified question to confirm".to_string(),
                ));
            };
            if state.step != Step::Selection {
                return Err(SessionError::InvalidStep(format!(
                    "cannot confirm a selection from step {:?}",
                    state.step
                )));
            }
            if state.loading {
                return Err(SessionError::Validation(
                    "이미 처리 중인 요청이 있습니다.".to_string(),
                ));
            }
            state.loading = true;
            (state.generation, classification)
        };

        info!(
            amount_won = selection.amount_won,
            procedure = %selection.procedure,
            "Requesting answer"
        );

        let answer = match self.answerer.answer(&classification, &selection).await {
            Ok(answer) => answer,
            Err(e) => {
                let mut state = self.state.write().await;
                if state.generation == generation {
                    state.loading = false;
                }
                warn!("Answer gateway failed: {}", e);
                return Err(e);
            }
        };

        let session = Session {
            question: classification.question,
            category: classification.category,
            confidence: classification.confidence,
            selection: Some(selection),
            answer,
            created_at: Utc::now(),
        };

        {
            let mut state = self.state.write().await;
            if state.generation != generation {
                info!("Dropping stale answer result");
                return Err(SessionError::InvalidStep(
                    "request superseded by navigation".to_string(),
                ));
            }
            state.session = Some(session.clone());
            state.step = Step::Result;
            state.loading = false;
            state.generation += 1;
        }

        // Persist after the transition; an insert failure must not take the
        // answer away from the user. The feed keeps the error string.
        let entry = HistoryEntry::from_session(&session, user_id);
        if let Err(e) = self.feed.add(entry).await {
            warn!("History insert failed, answer still shown: {}", e);
        }

        Ok(session)
    }

    /// Explicit back navigation. Backing out of `selection` discards the
    /// classification; backing out of `result` returns to `selection` when a
    /// classification exists (history-injected sessions have none and go back
    /// to `question`).
    pub async fn back(&self) -> Result<Step> {
        let mut state = self.state.write().await;
        if state.loading {
            return Err(SessionError::Validation(
                "이미 처리 중인 요청이 있습니다.".to_string(),
            ));
        }

        let next = match state.step {
            Step::Question => {
                return Err(SessionError::InvalidStep(
                    "already at the first step".to_string(),
                ))
            }
            Step::Selection => {
                state.classification = None;
                Step::Question
            }
            Step::Result => {
                state.session = None;
                if state.classification.is_some() {
                    Step::Selection
                } else {
                    Step::Question
                }
            }
        };

        state.step = next;
        state.generation += 1;
        Ok(next)
    }

    /// Full reset to the initial step. Allowed even while a request is in
    /// flight; the generation bump makes its continuation a no-op.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        state.step = Step::Question;
        state.classification = None;
        state.session = None;
        state.loading = false;
        state.generation += 1;
    }

    /// Jump straight to `result` from a persisted history row, bypassing both
    /// gateways.
    pub async fn open_history(&self, id: Uuid) -> Result<Session> {
        let entry = self
            .feed
            .get(id)
            .await
            .ok_or_else(|| SessionError::EntryNotFound(id.to_string()))?;

        let session = Session::from_entry(&entry);

        let mut state = self.state.write().await;
        if state.loading {
            return Err(SessionError::Validation(
                "이미 처리 중인 요청이 있습니다.".to_string(),
            ));
        }
        state.classification = Some(ClassificationResult {
            question: session.question.clone(),
            category: session.category.clone(),
            confidence: session.confidence,
        });
        state.session = Some(session.clone());
        state.step = Step::Result;
        state.generation += 1;

        Ok(session)
    }

    /// Feedback is ephemeral: acknowledged and logged, never persisted.
    pub async fn feedback(&self, positive: bool) -> Result<&'static str> {
        let state = self.state.read().await;
        if state.step != Step::Result {
            return Err(SessionError::InvalidStep(
                "feedback is only accepted on a displayed answer".to_string(),
            ));
        }

        info!(positive, "Answer feedback received");
        Ok(if positive {
            "답변이 도움이 되었다니 기쁩니다."
        } else {
            "더 나은 답변을 제공하도록 하겠습니다."
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{MockAnswerGateway, MockClassificationGateway};
    use crate::history::InMemoryHistoryStore;
    use crate::models::{AnswerRecord, SENTINEL};
    use async_trait::async_trait;
    use tokio::sync::Notify;

    struct FailingClassificationGateway;

    #[async_trait]
    impl ClassificationGateway for FailingClassificationGateway {
        async fn classify(&self, _question: &str) -> Result<ClassificationResult> {
            Err(SessionError::Gateway("HTTP status 503".to_string()))
        }
    }

    struct FailingAnswerGateway;

    #[async_trait]
    impl AnswerGateway for FailingAnswerGateway {
        async fn answer(
            &self,
            _classification: &ClassificationResult,
            _selection: &Selection,
        ) -> Result<AnswerRecord> {
            Err(SessionError::Gateway("transport error: unreachable".to_string()))
        }
    }

    /// Classifier that blocks until released, for stale-continuation tests.
    struct BlockingClassificationGateway {
        release: Arc<Notify>,
    }

    #[async_trait]
    impl ClassificationGateway for BlockingClassificationGateway {
        async fn classify(&self, question: &str) -> Result<ClassificationResult> {
            self.release.notified().await;
            Ok(ClassificationResult {
                question: question.to_string(),
                category: "늦게 도착한 분류".to_string(),
                confidence: 0.99,
            })
        }
    }

    async fn engine_with(
        classifier: Box<dyn ClassificationGateway>,
        answerer: Box<dyn AnswerGateway>,
    ) -> SessionEngine {
        let store = Arc::new(InMemoryHistoryStore::new());
        let feed = Arc::new(HistoryFeed::start(store).await);
        SessionEngine::new(classifier, answerer, feed)
    }

    async fn default_engine() -> SessionEngine {
        engine_with(
            Box::new(MockClassificationGateway::default()),
            Box::new(MockAnswerGateway),
        )
        .await
    }

    #[tokio::test]
    async fn test_empty_question_is_rejected() {
        let engine = default_engine().await;
        assert!(engine.submit_question("   ").await.is_err());
        assert_eq!(engine.view().await.step, Step::Question);
    }

    #[tokio::test]
    async fn test_submission_advances_to_selection() {
        let engine = default_engine().await;
        let result = engine
            .submit_question("부서별 예산 승인 절차가 어떻게 되나요?")
            .await
            .unwrap();
        assert_eq!(result.category, "예산 승인 절차");

        let view = engine.view().await;
        assert_eq!(view.step, Step::Selection);
        assert!(!view.is_loading);
    }

    #[tokio::test]
    async fn test_classification_fails_open() {
        let engine = engine_with(
            Box::new(FailingClassificationGateway),
            Box::new(MockAnswerGateway),
        )
        .await;

        let result = engine
            .submit_question("부서 생일 선물 예산 300만원 결재는?")
            .await
            .unwrap();
        assert_eq!(result.category, crate::models::DEFAULT_CATEGORY);
        assert_eq!(result.confidence, 0.8);
        assert_eq!(engine.view().await.step, Step::Selection);
    }

    #[tokio::test]
    async fn test_confirm_requires_both_fields() {
        let engine = default_engine().await;
        engine.submit_question("질문").await.unwrap();

        assert!(engine.confirm_selection("", "additional", None).await.is_err());
        assert!(engine.confirm_selection("1,000", "", None).await.is_err());
        assert_eq!(engine.view().await.step, Step::Selection);
    }

    #[tokio::test]
    async fn test_confirm_fails_closed_on_gateway_error() {
        let engine = engine_with(
            Box::new(MockClassificationGateway::default()),
            Box::new(FailingAnswerGateway),
        )
        .await;
        engine.submit_question("질문").await.unwrap();

        let outcome = engine.confirm_selection("1,000", "additional", None).await;
        assert!(matches!(outcome, Err(SessionError::Gateway(_))));

        let view = engine.view().await;
        assert_eq!(view.step, Step::Selection);
        assert!(!view.is_loading);
        assert!(view.session.is_none());
    }

    #[tokio::test]
    async fn test_confirm_persists_and_advances() {
        let engine = default_engine().await;
        engine
            .submit_question("노트북 구입비 결재라인은?")
            .await
            .unwrap();

        let session = engine
            .confirm_selection("1,000", "additional", None)
            .await
            .unwrap();
        assert_eq!(session.selection.as_ref().unwrap().amount_won, 10_000_000);
        assert_eq!(engine.view().await.step, Step::Result);

        let entries = engine.history().entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].question, "노트북 구입비 결재라인은?");
        assert_eq!(entries[0].amount.as_deref(), Some("10000000"));
    }

    #[tokio::test]
    async fn test_history_round_trip() {
        let engine = default_engine().await;
        engine.submit_question("질문").await.unwrap();
        let original = engine
            .confirm_selection("300", "early", None)
            .await
            .unwrap();

        engine.reset().await;
        let id = engine.history().entries().await[0].id;
        let restored = engine.open_history(id).await.unwrap();

        assert_eq!(restored.answer, original.answer);
        assert_eq!(restored.question, original.question);
        assert_eq!(restored.selection, original.selection);
        assert_eq!(engine.view().await.step, Step::Result);
    }

    #[tokio::test]
    async fn test_sentinel_answer_survives_round_trip() {
        let engine = default_engine().await;
        engine.submit_question("질문").await.unwrap();
        engine
            .confirm_selection("100", "transfer", None)
            .await
            .unwrap();

        // Overwrite the stored answer with raw text, as an old row would be.
        let id = engine.history().entries().await[0].id;
        engine.reset().await;
        let restored = {
            let mut entry = engine.history().get(id).await.unwrap();
            entry.answer = "규정집을 참고하세요.".to_string();
            entry.approver = None;
            entry.document = None;
            Session::from_entry(&entry)
        };

        assert_eq!(restored.answer.approver(), Some(SENTINEL));
        assert_eq!(restored.answer.explanation(), "규정집을 참고하세요.");
    }

    #[tokio::test]
    async fn test_back_discards_classification() {
        let engine = default_engine().await;
        engine.submit_question("질문").await.unwrap();

        assert_eq!(engine.back().await.unwrap(), Step::Question);
        let view = engine.view().await;
        assert!(view.classification.is_none());
        assert_eq!(view.step, Step::Question);
    }

    #[tokio::test]
    async fn test_back_from_result_returns_to_selection() {
        let engine = default_engine().await;
        engine.submit_question("질문").await.unwrap();
        engine
            .confirm_selection("1,000", "diversion", None)
            .await
            .unwrap();

        assert_eq!(engine.back().await.unwrap(), Step::Selection);
        // Classification survives so the form can be re-confirmed.
        assert!(engine.view().await.classification.is_some());
    }

    #[tokio::test]
    async fn test_stale_classification_is_dropped() {
        let release = Arc::new(Notify::new());
        let engine = Arc::new(
            engine_with(
                Box::new(BlockingClassificationGateway {
                    release: release.clone(),
                }),
                Box::new(MockAnswerGateway),
            )
            .await,
        );

        let submitting = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.submit_question("느린 질문").await })
        };

        // Let the request get in flight, then navigate away.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        engine.reset().await;
        release.notify_one();

        let outcome = submitting.await.unwrap();
        assert!(outcome.is_err());

        let view = engine.view().await;
        assert_eq!(view.step, Step::Question);
        assert!(view.classification.is_none());
        assert!(!view.is_loading);
    }

    #[tokio::test]
    async fn test_feedback_only_on_result() {
        let engine = default_engine().await;
        assert!(engine.feedback(true).await.is_err());

        engine.submit_question("질문").await.unwrap();
        engine
            .confirm_selection("1,000", "additional", None)
            .await
            .unwrap();
        let message = engine.feedback(true).await.unwrap();
        assert!(message.contains("기쁩니다"));
    }
}
