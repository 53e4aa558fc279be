use budget_qa_engine::{
    gateway::{MockAnswerGateway, MockClassificationGateway},
    history::{HistoryFeed, HistoryStore, InMemoryHistoryStore},
    session::SessionEngine,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    info!("Budget Q&A Engine demo starting");

    let store: Arc<dyn HistoryStore> = Arc::new(InMemoryHistoryStore::new());
    let feed = Arc::new(HistoryFeed::start(store).await);
    let engine = SessionEngine::new(
        Box::new(MockClassificationGateway::default()),
        Box::new(MockAnswerGateway),
        feed,
    );

    let question = "부서에서 복리후생비로 직원 생일 선물 예산 300만 원을 잡으려고 하는데, \
                    어느 정도 결재를 받아야 하나요?";

    let classification = engine.submit_question(question).await?;
    println!("\n=== 질문 분류 ===");
    println!("카테고리: {}", classification.category);
    println!("신뢰도: {}%", classification.confidence_percent());

    let session = engine.confirm_selection("300", "additional", None).await?;
    println!("\n=== 답변 ===");
    if let Some(approver) = session.answer.approver() {
        println!("결재라인: {}", approver);
    }
    if let Some(document) = session.answer.document() {
        println!("참고규정: {}", document);
    }
    println!("설명: {}", session.answer.explanation());

    let message = engine.feedback(true).await?;
    println!("\n피드백: {}", message);

    println!("\n=== 질문 기록 ===");
    for entry in engine.history().entries().await {
        println!(
            "[{}] {} → {}",
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.question,
            entry.category
        );
    }

    Ok(())
}
