use budget_qa_engine::{
    api::start_server,
    config::Config,
    gateway::{
        AnswerGateway, AnswerWebhook, ClassificationGateway, ClassificationWebhook,
        MockAnswerGateway, MockClassificationGateway,
    },
    history::{HistoryFeed, HistoryStore, InMemoryHistoryStore, PostgresHistoryStore},
    session::SessionEngine,
};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = Config::from_env();

    info!("Budget Q&A Engine - API Server");
    info!("Port: {}", config.port);

    let classifier: Box<dyn ClassificationGateway> = match &config.classification_webhook_url {
        Some(url) => Box::new(ClassificationWebhook::new(url.clone())),
        None => {
            warn!("CLASSIFICATION_WEBHOOK_URL not set, using mock classification gateway");
            Box::new(MockClassificationGateway::default())
        }
    };

    let answerer: Box<dyn AnswerGateway> = match &config.answer_webhook_url {
        Some(url) => Box::new(AnswerWebhook::new(url.clone())),
        None => {
            warn!("ANSWER_WEBHOOK_URL not set, using mock answer gateway");
            Box::new(MockAnswerGateway)
        }
    };

    let store: Arc<dyn HistoryStore> = match &config.database_url {
        Some(url) => match PostgresHistoryStore::connect(url) {
            Ok(store) => {
                info!("History backend: postgres");
                Arc::new(store)
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres history backend, falling back to in-memory: {}",
                    error
                );
                Arc::new(InMemoryHistoryStore::new())
            }
        },
        None => {
            info!("History backend: in-memory");
            Arc::new(InMemoryHistoryStore::new())
        }
    };

    let feed = Arc::new(HistoryFeed::start(store).await);
    let engine = Arc::new(SessionEngine::new(classifier, answerer, feed));

    info!("Session engine initialized");

    start_server(engine, config.port).await?;

    Ok(())
}
