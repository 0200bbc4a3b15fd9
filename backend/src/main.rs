use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use lesion_backend::cases::LifecycleManager;
use lesion_backend::classifier::HttpClassifier;
use lesion_backend::config::{AppConfig, StoreBackend};
use lesion_backend::db::{CaseStore, DynamoDbCaseRepository, InMemoryCaseStore};
use lesion_backend::notify::{LogNotifier, NotificationDispatcher, Notifier, WebhookNotifier};
use lesion_backend::queue::ReviewQueue;
use lesion_backend::risk::{RiskEngine, TriagePolicy};
use lesion_backend::routes::{ServiceInfo, configure_routes};

const NOTIFY_RETRY_DELAY: Duration = Duration::from_millis(500);
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

fn startup_error(context: &str, err: impl std::fmt::Display) -> io::Error {
    log::error!("{}: {}", context, err);
    io::Error::other(format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(|e| startup_error("Invalid configuration", e))?;

    let policy = match &config.policy_path {
        Some(path) => {
            log::info!("Loading triage policy from {}", path.display());
            TriagePolicy::load(path).map_err(|e| startup_error("Invalid triage policy", e))?
        }
        None => {
            log::info!("Using built-in triage policy");
            TriagePolicy::default()
        }
    };
    log::info!(
        "Triage policy {} with {} labels",
        policy.version,
        policy.labels.len()
    );
    let engine = RiskEngine::from_policy(policy);

    let store: Arc<dyn CaseStore> = match &config.store {
        StoreBackend::Memory => {
            log::warn!("Using in-memory case store; cases are lost on restart");
            Arc::new(InMemoryCaseStore::new())
        }
        StoreBackend::DynamoDb { cases_table } => {
            let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
            log::info!("Using DynamoDB table {}", cases_table);
            Arc::new(DynamoDbCaseRepository::new(
                DynamoDbClient::new(&aws_config),
                cases_table.clone(),
            ))
        }
    };

    let classifier = HttpClassifier::new(config.classifier_url.clone(), config.classifier_timeout)
        .map_err(|e| startup_error("Failed to build classifier client", e))?;

    let info = ServiceInfo {
        classifier_endpoint: classifier.endpoint().to_string(),
    };

    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => {
            log::info!("Escalations will be posted to {}", url);
            Arc::new(
                WebhookNotifier::new(url.clone(), NOTIFY_TIMEOUT)
                    .map_err(|e| startup_error("Failed to build webhook client", e))?,
            )
        }
        None => Arc::new(LogNotifier),
    };
    let notifications =
        NotificationDispatcher::new(notifier, config.notify_max_attempts, NOTIFY_RETRY_DELAY);

    let lifecycle = LifecycleManager::new(store.clone(), engine, Arc::new(classifier), notifications)
        .with_classifier_timeout(config.classifier_timeout)
        .with_max_image_bytes(config.max_image_bytes);
    let queue = ReviewQueue::new(store);

    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    let lifecycle = web::Data::new(lifecycle);
    let queue = web::Data::new(queue);
    let info = web::Data::new(info);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(lifecycle.clone())
            .app_data(queue.clone())
            .app_data(info.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
