use std::sync::Arc;

use chrono::Duration;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use aggregate_outbox::config::AppConfig;
use aggregate_outbox::domain::survey::{QuestionAnswer, Survey, SurveyCommand, SurveyCommandHandler};
use aggregate_outbox::domain::IntegrationEvent;
use aggregate_outbox::event_sourcing::{
    AggregateStore, Clock, Database, PgDatabase, SystemClock, Transaction,
};
use aggregate_outbox::messaging::RedpandaSink;
use aggregate_outbox::metrics::{start_metrics_server, Metrics};
use aggregate_outbox::relay::OutboxRelay;
use aggregate_outbox::utils::{retry_with_backoff, RetryConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO, overridable with RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,aggregate_outbox=debug")),
        )
        .init();

    tracing::info!("🚀 Starting aggregate store with transactional outbox");

    // === 1. Configuration ===
    let config = AppConfig::from_env()?;

    // === 2. PostgreSQL pool and schema ===
    tracing::info!("Connecting to PostgreSQL...");
    // The database container may still be starting
    let db = retry_with_backoff(RetryConfig::aggressive(), |_| PgDatabase::connect(&config.postgres))
        .await
        .into_result()?;
    let db = Arc::new(db);
    db.run_migrations().await?;

    // === 3. Prometheus metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // actix-web wants its own runtime
    let registry = metrics.registry().clone();
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!("Failed to start metrics runtime: {}", e);
                return;
            }
        };
        rt.block_on(async {
            if let Err(e) = start_metrics_server(registry, metrics_port).await {
                tracing::error!("Metrics server error: {}", e);
            }
        });
    });

    // === 4. Redpanda sink (with circuit breaker) ===
    let sink = RedpandaSink::new(&config.brokers, &config.topic)?.with_metrics(metrics.clone());

    // === 5. Outbox relay ===
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay = OutboxRelay::<_, _, IntegrationEvent>::new(db.clone(), sink, config.relay.clone())
        .with_metrics(metrics.clone());
    let relay_handle = tokio::spawn(relay.run(shutdown_rx));

    // === 6. Demo: survey lifecycle ===
    let store = Arc::new(AggregateStore::new(db.clone()).with_metrics(metrics.clone()));
    let handler = SurveyCommandHandler::new(store.clone()).with_metrics(metrics.clone());

    if let Err(e) = run_demo(&handler, &store).await {
        tracing::error!("Demo failed: {:#}", e);
    }

    tracing::info!("✅ System running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    // === 7. Graceful shutdown ===
    tracing::info!("Shutting down...");
    let _ = shutdown_tx.send(true);
    if let Err(e) = relay_handle.await {
        tracing::error!("Relay task panicked: {}", e);
    }
    db.close().await;

    Ok(())
}

async fn run_demo<D: Database>(
    handler: &SurveyCommandHandler<D>,
    store: &AggregateStore<D>,
) -> anyhow::Result<()> {
    let now = SystemClock.now();

    let survey_id = handler
        .handle(SurveyCommand::CreateSurvey {
            tenant_id: "demo-tenant".into(),
            title: "Team lunch".into(),
            description: Some("Where should we go on Friday?".into()),
        })
        .await?
        .aggregate_id;
    tracing::info!(survey_id = %survey_id, "Created survey");

    handler
        .handle(SurveyCommand::AddQuestion {
            survey_id,
            title: "Cuisine".into(),
            description: None,
            options: vec!["Pizza".into(), "Sushi".into(), "Tacos".into()],
            allow_multiple: false,
        })
        .await?;
    handler
        .handle(SurveyCommand::SetMaxParticipants { survey_id, max_participants: 3 })
        .await?;
    handler
        .handle(SurveyCommand::SetEndTime { survey_id, end_time: now + Duration::days(7) })
        .await?;
    handler.handle(SurveyCommand::ReleaseSurvey { survey_id }).await?;

    let mut tx = store.begin().await?;
    let survey: Survey = store.load(&mut tx, survey_id).await?;
    tx.rollback().await?;

    let question = &survey.questions[0];
    for option in question.options.iter().take(3) {
        let outcome = handler
            .handle(SurveyCommand::SubmitResponse {
                survey_id,
                answers: vec![QuestionAnswer { question_id: question.id, choices: vec![option.id] }],
            })
            .await?;
        tracing::info!(response_id = %outcome.aggregate_id, choice = %option.value, "Submitted response");
    }

    Ok(())
}
