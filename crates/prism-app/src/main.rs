//! Prism application binary - composition root.
//!
//! Ties the Prism crates together into a single executable:
//! 1. Load configuration from TOML, resolve CLI overrides
//! 2. Open storage (SQLite) and run migrations
//! 3. Wire the refresh executor/scheduler and the chat engine
//! 4. Dispatch the operator command, or run the background service
//!
//! The upstream record API and the generative model are wired with the
//! in-tree deterministic clients (`StaticSource`, `CannedAssistant`);
//! swapping in real providers means implementing `RecordSource` and
//! `AssistantClient` and changing two lines here.

mod cli;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use prism_chat::{AssistantClient, CannedAssistant, ChatEngine, RuleClassifier};
use prism_core::events::{event_channel, DomainEvent};
use prism_core::types::{
    DataSource, FetchedRecord, RefreshStatus, RefreshTrigger, Secret, SourceConnection,
};
use prism_core::{PrismConfig, PrismError, Result};
use prism_storage::{
    ConnectionRepository, DataSourceRepository, Database, RefreshLogRepository,
};
use prism_sync::{RecordSource, RefreshExecutor, RefreshScheduler, RunReport, StaticSource};

use cli::{ChatAction, CliArgs, Command, ConnectionAction, SourceAction};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    let config = PrismConfig::load_or_default(&args.resolve_config_path());

    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    if let Err(e) = run(args, config).await {
        tracing::error!(error = %e, "Fatal error");
        std::process::exit(1);
    }
}

async fn run(args: CliArgs, config: PrismConfig) -> Result<()> {
    let data_dir = args.resolve_data_dir(&config.general.data_dir);
    let db = Arc::new(Database::new(&data_dir.join("prism.db"))?);

    let (events, _keepalive) = event_channel();

    let source_client: Arc<dyn RecordSource> = Arc::new(demo_source());
    let executor = Arc::new(RefreshExecutor::new(
        db.clone(),
        source_client,
        config.sync.clone(),
        Some(events.clone()),
    ));

    let assistant: Arc<dyn AssistantClient> = Arc::new(CannedAssistant::new());
    let engine = Arc::new(ChatEngine::new(
        db.clone(),
        assistant,
        Arc::new(RuleClassifier::new()),
        config.chat.clone(),
        Some(events.clone()),
    ));

    match args.command {
        Command::Serve => serve(db, executor, events, &config).await,
        Command::Connection { action } => handle_connection(&db, &executor, &config, action).await,
        Command::Source { action } => handle_source(&db, &config, action),
        Command::Refresh { data_source_id } => {
            match executor
                .run(data_source_id, RefreshTrigger::Manual)
                .await
                .map_err(PrismError::from)?
            {
                RunReport::Completed { counts } => println!(
                    "refreshed: fetched={} inserted={} updated={} removed={}",
                    counts.fetched, counts.inserted, counts.updated, counts.removed
                ),
                RunReport::Failed { error } => println!("refresh failed: {}", error),
                RunReport::SkippedLockHeld => {
                    println!("skipped: a refresh for this source is already running")
                }
            }
            Ok(())
        }
        Command::Chat { action } => handle_chat(&engine, &events, &config, action).await,
    }
}

/// Background service: recovery sweep, then scheduler and retention loops.
async fn serve(
    db: Arc<Database>,
    executor: Arc<RefreshExecutor>,
    events: broadcast::Sender<DomainEvent>,
    config: &PrismConfig,
) -> Result<()> {
    let recovered = executor.recover_interrupted().map_err(PrismError::from)?;
    if !recovered.is_empty() {
        info!(count = recovered.len(), "Reset interrupted refreshes from previous run");
    }

    // Event log task: every domain event becomes one log line.
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => info!(event = ?event, "domain event"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event log fell behind")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let scheduler = RefreshScheduler::new(db.clone(), executor, Some(events));
    let audit = RefreshLogRepository::new(db);
    let retention = chrono::Duration::days(i64::from(config.sync.audit_retention_days));

    let mut tick = tokio::time::interval(Duration::from_secs(config.sync.tick_interval_secs));
    let mut prune = tokio::time::interval(Duration::from_secs(24 * 60 * 60));

    info!(
        tick_secs = config.sync.tick_interval_secs,
        "Prism service started"
    );
    loop {
        tokio::select! {
            _ = tick.tick() => {
                if let Err(e) = scheduler.tick(Utc::now()).await {
                    warn!(error = %e, "Scheduler tick failed");
                }
            }
            _ = prune.tick() => {
                match audit.prune_older_than(Utc::now() - retention) {
                    Ok(0) => {}
                    Ok(pruned) => info!(pruned, "Pruned old refresh audit entries"),
                    Err(e) => warn!(error = %e, "Audit prune failed"),
                }
            }
        }
    }
}

async fn handle_connection(
    db: &Arc<Database>,
    executor: &Arc<RefreshExecutor>,
    config: &PrismConfig,
    action: ConnectionAction,
) -> Result<()> {
    let connections = ConnectionRepository::new(db.clone());
    match action {
        ConnectionAction::Add {
            name,
            account_id,
            secret,
            description,
            interval_secs,
        } => {
            let connection = SourceConnection {
                id: Uuid::new_v4(),
                name,
                account_id,
                secret: Secret::new(secret),
                is_active: true,
                auto_refresh: true,
                refresh_interval_secs: interval_secs
                    .unwrap_or(config.sync.default_refresh_interval_secs),
                description,
                created_at: Utc::now(),
            };
            connections.insert(&connection)?;
            println!("{}", connection.id);
        }
        ConnectionAction::List => {
            for c in connections.list()? {
                println!(
                    "{}  {}  account={}  active={}  interval={}s  secret={}",
                    c.id, c.name, c.account_id, c.is_active, c.refresh_interval_secs, c.secret
                );
            }
        }
        ConnectionAction::Deactivate { id } => {
            connections.set_active(id, false)?;
            println!("deactivated {}", id);
        }
        ConnectionAction::RotateSecret { id, secret } => {
            connections.rotate_secret(id, &Secret::new(secret))?;
            println!("rotated secret for {}", id);
        }
        ConnectionAction::Test { id } => {
            match executor.test_connection(id).await {
                Ok(()) => println!("connection {} ok", id),
                Err(e) => println!("connection {} failed: {}", id, e),
            }
        }
    }
    Ok(())
}

fn handle_source(db: &Arc<Database>, config: &PrismConfig, action: SourceAction) -> Result<()> {
    let sources = DataSourceRepository::new(db.clone());
    match action {
        SourceAction::Add {
            name,
            connection_id,
            record_type,
            fields,
            filter,
            interval_secs,
            max_records,
        } => {
            let fields: Vec<String> = fields
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect();
            let source = DataSource {
                id: Uuid::new_v4(),
                name,
                connection_id,
                record_type,
                fields,
                filter: serde_json::from_str(&filter)?,
                auto_refresh: true,
                refresh_interval_secs: interval_secs
                    .unwrap_or(config.sync.default_refresh_interval_secs),
                last_refresh: None,
                refresh_status: RefreshStatus::Idle,
                last_error: None,
                max_records: max_records.unwrap_or(10_000),
                created_at: Utc::now(),
            };
            sources.insert(&source)?;
            println!("{}", source.id);
        }
        SourceAction::List => {
            for s in sources.list()? {
                let last = s
                    .last_refresh
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{}  {}  type={}  status={}  last_refresh={}{}",
                    s.id,
                    s.name,
                    s.record_type,
                    s.refresh_status.as_str(),
                    last,
                    s.last_error
                        .map(|e| format!("  error={}", e))
                        .unwrap_or_default()
                );
            }
        }
        SourceAction::Deactivate { id } => {
            sources.set_auto_refresh(id, false)?;
            println!("auto-refresh disabled for {}", id);
        }
    }
    Ok(())
}

async fn handle_chat(
    engine: &Arc<ChatEngine>,
    events: &broadcast::Sender<DomainEvent>,
    config: &PrismConfig,
    action: ChatAction,
) -> Result<()> {
    match action {
        ChatAction::New { user, context } => {
            let context: serde_json::Value = serde_json::from_str(&context)?;
            let session_id = engine.create_session(&user, context)?;
            println!("{}", session_id);
        }
        ChatAction::Post {
            session_id,
            message,
        } => {
            // Subscribe before posting so the reply event cannot be missed.
            let mut rx = events.subscribe();
            engine.post_user_message(session_id, &message)?;

            let deadline = Duration::from_secs(config.chat.generation_timeout_secs + 5);
            loop {
                let event = tokio::time::timeout(deadline, rx.recv())
                    .await
                    .map_err(|_| PrismError::Chat("timed out waiting for reply".into()))?
                    .map_err(|e| PrismError::Chat(e.to_string()))?;
                match event {
                    DomainEvent::ReplyAppended {
                        session_id: sid, ..
                    } if sid == session_id => break,
                    DomainEvent::ReplyDiscarded { session_id: sid } if sid == session_id => {
                        println!("(session deactivated, reply discarded)");
                        return Ok(());
                    }
                    _ => continue,
                }
            }
            if let Some(last) = engine.get_messages(session_id)?.pop() {
                print_message(&last);
            }
        }
        ChatAction::Show { session_id } => {
            for message in engine.get_messages(session_id)? {
                print_message(&message);
            }
        }
        ChatAction::Deactivate { session_id } => {
            engine.deactivate_session(session_id)?;
            println!("deactivated {}", session_id);
        }
    }
    Ok(())
}

fn print_message(message: &prism_core::types::ChatMessage) {
    println!(
        "[{}] {}: {}",
        message.created_at.to_rfc3339(),
        message.role.as_str(),
        message.content
    );
    if let Some(payload) = &message.payload {
        println!("    payload: {}", payload);
    }
}

/// Fixture-backed record source used until a real provider is wired in.
fn demo_source() -> StaticSource {
    StaticSource::new()
        .with_records(
            "customer",
            vec![
                fixture("1", r#"{"id": "1", "companyname": "Acme", "email": "ops@acme.test"}"#),
                fixture("2", r#"{"id": "2", "companyname": "Globex", "email": "it@globex.test"}"#),
                fixture("3", r#"{"id": "3", "companyname": "Initech", "email": "bi@initech.test"}"#),
            ],
        )
        .with_records(
            "transaction",
            vec![
                fixture("t1", r#"{"id": "t1", "type": "invoice", "amount": 1200.0, "status": "open"}"#),
                fixture("t2", r#"{"id": "t2", "type": "invoice", "amount": 640.5, "status": "paid"}"#),
            ],
        )
}

fn fixture(id: &str, values: &str) -> FetchedRecord {
    FetchedRecord {
        external_id: id.to_string(),
        values: serde_json::from_str(values).expect("fixture JSON is valid"),
    }
}
