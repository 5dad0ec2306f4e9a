//! Solace application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Open the transcript store (SQLite, or memory when disabled)
//! 3. Load the resource catalog and intent templates
//! 4. Build the conversation orchestrator
//! 5. Run the line-oriented conversation loop on stdin

mod cli;
mod repl;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use solace_chat::{
    ClassificationGateway, ConversationOrchestrator, HttpClassifier, IntentTable,
    ResourceCatalog, ResponseGenerator, SessionStore, ThreadRandom,
};
use solace_core::config::SolaceConfig;
use solace_core::error::SolaceError;
use solace_core::types::Severity;
use solace_storage::{Database, MemoryTranscriptStore, SqliteTranscriptStore, TranscriptStore};

use cli::CliArgs;
use repl::Command;

/// Open the transcript store selected by the config.
fn open_transcripts(config: &SolaceConfig) -> Result<Arc<dyn TranscriptStore>, Box<dyn std::error::Error>> {
    if !config.storage.enabled {
        tracing::info!("Transcript persistence disabled, using in-memory store");
        return Ok(Arc::new(MemoryTranscriptStore::new()));
    }

    let db_path = config.transcript_db_path();
    if let Some(dir) = db_path.parent() {
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::error!(path = %dir.display(), error = %e, "Failed to create data directory");
            return Err(e.into());
        }
    }
    let db = Database::new(&db_path)?;
    tracing::info!(path = %db_path.display(), "Transcript database opened");
    Ok(Arc::new(SqliteTranscriptStore::new(Arc::new(db))))
}

/// Periodically evict idle sessions. Only spawned when a TTL is configured.
async fn session_janitor(orchestrator: Arc<ConversationOrchestrator>, ttl_minutes: u32) {
    let period = tokio::time::Duration::from_secs(u64::from(ttl_minutes).max(1) * 60);
    let mut interval = tokio::time::interval(period);
    interval.tick().await;
    loop {
        interval.tick().await;
        let evicted = orchestrator.sweep_expired_sessions();
        if evicted > 0 {
            tracing::debug!(evicted, "Idle sessions evicted");
        }
    }
}

async fn emit(
    stdout: &mut tokio::io::Stdout,
    value: &serde_json::Value,
) -> std::io::Result<()> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    stdout.write_all(line.as_bytes()).await?;
    stdout.flush().await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config. Load errors are reported once tracing is up.
    let config_file = args.resolve_config_path();
    let (mut config, config_error) = SolaceConfig::load_with_fallback(&config_file);
    config.apply_env();
    args.apply(&mut config);

    // Tracing. RUST_LOG wins over the configured level.
    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .init();

    tracing::info!("Starting Solace v{}", env!("CARGO_PKG_VERSION"));
    match config_error {
        None => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Some(SolaceError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %config_file.display(), "No config file, using defaults")
        }
        Some(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load config, using defaults"
        ),
    }

    // Storage.
    let transcripts = open_transcripts(&config)?;

    // Static tables.
    let catalog = Arc::new(ResourceCatalog::load_or_empty(Path::new(
        &config.resources.catalog_path,
    )));
    let intents = IntentTable::load_or_empty(Path::new(&config.resources.intents_path));
    tracing::info!(
        emotions = catalog.len(),
        intents = intents.len(),
        "Lookup tables ready"
    );

    // Classifier.
    let classifier = HttpClassifier::from_config(&config.classifier)?;
    tracing::info!(endpoint = %classifier.endpoint(), "Emotion classifier configured");

    let orchestrator = Arc::new(
        ConversationOrchestrator::new(
            ClassificationGateway::new(Arc::new(classifier)),
            SessionStore::from_config(&config.chat),
            ResponseGenerator::new(intents, Arc::new(ThreadRandom)),
            catalog,
            transcripts,
        )
        .with_max_message_length(config.chat.max_message_length),
    );

    // === Background tasks ===

    if config.chat.session_ttl_minutes > 0 {
        let janitor = Arc::clone(&orchestrator);
        let ttl = config.chat.session_ttl_minutes;
        tokio::spawn(async move {
            session_janitor(janitor, ttl).await;
        });
    }

    // === Conversation loop ===

    let user_id = args.user_id().map(str::to_string);
    let user = user_id.as_deref();
    let mut severity = Severity::General;
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    tracing::info!(user = user.unwrap_or("guest"), "Ready, type a message or /quit");

    while let Some(line) = lines.next_line().await? {
        let output = match Command::parse(&line) {
            Command::Quit => break,
            Command::Say(message) => {
                match orchestrator
                    .process_turn_with_severity(user, &message, severity)
                    .await
                {
                    Ok(outcome) => serde_json::to_value(&outcome)?,
                    Err(e) => json!({ "error": e.to_string(), "kind": e.kind().as_str() }),
                }
            }
            Command::History => {
                json!({ "history": orchestrator.get_recent_history(user).await })
            }
            Command::Clear => {
                orchestrator.clear_context(user);
                json!({ "cleared": true })
            }
            Command::Transcript => match orchestrator.transcript(user).await {
                Ok(entries) => json!({ "transcript": entries }),
                Err(e) => json!({ "error": e.to_string(), "kind": e.kind().as_str() }),
            },
            Command::Forget => match orchestrator.purge_transcript(user).await {
                Ok(deleted) => json!({ "deleted": deleted }),
                Err(e) => json!({ "error": e.to_string(), "kind": e.kind().as_str() }),
            },
            Command::Severity(tier) => {
                severity = tier;
                json!({ "severity": severity })
            }
            Command::Invalid(msg) => json!({ "error": msg }),
        };
        emit(&mut stdout, &output).await?;
    }

    tracing::info!("Goodbye");
    Ok(())
}
