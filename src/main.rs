use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use research_engine::config::{Config, LogFormat};
use research_engine::gather::HttpFetcher;
use research_engine::model::GeminiClient;
use research_engine::pipeline::{ResearchEngine, SessionStatus};
use research_engine::storage::{SqliteStorage, Storage};

#[derive(Parser)]
#[command(name = "research-engine", version, about = "Pipeline-driven research reports")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a new research session and run it as far as it can go
    Start {
        /// The research query
        query: String,
    },
    /// Resume a session, optionally supplying clarification answers
    Resume {
        session_id: String,
        /// Clarification answer as question=answer; repeatable
        #[arg(long = "answer", value_name = "QUESTION=ANSWER")]
        answers: Vec<String>,
    },
    /// Print the full session document as JSON
    Show { session_id: String },
    /// List all sessions
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("loading configuration")?;
    init_logging(&config);

    let storage: Arc<dyn Storage> = Arc::new(
        SqliteStorage::new(&config.database.path, config.database.max_connections)
            .await
            .context("opening session store")?,
    );
    let model = Arc::new(
        GeminiClient::new(&config.model, config.request.clone())
            .context("building model client")?,
    );
    let fetcher = Arc::new(HttpFetcher::new(&config.gather).context("building page fetcher")?);
    let engine = ResearchEngine::new(&config, Arc::clone(&storage), model, fetcher);

    match cli.command {
        Command::Start { query } => {
            let session_id = engine.start_session(&query).await?;
            info!(session_id = %session_id, "session started");
            let status = engine.advance(&session_id, None).await?;
            report_status(&engine, &session_id, status).await?;
        }
        Command::Resume {
            session_id,
            answers,
        } => {
            let answers = parse_answers(&answers)?;
            let status = engine.advance(&session_id, answers).await?;
            report_status(&engine, &session_id, status).await?;
        }
        Command::Show { session_id } => {
            let session = engine.get_session(&session_id).await?;
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
        Command::List => {
            let sessions = storage.list_sessions().await?;
            if sessions.is_empty() {
                println!("No sessions.");
            }
            for summary in sessions {
                println!(
                    "{}  {:<22}  {}  {}",
                    summary.session_id,
                    summary.status,
                    summary.updated_at.format("%Y-%m-%d %H:%M:%S"),
                    summary.initial_query
                );
            }
        }
    }

    Ok(())
}

/// Print a human-readable account of where the session ended up.
async fn report_status(
    engine: &ResearchEngine,
    session_id: &str,
    status: SessionStatus,
) -> anyhow::Result<()> {
    let session = engine.get_session(session_id).await?;
    match status {
        SessionStatus::PendingClarification => {
            println!("Session {} needs clarification:", session_id);
            for question in &session.clarifying_questions {
                println!("  - {}", question.question);
                if !question.examples.is_empty() {
                    println!("    e.g. {}", question.examples.join(", "));
                }
            }
            println!(
                "\nResume with: research-engine resume {} --answer \"question=answer\"",
                session_id
            );
        }
        SessionStatus::Completed => {
            println!("Session {} completed.", session_id);
            if let Some(confidence) = &session.overall_confidence {
                println!(
                    "Overall confidence: {:.1} ({})",
                    confidence.score, confidence.level
                );
                for recommendation in &confidence.recommendations {
                    println!("  note: {}", recommendation);
                }
            }
            if let Some(path) = &session.final_report {
                println!("Report: {}", path);
            }
        }
        SessionStatus::Error => {
            if let Some(error) = &session.error {
                bail!("session failed at {}: {}", error.stage, error.message);
            }
            bail!("session {} is in the error state", session_id);
        }
        SessionStatus::InProgress => {
            println!("Session {} is in progress.", session_id);
        }
    }
    Ok(())
}

fn parse_answers(raw: &[String]) -> anyhow::Result<Option<BTreeMap<String, String>>> {
    if raw.is_empty() {
        return Ok(None);
    }
    let mut answers = BTreeMap::new();
    for pair in raw {
        let Some((question, answer)) = pair.split_once('=') else {
            bail!("answer {:?} is not in question=answer form", pair);
        };
        answers.insert(question.trim().to_string(), answer.trim().to_string());
    }
    Ok(Some(answers))
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}
