use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use patrol_analyzer::{AnalysisEngine, AnalysisProvider, CodeProvider, ProcessingOptions};
use patrol_cache::AnalysisCache;
use patrol_core::{AnalysisResult, ErrorEvent, PatrolError};

use crate::config::PatrolConfig;
use crate::github::GitHubCodeProvider;
use crate::llms::OpenAIProvider;
use crate::otel;

#[derive(Parser, Debug)]
#[command(author, version, about = "Error-log analysis with fingerprint deduplication", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a patrol.toml config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze a single error event from a JSON file
    Analyze {
        /// Path to the event JSON
        event: PathBuf,

        /// Bypass the cache and force a fresh analysis
        #[arg(long)]
        skip_cache: bool,
    },

    /// Analyze a JSON array of error events
    Batch {
        /// Path to the events JSON array
        events: PathBuf,
    },

    /// Ingest an OTLP sink payload and analyze the events in it
    Otel {
        /// Path to the OTLP payload JSON
        payload: PathBuf,
    },

    /// Print the default configuration
    Config,
}

pub struct RootCommand;

impl RootCommand {
    pub async fn execute() -> Result<()> {
        let args = Args::parse();

        let config = match &args.config {
            Some(path) => PatrolConfig::load_from_file(path)?,
            None => PatrolConfig::load()?,
        };

        match &args.command {
            Commands::Analyze { event, skip_cache } => {
                let engine = build_engine(&config)?;
                let event = read_event(event)?;
                let options = ProcessingOptions {
                    skip_cache: *skip_cache,
                };

                match engine.process_with_options(&event, options).await {
                    Ok(result) => {
                        println!("{}", serde_json::to_string_pretty(&result)?);
                        print_cache_stats(&engine);
                        Ok(())
                    }
                    Err(err) => {
                        println!(
                            "{}",
                            serde_json::to_string_pretty(&failure_report(&event, &err))?
                        );
                        Err(err.into())
                    }
                }
            }

            Commands::Batch { events } => {
                let engine = build_engine(&config)?;
                let events = read_events(events)?;
                let results = engine.process_batch(&events).await;

                println!(
                    "{}",
                    serde_json::to_string_pretty(&render_batch(&events, &results))?
                );
                print_cache_stats(&engine);
                Ok(())
            }

            Commands::Otel { payload } => {
                let engine = build_engine(&config)?;
                let content = std::fs::read_to_string(payload)
                    .with_context(|| format!("Failed to read {}", payload.display()))?;
                let value: Value =
                    serde_json::from_str(&content).context("Payload is not valid JSON")?;

                let events = otel::parse_sink_payload(&value);
                if events.is_empty() {
                    anyhow::bail!("No error events found in payload");
                }

                let results = engine.process_batch(&events).await;
                println!(
                    "{}",
                    serde_json::to_string_pretty(&render_batch(&events, &results))?
                );
                print_cache_stats(&engine);
                Ok(())
            }

            Commands::Config => {
                println!("{}", PatrolConfig::generate_default_config());
                Ok(())
            }
        }
    }
}

fn build_engine(config: &PatrolConfig) -> Result<AnalysisEngine> {
    let cache = Arc::new(AnalysisCache::new(config.cache.to_cache_config()));
    let llm: Arc<dyn AnalysisProvider> = Arc::new(OpenAIProvider::new(
        config.api.model.clone(),
        config.api.base_url.clone(),
    ));
    let code: Arc<dyn CodeProvider> = Arc::new(GitHubCodeProvider::new()?);

    Ok(AnalysisEngine::new(
        cache,
        llm,
        code,
        config.resolver_config(),
    ))
}

fn read_event(path: &PathBuf) -> Result<ErrorEvent> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).context("Event file is not a valid error event")
}

fn read_events(path: &PathBuf) -> Result<Vec<ErrorEvent>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).context("Events file is not a JSON array of error events")
}

fn failure_report(event: &ErrorEvent, err: &PatrolError) -> Value {
    json!({
        "eventId": event.event_id,
        "status": "failed",
        "error": { "kind": err.kind(), "message": err.to_string() },
    })
}

fn render_batch(events: &[ErrorEvent], results: &[Result<AnalysisResult, PatrolError>]) -> Value {
    let items: Vec<Value> = events
        .iter()
        .zip(results)
        .map(|(event, outcome)| match outcome {
            Ok(result) => json!({
                "eventId": event.event_id,
                "status": "ok",
                "result": result,
            }),
            Err(err) => failure_report(event, err),
        })
        .collect();

    let processed = results.iter().filter(|r| r.is_ok()).count();
    json!({
        "processed": processed,
        "failed": results.len() - processed,
        "results": items,
    })
}

fn print_cache_stats(engine: &AnalysisEngine) {
    let stats = engine.cache_stats();
    eprintln!(
        "cache: {} hits / {} misses (hit rate {:.0}%), size {}/{}",
        stats.hits,
        stats.misses,
        stats.hit_rate * 100.0,
        stats.size,
        stats.max_size
    );
}
