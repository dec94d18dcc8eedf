//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands};
use crate::config::TapConfig;
use crate::emitter::{JsonLinesSink, MessageSink, StateFileSink, TeeSink};
use crate::engine::{cancellation, MemorySource, RunCoordinator};
use crate::error::{Error, Result, ResultExt};
use crate::loader::load_config;
use crate::state::{StateDocument, StateManager};
use crate::types::{JsonObject, JsonValue};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

/// One line of `read` input
#[derive(Debug, Deserialize)]
struct InputLine {
    stream: String,
    record: JsonValue,
    #[serde(default)]
    partition: Option<JsonObject>,
}

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Read {
                records,
                streams,
                max_records,
                fail_fast,
            } => {
                self.read(
                    records.as_deref(),
                    streams.as_deref(),
                    *max_records,
                    *fail_fast,
                )
                .await
            }
            Commands::Validate => self.validate(),
            Commands::Reset { stream } => self.reset(stream.as_deref()).await,
        }
    }

    /// Load and validate the tap configuration
    fn load_config(&self) -> Result<TapConfig> {
        let path = self
            .cli
            .config
            .as_ref()
            .ok_or_else(|| Error::config("Config file not specified (use -C flag)"))?;
        load_config(path)
    }

    /// Load prior state
    async fn load_state(&self) -> Result<StateDocument> {
        // Inline state takes precedence
        if let Some(state_json) = &self.cli.state_json {
            StateDocument::from_json_str(state_json)
        } else if let Some(path) = &self.cli.state {
            StateManager::new(path).load().await
        } else {
            Ok(StateDocument::new())
        }
    }

    /// Replay records through the coordinator
    async fn read(
        &self,
        records: Option<&Path>,
        streams: Option<&str>,
        max_records: Option<usize>,
        fail_fast: bool,
    ) -> Result<()> {
        let mut config = self.load_config()?;
        if let Some(filter) = streams {
            config.streams = select_streams(&config, filter)?;
        }
        if let Some(max) = max_records {
            config.max_records = max;
        }
        config.fail_fast |= fail_fast;

        let prior = self.load_state().await?;

        let input = match records {
            Some(path) => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read records from {}", path.display()))?,
            None => {
                let mut buffer = String::new();
                tokio::io::stdin()
                    .read_to_string(&mut buffer)
                    .await
                    .context("Failed to read records from stdin")?;
                buffer
            }
        };
        let mut source = parse_records(&input)?;

        let (handle, signal) = cancellation();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping at the next record");
                handle.cancel();
            }
        });

        info!(streams = config.streams.len(), "Starting run");
        let mut coordinator = RunCoordinator::new(config)
            .with_prior_state(prior)
            .with_cancel_signal(signal);

        match &self.cli.state {
            Some(path) => {
                let mut sink = TeeSink::new(
                    JsonLinesSink::stdout(),
                    StateFileSink::new(StateManager::new(path)),
                );
                run_to(&mut coordinator, &mut source, &mut sink).await
            }
            None => run_to(&mut coordinator, &mut source, &mut JsonLinesSink::stdout()).await,
        }
    }

    /// Validate the tap configuration
    fn validate(&self) -> Result<()> {
        let config = self.load_config()?;

        let incremental = config
            .streams
            .iter()
            .filter(|s| s.tracks_bookmark())
            .count();
        println!(
            "{}",
            json!({
                "type": "LOG",
                "log": {
                    "level": "INFO",
                    "message": format!(
                        "Config is valid with {} streams ({incremental} incremental)",
                        config.streams.len()
                    )
                }
            })
        );

        Ok(())
    }

    /// Explicit bookmark reset
    async fn reset(&self, stream: Option<&str>) -> Result<()> {
        let path = self
            .cli
            .state
            .as_ref()
            .ok_or_else(|| Error::config("State file not specified (use --state)"))?;
        let manager = StateManager::new(path);

        match stream {
            Some(name) => {
                if manager.clear_stream(name).await? {
                    info!(stream = %name, "Bookmark reset");
                } else {
                    warn!(stream = %name, "No bookmark to reset");
                }
            }
            None => {
                manager.clear().await?;
                info!("All bookmarks reset");
            }
        }

        Ok(())
    }
}

async fn run_to<S: MessageSink>(
    coordinator: &mut RunCoordinator,
    source: &mut MemorySource,
    sink: &mut S,
) -> Result<()> {
    coordinator.run(source, sink).await?;

    let stats = coordinator.stats();
    info!(
        records = stats.records_synced,
        completed = stats.streams_completed,
        interrupted = stats.streams_interrupted,
        failed = stats.streams_failed,
        duration_ms = stats.duration_ms,
        "Sync completed"
    );
    Ok(())
}

/// Keep only the comma-separated streams named in `filter`
pub(crate) fn select_streams(
    config: &TapConfig,
    filter: &str,
) -> Result<Vec<crate::config::StreamConfig>> {
    filter
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            config
                .get_stream(name)
                .cloned()
                .ok_or_else(|| Error::StreamNotFound {
                    stream: name.to_string(),
                })
        })
        .collect()
}

/// Parse newline-delimited `{"stream", "record", "partition"?}` input
pub(crate) fn parse_records(input: &str) -> Result<MemorySource> {
    let mut source = MemorySource::new();
    for (index, line) in input.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let parsed: InputLine = serde_json::from_str(line)
            .with_context(|| format!("Invalid record on line {}", index + 1))?;
        match parsed.partition {
            Some(partition) => source.push_partitioned(parsed.stream, partition, parsed.record),
            None => source.push(parsed.stream, parsed.record),
        }
    }
    Ok(source)
}
