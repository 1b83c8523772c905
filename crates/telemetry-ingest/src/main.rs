// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Telemetry ingest CLI
//!
//! Validates ingest configurations and replays captured messages through
//! the ingestion core.
//!
//! # Usage
//!
//! ```bash
//! # Generate an example configuration
//! telemetry-ingest gen-config --output ingest.toml
//!
//! # Validate a configuration file
//! telemetry-ingest validate --config ingest.toml
//!
//! # Replay a capture (one `epoch<TAB>topic<TAB>payload` per line)
//! telemetry-ingest replay --config ingest.toml --input capture.tsv --interval 300
//! ```

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use telemetry_ingest::{
    ConversionRegistry, IngestConfig, Ingestor, MeanAccumulator, StandardUnits,
    TopicStatsSnapshot, UnitSystem,
};
use tracing_subscriber::EnvFilter;

/// Telemetry ingestion core
#[derive(Parser, Debug)]
#[command(name = "telemetry-ingest")]
#[command(about = "Telemetry ingest - per-topic parsing, queueing and windowed retrieval")]
#[command(version)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "ingest.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Replay captured messages and print one record per interval
    Replay {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,

        /// Capture file, one `epoch<TAB>topic<TAB>payload` per line
        #[arg(short, long)]
        input: PathBuf,

        /// Window length (seconds)
        #[arg(long, default_value = "300")]
        interval: u64,

        /// Unit system of the emitted records (US, METRIC, METRICWX)
        #[arg(long, default_value = "US")]
        unit_system: String,
    },
}

const EXAMPLE_CONFIG: &str = r#"# Telemetry ingest configuration
# Generated by telemetry-ingest gen-config

[topics]
unit_system = "US"
max_queue = 1000
collect_wind_across_loops = true

# Payload grammar shared by every topic unless overridden
[topics.message]
type = "json"
flatten_delimiter = "_"

# Nested JSON loop packets
[topics."weather/loop"]
qos = 1

[topics."weather/loop".rain]
name = "rain"
contains_total = true

[topics."weather/loop".outTemp]
expires_after = 900

[topics."weather/loop".battery]
ignore = true

# keyword payloads: outTemp=72.5,outHumidity=40
[topics."station/keyword"]
[topics."station/keyword".message]
type = "keyword"
keyword_delimiter = ","
keyword_separator = "="

# One bare value per topic, keyed by the last topic level
[topics."sensors/+/temperature"]
unit_system = "METRIC"
use_topic_as_fieldname = true

[topics."sensors/+/temperature".message]
type = "individual"

[topics."sensors/+/temperature".temperature]
name = "extraTemp1"
"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Commands::GenConfig { output } => cmd_gen_config(output),
        Commands::Validate { config } => cmd_validate(config),
        Commands::Replay {
            config,
            input,
            interval,
            unit_system,
        } => cmd_replay(config, input, interval, &unit_system).await,
    }
}

fn build_ingestor(config_path: &Path) -> Result<Ingestor, Box<dyn std::error::Error>> {
    let raw = IngestConfig::from_file(config_path)?;
    let ingestor = Ingestor::from_config(
        &raw,
        Arc::new(StandardUnits::new()),
        &ConversionRegistry::new(),
    )?;
    Ok(ingestor)
}

fn cmd_gen_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::write(&output, EXAMPLE_CONFIG)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match build_ingestor(&config_path) {
        Ok(ingestor) => {
            let config = ingestor.config();
            println!("Configuration valid!");
            println!();
            println!("Topics: {}", config.topics.len());
            for (name, rule) in &config.topics {
                println!(
                    "  {} [{}, {}, qos {}, max queue {}, {} fields]{}",
                    name,
                    rule.grammar.kind_name(),
                    rule.unit_system,
                    rule.qos,
                    rule.max_queue_depth,
                    rule.fields.len(),
                    if rule.subscribe { "" } else { " (not subscribed)" }
                );
            }
            let collected: Vec<String> = config.collector_fields().into_iter().collect();
            println!("Collector fields: {}", collected.join(", "));
            if config.options.single_queue {
                println!("Single queue mode");
            }
            if !config.warnings.is_empty() {
                println!();
                println!("Warnings:");
                for warning in &config.warnings {
                    println!("  - {}", warning);
                }
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}

/// End of the window holding `ts`, aligned on multiples of `interval`.
fn window_end(ts: f64, interval: f64) -> f64 {
    (ts / interval).ceil() * interval
}

async fn cmd_replay(
    config_path: PathBuf,
    input: PathBuf,
    interval: u64,
    unit_system: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if interval == 0 {
        return Err("--interval must be greater than zero".into());
    }
    let interval = interval as f64;
    let unit_system = UnitSystem::parse(unit_system)
        .ok_or_else(|| format!("Unknown unit system '{}'", unit_system))?;
    let ingestor = Arc::new(build_ingestor(&config_path)?);
    let content = std::fs::read_to_string(&input)?;

    // The producer plays the transport; the consumer plays the periodic reader.
    let (tx, mut rx) = tokio::sync::watch::channel(None::<f64>);
    let producer_ingestor = Arc::clone(&ingestor);
    let producer = tokio::spawn(async move {
        let mut replayed = 0usize;
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.splitn(3, '\t');
            let (Some(ts), Some(topic), Some(payload)) = (parts.next(), parts.next(), parts.next())
            else {
                tracing::warn!("Line {}: expected epoch, topic and payload", lineno + 1);
                continue;
            };
            let Ok(arrival) = ts.trim().parse::<f64>() else {
                tracing::warn!("Line {}: bad timestamp '{}'", lineno + 1, ts);
                continue;
            };
            // Rejections are logged by the ingestor.
            if producer_ingestor
                .on_message_at(topic, payload.as_bytes(), arrival)
                .is_ok()
            {
                replayed += 1;
            }
            if tx.send(Some(arrival)).is_err() {
                break;
            }
            tokio::task::yield_now().await;
        }
        replayed
    });

    let mut next_end: Option<f64> = None;
    let mut emitted = 0usize;
    while rx.changed().await.is_ok() {
        let latest = *rx.borrow_and_update();
        let Some(latest) = latest else {
            continue;
        };
        let end = next_end.get_or_insert_with(|| window_end(latest, interval));
        while latest > *end {
            if emit_window(&ingestor, *end - interval, *end, unit_system)? {
                emitted += 1;
            }
            *end += interval;
        }
    }

    let replayed = producer.await?;
    if let Some(end) = next_end {
        if emit_window(&ingestor, end - interval, end, unit_system)? {
            emitted += 1;
        }
    }

    tracing::info!("Replayed {} messages into {} records", replayed, emitted);
    print_stats(&ingestor.stats());
    Ok(())
}

/// Print the record for `(start, end]`. Returns `false` for an empty window.
fn emit_window(
    ingestor: &Ingestor,
    start: f64,
    end: f64,
    unit_system: UnitSystem,
) -> Result<bool, serde_json::Error> {
    let mut record = ingestor.windowed_read_all(start, end, unit_system, MeanAccumulator::new);
    if record.is_empty() {
        tracing::debug!("Window ({}, {}] is empty", start, end);
        return Ok(false);
    }
    ingestor.fill_from_cache(&mut record);
    println!("{}", serde_json::to_string(&record.to_packet())?);
    Ok(true)
}

fn print_stats(stats: &[TopicStatsSnapshot]) {
    eprintln!("--- Topic Statistics ---");
    for stat in stats {
        eprintln!(
            "  {}: {} msgs ({:.1} msg/s), {} queued, {} dropped, {} errors, {} evicted",
            stat.topic,
            stat.messages_received,
            stat.messages_per_second(),
            stat.records_queued,
            stat.messages_dropped,
            stat.parse_errors,
            stat.evictions
        );
    }
}
