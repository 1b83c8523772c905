// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Telemetry ingestion core
//!
//! Turns pub/sub messages carrying sensor observations into canonical
//! records, queues them per topic and hands them out in time windows.
//!
//! # Features
//!
//! - **Layered Rules**: Global, topic and field options resolved once at startup
//! - **Payload Grammars**: Keyword lists, nested JSON and single bare values
//! - **Field Pipeline**: Ignore, convert, filter, unit conversion, counter deltas, renaming
//! - **Bounded Queues**: Per-topic or shared FIFO queues with eviction
//! - **Vector Collector**: Wind speed and direction correlated across messages
//! - **Windowed Reads**: Queued records merged into one record per interval
//!
//! # Quick Start
//!
//! ```bash
//! # Check a configuration file
//! telemetry-ingest validate --config ingest.toml
//!
//! # Replay captured messages and print one record per 5 minutes
//! telemetry-ingest replay --config ingest.toml --input capture.tsv --interval 300
//! ```
//!
//! # Configuration File
//!
//! ```toml
//! [topics]
//! unit_system = "US"
//! max_queue = 1000
//!
//! [topics.message]
//! type = "json"
//!
//! [topics."weather/loop"]
//! qos = 1
//!
//! [topics."weather/loop".rain]
//! name = "rain"
//! contains_total = true
//!
//! [topics."sensors/+/temperature"]
//! use_topic_as_fieldname = true
//!
//! [topics."sensors/+/temperature".message]
//! type = "individual"
//! ```

pub mod accumulator;
pub mod cache;
pub mod collector;
pub mod config;
pub mod counter;
pub mod ingest;
pub mod parser;
pub mod queue;
pub mod record;
pub mod stats;
pub mod topic;
pub mod units;
pub mod value;
pub mod window;

pub use accumulator::{Accumulator, MeanAccumulator, OutOfSpan, TimeSpan};
pub use cache::RecordCache;
pub use config::{ConfigError, ConversionRegistry, IngestConfig, ResolvedConfig};
pub use counter::CounterState;
pub use ingest::{IngestError, Ingestor, Subscription};
pub use parser::ParseError;
pub use queue::QueueStore;
pub use record::CanonicalRecord;
pub use stats::TopicStatsSnapshot;
pub use units::{StandardUnits, UnitRegistry, UnitSystem};
pub use value::Value;
