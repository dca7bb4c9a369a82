//! Command line front end for a wetter storage root.
//!
//! # Usage
//!
//! ```bash
//! # Store a sample, the timestamp defaults to now
//! wetter-cli --data-dir /var/lib/wetter persist garden temperature 2931
//!
//! # Query the buffers of a series as JSON
//! wetter-cli --data-dir /var/lib/wetter query garden temperature 24h
//! wetter-cli --data-dir /var/lib/wetter query garden temperature month 2024 3
//!
//! # List what is stored
//! wetter-cli --config wetter.toml locations
//! wetter-cli --config wetter.toml quantities garden
//!
//! # Dump a single buffer file
//! wetter-cli inspect /var/lib/wetter/garden/temperature/24h.dat --kind ring
//!
//! # Overwrite the oldest record of that file under its lock
//! wetter-cli patch /var/lib/wetter/garden/temperature/24h.dat --kind ring 0 1709251200 2931
//! ```
//!
//! The storage root comes from `--data-dir`, the `data_dir` of `--config` or
//! the `WETTER_DATA_DIR` environment variable, in that order.
//!
//! Logging follows `RUST_LOG` and defaults to `info`. `--verbose` sets the
//! global level to `debug`.

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use log::{debug, info};
use serde::Serialize;

use wetter_core::buffer::operate_exclusive;
use wetter_core::record::weather_format;
use wetter_core::{
    Buffer, Record, RingBuffer, SequenceBuffer, Series, StoreConfig, WeatherRepository,
    WeatherStore,
};

/// Persist and query weather series
#[derive(Parser, Debug)]
#[command(name = "wetter-cli", version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Storage root, overrides the configuration file
    #[arg(short, long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store one sample
    Persist {
        location: String,
        quantity: String,
        value: u16,
        /// Seconds since the unix epoch, defaults to now
        #[arg(short, long)]
        timestamp: Option<u64>,
    },
    /// Print the samples of one buffer as JSON
    Query {
        location: String,
        quantity: String,
        #[command(subcommand)]
        span: Span,
    },
    /// List all locations
    Locations,
    /// List the quantities of a location
    Quantities { location: String },
    /// Dump the records of a buffer file in storage order
    Inspect {
        file: PathBuf,
        #[arg(short, long, value_enum)]
        kind: BufferKind,
    },
    /// Overwrite one record of a buffer file while holding its lock
    Patch {
        file: PathBuf,
        #[arg(short, long, value_enum)]
        kind: BufferKind,
        /// Position in the order printed by `inspect`
        position: usize,
        timestamp: u64,
        value: u16,
    },
}

#[derive(Subcommand, Debug)]
enum Span {
    /// Raw samples of the last 24 hours
    #[command(name = "24h")]
    Last24h,
    /// Hourly averages of the last 31 days
    #[command(name = "31d")]
    Last31d,
    /// Daily averages of one year
    Year { year: i32 },
    /// Hourly averages of one month
    Month {
        year: i32,
        #[arg(value_parser = clap::value_parser!(u32).range(1..=12))]
        month: u32,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BufferKind {
    Ring,
    Sequence,
}

/// Output of `inspect` and `patch`.
#[derive(Serialize, Debug, PartialEq, Eq)]
struct Inspection {
    records: Vec<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    capacity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<u32>,
}

impl Inspection {
    fn of_ring(ring: &RingBuffer) -> Result<Self> {
        Ok(Self {
            records: ring.records()?,
            capacity: Some(ring.capacity()),
            index: Some(ring.index()),
        })
    }

    fn of_sequence(sequence: &SequenceBuffer) -> Result<Self> {
        Ok(Self {
            records: sequence.records()?,
            capacity: None,
            index: None,
        })
    }
}

fn main() {
    let cli = Cli::parse();
    let filters = std::env::var(env_logger::DEFAULT_FILTER_ENV).ok();
    log_builder(cli.verbose, filters.as_deref()).init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

/// Logger configured from `filters` (the `RUST_LOG` syntax), `info` when unset.
fn log_builder(verbose: bool, filters: Option<&str>) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(log::LevelFilter::Info);
    if let Some(filters) = filters {
        builder.parse_filters(filters);
    }
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.format_timestamp(None);
    builder
}

fn run(cli: Cli) -> Result<()> {
    let open = || -> Result<WeatherRepository> {
        let config = resolve_config(cli.config.as_deref(), cli.data_dir.as_deref())?;
        debug!("Using storage root {}", config.data_dir.display());
        WeatherRepository::open(&config)
            .with_context(|| format!("could not open {}", config.data_dir.display()))
    };

    match cli.command {
        Command::Persist {
            location,
            quantity,
            value,
            timestamp,
        } => {
            let timestamp = match timestamp {
                Some(timestamp) => timestamp,
                None => u64::try_from(Utc::now().timestamp())
                    .context("system clock is before the unix epoch")?,
            };
            open()?.persist(&location, &quantity, value, timestamp)?;
            info!("Persisted {quantity} = {value} at {location} for {timestamp}");
            Ok(())
        }
        Command::Query {
            location,
            quantity,
            span,
        } => print_json(&query(&mut open()?, &location, &quantity, span)?),
        Command::Locations => print_json(&open()?.query_locations()?),
        Command::Quantities { location } => print_json(&open()?.query_quantities(&location)?),
        Command::Inspect { file, kind } => print_json(&inspect(&file, kind)?),
        Command::Patch {
            file,
            kind,
            position,
            timestamp,
            value,
        } => {
            let inspection = patch(&file, kind, position, Record::new(timestamp, value))?;
            info!("Replaced entry {position} of {}", file.display());
            print_json(&inspection)
        }
    }
}

fn resolve_config(config: Option<&Path>, data_dir: Option<&Path>) -> Result<StoreConfig> {
    let config = match (config, data_dir) {
        (Some(path), data_dir) => {
            let mut config = StoreConfig::from_file(path)?;
            if let Some(data_dir) = data_dir {
                config.data_dir = data_dir.to_path_buf();
            }
            config
        }
        (None, Some(data_dir)) => StoreConfig::new(data_dir),
        (None, None) => StoreConfig::from_env()
            .context("no storage root given, use --data-dir, --config or WETTER_DATA_DIR")?,
    };
    Ok(config)
}

fn query(
    repository: &mut WeatherRepository,
    location: &str,
    quantity: &str,
    span: Span,
) -> Result<Series> {
    let series = match span {
        Span::Last24h => repository.query_24h(location, quantity),
        Span::Last31d => repository.query_31d(location, quantity),
        Span::Year { year } => repository.query_year(location, quantity, year),
        Span::Month { year, month } => repository.query_month(location, quantity, year, month),
    };

    match series {
        Err(e) if e.is_not_found() => bail!("no data for {quantity} at {location}: {e}"),
        series => Ok(series?),
    }
}

fn inspect(file: &Path, kind: BufferKind) -> Result<Inspection> {
    let format = weather_format();
    match kind {
        BufferKind::Ring => Inspection::of_ring(&RingBuffer::from_file(file, &format)?),
        BufferKind::Sequence => {
            Inspection::of_sequence(&SequenceBuffer::from_file(file, &format)?)
        }
    }
}

/// Replace one record in place and return the rewritten buffer.
fn patch(file: &Path, kind: BufferKind, position: usize, record: Record) -> Result<Inspection> {
    let format = weather_format();
    let entry = record.to_entry();
    let inspection = match kind {
        BufferKind::Ring => {
            let ((), ring) = operate_exclusive(file, &format, |ring: &mut RingBuffer| {
                ring.replace_entry(position, &entry)
            })?;
            Inspection::of_ring(&ring)?
        }
        BufferKind::Sequence => {
            let ((), sequence) =
                operate_exclusive(file, &format, |sequence: &mut SequenceBuffer| {
                    sequence.replace_entry(position, &entry)
                })?;
            Inspection::of_sequence(&sequence)?
        }
    };
    Ok(inspection)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
