//! Record Loop Monitor
//!
//! Usage:
//!   rl-monitor run <FILE>          - Run a framed record file through the loop
//!   rl-monitor run <FILE> --json   - Run a JSON-lines structured record file
//!   rl-monitor simulate            - Feed a synthetic live stream through the queue
//!   rl-monitor generate <FILE>     - Write a synthetic framed record file

mod processors;
mod simulate;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use rl_ingest::{ProcessingGate, write_record};
use rl_loop::{
    FramedSource, JsonLinesSource, LoopReport, LoopState, PipelineConfig, QueueSource, RecordLoop,
    RecordQueue, RecordSource,
};
use serde::Serialize;

use crate::processors::{
    CollectionCounter, MonitorSummary, RunTracker, SharedSummary, ThroughputCounter,
};
use crate::simulate::StreamShape;

#[derive(Parser)]
#[command(name = "rl-monitor", about = "Record loop monitor", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a record file through the loop
    Run {
        /// Input file
        file: PathBuf,

        /// Input holds JSON-lines structured records instead of framed raw records
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        loop_args: LoopArgs,
    },
    /// Feed a synthetic live stream through the record queue
    Simulate {
        #[command(flatten)]
        shape: ShapeArgs,

        /// Pause between produced records in microseconds
        #[arg(long, default_value_t = 0)]
        interval_us: u64,

        #[command(flatten)]
        loop_args: LoopArgs,
    },
    /// Write a synthetic framed record file
    Generate {
        /// Output file
        file: PathBuf,

        #[command(flatten)]
        shape: ShapeArgs,
    },
}

/// Loop settings; flags override the config file
#[derive(Args)]
struct LoopArgs {
    /// TOML file with [loop] and [adapter] tables
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Promotion depth: transport_only, structured_only or domain
    #[arg(short, long)]
    gate: Option<ProcessingGate>,

    /// Records to pull before finishing (-1 = unbounded)
    #[arg(short = 'n', long, allow_hyphen_values = true)]
    max_records: Option<i64>,

    /// Abort on the first failure
    #[arg(long)]
    stop_on_error: bool,

    /// Finish after the first run end
    #[arg(long)]
    stop_on_end_run: bool,

    /// Dequeue timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(Args)]
struct ShapeArgs {
    /// Number of runs
    #[arg(long, default_value_t = 1)]
    runs: u32,

    /// First run number
    #[arg(long, default_value_t = 1000)]
    first_run: u32,

    /// Readouts per run
    #[arg(short, long, default_value_t = 1000)]
    events: u32,

    /// Fragments per readout
    #[arg(long, default_value_t = 1)]
    fragments: u16,

    /// Corrupt every n-th readout (0 = never)
    #[arg(long, default_value_t = 0)]
    corrupt_every: u32,
}

impl From<&ShapeArgs> for StreamShape {
    fn from(args: &ShapeArgs) -> Self {
        Self {
            runs: args.runs,
            first_run: args.first_run,
            events_per_run: args.events,
            fragments: args.fragments,
            corrupt_every: args.corrupt_every,
        }
    }
}

#[derive(Serialize)]
struct Output<'a> {
    report: &'a LoopReport,
    monitor: &'a MonitorSummary,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            json,
            loop_args,
        } => run_file(&file, json, &loop_args),
        Commands::Simulate {
            shape,
            interval_us,
            loop_args,
        } => simulate(&StreamShape::from(&shape), interval_us, &loop_args),
        Commands::Generate { file, shape } => generate(&file, &StreamShape::from(&shape)),
    }
}

fn pipeline_config(args: &LoopArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let loop_config = &mut config.loop_config;
    if let Some(gate) = args.gate {
        loop_config.gate = gate;
    }
    if let Some(max) = args.max_records {
        loop_config.max_records = max;
    }
    if let Some(ms) = args.timeout_ms {
        loop_config.dequeue_timeout_ms = ms;
    }
    loop_config.stop_on_error |= args.stop_on_error;
    loop_config.stop_on_end_run |= args.stop_on_end_run;

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Run `source` with the monitoring processors and print the JSON result
fn monitor(config: PipelineConfig, source: Box<dyn RecordSource>) -> Result<LoopReport> {
    let summary = SharedSummary::default();
    let mut record_loop = RecordLoop::new(config, source)
        .context("Failed to build record loop")?
        .with_transport_processor(ThroughputCounter::new(&summary))
        .with_structured_processor(RunTracker::new(&summary))
        .with_domain_processor(CollectionCounter::new(&summary));

    let report = record_loop.run().context("Record loop failed")?;
    let monitor = summary.lock().clone();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(
        &mut out,
        &Output {
            report: &report,
            monitor: &monitor,
        },
    )?;
    writeln!(out)?;
    Ok(report)
}

fn run_file(file: &Path, json: bool, args: &LoopArgs) -> Result<()> {
    let config = pipeline_config(args)?;
    let context = || format!("Failed to open {}", file.display());
    let source: Box<dyn RecordSource> = if json {
        Box::new(JsonLinesSource::open(file).with_context(context)?)
    } else {
        Box::new(FramedSource::open(file).with_context(context)?)
    };

    let report = monitor(config, source)?;
    if report.state == LoopState::Error {
        bail!("Loop {}", report.outcome);
    }
    Ok(())
}

fn simulate(shape: &StreamShape, interval_us: u64, args: &LoopArgs) -> Result<()> {
    let config = pipeline_config(args)?;
    let queue = Arc::new(RecordQueue::new());

    let producer = {
        let queue = Arc::clone(&queue);
        let shape = shape.clone();
        thread::Builder::new()
            .name("rl-producer".to_string())
            .spawn(move || {
                let mut produced = 0u64;
                for record in shape.records() {
                    if queue.enqueue(record).is_err() {
                        log::info!("[Producer] Queue closed by consumer after {} records", produced);
                        return produced;
                    }
                    produced += 1;
                    if interval_us > 0 {
                        thread::sleep(Duration::from_micros(interval_us));
                    }
                }
                queue.close();
                produced
            })
            .context("Failed to spawn producer thread")?
    };

    let report = monitor(config, Box::new(QueueSource::new(Arc::clone(&queue))));
    queue.close();
    let produced = producer
        .join()
        .map_err(|_| anyhow::anyhow!("Producer thread panicked"))?;
    log::info!("[Producer] Produced {} records", produced);

    let report = report?;
    if report.state == LoopState::Error {
        bail!("Loop {}", report.outcome);
    }
    Ok(())
}

fn generate(file: &Path, shape: &StreamShape) -> Result<()> {
    let out = File::create(file).with_context(|| format!("Failed to create {}", file.display()))?;
    let mut writer = BufWriter::new(out);

    let mut written = 0u64;
    for record in shape.records() {
        write_record(&mut writer, &record)?;
        written += 1;
    }
    writer.flush()?;

    log::info!("[Generate] Wrote {} records to {}", written, file.display());
    Ok(())
}
