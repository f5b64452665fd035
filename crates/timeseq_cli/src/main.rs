//! timeseq-run: validate and run TimeSeq scripts without an audio host.
//!
//! The runner stands in for the audio/UI host: it owns a set of simulated
//! ports, drives the engine tick by tick, and records what the script does.
//! Useful for checking a script before loading it into a real host, and
//! for regression-testing scripts in batch:
//!
//! - `check`: validate a script and report every error
//! - `run`: execute a script for a number of ticks and log its activity

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

use timeseq_core::{Host, Status, TimeSeq, ValidationError};

/// Validate and run TimeSeq scripts headlessly
#[derive(Parser)]
#[command(name = "timeseq-run")]
#[command(about = "Run TimeSeq sequencing scripts without an audio host")]
#[command(version)]
struct Cli {
    /// Output format
    #[arg(long, global = true, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a script and report every error found
    Check {
        /// Path to the script JSON file
        script: PathBuf,
    },

    /// Run a script and log triggers, voltages and assertions
    Run {
        /// Path to the script JSON file
        script: PathBuf,

        /// Number of ticks (samples) to run
        #[arg(short, long, default_value = "48000")]
        ticks: u64,

        /// Simulated sample rate in Hz
        #[arg(short, long, default_value = "48000")]
        rate: u32,

        /// Seed for the script's random values
        #[arg(short, long, default_value = "0")]
        seed: u64,

        /// Keep running after a stopping assertion failure
        #[arg(long)]
        ignore_asserts: bool,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { script } => check(&script, cli.format),
        Commands::Run {
            script,
            ticks,
            rate,
            seed,
            ignore_asserts,
        } => run(&script, ticks, rate, seed, ignore_asserts, cli.format),
    }
}

fn read_script(path: &PathBuf) -> Result<String, ExitCode> {
    std::fs::read_to_string(path).map_err(|err| {
        eprintln!("{} can not read {}: {err}", "error:".red().bold(), path.display());
        ExitCode::from(2)
    })
}

// ─── check ────────────────────────────────────────────────────────────────────

fn check(path: &PathBuf, format: OutputFormat) -> ExitCode {
    let text = match read_script(path) {
        Ok(text) => text,
        Err(code) => return code,
    };

    let mut host = SimHost::new(48_000);
    let mut engine = TimeSeq::new();
    let errors = engine.load_script(&text, &mut host);

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&CheckReport {
                    valid: errors.is_empty(),
                    errors: &errors,
                })
                .expect("report serializes")
            );
        }
        OutputFormat::Table => {
            if errors.is_empty() {
                println!("{} {}", "ok:".green().bold(), path.display());
            } else {
                println!(
                    "{} {} ({} error{})",
                    "invalid:".red().bold(),
                    path.display(),
                    errors.len(),
                    if errors.len() == 1 { "" } else { "s" },
                );
                for error in &errors {
                    println!(
                        "  {}  {}  {}",
                        error.location.yellow(),
                        error.code.as_str().red(),
                        error.message,
                    );
                }
            }
        }
    }

    if errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[derive(Serialize)]
struct CheckReport<'a> {
    valid: bool,
    errors: &'a [ValidationError],
}

// ─── run ──────────────────────────────────────────────────────────────────────

fn run(
    path: &PathBuf,
    ticks: u64,
    rate: u32,
    seed: u64,
    ignore_asserts: bool,
    format: OutputFormat,
) -> ExitCode {
    let text = match read_script(path) {
        Ok(text) => text,
        Err(code) => return code,
    };

    let mut host = SimHost::new(rate);
    let mut engine = TimeSeq::new();
    let errors = engine.load_script(&text, &mut host);
    if !errors.is_empty() {
        for error in &errors {
            eprintln!(
                "{} {} {} {}",
                "error:".red().bold(),
                error.location.yellow(),
                error.code.as_str(),
                error.message,
            );
        }
        return ExitCode::FAILURE;
    }

    engine.start(seed);

    let mut log = RunLog::default();
    let mut completed = ticks;
    for tick in 1..=ticks {
        host.tick = tick;
        engine.process(&mut host);
        for name in engine.triggers() {
            // Observed one tick after being raised.
            log.triggers.push(TriggerFire {
                tick: tick - 1,
                name: name.clone(),
            });
        }
        if engine.status() == Status::Paused && !ignore_asserts {
            completed = tick;
            break;
        }
    }

    log.asserts = host.asserts.clone();
    log.writes = host.write_count;
    log.completed_ticks = completed;
    log.stopped_by_assert = engine.status() == Status::Paused;
    log.outputs = host.nonzero_outputs();

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&log).expect("log serializes")
            );
        }
        OutputFormat::Table => print_log(&log),
    }

    if log.stopped_by_assert && !ignore_asserts {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn print_log(log: &RunLog) {
    println!(
        "{} {} ticks, {} port writes",
        "ran:".green().bold(),
        log.completed_ticks,
        log.writes,
    );

    if !log.triggers.is_empty() {
        println!("{}", "triggers:".bold());
        for fire in &log.triggers {
            println!("  {:>10}  {}", fire.tick, fire.name);
        }
    }

    if !log.outputs.is_empty() {
        println!("{}", "final outputs:".bold());
        for output in &log.outputs {
            println!(
                "  port {} channel {}  {:+.4} V",
                output.port + 1,
                output.channel + 1,
                output.voltage,
            );
        }
    }

    for assert in &log.asserts {
        let tag = if assert.stop { "assert!" } else { "assert" };
        println!(
            "{} tick {:>10}  {}  {}",
            tag.red().bold(),
            assert.tick,
            assert.name,
            assert.message,
        );
    }
}

#[derive(Default, Serialize)]
struct RunLog {
    completed_ticks: u64,
    writes: u64,
    stopped_by_assert: bool,
    triggers: Vec<TriggerFire>,
    outputs: Vec<OutputState>,
    asserts: Vec<AssertFire>,
}

#[derive(Serialize)]
struct TriggerFire {
    tick: u64,
    name: String,
}

#[derive(Serialize)]
struct OutputState {
    port: usize,
    channel: usize,
    voltage: f32,
}

#[derive(Clone, Serialize)]
struct AssertFire {
    tick: u64,
    name: String,
    message: String,
    stop: bool,
}

// ─── Simulated host ───────────────────────────────────────────────────────────

/// Stand-in for the audio host: flat port storage plus an event log.
struct SimHost {
    sample_rate: u32,
    tick: u64,
    inputs: [[f32; timeseq_core::PORT_MAX_CHANNELS]; timeseq_core::INPUT_PORTS],
    outputs: [[f32; timeseq_core::PORT_MAX_CHANNELS]; timeseq_core::OUTPUT_PORTS],
    write_count: u64,
    asserts: Vec<AssertFire>,
}

impl SimHost {
    fn new(sample_rate: u32) -> Self {
        SimHost {
            sample_rate,
            tick: 0,
            inputs: [[0.0; timeseq_core::PORT_MAX_CHANNELS]; timeseq_core::INPUT_PORTS],
            outputs: [[0.0; timeseq_core::PORT_MAX_CHANNELS]; timeseq_core::OUTPUT_PORTS],
            write_count: 0,
            asserts: Vec::new(),
        }
    }

    fn nonzero_outputs(&self) -> Vec<OutputState> {
        let mut states = Vec::new();
        for (port, channels) in self.outputs.iter().enumerate() {
            for (channel, &voltage) in channels.iter().enumerate() {
                if voltage != 0.0 {
                    states.push(OutputState {
                        port,
                        channel,
                        voltage,
                    });
                }
            }
        }
        states
    }
}

impl Host for SimHost {
    fn input_voltage(&self, port: usize, channel: usize) -> f32 {
        self.inputs[port][channel]
    }

    fn output_voltage(&self, port: usize, channel: usize) -> f32 {
        self.outputs[port][channel]
    }

    fn set_output_voltage(&mut self, port: usize, channel: usize, voltage: f32) {
        self.outputs[port][channel] = voltage;
        self.write_count += 1;
    }

    fn set_output_channels(&mut self, _port: usize, _channels: usize) {}

    fn set_output_label(&mut self, _port: usize, _label: &str) {}

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn assert_failed(&mut self, name: &str, message: &str, stop: bool) {
        self.asserts.push(AssertFire {
            tick: self.tick,
            name: name.to_string(),
            message: message.to_string(),
            stop,
        });
    }
}
