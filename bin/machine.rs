use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::Parser;
use slog::{o, Drain, Logger};

use cism::control::{self, StopReason};
use cism::datapath::InputSchedule;
use cism::isa::Program;

#[derive(Parser)]
#[command(name = "machine")]
#[command(about = "Run a machine-code artifact against a timed input schedule")]
struct Args {
    /// Machine-code artifact produced by the translator.
    program: PathBuf,

    /// Input schedule: a JSON array of [tick, "c"] pairs in ascending
    /// tick order.
    input: PathBuf,

    /// Log the execution journal to stderr.
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    if let Err(err) = run(Args::parse()) {
        eprintln!("machine: {}", err);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let program = Program::from_json(&fs::read_to_string(&args.program)?)?;
    let schedule: InputSchedule = serde_json::from_str(&fs::read_to_string(&args.input)?)?;

    let summary = control::simulate(&program, schedule, term_logger(args.verbose))?;

    println!("{}", summary.output);
    println!(
        "instr_counter: {} ticks: {}",
        summary.instr_counter, summary.ticks,
    );

    if summary.stop == StopReason::BudgetExceeded {
        return Err(summary.stop.to_string().into());
    }

    Ok(())
}

fn term_logger(verbose: bool) -> Logger {
    let level = if verbose { slog::Level::Debug } else { slog::Level::Info };

    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = drain.filter_level(level).fuse();

    Logger::root(drain, o!())
}
