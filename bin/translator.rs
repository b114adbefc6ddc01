use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::Parser;

use cism::translator;

#[derive(Parser)]
#[command(name = "translator")]
#[command(about = "Assemble a source file into a machine-code artifact")]
struct Args {
    /// Assembly source file.
    input: PathBuf,

    /// Destination for the JSON artifact.
    output: PathBuf,
}

fn main() {
    if let Err(err) = run(Args::parse()) {
        eprintln!("translator: {}", err);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let source = fs::read_to_string(&args.input)?;
    let program = translator::translate(&source)?;

    println!(
        "source LoC: {} code instr: {}",
        source.lines().count(),
        program.code.len(),
    );

    fs::write(&args.output, program.to_json())?;
    Ok(())
}
