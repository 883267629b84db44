use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use semu_core::eval::DEFAULT_MAX_CYCLES;
use semu_core::{Engine, RunOptions};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "semu")]
#[command(about = "Emulator for S-language register machine programs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a program listing
    Show {
        /// Path to the program XML file
        file: PathBuf,
        /// Expansion depth (0 keeps synthetics, 1 rewrites them)
        #[arg(long, default_value_t = 0)]
        depth: usize,
    },
    /// Render the depth-1 expansion with ancestry markers
    Expand {
        file: PathBuf,
    },
    /// Execute a program on an input vector
    Run {
        file: PathBuf,
        #[arg(long, default_value_t = 0)]
        depth: usize,
        /// Input values bound to x1, x2, ... in order
        #[arg(long = "input", value_name = "VALUE")]
        inputs: Vec<i64>,
        /// Cycle budget before the run is aborted
        #[arg(long, default_value_t = DEFAULT_MAX_CYCLES)]
        max_cycles: u64,
        /// Let DECREASE take variables below zero
        #[arg(long, action = ArgAction::SetTrue)]
        allow_negative: bool,
        /// Emit the result as JSON
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Single-step a program, printing the frame after each step
    Trace {
        file: PathBuf,
        #[arg(long, default_value_t = 0)]
        depth: usize,
        #[arg(long = "input", value_name = "VALUE")]
        inputs: Vec<i64>,
        /// Maximum number of forward steps
        #[arg(long, default_value_t = 32)]
        steps: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Show { file, depth } => {
            let engine = load(&file, RunOptions::default())?;
            println!("{}", engine.display(depth)?);
        }
        Command::Expand { file } => {
            let engine = load(&file, RunOptions::default())?;
            println!("{}", engine.display(1)?);
        }
        Command::Run {
            file,
            depth,
            inputs,
            max_cycles,
            allow_negative,
            json,
        } => {
            let options = RunOptions {
                max_cycles,
                saturating_decrease: !allow_negative,
            };
            let mut engine = load(&file, options)?;
            let result = engine.run(depth, &inputs)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("y = {}", result.y_value);
                println!("cycles = {}", result.cycles);
                for (name, value) in &result.variables {
                    println!("{name} = {value}");
                }
            }
        }
        Command::Trace {
            file,
            depth,
            inputs,
            steps,
        } => {
            let engine = load(&file, RunOptions::default())?;
            let mut session = engine.init_debug(depth, &inputs)?;
            for step_no in 1..=steps {
                session.step_forward()?;
                println!(
                    "step {step_no}: pc={} cycles={} last={:?} next={:?} vars={:?}",
                    session.pc(),
                    session.cycles(),
                    session.last_instruction(),
                    session.current_instruction().unwrap_or_default(),
                    session.variables()
                );
                if session.finished() {
                    println!("finished: y = {}", session.result().unwrap_or(0));
                    break;
                }
            }
            if session.step_backward() {
                println!(
                    "stepped back: pc={} cycles={}",
                    session.pc(),
                    session.cycles()
                );
            }
        }
    }
    Ok(())
}

fn load(file: &PathBuf, options: RunOptions) -> Result<Engine> {
    let mut engine = Engine::with_options(options);
    engine
        .load_file(file)
        .with_context(|| format!("failed to load {}", file.display()))?;
    Ok(engine)
}
