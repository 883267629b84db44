//! The interpreter: executes an instruction sequence on a variable frame
//! with static per-instruction cycle accounting and a configurable budget.

use crate::ast::{
    BasicOp, Function, InstrKind, Instruction, Program, SyntheticOp, VarRef, ARG_ASSIGNED,
    ARG_CONSTANT, ARG_FUNCTION_ARGS, ARG_FUNCTION_NAME, ARG_GOTO_LABEL, ARG_JEC_LABEL,
    ARG_JEV_LABEL, ARG_JZ_LABEL, ARG_VARIABLE, EXIT_LABEL,
};
use crate::funcs;
use crate::RunError;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

pub const DEFAULT_MAX_CYCLES: u64 = 1_000_000;

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Cycle budget per frame; exceeding it aborts the run.
    pub max_cycles: u64,
    /// When set, DECREASE of zero leaves the variable at zero. The
    /// expansion recipes rely on this; disable only for experiments.
    pub saturating_decrease: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_cycles: DEFAULT_MAX_CYCLES,
            saturating_decrease: true,
        }
    }
}

/// Transient execution state: variable map, program counter, cycle counter.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    vars: HashMap<String, i64>,
    pub pc: usize,
    pub cycles: u64,
}

impl Frame {
    /// Binds the input vector to `x1..`, pre-zeroes `z1..=max_work` and `y`.
    /// Inputs beyond the provided vector default to zero on lookup.
    pub fn for_program(program: &Program, inputs: &[i64]) -> Self {
        let mut frame = Self::default();
        for (i, value) in inputs.iter().enumerate() {
            frame.vars.insert(format!("x{}", i + 1), *value);
        }
        for i in 1..=program.max_work_var_index {
            frame.vars.insert(format!("z{i}"), 0);
        }
        frame.vars.insert("y".to_string(), 0);
        frame
    }

    pub(crate) fn for_function(function: &Function, args: &[i64]) -> Self {
        let mut frame = Self::default();
        for (i, value) in args.iter().enumerate() {
            frame.vars.insert(format!("x{}", i + 1), *value);
        }
        for i in 1..=function.max_work_var_index {
            frame.vars.insert(format!("z{i}"), 0);
        }
        frame.vars.insert("y".to_string(), 0);
        frame
    }

    /// Looks up a canonical variable name; untouched variables read as zero.
    pub fn get(&self, name: &str) -> i64 {
        self.vars.get(name).copied().unwrap_or(0)
    }

    pub fn set(&mut self, name: &str, value: i64) {
        self.vars.insert(name.to_string(), value);
    }

    /// Ordered snapshot of every touched variable.
    pub fn snapshot(&self) -> BTreeMap<String, i64> {
        self.vars
            .iter()
            .map(|(name, value)| (name.clone(), *value))
            .collect()
    }
}

/// Final state of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub y_value: i64,
    pub variables: BTreeMap<String, i64>,
    pub cycles: u64,
}

/// The instruction sequence a frame executes against. The main program and
/// each function body form their own scope; `program` stays visible for
/// QUOTE dispatch.
pub(crate) struct ExecScope<'a> {
    pub program: &'a Program,
    pub instructions: &'a [Instruction],
    pub label_map: &'a HashMap<String, usize>,
}

impl<'a> ExecScope<'a> {
    pub fn for_program(program: &'a Program) -> Self {
        Self {
            program,
            instructions: &program.instructions,
            label_map: &program.label_map,
        }
    }

    /// `EXIT` resolves past the last instruction; an undefined label falls
    /// through to the next line.
    fn target(&self, label: &str, pc: usize) -> usize {
        let key = label.trim().to_ascii_uppercase();
        if key == EXIT_LABEL {
            self.instructions.len()
        } else {
            self.label_map.get(&key).copied().unwrap_or(pc + 1)
        }
    }
}

/// Executes the program on the given inputs until fallthrough, EXIT or the
/// cycle budget.
pub fn run(program: &Program, inputs: &[i64], options: &RunOptions) -> Result<RunResult, RunError> {
    let scope = ExecScope::for_program(program);
    let mut frame = Frame::for_program(program, inputs);
    while frame.pc < scope.instructions.len() {
        step(&scope, &mut frame, options, 0)?;
        if frame.cycles > options.max_cycles {
            return Err(RunError::CycleLimitExceeded {
                limit: options.max_cycles,
                cycles: frame.cycles,
                pc: frame.pc,
                variables: frame.snapshot(),
            });
        }
    }
    Ok(RunResult {
        y_value: frame.get("y"),
        variables: frame.snapshot(),
        cycles: frame.cycles,
    })
}

/// Executes exactly one instruction: accumulates its cost, mutates the frame
/// and advances the program counter. The caller guarantees `pc` is in range.
pub(crate) fn step(
    scope: &ExecScope,
    frame: &mut Frame,
    options: &RunOptions,
    call_depth: usize,
) -> Result<(), RunError> {
    let ins = &scope.instructions[frame.pc];
    frame.cycles = frame.cycles.saturating_add(ins.cost);
    trace_step(ins, frame);
    match &ins.kind {
        InstrKind::Basic {
            op,
            var,
            jump_label,
        } => match op {
            BasicOp::Increase => {
                let value = frame.get(var.name());
                frame.set(var.name(), value + 1);
                frame.pc += 1;
            }
            BasicOp::Decrease => {
                let value = frame.get(var.name());
                let next = if options.saturating_decrease {
                    (value - 1).max(0)
                } else {
                    value - 1
                };
                frame.set(var.name(), next);
                frame.pc += 1;
            }
            BasicOp::Neutral => {
                frame.pc += 1;
            }
            BasicOp::JumpNotZero => {
                if frame.get(var.name()) != 0 {
                    frame.pc = match jump_label {
                        Some(label) => scope.target(label, frame.pc),
                        None => frame.pc + 1,
                    };
                } else {
                    frame.pc += 1;
                }
            }
        },
        InstrKind::Synthetic { op, var, args } => match op {
            SyntheticOp::ZeroVariable => {
                frame.set(var.name(), 0);
                frame.pc += 1;
            }
            SyntheticOp::Assignment => {
                let source = args
                    .get(ARG_ASSIGNED)
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty());
                let value = match source {
                    Some(text) => {
                        let src = VarRef::parse(text)
                            .ok_or_else(|| RunError::InvalidVariable(text.to_string()))?;
                        frame.get(src.name())
                    }
                    None => 0,
                };
                frame.set(var.name(), value);
                frame.pc += 1;
            }
            SyntheticOp::ConstantAssignment => {
                let k = constant_value(args);
                // The saturating machine has no negative values to assign.
                let k = if options.saturating_decrease { k.max(0) } else { k };
                frame.set(var.name(), k);
                frame.pc += 1;
            }
            SyntheticOp::GotoLabel => {
                frame.pc = match args.get(ARG_GOTO_LABEL) {
                    Some(label) => scope.target(label, frame.pc),
                    None => frame.pc + 1,
                };
            }
            SyntheticOp::JumpZero => {
                let taken = frame.get(var.name()) == 0;
                branch(scope, frame, args.get(ARG_JZ_LABEL), taken);
            }
            SyntheticOp::JumpEqualConstant => {
                let taken = frame.get(var.name()) == constant_value(args);
                branch(scope, frame, args.get(ARG_JEC_LABEL), taken);
            }
            SyntheticOp::JumpEqualVariable => {
                let other = match args.get(ARG_VARIABLE).map(|s| s.trim()) {
                    Some(text) => VarRef::parse(text)
                        .ok_or_else(|| RunError::InvalidVariable(text.to_string()))?,
                    None => VarRef::output(),
                };
                let taken = frame.get(var.name()) == frame.get(other.name());
                branch(scope, frame, args.get(ARG_JEV_LABEL), taken);
            }
            SyntheticOp::Quote => {
                let value = match args
                    .get(ARG_FUNCTION_NAME)
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                {
                    Some(name) => {
                        let raw = args.get(ARG_FUNCTION_ARGS).map(String::as_str).unwrap_or("");
                        funcs::dispatch(scope.program, frame, name, raw, options, call_depth)?
                    }
                    None => 0,
                };
                frame.set(var.name(), value);
                frame.pc += 1;
            }
        },
    }
    Ok(())
}

fn branch(scope: &ExecScope, frame: &mut Frame, label: Option<&String>, taken: bool) {
    if taken {
        frame.pc = match label {
            Some(label) => scope.target(label, frame.pc),
            None => frame.pc + 1,
        };
    } else {
        frame.pc += 1;
    }
}

fn constant_value(args: &HashMap<String, String>) -> i64 {
    args.get(ARG_CONSTANT)
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .unwrap_or(0)
}

fn trace_step(ins: &Instruction, frame: &Frame) {
    if std::env::var("SEMU_STEP_TRACE").is_err() {
        return;
    }
    eprintln!(
        "[step] pc={} cycles={} {}",
        frame.pc,
        frame.cycles,
        crate::display::command_text(ins)
    );
}
