//! Core of the S-language emulator: program model, document parser,
//! interpreter with static cycle accounting, one-level macro expansion and
//! a reversible debug stepper. The crate is a pure library; callers own all
//! I/O and presentation.

pub mod ast;
pub mod debug;
pub mod display;
pub mod eval;
pub mod expand;
pub mod funcs;
pub mod parse;

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

pub use ast::{BasicOp, Function, InstrKind, Instruction, Program, SyntheticOp, VarKind, VarRef};
pub use debug::DebugSession;
pub use display::render;
pub use eval::{run, Frame, RunOptions, RunResult};
pub use expand::{expand, expand_to_depth, max_expansion_depth};
pub use parse::parse;

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Structural errors raised while reading the program document.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("document error: {0}")]
    Document(String),
    #[error("program name is missing")]
    MissingName,
    #[error("program must have a main S-Instructions section")]
    MissingInstructions,
    #[error("instruction {index}: {message}")]
    Instruction { index: usize, message: String },
    #[error("function {index}: missing the {attribute} attribute")]
    FunctionAttribute {
        index: usize,
        attribute: &'static str,
    },
}

/// Semantic errors raised after the document has been read.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("instruction {index}: undefined label '{label}'")]
    UndefinedLabel { index: usize, label: String },
    #[error("instruction {index}: undefined function '{name}'")]
    UndefinedFunction { index: usize, name: String },
    #[error("instruction {index}: {op} requires argument '{argument}'")]
    MissingArgument {
        index: usize,
        op: &'static str,
        argument: &'static str,
    },
    #[error("instruction {index}: invalid {argument} '{value}'")]
    InvalidArgument {
        index: usize,
        argument: &'static str,
        value: String,
    },
}

/// Everything that can go wrong while loading a program. A failed load
/// never exposes a partial [`Program`].
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("function '{name}': {source}")]
    InFunction {
        name: String,
        #[source]
        source: Box<LoadError>,
    },
    #[error("file must have a .xml extension: {0}")]
    NotXml(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runtime failures. The partial frame is carried where the caller may want
/// to inspect it.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("cycle limit of {limit} exceeded at instruction {pc}")]
    CycleLimitExceeded {
        limit: u64,
        cycles: u64,
        pc: usize,
        variables: BTreeMap<String, i64>,
    },
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("invalid variable '{0}'")]
    InvalidVariable(String),
    #[error("malformed argument expression: {0}")]
    MalformedArguments(String),
    #[error("call depth limit of {0} exceeded")]
    CallDepthExceeded(usize),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no program is loaded")]
    NoProgram,
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Run(#[from] RunError),
}

/// One recorded run of the loaded program.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub run_no: u32,
    pub depth: usize,
    pub inputs: Vec<i64>,
    pub y_value: i64,
    pub cycles: u64,
}

/// A single-program session: owns the loaded program, run options and the
/// run history. Plain value, no process-wide state; put one behind a request
/// dispatcher per instance if several are needed.
#[derive(Debug, Default)]
pub struct Engine {
    program: Option<Program>,
    options: RunOptions,
    history: Vec<HistoryEntry>,
    run_counter: u32,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: RunOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Parses and validates a program document. On success the previous
    /// program and its history are replaced.
    pub fn load_str(&mut self, text: &str) -> Result<(), LoadError> {
        let program = parse::parse(text)?;
        self.program = Some(program);
        self.history.clear();
        self.run_counter = 0;
        Ok(())
    }

    /// Loads a program from an `.xml` file on disk.
    pub fn load_file(&mut self, path: &Path) -> Result<(), LoadError> {
        let is_xml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("xml"))
            .unwrap_or(false);
        if !is_xml {
            return Err(LoadError::NotXml(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        self.load_str(&text)
    }

    pub fn program(&self) -> Option<&Program> {
        self.program.as_ref()
    }

    pub fn program_name(&self) -> Option<&str> {
        self.program.as_ref().map(|p| p.name.as_str())
    }

    pub fn input_variables(&self) -> &[String] {
        self.program
            .as_ref()
            .map(|p| p.input_vars.as_slice())
            .unwrap_or(&[])
    }

    pub fn functions(&self) -> &[Function] {
        self.program
            .as_ref()
            .map(|p| p.functions.as_slice())
            .unwrap_or(&[])
    }

    pub fn max_expansion_depth(&self) -> usize {
        self.program
            .as_ref()
            .map(expand::max_expansion_depth)
            .unwrap_or(0)
    }

    /// Renders the program at the requested depth (clamped).
    pub fn display(&self, depth: usize) -> Result<String> {
        let program = self.program.as_ref().ok_or(EngineError::NoProgram)?;
        Ok(display::render(&expand::expand_to_depth(program, depth)))
    }

    /// Returns the program rewritten at the requested depth (clamped).
    pub fn expand(&self, depth: usize) -> Result<Program> {
        let program = self.program.as_ref().ok_or(EngineError::NoProgram)?;
        Ok(expand::expand_to_depth(program, depth))
    }

    /// Executes the loaded program and records a history entry.
    pub fn run(&mut self, depth: usize, inputs: &[i64]) -> Result<RunResult> {
        let program = self.program.as_ref().ok_or(EngineError::NoProgram)?;
        let depth = depth.min(expand::max_expansion_depth(program));
        let result = if depth > 0 {
            eval::run(&expand::expand(program), inputs, &self.options)?
        } else {
            eval::run(program, inputs, &self.options)?
        };
        self.run_counter += 1;
        self.history.push(HistoryEntry {
            run_no: self.run_counter,
            depth,
            inputs: inputs.to_vec(),
            y_value: result.y_value,
            cycles: result.cycles,
        });
        Ok(result)
    }

    /// Starts a debug session at the requested depth (clamped).
    pub fn init_debug(&self, depth: usize, inputs: &[i64]) -> Result<DebugSession> {
        let program = self.program.as_ref().ok_or(EngineError::NoProgram)?;
        Ok(DebugSession::new(program, inputs, depth, self.options.clone()))
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }
}
