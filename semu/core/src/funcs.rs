//! Function composition: the argument expression grammar, the built-in
//! function table and dispatch into user-defined sub-programs.

use crate::ast::{Function, Program, VarRef};
use crate::eval::{step, ExecScope, Frame, RunOptions};
use crate::RunError;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Ceiling on user-function recursion through QUOTE and nested call terms.
pub const MAX_CALL_DEPTH: usize = 64;

/// One term of a function argument expression: a variable leaf or a nested
/// call `(Name, arg1, arg2, ...)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Var(VarRef),
    Call { name: String, args: Vec<Term> },
}

/// Parses a comma-separated term sequence. Splitting happens only at paren
/// depth zero; the empty string denotes "no arguments".
pub fn parse_terms(text: &str) -> Result<Vec<Term>, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    split_top_level(trimmed)?
        .into_iter()
        .map(parse_term)
        .collect()
}

fn split_top_level(text: &str) -> Result<Vec<&str>, String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| format!("unbalanced ')' in '{text}'"))?;
            }
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(format!("unbalanced '(' in '{text}'"));
    }
    parts.push(&text[start..]);
    Ok(parts)
}

fn parse_term(text: &str) -> Result<Term, String> {
    let t = text.trim();
    if let Some(stripped) = t.strip_prefix('(') {
        let inner = stripped
            .strip_suffix(')')
            .ok_or_else(|| format!("unterminated call '{t}'"))?;
        let parts = split_top_level(inner)?;
        let (head, rest) = parts
            .split_first()
            .ok_or_else(|| format!("empty call '{t}'"))?;
        let name = head.trim();
        if name.is_empty() {
            return Err(format!("missing function name in '{t}'"));
        }
        let args = rest
            .iter()
            .map(|part| parse_term(part))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Term::Call {
            name: name.to_string(),
            args,
        })
    } else {
        VarRef::parse(t)
            .map(Term::Var)
            .ok_or_else(|| format!("invalid variable '{t}'"))
    }
}

type Builtin = fn(&[i64]) -> i64;

/// Built-in functions. Predicates return 0 or 1. Names are exact-case;
/// user-defined functions of the same name shadow these.
static BUILTINS: Lazy<HashMap<&'static str, Builtin>> = Lazy::new(|| {
    let mut table: HashMap<&'static str, Builtin> = HashMap::new();
    table.insert("CONST0", |_| 0);
    table.insert("Minus", |args| match args {
        [a, b, ..] => a - b,
        _ => 0,
    });
    table.insert("Smaller_Than", |args| match args {
        [a, b, ..] => (a < b) as i64,
        _ => 0,
    });
    table.insert("Smaller_Equal_Than", |args| match args {
        [a, b, ..] => (a <= b) as i64,
        _ => 0,
    });
    table.insert("EQUAL", |args| match args {
        [a, b, ..] => (a == b) as i64,
        _ => 0,
    });
    table.insert("NOT", |args| {
        (args.first().copied().unwrap_or(0) == 0) as i64
    });
    table.insert("AND", |args| {
        (!args.is_empty() && args.iter().all(|v| *v != 0)) as i64
    });
    table
});

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains_key(name)
}

/// Evaluates the raw argument string in the caller's frame and applies the
/// named function. Backs the QUOTE instruction.
pub(crate) fn dispatch(
    program: &Program,
    frame: &Frame,
    name: &str,
    raw_args: &str,
    options: &RunOptions,
    call_depth: usize,
) -> Result<i64, RunError> {
    let terms = parse_terms(raw_args).map_err(RunError::MalformedArguments)?;
    let values = eval_terms(&terms, program, frame, options, call_depth)?;
    invoke(program, name, &values, options, call_depth)
}

fn eval_terms(
    terms: &[Term],
    program: &Program,
    frame: &Frame,
    options: &RunOptions,
    call_depth: usize,
) -> Result<Vec<i64>, RunError> {
    terms
        .iter()
        .map(|term| eval_term(term, program, frame, options, call_depth))
        .collect()
}

fn eval_term(
    term: &Term,
    program: &Program,
    frame: &Frame,
    options: &RunOptions,
    call_depth: usize,
) -> Result<i64, RunError> {
    match term {
        Term::Var(var) => Ok(frame.get(var.name())),
        Term::Call { name, args } => {
            let values = eval_terms(args, program, frame, options, call_depth)?;
            invoke(program, name, &values, options, call_depth)
        }
    }
}

fn invoke(
    program: &Program,
    name: &str,
    values: &[i64],
    options: &RunOptions,
    call_depth: usize,
) -> Result<i64, RunError> {
    if call_depth >= MAX_CALL_DEPTH {
        return Err(RunError::CallDepthExceeded(MAX_CALL_DEPTH));
    }
    if let Some(function) = program.function(name) {
        return call_function(program, function, values, options, call_depth + 1);
    }
    if let Some(builtin) = BUILTINS.get(name) {
        return Ok(builtin(values));
    }
    Err(RunError::UnknownFunction(name.to_string()))
}

/// Runs a user-defined function on a fresh frame and returns its `y`.
/// Callee cycles stay in the callee; the caller only pays the QUOTE cost.
fn call_function(
    program: &Program,
    function: &Function,
    values: &[i64],
    options: &RunOptions,
    call_depth: usize,
) -> Result<i64, RunError> {
    let mut frame = Frame::for_function(function, values);
    let scope = ExecScope {
        program,
        instructions: &function.instructions,
        label_map: &function.label_map,
    };
    while frame.pc < scope.instructions.len() {
        step(&scope, &mut frame, options, call_depth)?;
        if frame.cycles > options.max_cycles {
            return Err(RunError::CycleLimitExceeded {
                limit: options.max_cycles,
                cycles: frame.cycles,
                pc: frame.pc,
                variables: frame.snapshot(),
            });
        }
    }
    Ok(frame.get("y"))
}
