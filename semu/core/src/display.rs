//! Human-readable program rendering: header lines plus one line per
//! instruction in the form `#n (B|S) [ LBL   ] command (cost)`, with an
//! ancestry suffix `<<< #k` on expanded lines.

use crate::ast::{
    basic_cost, synthetic_cost, InstrKind, Instruction, Program, SyntheticOp, ARG_ASSIGNED,
    ARG_CONSTANT, ARG_FUNCTION_ARGS, ARG_FUNCTION_NAME, ARG_GOTO_LABEL, ARG_JEC_LABEL,
    ARG_JEV_LABEL, ARG_JZ_LABEL, ARG_VARIABLE, EXIT_LABEL,
};

pub fn render(program: &Program) -> String {
    let mut out = String::new();
    out.push_str(&format!("Program: {}\n", program.name));

    out.push_str("Inputs: ");
    if program.input_vars.is_empty() {
        out.push_str("(none)");
    } else {
        out.push_str(&program.input_vars.join(", "));
    }
    out.push('\n');

    out.push_str("Labels: ");
    let labels = label_list(program);
    if labels.is_empty() {
        out.push_str("(none)");
    } else {
        out.push_str(&labels.join(", "));
    }
    out.push('\n');

    for ins in &program.instructions {
        out.push_str(&format_line(ins));
        out.push('\n');
    }
    out.trim_end().to_string()
}

/// Defining labels in order of appearance, then EXIT when referenced.
fn label_list(program: &Program) -> Vec<String> {
    let mut seen = Vec::new();
    let mut keys: Vec<String> = Vec::new();
    for ins in &program.instructions {
        if let Some(label) = ins.label.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let key = label.to_ascii_uppercase();
            if !keys.contains(&key) {
                keys.push(key);
                seen.push(label.to_string());
            }
        }
    }
    if program.instructions.iter().any(references_exit) {
        seen.push(EXIT_LABEL.to_string());
    }
    seen
}

fn references_exit(ins: &Instruction) -> bool {
    let is_exit = |label: &str| label.trim().eq_ignore_ascii_case(EXIT_LABEL);
    match &ins.kind {
        InstrKind::Basic { jump_label, .. } => jump_label.as_deref().is_some_and(is_exit),
        InstrKind::Synthetic { args, .. } => [ARG_GOTO_LABEL, ARG_JZ_LABEL, ARG_JEC_LABEL, ARG_JEV_LABEL]
            .iter()
            .any(|key| args.get(*key).map(String::as_str).is_some_and(is_exit)),
    }
}

pub fn format_line(ins: &Instruction) -> String {
    let kind = if ins.is_basic() { "B" } else { "S" };
    let label: String = ins
        .label
        .as_deref()
        .unwrap_or_default()
        .chars()
        .take(5)
        .collect();
    let base = format!(
        "#{} ({}) [ {:<5} ] {} ({})",
        ins.index,
        kind,
        label,
        command_text(ins),
        display_cost(ins)
    );
    match ins.origin {
        Some(origin) => format!("{base} <<< #{origin}"),
        None => base,
    }
}

/// The per-line static cost shown in listings. Expanded lines display their
/// own basic cost even though the group charge sits on the entry line.
fn display_cost(ins: &Instruction) -> u64 {
    match &ins.kind {
        InstrKind::Basic { op, .. } => basic_cost(*op),
        InstrKind::Synthetic { op, args, .. } => synthetic_cost(*op, args),
    }
}

pub fn command_text(ins: &Instruction) -> String {
    let var = ins.var().name();
    match &ins.kind {
        InstrKind::Basic { op, jump_label, .. } => {
            use crate::ast::BasicOp::*;
            match op {
                Increase => format!("{var} <- {var} + 1"),
                Decrease => format!("{var} <- {var} - 1"),
                Neutral => format!("{var} <- {var}"),
                JumpNotZero => {
                    let label = jump_label.as_deref().unwrap_or(EXIT_LABEL);
                    format!("IF {var} != 0 GOTO {label}")
                }
            }
        }
        InstrKind::Synthetic { op, args, .. } => {
            let arg = |key: &str| args.get(key).map(String::as_str).unwrap_or("");
            match op {
                SyntheticOp::ZeroVariable => format!("{var} <- 0"),
                SyntheticOp::Assignment => {
                    let src = arg(ARG_ASSIGNED).trim();
                    if src.is_empty() {
                        format!("{var} <- 0")
                    } else {
                        format!("{var} <- {src}")
                    }
                }
                SyntheticOp::ConstantAssignment => format!("{var} <- {}", arg(ARG_CONSTANT)),
                SyntheticOp::GotoLabel => format!("GOTO {}", arg(ARG_GOTO_LABEL)),
                SyntheticOp::JumpZero => format!("IF {var} = 0 GOTO {}", arg(ARG_JZ_LABEL)),
                SyntheticOp::JumpEqualConstant => format!(
                    "IF {var} = {} GOTO {}",
                    arg(ARG_CONSTANT),
                    arg(ARG_JEC_LABEL)
                ),
                SyntheticOp::JumpEqualVariable => format!(
                    "IF {var} = {} GOTO {}",
                    arg(ARG_VARIABLE),
                    arg(ARG_JEV_LABEL)
                ),
                SyntheticOp::Quote => format!(
                    "{var} <- {}({})",
                    arg(ARG_FUNCTION_NAME),
                    arg(ARG_FUNCTION_ARGS)
                ),
            }
        }
    }
}
