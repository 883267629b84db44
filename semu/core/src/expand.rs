//! One-level macro expansion: rewrites every synthetic instruction into an
//! observably equivalent primitive sequence. Fresh labels and work
//! variables are drawn above the program's recorded maxima; every emitted
//! line records the 1-based index of the line it came from.
//!
//! Cycle accounting across levels: the entry line of each expansion group
//! carries the originating synthetic's full static cost and the remaining
//! lines charge zero, so a run of the expanded program consumes exactly the
//! cycles of the depth-0 run. Rendering still shows the per-line basic
//! costs.
//!
//! The recipes assume saturating DECREASE (a drained variable stays at
//! zero); see RunOptions.

use crate::ast::{
    build_label_map, BasicOp, InstrKind, Instruction, Program, SyntheticOp, VarRef, ARG_ASSIGNED,
    ARG_CONSTANT, ARG_GOTO_LABEL, ARG_JEC_LABEL, ARG_JEV_LABEL, ARG_JZ_LABEL, ARG_VARIABLE,
    EXIT_LABEL,
};
use std::collections::HashMap;

/// 1 when the program still contains synthetic instructions, else 0. Only
/// depths 0 and 1 are defined.
pub fn max_expansion_depth(program: &Program) -> usize {
    if program.has_synthetic() {
        1
    } else {
        0
    }
}

/// Expands to the requested depth, clamped to what the program supports.
pub fn expand_to_depth(program: &Program, depth: usize) -> Program {
    if depth == 0 || !program.has_synthetic() {
        program.clone()
    } else {
        expand(program)
    }
}

/// Produces the depth-1 form. QUOTE lines pass through unchanged (function
/// composition has no primitive expansion), which also makes the transform
/// idempotent.
pub fn expand(program: &Program) -> Program {
    let mut lines: Vec<Instruction> = Vec::new();
    let mut next_label = program.max_label_index + 1;
    let mut next_work = program.max_work_var_index + 1;
    for ins in &program.instructions {
        match &ins.kind {
            InstrKind::Basic { .. } => lines.push(ins.clone()),
            InstrKind::Synthetic { op, var, args } => {
                let expansion = expand_synthetic(ins, *op, var, args, next_label, next_work);
                next_label += expansion.labels_used;
                next_work += expansion.work_vars_used;
                lines.extend(expansion.lines);
            }
        }
    }
    for (i, ins) in lines.iter_mut().enumerate() {
        ins.index = i + 1;
    }
    Program {
        name: program.name.clone(),
        label_map: build_label_map(&lines),
        max_label_index: next_label - 1,
        max_work_var_index: next_work - 1,
        input_vars: program.input_vars.clone(),
        functions: program.functions.clone(),
        instructions: lines,
    }
}

/// Lines emitted for one synthetic instruction plus the exact number of
/// fresh labels and work variables they consumed.
pub struct Expansion {
    pub lines: Vec<Instruction>,
    pub labels_used: usize,
    pub work_vars_used: usize,
}

fn expand_synthetic(
    ins: &Instruction,
    op: SyntheticOp,
    var: &VarRef,
    args: &HashMap<String, String>,
    base_label: usize,
    base_work: usize,
) -> Expansion {
    let mut e = Emitter::new(ins, base_label, base_work);
    match op {
        SyntheticOp::Quote => {
            return Expansion {
                lines: vec![ins.clone()],
                labels_used: 0,
                work_vars_used: 0,
            };
        }
        SyntheticOp::ZeroVariable => {
            emit_drain(&mut e, var);
        }
        SyntheticOp::ConstantAssignment => {
            let k = constant_arg(args);
            emit_drain(&mut e, var);
            for _ in 0..k {
                e.push(None, BasicOp::Increase, var.clone(), None);
            }
            e.push(None, BasicOp::Neutral, var.clone(), None);
        }
        SyntheticOp::Assignment => {
            let source = args
                .get(ARG_ASSIGNED)
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .and_then(VarRef::parse);
            match source {
                Some(src) if src.name() != var.name() => emit_copy(&mut e, var, &src),
                Some(_) => {
                    // v <- v has no effect.
                    let label = e.entry_label();
                    e.push(label, BasicOp::Neutral, var.clone(), None);
                }
                None => emit_drain(&mut e, var),
            }
        }
        SyntheticOp::GotoLabel => {
            let target = label_arg(args, ARG_GOTO_LABEL);
            emit_goto(&mut e, &target, var);
        }
        SyntheticOp::JumpZero => {
            let target = label_arg(args, ARG_JZ_LABEL);
            let skip = e.fresh_label();
            let label = e.entry_label();
            e.push(label, BasicOp::JumpNotZero, var.clone(), Some(skip.clone()));
            let g = e.fresh_work();
            e.push(None, BasicOp::Increase, g.clone(), None);
            e.push(None, BasicOp::JumpNotZero, g, Some(target));
            e.push(Some(skip), BasicOp::Neutral, var.clone(), None);
        }
        SyntheticOp::JumpEqualConstant => {
            let target = label_arg(args, ARG_JEC_LABEL);
            let k = constant_arg(args);
            if k < 0 {
                // No non-negative variable ever equals a negative constant.
                let label = e.entry_label();
                e.push(label, BasicOp::Neutral, var.clone(), None);
            } else {
                let t1 = e.fresh_work();
                emit_copy(&mut e, &t1, var);
                let t2 = e.fresh_work();
                // t2 may hold a leftover from an earlier pass through this line.
                emit_drain(&mut e, &t2);
                for _ in 0..k {
                    e.push(None, BasicOp::Increase, t2.clone(), None);
                }
                emit_compare(&mut e, &t1, &t2, &target, var);
            }
        }
        SyntheticOp::JumpEqualVariable => {
            let target = label_arg(args, ARG_JEV_LABEL);
            let other = args
                .get(ARG_VARIABLE)
                .map(|s| s.trim())
                .and_then(VarRef::parse)
                .unwrap_or_else(|| var.clone());
            let t1 = e.fresh_work();
            emit_copy(&mut e, &t1, var);
            let t2 = e.fresh_work();
            emit_copy(&mut e, &t2, &other);
            emit_compare(&mut e, &t1, &t2, &target, var);
        }
    }
    e.finish()
}

fn constant_arg(args: &HashMap<String, String>) -> i64 {
    args.get(ARG_CONSTANT)
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .unwrap_or(0)
}

fn label_arg(args: &HashMap<String, String>, key: &str) -> String {
    args.get(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| EXIT_LABEL.to_string())
}

struct Emitter {
    origin: usize,
    original_label: Option<String>,
    charge: u64,
    charged: bool,
    base_label: usize,
    labels_used: usize,
    base_work: usize,
    work_vars_used: usize,
    lines: Vec<Instruction>,
}

impl Emitter {
    fn new(ins: &Instruction, base_label: usize, base_work: usize) -> Self {
        Self {
            origin: ins.index,
            original_label: ins.label.clone(),
            charge: ins.cost,
            charged: false,
            base_label,
            labels_used: 0,
            base_work,
            work_vars_used: 0,
            lines: Vec::new(),
        }
    }

    fn fresh_label(&mut self) -> String {
        let label = format!("L{}", self.base_label + self.labels_used);
        self.labels_used += 1;
        label
    }

    fn fresh_work(&mut self) -> VarRef {
        let var = VarRef::work(self.base_work + self.work_vars_used);
        self.work_vars_used += 1;
        var
    }

    /// The synthetic's defining label belongs on the group's first line.
    fn entry_label(&mut self) -> Option<String> {
        self.original_label.take()
    }

    /// The group's first line charges the synthetic's full static cost;
    /// later lines charge nothing.
    fn push(
        &mut self,
        label: Option<String>,
        op: BasicOp,
        var: VarRef,
        jump_label: Option<String>,
    ) {
        let cost = if self.charged {
            0
        } else {
            self.charged = true;
            self.charge
        };
        self.lines.push(Instruction {
            label,
            index: 0,
            cost,
            origin: Some(self.origin),
            kind: InstrKind::Basic {
                op,
                var,
                jump_label,
            },
        });
    }

    fn finish(self) -> Expansion {
        Expansion {
            lines: self.lines,
            labels_used: self.labels_used,
            work_vars_used: self.work_vars_used,
        }
    }
}

/// v <- 0 by counting v down. Correct for v = 0 because a saturated
/// DECREASE leaves zero in place.
fn emit_drain(e: &mut Emitter, var: &VarRef) {
    let again = e.fresh_label();
    let label = e.entry_label();
    e.push(label, BasicOp::JumpNotZero, var.clone(), Some(again.clone()));
    e.push(Some(again.clone()), BasicOp::Decrease, var.clone(), None);
    e.push(None, BasicOp::JumpNotZero, var.clone(), Some(again));
}

/// dest <- src, preserving src. Drains dest, skips the transfer loop
/// entirely when src is zero, then moves src out through dest and a tally
/// variable and restores src from the tally.
fn emit_copy(e: &mut Emitter, dest: &VarRef, src: &VarRef) {
    emit_drain(e, dest);
    let body = e.fresh_label();
    let done = e.fresh_label();
    let t = e.fresh_work();
    let g = e.fresh_work();
    e.push(None, BasicOp::JumpNotZero, src.clone(), Some(body.clone()));
    e.push(None, BasicOp::Increase, g.clone(), None);
    e.push(None, BasicOp::JumpNotZero, g, Some(done.clone()));
    e.push(Some(body.clone()), BasicOp::Decrease, src.clone(), None);
    e.push(None, BasicOp::Increase, dest.clone(), None);
    e.push(None, BasicOp::Increase, t.clone(), None);
    e.push(None, BasicOp::JumpNotZero, src.clone(), Some(body));
    let restore = e.fresh_label();
    e.push(Some(restore.clone()), BasicOp::Decrease, t.clone(), None);
    e.push(None, BasicOp::Increase, src.clone(), None);
    e.push(None, BasicOp::JumpNotZero, t, Some(restore));
    e.push(Some(done), BasicOp::Neutral, dest.clone(), None);
}

/// Unconditional jump: a fresh work variable is made nonzero and tested.
/// The trailing neutral is the fallthrough target the sequence never takes.
fn emit_goto(e: &mut Emitter, target: &str, var: &VarRef) {
    let g = e.fresh_work();
    let label = e.entry_label();
    e.push(label, BasicOp::Increase, g.clone(), None);
    e.push(None, BasicOp::JumpNotZero, g, Some(target.to_string()));
    e.push(None, BasicOp::Neutral, var.clone(), None);
}

/// Jumps to `target` when the scratch copies t1 and t2 hold equal values.
/// Both copies are consumed. The loop decrements the pair in lockstep; the
/// first to reach zero decides.
fn emit_compare(e: &mut Emitter, t1: &VarRef, t2: &VarRef, target: &str, var: &VarRef) {
    let check = e.fresh_label();
    let nonzero = e.fresh_label();
    let decrement = e.fresh_label();
    let done = e.fresh_label();
    let g_eq = e.fresh_work();
    let g_ne = e.fresh_work();
    let g_loop = e.fresh_work();
    e.push(
        Some(check.clone()),
        BasicOp::JumpNotZero,
        t1.clone(),
        Some(nonzero.clone()),
    );
    e.push(None, BasicOp::JumpNotZero, t2.clone(), Some(done.clone()));
    e.push(None, BasicOp::Increase, g_eq.clone(), None);
    e.push(None, BasicOp::JumpNotZero, g_eq, Some(target.to_string()));
    e.push(
        Some(nonzero),
        BasicOp::JumpNotZero,
        t2.clone(),
        Some(decrement.clone()),
    );
    e.push(None, BasicOp::Increase, g_ne.clone(), None);
    e.push(None, BasicOp::JumpNotZero, g_ne, Some(done.clone()));
    e.push(Some(decrement), BasicOp::Decrease, t1.clone(), None);
    e.push(None, BasicOp::Decrease, t2.clone(), None);
    e.push(None, BasicOp::Increase, g_loop.clone(), None);
    e.push(None, BasicOp::JumpNotZero, g_loop, Some(check));
    e.push(Some(done), BasicOp::Neutral, var.clone(), None);
}
