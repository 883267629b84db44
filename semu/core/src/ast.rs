use serde::Serialize;
use std::collections::HashMap;

/// Argument keys recognised inside `S-Instruction-Arguments`.
pub const ARG_JNZ_LABEL: &str = "JNZLabel";
pub const ARG_GOTO_LABEL: &str = "gotoLabel";
pub const ARG_JZ_LABEL: &str = "JZLabel";
pub const ARG_JEC_LABEL: &str = "JEConstantLabel";
pub const ARG_JEV_LABEL: &str = "JEVariableLabel";
pub const ARG_CONSTANT: &str = "constantValue";
pub const ARG_VARIABLE: &str = "variableName";
pub const ARG_ASSIGNED: &str = "assignedVariable";
pub const ARG_FUNCTION_NAME: &str = "functionName";
pub const ARG_FUNCTION_ARGS: &str = "functionArguments";

/// The distinguished label meaning "past the last instruction".
pub const EXIT_LABEL: &str = "EXIT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VarKind {
    Input,
    Work,
    Output,
}

/// A reference to one of the three variable families: `x{n}`, `z{n}` or `y`.
/// Names are case-insensitive on input; the canonical form is lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VarRef {
    kind: VarKind,
    index: usize,
    name: String,
}

impl VarRef {
    /// Parses a textual variable name. Returns `None` for anything that is
    /// not `y`, `x{n}` or `z{n}` with `n >= 1`.
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim().to_ascii_lowercase();
        if trimmed == "y" {
            return Some(Self {
                kind: VarKind::Output,
                index: 0,
                name: trimmed,
            });
        }
        let kind = match trimmed.bytes().next()? {
            b'x' => VarKind::Input,
            b'z' => VarKind::Work,
            _ => return None,
        };
        let digits = &trimmed[1..];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let index: usize = digits.parse().ok()?;
        if index == 0 {
            return None;
        }
        Some(Self {
            kind,
            index,
            name: trimmed,
        })
    }

    pub fn output() -> Self {
        Self {
            kind: VarKind::Output,
            index: 0,
            name: "y".to_string(),
        }
    }

    pub fn input(index: usize) -> Self {
        debug_assert!(index >= 1);
        Self {
            kind: VarKind::Input,
            index,
            name: format!("x{index}"),
        }
    }

    pub fn work(index: usize) -> Self {
        debug_assert!(index >= 1);
        Self {
            kind: VarKind::Work,
            index,
            name: format!("z{index}"),
        }
    }

    pub fn kind(&self) -> VarKind {
        self.kind
    }

    /// 1-based family index; 0 for the output variable.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Canonical lowercase name, e.g. `x1`, `z3`, `y`.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasicOp {
    Increase,
    Decrease,
    JumpNotZero,
    Neutral,
}

impl BasicOp {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "INCREASE" => Some(Self::Increase),
            "DECREASE" => Some(Self::Decrease),
            "JUMP_NOT_ZERO" => Some(Self::JumpNotZero),
            "NEUTRAL" => Some(Self::Neutral),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticOp {
    ZeroVariable,
    Assignment,
    ConstantAssignment,
    GotoLabel,
    JumpZero,
    JumpEqualConstant,
    JumpEqualVariable,
    Quote,
}

impl SyntheticOp {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ZERO_VARIABLE" => Some(Self::ZeroVariable),
            "ASSIGNMENT" => Some(Self::Assignment),
            "CONSTANT_ASSIGNMENT" => Some(Self::ConstantAssignment),
            "GOTO_LABEL" => Some(Self::GotoLabel),
            "JUMP_ZERO" => Some(Self::JumpZero),
            "JUMP_EQUAL_CONSTANT" => Some(Self::JumpEqualConstant),
            "JUMP_EQUAL_VARIABLE" => Some(Self::JumpEqualVariable),
            "QUOTE" => Some(Self::Quote),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ZeroVariable => "ZERO_VARIABLE",
            Self::Assignment => "ASSIGNMENT",
            Self::ConstantAssignment => "CONSTANT_ASSIGNMENT",
            Self::GotoLabel => "GOTO_LABEL",
            Self::JumpZero => "JUMP_ZERO",
            Self::JumpEqualConstant => "JUMP_EQUAL_CONSTANT",
            Self::JumpEqualVariable => "JUMP_EQUAL_VARIABLE",
            Self::Quote => "QUOTE",
        }
    }
}

/// Static cost of a basic operation.
pub fn basic_cost(op: BasicOp) -> u64 {
    match op {
        BasicOp::JumpNotZero => 2,
        BasicOp::Increase | BasicOp::Decrease | BasicOp::Neutral => 1,
    }
}

/// Static cost of a synthetic operation. Constant-bearing operations fold
/// `max(0, constantValue)` into their cost.
pub fn synthetic_cost(op: SyntheticOp, args: &HashMap<String, String>) -> u64 {
    match op {
        SyntheticOp::ZeroVariable | SyntheticOp::Assignment => 17,
        SyntheticOp::ConstantAssignment => 17 + constant_arg(args) + 1,
        SyntheticOp::GotoLabel => 3,
        SyntheticOp::JumpZero => 6,
        SyntheticOp::JumpEqualConstant => 17 + constant_arg(args) + 2 + 3 + 1,
        SyntheticOp::JumpEqualVariable => 49,
        SyntheticOp::Quote => 1,
    }
}

fn constant_arg(args: &HashMap<String, String>) -> u64 {
    args.get(ARG_CONSTANT)
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .map(|value| value.max(0) as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone)]
pub enum InstrKind {
    Basic {
        op: BasicOp,
        var: VarRef,
        jump_label: Option<String>,
    },
    Synthetic {
        op: SyntheticOp,
        var: VarRef,
        args: HashMap<String, String>,
    },
}

/// One program line. `index` is the 1-based source position; `cost` is the
/// cycle charge consumed when the line is dispatched; `origin` points at the
/// originating synthetic line after expansion.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub label: Option<String>,
    pub index: usize,
    pub cost: u64,
    pub origin: Option<usize>,
    pub kind: InstrKind,
}

impl Instruction {
    pub fn basic(
        label: Option<String>,
        index: usize,
        op: BasicOp,
        var: VarRef,
        jump_label: Option<String>,
    ) -> Self {
        Self {
            label,
            index,
            cost: basic_cost(op),
            origin: None,
            kind: InstrKind::Basic {
                op,
                var,
                jump_label,
            },
        }
    }

    pub fn synthetic(
        label: Option<String>,
        index: usize,
        op: SyntheticOp,
        var: VarRef,
        args: HashMap<String, String>,
    ) -> Self {
        let cost = synthetic_cost(op, &args);
        Self {
            label,
            index,
            cost,
            origin: None,
            kind: InstrKind::Synthetic { op, var, args },
        }
    }

    pub fn is_basic(&self) -> bool {
        matches!(self.kind, InstrKind::Basic { .. })
    }

    pub fn var(&self) -> &VarRef {
        match &self.kind {
            InstrKind::Basic { var, .. } => var,
            InstrKind::Synthetic { var, .. } => var,
        }
    }

    pub fn arg(&self, key: &str) -> Option<&str> {
        match &self.kind {
            InstrKind::Basic { .. } => None,
            InstrKind::Synthetic { args, .. } => args.get(key).map(String::as_str),
        }
    }
}

/// A named sub-program. Functions share the variable naming scheme but
/// execute in isolated frames; the label map and work-variable bound are
/// resolved once at parse time.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub user_string: String,
    pub instructions: Vec<Instruction>,
    pub label_map: HashMap<String, usize>,
    pub max_work_var_index: usize,
}

/// A fully parsed and validated program. Immutable after construction.
#[derive(Debug, Clone)]
pub struct Program {
    pub name: String,
    pub instructions: Vec<Instruction>,
    pub label_map: HashMap<String, usize>,
    pub max_label_index: usize,
    pub max_work_var_index: usize,
    pub input_vars: Vec<String>,
    pub functions: Vec<Function>,
}

impl Program {
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn has_synthetic(&self) -> bool {
        self.instructions.iter().any(|ins| !ins.is_basic())
    }
}

/// Builds the label map for an instruction sequence: the case-folded label
/// maps to the earliest instruction bearing it.
pub fn build_label_map(instructions: &[Instruction]) -> HashMap<String, usize> {
    let mut map = HashMap::new();
    for (idx, ins) in instructions.iter().enumerate() {
        if let Some(label) = &ins.label {
            let key = label.trim().to_ascii_uppercase();
            if !key.is_empty() {
                map.entry(key).or_insert(idx);
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_parsing_accepts_all_families() {
        let x = VarRef::parse("X3").unwrap();
        assert_eq!(x.kind(), VarKind::Input);
        assert_eq!(x.index(), 3);
        assert_eq!(x.name(), "x3");

        let z = VarRef::parse(" z12 ").unwrap();
        assert_eq!(z.kind(), VarKind::Work);
        assert_eq!(z.index(), 12);

        let y = VarRef::parse("Y").unwrap();
        assert_eq!(y.kind(), VarKind::Output);
        assert_eq!(y.name(), "y");
    }

    #[test]
    fn variable_parsing_rejects_malformed_names() {
        for bad in ["", "x", "z0", "w1", "x-1", "x1a", "1x"] {
            assert!(VarRef::parse(bad).is_none(), "accepted {bad:?}");
        }
    }

    #[test]
    fn cost_model_matches_static_table() {
        assert_eq!(basic_cost(BasicOp::Increase), 1);
        assert_eq!(basic_cost(BasicOp::JumpNotZero), 2);

        let no_args = HashMap::new();
        assert_eq!(synthetic_cost(SyntheticOp::ZeroVariable, &no_args), 17);
        assert_eq!(synthetic_cost(SyntheticOp::Assignment, &no_args), 17);
        assert_eq!(synthetic_cost(SyntheticOp::GotoLabel, &no_args), 3);
        assert_eq!(synthetic_cost(SyntheticOp::JumpZero, &no_args), 6);
        assert_eq!(synthetic_cost(SyntheticOp::JumpEqualVariable, &no_args), 49);
        assert_eq!(synthetic_cost(SyntheticOp::Quote, &no_args), 1);

        let mut args = HashMap::new();
        args.insert(ARG_CONSTANT.to_string(), "3".to_string());
        assert_eq!(synthetic_cost(SyntheticOp::ConstantAssignment, &args), 21);
        assert_eq!(synthetic_cost(SyntheticOp::JumpEqualConstant, &args), 26);

        // Negative constants clamp to zero in the cost model.
        args.insert(ARG_CONSTANT.to_string(), "-4".to_string());
        assert_eq!(synthetic_cost(SyntheticOp::ConstantAssignment, &args), 18);
    }

    #[test]
    fn label_map_keeps_first_occurrence() {
        let mk = |label: Option<&str>, index| {
            Instruction::basic(
                label.map(str::to_string),
                index,
                BasicOp::Neutral,
                VarRef::output(),
                None,
            )
        };
        let seq = vec![mk(Some("L1"), 1), mk(Some("l1"), 2), mk(Some("L2"), 3)];
        let map = build_label_map(&seq);
        assert_eq!(map.get("L1"), Some(&0));
        assert_eq!(map.get("L2"), Some(&2));
    }
}
