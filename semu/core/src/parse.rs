//! Reader and validator for the `S-Program` document format. A load either
//! yields a fully validated [`Program`] or a positioned error; no partial
//! program escapes.

use crate::ast::{
    build_label_map, BasicOp, Function, InstrKind, Instruction, Program, SyntheticOp, VarKind,
    VarRef, ARG_ASSIGNED, ARG_CONSTANT, ARG_FUNCTION_ARGS, ARG_FUNCTION_NAME, ARG_GOTO_LABEL,
    ARG_JEC_LABEL, ARG_JEV_LABEL, ARG_JNZ_LABEL, ARG_JZ_LABEL, ARG_VARIABLE, EXIT_LABEL,
};
use crate::funcs::{self, Term};
use crate::{LoadError, ParseError, ValidationError};
use roxmltree::{Document, Node};
use std::collections::{BTreeSet, HashMap, HashSet};

pub fn parse(text: &str) -> Result<Program, LoadError> {
    let doc = Document::parse(text).map_err(|e| ParseError::Document(e.to_string()))?;
    let root = doc.root_element();
    if root.tag_name().name() != "S-Program" {
        return Err(ParseError::Document("root element must be S-Program".to_string()).into());
    }
    let name = root
        .attribute("name")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ParseError::MissingName)?;

    // The main instruction scan is restricted to the direct-child
    // S-Instructions section; S-Function bodies carry their own.
    let main = root
        .children()
        .find(|n| n.is_element() && n.has_tag_name("S-Instructions"))
        .ok_or(ParseError::MissingInstructions)?;
    let instructions = parse_sequence(&main)?;

    let mut functions = Vec::new();
    for (ordinal, node) in root
        .children()
        .filter(|n| n.is_element() && n.has_tag_name("S-Function"))
        .enumerate()
    {
        functions.push(parse_function(&node, ordinal + 1)?);
    }

    let label_map = build_label_map(&instructions);
    let function_names: HashSet<&str> = functions.iter().map(|f| f.name.as_str()).collect();
    validate_sequence(&instructions, &label_map, &function_names)?;
    for function in &functions {
        validate_sequence(&function.instructions, &function.label_map, &function_names).map_err(
            |source| LoadError::InFunction {
                name: function.name.clone(),
                source: Box::new(source.into()),
            },
        )?;
    }

    Ok(Program {
        name: name.to_string(),
        max_label_index: max_label_index(&instructions),
        max_work_var_index: max_work_var_index(&instructions),
        input_vars: input_variables(&instructions),
        instructions,
        label_map,
        functions,
    })
}

fn parse_sequence(parent: &Node) -> Result<Vec<Instruction>, ParseError> {
    parent
        .children()
        .filter(|n| n.is_element() && n.has_tag_name("S-Instruction"))
        .enumerate()
        .map(|(i, node)| parse_instruction(&node, i + 1))
        .collect()
}

fn parse_instruction(elem: &Node, index: usize) -> Result<Instruction, ParseError> {
    let fail = |message: String| ParseError::Instruction { index, message };

    let type_attr = elem
        .attribute("type")
        .ok_or_else(|| fail("missing type attribute".to_string()))?;
    let op_name = elem
        .attribute("name")
        .unwrap_or_default()
        .trim()
        .to_ascii_uppercase();

    let var_nodes: Vec<Node> = elem
        .children()
        .filter(|n| n.is_element() && n.has_tag_name("S-Variable"))
        .collect();
    if var_nodes.len() != 1 {
        return Err(fail("must have exactly one S-Variable".to_string()));
    }
    let var_text = var_nodes[0].text().unwrap_or_default();
    let var = VarRef::parse(var_text)
        .ok_or_else(|| fail(format!("invalid variable name '{}'", var_text.trim())))?;

    let label = elem
        .children()
        .find(|n| n.is_element() && n.has_tag_name("S-Label"))
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let mut args = HashMap::new();
    if let Some(group) = elem
        .children()
        .find(|n| n.is_element() && n.has_tag_name("S-Instruction-Arguments"))
    {
        for entry in group
            .children()
            .filter(|n| n.is_element() && n.has_tag_name("S-Instruction-Argument"))
        {
            let key = entry.attribute("name").unwrap_or_default().trim();
            if !key.is_empty() {
                args.insert(
                    key.to_string(),
                    entry.attribute("value").unwrap_or_default().to_string(),
                );
            }
        }
    }

    match type_attr.trim().to_ascii_lowercase().as_str() {
        "basic" => {
            let op = BasicOp::from_name(&op_name)
                .ok_or_else(|| fail(format!("unknown basic instruction name '{op_name}'")))?;
            let jump_label = args
                .get(ARG_JNZ_LABEL)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
            Ok(Instruction::basic(label, index, op, var, jump_label))
        }
        "synthetic" => {
            let op = SyntheticOp::from_name(&op_name)
                .ok_or_else(|| fail(format!("unknown synthetic instruction name '{op_name}'")))?;
            Ok(Instruction::synthetic(label, index, op, var, args))
        }
        other => Err(fail(format!("unknown instruction type '{other}'"))),
    }
}

fn parse_function(node: &Node, ordinal: usize) -> Result<Function, LoadError> {
    let attr = |name: &'static str| {
        node.attribute(name)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or(ParseError::FunctionAttribute {
                index: ordinal,
                attribute: name,
            })
    };
    let name = attr("name")?;
    let user_string = attr("user-string")?;

    let instructions = match node
        .children()
        .find(|n| n.is_element() && n.has_tag_name("S-Instructions"))
    {
        Some(body) => parse_sequence(&body).map_err(|source| LoadError::InFunction {
            name: name.clone(),
            source: Box::new(source.into()),
        })?,
        None => Vec::new(),
    };

    Ok(Function {
        label_map: build_label_map(&instructions),
        max_work_var_index: max_work_var_index(&instructions),
        name,
        user_string,
        instructions,
    })
}

fn validate_sequence(
    instructions: &[Instruction],
    label_map: &HashMap<String, usize>,
    function_names: &HashSet<&str>,
) -> Result<(), ValidationError> {
    for (i, ins) in instructions.iter().enumerate() {
        let index = i + 1;
        match &ins.kind {
            InstrKind::Basic {
                op: BasicOp::JumpNotZero,
                jump_label,
                ..
            } => {
                let label = jump_label
                    .as_deref()
                    .ok_or(ValidationError::MissingArgument {
                        index,
                        op: "JUMP_NOT_ZERO",
                        argument: ARG_JNZ_LABEL,
                    })?;
                check_label(label_map, label, index)?;
            }
            InstrKind::Basic { .. } => {}
            InstrKind::Synthetic { op, args, .. } => match op {
                SyntheticOp::ZeroVariable => {}
                SyntheticOp::GotoLabel => {
                    let label = required(args, ARG_GOTO_LABEL, "GOTO_LABEL", index)?;
                    check_label(label_map, label, index)?;
                }
                SyntheticOp::JumpZero => {
                    let label = required(args, ARG_JZ_LABEL, "JUMP_ZERO", index)?;
                    check_label(label_map, label, index)?;
                }
                SyntheticOp::JumpEqualConstant => {
                    let label = required(args, ARG_JEC_LABEL, "JUMP_EQUAL_CONSTANT", index)?;
                    check_label(label_map, label, index)?;
                    check_integer(args, index, "JUMP_EQUAL_CONSTANT")?;
                }
                SyntheticOp::JumpEqualVariable => {
                    let label = required(args, ARG_JEV_LABEL, "JUMP_EQUAL_VARIABLE", index)?;
                    check_label(label_map, label, index)?;
                    let name = required(args, ARG_VARIABLE, "JUMP_EQUAL_VARIABLE", index)?;
                    if VarRef::parse(name).is_none() {
                        return Err(ValidationError::InvalidArgument {
                            index,
                            argument: ARG_VARIABLE,
                            value: name.to_string(),
                        });
                    }
                }
                SyntheticOp::ConstantAssignment => {
                    check_integer(args, index, "CONSTANT_ASSIGNMENT")?;
                }
                SyntheticOp::Assignment => {
                    // assignedVariable is optional; empty means "zero source".
                    if let Some(src) = args.get(ARG_ASSIGNED).map(|s| s.trim()) {
                        if !src.is_empty() && VarRef::parse(src).is_none() {
                            return Err(ValidationError::InvalidArgument {
                                index,
                                argument: ARG_ASSIGNED,
                                value: src.to_string(),
                            });
                        }
                    }
                }
                SyntheticOp::Quote => {
                    let name = required(args, ARG_FUNCTION_NAME, "QUOTE", index)?;
                    check_function(name, function_names, index)?;
                    let raw = args.get(ARG_FUNCTION_ARGS).map(String::as_str).unwrap_or("");
                    let terms =
                        funcs::parse_terms(raw).map_err(|_| ValidationError::InvalidArgument {
                            index,
                            argument: ARG_FUNCTION_ARGS,
                            value: raw.to_string(),
                        })?;
                    for called in call_names(&terms) {
                        check_function(called, function_names, index)?;
                    }
                }
            },
        }
    }
    Ok(())
}

fn required<'a>(
    args: &'a HashMap<String, String>,
    key: &'static str,
    op: &'static str,
    index: usize,
) -> Result<&'a str, ValidationError> {
    args.get(key)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or(ValidationError::MissingArgument {
            index,
            op,
            argument: key,
        })
}

fn check_label(
    label_map: &HashMap<String, usize>,
    label: &str,
    index: usize,
) -> Result<(), ValidationError> {
    let key = label.trim().to_ascii_uppercase();
    if key != EXIT_LABEL && !label_map.contains_key(&key) {
        return Err(ValidationError::UndefinedLabel {
            index,
            label: label.trim().to_string(),
        });
    }
    Ok(())
}

fn check_function(
    name: &str,
    function_names: &HashSet<&str>,
    index: usize,
) -> Result<(), ValidationError> {
    if function_names.contains(name) || funcs::is_builtin(name) {
        Ok(())
    } else {
        Err(ValidationError::UndefinedFunction {
            index,
            name: name.to_string(),
        })
    }
}

fn check_integer(
    args: &HashMap<String, String>,
    index: usize,
    op: &'static str,
) -> Result<(), ValidationError> {
    let raw = required(args, ARG_CONSTANT, op, index)?;
    if raw.parse::<i64>().is_err() {
        return Err(ValidationError::InvalidArgument {
            index,
            argument: ARG_CONSTANT,
            value: raw.to_string(),
        });
    }
    Ok(())
}

fn call_names(terms: &[Term]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut stack: Vec<&Term> = terms.iter().collect();
    while let Some(term) = stack.pop() {
        if let Term::Call { name, args } = term {
            out.push(name.as_str());
            stack.extend(args.iter());
        }
    }
    out
}

/// Every variable mentioned by a sequence: instruction targets, variable
/// arguments and argument expression trees.
fn referenced_vars(instructions: &[Instruction]) -> Vec<VarRef> {
    let mut out = Vec::new();
    for ins in instructions {
        out.push(ins.var().clone());
        for key in [ARG_ASSIGNED, ARG_VARIABLE] {
            if let Some(var) = ins.arg(key).and_then(VarRef::parse) {
                out.push(var);
            }
        }
        if let Some(raw) = ins.arg(ARG_FUNCTION_ARGS) {
            if let Ok(terms) = funcs::parse_terms(raw) {
                collect_term_vars(&terms, &mut out);
            }
        }
    }
    out
}

fn collect_term_vars(terms: &[Term], out: &mut Vec<VarRef>) {
    for term in terms {
        match term {
            Term::Var(var) => out.push(var.clone()),
            Term::Call { args, .. } => collect_term_vars(args, out),
        }
    }
}

/// Highest `L{n}` among defining labels; fresh labels for expansion are
/// allocated above this.
fn max_label_index(instructions: &[Instruction]) -> usize {
    instructions
        .iter()
        .filter_map(|ins| ins.label.as_deref())
        .filter_map(label_number)
        .max()
        .unwrap_or(0)
}

fn label_number(label: &str) -> Option<usize> {
    let upper = label.trim().to_ascii_uppercase();
    let digits = upper.strip_prefix('L')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn max_work_var_index(instructions: &[Instruction]) -> usize {
    referenced_vars(instructions)
        .iter()
        .filter(|v| v.kind() == VarKind::Work)
        .map(VarRef::index)
        .max()
        .unwrap_or(0)
}

/// Sorted-by-index names of every input variable referenced transitively.
fn input_variables(instructions: &[Instruction]) -> Vec<String> {
    let indices: BTreeSet<usize> = referenced_vars(instructions)
        .iter()
        .filter(|v| v.kind() == VarKind::Input)
        .map(VarRef::index)
        .collect();
    indices.into_iter().map(|n| format!("x{n}")).collect()
}
