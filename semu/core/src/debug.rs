//! Reversible single-stepping over a live interpreter suspension. The
//! session owns the program at its chosen depth, the current frame and a
//! stack of frame snapshots; stepping back pops and restores.

use crate::ast::Program;
use crate::display::command_text;
use crate::eval::{step, ExecScope, Frame, RunOptions};
use crate::expand::{expand_to_depth, max_expansion_depth};
use crate::RunError;
use std::collections::BTreeMap;

/// Interactive sessions finish once this many cycles accumulate; manual
/// stepping through a runaway loop is not useful past that point.
pub const DEBUG_CYCLE_LIMIT: u64 = 1_000;

#[derive(Debug, Clone)]
struct Snapshot {
    frame: Frame,
    finished: bool,
    result: Option<i64>,
    last_instruction: String,
}

#[derive(Debug)]
pub struct DebugSession {
    program: Program,
    options: RunOptions,
    frame: Frame,
    history: Vec<Snapshot>,
    finished: bool,
    result: Option<i64>,
    last_instruction: String,
}

impl DebugSession {
    /// Builds the initial frame at the requested depth (clamped) and seeds
    /// the history with it.
    pub fn new(program: &Program, inputs: &[i64], depth: usize, options: RunOptions) -> Self {
        let depth = depth.min(max_expansion_depth(program));
        let program = expand_to_depth(program, depth);
        let frame = Frame::for_program(&program, inputs);
        let mut session = Self {
            program,
            options,
            frame,
            history: Vec::new(),
            finished: false,
            result: None,
            last_instruction: String::new(),
        };
        session.save();
        session
    }

    fn save(&mut self) {
        self.history.push(Snapshot {
            frame: self.frame.clone(),
            finished: self.finished,
            result: self.result,
            last_instruction: self.last_instruction.clone(),
        });
    }

    /// Executes exactly one instruction. A finished session is left alone.
    /// QUOTE calls run atomically within the step.
    pub fn step_forward(&mut self) -> Result<(), RunError> {
        if self.finished {
            return Ok(());
        }
        if self.frame.pc >= self.program.instructions.len() {
            self.finish();
            return Ok(());
        }
        if self.frame.cycles > DEBUG_CYCLE_LIMIT {
            self.finish();
            return Ok(());
        }
        self.save();
        let text = command_text(&self.program.instructions[self.frame.pc]);
        let scope = ExecScope::for_program(&self.program);
        step(&scope, &mut self.frame, &self.options, 0)?;
        self.last_instruction = text;
        if self.frame.pc >= self.program.instructions.len() {
            self.finish();
        }
        Ok(())
    }

    fn finish(&mut self) {
        self.finished = true;
        self.result = Some(self.frame.get("y"));
    }

    /// Restores the previous snapshot. Returns whether a step back
    /// happened; the initial state is never popped.
    pub fn step_backward(&mut self) -> bool {
        if self.history.len() <= 1 {
            return false;
        }
        // The stack top is the state captured before the most recent step.
        let snapshot = self.history.pop().expect("history is non-empty");
        self.frame = snapshot.frame;
        self.finished = snapshot.finished;
        self.result = snapshot.result;
        self.last_instruction = snapshot.last_instruction;
        true
    }

    pub fn can_step_backward(&self) -> bool {
        self.history.len() > 1
    }

    pub fn variables(&self) -> BTreeMap<String, i64> {
        self.frame.snapshot()
    }

    pub fn pc(&self) -> usize {
        self.frame.pc
    }

    pub fn cycles(&self) -> u64 {
        self.frame.cycles
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    pub fn result(&self) -> Option<i64> {
        self.result
    }

    pub fn last_instruction(&self) -> &str {
        &self.last_instruction
    }

    pub fn current_instruction(&self) -> Option<String> {
        self.program
            .instructions
            .get(self.frame.pc)
            .map(command_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    fn session(body: &str, inputs: &[i64]) -> DebugSession {
        let text = format!(
            r#"<S-Program name="D"><S-Instructions>{body}</S-Instructions></S-Program>"#
        );
        let program = parse(&text).unwrap();
        DebugSession::new(&program, inputs, 0, RunOptions::default())
    }

    const INC_TWICE: &str = r#"
        <S-Instruction type="basic" name="INCREASE"><S-Variable>y</S-Variable></S-Instruction>
        <S-Instruction type="basic" name="INCREASE"><S-Variable>y</S-Variable></S-Instruction>"#;

    #[test]
    fn forward_steps_execute_one_instruction_each() {
        let mut s = session(INC_TWICE, &[]);
        assert_eq!(s.pc(), 0);
        s.step_forward().unwrap();
        assert_eq!(s.pc(), 1);
        assert_eq!(s.cycles(), 1);
        assert_eq!(s.variables().get("y"), Some(&1));
        assert_eq!(s.last_instruction(), "y <- y + 1");
        assert!(!s.finished());
        s.step_forward().unwrap();
        assert!(s.finished());
        assert_eq!(s.result(), Some(2));
    }

    #[test]
    fn backward_step_restores_the_exact_frame() {
        let mut s = session(INC_TWICE, &[]);
        s.step_forward().unwrap();
        let vars = s.variables();
        let pc = s.pc();
        let cycles = s.cycles();
        s.step_forward().unwrap();
        assert!(s.step_backward());
        assert_eq!(s.variables(), vars);
        assert_eq!(s.pc(), pc);
        assert_eq!(s.cycles(), cycles);
        assert!(!s.finished());
    }

    #[test]
    fn backward_past_the_root_returns_false() {
        let mut s = session(INC_TWICE, &[]);
        assert!(!s.step_backward());
        s.step_forward().unwrap();
        assert!(s.step_backward());
        assert!(!s.can_step_backward());
        assert!(!s.step_backward());
        assert_eq!(s.pc(), 0);
        assert_eq!(s.cycles(), 0);
    }

    #[test]
    fn stepping_a_finished_session_is_a_no_op() {
        let mut s = session(INC_TWICE, &[]);
        s.step_forward().unwrap();
        s.step_forward().unwrap();
        assert!(s.finished());
        let cycles = s.cycles();
        s.step_forward().unwrap();
        assert_eq!(s.cycles(), cycles);
    }

    #[test]
    fn runaway_loops_trip_the_interactive_guard() {
        let body = r#"
            <S-Instruction type="basic" name="INCREASE">
              <S-Variable>y</S-Variable>
              <S-Label>L1</S-Label>
            </S-Instruction>
            <S-Instruction type="basic" name="JUMP_NOT_ZERO">
              <S-Variable>y</S-Variable>
              <S-Instruction-Arguments>
                <S-Instruction-Argument name="JNZLabel" value="L1"/>
              </S-Instruction-Arguments>
            </S-Instruction>"#;
        let mut s = session(body, &[]);
        for _ in 0..2_000 {
            s.step_forward().unwrap();
            if s.finished() {
                break;
            }
        }
        assert!(s.finished());
        assert!(s.cycles() > DEBUG_CYCLE_LIMIT);
    }

    #[test]
    fn quote_executes_atomically_in_one_step() {
        let text = r#"
            <S-Program name="D">
              <S-Instructions>
                <S-Instruction type="synthetic" name="QUOTE">
                  <S-Variable>y</S-Variable>
                  <S-Instruction-Arguments>
                    <S-Instruction-Argument name="functionName" value="S"/>
                    <S-Instruction-Argument name="functionArguments" value="x1"/>
                  </S-Instruction-Arguments>
                </S-Instruction>
              </S-Instructions>
              <S-Function name="S" user-string="S">
                <S-Instructions>
                  <S-Instruction type="synthetic" name="ASSIGNMENT">
                    <S-Variable>y</S-Variable>
                    <S-Instruction-Arguments>
                      <S-Instruction-Argument name="assignedVariable" value="x1"/>
                    </S-Instruction-Arguments>
                  </S-Instruction>
                  <S-Instruction type="basic" name="INCREASE"><S-Variable>y</S-Variable></S-Instruction>
                </S-Instructions>
              </S-Function>
            </S-Program>"#;
        let program = parse(text).unwrap();
        let mut s = DebugSession::new(&program, &[6], 0, RunOptions::default());
        s.step_forward().unwrap();
        assert!(s.finished());
        assert_eq!(s.result(), Some(7));
        assert_eq!(s.cycles(), 1);
    }
}
