//! Observable equivalence of depth-1 expansion: for every input vector the
//! expanded program must produce the same y and consume the same cycles as
//! the source program.

use proptest::prelude::*;
use semu_core::{expand, parse, run, Program, RunOptions};

/// Straight-line program touching every non-QUOTE synthetic op.
const BRANCHY: &str = r#"
    <S-Program name="Branchy">
      <S-Instructions>
        <S-Instruction type="synthetic" name="ASSIGNMENT">
          <S-Variable>y</S-Variable>
          <S-Instruction-Arguments>
            <S-Instruction-Argument name="assignedVariable" value="x1"/>
          </S-Instruction-Arguments>
        </S-Instruction>
        <S-Instruction type="synthetic" name="JUMP_EQUAL_VARIABLE">
          <S-Variable>y</S-Variable>
          <S-Instruction-Arguments>
            <S-Instruction-Argument name="JEVariableLabel" value="L1"/>
            <S-Instruction-Argument name="variableName" value="x2"/>
          </S-Instruction-Arguments>
        </S-Instruction>
        <S-Instruction type="basic" name="INCREASE"><S-Variable>y</S-Variable></S-Instruction>
        <S-Instruction type="synthetic" name="GOTO_LABEL">
          <S-Variable>y</S-Variable>
          <S-Instruction-Arguments>
            <S-Instruction-Argument name="gotoLabel" value="EXIT"/>
          </S-Instruction-Arguments>
        </S-Instruction>
        <S-Instruction type="synthetic" name="CONSTANT_ASSIGNMENT">
          <S-Variable>y</S-Variable>
          <S-Label>L1</S-Label>
          <S-Instruction-Arguments>
            <S-Instruction-Argument name="constantValue" value="5"/>
          </S-Instruction-Arguments>
        </S-Instruction>
        <S-Instruction type="synthetic" name="JUMP_EQUAL_CONSTANT">
          <S-Variable>x2</S-Variable>
          <S-Instruction-Arguments>
            <S-Instruction-Argument name="JEConstantLabel" value="L2"/>
            <S-Instruction-Argument name="constantValue" value="3"/>
          </S-Instruction-Arguments>
        </S-Instruction>
        <S-Instruction type="basic" name="INCREASE"><S-Variable>y</S-Variable></S-Instruction>
        <S-Instruction type="synthetic" name="JUMP_ZERO">
          <S-Variable>x1</S-Variable>
          <S-Label>L2</S-Label>
          <S-Instruction-Arguments>
            <S-Instruction-Argument name="JZLabel" value="EXIT"/>
          </S-Instruction-Arguments>
        </S-Instruction>
        <S-Instruction type="synthetic" name="ZERO_VARIABLE">
          <S-Variable>z1</S-Variable>
        </S-Instruction>
        <S-Instruction type="basic" name="INCREASE"><S-Variable>y</S-Variable></S-Instruction>
      </S-Instructions>
    </S-Program>"#;

/// Loop that drains x1 into y through synthetic jumps; re-enters an
/// expansion group through its original label on every iteration.
const COUNTDOWN: &str = r#"
    <S-Program name="Countdown">
      <S-Instructions>
        <S-Instruction type="synthetic" name="JUMP_ZERO">
          <S-Variable>x1</S-Variable>
          <S-Label>L1</S-Label>
          <S-Instruction-Arguments>
            <S-Instruction-Argument name="JZLabel" value="EXIT"/>
          </S-Instruction-Arguments>
        </S-Instruction>
        <S-Instruction type="basic" name="DECREASE"><S-Variable>x1</S-Variable></S-Instruction>
        <S-Instruction type="basic" name="INCREASE"><S-Variable>y</S-Variable></S-Instruction>
        <S-Instruction type="synthetic" name="GOTO_LABEL">
          <S-Variable>y</S-Variable>
          <S-Instruction-Arguments>
            <S-Instruction-Argument name="gotoLabel" value="L1"/>
          </S-Instruction-Arguments>
        </S-Instruction>
      </S-Instructions>
    </S-Program>"#;

fn assert_equivalent(program: &Program, inputs: &[i64]) {
    let options = RunOptions::default();
    let base = run(program, inputs, &options).unwrap();
    let expanded = expand(program);
    let alt = run(&expanded, inputs, &options).unwrap();
    assert_eq!(base.y_value, alt.y_value, "y for inputs {inputs:?}");
    assert_eq!(base.cycles, alt.cycles, "cycles for inputs {inputs:?}");
    for name in &program.input_vars {
        assert_eq!(
            base.variables.get(name),
            alt.variables.get(name),
            "{name} for inputs {inputs:?}"
        );
    }
}

#[test]
fn branchy_program_is_equivalent_on_edge_inputs() {
    let program = parse(BRANCHY).unwrap();
    for inputs in [
        [0, 0],
        [0, 3],
        [1, 1],
        [3, 3],
        [2, 3],
        [7, 0],
        [7, 3],
        [4, 9],
    ] {
        assert_equivalent(&program, &inputs);
    }
}

#[test]
fn countdown_loop_is_equivalent() {
    let program = parse(COUNTDOWN).unwrap();
    for n in 0..12 {
        assert_equivalent(&program, &[n]);
    }
    // Per iteration: JUMP_ZERO (6) + DECREASE (1) + INCREASE (1) +
    // GOTO_LABEL (3), then the final JUMP_ZERO.
    let result = run(&program, &[4], &RunOptions::default()).unwrap();
    assert_eq!(result.cycles, 4 * 11 + 6);
    assert_eq!(result.y_value, 4);
}

#[test]
fn countdown_cycles_match_at_depth_one_exactly() {
    let program = parse(COUNTDOWN).unwrap();
    let expanded = expand(&program);
    let result = run(&expanded, &[4], &RunOptions::default()).unwrap();
    assert_eq!(result.cycles, 4 * 11 + 6);
    assert_eq!(result.y_value, 4);
}

#[test]
fn looping_through_a_constant_comparison_stays_equivalent() {
    // Counts z1 upward until it equals 2; the comparison group is entered
    // three times, so its scratch variables must reset on every pass.
    let text = r#"
        <S-Program name="CountUp">
          <S-Instructions>
            <S-Instruction type="synthetic" name="JUMP_EQUAL_CONSTANT">
              <S-Variable>z1</S-Variable>
              <S-Label>L1</S-Label>
              <S-Instruction-Arguments>
                <S-Instruction-Argument name="JEConstantLabel" value="EXIT"/>
                <S-Instruction-Argument name="constantValue" value="2"/>
              </S-Instruction-Arguments>
            </S-Instruction>
            <S-Instruction type="basic" name="INCREASE"><S-Variable>z1</S-Variable></S-Instruction>
            <S-Instruction type="synthetic" name="GOTO_LABEL">
              <S-Variable>y</S-Variable>
              <S-Instruction-Arguments>
                <S-Instruction-Argument name="gotoLabel" value="L1"/>
              </S-Instruction-Arguments>
            </S-Instruction>
          </S-Instructions>
        </S-Program>"#;
    let program = parse(text).unwrap();
    let options = RunOptions::default();
    let base = run(&program, &[], &options).unwrap();
    // Two untaken comparisons, two loop tails, one taken comparison.
    assert_eq!(base.cycles, 2 * (25 + 1 + 3) + 25);
    let alt = run(&expand(&program), &[], &options).unwrap();
    assert_eq!(alt.y_value, base.y_value);
    assert_eq!(alt.cycles, base.cycles);
    assert_eq!(alt.variables.get("z1"), Some(&2));
}

#[test]
fn negative_constants_clamp_consistently_across_depths() {
    let text = r#"
        <S-Program name="Negative">
          <S-Instructions>
            <S-Instruction type="synthetic" name="CONSTANT_ASSIGNMENT">
              <S-Variable>z1</S-Variable>
              <S-Instruction-Arguments>
                <S-Instruction-Argument name="constantValue" value="-2"/>
              </S-Instruction-Arguments>
            </S-Instruction>
            <S-Instruction type="synthetic" name="JUMP_EQUAL_CONSTANT">
              <S-Variable>z1</S-Variable>
              <S-Instruction-Arguments>
                <S-Instruction-Argument name="JEConstantLabel" value="EXIT"/>
                <S-Instruction-Argument name="constantValue" value="-2"/>
              </S-Instruction-Arguments>
            </S-Instruction>
            <S-Instruction type="basic" name="INCREASE"><S-Variable>y</S-Variable></S-Instruction>
          </S-Instructions>
        </S-Program>"#;
    let program = parse(text).unwrap();
    let options = RunOptions::default();
    let base = run(&program, &[], &options).unwrap();
    // z1 clamps to zero and never equals -2, so the increment runs.
    assert_eq!(base.y_value, 1);
    assert_eq!(base.variables.get("z1"), Some(&0));
    let alt = run(&expand(&program), &[], &options).unwrap();
    assert_eq!(alt.y_value, base.y_value);
    assert_eq!(alt.cycles, base.cycles);
}

#[test]
fn double_expansion_runs_identically() {
    let program = parse(BRANCHY).unwrap();
    let once = expand(&program);
    let twice = expand(&once);
    let options = RunOptions::default();
    for inputs in [[0, 0], [3, 3], [5, 2]] {
        let a = run(&once, &inputs, &options).unwrap();
        let b = run(&twice, &inputs, &options).unwrap();
        assert_eq!(a.y_value, b.y_value);
        assert_eq!(a.cycles, b.cycles);
    }
}

proptest! {
    #[test]
    fn expansion_preserves_y_and_cycles(a in 0i64..40, b in 0i64..40) {
        let program = parse(BRANCHY).unwrap();
        let options = RunOptions::default();
        let base = run(&program, &[a, b], &options).unwrap();
        let alt = run(&expand(&program), &[a, b], &options).unwrap();
        prop_assert_eq!(base.y_value, alt.y_value);
        prop_assert_eq!(base.cycles, alt.cycles);
    }

    #[test]
    fn expanded_copy_preserves_source_and_tally(value in 0i64..60) {
        let text = r#"
            <S-Program name="Copy">
              <S-Instructions>
                <S-Instruction type="synthetic" name="ASSIGNMENT">
                  <S-Variable>y</S-Variable>
                  <S-Instruction-Arguments>
                    <S-Instruction-Argument name="assignedVariable" value="x1"/>
                  </S-Instruction-Arguments>
                </S-Instruction>
              </S-Instructions>
            </S-Program>"#;
        let expanded = expand(&parse(text).unwrap());
        let result = run(&expanded, &[value], &RunOptions::default()).unwrap();
        prop_assert_eq!(result.y_value, value);
        prop_assert_eq!(result.variables.get("x1").copied(), Some(value));
        // z1 is the transfer tally; it must drain back to zero.
        prop_assert_eq!(result.variables.get("z1").copied(), Some(0));
        prop_assert_eq!(result.cycles, 17);
    }

    #[test]
    fn countdown_equivalence_holds_for_random_inputs(n in 0i64..25) {
        let program = parse(COUNTDOWN).unwrap();
        let options = RunOptions::default();
        let base = run(&program, &[n], &options).unwrap();
        let alt = run(&expand(&program), &[n], &options).unwrap();
        prop_assert_eq!(base.y_value, alt.y_value);
        prop_assert_eq!(base.cycles, alt.cycles);
    }
}
