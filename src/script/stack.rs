//! Evaluators for the opcodes that only rearrange the stacks.
//!
//! Each evaluator consumes a program whose next token is its opcode and
//! returns the program with that token executed. Stack diagrams below list
//! the top element last.
//!
//! | Opcode         | Needs | Effect                                  |
//! |----------------|-------|-----------------------------------------|
//! | `DUP`          | 1     | `x -> x x`                              |
//! | `DROP`         | 1     | `x -> `                                 |
//! | `IFDUP`        | 1     | `x -> x x` when `x` is true             |
//! | `DEPTH`        | 0     | pushes the element count                |
//! | `TOALTSTACK`   | 1     | moves the top to the alt-stack          |
//! | `FROMALTSTACK` | alt 1 | moves the alt-stack top back            |
//! | `NIP`          | 2     | `a b -> b`                              |
//! | `OVER`         | 2     | `a b -> a b a`                          |
//! | `PICK`         | 2     | `xn .. x0 n -> xn .. x0 xn`             |
//! | `ROLL`         | 2     | `xn .. x0 n -> .. x0 xn`                |
//! | `ROT`          | 3     | `a b c -> b c a`                        |
//! | `2ROT`         | 6     | `a b c d e f -> c d e f a b`            |
//! | `2DROP`        | 2     | `a b -> `                               |
//! | `SWAP`         | 2     | `a b -> b a`                            |
//! | `TUCK`         | 2     | `a b -> b a b`                          |
//! | `2DUP`         | 2     | `a b -> a b a b`                        |
//! | `3DUP`         | 3     | `a b c -> a b c a b c`                  |
//! | `2OVER`        | 4     | `a b c d -> a b c d a b`                |
//! | `2SWAP`        | 4     | `a b c d -> c d a b`                    |
//!
//! Too few elements leave the program `Invalid(InvalidStackOperation)`
//! (`InvalidAltstackOperation` for FROMALTSTACK). A wrong head opcode, or a
//! PICK/ROLL index that is a non-numeric operation, is a [`ContractViolation`].

use bitcoin::opcodes::{all, Opcode};

use super::num::{cast_to_bool, parse_scriptnum, SCRIPTNUM_MAX_LEN};
use super::{ContractViolation, ScriptError, ScriptProgram, ScriptToken};
use crate::VERIFY_MINIMALDATA;

type Stack = Vec<ScriptToken>;

/// Runs `f` on the program's stacks once `op` has been consumed.
pub(super) fn transition<F>(
    mut program: ScriptProgram,
    op: Opcode,
    f: F,
) -> Result<ScriptProgram, ContractViolation>
where
    F: FnOnce(&mut Stack, &mut Stack) -> Result<(), ScriptError>,
{
    if !program.is_executing() {
        return Ok(program);
    }
    program.expect_head(op)?;
    program.advance(1);
    let ScriptProgram { stack, alt_stack, .. } = &mut program;
    Ok(match f(stack, alt_stack) {
        Ok(()) => program,
        Err(err) => program.fail(err),
    })
}

pub(super) fn require(stack: &Stack, depth: usize) -> Result<(), ScriptError> {
    if stack.len() < depth {
        Err(ScriptError::InvalidStackOperation)
    } else {
        Ok(())
    }
}

/// Element `depth` positions below the top.
pub(super) fn peek(stack: &Stack, depth: usize) -> Result<ScriptToken, ScriptError> {
    require(stack, depth + 1)?;
    Ok(stack[stack.len() - 1 - depth].clone())
}

pub fn op_dup(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    transition(program, all::OP_DUP, |stack, _| {
        let top = peek(stack, 0)?;
        stack.push(top);
        Ok(())
    })
}

pub fn op_drop(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    transition(program, all::OP_DROP, |stack, _| {
        stack.pop().map(drop).ok_or(ScriptError::InvalidStackOperation)
    })
}

pub fn op_ifdup(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    transition(program, all::OP_IFDUP, |stack, _| {
        let top = peek(stack, 0)?;
        if cast_to_bool(&top.stack_bytes()) {
            stack.push(top);
        }
        Ok(())
    })
}

pub fn op_depth(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    transition(program, all::OP_DEPTH, |stack, _| {
        stack.push(ScriptToken::Number(stack.len() as i64));
        Ok(())
    })
}

pub fn op_toaltstack(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    transition(program, all::OP_TOALTSTACK, |stack, alt| {
        let top = stack.pop().ok_or(ScriptError::InvalidStackOperation)?;
        alt.push(top);
        Ok(())
    })
}

pub fn op_fromaltstack(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    transition(program, all::OP_FROMALTSTACK, |stack, alt| {
        let top = alt.pop().ok_or(ScriptError::InvalidAltstackOperation)?;
        stack.push(top);
        Ok(())
    })
}

pub fn op_nip(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    transition(program, all::OP_NIP, |stack, _| {
        require(stack, 2)?;
        stack.remove(stack.len() - 2);
        Ok(())
    })
}

pub fn op_over(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    transition(program, all::OP_OVER, |stack, _| {
        let second = peek(stack, 1)?;
        stack.push(second);
        Ok(())
    })
}

pub fn op_pick(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    pick_or_roll(program, all::OP_PICK)
}

pub fn op_roll(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    pick_or_roll(program, all::OP_ROLL)
}

fn pick_or_roll(program: ScriptProgram, op: Opcode) -> Result<ScriptProgram, ContractViolation> {
    if !program.is_executing() {
        return Ok(program);
    }
    program.expect_head(op)?;
    // Underflow is reported by the transition before the index is inspected.
    if let [_, .., index @ ScriptToken::Op(code)] = program.stack() {
        if index.small_number().is_none() {
            return Err(ContractViolation::NonNumericIndex(ScriptToken::Op(*code)));
        }
    }

    let require_minimal = program.flags().contains(VERIFY_MINIMALDATA);
    transition(program, op, |stack, _| {
        require(stack, 2)?;
        let index = stack.pop().ok_or(ScriptError::InvalidStackOperation)?;
        let n = parse_scriptnum(&index.stack_bytes(), require_minimal, SCRIPTNUM_MAX_LEN)?;
        if n < 0 || n as usize >= stack.len() {
            return Err(ScriptError::InvalidStackOperation);
        }
        let at = stack.len() - 1 - n as usize;
        let item = if op == all::OP_ROLL {
            stack.remove(at)
        } else {
            stack[at].clone()
        };
        stack.push(item);
        Ok(())
    })
}

pub fn op_rot(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    transition(program, all::OP_ROT, |stack, _| {
        require(stack, 3)?;
        let len = stack.len();
        stack[len - 3..].rotate_left(1);
        Ok(())
    })
}

pub fn op_2rot(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    transition(program, all::OP_2ROT, |stack, _| {
        require(stack, 6)?;
        let len = stack.len();
        stack[len - 6..].rotate_left(2);
        Ok(())
    })
}

pub fn op_2drop(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    transition(program, all::OP_2DROP, |stack, _| {
        require(stack, 2)?;
        stack.truncate(stack.len() - 2);
        Ok(())
    })
}

pub fn op_swap(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    transition(program, all::OP_SWAP, |stack, _| {
        require(stack, 2)?;
        let len = stack.len();
        stack.swap(len - 1, len - 2);
        Ok(())
    })
}

pub fn op_tuck(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    transition(program, all::OP_TUCK, |stack, _| {
        let top = peek(stack, 0)?;
        require(stack, 2)?;
        stack.insert(stack.len() - 2, top);
        Ok(())
    })
}

pub fn op_2dup(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    transition(program, all::OP_2DUP, |stack, _| copy_top(stack, 2, 2))
}

pub fn op_3dup(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    transition(program, all::OP_3DUP, |stack, _| copy_top(stack, 3, 3))
}

pub fn op_2over(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    transition(program, all::OP_2OVER, |stack, _| copy_top(stack, 4, 2))
}

/// Copies `count` elements starting `depth` below the top, preserving order.
fn copy_top(stack: &mut Stack, depth: usize, count: usize) -> Result<(), ScriptError> {
    require(stack, depth)?;
    let start = stack.len() - depth;
    stack.extend_from_within(start..start + count);
    Ok(())
}

pub fn op_2swap(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    transition(program, all::OP_2SWAP, |stack, _| {
        require(stack, 4)?;
        let len = stack.len();
        stack[len - 4..].rotate_left(2);
        Ok(())
    })
}

pub type StackEvaluator = fn(ScriptProgram) -> Result<ScriptProgram, ContractViolation>;

/// Evaluator for a stack-family opcode, `None` for any other opcode.
pub fn stack_evaluator(op: Opcode) -> Option<StackEvaluator> {
    let evaluator: StackEvaluator = match op {
        all::OP_DUP => op_dup,
        all::OP_DROP => op_drop,
        all::OP_IFDUP => op_ifdup,
        all::OP_DEPTH => op_depth,
        all::OP_TOALTSTACK => op_toaltstack,
        all::OP_FROMALTSTACK => op_fromaltstack,
        all::OP_NIP => op_nip,
        all::OP_OVER => op_over,
        all::OP_PICK => op_pick,
        all::OP_ROLL => op_roll,
        all::OP_ROT => op_rot,
        all::OP_2ROT => op_2rot,
        all::OP_2DROP => op_2drop,
        all::OP_SWAP => op_swap,
        all::OP_TUCK => op_tuck,
        all::OP_2DUP => op_2dup,
        all::OP_3DUP => op_3dup,
        all::OP_2OVER => op_2over,
        all::OP_2SWAP => op_2swap,
        _ => return None,
    };
    Some(evaluator)
}
