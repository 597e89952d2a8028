//! Numeric, comparison and byte-equality opcodes.
//!
//! Numeric operands are script numbers of at most four bytes; MINIMALDATA
//! additionally requires their shortest encoding. Results may grow to five
//! bytes and are only rejected if fed back into another numeric opcode.

use bitcoin::opcodes::{all, Opcode};

use super::num::{cast_to_bool, parse_scriptnum, SCRIPTNUM_MAX_LEN};
use super::stack::{peek, require, transition, StackEvaluator};
use super::{ContractViolation, ScriptError, ScriptProgram, ScriptToken};
use crate::VERIFY_MINIMALDATA;

type Stack = Vec<ScriptToken>;

fn pop_number(stack: &mut Stack, minimal: bool) -> Result<i64, ScriptError> {
    let top = stack.pop().ok_or(ScriptError::InvalidStackOperation)?;
    parse_scriptnum(&top.stack_bytes(), minimal, SCRIPTNUM_MAX_LEN)
}

fn push_bool(stack: &mut Stack, value: bool) {
    stack.push(ScriptToken::Number(i64::from(value)));
}

fn unary(
    program: ScriptProgram,
    op: Opcode,
    f: fn(i64) -> i64,
) -> Result<ScriptProgram, ContractViolation> {
    let minimal = program.flags().contains(VERIFY_MINIMALDATA);
    transition(program, op, |stack, _| {
        require(stack, 1)?;
        let n = pop_number(stack, minimal)?;
        stack.push(ScriptToken::Number(f(n)));
        Ok(())
    })
}

fn binary(
    program: ScriptProgram,
    op: Opcode,
    f: fn(i64, i64) -> i64,
) -> Result<ScriptProgram, ContractViolation> {
    let minimal = program.flags().contains(VERIFY_MINIMALDATA);
    transition(program, op, |stack, _| {
        require(stack, 2)?;
        let b = pop_number(stack, minimal)?;
        let a = pop_number(stack, minimal)?;
        stack.push(ScriptToken::Number(f(a, b)));
        Ok(())
    })
}

fn verifying(
    result: Result<ScriptProgram, ContractViolation>,
    err: ScriptError,
) -> Result<ScriptProgram, ContractViolation> {
    let program = result?;
    if !program.is_executing() {
        return Ok(program);
    }
    let mut program = program;
    match program.stack.pop() {
        Some(top) if cast_to_bool(&top.stack_bytes()) => Ok(program),
        Some(top) => {
            program.stack.push(top);
            Ok(program.fail(err))
        }
        None => Ok(program.fail(ScriptError::InvalidStackOperation)),
    }
}

pub fn op_1add(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    unary(program, all::OP_1ADD, |n| n + 1)
}

pub fn op_1sub(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    unary(program, all::OP_1SUB, |n| n - 1)
}

pub fn op_negate(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    unary(program, all::OP_NEGATE, |n| -n)
}

pub fn op_abs(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    unary(program, all::OP_ABS, i64::abs)
}

pub fn op_not(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    unary(program, all::OP_NOT, |n| i64::from(n == 0))
}

pub fn op_0notequal(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    unary(program, all::OP_0NOTEQUAL, |n| i64::from(n != 0))
}

pub fn op_add(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    binary(program, all::OP_ADD, |a, b| a + b)
}

pub fn op_sub(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    binary(program, all::OP_SUB, |a, b| a - b)
}

pub fn op_booland(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    binary(program, all::OP_BOOLAND, |a, b| i64::from(a != 0 && b != 0))
}

pub fn op_boolor(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    binary(program, all::OP_BOOLOR, |a, b| i64::from(a != 0 || b != 0))
}

pub fn op_numequal(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    binary(program, all::OP_NUMEQUAL, |a, b| i64::from(a == b))
}

pub fn op_numequalverify(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    verifying(
        binary(program, all::OP_NUMEQUALVERIFY, |a, b| i64::from(a == b)),
        ScriptError::NumEqualVerify,
    )
}

pub fn op_numnotequal(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    binary(program, all::OP_NUMNOTEQUAL, |a, b| i64::from(a != b))
}

pub fn op_lessthan(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    binary(program, all::OP_LESSTHAN, |a, b| i64::from(a < b))
}

pub fn op_greaterthan(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    binary(program, all::OP_GREATERTHAN, |a, b| i64::from(a > b))
}

pub fn op_lessthanorequal(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    binary(program, all::OP_LESSTHANOREQUAL, |a, b| i64::from(a <= b))
}

pub fn op_greaterthanorequal(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    binary(program, all::OP_GREATERTHANOREQUAL, |a, b| i64::from(a >= b))
}

pub fn op_min(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    binary(program, all::OP_MIN, i64::min)
}

pub fn op_max(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    binary(program, all::OP_MAX, i64::max)
}

/// `x min max -> (min <= x < max)`
pub fn op_within(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    let minimal = program.flags().contains(VERIFY_MINIMALDATA);
    transition(program, all::OP_WITHIN, |stack, _| {
        require(stack, 3)?;
        let max = pop_number(stack, minimal)?;
        let min = pop_number(stack, minimal)?;
        let x = pop_number(stack, minimal)?;
        push_bool(stack, min <= x && x < max);
        Ok(())
    })
}

pub fn op_size(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    transition(program, all::OP_SIZE, |stack, _| {
        let top = peek(stack, 0)?;
        stack.push(ScriptToken::Number(top.stack_bytes().len() as i64));
        Ok(())
    })
}

pub fn op_equal(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    equal(program, all::OP_EQUAL)
}

pub fn op_equalverify(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    verifying(equal(program, all::OP_EQUALVERIFY), ScriptError::EqualVerify)
}

fn equal(program: ScriptProgram, op: Opcode) -> Result<ScriptProgram, ContractViolation> {
    transition(program, op, |stack, _| {
        require(stack, 2)?;
        let b = stack.pop().ok_or(ScriptError::InvalidStackOperation)?;
        let a = stack.pop().ok_or(ScriptError::InvalidStackOperation)?;
        push_bool(stack, a.stack_bytes() == b.stack_bytes());
        Ok(())
    })
}

/// Evaluator for a numeric or equality opcode, `None` for any other.
pub fn arithmetic_evaluator(op: Opcode) -> Option<StackEvaluator> {
    let evaluator: StackEvaluator = match op {
        all::OP_1ADD => op_1add,
        all::OP_1SUB => op_1sub,
        all::OP_NEGATE => op_negate,
        all::OP_ABS => op_abs,
        all::OP_NOT => op_not,
        all::OP_0NOTEQUAL => op_0notequal,
        all::OP_ADD => op_add,
        all::OP_SUB => op_sub,
        all::OP_BOOLAND => op_booland,
        all::OP_BOOLOR => op_boolor,
        all::OP_NUMEQUAL => op_numequal,
        all::OP_NUMEQUALVERIFY => op_numequalverify,
        all::OP_NUMNOTEQUAL => op_numnotequal,
        all::OP_LESSTHAN => op_lessthan,
        all::OP_GREATERTHAN => op_greaterthan,
        all::OP_LESSTHANOREQUAL => op_lessthanorequal,
        all::OP_GREATERTHANOREQUAL => op_greaterthanorequal,
        all::OP_MIN => op_min,
        all::OP_MAX => op_max,
        all::OP_WITHIN => op_within,
        all::OP_SIZE => op_size,
        all::OP_EQUAL => op_equal,
        all::OP_EQUALVERIFY => op_equalverify,
        _ => return None,
    };
    Some(evaluator)
}
