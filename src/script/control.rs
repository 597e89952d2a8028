//! Flow control, NOPs, lock-time checks and small-number pushes.

use bitcoin::opcodes::{all, Opcode};

use super::num::{cast_to_bool, parse_scriptnum, SCRIPTNUM_MAX_LEN_EXTENDED};
use super::stack::{peek, transition};
use super::token::decode_op_n;
use super::{
    ContractViolation, ScriptError, ScriptProgram, ScriptToken, SigVersion, SignatureChecker,
    SEQUENCE_LOCKTIME_DISABLE_FLAG,
};
use crate::{
    VERIFY_CHECKLOCKTIMEVERIFY, VERIFY_CHECKSEQUENCEVERIFY, VERIFY_DISCOURAGE_UPGRADABLE_NOPS,
    VERIFY_MINIMALDATA, VERIFY_MINIMALIF,
};

pub fn op_if(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    conditional(program, all::OP_IF, false)
}

pub fn op_notif(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    conditional(program, all::OP_NOTIF, true)
}

/// Opens a branch. Inside a skipped branch nothing is popped and the new
/// branch is skipped too.
fn conditional(
    program: ScriptProgram,
    op: Opcode,
    negate: bool,
) -> Result<ScriptProgram, ContractViolation> {
    if !program.is_executing() {
        return Ok(program);
    }
    let mut program = program.consume(op)?;
    let mut taken = false;
    if program.is_branch_executed() {
        let Some(top) = program.stack.pop() else {
            return Ok(program.fail(ScriptError::UnbalancedConditional));
        };
        let bytes = top.stack_bytes();
        let minimal_if = program.sig_version() == SigVersion::WitnessV0
            && program.flags().contains(VERIFY_MINIMALIF);
        if minimal_if && !matches!(&*bytes, [] | [0x01]) {
            return Ok(program.fail(ScriptError::MinimalIf));
        }
        taken = cast_to_bool(&bytes) != negate;
    }
    program.exec_stack.push(taken);
    Ok(program)
}

pub fn op_else(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    if !program.is_executing() {
        return Ok(program);
    }
    let mut program = program.consume(all::OP_ELSE)?;
    match program.exec_stack.last_mut() {
        Some(taken) => {
            *taken = !*taken;
            Ok(program)
        }
        None => Ok(program.fail(ScriptError::UnbalancedConditional)),
    }
}

pub fn op_endif(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    if !program.is_executing() {
        return Ok(program);
    }
    let mut program = program.consume(all::OP_ENDIF)?;
    match program.exec_stack.pop() {
        Some(_) => Ok(program),
        None => Ok(program.fail(ScriptError::UnbalancedConditional)),
    }
}

pub fn op_verify(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    transition(program, all::OP_VERIFY, |stack, _| {
        let top = peek(stack, 0)?;
        if cast_to_bool(&top.stack_bytes()) {
            stack.pop();
            Ok(())
        } else {
            Err(ScriptError::Verify)
        }
    })
}

pub fn op_return(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    transition(program, all::OP_RETURN, |_, _| Err(ScriptError::OpReturn))
}

/// OP_NOP, and the reserved NOP1 and NOP4 to NOP10.
pub fn op_nop(program: ScriptProgram, op: Opcode) -> Result<ScriptProgram, ContractViolation> {
    let discourage =
        op != all::OP_NOP && program.flags().contains(VERIFY_DISCOURAGE_UPGRADABLE_NOPS);
    transition(program, op, |_, _| {
        if discourage {
            Err(ScriptError::DiscourageUpgradableNops)
        } else {
            Ok(())
        }
    })
}

/// Reads the lock-time argument without popping it.
fn lock_time_argument(stack: &[ScriptToken], minimal: bool) -> Result<i64, ScriptError> {
    let top = stack.last().ok_or(ScriptError::InvalidStackOperation)?;
    // Five bytes, so the whole range of an unsigned 32-bit lock-time fits.
    let n = parse_scriptnum(&top.stack_bytes(), minimal, SCRIPTNUM_MAX_LEN_EXTENDED)?;
    if n < 0 {
        return Err(ScriptError::NegativeLockTime);
    }
    Ok(n)
}

pub fn op_checklocktimeverify(
    program: ScriptProgram,
    checker: &dyn SignatureChecker,
) -> Result<ScriptProgram, ContractViolation> {
    if !program.flags().contains(VERIFY_CHECKLOCKTIMEVERIFY) {
        return op_nop(program, all::OP_CLTV);
    }
    let minimal = program.flags().contains(VERIFY_MINIMALDATA);
    transition(program, all::OP_CLTV, |stack, _| {
        let lock_time = lock_time_argument(stack, minimal)?;
        if checker.check_lock_time(lock_time) {
            Ok(())
        } else {
            Err(ScriptError::UnsatisfiedLockTime)
        }
    })
}

pub fn op_checksequenceverify(
    program: ScriptProgram,
    checker: &dyn SignatureChecker,
) -> Result<ScriptProgram, ContractViolation> {
    if !program.flags().contains(VERIFY_CHECKSEQUENCEVERIFY) {
        return op_nop(program, all::OP_CSV);
    }
    let minimal = program.flags().contains(VERIFY_MINIMALDATA);
    transition(program, all::OP_CSV, |stack, _| {
        let sequence = lock_time_argument(stack, minimal)?;
        if sequence & SEQUENCE_LOCKTIME_DISABLE_FLAG != 0 || checker.check_sequence(sequence) {
            Ok(())
        } else {
            Err(ScriptError::UnsatisfiedLockTime)
        }
    })
}

/// OP_1NEGATE and OP_1 through OP_16.
pub fn op_push_number(
    program: ScriptProgram,
    op: Opcode,
) -> Result<ScriptProgram, ContractViolation> {
    transition(program, op, |stack, _| {
        let n = ScriptToken::Op(op).small_number().ok_or(ScriptError::BadOpcode)?;
        stack.push(ScriptToken::Number(n));
        Ok(())
    })
}

pub type ControlEvaluator =
    fn(ScriptProgram, Opcode, &dyn SignatureChecker) -> Result<ScriptProgram, ContractViolation>;

/// Evaluator for a control opcode, `None` for any other opcode.
pub fn control_evaluator(op: Opcode) -> Option<ControlEvaluator> {
    let evaluator: ControlEvaluator = match op {
        all::OP_IF => |program, _, _| op_if(program),
        all::OP_NOTIF => |program, _, _| op_notif(program),
        all::OP_ELSE => |program, _, _| op_else(program),
        all::OP_ENDIF => |program, _, _| op_endif(program),
        all::OP_VERIFY => |program, _, _| op_verify(program),
        all::OP_RETURN => |program, _, _| op_return(program),
        all::OP_CLTV => |program, _, checker| op_checklocktimeverify(program, checker),
        all::OP_CSV => |program, _, checker| op_checksequenceverify(program, checker),
        all::OP_NOP
        | all::OP_NOP1
        | all::OP_NOP4
        | all::OP_NOP5
        | all::OP_NOP6
        | all::OP_NOP7
        | all::OP_NOP8
        | all::OP_NOP9
        | all::OP_NOP10 => |program, op, _| op_nop(program, op),
        all::OP_PUSHNUM_NEG1 => |program, op, _| op_push_number(program, op),
        _ if decode_op_n(op).is_some() => |program, op, _| op_push_number(program, op),
        _ => return None,
    };
    Some(evaluator)
}
