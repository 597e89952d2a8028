//! The evaluation loop and the scriptSig / scriptPubKey / witness driver.

use bitcoin::hashes::{sha256, Hash};
use bitcoin::opcodes::{all, Opcode};
use bitcoin::{Amount, Script, Transaction, Witness};
use tracing::{debug, trace};

use super::arithmetic::arithmetic_evaluator;
use super::control::control_evaluator;
use super::crypto::crypto_evaluator;
use super::num::cast_to_bool;
use super::parse::pushdata_width;
use super::preimage::{p2pkh_tokens, witness_program};
use super::stack::stack_evaluator;
use super::util::{check_minimal_push, is_push_only, push_tokens};
use super::{
    serialize_tokens, ContractViolation, ScriptError, ScriptFlags, ScriptProgram, ScriptToken,
    SigVersion, SignatureChecker, TransactionSignatureChecker, Validity, MAX_OPS_PER_SCRIPT,
    MAX_SCRIPT_ELEMENT_SIZE, MAX_SCRIPT_SIZE, MAX_STACK_SIZE,
};
use crate::{
    VERIFY_CLEANSTACK, VERIFY_CONST_SCRIPTCODE, VERIFY_DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM,
    VERIFY_MINIMALDATA, VERIFY_P2SH, VERIFY_SIGPUSHONLY, VERIFY_WITNESS,
};

/// Runs `program` until it is `Valid` or `Invalid`.
///
/// Script failures end up in the returned program's validity. An `Err` means
/// the program itself was malformed, e.g. a hand-built push opcode with no
/// payload token after it.
pub fn evaluate(
    mut program: ScriptProgram,
    checker: &dyn SignatureChecker,
) -> Result<ScriptProgram, ContractViolation> {
    if program.is_executing()
        && program.position() == 0
        && script_size(&program) > MAX_SCRIPT_SIZE
    {
        return Ok(program.fail(ScriptError::ScriptSize));
    }
    while program.is_executing() {
        if program.script().is_empty() {
            return Ok(program.finish());
        }
        program = step(program, checker)?;
    }
    Ok(program)
}

/// Executes the next token of `program`.
pub fn step(
    program: ScriptProgram,
    checker: &dyn SignatureChecker,
) -> Result<ScriptProgram, ContractViolation> {
    if !program.is_executing() {
        return Ok(program);
    }
    let Some(head) = program.script().first().cloned() else {
        return Ok(program.finish());
    };
    let executing = program.is_branch_executed();

    let program = match head {
        ScriptToken::Op(op) if op.to_u8() <= all::OP_PUSHDATA4.to_u8() => {
            push(program, op, executing)?
        }
        ScriptToken::Op(op) => {
            trace!(opcode = %op, position = program.position(), executing, "step");
            operation(program, op, executing, checker)?
        }
        data => push_bare(program, data, executing),
    };

    if program.is_executing()
        && program.stack().len() + program.alt_stack().len() > MAX_STACK_SIZE
    {
        return Ok(program.fail(ScriptError::StackSize));
    }
    Ok(program)
}

fn script_size(program: &ScriptProgram) -> usize {
    serialize_tokens(program.original_script()).len()
        + program.unparsed_tail().map_or(0, <[u8]>::len)
}

/// OP_0, OP_PUSHBYTES_n and OP_PUSHDATA1/2/4 together with their payload.
///
/// The element size limit applies even inside unexecuted branches.
fn push(
    mut program: ScriptProgram,
    op: Opcode,
    executing: bool,
) -> Result<ScriptProgram, ContractViolation> {
    if op == all::OP_PUSHBYTES_0 {
        program.advance(1);
        if executing {
            program.stack.push(ScriptToken::Number(0));
        }
        return Ok(program);
    }

    let payload_offset = pushdata_width(op).map_or(1, |_| 2);
    let data = match program.script().get(payload_offset) {
        Some(ScriptToken::Constant(data)) => data.clone(),
        _ => return Err(ContractViolation::MissingPushData { op }),
    };
    program.advance(payload_offset + 1);
    trace!(opcode = %op, len = data.len(), executing, "push");

    if data.len() > MAX_SCRIPT_ELEMENT_SIZE {
        return Ok(program.fail(ScriptError::PushSize));
    }
    if executing {
        if program.flags().contains(VERIFY_MINIMALDATA) && !check_minimal_push(op, &data) {
            return Ok(program.fail(ScriptError::MinimalData));
        }
        program.stack.push(ScriptToken::Constant(data));
    }
    Ok(program)
}

/// A constant or number standing alone at the head of a hand-built script.
fn push_bare(mut program: ScriptProgram, token: ScriptToken, executing: bool) -> ScriptProgram {
    program.advance(1);
    if token.stack_bytes().len() > MAX_SCRIPT_ELEMENT_SIZE {
        return program.fail(ScriptError::PushSize);
    }
    if executing {
        program.stack.push(token);
    }
    program
}

fn is_disabled(op: Opcode) -> bool {
    matches!(
        op,
        all::OP_CAT
            | all::OP_SUBSTR
            | all::OP_LEFT
            | all::OP_RIGHT
            | all::OP_INVERT
            | all::OP_AND
            | all::OP_OR
            | all::OP_XOR
            | all::OP_2MUL
            | all::OP_2DIV
            | all::OP_MUL
            | all::OP_DIV
            | all::OP_MOD
            | all::OP_LSHIFT
            | all::OP_RSHIFT
    )
}

fn is_conditional(op: Opcode) -> bool {
    (all::OP_IF.to_u8()..=all::OP_ENDIF.to_u8()).contains(&op.to_u8())
}

fn operation(
    mut program: ScriptProgram,
    op: Opcode,
    executing: bool,
    checker: &dyn SignatureChecker,
) -> Result<ScriptProgram, ContractViolation> {
    if op.to_u8() > all::OP_PUSHNUM_16.to_u8() {
        program.op_count += 1;
        if program.op_count > MAX_OPS_PER_SCRIPT {
            return Ok(program.consume(op)?.fail(ScriptError::OpCount));
        }
    }
    if is_disabled(op) {
        return Ok(program.consume(op)?.fail(ScriptError::DisabledOpcode));
    }
    if op == all::OP_CODESEPARATOR
        && program.sig_version() == SigVersion::Base
        && program.flags().contains(VERIFY_CONST_SCRIPTCODE)
    {
        return Ok(program.consume(op)?.fail(ScriptError::OpCodeSeparator));
    }
    if !executing && !is_conditional(op) {
        return program.consume(op);
    }

    if let Some(evaluator) = stack_evaluator(op).or_else(|| arithmetic_evaluator(op)) {
        return evaluator(program);
    }
    if let Some(evaluator) = crypto_evaluator(op) {
        return evaluator(program, checker);
    }
    if let Some(evaluator) = control_evaluator(op) {
        return evaluator(program, op, checker);
    }
    // RESERVED, VER, VERIF, VERNOTIF, RESERVED1/2 and unassigned opcodes.
    Ok(program.consume(op)?.fail(ScriptError::BadOpcode))
}

/// Evaluates `program` and flattens the outcome into its final stack.
fn run(
    program: ScriptProgram,
    checker: &dyn SignatureChecker,
) -> Result<Vec<ScriptToken>, ScriptError> {
    let program = evaluate(program, checker).map_err(|violation| {
        debug!(%violation, "malformed program");
        ScriptError::Unknown
    })?;
    match program.validity() {
        Validity::Invalid(err) => Err(err),
        _ => Ok(program.into_stack()),
    }
}

fn top_is_true(stack: &[ScriptToken]) -> bool {
    stack.last().is_some_and(|top| cast_to_bool(&top.stack_bytes()))
}

/// Verifies input `input_index` of `tx` spending `script_pubkey` worth `amount`.
pub fn verify_input(
    tx: &Transaction,
    input_index: usize,
    script_pubkey: &Script,
    amount: Amount,
    flags: ScriptFlags,
) -> Result<(), ScriptError> {
    let input = tx.input.get(input_index).ok_or(ScriptError::Unknown)?;
    let checker = TransactionSignatureChecker::new(tx, input_index, amount);
    let result = verify_script(
        input.script_sig.as_bytes(),
        script_pubkey.as_bytes(),
        &input.witness,
        flags,
        &checker,
    );
    if let Err(err) = result {
        debug!(input_index, error = %err, "input failed verification");
    }
    result
}

/// Core's `VerifyScript` against an arbitrary checker.
pub fn verify_script(
    script_sig: &[u8],
    script_pubkey: &[u8],
    witness: &Witness,
    flags: ScriptFlags,
    checker: &dyn SignatureChecker,
) -> Result<(), ScriptError> {
    let sig_program = ScriptProgram::from_bytes(script_sig, flags);
    let sig_is_push_only =
        sig_program.unparsed_tail().is_none() && is_push_only(sig_program.original_script());
    if flags.contains(VERIFY_SIGPUSHONLY) && !sig_is_push_only {
        return Err(ScriptError::SigPushOnly);
    }

    let stack = run(sig_program, checker)?;
    let p2sh_stack = flags.contains(VERIFY_P2SH).then(|| stack.clone());

    let pubkey_program = ScriptProgram::from_bytes(script_pubkey, flags).with_stack(stack);
    let pubkey_tokens = pubkey_program.original_script().to_vec();
    let pubkey_has_tail = pubkey_program.unparsed_tail().is_some();
    let mut stack = run(pubkey_program, checker)?;
    if !top_is_true(&stack) {
        return Err(ScriptError::EvalFalse);
    }

    let mut had_witness = false;
    if flags.contains(VERIFY_WITNESS) && !pubkey_has_tail {
        if let Some((version, program)) = witness_program(&pubkey_tokens) {
            had_witness = true;
            if !script_sig.is_empty() {
                return Err(ScriptError::WitnessMalleated);
            }
            verify_witness_program(witness, version, program, flags, checker)?;
            // Keeps CLEANSTACK satisfied; the witness result replaces the stack.
            stack.truncate(1);
        }
    }

    let is_p2sh = Script::from_bytes(script_pubkey).is_p2sh();
    if let Some(mut p2sh_stack) = p2sh_stack.filter(|_| is_p2sh) {
        if !sig_is_push_only {
            return Err(ScriptError::SigPushOnly);
        }
        let redeem = p2sh_stack
            .pop()
            .ok_or(ScriptError::InvalidStackOperation)?
            .stack_bytes()
            .into_owned();
        debug!(len = redeem.len(), "evaluating P2SH redeem script");
        let redeem_program = ScriptProgram::from_bytes(&redeem, flags).with_stack(p2sh_stack);
        let redeem_tokens = redeem_program.original_script().to_vec();
        let redeem_has_tail = redeem_program.unparsed_tail().is_some();
        stack = run(redeem_program, checker)?;
        if !top_is_true(&stack) {
            return Err(ScriptError::EvalFalse);
        }

        if flags.contains(VERIFY_WITNESS) && !redeem_has_tail {
            if let Some((version, program)) = witness_program(&redeem_tokens) {
                had_witness = true;
                let exact = push_tokens(&redeem).map(|tokens| serialize_tokens(&tokens));
                if exact.as_deref() != Ok(script_sig) {
                    return Err(ScriptError::WitnessMalleatedP2SH);
                }
                verify_witness_program(witness, version, program, flags, checker)?;
                stack.truncate(1);
            }
        }
    }

    if flags.contains(VERIFY_CLEANSTACK) && stack.len() != 1 {
        return Err(ScriptError::CleanStack);
    }
    if flags.contains(VERIFY_WITNESS) && !had_witness && !witness.is_empty() {
        return Err(ScriptError::WitnessUnexpected);
    }
    Ok(())
}

fn verify_witness_program(
    witness: &Witness,
    version: u8,
    program: &[u8],
    flags: ScriptFlags,
    checker: &dyn SignatureChecker,
) -> Result<(), ScriptError> {
    if version != 0 {
        if flags.contains(VERIFY_DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM) {
            return Err(ScriptError::DiscourageUpgradableWitnessProgram);
        }
        return Ok(());
    }

    let items: Vec<&[u8]> = witness.iter().collect();
    let (script, stack) = match program.len() {
        32 => {
            let (witness_script, stack) =
                items.split_last().ok_or(ScriptError::WitnessProgramWitnessEmpty)?;
            if sha256::Hash::hash(witness_script).as_byte_array()[..] != *program {
                return Err(ScriptError::WitnessProgramMismatch);
            }
            (ScriptProgram::from_bytes(witness_script, flags), stack)
        }
        20 => {
            if items.len() != 2 {
                return Err(ScriptError::WitnessProgramMismatch);
            }
            (ScriptProgram::new(p2pkh_tokens(program), flags), &items[..])
        }
        _ => return Err(ScriptError::WitnessProgramWrongLength),
    };

    if stack.iter().any(|item| item.len() > MAX_SCRIPT_ELEMENT_SIZE) {
        return Err(ScriptError::PushSize);
    }
    let stack = stack.iter().map(|item| ScriptToken::Constant(item.to_vec())).collect();
    let program = script.with_stack(stack).with_sig_version(SigVersion::WitnessV0);
    let stack = run(program, checker)?;
    if stack.len() != 1 {
        return Err(ScriptError::CleanStack);
    }
    if !top_is_true(&stack) {
        return Err(ScriptError::EvalFalse);
    }
    Ok(())
}
