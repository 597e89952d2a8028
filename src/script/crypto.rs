//! Hashing and signature-checking opcodes.

use bitcoin::hashes::{hash160, ripemd160, sha1, sha256, sha256d, Hash};
use bitcoin::opcodes::{all, Opcode};

use super::num::{parse_scriptnum, SCRIPTNUM_MAX_LEN};
use super::preimage::script_code_for;
use super::sig::check_signature_encoding;
use super::stack::transition;
use super::util::check_pub_key_encoding;
use super::{
    ContractViolation, ScriptError, ScriptProgram, ScriptToken, SigVersion, SignatureChecker,
    MAX_OPS_PER_SCRIPT, MAX_PUBKEYS_PER_MULTISIG,
};
use crate::{VERIFY_CONST_SCRIPTCODE, VERIFY_MINIMALDATA, VERIFY_NULLDUMMY, VERIFY_NULLFAIL};

fn hash_op(
    program: ScriptProgram,
    op: Opcode,
    digest: fn(&[u8]) -> Vec<u8>,
) -> Result<ScriptProgram, ContractViolation> {
    transition(program, op, |stack, _| {
        let top = stack.pop().ok_or(ScriptError::InvalidStackOperation)?;
        stack.push(ScriptToken::Constant(digest(&top.stack_bytes())));
        Ok(())
    })
}

pub fn op_ripemd160(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    hash_op(program, all::OP_RIPEMD160, |data| ripemd160::Hash::hash(data).to_byte_array().to_vec())
}

pub fn op_sha1(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    hash_op(program, all::OP_SHA1, |data| sha1::Hash::hash(data).to_byte_array().to_vec())
}

pub fn op_sha256(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    hash_op(program, all::OP_SHA256, |data| sha256::Hash::hash(data).to_byte_array().to_vec())
}

pub fn op_hash160(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    hash_op(program, all::OP_HASH160, |data| hash160::Hash::hash(data).to_byte_array().to_vec())
}

pub fn op_hash256(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    hash_op(program, all::OP_HASH256, |data| sha256d::Hash::hash(data).to_byte_array().to_vec())
}

/// Marks the signed script code as starting after this token.
pub fn op_codeseparator(program: ScriptProgram) -> Result<ScriptProgram, ContractViolation> {
    if !program.is_executing() {
        return Ok(program);
    }
    let index = program.position();
    let mut program = program.consume(all::OP_CODESEPARATOR)?;
    if program.sig_version() == SigVersion::Base
        && program.flags().contains(VERIFY_CONST_SCRIPTCODE)
    {
        return Ok(program.fail(ScriptError::OpCodeSeparator));
    }
    program.last_code_separator = Some(index);
    Ok(program)
}

pub fn op_checksig(
    program: ScriptProgram,
    checker: &dyn SignatureChecker,
) -> Result<ScriptProgram, ContractViolation> {
    checksig(program, all::OP_CHECKSIG, checker)
}

pub fn op_checksigverify(
    program: ScriptProgram,
    checker: &dyn SignatureChecker,
) -> Result<ScriptProgram, ContractViolation> {
    checksig(program, all::OP_CHECKSIGVERIFY, checker)
}

fn checksig(
    program: ScriptProgram,
    op: Opcode,
    checker: &dyn SignatureChecker,
) -> Result<ScriptProgram, ContractViolation> {
    if !program.is_executing() {
        return Ok(program);
    }
    let mut program = program.consume(op)?;
    let len = program.stack.len();
    if len < 2 {
        return Ok(program.fail(ScriptError::InvalidStackOperation));
    }
    let sig = program.stack[len - 2].stack_bytes().into_owned();
    let pubkey = program.stack[len - 1].stack_bytes().into_owned();
    let flags = program.flags();
    let sig_version = program.sig_version();

    let (script_code, found) = script_code_for(&program, &[sig.as_slice()]);
    if found > 0 && flags.contains(VERIFY_CONST_SCRIPTCODE) {
        return Ok(program.fail(ScriptError::SigFindAndDelete));
    }
    if let Err(err) = check_signature_encoding(&sig, flags)
        .and_then(|()| check_pub_key_encoding(&pubkey, flags, sig_version))
    {
        return Ok(program.fail(err));
    }

    let success = checker.check_ecdsa_signature(&sig, &pubkey, &script_code, sig_version);
    if !success && flags.contains(VERIFY_NULLFAIL) && !sig.is_empty() {
        return Ok(program.fail(ScriptError::NullFail));
    }

    program.stack.truncate(len - 2);
    if op == all::OP_CHECKSIGVERIFY {
        if !success {
            return Ok(program.fail(ScriptError::CheckSigVerify));
        }
    } else {
        program.stack.push(ScriptToken::Number(i64::from(success)));
    }
    Ok(program)
}

pub fn op_checkmultisig(
    program: ScriptProgram,
    checker: &dyn SignatureChecker,
) -> Result<ScriptProgram, ContractViolation> {
    checkmultisig(program, all::OP_CHECKMULTISIG, checker)
}

pub fn op_checkmultisigverify(
    program: ScriptProgram,
    checker: &dyn SignatureChecker,
) -> Result<ScriptProgram, ContractViolation> {
    checkmultisig(program, all::OP_CHECKMULTISIGVERIFY, checker)
}

/// `<dummy> <sig>... <m> <key>... <n> CHECKMULTISIG`
///
/// Signatures must match keys in order. Keys are tried from the top down and
/// the scan stops as soon as the remaining keys cannot satisfy the remaining
/// signatures.
fn checkmultisig(
    program: ScriptProgram,
    op: Opcode,
    checker: &dyn SignatureChecker,
) -> Result<ScriptProgram, ContractViolation> {
    if !program.is_executing() {
        return Ok(program);
    }
    let mut program = program.consume(op)?;
    let flags = program.flags();
    let sig_version = program.sig_version();
    let minimal = flags.contains(VERIFY_MINIMALDATA);
    let len = program.stack.len();
    let from_top = |stack: &[ScriptToken], depth: usize| {
        stack[stack.len() - depth].stack_bytes().into_owned()
    };

    let mut i = 1;
    if len < i {
        return Ok(program.fail(ScriptError::InvalidStackOperation));
    }
    let keys_count = match parse_scriptnum(
        &from_top(&program.stack, i),
        minimal,
        SCRIPTNUM_MAX_LEN,
    ) {
        Ok(n) if (0..=MAX_PUBKEYS_PER_MULTISIG as i64).contains(&n) => n as usize,
        Ok(_) => return Ok(program.fail(ScriptError::PubkeyCount)),
        Err(err) => return Ok(program.fail(err)),
    };
    program.op_count += keys_count;
    if program.op_count > MAX_OPS_PER_SCRIPT {
        return Ok(program.fail(ScriptError::OpCount));
    }
    i += 1;
    let mut key_index = i;
    // Elements left to clean up before the NULLFAIL check stops applying.
    let mut keys_to_check = keys_count + 2;
    i += keys_count;
    if len < i {
        return Ok(program.fail(ScriptError::InvalidStackOperation));
    }
    let sigs_count = match parse_scriptnum(
        &from_top(&program.stack, i),
        minimal,
        SCRIPTNUM_MAX_LEN,
    ) {
        Ok(n) if (0..=keys_count as i64).contains(&n) => n as usize,
        Ok(_) => return Ok(program.fail(ScriptError::SigCount)),
        Err(err) => return Ok(program.fail(err)),
    };
    i += 1;
    let mut sig_index = i;
    i += sigs_count;
    if len < i {
        return Ok(program.fail(ScriptError::InvalidStackOperation));
    }

    let sigs: Vec<Vec<u8>> = (0..sigs_count)
        .map(|k| from_top(&program.stack, sig_index + k))
        .collect();
    let sig_refs: Vec<&[u8]> = sigs.iter().map(Vec::as_slice).collect();
    let (script_code, found) = script_code_for(&program, &sig_refs);
    if found > 0 && flags.contains(VERIFY_CONST_SCRIPTCODE) {
        return Ok(program.fail(ScriptError::SigFindAndDelete));
    }

    let mut remaining_sigs = sigs_count;
    let mut remaining_keys = keys_count;
    let mut success = true;
    while success && remaining_sigs > 0 {
        let sig = from_top(&program.stack, sig_index);
        let pubkey = from_top(&program.stack, key_index);
        if let Err(err) = check_signature_encoding(&sig, flags)
            .and_then(|()| check_pub_key_encoding(&pubkey, flags, sig_version))
        {
            return Ok(program.fail(err));
        }
        if checker.check_ecdsa_signature(&sig, &pubkey, &script_code, sig_version) {
            sig_index += 1;
            remaining_sigs -= 1;
        }
        key_index += 1;
        remaining_keys -= 1;
        if remaining_sigs > remaining_keys {
            success = false;
        }
    }

    // Pop everything but the dummy. Under NULLFAIL every signature of a failed
    // check must be empty; the keys and counts are exempt.
    while i > 1 {
        i -= 1;
        let top_is_empty = program
            .stack
            .last()
            .map_or(true, |top| top.stack_bytes().is_empty());
        if !success && flags.contains(VERIFY_NULLFAIL) && keys_to_check == 0 && !top_is_empty {
            return Ok(program.fail(ScriptError::NullFail));
        }
        keys_to_check = keys_to_check.saturating_sub(1);
        program.stack.pop();
    }

    let Some(dummy) = program.stack.pop() else {
        return Ok(program.fail(ScriptError::InvalidStackOperation));
    };
    if flags.contains(VERIFY_NULLDUMMY) && !dummy.stack_bytes().is_empty() {
        return Ok(program.fail(ScriptError::SigNullDummy));
    }

    if op == all::OP_CHECKMULTISIGVERIFY {
        if !success {
            return Ok(program.fail(ScriptError::CheckMultiSigVerify));
        }
    } else {
        program.stack.push(ScriptToken::Number(i64::from(success)));
    }
    Ok(program)
}

pub type CryptoEvaluator =
    fn(ScriptProgram, &dyn SignatureChecker) -> Result<ScriptProgram, ContractViolation>;

/// Evaluator for a hashing or signature opcode, `None` for any other.
pub fn crypto_evaluator(op: Opcode) -> Option<CryptoEvaluator> {
    let evaluator: CryptoEvaluator = match op {
        all::OP_RIPEMD160 => |program, _| op_ripemd160(program),
        all::OP_SHA1 => |program, _| op_sha1(program),
        all::OP_SHA256 => |program, _| op_sha256(program),
        all::OP_HASH160 => |program, _| op_hash160(program),
        all::OP_HASH256 => |program, _| op_hash256(program),
        all::OP_CODESEPARATOR => |program, _| op_codeseparator(program),
        all::OP_CHECKSIG => op_checksig,
        all::OP_CHECKSIGVERIFY => op_checksigverify,
        all::OP_CHECKMULTISIG => op_checkmultisig,
        all::OP_CHECKMULTISIGVERIFY => op_checkmultisigverify,
        _ => return None,
    };
    Some(evaluator)
}
