//! Predicates and rewrites over token sequences.

use bitcoin::opcodes::{all, Opcode};

use super::preimage::SigVersion;
use super::token::decode_op_n;
use super::{ParseError, ScriptError, ScriptFlags, ScriptToken, MAX_PUBKEYS_PER_MULTISIG};
use crate::{VERIFY_STRICTENC, VERIFY_WITNESS_PUBKEYTYPE};

/// Drops the push-length operations, leaving payloads and every other token.
pub fn filter_push_ops(tokens: &[ScriptToken]) -> Vec<ScriptToken> {
    tokens
        .iter()
        .filter(|token| !token.is_push_length_op())
        .cloned()
        .collect()
}

/// Operations above `OP_16` count against the per-script operation limit.
pub fn counts_towards_op_limit(token: &ScriptToken) -> bool {
    matches!(token, ScriptToken::Op(op) if op.to_u8() > all::OP_PUSHNUM_16.to_u8())
}

/// Accurate signature-operation count, as used for P2SH redeem scripts.
pub fn count_sig_ops(tokens: &[ScriptToken]) -> u32 {
    sig_op_count(tokens, true)
}

/// Legacy count, where every multisig costs the maximum.
pub fn count_legacy_sig_ops(tokens: &[ScriptToken]) -> u32 {
    sig_op_count(tokens, false)
}

fn sig_op_count(tokens: &[ScriptToken], accurate: bool) -> u32 {
    let mut count = 0u32;
    for (index, token) in tokens.iter().enumerate() {
        match token.opcode() {
            Some(all::OP_CHECKSIG) | Some(all::OP_CHECKSIGVERIFY) => count += 1,
            Some(all::OP_CHECKMULTISIG) | Some(all::OP_CHECKMULTISIGVERIFY) => {
                let preceding = index
                    .checked_sub(1)
                    .and_then(|prev| multisig_key_count(&tokens[prev]))
                    .filter(|_| accurate);
                count += preceding.unwrap_or(MAX_PUBKEYS_PER_MULTISIG as u32);
            }
            _ => {}
        }
    }
    count
}

fn multisig_key_count(token: &ScriptToken) -> Option<u32> {
    match token {
        ScriptToken::Op(op) => decode_op_n(*op).map(|n| n as u32),
        ScriptToken::Number(n) if (1..=16).contains(n) => Some(*n as u32),
        _ => None,
    }
}

/// True when every operation is a push (opcode up to `OP_16`).
///
/// Payload constants and numbers are data and always pass.
pub fn is_push_only(tokens: &[ScriptToken]) -> bool {
    tokens.iter().all(|token| match token {
        ScriptToken::Op(op) => op.to_u8() <= all::OP_PUSHNUM_16.to_u8(),
        ScriptToken::Constant(_) | ScriptToken::Number(_) => true,
    })
}

/// Whether `push_op` is the smallest encoding able to push `token`.
pub fn is_minimal_push(push_op: &ScriptToken, token: &ScriptToken) -> bool {
    if token.small_number().is_some() {
        return push_op == token;
    }
    let Some(op) = push_op.opcode() else {
        return false;
    };
    check_minimal_push(op, &token.bytes())
}

/// Byte-level minimal push rule, as applied by the interpreter under
/// MINIMALDATA.
pub fn check_minimal_push(op: Opcode, data: &[u8]) -> bool {
    let code = op.to_u8();
    match data {
        [] => op == all::OP_PUSHBYTES_0,
        [n @ 1..=16] => code == all::OP_PUSHNUM_1.to_u8() + n - 1,
        [0x81] => op == all::OP_PUSHNUM_NEG1,
        _ if data.len() <= 75 => code as usize == data.len(),
        _ if data.len() <= 255 => op == all::OP_PUSHDATA1,
        _ if data.len() <= 65_535 => op == all::OP_PUSHDATA2,
        // Nothing smaller than OP_PUSHDATA4 exists at this size.
        _ => true,
    }
}

/// Minimal push operation (and PUSHDATA length field) for a payload.
pub fn calculate_push_op(bytes: &[u8]) -> Result<Vec<ScriptToken>, ParseError> {
    let len = bytes.len();
    let tokens = if len <= 75 {
        vec![ScriptToken::Op(Opcode::from(len as u8))]
    } else if len <= u8::MAX as usize {
        vec![ScriptToken::Op(all::OP_PUSHDATA1), ScriptToken::Constant(vec![len as u8])]
    } else if len <= u16::MAX as usize {
        vec![
            ScriptToken::Op(all::OP_PUSHDATA2),
            ScriptToken::Constant((len as u16).to_le_bytes().to_vec()),
        ]
    } else {
        let len = u32::try_from(len).map_err(|_| ParseError::PushSizeOverflow(len))?;
        vec![ScriptToken::Op(all::OP_PUSHDATA4), ScriptToken::Constant(len.to_le_bytes().to_vec())]
    };
    Ok(tokens)
}

/// Push operation plus payload, shaped exactly as the parser emits it.
pub fn push_tokens(bytes: &[u8]) -> Result<Vec<ScriptToken>, ParseError> {
    let mut tokens = calculate_push_op(bytes)?;
    if !bytes.is_empty() {
        tokens.push(ScriptToken::Constant(bytes.to_vec()));
    }
    Ok(tokens)
}

/// Dedicated opcode for `-1..=16`, otherwise a number token.
pub fn minimal_script_number_representation(n: i64) -> ScriptToken {
    match n {
        0 => ScriptToken::Op(all::OP_PUSHBYTES_0),
        -1 => ScriptToken::Op(all::OP_PUSHNUM_NEG1),
        1..=16 => ScriptToken::Op(Opcode::from(all::OP_PUSHNUM_1.to_u8() + n as u8 - 1)),
        _ => ScriptToken::Number(n),
    }
}

pub fn is_compressed_pub_key(key: &[u8]) -> bool {
    key.len() == 33 && matches!(key[0], 0x02 | 0x03)
}

pub fn is_compressed_or_uncompressed_pub_key(key: &[u8]) -> bool {
    match key.first() {
        _ if key.len() < 33 => false,
        Some(0x04) => key.len() == 65,
        Some(0x02 | 0x03) => key.len() == 33,
        _ => false,
    }
}

/// Public-key encoding rules selected by `flags`.
pub fn check_pub_key_encoding(
    key: &[u8],
    flags: ScriptFlags,
    sig_version: SigVersion,
) -> Result<(), ScriptError> {
    if flags.contains(VERIFY_STRICTENC) && !is_compressed_or_uncompressed_pub_key(key) {
        return Err(ScriptError::PubkeyType);
    }
    if flags.contains(VERIFY_WITNESS_PUBKEYTYPE)
        && sig_version == SigVersion::WitnessV0
        && !is_compressed_pub_key(key)
    {
        return Err(ScriptError::WitnessPubkeyType);
    }
    Ok(())
}

pub fn is_valid_pub_key_encoding(key: &[u8], flags: ScriptFlags, sig_version: SigVersion) -> bool {
    check_pub_key_encoding(key, flags, sig_version).is_ok()
}

/// Removes every canonical push of `sig` from `tokens` (Core's
/// `FindAndDelete(script, CScript() << sig)`).
pub fn remove_signature_from_script(sig: &[u8], tokens: &[ScriptToken]) -> Vec<ScriptToken> {
    find_and_delete(tokens, sig).0
}

/// Applies [`remove_signature_from_script`] for each signature in turn.
pub fn remove_signatures_from_script<S: AsRef<[u8]>>(
    sigs: &[S],
    tokens: &[ScriptToken],
) -> Vec<ScriptToken> {
    sigs.iter().fold(tokens.to_vec(), |script, sig| {
        remove_signature_from_script(sig.as_ref(), &script)
    })
}

/// Returns the filtered script and the number of removed occurrences.
pub(crate) fn find_and_delete(tokens: &[ScriptToken], sig: &[u8]) -> (Vec<ScriptToken>, usize) {
    let Ok(pattern) = push_tokens(sig) else {
        return (tokens.to_vec(), 0);
    };

    let mut result = Vec::with_capacity(tokens.len());
    let mut found = 0usize;
    let mut index = 0usize;
    while index < tokens.len() {
        if tokens[index..].starts_with(&pattern) {
            index += pattern.len();
            found += 1;
        } else {
            result.push(tokens[index].clone());
            index += 1;
        }
    }
    (result, found)
}
