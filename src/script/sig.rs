//! ECDSA signature encoding rules (BIP66 strict DER, BIP62 low-S, STRICTENC
//! hash types).
//!
//! All functions take the signature as it appears on the stack, with the
//! trailing hash-type byte.

use bitcoin::secp256k1::ecdsa::Signature as EcdsaSignature;

use super::{ScriptError, ScriptFlags};
use crate::{VERIFY_DERSIG, VERIFY_LOW_S, VERIFY_STRICTENC};

const SIGHASH_ANYONECANPAY: u8 = 0x80;

/// Strict DER check of a signature including its hash-type byte.
///
/// Format: `0x30 [total-len] 0x02 [R-len] [R] 0x02 [S-len] [S] [sighash]`,
/// with minimally encoded, non-negative R and S.
pub fn is_valid_signature_encoding(sig: &[u8]) -> bool {
    if sig.len() < 9 || sig.len() > 73 {
        return false;
    }
    if sig[0] != 0x30 || sig[1] as usize != sig.len() - 3 {
        return false;
    }

    let len_r = sig[3] as usize;
    if 5 + len_r >= sig.len() {
        return false;
    }
    let len_s = sig[5 + len_r] as usize;
    if len_r + len_s + 7 != sig.len() {
        return false;
    }

    if sig[2] != 0x02 || len_r == 0 || sig[4] & 0x80 != 0 {
        return false;
    }
    if len_r > 1 && sig[4] == 0x00 && sig[5] & 0x80 == 0 {
        return false;
    }

    if sig[len_r + 4] != 0x02 || len_s == 0 || sig[len_r + 6] & 0x80 != 0 {
        return false;
    }
    !(len_s > 1 && sig[len_r + 6] == 0x00 && sig[len_r + 7] & 0x80 == 0)
}

/// True when S is at most half the curve order.
pub fn is_low_der_signature(sig: &[u8]) -> bool {
    if !is_valid_signature_encoding(sig) {
        return false;
    }
    let Ok(signature) = EcdsaSignature::from_der_lax(&sig[..sig.len() - 1]) else {
        return false;
    };
    let mut normalized = signature;
    normalized.normalize_s();
    normalized == signature
}

/// Hash type is one of ALL, NONE or SINGLE, optionally with ANYONECANPAY.
pub fn is_defined_hashtype_signature(sig: &[u8]) -> bool {
    let Some(&hash_type) = sig.last() else {
        return false;
    };
    matches!(hash_type & !SIGHASH_ANYONECANPAY, 0x01..=0x03)
}

/// Applies the signature encoding rules selected by `flags`.
///
/// The empty signature is always acceptable: it is the canonical way to
/// provide a deliberately failing signature.
pub fn check_signature_encoding(sig: &[u8], flags: ScriptFlags) -> Result<(), ScriptError> {
    if sig.is_empty() {
        return Ok(());
    }
    if flags.intersects(VERIFY_DERSIG | VERIFY_LOW_S | VERIFY_STRICTENC)
        && !is_valid_signature_encoding(sig)
    {
        return Err(ScriptError::SigDer);
    }
    if flags.contains(VERIFY_LOW_S) && !is_low_der_signature(sig) {
        return Err(ScriptError::SigHighS);
    }
    if flags.contains(VERIFY_STRICTENC) && !is_defined_hashtype_signature(sig) {
        return Err(ScriptError::SigHashType);
    }
    Ok(())
}
