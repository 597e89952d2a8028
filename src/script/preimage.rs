//! Derivation of the script code a signature commits to.
//!
//! Given the spend being verified this resolves which signature-hash scheme
//! applies and which tokens end up in the preimage: the P2SH redeem script for
//! legacy wrapped spends, a rebuilt script for witness v0 programs, minus any
//! signature being checked (`FindAndDelete`) and anything before the last
//! executed OP_CODESEPARATOR.

use bitcoin::hashes::{sha256, Hash};
use bitcoin::opcodes::{all, Opcode};
use bitcoin::{ScriptBuf, Transaction, Witness};
use tracing::debug;

use super::token::decode_op_n;
use super::util::{
    find_and_delete, is_push_only, remove_signature_from_script, remove_signatures_from_script,
};
use super::{parse_script, serialize_tokens, ScriptError, ScriptProgram, ScriptToken};
use crate::Error;

/// Signature-hash scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigVersion {
    /// Legacy `SignatureHash`, also used inside P2SH.
    Base,
    /// BIP143 digest for witness v0 programs.
    WitnessV0,
}

/// Shapes of the output script being spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputScriptKind {
    PubKey,
    PubKeyHash,
    ScriptHash,
    Multisig,
    WitnessV0KeyHash,
    WitnessV0ScriptHash,
    /// Any other witness program, including v0 with an unexpected length.
    WitnessUnknown,
    /// A CHECKLOCKTIMEVERIFY or CHECKSEQUENCEVERIFY prefix guarding a script.
    LockTime,
    NullData,
    Empty,
    NonStandard,
}

impl OutputScriptKind {
    pub fn classify(tokens: &[ScriptToken]) -> Self {
        use ScriptToken::{Constant, Op};

        if let Some((version, program)) = witness_program(tokens) {
            return match (version, program.len()) {
                (0, 20) => OutputScriptKind::WitnessV0KeyHash,
                (0, 32) => OutputScriptKind::WitnessV0ScriptHash,
                _ => OutputScriptKind::WitnessUnknown,
            };
        }

        match tokens {
            [] => OutputScriptKind::Empty,
            [Op(all::OP_RETURN), ..] => OutputScriptKind::NullData,
            [Op(all::OP_HASH160), Op(all::OP_PUSHBYTES_20), Constant(_), Op(all::OP_EQUAL)] => {
                OutputScriptKind::ScriptHash
            }
            [
                Op(all::OP_DUP),
                Op(all::OP_HASH160),
                Op(all::OP_PUSHBYTES_20),
                Constant(_),
                Op(all::OP_EQUALVERIFY),
                Op(all::OP_CHECKSIG),
            ] => OutputScriptKind::PubKeyHash,
            [Op(_), Constant(key), Op(all::OP_CHECKSIG)] if looks_like_pub_key(key) => {
                OutputScriptKind::PubKey
            }
            [Op(_), Constant(_), Op(all::OP_CLTV | all::OP_CSV), Op(all::OP_DROP), ..]
            | [Op(_), Op(all::OP_CLTV | all::OP_CSV), Op(all::OP_DROP), ..] => {
                OutputScriptKind::LockTime
            }
            _ if is_multisig(tokens) => OutputScriptKind::Multisig,
            _ => OutputScriptKind::NonStandard,
        }
    }

    pub fn is_witness(self) -> bool {
        matches!(
            self,
            OutputScriptKind::WitnessV0KeyHash
                | OutputScriptKind::WitnessV0ScriptHash
                | OutputScriptKind::WitnessUnknown
        )
    }
}

/// Shapes of the scriptSig spending an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptSigKind {
    PubKey,
    PubKeyHash,
    ScriptHash,
    Multisig,
    Empty,
    NonStandard,
}

impl ScriptSigKind {
    /// Classifies `tokens` as a spend of an output of kind `spent`.
    pub fn classify(tokens: &[ScriptToken], spent: OutputScriptKind) -> Self {
        if tokens.is_empty() {
            return ScriptSigKind::Empty;
        }
        let Some(values) = pushed_values(tokens) else {
            return ScriptSigKind::NonStandard;
        };
        if spent == OutputScriptKind::ScriptHash {
            return ScriptSigKind::ScriptHash;
        }
        match values.as_slice() {
            [sig] if looks_like_signature(sig) => ScriptSigKind::PubKey,
            [sig, key] if looks_like_signature(sig) && looks_like_pub_key(key) => {
                ScriptSigKind::PubKeyHash
            }
            [dummy, sigs @ ..]
                if dummy.is_empty()
                    && !sigs.is_empty()
                    && sigs.iter().all(|s| looks_like_signature(s)) =>
            {
                ScriptSigKind::Multisig
            }
            _ => ScriptSigKind::NonStandard,
        }
    }
}

/// Everything needed to work out the preimage of one signature check.
#[derive(Debug, Clone)]
pub struct SignatureCheckContext<'a> {
    pub transaction: &'a Transaction,
    pub input_index: usize,
    /// The output script claimed to be spent.
    pub output_script: &'a [ScriptToken],
    pub witness: &'a Witness,
    /// Last push of the scriptSig, when the output is P2SH.
    pub redeem_script: Option<Vec<ScriptToken>>,
    pub sig_version: SigVersion,
}

impl<'a> SignatureCheckContext<'a> {
    pub fn new(
        transaction: &'a Transaction,
        input_index: usize,
        output_script: &'a [ScriptToken],
    ) -> Result<Self, Error> {
        let input = transaction.input.get(input_index).ok_or(Error::ERR_TX_INDEX)?;
        let spent = OutputScriptKind::classify(output_script);
        let redeem_script = if spent == OutputScriptKind::ScriptHash {
            redeem_script(input.script_sig.as_bytes())
        } else {
            None
        };
        Ok(Self {
            transaction,
            input_index,
            output_script,
            witness: &input.witness,
            redeem_script,
            sig_version: sig_version(transaction, output_script, input_index),
        })
    }

    fn script_sig(&self) -> Vec<ScriptToken> {
        self.transaction
            .input
            .get(self.input_index)
            .and_then(|input| parse_script(input.script_sig.as_bytes()).ok())
            .unwrap_or_default()
    }
}

/// Selects the signature-hash scheme for spending `output_script`.
///
/// P2SH outputs are unwrapped one level through the input's redeem script.
pub fn sig_version(
    tx: &Transaction,
    output_script: &[ScriptToken],
    input_index: usize,
) -> SigVersion {
    match OutputScriptKind::classify(output_script) {
        kind if kind.is_witness() => SigVersion::WitnessV0,
        OutputScriptKind::ScriptHash => {
            let redeem = tx
                .input
                .get(input_index)
                .and_then(|input| redeem_script(input.script_sig.as_bytes()));
            match redeem {
                Some(redeem) if OutputScriptKind::classify(&redeem).is_witness() => {
                    SigVersion::WitnessV0
                }
                _ => SigVersion::Base,
            }
        }
        _ => SigVersion::Base,
    }
}

/// Script whose tokens a signature in this context commits to.
///
/// For P2SH spends the redeem script is returned with the scriptSig's
/// signature-shaped pushes removed; non-signature pushes are kept.
pub fn script_for_signing(
    ctx: &SignatureCheckContext<'_>,
) -> Result<Vec<ScriptToken>, ScriptError> {
    let script_sig = ctx.script_sig();
    let spent = OutputScriptKind::classify(ctx.output_script);
    let sig_kind = ScriptSigKind::classify(&script_sig, spent);

    match (ctx.sig_version, sig_kind) {
        (SigVersion::Base, ScriptSigKind::ScriptHash) => {
            let Some(redeem) = ctx.redeem_script.as_deref() else {
                return Ok(ctx.output_script.to_vec());
            };
            let signatures = script_sig_signatures(&script_sig);
            debug!(signatures = signatures.len(), "signing against P2SH redeem script");
            Ok(remove_signatures_from_script(&signatures, redeem))
        }
        (SigVersion::Base, _) => Ok(ctx.output_script.to_vec()),
        (SigVersion::WitnessV0, ScriptSigKind::ScriptHash) => {
            let program = ctx
                .redeem_script
                .as_deref()
                .and_then(witness_program)
                .ok_or(ScriptError::WitnessProgramMismatch)?;
            let rebuilt = rebuild_witness_script(program.0, program.1, ctx.witness)?;
            if OutputScriptKind::classify(&rebuilt) == OutputScriptKind::ScriptHash {
                let signatures: Vec<&[u8]> =
                    ctx.witness.iter().filter(|item| looks_like_signature(item)).collect();
                Ok(remove_signatures_from_script(&signatures, &rebuilt))
            } else {
                Ok(rebuilt)
            }
        }
        (SigVersion::WitnessV0, _) => match witness_program(ctx.output_script) {
            Some((0, program)) => rebuild_witness_script(0, program, ctx.witness),
            Some(_) => Ok(ctx.output_script.to_vec()),
            None => Ok(ctx.output_script.to_vec()),
        },
    }
}

/// [`script_for_signing`] without the signature under test.
pub fn script_for_checking(
    ctx: &SignatureCheckContext<'_>,
    sig: &[u8],
) -> Result<Vec<ScriptToken>, ScriptError> {
    Ok(remove_signature_from_script(sig, &script_for_signing(ctx)?))
}

/// Original script from just after the last executed OP_CODESEPARATOR.
pub fn remove_op_code_separator(program: &ScriptProgram) -> Vec<ScriptToken> {
    let start = program.last_code_separator().map_or(0, |index| index + 1);
    program.original_script().get(start..).unwrap_or_default().to_vec()
}

/// Serialized script code handed to the signature hash.
///
/// Legacy hashing drops OP_CODESEPARATOR opcodes; BIP143 keeps them.
pub fn script_code_bytes(tokens: &[ScriptToken], sig_version: SigVersion) -> ScriptBuf {
    let bytes = match sig_version {
        SigVersion::Base => {
            let kept: Vec<ScriptToken> = tokens
                .iter()
                .filter(|token| token.opcode() != Some(all::OP_CODESEPARATOR))
                .cloned()
                .collect();
            serialize_tokens(&kept)
        }
        SigVersion::WitnessV0 => serialize_tokens(tokens),
    };
    ScriptBuf::from_bytes(bytes)
}

/// Script code for a signature check running inside `program`.
///
/// Returns the script and how many signature pushes were removed from it.
pub(crate) fn script_code_for(program: &ScriptProgram, sigs: &[&[u8]]) -> (ScriptBuf, usize) {
    let mut tokens = remove_op_code_separator(program);
    let mut found = 0;
    if program.sig_version() == SigVersion::Base {
        for sig in sigs {
            let (filtered, removed) = find_and_delete(&tokens, sig);
            tokens = filtered;
            found += removed;
        }
    }
    let mut script = script_code_bytes(&tokens, program.sig_version()).into_bytes();
    if let Some(tail) = program.unparsed_tail() {
        script.extend_from_slice(tail);
    }
    (ScriptBuf::from_bytes(script), found)
}

/// `(version, program)` of a witness program output.
pub fn witness_program(tokens: &[ScriptToken]) -> Option<(u8, &[u8])> {
    match tokens {
        [ScriptToken::Op(version), ScriptToken::Op(push), ScriptToken::Constant(program)]
            if (2..=40).contains(&program.len()) && push.to_u8() as usize == program.len() =>
        {
            let version = match *version {
                all::OP_PUSHBYTES_0 => 0,
                other => decode_op_n(other)? as u8,
            };
            Some((version, program.as_slice()))
        }
        _ => None,
    }
}

/// Script executed for a witness v0 program.
pub(crate) fn rebuild_witness_script(
    version: u8,
    program: &[u8],
    witness: &Witness,
) -> Result<Vec<ScriptToken>, ScriptError> {
    if version != 0 {
        return Err(ScriptError::DiscourageUpgradableWitnessProgram);
    }
    match program.len() {
        20 => {
            debug!("rebuilding v0 key-hash program as P2PKH");
            Ok(p2pkh_tokens(program))
        }
        32 => {
            let witness_script = witness.last().ok_or(ScriptError::WitnessProgramWitnessEmpty)?;
            if sha256::Hash::hash(witness_script).as_byte_array()[..] != *program {
                return Err(ScriptError::WitnessProgramMismatch);
            }
            debug!(len = witness_script.len(), "using v0 witness script");
            parse_script(witness_script).map_err(|_| ScriptError::BadOpcode)
        }
        _ => Err(ScriptError::WitnessProgramWrongLength),
    }
}

pub(crate) fn p2pkh_tokens(key_hash: &[u8]) -> Vec<ScriptToken> {
    let mut tokens = vec![ScriptToken::Op(all::OP_DUP), ScriptToken::Op(all::OP_HASH160)];
    tokens.push(ScriptToken::Op(Opcode::from(key_hash.len() as u8)));
    tokens.push(ScriptToken::Constant(key_hash.to_vec()));
    tokens.push(ScriptToken::Op(all::OP_EQUALVERIFY));
    tokens.push(ScriptToken::Op(all::OP_CHECKSIG));
    tokens
}

/// Redeem script of a P2SH scriptSig: its last pushed element.
fn redeem_script(script_sig: &[u8]) -> Option<Vec<ScriptToken>> {
    let tokens = parse_script(script_sig).ok()?;
    let values = pushed_values(&tokens)?;
    parse_script(values.last()?).ok()
}

/// Stack elements pushed by a push-only script, bottom first.
fn pushed_values(tokens: &[ScriptToken]) -> Option<Vec<Vec<u8>>> {
    if !is_push_only(tokens) {
        return None;
    }
    let mut values = Vec::new();
    let mut index = 0;
    while let Some(token) = tokens.get(index) {
        if token.is_push_length_op() {
            let pushdata = matches!(
                token.opcode(),
                Some(all::OP_PUSHDATA1 | all::OP_PUSHDATA2 | all::OP_PUSHDATA4)
            );
            let skip = if pushdata { 2 } else { 1 };
            values.push(tokens.get(index + skip)?.bytes().into_owned());
            index += skip + 1;
        } else {
            values.push(token.stack_bytes().into_owned());
            index += 1;
        }
    }
    Some(values)
}

/// Push payloads of a P2SH scriptSig that look like signatures, excluding the
/// redeem script.
///
/// Only DER-shaped pushes (`0x30` lead byte, 9 to 73 bytes) are returned, so
/// other data the scriptSig shares with the redeem script stays in the signed
/// script. This is narrower than Core, which deletes exactly the signature
/// being checked; [`script_for_checking`] applies that per-signature removal.
fn script_sig_signatures(script_sig: &[ScriptToken]) -> Vec<Vec<u8>> {
    let mut values = pushed_values(script_sig).unwrap_or_default();
    values.pop();
    values.retain(|value| looks_like_signature(value));
    values
}

fn looks_like_signature(bytes: &[u8]) -> bool {
    bytes.first() == Some(&0x30) && (9..=73).contains(&bytes.len())
}

fn looks_like_pub_key(bytes: &[u8]) -> bool {
    matches!((bytes.first(), bytes.len()), (Some(0x02 | 0x03), 33) | (Some(0x04 | 0x06 | 0x07), 65))
}

/// `OP_m <key>... OP_n OP_CHECKMULTISIG(VERIFY)` with `1 <= m <= n`.
fn is_multisig(tokens: &[ScriptToken]) -> bool {
    let [ScriptToken::Op(required), keys @ .., ScriptToken::Op(total), ScriptToken::Op(check)] =
        tokens
    else {
        return false;
    };
    if *check != all::OP_CHECKMULTISIG && *check != all::OP_CHECKMULTISIGVERIFY {
        return false;
    }
    let (Some(m), Some(n)) = (decode_op_n(*required), decode_op_n(*total)) else {
        return false;
    };
    let Some(keys) = pushed_values(keys) else {
        return false;
    };
    m <= n && keys.len() as i64 == n && keys.iter().all(|key| looks_like_pub_key(key))
}
