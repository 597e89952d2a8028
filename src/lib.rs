//! Bitcoin Script execution matching Bitcoin Core's consensus rules.
//!
//! Scripts are interpreted at the token level: [`script::parse_script`] decodes
//! raw bytes into [`script::ScriptToken`]s, [`script::evaluate`] threads a
//! [`script::ScriptProgram`] through the opcode evaluators, and the functions
//! in this module expose the whole scriptSig / scriptPubKey / witness check
//! through the familiar `libbitcoinconsensus` entry points.

pub mod script;
mod tx;

pub use script::{ScriptError, ScriptFlags};
pub use tx::TransactionContext;

use bitcoin::{Amount, Script};
use thiserror::Error;

/// Do not enable any verification.
pub const VERIFY_NONE: u32 = 0;
/// Evaluate P2SH (BIP16) subscripts.
pub const VERIFY_P2SH: u32 = 1 << 0;
/// Enforce strict ECDSA encoding (BIP62).
pub const VERIFY_STRICTENC: u32 = 1 << 1;
/// Enforce strict DER (BIP66) compliance.
pub const VERIFY_DERSIG: u32 = 1 << 2;
/// Require signatures to use low-S form (BIP62).
pub const VERIFY_LOW_S: u32 = 1 << 3;
/// Enforce NULLDUMMY (BIP147).
pub const VERIFY_NULLDUMMY: u32 = 1 << 4;
/// Require scriptSig to be push only.
pub const VERIFY_SIGPUSHONLY: u32 = 1 << 5;
/// Require minimal data encodings (BIP62).
pub const VERIFY_MINIMALDATA: u32 = 1 << 6;
/// Discourage use of upgradable NOP opcodes.
pub const VERIFY_DISCOURAGE_UPGRADABLE_NOPS: u32 = 1 << 7;
/// Require a clean stack after evaluation.
pub const VERIFY_CLEANSTACK: u32 = 1 << 8;
/// Enable CHECKLOCKTIMEVERIFY (BIP65).
pub const VERIFY_CHECKLOCKTIMEVERIFY: u32 = 1 << 9;
/// Enable CHECKSEQUENCEVERIFY (BIP112).
pub const VERIFY_CHECKSEQUENCEVERIFY: u32 = 1 << 10;
/// Enable WITNESS (BIP141).
pub const VERIFY_WITNESS: u32 = 1 << 11;
/// Discourage unknown witness program versions (policy).
pub const VERIFY_DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM: u32 = 1 << 12;
/// Require minimal encodings for IF/NOTIF arguments in witness v0 scripts.
pub const VERIFY_MINIMALIF: u32 = 1 << 13;
/// Enforce NULLFAIL behaviour (BIP146).
pub const VERIFY_NULLFAIL: u32 = 1 << 14;
/// Require compressed pubkeys in segwit v0 contexts.
pub const VERIFY_WITNESS_PUBKEYTYPE: u32 = 1 << 15;
/// Reject OP_CODESEPARATOR and FindAndDelete hits in legacy scripts.
pub const VERIFY_CONST_SCRIPTCODE: u32 = 1 << 16;

/// Aggregate of all soft-fork flags prior to Taproot activation.
pub const VERIFY_ALL_PRE_TAPROOT: u32 = VERIFY_P2SH
    | VERIFY_DERSIG
    | VERIFY_NULLDUMMY
    | VERIFY_CHECKLOCKTIMEVERIFY
    | VERIFY_CHECKSEQUENCEVERIFY
    | VERIFY_WITNESS;

/// Consensus flags in force at `height` on Bitcoin mainnet.
pub fn height_to_flags(height: u32) -> u32 {
    let mut flag = VERIFY_NONE;

    if height >= 173_805 {
        flag |= VERIFY_P2SH;
    }
    if height >= 363_725 {
        flag |= VERIFY_DERSIG;
    }
    if height >= 388_381 {
        flag |= VERIFY_CHECKLOCKTIMEVERIFY;
    }
    if height >= 419_328 {
        flag |= VERIFY_CHECKSEQUENCEVERIFY;
    }
    if height >= 481_824 {
        flag |= VERIFY_NULLDUMMY | VERIFY_WITNESS;
    }

    flag
}

/// `libbitcoinconsensus` API version the entry points below follow.
pub const CONSENSUS_VERSION: u32 = 1;

pub fn version() -> u32 {
    CONSENSUS_VERSION
}

/// Detailed failure information returned by the diagnostic verification APIs.
///
/// `script_error` is [`ScriptError::Ok`] when verification never reached the
/// interpreter, e.g. because the transaction failed to decode.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ScriptFailure {
    /// High-level error code compatible with `libbitcoinconsensus`.
    pub error: Error,
    /// Detailed interpreter error, mirroring Bitcoin Core's `ScriptError`.
    pub script_error: ScriptError,
}

/// Verifies input `input_index` of `spending_transaction` against the output
/// it spends, using every pre-Taproot soft fork.
pub fn verify(
    spent_output: &[u8],
    amount: u64,
    spending_transaction: &[u8],
    input_index: usize,
) -> Result<(), Error> {
    verify_with_flags(
        spent_output,
        amount,
        spending_transaction,
        input_index,
        VERIFY_ALL_PRE_TAPROOT,
    )
}

/// Same as [`verify`] but also reports the interpreter's `ScriptError`.
pub fn verify_with_details(
    spent_output: &[u8],
    amount: u64,
    spending_transaction: &[u8],
    input_index: usize,
) -> Result<(), ScriptFailure> {
    perform_verification(
        spent_output,
        amount,
        spending_transaction,
        input_index,
        VERIFY_ALL_PRE_TAPROOT,
    )
}

/// Same as [`verify`] but with explicit script verification flags.
pub fn verify_with_flags(
    spent_output_script: &[u8],
    amount: u64,
    spending_transaction: &[u8],
    input_index: usize,
    flags: u32,
) -> Result<(), Error> {
    perform_verification(
        spent_output_script,
        amount,
        spending_transaction,
        input_index,
        flags,
    )
    .map_err(|failure| failure.error)
}

/// Same as [`verify_with_flags`] but also reports the interpreter's `ScriptError`.
pub fn verify_with_flags_detailed(
    spent_output_script: &[u8],
    amount: u64,
    spending_transaction: &[u8],
    input_index: usize,
    flags: u32,
) -> Result<(), ScriptFailure> {
    perform_verification(
        spent_output_script,
        amount,
        spending_transaction,
        input_index,
        flags,
    )
}

/// Core's amount-less `verify_script`, usable only for non-witness checks.
pub fn verify_without_amount(
    spent_output_script: &[u8],
    spending_transaction: &[u8],
    input_index: usize,
    flags: u32,
) -> Result<(), Error> {
    if flags & VERIFY_WITNESS != 0 {
        return Err(Error::ERR_AMOUNT_REQUIRED);
    }
    verify_with_flags(spent_output_script, 0, spending_transaction, input_index, flags)
}

fn perform_verification(
    spent_output_script: &[u8],
    amount: u64,
    spending_transaction: &[u8],
    input_index: usize,
    flags: u32,
) -> Result<(), ScriptFailure> {
    let before_script = |error: Error| ScriptFailure {
        error,
        script_error: ScriptError::Ok,
    };

    let flags = ScriptFlags::from_bits(flags).map_err(before_script)?;
    let tx_ctx = TransactionContext::parse(spending_transaction).map_err(before_script)?;
    tx_ctx
        .ensure_input_index(input_index)
        .map_err(before_script)?;

    script::verify_input(
        tx_ctx.tx(),
        input_index,
        Script::from_bytes(spent_output_script),
        Amount::from_sat(amount),
        flags,
    )
    .map_err(|script_error| ScriptFailure {
        error: Error::ERR_SCRIPT,
        script_error,
    })
}

/// Errors returned by the consensus verifier.
///
/// The variants mirror the identifiers exposed by `libbitcoinconsensus`.
#[allow(non_camel_case_types)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Error)]
#[repr(C)]
pub enum Error {
    /// The script failed; also Core's "not set" value.
    #[error("error value was not set (value still 0)")]
    ERR_SCRIPT = 0,
    /// An invalid index for `txTo`.
    #[error("an invalid index for txTo")]
    ERR_TX_INDEX,
    /// `txToLen` did not match with the size of `txTo`.
    #[error("txToLen did not match with the size of txTo")]
    ERR_TX_SIZE_MISMATCH,
    /// An error deserializing `txTo`.
    #[error("an error deserializing txTo")]
    ERR_TX_DESERIALIZE,
    /// Input amount is required if WITNESS is used.
    #[error("input amount is required if WITNESS is used")]
    ERR_AMOUNT_REQUIRED,
    /// Script verification `flags` are invalid.
    #[error("script verification flags are invalid")]
    ERR_INVALID_FLAGS,
}
