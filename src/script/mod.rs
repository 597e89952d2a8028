//! Token-level Bitcoin Script machinery.
//!
//! Scripts are decoded into [`ScriptToken`] sequences, executed by threading a
//! [`ScriptProgram`] through opcode evaluators, and, for signature checks,
//! rewritten by the [`preimage`] deriver into the script code that is hashed.

mod arithmetic;
mod checker;
mod control;
mod crypto;
mod error;
mod flags;
pub mod interpreter;
pub mod num;
mod parse;
pub mod preimage;
mod program;
pub mod sig;
pub mod stack;
mod token;
pub mod util;

pub use checker::{NullSignatureChecker, SignatureChecker, TransactionSignatureChecker};
pub use error::{ContractViolation, ParseError, ScriptError};
pub use flags::{ParseFlagsError, ScriptFlags};
pub use interpreter::{evaluate, step, verify_input, verify_script};
pub use parse::{parse_lossy, parse_script, serialize_tokens, to_asm, tokens_to_script};
pub use preimage::{
    remove_op_code_separator, script_for_checking, script_for_signing, sig_version,
    OutputScriptKind, ScriptSigKind, SigVersion, SignatureCheckContext,
};
pub use program::{ScriptProgram, Validity};
pub use token::ScriptToken;

/// Maximum number of bytes a script may contain.
pub const MAX_SCRIPT_SIZE: usize = 10_000;
/// Maximum number of bytes pushable to the stack.
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;
/// Maximum number of non-push operations per script.
pub const MAX_OPS_PER_SCRIPT: usize = 201;
/// Maximum combined number of elements on the stack and alt-stack.
pub const MAX_STACK_SIZE: usize = 1000;
/// Maximum number of public keys per multisig.
pub const MAX_PUBKEYS_PER_MULTISIG: usize = 20;
/// Threshold for `nLockTime`: below this value it is interpreted as a block
/// height, otherwise as a UNIX timestamp.
pub const LOCKTIME_THRESHOLD: i64 = 500_000_000;
/// Setting this bit in an input's sequence disables its relative lock-time.
pub const SEQUENCE_LOCKTIME_DISABLE_FLAG: i64 = 1 << 31;
/// If set, the relative lock-time is measured in units of 512 seconds.
pub const SEQUENCE_LOCKTIME_TYPE_FLAG: i64 = 1 << 22;
/// Mask extracting the relative lock-time value from a sequence.
pub const SEQUENCE_LOCKTIME_MASK: i64 = 0x0000_ffff;
