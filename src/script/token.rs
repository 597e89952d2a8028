use core::fmt;
use core::hash::{Hash, Hasher};
use std::borrow::Cow;

use bitcoin::hex::DisplayHex;
use bitcoin::opcodes::{all, Opcode};

use super::num::encode_num;

/// One decoded unit of a script.
///
/// Parsed scripts only hold `Op` and `Constant` tokens: every opcode byte is an
/// `Op`, and push payloads (plus the explicit length field of the PUSHDATA
/// forms) are `Constant`s. `Number` is produced by the interpreter for values
/// it computes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptToken {
    Op(Opcode),
    Constant(Vec<u8>),
    Number(i64),
}

impl ScriptToken {
    /// Raw script encoding of this token.
    pub fn bytes(&self) -> Cow<'_, [u8]> {
        match self {
            ScriptToken::Op(op) => Cow::Owned(vec![op.to_u8()]),
            ScriptToken::Constant(data) => Cow::Borrowed(data),
            ScriptToken::Number(n) => Cow::Owned(encode_num(*n)),
        }
    }

    /// The value this token contributes when it sits on the stack.
    ///
    /// Small-number operations evaluate to their number, everything else to its
    /// own encoding.
    pub fn stack_bytes(&self) -> Cow<'_, [u8]> {
        match self.small_number() {
            Some(n) => Cow::Owned(encode_num(n)),
            None => self.bytes(),
        }
    }

    pub fn hex(&self) -> String {
        self.bytes().to_lower_hex_string()
    }

    pub fn opcode(&self) -> Option<Opcode> {
        match self {
            ScriptToken::Op(op) => Some(*op),
            _ => None,
        }
    }

    /// Largest payload a push-length operation can announce.
    pub fn max_push_len(&self) -> Option<u64> {
        let code = self.opcode()?.to_u8();
        match code {
            0x01..=0x4b => Some(code as u64),
            0x4c => Some(u8::MAX as u64),
            0x4d => Some(u16::MAX as u64),
            0x4e => Some(u32::MAX as u64),
            _ => None,
        }
    }

    /// True for `OP_PUSHBYTES_1..=75` and the three PUSHDATA forms.
    pub fn is_push_length_op(&self) -> bool {
        self.max_push_len().is_some()
    }

    /// Value of `OP_0`, `OP_1NEGATE` and `OP_1..=OP_16`.
    pub fn small_number(&self) -> Option<i64> {
        let op = self.opcode()?;
        match op {
            all::OP_PUSHBYTES_0 => Some(0),
            all::OP_PUSHNUM_NEG1 => Some(-1),
            _ => decode_op_n(op),
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, ScriptToken::Constant(_))
    }
}

/// `OP_1..=OP_16` to their value.
pub(crate) fn decode_op_n(op: Opcode) -> Option<i64> {
    let code = op.to_u8();
    if (all::OP_PUSHNUM_1.to_u8()..=all::OP_PUSHNUM_16.to_u8()).contains(&code) {
        Some((code - all::OP_PUSHNUM_1.to_u8() + 1) as i64)
    } else {
        None
    }
}

impl Hash for ScriptToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            ScriptToken::Op(op) => op.to_u8().hash(state),
            ScriptToken::Constant(data) => data.hash(state),
            ScriptToken::Number(n) => n.hash(state),
        }
    }
}

impl From<Opcode> for ScriptToken {
    fn from(op: Opcode) -> Self {
        ScriptToken::Op(op)
    }
}

impl fmt::Display for ScriptToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptToken::Op(op) => write!(f, "{op}"),
            ScriptToken::Constant(data) if data.is_empty() => f.write_str("<>"),
            ScriptToken::Constant(data) => write!(f, "<{}>", data.as_hex()),
            ScriptToken::Number(n) => write!(f, "{n}"),
        }
    }
}
