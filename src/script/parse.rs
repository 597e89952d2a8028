//! Byte codecs for token sequences.

use bitcoin::opcodes::{all, Opcode};
use bitcoin::ScriptBuf;

use super::{ParseError, ScriptToken};

/// Decodes `bytes`, failing on a truncated push.
pub fn parse_script(bytes: &[u8]) -> Result<Vec<ScriptToken>, ParseError> {
    let (tokens, tail) = parse_lossy(bytes);
    match tail {
        None => Ok(tokens),
        Some(tail) => Err(ParseError::TruncatedPush {
            position: bytes.len() - tail.len(),
        }),
    }
}

/// Decodes the well-formed prefix of `bytes`.
///
/// The second element is the undecodable remainder, starting at the push
/// whose payload runs past the end of the script.
pub fn parse_lossy(bytes: &[u8]) -> (Vec<ScriptToken>, Option<Vec<u8>>) {
    let mut tokens = Vec::new();
    let mut cursor = 0usize;

    while cursor < bytes.len() {
        let op = Opcode::from(bytes[cursor]);
        match read_push(bytes, cursor) {
            Push::None => {
                tokens.push(ScriptToken::Op(op));
                cursor += 1;
            }
            Push::Direct { data, next } => {
                tokens.push(ScriptToken::Op(op));
                tokens.push(ScriptToken::Constant(data.to_vec()));
                cursor = next;
            }
            Push::Prefixed { len_field, data, next } => {
                tokens.push(ScriptToken::Op(op));
                tokens.push(ScriptToken::Constant(len_field.to_vec()));
                tokens.push(ScriptToken::Constant(data.to_vec()));
                cursor = next;
            }
            Push::Truncated => return (tokens, Some(bytes[cursor..].to_vec())),
        }
    }

    (tokens, None)
}

enum Push<'a> {
    None,
    Direct { data: &'a [u8], next: usize },
    Prefixed { len_field: &'a [u8], data: &'a [u8], next: usize },
    Truncated,
}

fn read_push(bytes: &[u8], cursor: usize) -> Push<'_> {
    let code = bytes[cursor];
    let width = match code {
        0x01..=0x4b => {
            let start = cursor + 1;
            let end = start + code as usize;
            return match bytes.get(start..end) {
                Some(data) => Push::Direct { data, next: end },
                None => Push::Truncated,
            };
        }
        0x4c => 1,
        0x4d => 2,
        0x4e => 4,
        _ => return Push::None,
    };

    let Some(len_field) = bytes.get(cursor + 1..cursor + 1 + width) else {
        return Push::Truncated;
    };
    let len = len_field
        .iter()
        .rev()
        .fold(0usize, |acc, &byte| (acc << 8) | byte as usize);
    let start = cursor + 1 + width;
    let data = start.checked_add(len).and_then(|end| bytes.get(start..end));
    match data {
        Some(data) => Push::Prefixed {
            len_field,
            data,
            next: start + data.len(),
        },
        None => Push::Truncated,
    }
}

/// Concatenates the byte encodings of `tokens`.
pub fn serialize_tokens(tokens: &[ScriptToken]) -> Vec<u8> {
    let mut out = Vec::with_capacity(tokens.len() * 2);
    for token in tokens {
        out.extend_from_slice(&token.bytes());
    }
    out
}

pub fn tokens_to_script(tokens: &[ScriptToken]) -> ScriptBuf {
    ScriptBuf::from_bytes(serialize_tokens(tokens))
}

/// Human-readable rendering in the style of `bitcoin-cli decodescript`.
///
/// Push opcodes fold into their payload (`<hex>`, `<>` when empty); a
/// PUSHDATA form is prefixed with its opcode so non-canonical pushes stay
/// visible.
pub fn to_asm(tokens: &[ScriptToken]) -> String {
    let mut words = Vec::with_capacity(tokens.len());
    let mut index = 0;
    while let Some(token) = tokens.get(index) {
        let op = token.opcode();
        match op.and_then(pushdata_width) {
            Some(_) => {
                words.push(token.to_string());
                index += 2;
            }
            None if token.is_push_length_op() => index += 1,
            None => {
                words.push(token.to_string());
                index += 1;
                continue;
            }
        }
        match tokens.get(index) {
            Some(payload) => words.push(payload.to_string()),
            None => words.push("[error]".to_owned()),
        }
        index += 1;
    }
    words.join(" ")
}

/// Widths of the PUSHDATA length field, keyed by opcode.
pub(crate) fn pushdata_width(op: Opcode) -> Option<usize> {
    match op {
        all::OP_PUSHDATA1 => Some(1),
        all::OP_PUSHDATA2 => Some(2),
        all::OP_PUSHDATA4 => Some(4),
        _ => None,
    }
}
