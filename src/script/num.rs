//! Script number encoding (`CScriptNum`).
//!
//! Numbers are little-endian sign-magnitude: the high bit of the last byte is
//! the sign, and zero is the empty byte string.

use super::ScriptError;

/// Default maximum operand width for arithmetic opcodes.
pub const SCRIPTNUM_MAX_LEN: usize = 4;
/// Operand width accepted by CHECKLOCKTIMEVERIFY and CHECKSEQUENCEVERIFY.
pub const SCRIPTNUM_MAX_LEN_EXTENDED: usize = 5;

/// Truthiness of a stack element. Negative zero is false.
pub fn cast_to_bool(data: &[u8]) -> bool {
    for (i, &byte) in data.iter().enumerate() {
        if byte != 0 {
            return !(i == data.len() - 1 && byte == 0x80);
        }
    }
    false
}

/// Minimal script-number encoding of `value`.
pub fn encode_num(value: i64) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }

    let negative = value < 0;
    let mut abs_value = value.unsigned_abs();
    let mut result = Vec::with_capacity(9);
    while abs_value > 0 {
        result.push((abs_value & 0xff) as u8);
        abs_value >>= 8;
    }

    // The sign lives in the top bit of the last byte; add a byte if that bit
    // is already taken by the magnitude.
    match result.last_mut() {
        Some(last) if *last & 0x80 != 0 => result.push(if negative { 0x80 } else { 0x00 }),
        Some(last) if negative => *last |= 0x80,
        _ => {}
    }

    result
}

/// Decodes a script number without any width or minimality check.
///
/// Callers bound the width first; anything past eight bytes does not fit.
pub fn decode_num(bytes: &[u8]) -> i64 {
    let Some(&last) = bytes.last() else {
        return 0;
    };

    let mut result: i64 = 0;
    for (i, &byte) in bytes.iter().enumerate().take(8) {
        result |= (byte as i64) << (8 * i);
    }

    if last & 0x80 != 0 {
        let mask = !(0x80i64 << (8 * (bytes.len().min(8) - 1)));
        -(result & mask)
    } else {
        result
    }
}

/// Decodes an operand, enforcing `max_len` and, if requested, minimal encoding.
///
/// Failures map to [`ScriptError::Unknown`], matching Core's handling of
/// `scriptnum_error`.
pub fn parse_scriptnum(
    bytes: &[u8],
    require_minimal: bool,
    max_len: usize,
) -> Result<i64, ScriptError> {
    if bytes.len() > max_len {
        return Err(ScriptError::Unknown);
    }
    if require_minimal && !is_shortest_encoding(bytes) {
        return Err(ScriptError::Unknown);
    }
    Ok(decode_num(bytes))
}

/// BIP62 minimal-number rule.
///
/// The most significant byte may only be `0x00` or `0x80` when it is needed to
/// hold the sign bit of the byte below it. This also rejects negative zero.
pub fn is_shortest_encoding(bytes: &[u8]) -> bool {
    match bytes {
        [] => true,
        [.., last] if last & 0x7f != 0 => true,
        [_] => false,
        [.., second, _] => second & 0x80 != 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_boundary_values() {
        assert_eq!(encode_num(0), Vec::<u8>::new());
        assert_eq!(encode_num(1), vec![0x01]);
        assert_eq!(encode_num(-1), vec![0x81]);
        assert_eq!(encode_num(127), vec![0x7f]);
        assert_eq!(encode_num(128), vec![0x80, 0x00]);
        assert_eq!(encode_num(-128), vec![0x80, 0x80]);
        assert_eq!(encode_num(255), vec![0xff, 0x00]);
        assert_eq!(encode_num(256), vec![0x00, 0x01]);
        assert_eq!(encode_num(-255), vec![0xff, 0x80]);
        assert_eq!(encode_num(i32::MAX as i64), vec![0xff, 0xff, 0xff, 0x7f]);
        assert_eq!(encode_num(-(i32::MAX as i64)), vec![0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn decodes_what_it_encodes() {
        for value in [-70_000i64, -256, -129, -1, 0, 1, 16, 127, 128, 32_767, 1 << 31, 1 << 38] {
            assert_eq!(decode_num(&encode_num(value)), value, "value {value}");
        }
    }

    #[test]
    fn negative_zero_is_false() {
        assert!(!cast_to_bool(&[]));
        assert!(!cast_to_bool(&[0x00, 0x00]));
        assert!(!cast_to_bool(&[0x00, 0x80]));
        assert!(cast_to_bool(&[0x80, 0x00]));
        assert!(cast_to_bool(&[0x01]));
    }

    #[test]
    fn shortest_encoding_rule() {
        assert!(is_shortest_encoding(&[]));
        assert!(is_shortest_encoding(&[0x01]));
        assert!(is_shortest_encoding(&[0xff, 0x00]));
        assert!(is_shortest_encoding(&[0x80, 0x80]));
        assert!(!is_shortest_encoding(&[0x00]));
        assert!(!is_shortest_encoding(&[0x80]));
        assert!(!is_shortest_encoding(&[0x01, 0x00]));
        assert!(!is_shortest_encoding(&[0x7f, 0x80]));
    }

    #[test]
    fn parse_enforces_width_and_minimality() {
        assert_eq!(parse_scriptnum(&[0x01, 0x00], false, 4), Ok(1));
        assert_eq!(parse_scriptnum(&[0x01, 0x00], true, 4), Err(ScriptError::Unknown));
        assert_eq!(parse_scriptnum(&[1, 2, 3, 4, 5], false, 4), Err(ScriptError::Unknown));
        assert_eq!(
            parse_scriptnum(&[0xff, 0xff, 0xff, 0xff, 0x00], true, SCRIPTNUM_MAX_LEN_EXTENDED),
            Ok(0xff_ff_ff_ff)
        );
    }
}
