//! Fixed-width base-58 over big-endian byte strings.
//!
//! Unlike the Bitcoin flavour, leading zero bytes get no special treatment:
//! the bytes are one big-endian number, rendered in exactly `width` digits
//! and left-padded with the zero digit (`'1'`).

/// Base-58 alphabet. Excludes the look-alikes `0`, `O`, `I` and `l`.
pub const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// The padding symbol (digit zero).
pub const PAD: char = '1';

/// Digit value of a base-58 character.
pub fn digit_of(c: char) -> Option<u8> {
    if !c.is_ascii() {
        return None;
    }
    ALPHABET
        .iter()
        .position(|&a| a == c as u8)
        .map(|idx| idx as u8)
}

/// Encode `bytes` in exactly `width` base-58 digits.
///
/// Numbers needing more than `width` digits keep their low-order digits.
pub fn encode_fixed(bytes: &[u8], width: usize) -> String {
    let mut number = bytes.to_vec();
    let mut digits = vec![0u8; width];

    for slot in digits.iter_mut().rev() {
        let mut remainder: u32 = 0;
        for byte in number.iter_mut() {
            let acc = (remainder << 8) | u32::from(*byte);
            *byte = (acc / 58) as u8;
            remainder = acc % 58;
        }
        *slot = remainder as u8;
    }

    digits
        .into_iter()
        .map(|d| ALPHABET[d as usize] as char)
        .collect()
}

/// Decode base-58 text into exactly `N` big-endian bytes.
///
/// Shorter values are left-padded with zero bytes; wider values keep their
/// low-order `N` bytes. Returns `None` on any character outside the alphabet.
pub fn decode_fixed<const N: usize>(text: &str) -> Option<[u8; N]> {
    let mut out = [0u8; N];

    for c in text.chars() {
        let mut carry = u32::from(digit_of(c)?);
        for byte in out.iter_mut().rev() {
            let acc = u32::from(*byte) * 58 + carry;
            *byte = (acc & 0xFF) as u8;
            carry = acc >> 8;
        }
    }

    Some(out)
}
