//! Low level byte codecs shared by the reader and the writer.

use crate::error::{MidiError, Result};

/// Largest value a MIDI variable-length quantity can carry (28 bits).
pub const MAX_VARIABLE_LENGTH: u32 = 0x0FFF_FFFF;

/// Encode `n` as a big-endian integer of exactly `len` bytes.
pub fn number_to_fixed_bytes(n: u64, len: usize) -> Result<Vec<u8>> {
    if len == 0 {
        return Err(MidiError::invalid("fixed bytes", "length must be positive"));
    }
    if len < 8 && n >> (len * 8) != 0 {
        return Err(MidiError::invalid(
            "fixed bytes",
            format!("{n} does not fit in {len} byte(s)"),
        ));
    }
    Ok((0..len)
        .rev()
        .map(|i| if i >= 8 { 0 } else { (n >> (i * 8)) as u8 })
        .collect())
}

pub fn fixed_bytes_to_number(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Encode a MIDI variable-length quantity, most significant group first.
pub fn number_to_variable_bytes(n: u32) -> Result<Vec<u8>> {
    if n > MAX_VARIABLE_LENGTH {
        return Err(MidiError::invalid(
            "variable length quantity",
            format!("{n} exceeds 28 bits"),
        ));
    }
    let mut out = vec![(n & 0x7F) as u8];
    let mut rest = n >> 7;
    while rest > 0 {
        out.push(((rest & 0x7F) as u8) | 0x80);
        rest >>= 7;
    }
    out.reverse();
    Ok(out)
}

/// Decode a variable-length quantity from the front of `bytes`.
///
/// Returns the value and the number of bytes it occupied.
pub fn variable_bytes_to_number(bytes: &[u8]) -> Result<(u32, usize)> {
    let mut result = 0u32;
    for (i, &byte) in bytes.iter().enumerate() {
        if i == 4 {
            return Err(MidiError::malformed(
                i,
                "variable length quantity longer than 4 bytes",
            ));
        }
        result = (result << 7) | u32::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }
    Err(MidiError::Truncated {
        offset: bytes.len(),
        needed: 1,
    })
}

/// Length-prefixed (VLQ) byte string, one byte per character.
pub fn string_to_variable_bytes(s: &str) -> Result<Vec<u8>> {
    let raw = s
        .chars()
        .map(|c| {
            u8::try_from(c).map_err(|_| {
                MidiError::invalid("text", format!("character {c:?} does not fit in a byte"))
            })
        })
        .collect::<Result<Vec<u8>>>()?;
    let mut out = number_to_variable_bytes(raw.len() as u32)?;
    out.extend(raw);
    Ok(out)
}

/// Maps every byte to the char with the same code point.
pub fn fixed_bytes_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vlq_examples() {
        assert_eq!(number_to_variable_bytes(0x00).unwrap(), vec![0x00]);
        assert_eq!(number_to_variable_bytes(0x40).unwrap(), vec![0x40]);
        assert_eq!(number_to_variable_bytes(0x80).unwrap(), vec![0x81, 0x00]);
        assert_eq!(number_to_variable_bytes(0x3FFF).unwrap(), vec![0xFF, 0x7F]);
        assert_eq!(
            number_to_variable_bytes(0x4000).unwrap(),
            vec![0x81, 0x80, 0x00]
        );
        assert_eq!(
            number_to_variable_bytes(0x0FFF_FFFF).unwrap(),
            vec![0xFF, 0xFF, 0xFF, 0x7F]
        );
        assert!(number_to_variable_bytes(0x1000_0000).is_err());
    }

    #[test]
    fn vlq_decode_reports_length() {
        assert_eq!(variable_bytes_to_number(&[0x00]).unwrap(), (0, 1));
        assert_eq!(
            variable_bytes_to_number(&[0x81, 0x00, 0x55]).unwrap(),
            (0x80, 2)
        );
        assert_eq!(
            variable_bytes_to_number(&[0xFF, 0xFF, 0xFF, 0x7F]).unwrap(),
            (0x0FFF_FFFF, 4)
        );
    }

    #[test]
    fn vlq_round_trip_boundaries() {
        for n in [0, 1, 0x7F, 0x80, 0x3FFF, 0x4000, 0x1F_FFFF, 0x20_0000, MAX_VARIABLE_LENGTH] {
            let bytes = number_to_variable_bytes(n).unwrap();
            assert_eq!(variable_bytes_to_number(&bytes).unwrap(), (n, bytes.len()));
        }
    }

    #[test]
    fn vlq_truncated_is_an_error() {
        assert!(matches!(
            variable_bytes_to_number(&[0x81, 0x80]),
            Err(MidiError::Truncated { .. })
        ));
        assert!(variable_bytes_to_number(&[]).is_err());
        assert!(variable_bytes_to_number(&[0x80, 0x80, 0x80, 0x80, 0x00]).is_err());
    }

    #[test]
    fn fixed_bytes() {
        assert_eq!(number_to_fixed_bytes(0x100, 2).unwrap(), vec![0x01, 0x00]);
        assert_eq!(number_to_fixed_bytes(6, 4).unwrap(), vec![0, 0, 0, 6]);
        assert_eq!(number_to_fixed_bytes(255, 1).unwrap(), vec![0xFF]);
        assert!(number_to_fixed_bytes(256, 1).is_err());
        assert!(number_to_fixed_bytes(1, 0).is_err());
        assert_eq!(fixed_bytes_to_number(&[0x01, 0x00]), 0x100);
        assert_eq!(fixed_bytes_to_number(&[0x0F, 0x42, 0x40]), 1_000_000);
        assert_eq!(fixed_bytes_to_number(&[]), 0);
    }

    #[test]
    fn strings() {
        assert_eq!(
            string_to_variable_bytes("abc").unwrap(),
            vec![0x03, b'a', b'b', b'c']
        );
        assert_eq!(string_to_variable_bytes("").unwrap(), vec![0x00]);
        assert_eq!(fixed_bytes_to_string(b"Piano"), "Piano");
        assert_eq!(string_to_variable_bytes("caf\u{e9}").unwrap()[4], 0xE9);
        assert!(string_to_variable_bytes("\u{266f}").is_err());
    }
}
