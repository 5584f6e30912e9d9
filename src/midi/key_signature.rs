use std::fmt;
use std::str::FromStr;

use crate::error::{MidiError, Result};

// Indexed by accidentals + 7 (seven flats .. seven sharps).
const MAJOR_KEYS: [&str; 15] = [
    "Cb", "Gb", "Db", "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#",
];
const MINOR_KEYS: [&str; 15] = [
    "ab", "eb", "bb", "f", "c", "g", "d", "a", "e", "b", "f#", "c#", "g#", "d#", "a#",
];

/// A key signature. Major keys are capitalised, minor keys are lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeySignature {
    accidentals: i8,
    minor: bool,
}

impl KeySignature {
    /// Negative for flats, positive for sharps.
    pub fn accidentals(&self) -> i8 {
        self.accidentals
    }

    pub fn is_minor(&self) -> bool {
        self.minor
    }

    pub fn name(&self) -> &'static str {
        let idx = (self.accidentals + 7) as usize;
        if self.minor {
            MINOR_KEYS[idx]
        } else {
            MAJOR_KEYS[idx]
        }
    }

    /// The `sf mi` payload of a key signature meta event.
    pub fn to_midi_bytes(&self) -> [u8; 2] {
        [self.accidentals as u8, u8::from(self.minor)]
    }

    pub fn from_midi_bytes(sf: u8, mi: u8) -> Result<Self> {
        if !matches!(sf, 0x00..=0x07 | 0xF9..=0xFF) {
            return Err(MidiError::InvalidKeySignature(format!(
                "accidentals byte {sf:#04x} out of range"
            )));
        }
        let minor = match mi {
            0 => false,
            1 => true,
            _ => {
                return Err(MidiError::InvalidKeySignature(format!(
                    "mode byte {mi:#04x} is neither major nor minor"
                )));
            }
        };
        let idx = sf.wrapping_add(7) as usize;
        Ok(KeySignature {
            accidentals: idx as i8 - 7,
            minor,
        })
    }
}

impl FromStr for KeySignature {
    type Err = MidiError;

    fn from_str(s: &str) -> Result<Self> {
        let (minor, idx) = match MAJOR_KEYS.iter().position(|k| *k == s) {
            Some(idx) => (false, idx),
            None => match MINOR_KEYS.iter().position(|k| *k == s) {
                Some(idx) => (true, idx),
                None => return Err(MidiError::InvalidKeySignature(s.to_string())),
            },
        };
        Ok(KeySignature {
            accidentals: idx as i8 - 7,
            minor,
        })
    }
}

impl fmt::Display for KeySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_examples() {
        let cs: KeySignature = "C#".parse().unwrap();
        assert_eq!(cs.to_midi_bytes(), [0x07, 0x00]);
        let eb: KeySignature = "eb".parse().unwrap();
        assert_eq!(eb.to_midi_bytes(), [0xFA, 0x01]);
        let c: KeySignature = "C".parse().unwrap();
        assert_eq!(c.to_midi_bytes(), [0x00, 0x00]);
        let cb: KeySignature = "Cb".parse().unwrap();
        assert_eq!(cb.to_midi_bytes(), [0xF9, 0x00]);
    }

    #[test]
    fn every_key_round_trips() {
        for name in MAJOR_KEYS.iter().chain(MINOR_KEYS.iter()) {
            let key: KeySignature = name.parse().unwrap();
            let [sf, mi] = key.to_midi_bytes();
            let back = KeySignature::from_midi_bytes(sf, mi).unwrap();
            assert_eq!(back.name(), *name);
        }
    }

    #[test]
    fn rejects_bad_input() {
        assert!("H".parse::<KeySignature>().is_err());
        assert!("c b".parse::<KeySignature>().is_err());
        assert!(KeySignature::from_midi_bytes(0x08, 0).is_err());
        assert!(KeySignature::from_midi_bytes(0xF8, 0).is_err());
        assert!(KeySignature::from_midi_bytes(0x00, 2).is_err());
        assert_eq!(KeySignature::from_midi_bytes(0xFF, 1).unwrap().name(), "d");
    }
}
