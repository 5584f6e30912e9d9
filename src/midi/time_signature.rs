use std::fmt;
use std::str::FromStr;

use crate::error::{MidiError, Result};

// MIDI clocks per metronome click and 32nd notes per quarter. Always written
// as-is; only the second one is checked when reading.
const CLOCKS_PER_CLICK: u8 = 0x18;
const THIRTY_SECONDS_PER_QUARTER: u8 = 0x08;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeSignature {
    numerator: u8,
    denominator_power: u8,
}

impl TimeSignature {
    pub fn new(numerator: u8, denominator: u32) -> Result<Self> {
        if numerator == 0 {
            return Err(MidiError::InvalidTimeSignature(format!(
                "{numerator}/{denominator}: numerator must be positive"
            )));
        }
        if !denominator.is_power_of_two() {
            return Err(MidiError::InvalidTimeSignature(format!(
                "{numerator}/{denominator}: denominator must be a power of two"
            )));
        }
        Ok(TimeSignature {
            numerator,
            denominator_power: denominator.trailing_zeros() as u8,
        })
    }

    pub fn numerator(&self) -> u8 {
        self.numerator
    }

    pub fn denominator(&self) -> u32 {
        1 << self.denominator_power
    }

    /// Length of one bar in quarter notes.
    pub fn to_quarter_notes(&self) -> f64 {
        4.0 * f64::from(self.numerator) / f64::from(self.denominator())
    }

    pub fn to_midi_bytes(&self) -> [u8; 4] {
        [
            self.numerator,
            self.denominator_power,
            CLOCKS_PER_CLICK,
            THIRTY_SECONDS_PER_QUARTER,
        ]
    }

    pub fn from_midi_bytes(bytes: [u8; 4]) -> Result<Self> {
        let [numerator, power, _clocks, thirty_seconds] = bytes;
        if thirty_seconds != THIRTY_SECONDS_PER_QUARTER {
            return Err(MidiError::InvalidTimeSignature(format!(
                "expected {THIRTY_SECONDS_PER_QUARTER} 32nd notes per quarter, got {thirty_seconds}"
            )));
        }
        if power > 31 {
            return Err(MidiError::InvalidTimeSignature(format!(
                "denominator power {power} too large"
            )));
        }
        TimeSignature::new(numerator, 1 << power)
    }
}

impl FromStr for TimeSignature {
    type Err = MidiError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || MidiError::InvalidTimeSignature(s.to_string());
        let (num, denom) = s.split_once('/').ok_or_else(invalid)?;
        let num: u8 = num.trim().parse().map_err(|_| invalid())?;
        let denom: u32 = denom.trim().parse().map_err(|_| invalid())?;
        TimeSignature::new(num, denom)
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator())
    }
}
