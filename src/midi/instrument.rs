use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;

use crate::error::{MidiError, Result};

/// Channel reserved for percussion in General MIDI (1-based).
pub const PERCUSSION_CHANNEL: u8 = 10;

/// General MIDI melodic programs, indexed by program number.
const MELODIC: [&str; 128] = [
    // Piano
    "acoustic grand piano",
    "bright acoustic piano",
    "electric grand piano",
    "honky-tonk piano",
    "electric piano 1",
    "electric piano 2",
    "harpsichord",
    "clavinet",
    // Chromatic Percussion
    "celesta",
    "glockenspiel",
    "music box",
    "vibraphone",
    "marimba",
    "xylophone",
    "tubular bells",
    "dulcimer",
    // Organ
    "drawbar organ",
    "percussive organ",
    "rock organ",
    "church organ",
    "reed organ",
    "accordion",
    "harmonica",
    "tango accordion",
    // Guitar
    "acoustic guitar (nylon)",
    "acoustic guitar (steel)",
    "electric guitar (jazz)",
    "electric guitar (clean)",
    "electric guitar (muted)",
    "overdriven guitar",
    "distortion guitar",
    "guitar harmonics",
    // Bass
    "acoustic bass",
    "electric bass (finger)",
    "electric bass (pick)",
    "fretless bass",
    "slap bass 1",
    "slap bass 2",
    "synth bass 1",
    "synth bass 2",
    // Strings
    "violin",
    "viola",
    "cello",
    "contrabass",
    "tremolo strings",
    "pizzicato strings",
    "orchestral harp",
    "timpani",
    // Ensemble
    "string ensemble 1",
    "string ensemble 2",
    "synth strings 1",
    "synth strings 2",
    "choir aahs",
    "voice oohs",
    "synth voice",
    "orchestra hit",
    // Brass
    "trumpet",
    "trombone",
    "tuba",
    "muted trumpet",
    "french horn",
    "brass section",
    "synth brass 1",
    "synth brass 2",
    // Reed
    "soprano sax",
    "alto sax",
    "tenor sax",
    "baritone sax",
    "oboe",
    "english horn",
    "bassoon",
    "clarinet",
    // Pipe
    "piccolo",
    "flute",
    "recorder",
    "pan flute",
    "blown bottle",
    "shakuhachi",
    "whistle",
    "ocarina",
    // Synth Lead
    "lead 1 (square)",
    "lead 2 (sawtooth)",
    "lead 3 (calliope)",
    "lead 4 (chiff)",
    "lead 5 (charang)",
    "lead 6 (voice)",
    "lead 7 (fifths)",
    "lead 8 (bass + lead)",
    // Synth Pad
    "pad 1 (new age)",
    "pad 2 (warm)",
    "pad 3 (polysynth)",
    "pad 4 (choir)",
    "pad 5 (bowed)",
    "pad 6 (metallic)",
    "pad 7 (halo)",
    "pad 8 (sweep)",
    // Synth Effects
    "fx 1 (rain)",
    "fx 2 (soundtrack)",
    "fx 3 (crystal)",
    "fx 4 (atmosphere)",
    "fx 5 (brightness)",
    "fx 6 (goblins)",
    "fx 7 (echoes)",
    "fx 8 (sci-fi)",
    // Ethnic
    "sitar",
    "banjo",
    "shamisen",
    "koto",
    "kalimba",
    "bagpipe",
    "fiddle",
    "shanai",
    // Percussive
    "tinkle bell",
    "agogo",
    "steel drums",
    "woodblock",
    "taiko drum",
    "melodic tom",
    "synth drum",
    "reverse cymbal",
    // Sound Effects
    "guitar fret noise",
    "breath noise",
    "seashore",
    "bird tweet",
    "telephone ring",
    "helicopter",
    "applause",
    "gunshot",
];

/// Drum kits selectable by program change on the percussion channel.
const PERCUSSION: [(u8, &str); 9] = [
    (0, "standard kit"),
    (8, "room kit"),
    (16, "power kit"),
    (24, "electronic kit"),
    (25, "tr-808 kit"),
    (32, "jazz kit"),
    (40, "brush kit"),
    (48, "orchestra kit"),
    (56, "sound fx kit"),
];

lazy_static! {
    static ref MELODIC_BY_NAME: HashMap<&'static str, u8> = MELODIC
        .iter()
        .enumerate()
        .map(|(program, name)| (*name, program as u8))
        .collect();
    static ref PERCUSSION_BY_NAME: HashMap<&'static str, u8> =
        PERCUSSION.iter().map(|(program, name)| (*name, *program)).collect();
}

/// The payload of a program change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instrument {
    Named(&'static str),
    /// A program with no name in the table for its channel.
    Program(u8),
}

impl Instrument {
    /// Looks a name up in the melodic table, then in the drum kits.
    pub fn by_name(name: &str) -> Result<Self> {
        let lower = name.to_ascii_lowercase();
        MELODIC_BY_NAME
            .get_key_value(lower.as_str())
            .or_else(|| PERCUSSION_BY_NAME.get_key_value(lower.as_str()))
            .map(|(name, _)| Instrument::Named(*name))
            .ok_or_else(|| MidiError::InvalidInstrument(name.to_string()))
    }

    /// Names a decoded program number; `channel` is 1-based.
    pub fn from_program(program: u8, channel: u8) -> Self {
        let name = if channel == PERCUSSION_CHANNEL {
            PERCUSSION
                .iter()
                .find(|(p, _)| *p == program)
                .map(|(_, name)| *name)
        } else {
            MELODIC.get(program as usize).copied()
        };
        name.map_or(Instrument::Program(program), Instrument::Named)
    }

    /// Program number to send on `channel`.
    pub fn program(&self, channel: u8) -> Result<u8> {
        match *self {
            Instrument::Program(program) if program <= 0x7F => Ok(program),
            Instrument::Program(program) => Err(MidiError::InvalidInstrument(format!(
                "program {program} out of range"
            ))),
            Instrument::Named(name) => {
                if let Some(&program) = MELODIC_BY_NAME.get(name) {
                    return Ok(program);
                }
                match PERCUSSION_BY_NAME.get(name) {
                    Some(&program) if channel == PERCUSSION_CHANNEL => Ok(program),
                    Some(_) => Err(MidiError::InvalidInstrument(format!(
                        "{name} is only available on channel {PERCUSSION_CHANNEL}"
                    ))),
                    None => Err(MidiError::InvalidInstrument(name.to_string())),
                }
            }
        }
    }

    /// The same instrument as a bare program number, valid on any channel.
    pub fn to_program(self) -> Result<Self> {
        self.program(PERCUSSION_CHANNEL).map(Instrument::Program)
    }

    pub fn name(&self) -> Option<&'static str> {
        match self {
            Instrument::Named(name) => Some(*name),
            Instrument::Program(_) => None,
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instrument::Named(name) => f.write_str(name),
            Instrument::Program(program) => write!(f, "program {program}"),
        }
    }
}
