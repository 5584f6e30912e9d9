//! Recoverable problems found while reading a file.
//!
//! None of these stop a parse. They are collected next to the decoded data
//! and also logged at `warn` level.

use std::fmt;

use log::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A data byte showed up where a status byte was expected and there was
    /// no running status to apply.
    DataByteWithoutStatus(u8),
    NoteOutOfRange { pitch: u8, velocity: u8 },
    PitchBendOutOfRange { low: u8, high: u8 },
    OrphanedNoteOff { pitch: u8 },
    UnmatchedNoteOn { pitch: u8, count: usize },
    UnsupportedEvent { status: u8 },
    UnsupportedController { controller: u8 },
    UnsupportedMeta { meta_type: u8 },
    SysEx { length: usize },
    MissingEndOfTrack,
    UnknownChunk { id: [u8; 4] },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::DataByteWithoutStatus(b) => {
                write!(f, "data byte {b:#04x} with no running status, skipped")
            }
            Warning::NoteOutOfRange { pitch, velocity } => {
                write!(f, "note {pitch} velocity {velocity} out of range, discarded")
            }
            Warning::PitchBendOutOfRange { low, high } => {
                write!(f, "pitch bend data {low:#04x} {high:#04x} out of range, discarded")
            }
            Warning::OrphanedNoteOff { pitch } => {
                write!(f, "note off for pitch {pitch} without a matching note on")
            }
            Warning::UnmatchedNoteOn { pitch, count } => {
                write!(f, "{count} note on(s) for pitch {pitch} never released")
            }
            Warning::UnsupportedEvent { status } => {
                write!(f, "unsupported event {status:#04x}, skipped")
            }
            Warning::UnsupportedController { controller } => {
                write!(f, "unsupported controller {controller}, skipped")
            }
            Warning::UnsupportedMeta { meta_type } => {
                write!(f, "unsupported meta event {meta_type:#04x}, skipped")
            }
            Warning::SysEx { length } => write!(f, "sysex of {length} bytes skipped"),
            Warning::MissingEndOfTrack => f.write_str("track has no end of track event"),
            Warning::UnknownChunk { id } => {
                write!(f, "unknown chunk {:?} skipped", String::from_utf8_lossy(id))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Index of the track chunk, `None` for file level problems.
    pub track: Option<usize>,
    /// Absolute byte offset in the file.
    pub offset: usize,
    pub tick: u64,
    pub warning: Warning,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.track {
            Some(track) => write!(
                f,
                "track {track}, byte {}, tick {}: {}",
                self.offset, self.tick, self.warning
            ),
            None => write!(f, "byte {}: {}", self.offset, self.warning),
        }
    }
}

/// Records a diagnostic and logs it.
pub(crate) fn report(list: &mut Vec<Diagnostic>, diagnostic: Diagnostic) {
    warn!("{diagnostic}");
    list.push(diagnostic);
}
