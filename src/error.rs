use std::io;

use thiserror::Error;

/// Hard failures raised while encoding or decoding MIDI data.
///
/// Recoverable anomalies (orphaned note-offs, unsupported events, ...) are
/// not errors; they end up in the [`crate::midi::diagnostics`] list instead.
#[derive(Debug, Error)]
pub enum MidiError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Structurally malformed input, with the byte offset it was found at.
    #[error("malformed midi data at byte {offset}: {message}")]
    Malformed { offset: usize, message: String },

    /// Input ended before a fixed or variable length read could complete.
    #[error("unexpected end of data at byte {offset}: needed {needed} more byte(s)")]
    Truncated { offset: usize, needed: usize },

    #[error("unsupported midi format {0}")]
    UnsupportedFormat(u16),

    #[error("{what} {value} out of range at byte {offset}")]
    OutOfRange {
        what: &'static str,
        value: u32,
        offset: usize,
    },

    #[error("invalid key signature: {0}")]
    InvalidKeySignature(String),

    #[error("invalid time signature: {0}")]
    InvalidTimeSignature(String),

    #[error("invalid instrument: {0}")]
    InvalidInstrument(String),

    #[error("invalid timing: {0}")]
    InvalidTiming(String),

    /// A value handed to the encoder that cannot be represented.
    #[error("cannot encode {what}: {message}")]
    InvalidValue { what: &'static str, message: String },
}

impl MidiError {
    pub(crate) fn malformed(offset: usize, message: impl Into<String>) -> Self {
        MidiError::Malformed {
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn invalid(what: &'static str, message: impl Into<String>) -> Self {
        MidiError::InvalidValue {
            what,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MidiError>;
