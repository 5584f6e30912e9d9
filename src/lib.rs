//! Reading and writing Standard MIDI Files.
//!
//! [`midi::writer`] turns notes and meta events, positioned with
//! [`timing::Timing`], into byte-exact SMF data. [`midi::loader`] goes the
//! other way, decoding every track chunk into notes and events.

pub mod error;
pub mod midi;
pub mod timing;

pub use error::{MidiError, Result};
pub use midi::diagnostics::{Diagnostic, Warning};
pub use midi::events::{MetaEvent, MetaKind, Note, NoteEvent, TimedEvent};
pub use midi::instrument::Instrument;
pub use midi::key_signature::KeySignature;
pub use midi::loader::{load_midi_file, parse_midi_bytes, MidiFile};
pub use midi::time_signature::TimeSignature;
pub use midi::track_data::{decode_track, Track};
pub use midi::writer::{Score, TrackSource};
pub use timing::Timing;
