//! Event types exchanged with the writer and produced by the reader.

use crate::error::{MidiError, Result};
use crate::midi::instrument::Instrument;
use crate::midi::key_signature::KeySignature;
use crate::midi::time_signature::TimeSignature;
use crate::timing::Timing;

/// Payload of a non-note event.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaKind {
    Sustain(bool),
    Volume(u8),
    Pan(u8),
    Balance(u8),
    /// Beats per minute.
    Tempo(f64),
    TimeSignature(TimeSignature),
    KeySignature(KeySignature),
    Text(String),
    Copyright(String),
    TrackName(String),
    InstrumentName(String),
    Lyric(String),
    Marker(String),
    CuePoint(String),
    Instrument(Instrument),
    /// Signed offset from the centre, -8192..=8191.
    PitchBend(i16),
    EndTrack,
}

impl MetaKind {
    pub fn label(&self) -> &'static str {
        match self {
            MetaKind::Sustain(_) => "sustain",
            MetaKind::Volume(_) => "volume",
            MetaKind::Pan(_) => "pan",
            MetaKind::Balance(_) => "balance",
            MetaKind::Tempo(_) => "tempo",
            MetaKind::TimeSignature(_) => "time-signature",
            MetaKind::KeySignature(_) => "key-signature",
            MetaKind::Text(_) => "text",
            MetaKind::Copyright(_) => "copyright",
            MetaKind::TrackName(_) => "track-name",
            MetaKind::InstrumentName(_) => "instrument-name",
            MetaKind::Lyric(_) => "lyric",
            MetaKind::Marker(_) => "marker",
            MetaKind::CuePoint(_) => "cue-point",
            MetaKind::Instrument(_) => "instrument",
            MetaKind::PitchBend(_) => "pitch-bend",
            MetaKind::EndTrack => "end-track",
        }
    }
}

/// A control, program or meta event positioned by its [`Timing`].
#[derive(Debug, Clone, PartialEq)]
pub struct MetaEvent {
    pub kind: MetaKind,
    pub timing: Timing,
}

impl MetaEvent {
    pub fn new(kind: MetaKind) -> Self {
        MetaEvent {
            kind,
            timing: Timing::default(),
        }
    }

    pub fn at(kind: MetaKind, tick: u64) -> Result<Self> {
        Ok(MetaEvent {
            kind,
            timing: Timing::exact(tick_to_i64(tick)?)?,
        })
    }

    pub fn with_timing(self, timing: Timing) -> Self {
        MetaEvent { timing, ..self }
    }
}

/// A note or chord. Fractional pitches are rendered with a pitch bend.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteEvent {
    pitches: Vec<f64>,
    velocity: u8,
    timing: Timing,
}

impl NoteEvent {
    /// `timing` must carry a duration.
    pub fn new(pitches: Vec<f64>, velocity: u8, timing: Timing) -> Result<Self> {
        if velocity > 0x7F {
            return Err(MidiError::invalid(
                "note",
                format!("velocity {velocity} out of range"),
            ));
        }
        if timing.duration_field().is_none() {
            return Err(MidiError::invalid("note", "duration is not resolved"));
        }
        Ok(NoteEvent {
            pitches,
            velocity,
            timing,
        })
    }

    pub fn single(pitch: f64, velocity: u8, duration: i64) -> Result<Self> {
        NoteEvent::new(vec![pitch], velocity, Timing::duration(duration)?)
    }

    pub fn pitches(&self) -> &[f64] {
        &self.pitches
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn with_timing(self, timing: Timing) -> Result<Self> {
        NoteEvent::new(self.pitches, self.velocity, timing)
    }
}

/// A note recovered from a track, with absolute start tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Note {
    pub pitch: u8,
    pub velocity: u8,
    pub tick: u64,
    pub duration: u64,
}

impl Note {
    pub fn end_tick(&self) -> u64 {
        self.tick + self.duration
    }

    pub fn to_note_event(&self) -> Result<NoteEvent> {
        let timing = Timing::exact(tick_to_i64(self.tick)?)?
            .with_duration(tick_to_i64(self.duration)?)?;
        NoteEvent::new(vec![f64::from(self.pitch)], self.velocity, timing)
    }
}

/// A non-note event recovered from a track, with absolute tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent {
    pub tick: u64,
    pub kind: MetaKind,
}

impl TimedEvent {
    pub fn to_meta_event(&self) -> Result<MetaEvent> {
        MetaEvent::at(self.kind.clone(), self.tick)
    }
}

fn tick_to_i64(tick: u64) -> Result<i64> {
    i64::try_from(tick).map_err(|_| MidiError::InvalidTiming(format!("tick {tick} too large")))
}
