use std::collections::{BTreeMap, VecDeque};

use log::{debug, warn};

use crate::error::{MidiError, Result};
use crate::midi::bytes::{fixed_bytes_to_number, fixed_bytes_to_string, variable_bytes_to_number};
use crate::midi::diagnostics::{report, Diagnostic, Warning};
use crate::midi::events::{MetaKind, Note, TimedEvent};
use crate::midi::instrument::Instrument;
use crate::midi::key_signature::KeySignature;
use crate::midi::time_signature::TimeSignature;
use crate::midi::writer::TrackSource;

/// Which channel the channel messages of a track use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelTracker {
    Unset,
    /// 0-based channel nibble.
    Single(u8),
    Ambiguous,
}

#[derive(Debug, Clone, Copy)]
struct PendingNote {
    velocity: u8,
    tick: u64,
}

/// A decoded track.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub index: usize,
    /// Sorted by start tick.
    pub notes: Vec<Note>,
    /// In file order.
    pub events: Vec<TimedEvent>,
    /// 1-based; `None` when the track used more than one channel.
    pub channel: Option<u8>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Track {
    /// Last tick touched by a note or event.
    pub fn total_ticks(&self) -> u64 {
        let notes = self.notes.iter().map(Note::end_tick).max().unwrap_or(0);
        let events = self.events.iter().map(|e| e.tick).max().unwrap_or(0);
        notes.max(events)
    }

    /// Rebuilds something the writer can encode again.
    ///
    /// A track that mixed channels is written back on channel 1, with its
    /// program changes kept as raw program numbers.
    pub fn to_source(&self) -> Result<TrackSource> {
        if self.channel.is_none() {
            warn!("track {} used several channels, re-encoding on channel 1", self.index);
        }
        let mut source = TrackSource::new(self.channel.unwrap_or(1));
        for event in &self.events {
            let mut meta = event.to_meta_event()?;
            if let (None, &MetaKind::Instrument(instrument)) = (self.channel, &meta.kind) {
                meta.kind = MetaKind::Instrument(instrument.to_program()?);
            }
            source = source.with_event(meta);
        }
        for note in &self.notes {
            source = source.with_note(note.to_note_event()?);
        }
        Ok(source)
    }
}

/// Cursor over the bytes of one `MTrk` chunk.
pub struct TrackData<'a> {
    data: &'a [u8],
    /// Offset of `data[0]` in the whole file, for error messages.
    base: usize,
    index: usize,
    offset: usize,
    tick: u64,
    last_status: Option<u8>,
    channel: ChannelTracker,
    pending: BTreeMap<u8, VecDeque<PendingNote>>,
    notes: Vec<Note>,
    events: Vec<TimedEvent>,
    diagnostics: Vec<Diagnostic>,
    ended: bool,
}

impl<'a> TrackData<'a> {
    pub fn new(data: &'a [u8], base: usize, index: usize) -> Self {
        TrackData {
            data,
            base,
            index,
            offset: 0,
            tick: 0,
            last_status: None,
            channel: ChannelTracker::Unset,
            pending: BTreeMap::new(),
            notes: Vec::new(),
            events: Vec::new(),
            diagnostics: Vec::new(),
            ended: false,
        }
    }

    /// Decode every event in the chunk.
    pub fn parse(mut self) -> Result<Track> {
        while self.offset < self.data.len() {
            self.update_tick()?;
            if let Some(status) = self.update_command()? {
                self.update_message(status)?;
            }
        }
        Ok(self.finish())
    }

    fn position(&self) -> usize {
        self.base + self.offset
    }

    fn warn(&mut self, warning: Warning) {
        let diagnostic = Diagnostic {
            track: Some(self.index),
            offset: self.position(),
            tick: self.tick,
            warning,
        };
        report(&mut self.diagnostics, diagnostic);
    }

    fn read_byte(&mut self) -> Result<u8> {
        let byte = *self.data.get(self.offset).ok_or(MidiError::Truncated {
            offset: self.position(),
            needed: 1,
        })?;
        self.offset += 1;
        Ok(byte)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let available = self.data.len() - self.offset;
        if available < len {
            return Err(MidiError::Truncated {
                offset: self.position(),
                needed: len - available,
            });
        }
        let data = self.data;
        let bytes = &data[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    /// Decode a variable-length value from the data stream.
    fn decode_variable_length(&mut self) -> Result<u32> {
        let position = self.position();
        let (value, used) =
            variable_bytes_to_number(&self.data[self.offset..]).map_err(|e| match e {
                MidiError::Truncated { needed, .. } => MidiError::Truncated {
                    offset: self.base + self.data.len(),
                    needed,
                },
                MidiError::Malformed { message, .. } => MidiError::Malformed {
                    offset: position,
                    message,
                },
                other => other,
            })?;
        self.offset += used;
        Ok(value)
    }

    /// Advance the tick by the next delta-time value.
    fn update_tick(&mut self) -> Result<()> {
        let delta = self.decode_variable_length()?;
        self.tick += u64::from(delta);
        Ok(())
    }

    /// Read the next status byte, falling back to running status.
    fn update_command(&mut self) -> Result<Option<u8>> {
        let byte = *self.data.get(self.offset).ok_or_else(|| {
            MidiError::malformed(self.position(), "delta time without an event")
        })?;
        if byte >= 0x80 {
            self.offset += 1;
            // Sysex and meta events keep the running status of the channel before them.
            if byte < 0xF0 {
                self.last_status = Some(byte);
            }
            return Ok(Some(byte));
        }
        match self.last_status {
            Some(status) => Ok(Some(status)),
            None => {
                self.warn(Warning::DataByteWithoutStatus(byte));
                self.offset += 1;
                Ok(None)
            }
        }
    }

    fn track_channel(&mut self, nibble: u8) {
        self.channel = match self.channel {
            ChannelTracker::Unset => ChannelTracker::Single(nibble),
            ChannelTracker::Single(c) if c == nibble => ChannelTracker::Single(c),
            _ => ChannelTracker::Ambiguous,
        };
    }

    fn push_event(&mut self, kind: MetaKind) {
        self.events.push(TimedEvent {
            tick: self.tick,
            kind,
        });
    }

    fn update_message(&mut self, status: u8) -> Result<()> {
        if status < 0xF0 {
            self.track_channel(status & 0x0F);
        }
        match status & 0xF0 {
            0x80 | 0x90 => {
                let pitch = self.read_byte()?;
                let velocity = self.read_byte()?;
                self.note(status & 0xF0 == 0x90 && velocity > 0, pitch, velocity);
            }
            0xA0 => {
                self.read_bytes(2)?;
                self.warn(Warning::UnsupportedEvent { status });
            }
            0xB0 => self.controller()?,
            0xC0 => {
                let at = self.position();
                let program = self.read_byte()?;
                if program > 0x7F {
                    return Err(MidiError::OutOfRange {
                        what: "program",
                        value: program.into(),
                        offset: at,
                    });
                }
                let instrument = Instrument::from_program(program, (status & 0x0F) + 1);
                self.push_event(MetaKind::Instrument(instrument));
            }
            0xD0 => {
                self.read_byte()?;
                self.warn(Warning::UnsupportedEvent { status });
            }
            0xE0 => {
                let low = self.read_byte()?;
                let high = self.read_byte()?;
                if low > 0x7F || high > 0x7F {
                    self.warn(Warning::PitchBendOutOfRange { low, high });
                    return Ok(());
                }
                let value = (u16::from(low) | (u16::from(high) << 7)) as i16 - 8192;
                self.push_event(MetaKind::PitchBend(value));
            }
            _ => match status {
                0xFF => self.meta()?,
                0xF0 | 0xF7 => {
                    let length = self.decode_variable_length()? as usize;
                    self.read_bytes(length)?;
                    self.warn(Warning::SysEx { length });
                }
                // System common and real-time messages
                _ => {
                    let length = match status {
                        0xF1 | 0xF3 => 1,
                        0xF2 => 2,
                        _ => 0,
                    };
                    self.read_bytes(length)?;
                    self.warn(Warning::UnsupportedEvent { status });
                }
            },
        }
        Ok(())
    }

    fn note(&mut self, on: bool, pitch: u8, velocity: u8) {
        if pitch > 0x7F || velocity > 0x7F {
            self.warn(Warning::NoteOutOfRange { pitch, velocity });
            return;
        }
        if on {
            self.pending.entry(pitch).or_default().push_back(PendingNote {
                velocity,
                tick: self.tick,
            });
            return;
        }
        match self.pending.get_mut(&pitch).and_then(VecDeque::pop_front) {
            Some(started) => self.notes.push(Note {
                pitch,
                velocity: started.velocity,
                tick: started.tick,
                duration: self.tick - started.tick,
            }),
            None => self.warn(Warning::OrphanedNoteOff { pitch }),
        }
    }

    fn controller(&mut self) -> Result<()> {
        let at = self.position();
        let number = self.read_byte()?;
        let value = self.read_byte()?;
        if number > 0x7F {
            return Err(MidiError::OutOfRange {
                what: "controller number",
                value: number.into(),
                offset: at,
            });
        }
        if value > 0x7F {
            return Err(MidiError::OutOfRange {
                what: "controller value",
                value: value.into(),
                offset: at + 1,
            });
        }
        let kind = match number {
            64 => MetaKind::Sustain(value >= 64),
            7 => MetaKind::Volume(value),
            10 => MetaKind::Pan(value),
            8 => MetaKind::Balance(value),
            _ => {
                self.warn(Warning::UnsupportedController { controller: number });
                return Ok(());
            }
        };
        self.push_event(kind);
        Ok(())
    }

    fn meta(&mut self) -> Result<()> {
        let meta_type = self.read_byte()?;
        let length = self.decode_variable_length()? as usize;
        let at = self.position();
        let payload = self.read_bytes(length)?;

        let expect_len = |expected: usize, name: &str| -> Result<()> {
            if length != expected {
                return Err(MidiError::malformed(
                    at,
                    format!("{name} event must have {expected} data bytes, got {length}"),
                ));
            }
            Ok(())
        };

        let kind = match meta_type {
            0x01..=0x07 => {
                let text = fixed_bytes_to_string(payload);
                match meta_type {
                    0x01 => MetaKind::Text(text),
                    0x02 => MetaKind::Copyright(text),
                    0x03 => MetaKind::TrackName(text),
                    0x04 => MetaKind::InstrumentName(text),
                    0x05 => MetaKind::Lyric(text),
                    0x06 => MetaKind::Marker(text),
                    _ => MetaKind::CuePoint(text),
                }
            }
            0x2F => {
                expect_len(0, "end of track")?;
                if self.offset != self.data.len() {
                    return Err(MidiError::malformed(
                        self.position(),
                        "end of track is not the last event",
                    ));
                }
                self.ended = true;
                MetaKind::EndTrack
            }
            0x51 => {
                expect_len(3, "tempo")?;
                let micros = fixed_bytes_to_number(payload);
                if micros == 0 {
                    return Err(MidiError::malformed(at, "tempo of zero microseconds"));
                }
                MetaKind::Tempo(60_000_000.0 / micros as f64)
            }
            0x58 => {
                expect_len(4, "time signature")?;
                let bytes = [payload[0], payload[1], payload[2], payload[3]];
                MetaKind::TimeSignature(TimeSignature::from_midi_bytes(bytes)?)
            }
            0x59 => {
                expect_len(2, "key signature")?;
                MetaKind::KeySignature(KeySignature::from_midi_bytes(payload[0], payload[1])?)
            }
            _ => {
                self.warn(Warning::UnsupportedMeta { meta_type });
                return Ok(());
            }
        };
        self.push_event(kind);
        Ok(())
    }

    fn finish(mut self) -> Track {
        if !self.ended {
            self.warn(Warning::MissingEndOfTrack);
        }
        let leftovers: Vec<(u8, usize)> = self
            .pending
            .iter()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(&pitch, queue)| (pitch, queue.len()))
            .collect();
        for (pitch, count) in leftovers {
            self.warn(Warning::UnmatchedNoteOn { pitch, count });
        }

        self.notes.sort_by_key(|n| n.tick);
        let channel = match self.channel {
            ChannelTracker::Unset => Some(1),
            ChannelTracker::Single(nibble) => Some(nibble + 1),
            ChannelTracker::Ambiguous => None,
        };
        debug!(
            "track {}: {} notes, {} events, {} diagnostics",
            self.index,
            self.notes.len(),
            self.events.len(),
            self.diagnostics.len()
        );
        Track {
            index: self.index,
            notes: self.notes,
            events: self.events,
            channel,
            diagnostics: self.diagnostics,
        }
    }
}

/// Decode the body of a single `MTrk` chunk.
pub fn decode_track(data: &[u8]) -> Result<Track> {
    TrackData::new(data, 0, 0).parse()
}
