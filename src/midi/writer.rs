//! Turns notes and meta events into Standard MIDI File bytes.
//!
//! Every event is written with its own status byte; running status is never
//! used on output.

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use log::debug;

use crate::error::{MidiError, Result};
use crate::midi::bytes::{number_to_fixed_bytes, number_to_variable_bytes, string_to_variable_bytes};
use crate::midi::events::{MetaEvent, MetaKind, NoteEvent};
use crate::timing::Timing;

pub const DEFAULT_TICKS_PER_QUARTER: u16 = 192;

/// Ticks between the pitch bend reset of a microtonal note and its note off.
const PITCH_BEND_RESET_GUARD: u64 = 2;
/// Bend units per semitone, assuming the default +/-2 semitone bend range.
const PITCH_BEND_PER_SEMITONE: f64 = 4096.0;

const END_OF_TRACK: [u8; 3] = [0xFF, 0x2F, 0x00];

const CONTROLLER_VOLUME: u8 = 7;
const CONTROLLER_BALANCE: u8 = 8;
const CONTROLLER_PAN: u8 = 10;
const CONTROLLER_SUSTAIN: u8 = 64;

/// Bytes of one event, positioned at an absolute tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedBytes {
    pub tick: u64,
    pub bytes: Vec<u8>,
}

impl TimedBytes {
    fn new(tick: u64, bytes: Vec<u8>) -> Self {
        TimedBytes { tick, bytes }
    }
}

fn check_channel(channel: u8) -> Result<u8> {
    if !(1..=16).contains(&channel) {
        return Err(MidiError::invalid(
            "channel",
            format!("{channel} is not in 1..=16"),
        ));
    }
    Ok(channel - 1)
}

fn check_data_byte(what: &'static str, value: u8) -> Result<u8> {
    if value > 0x7F {
        return Err(MidiError::invalid(what, format!("{value} exceeds 127")));
    }
    Ok(value)
}

fn start_tick(event_timing: &Timing, curr: i64) -> Result<u64> {
    let exact = event_timing.with_all_ticks_exact(curr)?;
    Ok(exact.start_tick(curr) as u64)
}

/// Microseconds per quarter note for `bpm`, as the 3 byte tempo payload.
pub fn tempo_to_bytes(bpm: f64) -> Result<[u8; 3]> {
    if !bpm.is_finite() || bpm <= 0.0 {
        return Err(MidiError::invalid("tempo", format!("{bpm} bpm")));
    }
    let micros = (60_000_000.0 / bpm).round();
    if !(1.0..=f64::from(0xFF_FFFFu32)).contains(&micros) {
        return Err(MidiError::invalid(
            "tempo",
            format!("{bpm} bpm does not fit in 3 bytes"),
        ));
    }
    let bytes = number_to_fixed_bytes(micros as u64, 3)?;
    Ok([bytes[0], bytes[1], bytes[2]])
}

/// The pitch bend message for a signed offset from the centre.
pub fn pitch_bend_to_bytes(value: i16, channel: u8) -> Result<[u8; 3]> {
    let ch = check_channel(channel)?;
    if !(-8192..=8191).contains(&value) {
        return Err(MidiError::invalid(
            "pitch bend",
            format!("{value} is not in -8192..=8191"),
        ));
    }
    let raw = (i32::from(value) + 8192) as u16;
    Ok([0xE0 | ch, (raw & 0x7F) as u8, (raw >> 7) as u8])
}

fn text_event(subtype: u8, text: &str) -> Result<Vec<u8>> {
    let mut out = vec![0xFF, subtype];
    out.extend(string_to_variable_bytes(text)?);
    Ok(out)
}

/// Raw bytes of a meta event's payload on `channel` (1-based).
pub fn meta_kind_to_bytes(kind: &MetaKind, channel: u8) -> Result<Vec<u8>> {
    let ch = check_channel(channel)?;
    let controller = |number: u8, value: u8| -> Result<Vec<u8>> {
        Ok(vec![0xB0 | ch, number, check_data_byte(kind.label(), value)?])
    };
    match kind {
        MetaKind::Sustain(on) => controller(CONTROLLER_SUSTAIN, if *on { 0x7F } else { 0x00 }),
        MetaKind::Volume(v) => controller(CONTROLLER_VOLUME, *v),
        MetaKind::Pan(v) => controller(CONTROLLER_PAN, *v),
        MetaKind::Balance(v) => controller(CONTROLLER_BALANCE, *v),
        MetaKind::Tempo(bpm) => {
            let mut out = vec![0xFF, 0x51, 0x03];
            out.extend(tempo_to_bytes(*bpm)?);
            Ok(out)
        }
        MetaKind::TimeSignature(ts) => {
            let mut out = vec![0xFF, 0x58, 0x04];
            out.extend(ts.to_midi_bytes());
            Ok(out)
        }
        MetaKind::KeySignature(key) => {
            let mut out = vec![0xFF, 0x59, 0x02];
            out.extend(key.to_midi_bytes());
            Ok(out)
        }
        MetaKind::Text(s) => text_event(0x01, s),
        MetaKind::Copyright(s) => text_event(0x02, s),
        MetaKind::TrackName(s) => text_event(0x03, s),
        MetaKind::InstrumentName(s) => text_event(0x04, s),
        MetaKind::Lyric(s) => text_event(0x05, s),
        MetaKind::Marker(s) => text_event(0x06, s),
        MetaKind::CuePoint(s) => text_event(0x07, s),
        MetaKind::Instrument(instrument) => Ok(vec![0xC0 | ch, instrument.program(channel)?]),
        MetaKind::PitchBend(value) => Ok(pitch_bend_to_bytes(*value, channel)?.to_vec()),
        MetaKind::EndTrack => Ok(END_OF_TRACK.to_vec()),
    }
}

pub fn meta_event_to_timed_bytes(event: &MetaEvent, curr: i64, channel: u8) -> Result<TimedBytes> {
    let tick = start_tick(&event.timing, curr)?;
    Ok(TimedBytes::new(tick, meta_kind_to_bytes(&event.kind, channel)?))
}

/// Note on/off pairs for every pitch of the note, plus the pitch bends
/// around microtonal pitches.
pub fn note_event_to_timed_bytes(note: &NoteEvent, curr: i64, channel: u8) -> Result<Vec<TimedBytes>> {
    let ch = check_channel(channel)?;
    let start = start_tick(note.timing(), curr)?;
    let end = start + note.timing().duration_field().unwrap_or(0) as u64;
    let velocity = note.velocity();

    let mut out = Vec::with_capacity(note.pitches().len() * 2);
    for &pitch in note.pitches() {
        // Wider than a MIDI data byte; kept to match existing output.
        if !pitch.is_finite() || !(0.0..256.0).contains(&pitch) {
            return Err(MidiError::invalid("note", format!("pitch {pitch} out of range")));
        }
        let key = pitch.floor();
        let fraction = pitch - key;
        let key = key as u8;

        if fraction == 0.0 {
            out.push(TimedBytes::new(start, vec![0x90 | ch, key, velocity]));
            out.push(TimedBytes::new(end, vec![0x80 | ch, key, velocity]));
        } else {
            let bend = (fraction * PITCH_BEND_PER_SEMITONE).round() as i16;
            let reset = end.saturating_sub(PITCH_BEND_RESET_GUARD).max(start);
            out.push(TimedBytes::new(start, pitch_bend_to_bytes(bend, channel)?.to_vec()));
            out.push(TimedBytes::new(start, vec![0x90 | ch, key, velocity]));
            out.push(TimedBytes::new(reset, pitch_bend_to_bytes(0, channel)?.to_vec()));
            out.push(TimedBytes::new(end, vec![0x80 | ch, key, velocity]));
        }
    }
    Ok(out)
}

/// One track's worth of events to encode.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSource {
    pub channel: u8,
    pub events: Vec<MetaEvent>,
    pub notes: Vec<NoteEvent>,
}

impl TrackSource {
    pub fn new(channel: u8) -> Self {
        TrackSource {
            channel,
            events: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn with_event(mut self, event: MetaEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn with_note(mut self, note: NoteEvent) -> Self {
        self.notes.push(note);
        self
    }
}

/// All bytes of a track sorted by tick, together with the tick the end of
/// track marker was asked for, if any.
///
/// Events and notes each advance their own cursor from tick 0. The sort is
/// stable, so events emitted at the same tick keep their order, meta events
/// ahead of notes.
pub fn ordered_entities_to_timed_midi_bytes(track: &TrackSource) -> Result<(Vec<TimedBytes>, Option<u64>)> {
    let mut timed = Vec::new();
    let mut end_track = None;

    let mut curr = 0i64;
    for event in &track.events {
        let tb = meta_event_to_timed_bytes(event, curr, track.channel)?;
        if event.kind == MetaKind::EndTrack {
            end_track = Some(end_track.map_or(tb.tick, |t: u64| t.max(tb.tick)));
        } else {
            timed.push(tb);
        }
        curr = event.timing.next_tick(curr);
    }

    let mut curr = 0i64;
    for note in &track.notes {
        timed.extend(note_event_to_timed_bytes(note, curr, track.channel)?);
        curr = note.timing().next_tick(curr);
    }

    timed.sort_by_key(|tb| tb.tick);
    Ok((timed, end_track))
}

/// Track body: delta-time prefixed events and the end of track marker.
pub fn timed_bytes_to_track_body(timed: &[TimedBytes], end_track: Option<u64>) -> Result<Vec<u8>> {
    let delta = |from: u64, to: u64| -> Result<Vec<u8>> {
        let d = u32::try_from(to - from)
            .map_err(|_| MidiError::invalid("delta time", format!("{} ticks", to - from)))?;
        number_to_variable_bytes(d)
    };

    let mut out = Vec::new();
    let mut prev = 0u64;
    for tb in timed {
        out.extend(delta(prev, tb.tick)?);
        out.extend_from_slice(&tb.bytes);
        prev = tb.tick;
    }
    let last = end_track.map_or(prev, |t| t.max(prev));
    out.extend(delta(prev, last)?);
    out.extend(END_OF_TRACK);
    Ok(out)
}

/// A complete `MTrk` chunk.
pub fn track_to_bytes(track: &TrackSource) -> Result<Vec<u8>> {
    let (timed, end_track) = ordered_entities_to_timed_midi_bytes(track)?;
    let body = timed_bytes_to_track_body(&timed, end_track)?;
    let mut out = b"MTrk".to_vec();
    out.extend(number_to_fixed_bytes(body.len() as u64, 4)?);
    out.extend(body);
    Ok(out)
}

/// Header chunk for a format 1 file.
pub fn header_to_bytes(track_count: usize, ticks_per_quarter: u16) -> Result<Vec<u8>> {
    if ticks_per_quarter == 0 || ticks_per_quarter & 0x8000 != 0 {
        return Err(MidiError::invalid(
            "header",
            format!("ticks per quarter note {ticks_per_quarter} not in 1..=32767"),
        ));
    }
    let mut out = b"MThd".to_vec();
    out.extend(number_to_fixed_bytes(6, 4)?);
    out.extend(number_to_fixed_bytes(1, 2)?);
    out.extend(number_to_fixed_bytes(track_count as u64, 2)?);
    out.extend(number_to_fixed_bytes(u64::from(ticks_per_quarter), 2)?);
    Ok(out)
}

/// A whole file to encode. Encoded bytes are computed once and cached.
#[derive(Debug, Clone)]
pub struct Score {
    ticks_per_quarter: u16,
    tracks: Vec<TrackSource>,
    encoded: OnceLock<Vec<u8>>,
}

impl Default for Score {
    fn default() -> Self {
        Score::new(DEFAULT_TICKS_PER_QUARTER)
    }
}

impl Score {
    pub fn new(ticks_per_quarter: u16) -> Self {
        Score {
            ticks_per_quarter,
            tracks: Vec::new(),
            encoded: OnceLock::new(),
        }
    }

    pub fn with_track(self, track: TrackSource) -> Self {
        let mut tracks = self.tracks;
        tracks.push(track);
        Score {
            ticks_per_quarter: self.ticks_per_quarter,
            tracks,
            encoded: OnceLock::new(),
        }
    }

    pub fn ticks_per_quarter(&self) -> u16 {
        self.ticks_per_quarter
    }

    pub fn tracks(&self) -> &[TrackSource] {
        &self.tracks
    }

    /// The same music at another resolution. Fails if a tick would land
    /// between two ticks of the new resolution.
    pub fn with_ticks_per_quarter(&self, ticks_per_quarter: u16) -> Result<Score> {
        let rescale = |timing: &Timing| -> Result<Timing> {
            timing
                .augment(f64::from(ticks_per_quarter))?
                .diminish(f64::from(self.ticks_per_quarter))
        };
        let mut score = Score::new(ticks_per_quarter);
        for track in &self.tracks {
            let mut scaled = TrackSource::new(track.channel);
            for event in &track.events {
                scaled = scaled.with_event(event.clone().with_timing(rescale(&event.timing)?));
            }
            for note in &track.notes {
                scaled = scaled.with_note(note.clone().with_timing(rescale(note.timing())?)?);
            }
            score = score.with_track(scaled);
        }
        Ok(score)
    }

    /// Encodes the whole file. Nothing is returned unless every track
    /// encodes cleanly.
    pub fn to_bytes(&self) -> Result<&[u8]> {
        if let Some(bytes) = self.encoded.get() {
            return Ok(bytes.as_slice());
        }
        let mut out = header_to_bytes(self.tracks.len(), self.ticks_per_quarter)?;
        for track in &self.tracks {
            out.extend(track_to_bytes(track)?);
        }
        debug!("encoded {} track(s) into {} bytes", self.tracks.len(), out.len());
        Ok(self.encoded.get_or_init(|| out).as_slice())
    }

    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }
}

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.ticks_per_quarter == other.ticks_per_quarter && self.tracks == other.tracks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::instrument::Instrument;

    fn bytes_of(track: &TrackSource) -> Vec<u8> {
        let (timed, end) = ordered_entities_to_timed_midi_bytes(track).unwrap();
        timed_bytes_to_track_body(&timed, end).unwrap()
    }

    #[test]
    fn tempo_bytes() {
        assert_eq!(tempo_to_bytes(144.0).unwrap(), [0x06, 0x5B, 0x9B]);
        assert_eq!(tempo_to_bytes(60.0).unwrap(), [0x0F, 0x42, 0x40]);
        assert!(tempo_to_bytes(0.0).is_err());
        assert!(tempo_to_bytes(-10.0).is_err());
        assert!(tempo_to_bytes(1.0).is_err());
    }

    #[test]
    fn pitch_bend_bytes() {
        assert_eq!(pitch_bend_to_bytes(0, 1).unwrap(), [0xE0, 0x00, 0x40]);
        assert_eq!(pitch_bend_to_bytes(-8192, 2).unwrap(), [0xE1, 0x00, 0x00]);
        assert_eq!(pitch_bend_to_bytes(8191, 16).unwrap(), [0xEF, 0x7F, 0x7F]);
        assert!(pitch_bend_to_bytes(8192, 1).is_err());
        assert!(pitch_bend_to_bytes(-8193, 1).is_err());
    }

    #[test]
    fn meta_kinds() {
        assert_eq!(meta_kind_to_bytes(&MetaKind::Sustain(true), 1).unwrap(), vec![0xB0, 64, 127]);
        assert_eq!(meta_kind_to_bytes(&MetaKind::Volume(100), 3).unwrap(), vec![0xB2, 7, 100]);
        assert_eq!(meta_kind_to_bytes(&MetaKind::Pan(64), 1).unwrap(), vec![0xB0, 10, 64]);
        assert_eq!(meta_kind_to_bytes(&MetaKind::Balance(0), 1).unwrap(), vec![0xB0, 8, 0]);
        assert!(meta_kind_to_bytes(&MetaKind::Volume(128), 1).is_err());
        assert_eq!(
            meta_kind_to_bytes(&MetaKind::TrackName("Lead".into()), 1).unwrap(),
            vec![0xFF, 0x03, 0x04, b'L', b'e', b'a', b'd']
        );
        assert_eq!(
            meta_kind_to_bytes(&MetaKind::Instrument(Instrument::by_name("violin").unwrap()), 2).unwrap(),
            vec![0xC1, 40]
        );
        assert_eq!(
            meta_kind_to_bytes(&MetaKind::TimeSignature("6/8".parse().unwrap()), 1).unwrap(),
            vec![0xFF, 0x58, 0x04, 6, 3, 0x18, 0x08]
        );
        assert_eq!(
            meta_kind_to_bytes(&MetaKind::KeySignature("eb".parse().unwrap()), 1).unwrap(),
            vec![0xFF, 0x59, 0x02, 0xFA, 0x01]
        );
        assert!(meta_kind_to_bytes(&MetaKind::Volume(1), 17).is_err());
        assert!(meta_kind_to_bytes(&MetaKind::Volume(1), 0).is_err());
    }

    #[test]
    fn single_note_track() {
        let track = TrackSource::new(1).with_note(NoteEvent::single(60.0, 50, 8).unwrap());
        assert_eq!(
            bytes_of(&track),
            vec![0x00, 0x90, 0x3C, 0x32, 0x08, 0x80, 0x3C, 0x32, 0x00, 0xFF, 0x2F, 0x00]
        );
        let chunk = track_to_bytes(&track).unwrap();
        assert_eq!(&chunk[..8], &[0x4D, 0x54, 0x72, 0x6B, 0x00, 0x00, 0x00, 0x0C]);
    }

    #[test]
    fn notes_follow_each_other() {
        let track = TrackSource::new(1)
            .with_note(NoteEvent::single(60.0, 50, 8).unwrap())
            .with_note(NoteEvent::single(62.0, 50, 8).unwrap());
        assert_eq!(
            bytes_of(&track),
            vec![
                0x00, 0x90, 60, 50, 0x08, 0x80, 60, 50, 0x00, 0x90, 62, 50, 0x08, 0x80, 62, 50,
                0x00, 0xFF, 0x2F, 0x00
            ]
        );
    }

    #[test]
    fn chord_and_rest_via_delay() {
        let chord = NoteEvent::new(vec![60.0, 64.0], 90, Timing::duration(4).unwrap()).unwrap();
        let late = NoteEvent::new(vec![67.0], 90, Timing::duration(4).unwrap().with_delay(2)).unwrap();
        let track = TrackSource::new(1).with_note(chord).with_note(late);
        let (timed, _) = ordered_entities_to_timed_midi_bytes(&track).unwrap();
        let ticks: Vec<u64> = timed.iter().map(|tb| tb.tick).collect();
        assert_eq!(ticks, vec![0, 0, 4, 4, 6, 10]);
        assert_eq!(timed[0].bytes, vec![0x90, 60, 90]);
        assert_eq!(timed[1].bytes, vec![0x90, 64, 90]);
    }

    #[test]
    fn offset_shifts_only_its_note() {
        let first = NoteEvent::new(vec![60.0], 90, Timing::duration(4).unwrap().with_offset(1)).unwrap();
        let second = NoteEvent::single(62.0, 90, 4).unwrap();
        let track = TrackSource::new(1).with_note(first).with_note(second);
        let (timed, _) = ordered_entities_to_timed_midi_bytes(&track).unwrap();
        let ticks: Vec<u64> = timed.iter().map(|tb| tb.tick).collect();
        assert_eq!(ticks, vec![1, 4, 5, 8]);
    }

    #[test]
    fn microtonal_note() {
        let note = NoteEvent::single(60.5, 100, 10).unwrap();
        let timed = note_event_to_timed_bytes(&note, 0, 1).unwrap();
        assert_eq!(
            timed,
            vec![
                TimedBytes::new(0, vec![0xE0, 0x00, 0x50]),
                TimedBytes::new(0, vec![0x90, 60, 100]),
                TimedBytes::new(8, vec![0xE0, 0x00, 0x40]),
                TimedBytes::new(10, vec![0x80, 60, 100]),
            ]
        );
    }

    #[test]
    fn short_microtonal_note_resets_at_start() {
        let note = NoteEvent::single(61.25, 100, 1).unwrap();
        let timed = note_event_to_timed_bytes(&note, 4, 1).unwrap();
        assert_eq!(timed[2].tick, 4);
        assert_eq!(timed[3].tick, 5);
    }

    #[test]
    fn pitch_range() {
        assert!(note_event_to_timed_bytes(&NoteEvent::single(255.0, 1, 1).unwrap(), 0, 1).is_ok());
        assert!(note_event_to_timed_bytes(&NoteEvent::single(256.0, 1, 1).unwrap(), 0, 1).is_err());
        assert!(note_event_to_timed_bytes(&NoteEvent::single(-1.0, 1, 1).unwrap(), 0, 1).is_err());
    }

    #[test]
    fn meta_events_sort_ahead_of_notes() {
        let track = TrackSource::new(1)
            .with_event(MetaEvent::new(MetaKind::Tempo(60.0)))
            .with_event(MetaEvent::at(MetaKind::Marker("B".into()), 8).unwrap())
            .with_note(NoteEvent::single(60.0, 50, 8).unwrap());
        assert_eq!(
            bytes_of(&track),
            vec![
                0x00, 0xFF, 0x51, 0x03, 0x0F, 0x42, 0x40, 0x00, 0x90, 60, 50, 0x08, 0xFF, 0x06,
                0x01, b'B', 0x00, 0x80, 60, 50, 0x00, 0xFF, 0x2F, 0x00
            ]
        );
    }

    #[test]
    fn end_track_extends_the_track() {
        let track = TrackSource::new(1)
            .with_event(MetaEvent::at(MetaKind::EndTrack, 20).unwrap())
            .with_note(NoteEvent::single(60.0, 50, 8).unwrap());
        assert_eq!(
            bytes_of(&track),
            vec![0x00, 0x90, 60, 50, 0x08, 0x80, 60, 50, 0x0C, 0xFF, 0x2F, 0x00]
        );
    }

    #[test]
    fn empty_score() {
        let score = Score::default();
        assert_eq!(
            score.to_bytes().unwrap(),
            &[0x4D, 0x54, 0x68, 0x64, 0x00, 0x00, 0x00, 0x06, 0x00, 0x01, 0x00, 0x00, 0x00, 0xC0]
        );
    }

    #[test]
    fn change_resolution() {
        let score = Score::new(192)
            .with_track(TrackSource::new(1).with_note(NoteEvent::single(60.0, 50, 8).unwrap()));
        let doubled = score.with_ticks_per_quarter(384).unwrap();
        assert_eq!(doubled.ticks_per_quarter(), 384);
        assert_eq!(doubled.tracks()[0].notes[0].timing().duration_field(), Some(16));
        assert_eq!(
            score.with_ticks_per_quarter(96).unwrap().tracks()[0].notes[0]
                .timing()
                .duration_field(),
            Some(4)
        );
        assert!(score.with_ticks_per_quarter(5).is_err());
    }

    #[test]
    fn encoding_is_all_or_nothing() {
        let score = Score::default()
            .with_track(TrackSource::new(1).with_note(NoteEvent::single(60.0, 50, 8).unwrap()))
            .with_track(TrackSource::new(1).with_event(MetaEvent::new(MetaKind::PitchBend(9000))));
        assert!(score.to_bytes().is_err());
        assert!(Score::new(0).to_bytes().is_err());
    }

    #[test]
    fn negative_start_is_rejected() {
        let note = NoteEvent::new(vec![60.0], 1, Timing::duration(4).unwrap().with_offset(-1)).unwrap();
        assert!(note_event_to_timed_bytes(&note, 0, 1).is_err());
    }
}
