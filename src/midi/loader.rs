use std::fs;
use std::path::Path;
use std::time::Duration;

use log::debug;
use rayon::prelude::*;

use crate::error::{MidiError, Result};
use crate::midi::bytes::fixed_bytes_to_number;
use crate::midi::diagnostics::{report, Diagnostic, Warning};
use crate::midi::events::MetaKind;
use crate::midi::track_data::{Track, TrackData};
use crate::midi::writer::Score;

/// Tempo assumed until the first tempo event.
pub const DEFAULT_BPM: f64 = 120.0;

/// A decoded Standard MIDI File.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiFile {
    pub format: u16,
    pub ticks_per_quarter: u16,
    pub tracks: Vec<Track>,
    /// Problems found outside of any track chunk.
    pub diagnostics: Vec<Diagnostic>,
}

impl MidiFile {
    pub fn note_count(&self) -> usize {
        self.tracks.iter().map(|t| t.notes.len()).sum()
    }

    pub fn event_count(&self) -> usize {
        self.tracks.iter().map(|t| t.events.len()).sum()
    }

    pub fn total_ticks(&self) -> u64 {
        self.tracks.iter().map(Track::total_ticks).max().unwrap_or(0)
    }

    /// File level diagnostics followed by those of every track.
    pub fn all_diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .chain(self.tracks.iter().flat_map(|t| t.diagnostics.iter()))
    }

    /// Playing time of the file, following every tempo change.
    pub fn duration(&self) -> Duration {
        let mut tempos: Vec<(u64, f64)> = self
            .tracks
            .iter()
            .flat_map(|t| t.events.iter())
            .filter_map(|e| match e.kind {
                MetaKind::Tempo(bpm) => Some((e.tick, bpm)),
                _ => None,
            })
            .collect();
        tempos.sort_by_key(|(tick, _)| *tick);

        let tpq = f64::from(self.ticks_per_quarter);
        let end = self.total_ticks();
        let mut micros = 0.0;
        let mut last_tick = 0u64;
        let mut bpm = DEFAULT_BPM;
        for (tick, next_bpm) in tempos {
            if tick >= end {
                break;
            }
            micros += (tick - last_tick) as f64 * 60_000_000.0 / bpm / tpq;
            last_tick = tick;
            bpm = next_bpm;
        }
        micros += (end - last_tick) as f64 * 60_000_000.0 / bpm / tpq;
        Duration::from_micros(micros.round() as u64)
    }

    /// Rebuilds an encodable score from the decoded tracks.
    pub fn to_score(&self) -> Result<Score> {
        self.tracks
            .iter()
            .try_fold(Score::new(self.ticks_per_quarter), |score, track| {
                Ok(score.with_track(track.to_source()?))
            })
    }
}

/// Bounds-checked reads over the whole file.
struct Chunks<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Chunks<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let available = self.data.len() - self.offset;
        if available < len {
            return Err(MidiError::Truncated {
                offset: self.offset,
                needed: len - available,
            });
        }
        let data = self.data;
        let bytes = &data[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    fn number(&mut self, len: usize) -> Result<u64> {
        Ok(fixed_bytes_to_number(self.take(len)?))
    }
}

/// Load a MIDI file from disk.
pub fn load_midi_file<P: AsRef<Path>>(filename: P) -> Result<MidiFile> {
    let data = fs::read(&filename)?;
    parse_midi_bytes(&data)
}

/// Decode a complete Standard MIDI File held in memory.
pub fn parse_midi_bytes(data: &[u8]) -> Result<MidiFile> {
    let mut chunks = Chunks { data, offset: 0 };

    // Read and verify the header
    if chunks.take(4)? != b"MThd" {
        return Err(MidiError::malformed(0, "not a MIDI file"));
    }
    let header_len = chunks.number(4)?;
    if header_len != 6 {
        return Err(MidiError::malformed(
            4,
            format!("invalid header length {header_len}"),
        ));
    }
    let format = chunks.number(2)? as u16;
    if format > 1 {
        return Err(MidiError::UnsupportedFormat(format));
    }
    let num_tracks = chunks.number(2)? as usize;

    let time_div = chunks.number(2)? as u16;
    if time_div & 0x8000 != 0 {
        return Err(MidiError::malformed(12, "SMPTE timing is not supported"));
    }
    if time_div == 0 {
        return Err(MidiError::malformed(12, "ticks per quarter note is zero"));
    }

    // Slice out the track chunks; the bodies are decoded afterwards.
    let mut diagnostics = Vec::new();
    let mut slices = Vec::with_capacity(num_tracks);
    while slices.len() < num_tracks {
        let chunk_start = chunks.offset;
        let id = chunks.take(4)?;
        let length = chunks.number(4)? as usize;
        let base = chunks.offset;
        let body = chunks.take(length)?;
        if id == b"MTrk" {
            slices.push((base, body));
        } else {
            let id = [id[0], id[1], id[2], id[3]];
            report(
                &mut diagnostics,
                Diagnostic {
                    track: None,
                    offset: chunk_start,
                    tick: 0,
                    warning: Warning::UnknownChunk { id },
                },
            );
        }
    }
    if chunks.offset < data.len() {
        debug!("{} trailing bytes after the last track", data.len() - chunks.offset);
    }

    let tracks = slices
        .par_iter()
        .enumerate()
        .map(|(index, (base, body))| TrackData::new(body, *base, index).parse())
        .collect::<Result<Vec<Track>>>()?;

    Ok(MidiFile {
        format,
        ticks_per_quarter: time_div,
        tracks,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(tracks: &[&[u8]]) -> Vec<u8> {
        let mut out = vec![0x4D, 0x54, 0x68, 0x64, 0, 0, 0, 6, 0, 1, 0, tracks.len() as u8, 0, 0xC0];
        for body in tracks {
            out.extend(b"MTrk");
            out.extend((body.len() as u32).to_be_bytes());
            out.extend(*body);
        }
        out
    }

    const NOTE: &[u8] = &[0x00, 0x90, 0x3C, 0x32, 0x08, 0x80, 0x3C, 0x32, 0x00, 0xFF, 0x2F, 0x00];

    #[test]
    fn parses_header_and_tracks() {
        let midi = parse_midi_bytes(&file(&[NOTE, NOTE])).unwrap();
        assert_eq!(midi.format, 1);
        assert_eq!(midi.ticks_per_quarter, 192);
        assert_eq!(midi.tracks.len(), 2);
        assert_eq!(midi.tracks[1].index, 1);
        assert_eq!(midi.note_count(), 2);
        assert_eq!(midi.total_ticks(), 8);
    }

    #[test]
    fn empty_file() {
        let midi = parse_midi_bytes(&file(&[])).unwrap();
        assert!(midi.tracks.is_empty());
        assert_eq!(midi.duration(), Duration::ZERO);
    }

    #[test]
    fn header_errors() {
        let mut bad = file(&[]);
        bad[0] = b'X';
        assert!(parse_midi_bytes(&bad).is_err());

        let mut bad = file(&[]);
        bad[7] = 7;
        assert!(parse_midi_bytes(&bad).is_err());

        let mut bad = file(&[]);
        bad[9] = 2;
        assert!(matches!(parse_midi_bytes(&bad), Err(MidiError::UnsupportedFormat(2))));

        let mut bad = file(&[]);
        bad[13] = 0;
        assert!(parse_midi_bytes(&bad).is_err());

        let mut bad = file(&[]);
        bad[12] = 0xE7;
        assert!(parse_midi_bytes(&bad).is_err());

        assert!(matches!(parse_midi_bytes(b"MThd"), Err(MidiError::Truncated { .. })));
    }

    #[test]
    fn truncated_track_chunk() {
        let mut data = file(&[NOTE]);
        data.truncate(data.len() - 3);
        assert!(matches!(
            parse_midi_bytes(&data),
            Err(MidiError::Truncated { needed: 3, .. })
        ));
    }

    #[test]
    fn skips_unknown_chunks() {
        let mut data = file(&[NOTE]);
        data[11] = 1;
        let mut alien = b"XFIH".to_vec();
        alien.extend([0, 0, 0, 2, 0xAA, 0xBB]);
        data.splice(14..14, alien);
        let midi = parse_midi_bytes(&data).unwrap();
        assert_eq!(midi.tracks.len(), 1);
        assert_eq!(midi.diagnostics[0].warning, Warning::UnknownChunk { id: *b"XFIH" });
        assert_eq!(midi.diagnostics[0].offset, 14);
    }

    #[test]
    fn duration_follows_tempo_changes() {
        // one quarter at 60 bpm then one quarter at 120 bpm
        let track: &[u8] = &[
            0x00, 0xFF, 0x51, 0x03, 0x0F, 0x42, 0x40, //
            0x81, 0x40, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, //
            0x81, 0x40, 0xFF, 0x2F, 0x00,
        ];
        let midi = parse_midi_bytes(&file(&[track])).unwrap();
        assert_eq!(midi.total_ticks(), 384);
        assert_eq!(midi.duration(), Duration::from_millis(1500));
    }

    #[test]
    fn track_errors_carry_file_offsets() {
        let err = parse_midi_bytes(&file(&[&[0x00, 0xB0, 0x07, 0x80]])).unwrap_err();
        assert_eq!(err.to_string(), "controller value 128 out of range at byte 25");
    }
}
