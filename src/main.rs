use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use thousands::Separable;

use midicodec_rs::{load_midi_file, MidiFile, Result};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a summary of a MIDI file
    Inspect {
        /// Path to input MIDI file
        input: PathBuf,

        /// Also list every note and event
        #[arg(short, long)]
        verbose: bool,
    },
    /// Decode a MIDI file and write it back out
    Reencode {
        /// Path to input MIDI file
        input: PathBuf,

        /// Path to output MIDI file
        output: PathBuf,

        /// Rescale to this many ticks per quarter note
        #[arg(long)]
        tpq: Option<u16>,
    },
}

fn print_summary(midi: &MidiFile, verbose: bool) {
    let total_ms = midi.duration().as_millis();
    let minutes = total_ms / 60_000;
    let seconds = (total_ms % 60_000) / 1_000;
    let millis = total_ms % 1_000;

    println!(
        "MIDI Summary:\n\
     - Format: {}\n\
     - Tracks: {}\n\
     - Ticks per quarter: {}\n\
     - Notes: {}\n\
     - Events: {}\n\
     - Total Ticks: {}\n\
     - Total Duration: {:02}:{:02}.{:03}",
        midi.format,
        midi.tracks.len(),
        midi.ticks_per_quarter,
        midi.note_count().separate_with_commas(),
        midi.event_count().separate_with_commas(),
        midi.total_ticks().separate_with_commas(),
        minutes,
        seconds,
        millis,
    );

    for track in &midi.tracks {
        let channel = track
            .channel
            .map_or_else(|| "mixed".to_string(), |c| c.to_string());
        println!(
            "Track {}: channel {}, {} notes, {} events",
            track.index,
            channel,
            track.notes.len().separate_with_commas(),
            track.events.len().separate_with_commas()
        );
        if verbose {
            for event in &track.events {
                println!("  {:>8}  {:?}", event.tick, event.kind);
            }
            for note in &track.notes {
                println!(
                    "  {:>8}  note {} vel {} dur {}",
                    note.tick, note.pitch, note.velocity, note.duration
                );
            }
        }
    }

    for diagnostic in midi.all_diagnostics() {
        eprintln!("warning: {diagnostic}");
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Inspect { input, verbose } => {
            let start = Instant::now();
            let midi = load_midi_file(&input)?;
            print_summary(&midi, verbose);
            println!("Parse Time: {:.2?}", start.elapsed());
        }
        Command::Reencode { input, output, tpq } => {
            let midi = load_midi_file(&input)?;
            let mut score = midi.to_score()?;
            if let Some(tpq) = tpq {
                score = score.with_ticks_per_quarter(tpq)?;
            }
            score.write_file(&output)?;
            println!(
                "Wrote {} bytes to {:?}",
                score.to_bytes()?.len().separate_with_commas(),
                output
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
