//! `dx7tv` — a small CLI that plays one note through the FM engine and
//! writes it to a WAV file. It is a thin driver over [`dx7tv::engine::Engine`]
//! and exists to exercise the synthesis core from the command line; the
//! platform audio/MIDI layers, the "perfect loop" zero-crossing search, and
//! bank/device management the original tool also offered are out of scope
//! here (see SPEC_FULL.md §1).

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use dx7tv::engine::Engine;
use dx7tv::fm::patch::Patch;
use dx7tv::midi::{MidiMessage, MidiParser};
use dx7tv::sysex;
use dx7tv::wav_writer::WavOutput;

/// Render a DX7 voice patch into a WAV file by playing one note.
#[derive(Parser, Clone)]
#[command(name = "dx7tv")]
#[command(about = "Render a DX7 SysEx voice patch to a WAV test vector")]
#[command(version)]
struct Args {
    /// Path to a SysEx file (.syx) holding one or more single-voice dumps.
    sysex_file: String,

    /// MIDI note number to play (0-127, 60 = middle C, 69 = A4).
    midi_note: u8,

    /// Maximum note length in seconds.
    note_length: f64,

    /// Output WAV file path.
    output_file: String,

    /// Sample rate in Hz.
    #[arg(short, long, default_value = "44100")]
    sample_rate: u32,

    /// MIDI velocity (1-127).
    #[arg(long, default_value = "100")]
    velocity: u8,

    /// Which patch to use when `sysex_file` holds more than one voice dump (0-based).
    #[arg(short, long, default_value = "0")]
    patch: usize,

    /// Silence threshold in microseconds before the render stops early.
    #[arg(short = 't', long = "silence-threshold", default_value = "100000")]
    silence_threshold_us: u32,

    /// Verbose output.
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() -> Result<()> {
    if let Err(err) = run(Args::parse()) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
    Ok(())
}

fn run(args: Args) -> Result<()> {
    validate_args(&args)?;

    let patches = load_sysex_file(&args.sysex_file)?;
    if patches.is_empty() {
        return Err(anyhow!("no valid DX7 voice dumps found in '{}'", args.sysex_file));
    }
    if args.patch >= patches.len() {
        return Err(anyhow!(
            "patch index {} out of range (found {} voice(s))",
            args.patch,
            patches.len()
        ));
    }
    let patch = patches[args.patch].clone();

    if args.verbose {
        println!("Loaded patch \"{}\" ({} voice(s) in file)", patch.name, patches.len());
        println!(
            "Playing note {} at velocity {} for up to {:.2}s at {}Hz",
            args.midi_note, args.velocity, args.note_length, args.sample_rate
        );
    }

    let engine = Engine::new(patch, args.sample_rate as f64);
    let samples = engine.render_note(args.midi_note, args.velocity, args.note_length + 1.0)?;

    let mut wav = WavOutput::new(&args.output_file, args.sample_rate, args.silence_threshold_us)?;
    const CHUNK_SIZE: usize = 1024;
    for chunk in samples.chunks(CHUNK_SIZE) {
        if wav.write_samples(chunk)? {
            break;
        }
    }
    wav.finalize()?;

    if args.verbose {
        println!("Wrote '{}'", args.output_file);
    }
    Ok(())
}

/// Scans a SysEx file for `F0 ... F7` frames using the streaming MIDI parser
/// and decodes each one as a single DX7 voice dump, skipping any frame that
/// fails to decode (wrong length, manufacturer ID, or checksum).
fn load_sysex_file(path: &str) -> Result<Vec<Patch>> {
    let bytes = std::fs::read(path).with_context(|| format!("reading '{path}'"))?;

    let mut parser = MidiParser::new();
    let mut patches = Vec::new();
    for &b in &bytes {
        if let Some(MidiMessage::SysEx(frame)) = parser.parse_byte(b) {
            if let Ok(patch) = sysex::decode(&frame) {
                patches.push(patch);
            }
        }
    }
    Ok(patches)
}

fn validate_args(args: &Args) -> Result<()> {
    if !Path::new(&args.sysex_file).exists() {
        return Err(anyhow!("SysEx file '{}' not found", args.sysex_file));
    }
    if args.midi_note > 127 {
        return Err(anyhow!("invalid MIDI note: {} (must be 0-127)", args.midi_note));
    }
    if args.velocity == 0 || args.velocity > 127 {
        return Err(anyhow!("invalid velocity: {} (must be 1-127)", args.velocity));
    }
    if args.note_length <= 0.0 || args.note_length > 60.0 {
        return Err(anyhow!(
            "invalid note length: {}s (must be in (0, 60])",
            args.note_length
        ));
    }
    if !(8000..=192_000).contains(&args.sample_rate) {
        return Err(anyhow!(
            "invalid sample rate: {}Hz (must be 8000-192000)",
            args.sample_rate
        ));
    }
    if args.silence_threshold_us == 0 {
        return Err(anyhow!("silence threshold must be greater than 0"));
    }
    if let Some(parent) = Path::new(&args.output_file).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(anyhow!("output directory '{}' does not exist", parent.display()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_sysex_file() {
        let args = Args {
            sysex_file: "nonexistent.syx".to_string(),
            midi_note: 60,
            note_length: 1.0,
            output_file: "test.wav".to_string(),
            sample_rate: 44100,
            velocity: 100,
            patch: 0,
            silence_threshold_us: 100_000,
            verbose: false,
        };
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn rejects_out_of_range_midi_note() {
        let args = Args {
            sysex_file: "Cargo.toml".to_string(),
            midi_note: 200,
            note_length: 1.0,
            output_file: "test.wav".to_string(),
            sample_rate: 44100,
            velocity: 100,
            patch: 0,
            silence_threshold_us: 100_000,
            verbose: false,
        };
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn rejects_out_of_range_velocity() {
        let args = Args {
            sysex_file: "Cargo.toml".to_string(),
            midi_note: 60,
            note_length: 1.0,
            output_file: "test.wav".to_string(),
            sample_rate: 44100,
            velocity: 0,
            patch: 0,
            silence_threshold_us: 100_000,
            verbose: false,
        };
        assert!(validate_args(&args).is_err());
    }
}
