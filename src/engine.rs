//! The voice manager: a fixed 16-voice pool, MIDI dispatch, and the single
//! coarse lock shared between a (hypothetical) MIDI thread and the audio
//! render path.

use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};

use crate::fm::controllers::{ControlAction, Controllers};
use crate::fm::patch::Patch;
use crate::fm::voice::Voice;
use crate::midi::{MidiMessage, MidiParser};

/// Fixed voice pool size.
pub const NUM_VOICES: usize = 16;

/// Counters for what the engine has done since construction, useful for
/// diagnostics and tests. Mirrors the statistics readout the MIDI subsystem
/// this crate is modeled on prints to its console.
#[derive(Clone, Copy, Debug, Default)]
pub struct Statistics {
    /// Notes successfully allocated a free voice.
    pub notes_played: u64,
    /// Notes that had to steal an already-sounding voice.
    pub voice_steals: u64,
    /// Bytes or messages the MIDI parser couldn't interpret.
    pub midi_parse_errors: u64,
    /// Voices currently active (sounding or releasing).
    pub active_voice_count: usize,
}

struct Inner {
    patch: Patch,
    voices: [Voice; NUM_VOICES],
    controllers: Controllers,
    parser: MidiParser,
    sample_rate: f64,
    notes_played: u64,
    voice_steals: u64,
    playing: bool,
    channel: u8,
}

/// Owns the voice pool, current patch, controller state, and MIDI parser
/// behind a single mutex. Safe to share between a MIDI-feeding thread and an
/// audio-rendering thread; the audio thread never allocates or logs.
pub struct Engine {
    inner: Mutex<Inner>,
}

impl Engine {
    /// Creates an engine with the given patch loaded and play mode stopped.
    pub fn new(patch: Patch, sample_rate: f64) -> Self {
        Engine {
            inner: Mutex::new(Inner {
                patch,
                voices: std::array::from_fn(|_| Voice::default()),
                controllers: Controllers::default(),
                parser: MidiParser::new(),
                sample_rate,
                notes_played: 0,
                voice_steals: 0,
                playing: false,
                channel: 0,
            }),
        }
    }

    /// Replaces the currently loaded patch. Does not affect already-sounding voices.
    pub fn load_patch(&self, patch: Patch) -> Result<()> {
        let mut inner = self.lock()?;
        inner.patch = patch;
        Ok(())
    }

    /// Sets the MIDI channel (0..15) the engine listens on. Messages
    /// addressed to any other channel are dropped by the dispatcher.
    pub fn set_channel(&self, channel: u8) -> Result<()> {
        self.lock()?.channel = channel & 0x0F;
        Ok(())
    }

    /// Returns the MIDI channel the engine currently listens on.
    pub fn channel(&self) -> Result<u8> {
        Ok(self.lock()?.channel)
    }

    /// Enters play mode: `render_block` produces audio instead of silence.
    pub fn start_play(&self) -> Result<()> {
        self.lock()?.playing = true;
        Ok(())
    }

    /// Leaves play mode and silences every voice.
    pub fn stop_play(&self) -> Result<()> {
        let mut inner = self.lock()?;
        inner.playing = false;
        for voice in &mut inner.voices {
            voice.active = false;
        }
        Ok(())
    }

    /// Feeds raw MIDI bytes (e.g. from a serial or virtual MIDI port) into the
    /// parser, dispatching each completed message. `timestamp_us` is a
    /// monotonic microsecond clock value used for voice-steal ordering.
    pub fn push_midi_bytes(&self, bytes: &[u8], timestamp_us: u64) -> Result<()> {
        let mut inner = self.lock()?;
        for &b in bytes {
            if let Some(msg) = inner.parser.parse_byte(b) {
                dispatch(&mut inner, msg, timestamp_us);
            }
        }
        Ok(())
    }

    /// Renders one block of audio into `out`, accumulating all active voices.
    /// Fills with silence if play mode is stopped.
    pub fn render_block(&self, out: &mut [f32]) -> Result<()> {
        let mut inner = self.lock()?;
        if !inner.playing {
            out.fill(0.0);
            return Ok(());
        }

        let Inner {
            patch,
            voices,
            controllers,
            sample_rate,
            ..
        } = &mut *inner;

        out.fill(0.0);
        for voice in voices.iter_mut() {
            if !voice.active {
                continue;
            }
            for sample in out.iter_mut() {
                let mut s = voice.render_sample(
                    patch,
                    controllers.pitch_bend,
                    controllers.mod_wheel,
                    true,
                    *sample_rate,
                );
                s *= controllers.volume as f64;
                s *= controllers.expression as f64;
                s *= voice.velocity as f64 / 127.0;
                *sample += (s * 0.5) as f32;
            }
            if voice.finished() {
                voice.active = false;
            }
        }
        Ok(())
    }

    /// Renders a single note offline: triggers note-on, renders until the
    /// voice finishes or `max_seconds` elapses, and returns the samples.
    /// Convenience for the CLI and tests; bypasses the voice pool entirely.
    /// Not "live play mode", so the LFO runs at its unscaled speed regardless
    /// of mod wheel (there is no MIDI controller driving this render at all).
    pub fn render_note(&self, note: u8, velocity: u8, max_seconds: f64) -> Result<Vec<f32>> {
        let inner = self.lock()?;
        let sample_rate = inner.sample_rate;
        let patch = inner.patch.clone();
        drop(inner);

        let mut voice = Voice::default();
        voice.note_on(&patch, note, velocity, 0, 0, sample_rate);

        let max_samples = (max_seconds * sample_rate) as usize;
        let mut out = Vec::with_capacity(max_samples.min(1 << 20));
        for _ in 0..max_samples {
            let s = voice.render_sample(&patch, 0.0, 0.0, false, sample_rate);
            out.push((s * velocity as f64 / 127.0) as f32);
            if voice.finished() {
                break;
            }
        }
        Ok(out)
    }

    /// A snapshot of engine activity counters.
    pub fn statistics(&self) -> Result<Statistics> {
        let inner = self.lock()?;
        Ok(Statistics {
            notes_played: inner.notes_played,
            voice_steals: inner.voice_steals,
            midi_parse_errors: inner.parser.parse_errors,
            active_voice_count: inner.voices.iter().filter(|v| v.active).count(),
        })
    }

    /// A snapshot of the current controller values (pitch bend, mod wheel,
    /// volume, expression, sustain, and the raw CC array).
    pub fn controllers(&self) -> Result<Controllers> {
        Ok(self.lock()?.controllers.clone())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("engine voice lock poisoned"))
            .context("a prior panic while holding the voice lock left it poisoned")
    }
}

/// Every channel-voice message carries its own channel; only `SysEx` has none.
fn message_channel(msg: &MidiMessage) -> Option<u8> {
    match *msg {
        MidiMessage::NoteOn { channel, .. }
        | MidiMessage::NoteOff { channel, .. }
        | MidiMessage::ControlChange { channel, .. }
        | MidiMessage::ProgramChange { channel, .. }
        | MidiMessage::ChannelPressure { channel, .. }
        | MidiMessage::PitchBend { channel, .. } => Some(channel),
        MidiMessage::SysEx(_) => None,
    }
}

fn dispatch(inner: &mut Inner, msg: MidiMessage, timestamp_us: u64) {
    if let Some(channel) = message_channel(&msg) {
        if channel != inner.channel {
            return;
        }
    }

    match msg {
        MidiMessage::NoteOn { note, velocity, .. } => {
            allocate_or_steal(inner, note, velocity, timestamp_us);
        }
        MidiMessage::NoteOff { note, .. } => {
            note_off(inner, note);
        }
        MidiMessage::ControlChange {
            controller, value, ..
        } => {
            let action = inner.controllers.control_change(controller, value);
            match action {
                ControlAction::None => {}
                ControlAction::SustainReleased => release_sustained(inner),
                ControlAction::ReleaseAll => release_all(inner),
            }
        }
        MidiMessage::PitchBend { value, .. } => {
            inner.controllers.pitch_bend(value);
        }
        MidiMessage::ProgramChange { .. } | MidiMessage::ChannelPressure { .. } => {
            // Declared non-goals: no program bank or aftertouch modulation routing.
        }
        MidiMessage::SysEx(_) => {
            // Bank dumps are out of scope for the voice manager; see crate::sysex
            // for single-voice decode, invoked explicitly by the caller.
        }
    }
}

fn allocate_or_steal(inner: &mut Inner, note: u8, velocity: u8, timestamp_us: u64) {
    if velocity == 0 {
        note_off(inner, note);
        return;
    }

    let sample_rate = inner.sample_rate;
    let patch = inner.patch.clone();
    let channel = inner.channel;

    if let Some(slot) = inner.voices.iter_mut().find(|v| !v.active) {
        slot.note_on(&patch, note, velocity, channel, timestamp_us, sample_rate);
        inner.notes_played += 1;
        return;
    }

    let oldest = inner
        .voices
        .iter()
        .enumerate()
        .min_by_key(|(_, v)| v.note_on_time)
        .map(|(i, _)| i)
        .expect("voice pool is non-empty");

    inner.voices[oldest].note_on(&patch, note, velocity, channel, timestamp_us, sample_rate);
    inner.voice_steals += 1;
}

fn note_off(inner: &mut Inner, note: u8) {
    let sustain = inner.controllers.sustain_pedal;
    let sample_rate = inner.sample_rate;
    let patch = inner.patch.clone();
    let channel = inner.channel;

    for voice in inner.voices.iter_mut() {
        if voice.active && voice.midi_note == note && voice.channel == channel {
            if sustain {
                voice.sustain_held = true;
            } else {
                voice.release(&patch, sample_rate);
            }
        }
    }
}

fn release_sustained(inner: &mut Inner) {
    let sample_rate = inner.sample_rate;
    let patch = inner.patch.clone();
    for voice in inner.voices.iter_mut() {
        if voice.active && voice.sustain_held {
            voice.release(&patch, sample_rate);
            voice.sustain_held = false;
        }
    }
}

/// Instantly silences every voice (CC 120 all-sound-off, CC 123 all-notes-off).
/// Unlike `release_sustained`, this does not trigger an envelope Release tail
/// — the voice just stops, matching `release_all_voices()` in the source.
fn release_all(inner: &mut Inner) {
    for voice in inner.voices.iter_mut() {
        voice.active = false;
        voice.sustain_held = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fm::controllers::cc;

    #[test]
    fn render_note_produces_nonzero_samples() {
        let engine = Engine::new(Patch::default(), 48_000.0);
        let samples = engine.render_note(69, 100, 2.0).unwrap();
        assert!(samples.iter().any(|&s| s.abs() > 1e-4));
    }

    #[test]
    fn seventeen_note_ons_steal_the_oldest_voice() {
        let engine = Engine::new(Patch::default(), 48_000.0);
        engine.start_play().unwrap();
        for i in 0..NUM_VOICES as u8 {
            engine
                .push_midi_bytes(&[0x90, 40 + i, 100], i as u64 * 1000)
                .unwrap();
        }
        let stats_before = engine.statistics().unwrap();
        assert_eq!(stats_before.active_voice_count, NUM_VOICES);
        assert_eq!(stats_before.notes_played, NUM_VOICES as u64);

        engine
            .push_midi_bytes(&[0x90, 99, 100], NUM_VOICES as u64 * 1000)
            .unwrap();
        let stats_after = engine.statistics().unwrap();
        assert_eq!(stats_after.voice_steals, 1);
        assert_eq!(stats_after.active_voice_count, NUM_VOICES);
    }

    #[test]
    fn sustain_holds_note_off_until_pedal_released() {
        let engine = Engine::new(Patch::default(), 48_000.0);
        engine.start_play().unwrap();
        engine.push_midi_bytes(&[0xB0, cc::SUSTAIN, 127], 0).unwrap();
        engine.push_midi_bytes(&[0x90, 60, 100], 1).unwrap();
        engine.push_midi_bytes(&[0x80, 60, 0], 2).unwrap();

        let mut buf = [0.0f32; 64];
        engine.render_block(&mut buf).unwrap();
        assert_eq!(engine.statistics().unwrap().active_voice_count, 1);

        engine.push_midi_bytes(&[0xB0, cc::SUSTAIN, 0], 3).unwrap();
        engine.render_block(&mut buf).unwrap();
    }

    #[test]
    fn all_notes_off_silences_every_voice_instantly() {
        let engine = Engine::new(Patch::default(), 48_000.0);
        engine.start_play().unwrap();
        engine.push_midi_bytes(&[0x90, 60, 100], 0).unwrap();
        engine.push_midi_bytes(&[0x90, 64, 100], 1).unwrap();
        engine
            .push_midi_bytes(&[0xB0, cc::ALL_NOTES_OFF, 0], 2)
            .unwrap();

        // No envelope release tail: voices go inactive immediately, before
        // even one block is rendered.
        assert_eq!(engine.statistics().unwrap().active_voice_count, 0);

        let mut buf = [0.0f32; 16];
        engine.render_block(&mut buf).unwrap();
        assert_eq!(engine.statistics().unwrap().active_voice_count, 0);
    }
}
