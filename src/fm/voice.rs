//! A single polyphonic voice: six operators, six envelopes, one LFO phase.
//!
//! `Voice::render_sample` is the per-sample synthesis kernel: it steps every
//! envelope, advances the LFO and the six oscillator phases, applies keyboard
//! scaling and LFO modulation, and routes the result through the patch's
//! algorithm. Everything else (allocation, stealing, sustain) is the voice
//! manager's job, in `crate::engine`.

use std::f64::consts::TAU;

use crate::fm::algorithms::{algorithm, process_algorithm};
use crate::fm::envelope::Envelope;
use crate::fm::operator::{calculate_key_scaling, midi_note_to_frequency, OperatorState};
use crate::fm::patch::{Patch, NUM_OPERATORS};

/// Per-operator state captured once at note-on and held for the note's life.
#[derive(Clone, Copy, Debug, Default)]
struct OperatorNoteState {
    osc: OperatorState,
    freq_ratio_detuned: f64,
    level_scale: f64,
    rate_scale: f64,
}

/// One active (or free) voice slot in the 16-voice pool.
#[derive(Clone, Debug)]
pub struct Voice {
    /// Whether this slot currently holds a sounding or releasing note.
    pub active: bool,
    /// MIDI note number this voice is playing.
    pub midi_note: u8,
    /// Note-on velocity, 0..127.
    pub velocity: u8,
    /// MIDI channel this voice was allocated on.
    pub channel: u8,
    /// Monotonic microsecond timestamp of the note-on, used for steal ordering.
    pub note_on_time: u64,
    /// Whether the sustain pedal is currently holding this voice past its note-off.
    pub sustain_held: bool,

    operators: [OperatorNoteState; NUM_OPERATORS],
    envelopes: [Envelope; NUM_OPERATORS],
    lfo_phase: f64,
    /// Operator 1's level-scaled output from the previous sample, fed back
    /// into algorithm routing as self-modulation.
    prev_op0_output: f64,
    /// Patch-configured pitch bend range, in semitones, captured at note-on.
    pitch_bend_range_semitones: u8,
}

impl Default for Voice {
    fn default() -> Self {
        Voice {
            active: false,
            midi_note: 0,
            velocity: 0,
            channel: 0,
            note_on_time: 0,
            sustain_held: false,
            operators: [OperatorNoteState::default(); NUM_OPERATORS],
            envelopes: [Envelope::trigger_on(&Default::default(), 0.0, 48_000.0); NUM_OPERATORS],
            lfo_phase: 0.0,
            prev_op0_output: 0.0,
            pitch_bend_range_semitones: 2,
        }
    }
}

impl Voice {
    /// Initializes this slot for a new note: computes per-operator frequency,
    /// keyboard level/rate scaling, and starts every envelope in Attack.
    pub fn note_on(
        &mut self,
        patch: &Patch,
        midi_note: u8,
        velocity: u8,
        channel: u8,
        note_on_time: u64,
        sample_rate: f64,
    ) {
        self.active = true;
        self.midi_note = midi_note;
        self.velocity = velocity;
        self.channel = channel;
        self.note_on_time = note_on_time;
        self.sustain_held = false;
        self.lfo_phase = 0.0;
        self.prev_op0_output = 0.0;
        self.pitch_bend_range_semitones = patch.pitch_bend_range;

        for (i, op) in patch.operators.iter().enumerate() {
            let detune_factor = 2.0f64.powf((op.detune as f64 / 7.0) * 0.01);
            let level_scale = calculate_key_scaling(
                midi_note,
                op.key_level_scale_break_point,
                op.key_level_scale_left_depth,
                op.key_level_scale_right_depth,
                op.key_level_scale_left_curve,
                op.key_level_scale_right_curve,
            );
            let rate_scale =
                (midi_note as f64 - 60.0) / 12.0 * (op.key_rate_scaling as f64 / 7.0);

            self.operators[i] = OperatorNoteState {
                osc: OperatorState::default(),
                freq_ratio_detuned: op.freq_ratio * detune_factor,
                level_scale,
                rate_scale,
            };
            self.envelopes[i] = Envelope::trigger_on(op, rate_scale, sample_rate);
        }
    }

    /// Forces every operator's envelope into Release. Called on note-off (if
    /// not held by sustain) or when sustain is released.
    pub fn release(&mut self, patch: &Patch, sample_rate: f64) {
        for i in 0..NUM_OPERATORS {
            let rate_scale = self.operators[i].rate_scale;
            self.envelopes[i].trigger_release(&patch.operators[i], rate_scale, sample_rate);
        }
    }

    /// True once every operator envelope has decayed below the "finished" floor.
    pub fn finished(&self) -> bool {
        self.envelopes.iter().all(|e| e.level < 0.001)
    }

    /// Renders one sample. `pitch_bend` is signed in `[-1, 1]`; `mod_wheel` is
    /// unsigned in `[0, 1]` and scales LFO speed, but only when `live` is
    /// true — matching `oscillators.c`'s `g_midi_system.active && play_mode`
    /// gate, the mod-wheel multiplier only applies to MIDI-driven playback.
    /// Offline renders (`Engine::render_note`) always use a multiplier of 1.
    pub fn render_sample(
        &mut self,
        patch: &Patch,
        pitch_bend: f32,
        mod_wheel: f32,
        live: bool,
        sample_rate: f64,
    ) -> f64 {
        let bend_range = self.pitch_bend_range_semitones as f64;
        let base_freq = midi_note_to_frequency(self.midi_note)
            * 2.0f64.powf((pitch_bend as f64 * bend_range) / 12.0);

        let lfo_speed_mult = if live { 0.1 + mod_wheel as f64 * 2.9 } else { 1.0 };
        let lfo_speed = (patch.lfo_speed as f64 / 99.0) * 6.0 * lfo_speed_mult;
        self.lfo_phase += lfo_speed / sample_rate;
        if self.lfo_phase >= 1.0 {
            self.lfo_phase -= self.lfo_phase.floor();
        }
        let lfo_value = (TAU * self.lfo_phase).sin();

        let pitch_mod = if patch.lfo_pmd > 0 {
            lfo_value
                * (patch.lfo_pmd as f64 / 99.0)
                * (patch.lfo_pitch_mod_sens as f64 / 7.0)
                * 0.1
        } else {
            0.0
        };
        let lfo_amp_mod = 1.0 + lfo_value * (patch.lfo_amd as f64 / 99.0) * 0.5;

        let mut raw = [0.0f64; NUM_OPERATORS];
        let mut scaled = [0.0f64; NUM_OPERATORS];
        let mut total_levels = [0.0f64; NUM_OPERATORS];

        for i in 0..NUM_OPERATORS {
            let op = &patch.operators[i];
            let note = &mut self.operators[i];

            let env_level = self.envelopes[i].step(op, note.rate_scale, sample_rate);
            let vel_factor =
                1.0 - (1.0 - self.velocity as f64 / 127.0) * (op.key_vel_sens as f64 / 7.0);
            let mut total_level =
                (op.output_level as f64 / 99.0) * env_level * vel_factor * note.level_scale;
            total_level *= lfo_amp_mod;

            let freq = base_freq * note.freq_ratio_detuned * 2.0f64.powf(pitch_mod);
            raw[i] = note.osc.next_sample(freq, sample_rate);
            scaled[i] = raw[i] * total_level;
            total_levels[i] = total_level;
        }

        let feedback_value = self.prev_op0_output * (patch.feedback as f64 / 7.0) * 0.1;
        self.prev_op0_output = scaled[0];

        let alg = algorithm(patch.algorithm);
        process_algorithm(alg, &scaled, &total_levels, feedback_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_voice_is_inactive() {
        let voice = Voice::default();
        assert!(!voice.active);
    }

    #[test]
    fn note_on_then_many_samples_eventually_finishes_after_release() {
        let patch = Patch::default();
        let mut voice = Voice::default();
        voice.note_on(&patch, 60, 100, 0, 0, 48_000.0);

        for _ in 0..100 {
            voice.render_sample(&patch, 0.0, 0.0, true, 48_000.0);
        }
        voice.release(&patch, 48_000.0);

        let mut finished = false;
        for _ in 0..48_000 * 5 {
            voice.render_sample(&patch, 0.0, 0.0, true, 48_000.0);
            if voice.finished() {
                finished = true;
                break;
            }
        }
        assert!(finished, "voice never finished releasing");
    }

    #[test]
    fn single_carrier_algorithm_stays_bounded() {
        let patch = Patch::default();
        let mut voice = Voice::default();
        voice.note_on(&patch, 69, 127, 0, 0, 48_000.0);
        for _ in 0..48_000 {
            let sample = voice.render_sample(&patch, 0.0, 0.0, true, 48_000.0);
            assert!(sample.abs() <= 1.5, "sample {sample} out of expected bound");
        }
    }
}
