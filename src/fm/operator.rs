//! Per-operator oscillator math: phase accumulation and keyboard scaling.
//!
//! The envelope (`envelope.rs`) and algorithm routing (`algorithms.rs`) live
//! in their own modules; this one is only the sine phase accumulator and the
//! keyboard level/rate scaling curves applied once at note-on.

use std::f64::consts::TAU;

/// A bare phase accumulator for one operator's sine oscillator.
#[derive(Clone, Copy, Debug, Default)]
pub struct OperatorState {
    /// Phase in `[0, 1)`.
    pub phase: f64,
}

impl OperatorState {
    /// Advances the phase by `freq/sample_rate` and returns the raw (unscaled)
    /// sine sample at the pre-advance phase.
    pub fn next_sample(&mut self, freq: f64, sample_rate: f64) -> f64 {
        let raw = (TAU * self.phase).sin();
        self.phase += freq / sample_rate;
        if self.phase >= 1.0 {
            self.phase -= self.phase.floor();
        }
        raw
    }
}

/// One of the four keyboard level-scaling curve shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalingCurve {
    /// Linear falloff moving away from the break point.
    LinearDown,
    /// Exponential falloff moving away from the break point.
    ExpDown,
    /// Exponential rise moving away from the break point.
    ExpUp,
    /// Linear rise moving away from the break point.
    LinearUp,
}

impl ScalingCurve {
    /// Maps a raw 0..3 patch field to a curve, clamping anything else to `LinearDown`.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => ScalingCurve::LinearDown,
            1 => ScalingCurve::ExpDown,
            2 => ScalingCurve::ExpUp,
            3 => ScalingCurve::LinearUp,
            _ => ScalingCurve::LinearDown,
        }
    }
}

/// Computes the keyboard level-scaling multiplier for a note relative to an
/// operator's break point, depth and curve on each side.
///
/// Distance is measured in MIDI note numbers from the break point, normalized
/// by the full 0..127 note span, and clamped to `[0, 1]` before the curve is
/// applied. The result is clamped to `[0, 2]`.
#[allow(clippy::too_many_arguments)]
pub fn calculate_key_scaling(
    midi_note: u8,
    break_point: u8,
    left_depth: u8,
    right_depth: u8,
    left_curve: u8,
    right_curve: u8,
) -> f64 {
    let note = midi_note as f64;
    let bp = break_point as f64;

    let (distance, depth, curve) = if note < bp {
        ((bp - note) / 127.0, left_depth as f64 / 99.0, ScalingCurve::from_raw(left_curve))
    } else {
        ((note - bp) / 127.0, right_depth as f64 / 99.0, ScalingCurve::from_raw(right_curve))
    };
    let distance = distance.clamp(0.0, 1.0);

    let scale = match curve {
        ScalingCurve::LinearDown => 1.0 - distance * depth,
        ScalingCurve::ExpDown => 1.0 - depth * (1.0 - (-distance * 3.0).exp()),
        ScalingCurve::ExpUp => 1.0 + depth * (1.0 - (-distance * 3.0).exp()),
        ScalingCurve::LinearUp => 1.0 + distance * depth,
    };

    scale.clamp(0.0, 2.0)
}

/// Converts a MIDI note number to frequency in Hz, A4 (note 69) = 440Hz.
pub fn midi_note_to_frequency(note: u8) -> f64 {
    440.0 * 2.0f64.powf((note as f64 - 69.0) / 12.0)
}
