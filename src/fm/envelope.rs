//! Per-operator four-stage envelope generator.
//!
//! Stages run Attack -> Decay1 -> Decay2 (sustain) -> Release. Rates are
//! looked up from a 100-entry perceptual timing table rather than the
//! real DX7's exponential hardware curves; see DESIGN.md.

use crate::fm::patch::Operator;

/// One of the four DX7 envelope stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Rising to the attack target.
    Attack,
    /// First decay segment, usually falling toward the sustain level.
    Decay1,
    /// Sustain segment; holds (or slowly approaches) its target.
    Decay2,
    /// Released; falling toward zero.
    Release,
}

/// Nominal full-scale stage time in seconds, indexed by the DX7 rate parameter (0..99).
///
/// Rate 0 is the slowest (30s), rate 99 the fastest (sub-millisecond). These are
/// tunable perceptual curves, not a transcription of the real DX7's hardware timing.
const RATE_TABLE: [f64; 100] = [
    30.0, 25.0, 20.0, 18.0, 16.0, 14.0, 12.0, 10.0, 8.0, 6.0,
    5.5, 5.0, 4.5, 4.0, 3.5, 3.0, 2.8, 2.6, 2.4, 2.2,
    2.0, 1.8, 1.6, 1.4, 1.2, 1.0, 0.95, 0.90, 0.85, 0.80,
    0.75, 0.70, 0.65, 0.60, 0.55, 0.50, 0.47, 0.44, 0.41, 0.38,
    0.35, 0.32, 0.29, 0.26, 0.23, 0.20, 0.19, 0.18, 0.17, 0.16,
    0.15, 0.14, 0.13, 0.12, 0.11, 0.10, 0.095, 0.090, 0.085, 0.080,
    0.075, 0.070, 0.065, 0.060, 0.055, 0.050, 0.047, 0.044, 0.041, 0.038,
    0.035, 0.032, 0.029, 0.026, 0.023, 0.020, 0.018, 0.016, 0.014, 0.012,
    0.010, 0.009, 0.008, 0.007, 0.006, 0.005, 0.0045, 0.004, 0.0035, 0.003,
    0.0025, 0.002, 0.0018, 0.0016, 0.0014, 0.0012, 0.001, 0.0008, 0.0006, 0.0004,
];

/// Converts a rate index and a signed level-difference into a stage duration in seconds.
fn rate_to_time(rate: u8, level_diff: i32) -> f64 {
    if rate == 0 {
        return 30.0;
    }
    if rate >= 99 {
        return 0.0004;
    }
    let base_time = RATE_TABLE[rate as usize];
    let scale = (level_diff.unsigned_abs() as f64 / 99.0).max(0.1);
    base_time * scale
}

/// Per-operator, per-voice envelope state.
#[derive(Clone, Copy, Debug)]
pub struct Envelope {
    /// Current stage.
    pub stage: Stage,
    /// Current level, in `[0, 1]`.
    pub level: f64,
    /// Signed per-sample increment toward `target`.
    rate: f64,
    /// Current stage's target level, in `[0, 1]`.
    target: f64,
    /// Samples elapsed since entering the current stage.
    pub samples_in_stage: u64,
}

impl Envelope {
    /// Triggers note-on: enters Attack targeting `env_levels[ATTACK]/99`.
    ///
    /// `rate_scale` is the voice's keyboard rate-scale factor captured at note-on
    /// (`(midi_note - 60)/12 * (key_rate_scaling/7)`).
    pub fn trigger_on(op: &Operator, rate_scale: f64, sample_rate: f64) -> Self {
        let mut attack_time = rate_to_time(op.env_rates[0], op.env_levels[0] as i32);
        attack_time /= 1.0 + rate_scale * (op.key_rate_scaling as f64 / 7.0);

        let rate = if attack_time > 0.0 {
            op.env_levels[0] as f64 / (99.0 * attack_time * sample_rate)
        } else {
            99.0
        };

        Envelope {
            stage: Stage::Attack,
            level: 0.0,
            rate,
            target: op.env_levels[0] as f64 / 99.0,
            samples_in_stage: 0,
        }
    }

    /// Forces an asynchronous transition to Release, targeting `env_levels[RELEASE]/99`.
    pub fn trigger_release(&mut self, op: &Operator, rate_scale: f64, sample_rate: f64) {
        self.stage = Stage::Release;
        self.samples_in_stage = 0;

        let level_diff = (self.level * 99.0) as i32 - op.env_levels[3] as i32;
        let mut release_time = rate_to_time(op.env_rates[3], level_diff);
        release_time /= 1.0 + rate_scale * (op.key_rate_scaling as f64 / 7.0);

        self.rate = if release_time > 0.0 && level_diff != 0 {
            -(level_diff as f64) / (99.0 * release_time * sample_rate)
        } else {
            -0.1
        };

        self.target = op.env_levels[3] as f64 / 99.0;
    }

    /// Advances the envelope by one sample and returns the resulting level.
    pub fn step(&mut self, op: &Operator, rate_scale: f64, sample_rate: f64) -> f64 {
        self.samples_in_stage += 1;

        match self.stage {
            Stage::Attack => {
                if self.level >= self.target || op.env_rates[0] >= 99 {
                    self.stage = Stage::Decay1;
                    self.level = self.target;
                    self.samples_in_stage = 0;

                    let level_diff = op.env_levels[0] as i32 - op.env_levels[1] as i32;
                    let mut decay1_time = rate_to_time(op.env_rates[1], level_diff);
                    decay1_time /= 1.0 + rate_scale * (op.key_rate_scaling as f64 / 7.0);

                    self.rate = if decay1_time > 0.0 && level_diff != 0 {
                        -(level_diff as f64) / (99.0 * decay1_time * sample_rate)
                    } else {
                        0.0
                    };
                    self.target = op.env_levels[1] as f64 / 99.0;
                } else {
                    self.level += self.rate;
                    if self.level > self.target {
                        self.level = self.target;
                    }
                }
            }
            Stage::Decay1 => {
                if self.level <= self.target || op.env_rates[1] >= 99 {
                    self.stage = Stage::Decay2;
                    self.level = self.target;
                    self.samples_in_stage = 0;

                    let level_diff = op.env_levels[1] as i32 - op.env_levels[2] as i32;
                    let mut decay2_time = rate_to_time(op.env_rates[2], level_diff);
                    decay2_time /= 1.0 + rate_scale * (op.key_rate_scaling as f64 / 7.0);

                    self.rate = if decay2_time > 0.0 && level_diff != 0 {
                        -(level_diff as f64) / (99.0 * decay2_time * sample_rate)
                    } else {
                        0.0
                    };
                    self.target = op.env_levels[2] as f64 / 99.0;
                } else {
                    self.level += self.rate;
                    if self.level < self.target {
                        self.level = self.target;
                    }
                }
            }
            Stage::Decay2 => {
                if self.level > self.target {
                    self.level += self.rate;
                    if self.level < self.target {
                        self.level = self.target;
                    }
                }
            }
            Stage::Release => {
                self.level += self.rate;
                if self.level < 0.0 {
                    self.level = 0.0;
                }
            }
        }

        self.level
    }
}
