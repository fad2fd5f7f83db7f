//! In-memory patch representation.
//!
//! Mirrors the DX7 voice parameter set (§3/§4.6): six operators, a global
//! envelope/LFO/algorithm block, and the handful of fields (pitch envelope,
//! portamento, poly/mono) that are carried for SysEx round-tripping even
//! where the synthesis kernel doesn't act on them yet.

/// Envelope stage index into `env_rates`/`env_levels`.
pub const ENV_ATTACK: usize = 0;
/// Envelope stage index into `env_rates`/`env_levels`.
pub const ENV_DECAY1: usize = 1;
/// Envelope stage index into `env_rates`/`env_levels`.
pub const ENV_DECAY2: usize = 2;
/// Envelope stage index into `env_rates`/`env_levels`.
pub const ENV_RELEASE: usize = 3;

/// Number of operators per voice.
pub const NUM_OPERATORS: usize = 6;

/// One FM operator's static parameters.
#[derive(Clone, Copy, Debug)]
pub struct Operator {
    /// Frequency ratio relative to the voice's base frequency (0.50..31.99).
    pub freq_ratio: f64,
    /// Detune, in roughly 1%-per-unit steps (-7..+7).
    pub detune: i8,
    /// Envelope rates for [Attack, Decay1, Decay2, Release], each 0..99.
    pub env_rates: [u8; 4],
    /// Envelope levels for [Attack, Decay1, Decay2, Release], each 0..99.
    pub env_levels: [u8; 4],
    /// Output level, 0..99.
    pub output_level: u8,
    /// Velocity sensitivity, 0..7.
    pub key_vel_sens: u8,
    /// Keyboard level-scaling break point, as a MIDI note number (0..127).
    pub key_level_scale_break_point: u8,
    /// Keyboard level-scaling depth left of the break point, 0..99.
    pub key_level_scale_left_depth: u8,
    /// Keyboard level-scaling depth right of the break point, 0..99.
    pub key_level_scale_right_depth: u8,
    /// Keyboard level-scaling curve left of the break point, 0..3.
    pub key_level_scale_left_curve: u8,
    /// Keyboard level-scaling curve right of the break point, 0..3.
    pub key_level_scale_right_curve: u8,
    /// Keyboard rate scaling, 0..7.
    pub key_rate_scaling: u8,
    /// Oscillator sync flag, 0 or 1.
    pub osc_sync: u8,
}

impl Default for Operator {
    fn default() -> Self {
        Operator {
            freq_ratio: 1.0,
            detune: 0,
            env_rates: [99, 99, 99, 99],
            env_levels: [99, 99, 99, 0],
            output_level: 99,
            key_vel_sens: 0,
            key_level_scale_break_point: 60,
            key_level_scale_left_depth: 0,
            key_level_scale_right_depth: 0,
            key_level_scale_left_curve: 0,
            key_level_scale_right_curve: 0,
            key_rate_scaling: 0,
            osc_sync: 0,
        }
    }
}

impl Operator {
    /// Clamps every field to its declared range. Called after text/SysEx decode.
    pub fn clamp(&mut self) {
        self.freq_ratio = self.freq_ratio.clamp(0.50, 31.99);
        self.detune = self.detune.clamp(-7, 7);
        for r in &mut self.env_rates {
            *r = (*r).min(99);
        }
        for l in &mut self.env_levels {
            *l = (*l).min(99);
        }
        self.output_level = self.output_level.min(99);
        self.key_vel_sens = self.key_vel_sens.min(7);
        self.key_level_scale_break_point = self.key_level_scale_break_point.min(127);
        self.key_level_scale_left_depth = self.key_level_scale_left_depth.min(99);
        self.key_level_scale_right_depth = self.key_level_scale_right_depth.min(99);
        self.key_level_scale_left_curve = self.key_level_scale_left_curve.min(3);
        self.key_level_scale_right_curve = self.key_level_scale_right_curve.min(3);
        self.key_rate_scaling = self.key_rate_scaling.min(7);
        self.osc_sync &= 0x01;
    }
}

/// A complete DX7-style voice patch.
#[derive(Clone, Debug)]
pub struct Patch {
    /// Patch name, trimmed of trailing spaces, at most 10 characters.
    pub name: String,
    /// Six operators.
    pub operators: [Operator; NUM_OPERATORS],
    /// Algorithm number, 1..32. Out-of-range values coerce to 1.
    pub algorithm: u8,
    /// Feedback amount, 0..7.
    pub feedback: u8,
    /// LFO speed, 0..99.
    pub lfo_speed: u8,
    /// LFO delay, 0..99.
    pub lfo_delay: u8,
    /// LFO pitch modulation depth, 0..99.
    pub lfo_pmd: u8,
    /// LFO amplitude modulation depth, 0..99.
    pub lfo_amd: u8,
    /// LFO key sync flag, 0 or 1.
    pub lfo_sync: u8,
    /// LFO waveform, 0..5. Only sine (0) is rendered by this core.
    pub lfo_wave: u8,
    /// LFO pitch modulation sensitivity, 0..7.
    pub lfo_pitch_mod_sens: u8,
    /// Pitch envelope rates. Declared for SysEx round-tripping; not applied
    /// in the audio path yet.
    ///
    /// TODO: wire pitch envelope output into the operator frequency
    /// computation in `fm::voice::Voice::render_sample`.
    pub pitch_env_rates: [u8; 4],
    /// Pitch envelope levels. See `pitch_env_rates`.
    pub pitch_env_levels: [u8; 4],
    /// Transpose, in semitones, -24..+24.
    pub transpose: i8,
    /// Poly (true) or mono (false) voice mode. Not enforced by the core
    /// voice manager, which is always polyphonic; carried for round-tripping
    /// and external UI state.
    pub poly_mono: bool,
    /// Pitch bend range in semitones, as configured by the patch.
    pub pitch_bend_range: u8,
    /// Portamento mode (fingered vs. full-time). Declared; portamento glide
    /// itself is not implemented by the core (declared non-goal).
    pub portamento_mode: u8,
    /// Portamento glissando flag.
    pub portamento_gliss: u8,
    /// Portamento time, 0..99.
    pub portamento_time: u8,
}

impl Default for Patch {
    fn default() -> Self {
        Patch {
            name: String::new(),
            operators: [Operator::default(); NUM_OPERATORS],
            algorithm: 1,
            feedback: 0,
            lfo_speed: 35,
            lfo_delay: 0,
            lfo_pmd: 0,
            lfo_amd: 0,
            lfo_sync: 1,
            lfo_wave: 0,
            lfo_pitch_mod_sens: 3,
            pitch_env_rates: [99, 99, 99, 99],
            pitch_env_levels: [50, 50, 50, 50],
            transpose: 0,
            poly_mono: true,
            pitch_bend_range: 2,
            portamento_mode: 0,
            portamento_gliss: 0,
            portamento_time: 0,
        }
    }
}

impl Patch {
    /// Clamps every field to its declared range, coercing `algorithm` to 1
    /// if it falls outside 1..32. Called after text/SysEx decode.
    pub fn clamp(&mut self) {
        for op in &mut self.operators {
            op.clamp();
        }
        if self.algorithm < 1 || self.algorithm > 32 {
            self.algorithm = 1;
        }
        self.feedback = self.feedback.min(7);
        self.lfo_speed = self.lfo_speed.min(99);
        self.lfo_delay = self.lfo_delay.min(99);
        self.lfo_pmd = self.lfo_pmd.min(99);
        self.lfo_amd = self.lfo_amd.min(99);
        self.lfo_sync &= 0x01;
        self.lfo_wave = self.lfo_wave.min(5);
        self.lfo_pitch_mod_sens = self.lfo_pitch_mod_sens.min(7);
        self.transpose = self.transpose.clamp(-24, 24);
        if self.name.len() > 10 {
            self.name.truncate(10);
        }
        self.name = self.name.trim_end().to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_patch_is_already_in_range() {
        let mut patch = Patch::default();
        let before = patch.algorithm;
        patch.clamp();
        assert_eq!(patch.algorithm, before);
    }

    #[test]
    fn out_of_range_algorithm_coerces_to_one() {
        let mut patch = Patch::default();
        patch.algorithm = 200;
        patch.clamp();
        assert_eq!(patch.algorithm, 1);

        patch.algorithm = 0;
        patch.clamp();
        assert_eq!(patch.algorithm, 1);
    }

    #[test]
    fn operator_fields_clamp_to_range() {
        let mut op = Operator::default();
        op.output_level = 255;
        op.key_rate_scaling = 250;
        op.clamp();
        assert_eq!(op.output_level, 99);
        assert_eq!(op.key_rate_scaling, 7);
    }

    #[test]
    fn name_trims_trailing_spaces_and_truncates() {
        let mut patch = Patch::default();
        patch.name = "TESTPATCH   EXTRA".to_string();
        patch.clamp();
        assert_eq!(patch.name, "TESTPATCH");
    }
}
