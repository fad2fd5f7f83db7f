//! Line-oriented, human-editable patch text format: one `OPn` section per
//! operator plus a handful of top-level `KEY = VALUE` lines.
//!
//! This is an ambient convenience alongside the SysEx codec, not part of the
//! wire-compatible DX7 format; unknown keys are logged and skipped rather
//! than rejected, so patches can be hand-edited without every field present.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::warn;

use crate::fm::patch::{Operator, Patch, NUM_OPERATORS};

/// Parses a patch text file from disk.
pub fn load(path: &Path) -> Result<Patch> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading patch file {}", path.display()))?;
    parse(&text)
}

/// Parses a patch text document from an in-memory string.
pub fn parse(text: &str) -> Result<Patch> {
    let mut patch = Patch::default();
    let mut current_op: Option<usize> = None;

    for (lineno, raw_line) in text.lines().enumerate() {
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        if let Some(header) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            if let Some(n) = header.strip_prefix("OP") {
                let index: usize = n
                    .trim()
                    .parse()
                    .with_context(|| format!("line {}: bad operator header {header:?}", lineno + 1))?;
                if !(1..=NUM_OPERATORS).contains(&index) {
                    warn!("patch text line {}: operator index {index} out of range, ignoring section", lineno + 1);
                    current_op = None;
                } else {
                    current_op = Some(index - 1);
                }
            } else {
                warn!("patch text line {}: unknown section [{header}], ignoring", lineno + 1);
                current_op = None;
            }
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            warn!("patch text line {}: expected KEY = VALUE, got {line:?}", lineno + 1);
            continue;
        };
        let key = key.trim().to_ascii_uppercase();
        let value = value.trim();

        match current_op {
            Some(op_index) => apply_operator_key(&mut patch.operators[op_index], &key, value, lineno),
            None => apply_global_key(&mut patch, &key, value, lineno),
        }
    }

    patch.clamp();
    Ok(patch)
}

fn apply_operator_key(op: &mut Operator, key: &str, value: &str, lineno: usize) {
    let ok = match key {
        "FREQ_RATIO" => parse_into(value, |v| op.freq_ratio = v, lineno),
        "DETUNE" => parse_into(value, |v| op.detune = v, lineno),
        "OUTPUT_LEVEL" => parse_into(value, |v| op.output_level = v, lineno),
        "KEY_VEL_SENS" => parse_into(value, |v| op.key_vel_sens = v, lineno),
        "ENV_RATES" => parse_csv4(value, &mut op.env_rates, lineno),
        "ENV_LEVELS" => parse_csv4(value, &mut op.env_levels, lineno),
        "KEY_LEVEL_SCALE_BREAK_POINT" => {
            parse_into(value, |v| op.key_level_scale_break_point = v, lineno)
        }
        "KEY_LEVEL_SCALE_LEFT_DEPTH" => {
            parse_into(value, |v| op.key_level_scale_left_depth = v, lineno)
        }
        "KEY_LEVEL_SCALE_RIGHT_DEPTH" => {
            parse_into(value, |v| op.key_level_scale_right_depth = v, lineno)
        }
        "KEY_LEVEL_SCALE_LEFT_CURVE" => {
            parse_into(value, |v| op.key_level_scale_left_curve = v, lineno)
        }
        "KEY_LEVEL_SCALE_RIGHT_CURVE" => {
            parse_into(value, |v| op.key_level_scale_right_curve = v, lineno)
        }
        "KEY_RATE_SCALING" => parse_into(value, |v| op.key_rate_scaling = v, lineno),
        "OSC_SYNC" => parse_into(value, |v| op.osc_sync = v, lineno),
        _ => false,
    };
    if !ok && !matches!(key, "FREQ_RATIO" | "DETUNE" | "OUTPUT_LEVEL" | "KEY_VEL_SENS" | "ENV_RATES" | "ENV_LEVELS" | "KEY_LEVEL_SCALE_BREAK_POINT" | "KEY_LEVEL_SCALE_LEFT_DEPTH" | "KEY_LEVEL_SCALE_RIGHT_DEPTH" | "KEY_LEVEL_SCALE_LEFT_CURVE" | "KEY_LEVEL_SCALE_RIGHT_CURVE" | "KEY_RATE_SCALING" | "OSC_SYNC") {
        warn!("patch text line {}: unknown operator key {key:?}, skipping", lineno + 1);
    }
}

fn apply_global_key(patch: &mut Patch, key: &str, value: &str, lineno: usize) {
    match key {
        "NAME" => patch.name = value.to_string(),
        "ALGORITHM" => {
            parse_into(value, |v| patch.algorithm = v, lineno);
        }
        "FEEDBACK" => {
            parse_into(value, |v| patch.feedback = v, lineno);
        }
        "LFO_SPEED" => {
            parse_into(value, |v| patch.lfo_speed = v, lineno);
        }
        "LFO_DELAY" => {
            parse_into(value, |v| patch.lfo_delay = v, lineno);
        }
        "LFO_PMD" => {
            parse_into(value, |v| patch.lfo_pmd = v, lineno);
        }
        "LFO_AMD" => {
            parse_into(value, |v| patch.lfo_amd = v, lineno);
        }
        "LFO_SYNC" => {
            parse_into(value, |v| patch.lfo_sync = v, lineno);
        }
        "LFO_WAVE" => {
            parse_into(value, |v| patch.lfo_wave = v, lineno);
        }
        "LFO_PITCH_MOD_SENS" => {
            parse_into(value, |v| patch.lfo_pitch_mod_sens = v, lineno);
        }
        "TRANSPOSE" => {
            parse_into(value, |v| patch.transpose = v, lineno);
        }
        "PITCH_BEND_RANGE" => {
            parse_into(value, |v| patch.pitch_bend_range = v, lineno);
        }
        _ => {
            warn!("patch text line {}: unknown key {key:?}, skipping", lineno + 1);
        }
    }
}

fn parse_into<T: std::str::FromStr>(value: &str, mut set: impl FnMut(T), lineno: usize) -> bool {
    match value.parse() {
        Ok(v) => {
            set(v);
            true
        }
        Err(_) => {
            warn!("patch text line {}: couldn't parse {value:?}", lineno + 1);
            false
        }
    }
}

fn parse_csv4(value: &str, out: &mut [u8; 4], lineno: usize) -> bool {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        warn!("patch text line {}: expected 4 comma-separated values, got {value:?}", lineno + 1);
        return false;
    }
    for (slot, part) in out.iter_mut().zip(parts.iter()) {
        match part.parse() {
            Ok(v) => *slot = v,
            Err(_) => {
                warn!("patch text line {}: couldn't parse {part:?}", lineno + 1);
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_and_algorithm() {
        let patch = parse("NAME = BRASS1\nALGORITHM = 17\nFEEDBACK = 5\n").unwrap();
        assert_eq!(patch.name, "BRASS1");
        assert_eq!(patch.algorithm, 17);
        assert_eq!(patch.feedback, 5);
    }

    #[test]
    fn parses_operator_sections() {
        let text = "[OP1]\nFREQ_RATIO = 2.0\nOUTPUT_LEVEL = 80\nENV_RATES = 99, 50, 50, 40\n";
        let patch = parse(text).unwrap();
        assert!((patch.operators[0].freq_ratio - 2.0).abs() < 1e-9);
        assert_eq!(patch.operators[0].output_level, 80);
        assert_eq!(patch.operators[0].env_rates, [99, 50, 50, 40]);
    }

    #[test]
    fn unknown_key_is_skipped_not_rejected() {
        let patch = parse("NAME = FOO\nTOTALLY_UNKNOWN = 1\nALGORITHM = 3\n").unwrap();
        assert_eq!(patch.name, "FOO");
        assert_eq!(patch.algorithm, 3);
    }

    #[test]
    fn out_of_range_operator_header_is_ignored() {
        let patch = parse("[OP9]\nOUTPUT_LEVEL = 10\n").unwrap();
        assert_eq!(patch.operators[0].output_level, 99);
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let text = "# a comment\n\nNAME = X # trailing comment\n";
        let patch = parse(text).unwrap();
        assert_eq!(patch.name, "X");
    }
}
