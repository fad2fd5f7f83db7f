//! DX7 voice SysEx codec: a single 155-byte voice dump, framed as
//! `F0 43 (0x00|ch) 00 01 1B <155 bytes> <checksum> F7` (163 bytes total).

use anyhow::{anyhow, Result};

use crate::fm::patch::{Operator, Patch, NUM_OPERATORS};

const VOICE_DATA_LEN: usize = 155;
const SYSEX_TOTAL_LEN: usize = VOICE_DATA_LEN + 8;
const BYTES_PER_OPERATOR: usize = 21;
const GLOBAL_BASE: usize = NUM_OPERATORS * BYTES_PER_OPERATOR;

/// Computes the DX7 checksum over the 155-byte voice data block:
/// `(128 - (sum of bytes & 0x7F)) & 0x7F`.
pub fn checksum(data: &[u8]) -> u8 {
    let sum: u32 = data.iter().map(|&b| b as u32).sum();
    (128u32.wrapping_sub(sum & 0x7F) & 0x7F) as u8
}

fn freq_ratio_to_dx7(ratio: f64) -> (u8, u8) {
    if ratio < 1.0 {
        (0, 0)
    } else {
        let coarse = (ratio as u32).min(31) as u8;
        let fine = (((ratio - coarse as f64) * 99.0) as u32).min(99) as u8;
        (coarse, fine)
    }
}

fn dx7_to_freq_ratio(coarse: u8, fine: u8) -> f64 {
    if coarse == 0 {
        0.50
    } else {
        coarse as f64 + fine as f64 / 99.0
    }
}

/// Encodes a patch as a complete 163-byte SysEx message on the given channel (0..15).
pub fn encode(patch: &Patch, channel: u8) -> Vec<u8> {
    let mut voice = [0u8; VOICE_DATA_LEN];

    for dx7_op in 0..NUM_OPERATORS {
        // Operators are stored in reverse order in the wire format.
        let op = &patch.operators[NUM_OPERATORS - 1 - dx7_op];
        let base = dx7_op * BYTES_PER_OPERATOR;

        voice[base] = op.env_rates[0];
        voice[base + 1] = op.env_rates[1];
        voice[base + 2] = op.env_rates[2];
        voice[base + 3] = op.env_rates[3];
        voice[base + 4] = op.env_levels[0];
        voice[base + 5] = op.env_levels[1];
        voice[base + 6] = op.env_levels[2];
        voice[base + 7] = op.env_levels[3];
        voice[base + 8] = op.key_level_scale_break_point;
        voice[base + 9] = op.key_level_scale_left_depth;
        voice[base + 10] = op.key_level_scale_right_depth;
        voice[base + 11] = op.key_level_scale_left_curve & 0x03;
        voice[base + 12] =
            (op.key_level_scale_right_curve & 0x03) | ((op.key_rate_scaling & 0x07) << 2);
        voice[base + 13] = (op.key_vel_sens & 0x07) << 2;
        voice[base + 14] = op.output_level;

        let (coarse, fine) = freq_ratio_to_dx7(op.freq_ratio);
        voice[base + 15] = (op.osc_sync & 0x01) | ((coarse & 0x1F) << 1);
        voice[base + 16] = fine;

        let detune_dx7 = ((op.detune + 7) as u8) & 0x0F;
        voice[base + 17] = (op.osc_sync & 0x01) | (detune_dx7 << 1);
        voice[base + 18] = 0;
        voice[base + 19] = 0;
        voice[base + 20] = 0;
    }

    voice[GLOBAL_BASE] = patch.pitch_env_rates[0];
    voice[GLOBAL_BASE + 1] = patch.pitch_env_rates[1];
    voice[GLOBAL_BASE + 2] = patch.pitch_env_rates[2];
    voice[GLOBAL_BASE + 3] = patch.pitch_env_rates[3];
    voice[GLOBAL_BASE + 4] = patch.pitch_env_levels[0];
    voice[GLOBAL_BASE + 5] = patch.pitch_env_levels[1];
    voice[GLOBAL_BASE + 6] = patch.pitch_env_levels[2];
    voice[GLOBAL_BASE + 7] = patch.pitch_env_levels[3];
    voice[GLOBAL_BASE + 8] = (patch.algorithm.saturating_sub(1)) & 0x1F;
    voice[GLOBAL_BASE + 9] = patch.feedback & 0x07;
    voice[GLOBAL_BASE + 10] = patch.lfo_speed;
    voice[GLOBAL_BASE + 11] = patch.lfo_delay;
    voice[GLOBAL_BASE + 12] = patch.lfo_pmd;
    voice[GLOBAL_BASE + 13] = patch.lfo_amd;
    voice[GLOBAL_BASE + 14] = (patch.lfo_sync & 0x01)
        | ((patch.lfo_wave & 0x07) << 1)
        | ((patch.lfo_pitch_mod_sens & 0x07) << 4);
    voice[GLOBAL_BASE + 15] = ((patch.transpose + 24) as u8) & 0x3F;

    let name_bytes = patch.name.as_bytes();
    for i in 0..10 {
        voice[GLOBAL_BASE + 16 + i] = *name_bytes.get(i).unwrap_or(&b' ');
    }
    voice[GLOBAL_BASE + 26] = 0x3F;
    voice[GLOBAL_BASE + 27] = 0;
    voice[GLOBAL_BASE + 28] = 0;

    let mut out = Vec::with_capacity(SYSEX_TOTAL_LEN);
    out.push(0xF0);
    out.push(0x43);
    out.push(channel & 0x0F);
    out.push(0x00);
    out.push(0x01);
    out.push(0x1B);
    out.extend_from_slice(&voice);
    out.push(checksum(&voice));
    out.push(0xF7);
    out
}

/// Decodes a 163-byte SysEx message, validating the framing bytes and checksum.
pub fn decode(bytes: &[u8]) -> Result<Patch> {
    if bytes.len() != SYSEX_TOTAL_LEN {
        return Err(anyhow!(
            "expected {SYSEX_TOTAL_LEN}-byte DX7 voice SysEx message, got {}",
            bytes.len()
        ));
    }
    if bytes[0] != 0xF0 {
        return Err(anyhow!("missing SysEx start byte"));
    }
    if bytes[1] != 0x43 {
        return Err(anyhow!("not a Yamaha manufacturer ID"));
    }
    if bytes[3] != 0x00 {
        return Err(anyhow!("not a single-voice format byte"));
    }
    if bytes[4] != 0x01 || bytes[5] != 0x1B {
        return Err(anyhow!("unexpected voice byte count"));
    }
    if bytes[bytes.len() - 1] != 0xF7 {
        return Err(anyhow!("missing SysEx end byte"));
    }

    let voice = &bytes[6..6 + VOICE_DATA_LEN];
    let received_checksum = bytes[6 + VOICE_DATA_LEN];
    if checksum(voice) != received_checksum {
        return Err(anyhow!("DX7 voice checksum mismatch"));
    }

    let mut patch = Patch::default();

    for dx7_op in 0..NUM_OPERATORS {
        let base = dx7_op * BYTES_PER_OPERATOR;
        let mut op = Operator {
            env_rates: [
                voice[base],
                voice[base + 1],
                voice[base + 2],
                voice[base + 3],
            ],
            env_levels: [
                voice[base + 4],
                voice[base + 5],
                voice[base + 6],
                voice[base + 7],
            ],
            key_level_scale_break_point: voice[base + 8],
            key_level_scale_left_depth: voice[base + 9],
            key_level_scale_right_depth: voice[base + 10],
            key_level_scale_left_curve: voice[base + 11] & 0x03,
            key_level_scale_right_curve: voice[base + 12] & 0x03,
            key_rate_scaling: (voice[base + 12] >> 2) & 0x07,
            key_vel_sens: (voice[base + 13] >> 2) & 0x07,
            output_level: voice[base + 14],
            osc_sync: voice[base + 15] & 0x01,
            ..Operator::default()
        };

        let coarse = (voice[base + 15] >> 1) & 0x1F;
        let fine = voice[base + 16];
        op.freq_ratio = dx7_to_freq_ratio(coarse, fine);

        let detune_dx7 = (voice[base + 17] >> 1) & 0x0F;
        op.detune = detune_dx7 as i8 - 7;

        // Operators are stored in reverse order in the wire format.
        patch.operators[NUM_OPERATORS - 1 - dx7_op] = op;
    }

    patch.pitch_env_rates = [
        voice[GLOBAL_BASE],
        voice[GLOBAL_BASE + 1],
        voice[GLOBAL_BASE + 2],
        voice[GLOBAL_BASE + 3],
    ];
    patch.pitch_env_levels = [
        voice[GLOBAL_BASE + 4],
        voice[GLOBAL_BASE + 5],
        voice[GLOBAL_BASE + 6],
        voice[GLOBAL_BASE + 7],
    ];
    patch.algorithm = (voice[GLOBAL_BASE + 8] & 0x1F) + 1;
    patch.feedback = voice[GLOBAL_BASE + 9] & 0x07;
    patch.lfo_speed = voice[GLOBAL_BASE + 10];
    patch.lfo_delay = voice[GLOBAL_BASE + 11];
    patch.lfo_pmd = voice[GLOBAL_BASE + 12];
    patch.lfo_amd = voice[GLOBAL_BASE + 13];
    patch.lfo_sync = voice[GLOBAL_BASE + 14] & 0x01;
    patch.lfo_wave = (voice[GLOBAL_BASE + 14] >> 1) & 0x07;
    patch.lfo_pitch_mod_sens = (voice[GLOBAL_BASE + 14] >> 4) & 0x07;
    patch.transpose = (voice[GLOBAL_BASE + 15] & 0x3F) as i8 - 24;

    let name_bytes = &voice[GLOBAL_BASE + 16..GLOBAL_BASE + 26];
    patch.name = String::from_utf8_lossy(name_bytes)
        .trim_end()
        .to_string();

    patch.clamp();
    Ok(patch)
}
