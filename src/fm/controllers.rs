//! Continuous controller state: pitch bend, mod wheel, and the rest of the
//! MIDI CC surface, pre-normalized for the synthesis kernel.

use serde::{Deserialize, Serialize};

/// Number of raw MIDI controller numbers (0..127).
const NUM_RAW_CONTROLLERS: usize = 128;

/// Normalized continuous-controller state for one MIDI channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Controllers {
    /// Pitch bend, normalized to `[-1, 1]`.
    pub pitch_bend: f32,
    /// Mod wheel (CC1), normalized to `[0, 1]`.
    pub mod_wheel: f32,
    /// Breath controller (CC2), normalized to `[0, 1]`.
    pub breath: f32,
    /// Foot controller (CC4), normalized to `[0, 1]`.
    pub foot: f32,
    /// Volume (CC7), normalized to `[0, 1]`.
    pub volume: f32,
    /// Expression (CC11), normalized to `[0, 1]`.
    pub expression: f32,
    /// Pan (CC10), normalized to `[-1, 1]` (bipolar).
    pub pan: f32,
    /// Sustain pedal (CC64) on/off, threshold at raw value 64.
    pub sustain_pedal: bool,
    /// Portamento (CC65) on/off, threshold at raw value 64.
    pub portamento: bool,
    /// Raw 0..127 value last received for every controller number, regardless
    /// of whether it's one of the named controllers above.
    pub raw: [u8; NUM_RAW_CONTROLLERS],
}

impl Default for Controllers {
    fn default() -> Self {
        Controllers {
            pitch_bend: 0.0,
            mod_wheel: 0.0,
            breath: 0.0,
            foot: 0.0,
            volume: 1.0,
            expression: 1.0,
            pan: 0.0,
            sustain_pedal: false,
            portamento: false,
            raw: [0; NUM_RAW_CONTROLLERS],
        }
    }
}

/// CC numbers with named meaning. Unlisted numbers only populate `raw`.
pub mod cc {
    /// Mod wheel.
    pub const MOD_WHEEL: u8 = 1;
    /// Breath controller.
    pub const BREATH: u8 = 2;
    /// Foot controller.
    pub const FOOT: u8 = 4;
    /// Channel volume.
    pub const VOLUME: u8 = 7;
    /// Pan.
    pub const PAN: u8 = 10;
    /// Expression.
    pub const EXPRESSION: u8 = 11;
    /// Sustain pedal.
    pub const SUSTAIN: u8 = 64;
    /// Portamento on/off.
    pub const PORTAMENTO: u8 = 65;
    /// All sound off.
    pub const ALL_SOUND_OFF: u8 = 120;
    /// All controllers off.
    pub const ALL_CONTROLLERS_OFF: u8 = 121;
    /// All notes off.
    pub const ALL_NOTES_OFF: u8 = 123;
}

fn midi_to_float(v: u8) -> f32 {
    v as f32 / 127.0
}

fn midi_to_bipolar(v: u8) -> f32 {
    (v as f32 / 127.0) * 2.0 - 1.0
}

/// What a control-change message asks the voice manager to do, beyond
/// updating controller state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlAction {
    /// Nothing beyond the state update.
    None,
    /// Sustain transitioned from held to released: release every sustained voice.
    SustainReleased,
    /// Release every active voice (CC 120 or 123).
    ReleaseAll,
}

impl Controllers {
    /// Applies a control-change message, always storing the raw value and
    /// then applying named-controller semantics. Returns the side effect (if
    /// any) the caller's voice manager must perform.
    pub fn control_change(&mut self, controller: u8, value: u8) -> ControlAction {
        if (controller as usize) < NUM_RAW_CONTROLLERS {
            self.raw[controller as usize] = value;
        }

        match controller {
            cc::MOD_WHEEL => {
                self.mod_wheel = midi_to_float(value);
                ControlAction::None
            }
            cc::BREATH => {
                self.breath = midi_to_float(value);
                ControlAction::None
            }
            cc::FOOT => {
                self.foot = midi_to_float(value);
                ControlAction::None
            }
            cc::VOLUME => {
                self.volume = midi_to_float(value);
                ControlAction::None
            }
            cc::PAN => {
                self.pan = midi_to_bipolar(value);
                ControlAction::None
            }
            cc::EXPRESSION => {
                self.expression = midi_to_float(value);
                ControlAction::None
            }
            cc::SUSTAIN => {
                let was_held = self.sustain_pedal;
                self.sustain_pedal = value >= 64;
                if was_held && !self.sustain_pedal {
                    ControlAction::SustainReleased
                } else {
                    ControlAction::None
                }
            }
            cc::PORTAMENTO => {
                self.portamento = value >= 64;
                ControlAction::None
            }
            cc::ALL_SOUND_OFF | cc::ALL_NOTES_OFF => ControlAction::ReleaseAll,
            cc::ALL_CONTROLLERS_OFF => {
                let raw = self.raw;
                *self = Controllers {
                    raw,
                    ..Controllers::zeroed()
                };
                self.volume = 1.0;
                self.expression = 1.0;
                ControlAction::None
            }
            _ => ControlAction::None,
        }
    }

    /// Applies a 14-bit pitch bend value (`data1 | data2 << 7`), storing it
    /// signed in `[-1, 1]`.
    pub fn pitch_bend(&mut self, bend14: u16) {
        self.pitch_bend = (bend14 as f32 - 8192.0) / 8192.0;
    }

    fn zeroed() -> Self {
        Controllers {
            pitch_bend: 0.0,
            mod_wheel: 0.0,
            breath: 0.0,
            foot: 0.0,
            volume: 0.0,
            expression: 0.0,
            pan: 0.0,
            sustain_pedal: false,
            portamento: false,
            raw: [0; NUM_RAW_CONTROLLERS],
        }
    }
}
