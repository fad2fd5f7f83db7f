//! A real-time six-operator FM synthesis engine modeled on the Yamaha DX7.
//!
//! Four pieces make up the core:
//!
//! - [`fm`] — the per-voice synthesis kernel: operators, envelopes, keyboard
//!   scaling, the LFO, and the 32-algorithm router.
//! - [`engine`] — the polyphonic voice manager: a fixed 16-voice pool,
//!   allocation/stealing, sustain handling, and the lock shared between a
//!   MIDI-feeding thread and an audio-rendering thread.
//! - [`midi`] — a byte-oriented streaming MIDI parser with running-status
//!   support.
//! - [`sysex`] — the DX7 voice SysEx codec (bit-packed 155-byte voice data
//!   plus checksum).
//!
//! [`patch_text`] and [`wav_writer`] are ambient collaborators (a
//! human-editable patch format and an offline WAV writer) rather than part of
//! the synthesis core itself; see DESIGN.md for the line between the two.

#![warn(missing_docs)]

pub mod engine;
pub mod fm;
pub mod midi;
pub mod patch_text;
pub mod sysex;
pub mod wav_writer;

pub use engine::Engine;
pub use fm::patch::Patch;
