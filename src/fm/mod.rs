//! Core FM synthesis kernel: patch data, envelopes, oscillators, algorithm
//! routing, and the per-voice state that ties them together.

pub mod algorithms;
pub mod controllers;
pub mod envelope;
pub mod operator;
pub mod patch;
pub mod voice;
