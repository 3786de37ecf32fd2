//! Sequencing and clocking module library
//!
//! This crate provides a set of control-voltage processing modules advanced
//! one sample at a time by a host: probabilistic gates, rewrite sequencers,
//! polyrhythmic clocks, burst generators, and loop capture. It is a pure
//! library with no I/O or protocol handling; those responsibilities belong
//! in the host layer.

#[macro_use]
extern crate cvkit_derive;

extern crate parking_lot;
extern crate serde;
extern crate serde_json;

pub mod dsp;
pub mod patch;
pub mod poly;
pub mod types;

// Re-export commonly used items
pub use patch::Patch;

pub use types::{
    Module, ModuleSchema, Sampleable, SampleableConstructor, SampleableMap,
};
