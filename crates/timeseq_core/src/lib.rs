//! Sample-clocked sequencing engine core.
//!
//! This crate executes declarative JSON scripts against a host that owns the
//! actual port voltages: on every `process` call (one audio sample) the
//! engine advances all active lanes by one step, computes and writes value
//! changes through the [`Host`] trait, and delivers lifecycle notifications.
//! It is a pure library with no I/O of its own; parsing, validation, and the
//! per-sample scheduler all live here, the audio/UI plumbing belongs to the
//! host layer.

#[macro_use]
extern crate lazy_static;

extern crate serde;
extern crate serde_json;

pub mod engine;
pub mod host;
pub mod processor;
pub mod random;
pub mod script;

// Re-export commonly used items
pub use engine::{Status, TimeSeq};
pub use host::Host;
pub use script::validate::{ErrorCode, ValidationError};

/// Number of polyphonic input ports addressable from a script.
pub const INPUT_PORTS: usize = 8;
/// Number of polyphonic output ports addressable from a script.
pub const OUTPUT_PORTS: usize = 8;
/// Maximum channels per polyphonic port.
pub const PORT_MAX_CHANNELS: usize = 16;
