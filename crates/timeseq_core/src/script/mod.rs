//! Script loading: JSON text to a validated, typed IR.
//!
//! Loading is strict and batched: the parser walks the whole document and
//! reports every problem it finds, each with the JSON pointer of the
//! offending element. A script with any error is rejected as a whole.

pub mod model;
pub mod notes;
pub mod parse;
pub mod validate;

pub use model::Script;
pub use parse::parse_script;
pub use validate::{ErrorCode, ValidationError};
