//! Terminal output helpers
//!
//! Spinners for long-running host operations, state colors shared by the
//! tables and status lines, and the error formatting used when a command
//! fails.

pub mod colors;
pub mod errors;
pub mod spinner;

pub use colors::{state_color, state_style};
pub use errors::{print_error, print_orphan_warning};
pub use spinner::CommandSpinner;
