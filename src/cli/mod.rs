//! Operator command line

pub mod commands;

pub use commands::*;
