//! Rhai module evaluator.
//!
//! A Rhai module is a script whose top-level code runs once at load time and
//! whose functions are the module's exports.

mod runtime;

pub use runtime::{RhaiEvaluator, RhaiModule};
