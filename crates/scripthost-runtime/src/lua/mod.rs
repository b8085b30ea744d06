//! Lua module evaluator.
//!
//! A Lua module is a chunk returning its export table. Chunks that return
//! nothing export their globals instead.

mod bindings;
mod runtime;

pub use runtime::{LuaEvaluator, LuaModule};
