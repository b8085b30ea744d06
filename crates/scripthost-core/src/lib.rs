//! Core types and traits for scripthost.
//!
//! This crate provides the fundamental data structures shared by the host
//! collaborators and the script runtime: errors, dynamic values, runtime
//! configuration and vault path helpers.

mod config;
mod error;
pub mod path;
mod value;

use std::future::Future;
use std::pin::Pin;

pub use config::{ConfigError, RuntimeConfig, RuntimeConfigBuilder};
pub use error::{ErrorKind, ScriptError, ScriptResult};
pub use value::Value;

/// Type alias for boxed futures returned by async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
