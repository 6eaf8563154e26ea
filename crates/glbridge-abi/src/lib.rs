//! Shared ABI between glbridge hosts and the artifacts they load.
//!
//! Everything in here is `no_std` so the same definitions compile into the
//! wasm artifact and into the host runtime:
//!
//! - [`bindings`] - the fixed table of exported functions and their type tags
//! - [`compute`] - pure integer logic exposed through the table
//! - [`context`] - context attribute encoding and result codes
//! - [`gl`] - the GL enum values understood by the host bridge

#![cfg_attr(not(feature = "std"), no_std)]

pub mod bindings;
pub mod compute;
pub mod context;
pub mod gl;

pub use bindings::{lookup, BindingDescriptor, ValueType, BINDINGS};
pub use context::{ContextAttributes, ResultCode};

/// Import module name for the graphics functions the host provides.
pub const GL_MODULE: &str = "gl";

/// Import module name for miscellaneous host services (logging).
pub const ENV_MODULE: &str = "env";

/// Export names every artifact that takes string arguments must provide.
pub mod exports {
    pub const MEMORY: &str = "memory";
    pub const ALLOC: &str = "alloc";
    pub const DEALLOC: &str = "dealloc";
    /// Optional reactor-style initializer, run once after instantiation.
    pub const INITIALIZE: &str = "_initialize";
}
