//! Host-side argument and result values for calls into an artifact.

use glbridge_abi::ValueType;
use thiserror::Error;
use wasmtime::Val;

/// Errors from calling a registered binding.
#[derive(Error, Debug)]
pub enum CallError {
    #[error("Unknown binding: {0}")]
    UnknownBinding(String),

    #[error("Module is not ready: instantiation has not resolved")]
    NotReady,

    #[error("Module unavailable: {0}")]
    Unavailable(String),

    #[error("'{name}' expects {expected} arguments, got {actual}")]
    ArgumentCount {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("'{name}' argument {index} expects {expected}, got {actual}")]
    ArgumentType {
        name: String,
        index: usize,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("'{name}' trapped: {message}")]
    Trap { name: String, message: String },

    #[error("Artifact could not allocate {len} bytes")]
    Allocation { len: usize },

    #[error("Memory error: {0}")]
    Memory(String),

    #[error("'{name}' returned an unexpected value shape")]
    ResultShape { name: String },
}

/// An argument passed to a binding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg<'a> {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    /// Copied into artifact memory for the duration of the call.
    Str(&'a str),
}

impl Arg<'_> {
    pub fn value_type(&self) -> ValueType {
        match self {
            Arg::I32(_) => ValueType::I32,
            Arg::I64(_) => ValueType::I64,
            Arg::F32(_) => ValueType::F32,
            Arg::F64(_) => ValueType::F64,
            Arg::Str(_) => ValueType::String,
        }
    }

    /// Core value for numeric arguments. `None` for strings.
    pub(crate) fn to_val(self) -> Option<Val> {
        match self {
            Arg::I32(v) => Some(Val::I32(v)),
            Arg::I64(v) => Some(Val::I64(v)),
            Arg::F32(v) => Some(Val::F32(v.to_bits())),
            Arg::F64(v) => Some(Val::F64(v.to_bits())),
            Arg::Str(_) => None,
        }
    }
}

impl From<i32> for Arg<'_> {
    fn from(v: i32) -> Self {
        Arg::I32(v)
    }
}

impl From<i64> for Arg<'_> {
    fn from(v: i64) -> Self {
        Arg::I64(v)
    }
}

impl From<f32> for Arg<'_> {
    fn from(v: f32) -> Self {
        Arg::F32(v)
    }
}

impl From<f64> for Arg<'_> {
    fn from(v: f64) -> Self {
        Arg::F64(v)
    }
}

impl<'a> From<&'a str> for Arg<'a> {
    fn from(v: &'a str) -> Self {
        Arg::Str(v)
    }
}

/// The value a binding returned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ret {
    Void,
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Ret {
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Ret::I32(v) => Some(*v),
            _ => None,
        }
    }

    /// Zeroed result slots for a return type.
    pub(crate) fn slots(ty: ValueType) -> Vec<Val> {
        match ty {
            ValueType::I32 => vec![Val::I32(0)],
            ValueType::I64 => vec![Val::I64(0)],
            ValueType::F32 => vec![Val::F32(0)],
            ValueType::F64 => vec![Val::F64(0)],
            ValueType::String | ValueType::Void => Vec::new(),
        }
    }

    /// Lift the raw result slots of a call back into a [`Ret`].
    pub(crate) fn lift(ty: ValueType, vals: &[Val]) -> Option<Ret> {
        match (ty, vals) {
            (ValueType::Void, []) => Some(Ret::Void),
            (ValueType::I32, [Val::I32(v)]) => Some(Ret::I32(*v)),
            (ValueType::I64, [Val::I64(v)]) => Some(Ret::I64(*v)),
            (ValueType::F32, [Val::F32(bits)]) => Some(Ret::F32(f32::from_bits(*bits))),
            (ValueType::F64, [Val::F64(bits)]) => Some(Ret::F64(f64::from_bits(*bits))),
            _ => None,
        }
    }
}
