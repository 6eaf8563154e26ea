//! Host-side use of the binding table.
//!
//! Name lookup and argument checks happen here, before any artifact code
//! runs. Export validation runs once at instantiation so a module that does
//! not match the table never becomes a usable handle.

use crate::marshal::{Arg, CallError};
use glbridge_abi::bindings::CoreType;
use glbridge_abi::exports;
use glbridge_abi::{lookup, BindingDescriptor, BINDINGS};
use thiserror::Error;
use wasmtime::{AsContextMut, Instance, ValType};

/// Errors from export validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExportError {
    #[error("Missing function '{name}' required by the binding table")]
    MissingFunction { name: String },

    #[error("Function '{name}' has wrong signature: expected {expected}, got {actual}")]
    SignatureMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Missing memory export 'memory'")]
    MissingMemory,
}

/// Find the descriptor for `name`, or fail without touching the artifact.
pub fn resolve(name: &str) -> Result<&'static BindingDescriptor, CallError> {
    lookup(name).ok_or_else(|| CallError::UnknownBinding(name.to_string()))
}

/// Check arity and per-slot type tags.
pub fn check_args(descriptor: &BindingDescriptor, args: &[Arg<'_>]) -> Result<(), CallError> {
    if args.len() != descriptor.params.len() {
        return Err(CallError::ArgumentCount {
            name: descriptor.name.to_string(),
            expected: descriptor.params.len(),
            actual: args.len(),
        });
    }
    for (index, (arg, expected)) in args.iter().zip(descriptor.params).enumerate() {
        let actual = arg.value_type();
        if actual != *expected {
            return Err(CallError::ArgumentType {
                name: descriptor.name.to_string(),
                index,
                expected: expected.name(),
                actual: actual.name(),
            });
        }
    }
    Ok(())
}

fn core_type(ty: &ValType) -> Option<CoreType> {
    match ty {
        ValType::I32 => Some(CoreType::I32),
        ValType::I64 => Some(CoreType::I64),
        ValType::F32 => Some(CoreType::F32),
        ValType::F64 => Some(CoreType::F64),
        _ => None,
    }
}

fn describe(params: &[Option<CoreType>], results: &[Option<CoreType>]) -> String {
    let join = |types: &[Option<CoreType>]| {
        types
            .iter()
            .map(|t| t.map_or("?", CoreType::name))
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!("({}) -> ({})", join(params), join(results))
}

/// Check one export against a lowered signature.
fn check_function(
    mut store: impl AsContextMut,
    instance: &Instance,
    name: &str,
    params: &[CoreType],
    results: &[CoreType],
) -> Result<(), ExportError> {
    let expected_params: Vec<_> = params.iter().copied().map(Some).collect();
    let expected_results: Vec<_> = results.iter().copied().map(Some).collect();
    let expected = describe(&expected_params, &expected_results);

    let Some(func) = instance.get_func(&mut store, name) else {
        return if instance.get_export(&mut store, name).is_some() {
            Err(ExportError::SignatureMismatch {
                name: name.to_string(),
                expected,
                actual: "not a function".to_string(),
            })
        } else {
            Err(ExportError::MissingFunction {
                name: name.to_string(),
            })
        };
    };

    let ty = func.ty(&store);
    let actual_params: Vec<_> = ty.params().map(|t| core_type(&t)).collect();
    let actual_results: Vec<_> = ty.results().map(|t| core_type(&t)).collect();

    if actual_params != expected_params || actual_results != expected_results {
        return Err(ExportError::SignatureMismatch {
            name: name.to_string(),
            expected,
            actual: describe(&actual_params, &actual_results),
        });
    }
    Ok(())
}

/// Validate that an instance exports every binding in the table with its
/// lowered signature, plus the memory and allocator plumbing string
/// arguments need.
pub fn validate_exports(
    mut store: impl AsContextMut,
    instance: &Instance,
) -> Result<(), ExportError> {
    for descriptor in BINDINGS {
        let params: Vec<_> = descriptor.core_params().collect();
        check_function(
            &mut store,
            instance,
            descriptor.name,
            &params,
            descriptor.core_results(),
        )?;
    }

    if BINDINGS.iter().any(|d| d.takes_strings()) {
        if instance.get_memory(&mut store, exports::MEMORY).is_none() {
            return Err(ExportError::MissingMemory);
        }
        check_function(
            &mut store,
            instance,
            exports::ALLOC,
            &[CoreType::I32],
            &[CoreType::I32],
        )?;
        check_function(
            &mut store,
            instance,
            exports::DEALLOC,
            &[CoreType::I32, CoreType::I32],
            &[],
        )?;
    }

    Ok(())
}
