//! Host Function Registration API
//!
//! Builder for the imports an artifact links against. Functions are grouped
//! into namespaced interfaces (`gl`, `env`); reusable groups implement
//! [`HostFunctionProvider`].
//!
//! # Example
//!
//! ```ignore
//! let mut linker = Linker::new(&engine);
//! let mut builder = HostLinkerBuilder::new(&mut linker);
//! builder.register_provider(&GlProvider)?;
//! builder.interface("env")?
//!     .func_raw("now", |_caller: Caller<'_, BridgeState>| -> f64 { 0.0 })?;
//! ```

use crate::runtime::BridgeState;
use glbridge_abi::gl::imports;
use glbridge_abi::{ResultCode, ENV_MODULE, GL_MODULE};
use std::marker::PhantomData;
use thiserror::Error;
use wasmtime::{Caller, Linker, Memory};

/// Errors from linker operations
#[derive(Error, Debug)]
pub enum LinkerError {
    #[error("Function registration failed: {0}")]
    FunctionRegistration(String),

    #[error("Memory error: {0}")]
    MemoryError(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),
}

/// Context wrapper giving host functions access to store data and artifact memory.
pub struct Ctx<'a, T> {
    caller: Caller<'a, T>,
}

impl<'a, T> Ctx<'a, T> {
    pub fn new(caller: Caller<'a, T>) -> Self {
        Self { caller }
    }

    pub fn data_mut(&mut self) -> &mut T {
        self.caller.data_mut()
    }

    fn memory(&mut self) -> Result<Memory, LinkerError> {
        self.caller
            .get_export(glbridge_abi::exports::MEMORY)
            .and_then(|e| e.into_memory())
            .ok_or_else(|| LinkerError::MemoryError("no memory export".into()))
    }

    /// Copy `len` bytes at `ptr` out of artifact memory.
    pub fn read_bytes(&mut self, ptr: i32, len: i32) -> Result<Vec<u8>, LinkerError> {
        if ptr < 0 || len < 0 {
            return Err(LinkerError::MemoryError(format!(
                "invalid region ptr={ptr} len={len}"
            )));
        }
        let memory = self.memory()?;
        let in_bounds = (ptr as usize)
            .checked_add(len as usize)
            .is_some_and(|end| end <= memory.data_size(&self.caller));
        if !in_bounds {
            return Err(LinkerError::MemoryError(format!(
                "region ptr={ptr} len={len} is outside artifact memory"
            )));
        }
        let mut buffer = vec![0u8; len as usize];
        memory
            .read(&self.caller, ptr as usize, &mut buffer)
            .map_err(|e| LinkerError::MemoryError(e.to_string()))?;
        Ok(buffer)
    }

    /// Read a UTF-8 string from artifact memory.
    pub fn read_string(&mut self, ptr: i32, len: i32) -> Result<String, LinkerError> {
        let buffer = self.read_bytes(ptr, len)?;
        String::from_utf8(buffer).map_err(|e| LinkerError::DecodingError(e.to_string()))
    }

    /// Copy `bytes` into artifact memory at `ptr`.
    pub fn write_bytes(&mut self, ptr: i32, bytes: &[u8]) -> Result<(), LinkerError> {
        if ptr < 0 {
            return Err(LinkerError::MemoryError(format!("invalid pointer {ptr}")));
        }
        let memory = self.memory()?;
        memory
            .write(&mut self.caller, ptr as usize, bytes)
            .map_err(|e| LinkerError::MemoryError(e.to_string()))
    }
}

/// Builder for registering host functions with a Linker.
///
/// Generic over `T` which is the store data type.
pub struct HostLinkerBuilder<'a, T> {
    linker: &'a mut Linker<T>,
    _marker: PhantomData<T>,
}

impl<'a, T> HostLinkerBuilder<'a, T> {
    /// Create a new builder wrapping a wasmtime Linker
    pub fn new(linker: &'a mut Linker<T>) -> Self {
        Self {
            linker,
            _marker: PhantomData,
        }
    }

    /// Start defining an interface (import module) with the given name.
    pub fn interface(&mut self, name: &str) -> Result<InterfaceBuilder<'_, 'a, T>, LinkerError> {
        if name.is_empty() {
            return Err(LinkerError::FunctionRegistration(
                "interface name must not be empty".into(),
            ));
        }
        Ok(InterfaceBuilder {
            linker: self,
            module_name: name.to_string(),
        })
    }

    /// Register a provider's functions.
    pub fn register_provider<P: HostFunctionProvider<T>>(
        &mut self,
        provider: &P,
    ) -> Result<&mut Self, LinkerError> {
        provider.register(self)?;
        Ok(self)
    }
}

/// Builder for registering functions within a specific interface/namespace.
pub struct InterfaceBuilder<'a, 'b, T> {
    linker: &'a mut HostLinkerBuilder<'b, T>,
    module_name: String,
}

impl<'a, 'b, T: 'static> InterfaceBuilder<'a, 'b, T> {
    /// Register a host function with direct WASM-level parameters.
    pub fn func_raw<Params, Results>(
        &mut self,
        name: &str,
        func: impl wasmtime::IntoFunc<T, Params, Results>,
    ) -> Result<&mut Self, LinkerError> {
        self.linker
            .linker
            .func_wrap(&self.module_name, name, func)
            .map_err(|e| LinkerError::FunctionRegistration(e.to_string()))?;
        Ok(self)
    }
}

/// Trait for types that provide host functions.
///
/// Implement this to create reusable sets of host functions that can
/// be registered with multiple instances.
pub trait HostFunctionProvider<T> {
    /// Register this provider's functions with the linker builder.
    fn register(&self, builder: &mut HostLinkerBuilder<'_, T>) -> Result<(), LinkerError>;
}

/// The `gl` interface: context creation, make-current and drawing calls,
/// all routed to the instance's [`GraphicsBridge`](crate::gfx::GraphicsBridge).
///
/// Bad pointers or lengths never trap; they come back as
/// [`ResultCode::InvalidParam`] and a diagnostic.
pub struct GlProvider;

impl HostFunctionProvider<BridgeState> for GlProvider {
    fn register(&self, builder: &mut HostLinkerBuilder<'_, BridgeState>) -> Result<(), LinkerError> {
        builder
            .interface(GL_MODULE)?
            .func_raw(
                imports::CREATE_CONTEXT,
                |caller: Caller<'_, BridgeState>,
                 id_ptr: i32,
                 id_len: i32,
                 flags: i32,
                 major: i32,
                 minor: i32|
                 -> i32 {
                    let mut ctx = Ctx::new(caller);
                    match ctx.read_bytes(id_ptr, id_len) {
                        Ok(id) => ctx
                            .data_mut()
                            .graphics
                            .create_context_raw(&id, flags, major, minor),
                        Err(e) => ctx
                            .data_mut()
                            .graphics
                            .invalid_param("create_context", format!("unreadable surface id: {e}")),
                    }
                },
            )?
            .func_raw(
                imports::MAKE_CURRENT,
                |mut caller: Caller<'_, BridgeState>, handle: i32| -> i32 {
                    caller.data_mut().graphics.make_current(handle)
                },
            )?
            .func_raw(
                imports::CLEAR_COLOR,
                |mut caller: Caller<'_, BridgeState>, r: f32, g: f32, b: f32, a: f32| {
                    caller.data_mut().graphics.clear_color(r, g, b, a)
                },
            )?
            .func_raw(
                imports::CLEAR_DEPTH,
                |mut caller: Caller<'_, BridgeState>, depth: f32| {
                    caller.data_mut().graphics.clear_depth(depth)
                },
            )?
            .func_raw(
                imports::CLEAR_STENCIL,
                |mut caller: Caller<'_, BridgeState>, stencil: i32| {
                    caller.data_mut().graphics.clear_stencil(stencil)
                },
            )?
            .func_raw(
                imports::CLEAR,
                |mut caller: Caller<'_, BridgeState>, mask: i32| {
                    caller.data_mut().graphics.clear(mask)
                },
            )?
            .func_raw(
                imports::SCISSOR,
                |mut caller: Caller<'_, BridgeState>, x: i32, y: i32, w: i32, h: i32| {
                    caller.data_mut().graphics.scissor(x, y, w, h)
                },
            )?
            .func_raw(
                imports::ENABLE,
                |mut caller: Caller<'_, BridgeState>, cap: i32| {
                    caller.data_mut().graphics.enable(cap)
                },
            )?
            .func_raw(
                imports::DISABLE,
                |mut caller: Caller<'_, BridgeState>, cap: i32| {
                    caller.data_mut().graphics.disable(cap)
                },
            )?
            .func_raw(
                imports::GET_ERROR,
                |mut caller: Caller<'_, BridgeState>| -> i32 {
                    caller.data_mut().graphics.get_error()
                },
            )?
            .func_raw(
                imports::READ_PIXELS,
                |caller: Caller<'_, BridgeState>,
                 x: i32,
                 y: i32,
                 w: i32,
                 h: i32,
                 out_ptr: i32|
                 -> i32 {
                    let mut ctx = Ctx::new(caller);
                    let pixels = match ctx.data_mut().graphics.read_pixels(x, y, w, h) {
                        Ok(pixels) => pixels,
                        Err(code) => return code,
                    };
                    match ctx.write_bytes(out_ptr, &pixels) {
                        Ok(()) => ResultCode::Success.code(),
                        Err(e) => ctx
                            .data_mut()
                            .graphics
                            .invalid_param("read_pixels", format!("output buffer not writable: {e}")),
                    }
                },
            )?;

        Ok(())
    }
}

/// The `env` interface: `log(ptr, len)` forwards artifact messages to
/// `tracing` and keeps the most recent ones on the instance.
pub struct EnvProvider;

impl HostFunctionProvider<BridgeState> for EnvProvider {
    fn register(&self, builder: &mut HostLinkerBuilder<'_, BridgeState>) -> Result<(), LinkerError> {
        builder.interface(ENV_MODULE)?.func_raw(
            "log",
            |caller: Caller<'_, BridgeState>, ptr: i32, len: i32| {
                let mut ctx = Ctx::new(caller);
                match ctx.read_string(ptr, len) {
                    Ok(msg) => {
                        tracing::info!(target: "glbridge::artifact", "{msg}");
                        ctx.data_mut().push_log(msg);
                    }
                    Err(e) => tracing::warn!(error = %e, "log: unreadable message"),
                }
            },
        )?;

        Ok(())
    }
}
