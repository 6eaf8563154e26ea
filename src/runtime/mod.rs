//! Module Runtime
//!
//! Asynchronous artifact instantiation and the handle used to call into a
//! ready module.
//!
//! ```ignore
//! let loader = Loader::new(BridgeConfig::default(), surfaces.clone());
//! let pending = loader.instantiate(|| "build/app.wasm".to_string());
//! let mut module = pending.await?;
//! assert_eq!(module.add(1, 2)?, 3);
//! module.render("canvas")?;
//! ```

mod host;

pub use host::{
    Ctx, EnvProvider, GlProvider, HostFunctionProvider, HostLinkerBuilder, InterfaceBuilder,
    LinkerError,
};

use crate::artifact::{ArtifactDigest, ArtifactLocation, Fetch, FetchError, FsFetcher};
use crate::config::BridgeConfig;
use crate::gfx::{GraphicsBridge, SurfaceHost};
use crate::marshal::{Arg, CallError, Ret};
use crate::registry::{self, ExportError};
use glbridge_abi::{exports, BindingDescriptor};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::oneshot;
use wasmtime::{
    Config, Engine, Instance as WasmtimeInstance, Linker, Memory, Module, Store, TypedFunc, Val,
};

/// How many artifact log lines an instance keeps.
pub const LOG_HISTORY: usize = 64;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to fetch artifact: {0}")]
    Fetch(#[from] FetchError),

    #[error("Failed to compile artifact {uri}: {message}")]
    Compile { uri: String, message: String },

    #[error("Failed to link host functions: {0}")]
    Link(#[from] LinkerError),

    #[error("Failed to instantiate artifact {uri}: {message}")]
    Instantiate { uri: String, message: String },

    #[error("Artifact {uri} does not match the binding table: {source}")]
    Exports {
        uri: String,
        #[source]
        source: ExportError,
    },

    #[error("Artifact initializer failed: {0}")]
    Initialize(String),

    #[error("Failed to create engine: {0}")]
    Engine(String),

    #[error("Instantiation was abandoned before it completed")]
    Aborted,
}

/// Per-instance store data: graphics state and recent artifact log lines.
#[derive(Debug)]
pub struct BridgeState {
    pub graphics: GraphicsBridge,
    logs: VecDeque<String>,
}

impl BridgeState {
    pub fn new(surfaces: SurfaceHost, max_contexts: usize) -> Self {
        Self {
            graphics: GraphicsBridge::new(surfaces, max_contexts),
            logs: VecDeque::new(),
        }
    }

    pub(crate) fn push_log(&mut self, line: String) {
        if self.logs.len() == LOG_HISTORY {
            self.logs.pop_front();
        }
        self.logs.push_back(line);
    }

    /// Recent lines the artifact logged through `env.log`, oldest first.
    pub fn logs(&self) -> impl Iterator<Item = &str> {
        self.logs.iter().map(String::as_str)
    }
}

/// Produces module instances from artifact locations.
///
/// One engine is shared by every instance a loader creates; each instance
/// gets its own store, so graphics contexts are never shared.
#[derive(Clone)]
pub struct Loader {
    engine: Engine,
    fetcher: Arc<dyn Fetch>,
    config: Arc<BridgeConfig>,
    surfaces: SurfaceHost,
}

impl Loader {
    /// Create a loader that reads artifacts from the filesystem.
    pub fn new(config: BridgeConfig, surfaces: SurfaceHost) -> Result<Self, LoadError> {
        Self::with_fetcher(config, surfaces, FsFetcher::new())
    }

    pub fn with_fetcher(
        config: BridgeConfig,
        surfaces: SurfaceHost,
        fetcher: impl Fetch + 'static,
    ) -> Result<Self, LoadError> {
        let mut engine_config = Config::new();
        engine_config.consume_fuel(config.fuel_per_call.is_some());
        let engine = Engine::new(&engine_config).map_err(|e| LoadError::Engine(e.to_string()))?;
        Ok(Self {
            engine,
            fetcher: Arc::new(fetcher),
            config: Arc::new(config),
            surfaces,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Start instantiating the artifact `locate` points at.
    ///
    /// `locate` is called exactly once, before this returns. The fetch,
    /// compile and instantiate steps run on the tokio runtime; the returned
    /// [`PendingModule`] resolves once they finish. Must be called from
    /// within a tokio runtime.
    pub fn instantiate<L>(&self, locate: L) -> PendingModule
    where
        L: FnOnce() -> String,
    {
        let uri = locate();
        tracing::debug!(%uri, "instantiation started");
        let (tx, rx) = oneshot::channel();
        let loader = self.clone();
        let task_uri = uri.clone();

        tokio::spawn(async move {
            let result = loader.load(&task_uri).await;
            if let Err(e) = &result {
                tracing::warn!(uri = %task_uri, error = %e, "artifact instantiation failed");
            }
            // The receiver may be gone if the host lost interest.
            let _ = tx.send(result);
        });

        PendingModule { uri, rx }
    }

    async fn load(&self, uri: &str) -> Result<ModuleHandle, LoadError> {
        let location = ArtifactLocation::parse(uri)?;
        let bytes = self.fetcher.fetch(&location).await?;
        let digest = ArtifactDigest::of(&bytes);
        tracing::info!(%uri, %digest, size = bytes.len(), "artifact fetched");

        let module = Module::new(&self.engine, &bytes).map_err(|e| LoadError::Compile {
            uri: uri.to_string(),
            message: e.to_string(),
        })?;

        let mut linker = Linker::new(&self.engine);
        HostLinkerBuilder::new(&mut linker)
            .register_provider(&GlProvider)?
            .register_provider(&EnvProvider)?;

        let state = BridgeState::new(self.surfaces.clone(), self.config.max_contexts);
        let mut store = Store::new(&self.engine, state);
        refuel(&mut store, self.config.fuel_per_call).map_err(LoadError::Initialize)?;

        let instance =
            linker
                .instantiate(&mut store, &module)
                .map_err(|e| LoadError::Instantiate {
                    uri: uri.to_string(),
                    message: e.to_string(),
                })?;

        registry::validate_exports(&mut store, &instance).map_err(|source| {
            LoadError::Exports {
                uri: uri.to_string(),
                source,
            }
        })?;

        if let Ok(init) = instance.get_typed_func::<(), ()>(&mut store, exports::INITIALIZE) {
            init.call(&mut store, ())
                .map_err(|e| LoadError::Initialize(e.to_string()))?;
        }

        let memory = instance.get_memory(&mut store, exports::MEMORY);
        let alloc = instance
            .get_typed_func::<i32, i32>(&mut store, exports::ALLOC)
            .ok();
        let dealloc = instance
            .get_typed_func::<(i32, i32), ()>(&mut store, exports::DEALLOC)
            .ok();

        tracing::info!(%uri, "module ready");
        Ok(ModuleHandle {
            uri: uri.to_string(),
            digest,
            fuel_per_call: self.config.fuel_per_call,
            store,
            instance,
            memory,
            alloc,
            dealloc,
        })
    }
}

fn refuel<T>(store: &mut Store<T>, fuel: Option<u64>) -> Result<(), String> {
    match fuel {
        Some(fuel) => store.set_fuel(fuel).map_err(|e| e.to_string()),
        None => Ok(()),
    }
}

/// A module whose instantiation is still in flight.
///
/// Await it (it is a [`Future`]) or poll it without blocking through
/// [`PendingModule::try_resolve`]. It offers no way to call into the
/// module: only the resolved [`ModuleHandle`] does.
#[derive(Debug)]
pub struct PendingModule {
    uri: String,
    rx: oneshot::Receiver<Result<ModuleHandle, LoadError>>,
}

impl PendingModule {
    /// The location the resolver hook returned.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Take the result if instantiation has finished.
    pub fn try_resolve(&mut self) -> Option<Result<ModuleHandle, LoadError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(LoadError::Aborted)),
        }
    }
}

impl Future for PendingModule {
    type Output = Result<ModuleHandle, LoadError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(LoadError::Aborted)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// A fully instantiated artifact.
///
/// Calls are synchronous and run to completion. Only names in the binding
/// table can be called.
pub struct ModuleHandle {
    uri: String,
    digest: ArtifactDigest,
    fuel_per_call: Option<u64>,
    store: Store<BridgeState>,
    instance: WasmtimeInstance,
    memory: Option<Memory>,
    alloc: Option<TypedFunc<i32, i32>>,
    dealloc: Option<TypedFunc<(i32, i32), ()>>,
}

impl std::fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("uri", &self.uri)
            .field("digest", &self.digest.to_string())
            .finish_non_exhaustive()
    }
}

impl ModuleHandle {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn digest(&self) -> ArtifactDigest {
        self.digest
    }

    pub fn state(&self) -> &BridgeState {
        self.store.data()
    }

    pub fn graphics(&self) -> &GraphicsBridge {
        &self.store.data().graphics
    }

    pub fn graphics_mut(&mut self) -> &mut GraphicsBridge {
        &mut self.store.data_mut().graphics
    }

    /// `add(i32, i32) -> i32`
    pub fn add(&mut self, a: i32, b: i32) -> Result<i32, CallError> {
        match self.call("add", &[Arg::I32(a), Arg::I32(b)])? {
            Ret::I32(v) => Ok(v),
            _ => Err(CallError::ResultShape { name: "add".into() }),
        }
    }

    /// `render(string) -> void`: hand the named surface to the artifact's
    /// drawing code. Drawing failures are not errors here; they show up as
    /// graphics diagnostics.
    pub fn render(&mut self, surface_id: &str) -> Result<(), CallError> {
        self.call("render", &[Arg::Str(surface_id)]).map(|_| ())
    }

    /// Call a registered binding by name.
    pub fn call(&mut self, name: &str, args: &[Arg<'_>]) -> Result<Ret, CallError> {
        let descriptor = registry::resolve(name)?;
        registry::check_args(descriptor, args)?;
        tracing::trace!(binding = name, ?args, "call");

        let mut borrowed = Vec::new();
        let result = self.invoke(descriptor, args, &mut borrowed);
        for (ptr, len) in borrowed {
            if let Err(e) = self.release(ptr, len) {
                tracing::warn!(binding = name, error = %e, "failed to release argument buffer");
            }
        }
        result
    }

    fn invoke(
        &mut self,
        descriptor: &BindingDescriptor,
        args: &[Arg<'_>],
        borrowed: &mut Vec<(i32, i32)>,
    ) -> Result<Ret, CallError> {
        let trap = |e: wasmtime::Error| CallError::Trap {
            name: descriptor.name.to_string(),
            message: e.to_string(),
        };

        refuel(&mut self.store, self.fuel_per_call).map_err(|message| CallError::Trap {
            name: descriptor.name.to_string(),
            message,
        })?;

        let mut params = Vec::with_capacity(descriptor.core_param_count());
        for arg in args {
            if let Arg::Str(s) = arg {
                let (ptr, len) = self.copy_in(s.as_bytes())?;
                if len > 0 {
                    borrowed.push((ptr, len));
                }
                params.push(Val::I32(ptr));
                params.push(Val::I32(len));
            } else {
                params.extend(arg.to_val());
            }
        }

        let func = self
            .instance
            .get_func(&mut self.store, descriptor.name)
            .ok_or_else(|| CallError::UnknownBinding(descriptor.name.to_string()))?;
        let mut results = Ret::slots(descriptor.ret);
        func.call(&mut self.store, &params, &mut results)
            .map_err(trap)?;

        Ret::lift(descriptor.ret, &results).ok_or_else(|| CallError::ResultShape {
            name: descriptor.name.to_string(),
        })
    }

    /// Copy bytes into a fresh artifact allocation. Empty input is `(0, 0)`.
    fn copy_in(&mut self, bytes: &[u8]) -> Result<(i32, i32), CallError> {
        if bytes.is_empty() {
            return Ok((0, 0));
        }
        let len = i32::try_from(bytes.len()).map_err(|_| CallError::Allocation { len: bytes.len() })?;
        let (Some(alloc), Some(memory)) = (self.alloc.clone(), self.memory) else {
            return Err(CallError::Memory("artifact has no allocator".into()));
        };
        let ptr = alloc
            .call(&mut self.store, len)
            .map_err(|e| CallError::Trap {
                name: exports::ALLOC.to_string(),
                message: e.to_string(),
            })?;
        if ptr <= 0 {
            return Err(CallError::Allocation { len: bytes.len() });
        }
        if let Err(e) = memory.write(&mut self.store, ptr as usize, bytes) {
            // Give the buffer back before reporting.
            let _ = self.release(ptr, len);
            return Err(CallError::Memory(e.to_string()));
        }
        Ok((ptr, len))
    }

    fn release(&mut self, ptr: i32, len: i32) -> Result<(), CallError> {
        let Some(dealloc) = self.dealloc.clone() else {
            return Ok(());
        };
        dealloc
            .call(&mut self.store, (ptr, len))
            .map_err(|e| CallError::Trap {
                name: exports::DEALLOC.to_string(),
                message: e.to_string(),
            })
    }
}
