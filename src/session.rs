//! Host session: the host's single slot for a module instance.
//!
//! A session starts with instantiation in flight. Until it resolves, calls
//! through the session are rejected with [`CallError::NotReady`]; after a
//! failed instantiation they are rejected with [`CallError::Unavailable`]
//! until the host calls [`HostSession::reload`].

use crate::marshal::{Arg, CallError, Ret};
use crate::registry;
use crate::runtime::{LoadError, Loader, ModuleHandle, PendingModule};

/// Where the session's module is in its lifecycle.
#[derive(Debug)]
pub enum ModuleSlot {
    Pending(PendingModule),
    Ready(ModuleHandle),
    Failed(LoadError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    Ready,
    Failed,
}

pub struct HostSession {
    loader: Loader,
    slot: ModuleSlot,
}

impl HostSession {
    /// Begin instantiating the artifact `locate` points at.
    pub fn start<L>(loader: Loader, locate: L) -> Self
    where
        L: FnOnce() -> String,
    {
        let slot = ModuleSlot::Pending(loader.instantiate(locate));
        Self { loader, slot }
    }

    /// Throw away the current module (in any state) and instantiate again.
    ///
    /// The new instance shares nothing with the old one.
    pub fn reload<L>(&mut self, locate: L)
    where
        L: FnOnce() -> String,
    {
        self.slot = ModuleSlot::Pending(self.loader.instantiate(locate));
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    /// Settle a finished instantiation without blocking.
    pub fn poll(&mut self) -> SessionStatus {
        if let ModuleSlot::Pending(pending) = &mut self.slot {
            if let Some(result) = pending.try_resolve() {
                self.slot = settle(result);
            }
        }
        self.status()
    }

    pub fn status(&self) -> SessionStatus {
        match self.slot {
            ModuleSlot::Pending(_) => SessionStatus::Pending,
            ModuleSlot::Ready(_) => SessionStatus::Ready,
            ModuleSlot::Failed(_) => SessionStatus::Failed,
        }
    }

    /// Wait for instantiation to finish and return the module.
    pub async fn ready(&mut self) -> Result<&mut ModuleHandle, CallError> {
        if let ModuleSlot::Pending(pending) = &mut self.slot {
            let result = pending.await;
            self.slot = settle(result);
        }
        self.module()
    }

    /// The module, if instantiation has already resolved successfully.
    pub fn module(&mut self) -> Result<&mut ModuleHandle, CallError> {
        match &mut self.slot {
            ModuleSlot::Ready(handle) => Ok(handle),
            ModuleSlot::Pending(_) => Err(CallError::NotReady),
            ModuleSlot::Failed(e) => Err(CallError::Unavailable(e.to_string())),
        }
    }

    /// The load error, if instantiation failed.
    pub fn failure(&self) -> Option<&LoadError> {
        match &self.slot {
            ModuleSlot::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Call a registered binding.
    ///
    /// Unknown names are rejected first, whatever the module's state.
    pub fn call(&mut self, name: &str, args: &[Arg<'_>]) -> Result<Ret, CallError> {
        registry::resolve(name)?;
        self.poll();
        self.module()?.call(name, args)
    }

    pub fn add(&mut self, a: i32, b: i32) -> Result<i32, CallError> {
        self.poll();
        self.module()?.add(a, b)
    }

    pub fn render(&mut self, surface_id: &str) -> Result<(), CallError> {
        self.poll();
        self.module()?.render(surface_id)
    }
}

fn settle(result: Result<ModuleHandle, LoadError>) -> ModuleSlot {
    match result {
        Ok(handle) => ModuleSlot::Ready(handle),
        Err(e) => ModuleSlot::Failed(e),
    }
}
