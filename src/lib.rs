//! glbridge: a host bridge for compiled WebAssembly artifacts that draw
//!
//! An artifact is loaded asynchronously, called only through a fixed table
//! of exported functions, and given host-owned surfaces to draw on through
//! GL-style context imports.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 Host session                 │
//! │                                              │
//! │  artifact  - resolve, fetch, inspect         │
//! │  runtime   - async instantiation, calls      │
//! │  registry  - binding table checks            │
//! │  gfx       - contexts bound to surfaces      │
//! │  frame     - repeated render scheduling      │
//! │                                              │
//! ├──────────────────────────────────────────────┤
//! │            WASM Execution (wasmtime)         │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Exposed call surface
//!
//! ```text
//! add(i32, i32) -> i32
//! render(string) -> void
//! ```

pub mod artifact;
pub mod config;
pub mod frame;
pub mod gfx;
pub mod marshal;
pub mod registry;
pub mod runtime;
pub mod session;

pub use artifact::{ArtifactDigest, ArtifactLocation, Fetch, FsFetcher, Manifest, MemoryFetcher};
pub use config::{BridgeConfig, ConfigError};
pub use frame::{FrameDriver, FrameOutcome, FrameReport, FrameScheduler, IntervalScheduler, StopToken};
pub use gfx::{GraphicsBridge, SurfaceError, SurfaceHost};
pub use glbridge_abi as abi;
pub use marshal::{Arg, CallError, Ret};
pub use runtime::{BridgeState, LoadError, Loader, ModuleHandle, PendingModule};
pub use session::{HostSession, SessionStatus};
