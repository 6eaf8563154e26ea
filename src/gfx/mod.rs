//! Graphics context bridge.
//!
//! Binds artifact drawing calls to host-owned surfaces. Each module instance
//! owns exactly one [`GraphicsBridge`]; the notion of a "current" context is
//! state on that bridge rather than anything global, so two instances never
//! observe each other's contexts.
//!
//! Every operation reports failure as a sentinel ([`ResultCode`] or a GL
//! error flag) and never panics or traps. Failures are logged and kept as
//! [`Diagnostic`]s so the host can notice them out-of-band.

mod surface;

pub use surface::{Rect, Surface, SurfaceError, SurfaceHost, BYTES_PER_PIXEL};

use glbridge_abi::gl;
use glbridge_abi::{ContextAttributes, ResultCode};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// How many diagnostics a bridge remembers before dropping the oldest.
pub const DIAGNOSTIC_HISTORY: usize = 64;

/// Default cap on live contexts per bridge.
pub const DEFAULT_MAX_CONTEXTS: usize = 8;

/// A failure recorded by the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// The operation that failed (e.g. `"create_context"`).
    pub operation: &'static str,
    /// Result code or GL error value.
    pub code: i32,
    pub detail: String,
}

#[derive(Debug)]
struct Context {
    surface_id: String,
    generation: u64,
    attributes: ContextAttributes,
    lost: bool,
    clear_color: [f32; 4],
    clear_depth: f32,
    clear_stencil: u8,
    scissor: Rect,
    scissor_test: bool,
    error: i32,
    depth: Option<Vec<f32>>,
    stencil: Option<Vec<u8>>,
    width: u32,
}

impl Context {
    fn set_error(&mut self, error: i32) {
        // GL keeps the first error until it is read.
        if self.error == gl::NO_ERROR {
            self.error = error;
        }
    }

    fn clear_region(&self, surface: &Surface) -> Option<Rect> {
        let full = Rect::new(0, 0, surface.width(), surface.height());
        if self.scissor_test {
            self.scissor.clip(surface.width(), surface.height())
        } else {
            Some(full)
        }
    }
}

/// Convert a normalized colour channel to a byte.
fn channel(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn fill_plane<T: Copy>(plane: &mut [T], width: u32, rect: Rect, value: T) {
    for row in rect.y..rect.y + rect.height {
        let start = row as usize * width as usize + rect.x as usize;
        plane[start..start + rect.width as usize].fill(value);
    }
}

/// Per-instance graphics state: the context table and the current context.
#[derive(Debug)]
pub struct GraphicsBridge {
    surfaces: SurfaceHost,
    contexts: BTreeMap<i32, Context>,
    by_surface: HashMap<String, i32>,
    current: Option<i32>,
    next_handle: i32,
    max_contexts: usize,
    diagnostics: VecDeque<Diagnostic>,
    diagnostic_count: u64,
}

impl GraphicsBridge {
    pub fn new(surfaces: SurfaceHost, max_contexts: usize) -> Self {
        Self {
            surfaces,
            contexts: BTreeMap::new(),
            by_surface: HashMap::new(),
            current: None,
            next_handle: 1,
            max_contexts,
            diagnostics: VecDeque::new(),
            diagnostic_count: 0,
        }
    }

    pub fn surfaces(&self) -> &SurfaceHost {
        &self.surfaces
    }

    /// Handle of the context that drawing calls currently target.
    pub fn current(&self) -> Option<i32> {
        self.current
    }

    /// Number of contexts this bridge has created and still tracks.
    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    /// Surface a context is bound to.
    pub fn context_surface(&self, handle: i32) -> Option<&str> {
        self.contexts.get(&handle).map(|c| c.surface_id.as_str())
    }

    pub fn context_attributes(&self, handle: i32) -> Option<ContextAttributes> {
        self.contexts.get(&handle).map(|c| c.attributes)
    }

    pub fn is_lost(&self, handle: i32) -> bool {
        self.contexts.get(&handle).map_or(false, |c| c.lost)
    }

    /// Recent diagnostics, oldest first.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// Total diagnostics ever recorded, including ones no longer retained.
    pub fn diagnostic_count(&self) -> u64 {
        self.diagnostic_count
    }

    fn diagnose(&mut self, operation: &'static str, code: i32, detail: String) {
        tracing::warn!(operation, code, %detail, "graphics bridge failure");
        if self.diagnostics.len() == DIAGNOSTIC_HISTORY {
            self.diagnostics.pop_front();
        }
        self.diagnostics.push_back(Diagnostic {
            operation,
            code,
            detail,
        });
        self.diagnostic_count += 1;
    }

    fn fail(&mut self, operation: &'static str, code: ResultCode, detail: String) -> i32 {
        self.diagnose(operation, code.code(), detail);
        code.code()
    }

    /// Record an argument that could not be read from, or written to, artifact memory.
    pub(crate) fn invalid_param(&mut self, operation: &'static str, detail: String) -> i32 {
        self.fail(operation, ResultCode::InvalidParam, detail)
    }

    /// Create a context from the raw arguments an artifact passes across
    /// the `gl.create_context` import.
    pub fn create_context_raw(
        &mut self,
        surface_id: &[u8],
        flags: i32,
        major_version: i32,
        minor_version: i32,
    ) -> i32 {
        let Ok(surface_id) = std::str::from_utf8(surface_id) else {
            return self.fail(
                "create_context",
                ResultCode::InvalidParam,
                "surface id is not valid UTF-8".into(),
            );
        };
        let Some(attributes) = ContextAttributes::from_raw(flags, major_version, minor_version)
        else {
            return self.fail(
                "create_context",
                ResultCode::InvalidParam,
                format!("unknown attribute flags {flags:#x}"),
            );
        };
        self.create_context(surface_id, attributes)
    }

    /// Create a context bound to `surface_id`.
    ///
    /// Returns a positive handle, or a negative [`ResultCode`]. Calling this
    /// again for a surface that already has a live context returns that
    /// context's handle unchanged; a lost context is replaced. When the
    /// table is full, lost contexts are evicted before giving up.
    pub fn create_context(&mut self, surface_id: &str, attributes: ContextAttributes) -> i32 {
        if !supported(&attributes) {
            return self.fail(
                "create_context",
                ResultCode::NotSupported,
                format!("unsupported attributes {attributes:?} for '{surface_id}'"),
            );
        }

        let Some(generation) = self.surfaces.generation(surface_id) else {
            return self.fail(
                "create_context",
                ResultCode::UnknownTarget,
                format!("no surface named '{surface_id}'"),
            );
        };

        if let Some(&existing) = self.by_surface.get(surface_id) {
            if self.refresh_liveness(existing) {
                tracing::trace!(surface = %surface_id, handle = existing, "context already exists");
                return existing;
            }
            tracing::debug!(surface = %surface_id, handle = existing, "replacing lost context");
            self.drop_context(existing);
        }

        if self.contexts.len() >= self.max_contexts {
            self.evict_lost();
        }
        if self.contexts.len() >= self.max_contexts {
            return self.fail(
                "create_context",
                ResultCode::Failed,
                format!("context limit of {} reached", self.max_contexts),
            );
        }

        let Some((width, height)) = self.surfaces.size(surface_id) else {
            return self.fail(
                "create_context",
                ResultCode::UnknownTarget,
                format!("no surface named '{surface_id}'"),
            );
        };
        let area = width as usize * height as usize;

        let handle = self.next_handle;
        self.next_handle += 1;
        self.contexts.insert(
            handle,
            Context {
                surface_id: surface_id.to_string(),
                generation,
                attributes,
                lost: false,
                clear_color: [0.0; 4],
                clear_depth: 1.0,
                clear_stencil: 0,
                scissor: Rect::new(0, 0, width, height),
                scissor_test: false,
                error: gl::NO_ERROR,
                depth: attributes.depth.then(|| vec![1.0; area]),
                stencil: attributes.stencil.then(|| vec![0; area]),
                width,
            },
        );
        self.by_surface.insert(surface_id.to_string(), handle);
        tracing::debug!(surface = %surface_id, handle, width, height, "context created");
        handle
    }

    fn drop_context(&mut self, handle: i32) {
        if let Some(ctx) = self.contexts.remove(&handle) {
            self.by_surface.remove(&ctx.surface_id);
        }
        if self.current == Some(handle) {
            self.current = None;
        }
    }

    /// Drop every context whose surface is gone, freeing its slot.
    fn evict_lost(&mut self) {
        let handles: Vec<i32> = self.contexts.keys().copied().collect();
        for handle in handles {
            if !self.refresh_liveness(handle) {
                tracing::debug!(handle, "evicting lost context");
                self.drop_context(handle);
            }
        }
    }

    /// Check the bound surface still exists; marks the context lost if not.
    fn refresh_liveness(&mut self, handle: i32) -> bool {
        let Some(ctx) = self.contexts.get_mut(&handle) else {
            return false;
        };
        if !ctx.lost && self.surfaces.generation(&ctx.surface_id) != Some(ctx.generation) {
            ctx.lost = true;
        }
        !ctx.lost
    }

    /// Make `handle` the target of subsequent drawing calls.
    pub fn make_current(&mut self, handle: i32) -> i32 {
        if !self.contexts.contains_key(&handle) {
            return self.fail(
                "make_current",
                ResultCode::InvalidParam,
                format!("unknown context handle {handle}"),
            );
        }
        if !self.refresh_liveness(handle) {
            if self.current == Some(handle) {
                self.current = None;
            }
            return self.fail(
                "make_current",
                ResultCode::Failed,
                format!("context {handle} was lost"),
            );
        }
        self.current = Some(handle);
        ResultCode::Success.code()
    }

    /// The current context, if it is still usable. Records a diagnostic otherwise.
    fn current_context(&mut self, operation: &'static str) -> Option<&mut Context> {
        let Some(handle) = self.current else {
            self.diagnose(
                operation,
                gl::INVALID_OPERATION,
                "no current context".into(),
            );
            return None;
        };
        if !self.refresh_liveness(handle) {
            self.current = None;
            self.diagnose(
                operation,
                gl::INVALID_OPERATION,
                format!("current context {handle} was lost"),
            );
            return None;
        }
        self.contexts.get_mut(&handle)
    }

    pub fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        if let Some(ctx) = self.current_context("clear_color") {
            ctx.clear_color = [r, g, b, a];
        }
    }

    pub fn clear_depth(&mut self, depth: f32) {
        if let Some(ctx) = self.current_context("clear_depth") {
            ctx.clear_depth = depth.clamp(0.0, 1.0);
        }
    }

    pub fn clear_stencil(&mut self, stencil: i32) {
        if let Some(ctx) = self.current_context("clear_stencil") {
            ctx.clear_stencil = stencil as u8;
        }
    }

    pub fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
        if let Some(ctx) = self.current_context("scissor") {
            if width < 0 || height < 0 {
                ctx.set_error(gl::INVALID_VALUE);
                return;
            }
            ctx.scissor = Rect::new(
                x.max(0) as u32,
                y.max(0) as u32,
                width as u32,
                height as u32,
            );
        }
    }

    pub fn enable(&mut self, cap: i32) {
        self.set_capability("enable", cap, true);
    }

    pub fn disable(&mut self, cap: i32) {
        self.set_capability("disable", cap, false);
    }

    fn set_capability(&mut self, operation: &'static str, cap: i32, on: bool) {
        if let Some(ctx) = self.current_context(operation) {
            match cap {
                gl::SCISSOR_TEST => ctx.scissor_test = on,
                _ => ctx.set_error(gl::INVALID_ENUM),
            }
        }
    }

    /// Clear the buffers selected by `mask` on the current context.
    pub fn clear(&mut self, mask: i32) {
        const ALL: i32 = gl::COLOR_BUFFER_BIT | gl::DEPTH_BUFFER_BIT | gl::STENCIL_BUFFER_BIT;

        let surfaces = self.surfaces.clone();
        let Some(ctx) = self.current_context("clear") else {
            return;
        };
        if mask & !ALL != 0 {
            ctx.set_error(gl::INVALID_VALUE);
            return;
        }

        let rgba = ctx.clear_color.map(channel);
        let region = surfaces.with_surface(&ctx.surface_id, ctx.generation, |surface| {
            let region = ctx.clear_region(surface);
            if let (Some(rect), true) = (region, mask & gl::COLOR_BUFFER_BIT != 0) {
                surface.fill(rect, rgba);
            }
            region
        });

        if let Some(Some(rect)) = region {
            let width = ctx.width;
            if mask & gl::DEPTH_BUFFER_BIT != 0 {
                let value = ctx.clear_depth;
                if let Some(depth) = ctx.depth.as_mut() {
                    fill_plane(depth, width, rect, value);
                }
            }
            if mask & gl::STENCIL_BUFFER_BIT != 0 {
                let value = ctx.clear_stencil;
                if let Some(stencil) = ctx.stencil.as_mut() {
                    fill_plane(stencil, width, rect, value);
                }
            }
        }
    }

    /// Return and reset the current context's error flag.
    pub fn get_error(&mut self) -> i32 {
        match self.current_context("get_error") {
            Some(ctx) => std::mem::replace(&mut ctx.error, gl::NO_ERROR),
            None => gl::INVALID_OPERATION,
        }
    }

    /// Read RGBA8 pixels from the current context's surface.
    pub fn read_pixels(&mut self, x: i32, y: i32, width: i32, height: i32) -> Result<Vec<u8>, i32> {
        let surfaces = self.surfaces.clone();
        let Some(ctx) = self.current_context("read_pixels") else {
            return Err(ResultCode::Failed.code());
        };
        if x < 0 || y < 0 || width < 0 || height < 0 {
            ctx.set_error(gl::INVALID_VALUE);
            return Err(ResultCode::InvalidParam.code());
        }
        let rect = Rect::new(x as u32, y as u32, width as u32, height as u32);
        match surfaces.with_surface(&ctx.surface_id, ctx.generation, |s| s.read(rect)) {
            Some(Some(pixels)) => Ok(pixels),
            Some(None) => {
                ctx.set_error(gl::INVALID_VALUE);
                Err(ResultCode::InvalidParam.code())
            }
            None => Err(ResultCode::Failed.code()),
        }
    }
}

fn supported(attributes: &ContextAttributes) -> bool {
    matches!(attributes.major_version, 1 | 2)
        && attributes.minor_version == 0
        && !attributes.explicit_swap_control
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge_with_canvas(width: u32, height: u32) -> GraphicsBridge {
        let surfaces = SurfaceHost::new();
        surfaces.insert("canvas", width, height).unwrap();
        GraphicsBridge::new(surfaces, DEFAULT_MAX_CONTEXTS)
    }

    #[test]
    fn unknown_surface_fails_with_negative_code() {
        let mut bridge = bridge_with_canvas(2, 2);
        let handle = bridge.create_context("nope", ContextAttributes::DEFAULT);
        assert_eq!(handle, ResultCode::UnknownTarget.code());
        assert_eq!(bridge.diagnostic_count(), 1);
        assert_eq!(bridge.context_count(), 0);
    }

    #[test]
    fn handles_start_at_one_per_bridge() {
        let mut a = bridge_with_canvas(2, 2);
        let mut b = bridge_with_canvas(2, 2);
        assert_eq!(a.create_context("canvas", ContextAttributes::DEFAULT), 1);
        assert_eq!(b.create_context("canvas", ContextAttributes::DEFAULT), 1);
    }

    #[test]
    fn second_create_for_same_surface_is_a_no_op() {
        let mut bridge = bridge_with_canvas(2, 2);
        let first = bridge.create_context("canvas", ContextAttributes::DEFAULT);
        let second = bridge.create_context("canvas", ContextAttributes::DEFAULT);
        assert_eq!(first, second);
        assert_eq!(bridge.context_count(), 1);
    }

    #[test]
    fn unsupported_attributes_are_rejected() {
        let mut bridge = bridge_with_canvas(2, 2);
        let attrs = ContextAttributes {
            explicit_swap_control: true,
            ..ContextAttributes::DEFAULT
        };
        assert_eq!(
            bridge.create_context("canvas", attrs),
            ResultCode::NotSupported.code()
        );
        let attrs = ContextAttributes {
            major_version: 3,
            ..ContextAttributes::DEFAULT
        };
        assert_eq!(
            bridge.create_context("canvas", attrs),
            ResultCode::NotSupported.code()
        );
    }

    #[test]
    fn raw_creation_rejects_bad_utf8_and_flags() {
        let mut bridge = bridge_with_canvas(2, 2);
        assert_eq!(
            bridge.create_context_raw(&[0xff, 0xfe], 0, 2, 0),
            ResultCode::InvalidParam.code()
        );
        assert_eq!(
            bridge.create_context_raw(b"canvas", 1 << 20, 2, 0),
            ResultCode::InvalidParam.code()
        );
        assert_eq!(bridge.create_context_raw(b"canvas", 0, 2, 0), 1);
    }

    #[test]
    fn context_limit_is_enforced() {
        let surfaces = SurfaceHost::new();
        surfaces.insert("a", 1, 1).unwrap();
        surfaces.insert("b", 1, 1).unwrap();
        let mut bridge = GraphicsBridge::new(surfaces, 1);
        assert_eq!(bridge.create_context("a", ContextAttributes::DEFAULT), 1);
        assert_eq!(
            bridge.create_context("b", ContextAttributes::DEFAULT),
            ResultCode::Failed.code()
        );
    }

    #[test]
    fn lost_contexts_free_their_slots() {
        let surfaces = SurfaceHost::new();
        let mut bridge = GraphicsBridge::new(surfaces.clone(), 2);
        for id in ["s0", "s1"] {
            surfaces.insert(id, 1, 1).unwrap();
            assert!(bridge.create_context(id, ContextAttributes::DEFAULT) > 0);
            surfaces.remove(id);
        }
        surfaces.insert("fresh", 1, 1).unwrap();

        let handle = bridge.create_context("fresh", ContextAttributes::DEFAULT);
        assert_eq!(handle, 3);
        assert_eq!(bridge.context_count(), 1);
        assert_eq!(bridge.context_surface(handle), Some("fresh"));
        assert_eq!(bridge.make_current(1), ResultCode::InvalidParam.code());
    }

    #[test]
    fn clear_to_red_fills_every_pixel() {
        let mut bridge = bridge_with_canvas(3, 2);
        let handle = bridge.create_context("canvas", ContextAttributes::DEFAULT);
        assert_eq!(bridge.make_current(handle), 0);

        bridge.clear_color(1.0, 0.0, 0.0, 1.0);
        bridge.clear(gl::COLOR_BUFFER_BIT | gl::DEPTH_BUFFER_BIT);

        let pixels = bridge.read_pixels(0, 0, 3, 2).unwrap();
        for px in pixels.chunks_exact(4) {
            assert_eq!(px, [255, 0, 0, 255]);
        }
        assert_eq!(bridge.get_error(), gl::NO_ERROR);
    }

    #[test]
    fn scissor_limits_the_cleared_region() {
        let mut bridge = bridge_with_canvas(4, 4);
        let handle = bridge.create_context("canvas", ContextAttributes::DEFAULT);
        bridge.make_current(handle);

        bridge.enable(gl::SCISSOR_TEST);
        bridge.scissor(1, 1, 2, 2);
        bridge.clear_color(0.0, 0.0, 1.0, 1.0);
        bridge.clear(gl::COLOR_BUFFER_BIT);

        let surfaces = bridge.surfaces().clone();
        assert_eq!(surfaces.pixel("canvas", 1, 1).unwrap(), [0, 0, 255, 255]);
        assert_eq!(surfaces.pixel("canvas", 2, 2).unwrap(), [0, 0, 255, 255]);
        assert_eq!(surfaces.pixel("canvas", 0, 0).unwrap(), [0, 0, 0, 0]);
        assert_eq!(surfaces.pixel("canvas", 3, 3).unwrap(), [0, 0, 0, 0]);
    }

    #[test]
    fn drawing_without_current_context_is_dropped() {
        let mut bridge = bridge_with_canvas(2, 2);
        bridge.create_context("canvas", ContextAttributes::DEFAULT);
        bridge.clear_color(1.0, 1.0, 1.0, 1.0);
        bridge.clear(gl::COLOR_BUFFER_BIT);

        assert_eq!(bridge.diagnostic_count(), 2);
        assert_eq!(
            bridge.surfaces().pixel("canvas", 0, 0).unwrap(),
            [0, 0, 0, 0]
        );
    }

    #[test]
    fn invalid_enums_set_the_error_flag_once() {
        let mut bridge = bridge_with_canvas(2, 2);
        let handle = bridge.create_context("canvas", ContextAttributes::DEFAULT);
        bridge.make_current(handle);

        bridge.enable(0x1234);
        bridge.clear(0x0001);
        assert_eq!(bridge.get_error(), gl::INVALID_ENUM);
        assert_eq!(bridge.get_error(), gl::NO_ERROR);
    }

    #[test]
    fn removed_surface_loses_context() {
        let mut bridge = bridge_with_canvas(2, 2);
        let handle = bridge.create_context("canvas", ContextAttributes::DEFAULT);
        assert_eq!(bridge.make_current(handle), 0);

        bridge.surfaces().remove("canvas");
        assert_eq!(bridge.make_current(handle), ResultCode::Failed.code());
        assert!(bridge.is_lost(handle));
        assert_eq!(bridge.current(), None);
    }

    #[test]
    fn lost_context_is_replaced_on_recreate() {
        let mut bridge = bridge_with_canvas(2, 2);
        let first = bridge.create_context("canvas", ContextAttributes::DEFAULT);
        bridge.surfaces().insert("canvas", 2, 2).unwrap();

        let second = bridge.create_context("canvas", ContextAttributes::DEFAULT);
        assert!(second > first);
        assert_eq!(bridge.context_count(), 1);
        assert_eq!(bridge.make_current(second), 0);
    }

    #[test]
    fn make_current_rejects_unknown_handles() {
        let mut bridge = bridge_with_canvas(2, 2);
        assert_eq!(bridge.make_current(7), ResultCode::InvalidParam.code());
        assert_eq!(bridge.make_current(-4), ResultCode::InvalidParam.code());
    }

    #[test]
    fn diagnostics_history_is_bounded() {
        let mut bridge = bridge_with_canvas(1, 1);
        for _ in 0..(DIAGNOSTIC_HISTORY + 10) {
            bridge.clear(gl::COLOR_BUFFER_BIT);
        }
        assert_eq!(bridge.diagnostics().count(), DIAGNOSTIC_HISTORY);
        assert_eq!(bridge.diagnostic_count(), (DIAGNOSTIC_HISTORY + 10) as u64);
    }

    #[test]
    fn depth_and_stencil_follow_attributes() {
        let mut bridge = bridge_with_canvas(2, 2);
        let attrs = ContextAttributes {
            depth: false,
            stencil: false,
            ..ContextAttributes::DEFAULT
        };
        let handle = bridge.create_context("canvas", attrs);
        bridge.make_current(handle);
        bridge.clear(gl::DEPTH_BUFFER_BIT | gl::STENCIL_BUFFER_BIT);
        assert_eq!(bridge.get_error(), gl::NO_ERROR);
        assert_eq!(bridge.context_attributes(handle), Some(attrs));
    }
}
