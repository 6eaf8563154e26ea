//! Host-owned drawable surfaces.
//!
//! The host decides which surfaces exist and how large they are. Artifacts
//! only ever name a surface by its identifier when creating a context; the
//! identifier is not checked until then.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Bytes per RGBA8 pixel.
pub const BYTES_PER_PIXEL: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("Surface not found: {0}")]
    NotFound(String),

    #[error("Surface '{id}' must have a non-zero size, got {width}x{height}")]
    InvalidSize { id: String, width: u32, height: u32 },

    #[error("Region {x},{y} {width}x{height} is outside surface '{id}'")]
    OutOfBounds {
        id: String,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
}

/// Axis-aligned pixel rectangle, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Clip against a `width` x `height` area. Returns `None` when nothing remains.
    pub fn clip(&self, width: u32, height: u32) -> Option<Rect> {
        let x1 = self.x.saturating_add(self.width).min(width);
        let y1 = self.y.saturating_add(self.height).min(height);
        if self.x >= x1 || self.y >= y1 {
            return None;
        }
        Some(Rect::new(self.x, self.y, x1 - self.x, y1 - self.y))
    }
}

/// RGBA8 colour buffer of one surface, stored row-major from the top row.
#[derive(Debug, Clone)]
pub struct Surface {
    width: u32,
    height: u32,
    generation: u64,
    pixels: Vec<u8>,
}

impl Surface {
    fn new(width: u32, height: u32, generation: u64) -> Self {
        Self {
            width,
            height,
            generation,
            pixels: vec![0; width as usize * height as usize * BYTES_PER_PIXEL],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Incremented every time a surface is (re)inserted under an id.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn fill(&mut self, rect: Rect, rgba: [u8; 4]) {
        let Some(rect) = rect.clip(self.width, self.height) else {
            return;
        };
        for row in rect.y..rect.y + rect.height {
            let start = (row as usize * self.width as usize + rect.x as usize) * BYTES_PER_PIXEL;
            let end = start + rect.width as usize * BYTES_PER_PIXEL;
            for px in self.pixels[start..end].chunks_exact_mut(BYTES_PER_PIXEL) {
                px.copy_from_slice(&rgba);
            }
        }
    }

    pub fn read(&self, rect: Rect) -> Option<Vec<u8>> {
        if rect.clip(self.width, self.height) != Some(rect) {
            return None;
        }
        let mut out = Vec::with_capacity(rect.width as usize * rect.height as usize * BYTES_PER_PIXEL);
        for row in rect.y..rect.y + rect.height {
            let start = (row as usize * self.width as usize + rect.x as usize) * BYTES_PER_PIXEL;
            let end = start + rect.width as usize * BYTES_PER_PIXEL;
            out.extend_from_slice(&self.pixels[start..end]);
        }
        Some(out)
    }
}

#[derive(Debug, Default)]
struct SurfaceTable {
    surfaces: HashMap<String, Surface>,
    next_generation: u64,
}

/// Shared handle to the host's surfaces.
///
/// Cloning is cheap; every clone sees the same table. Module instances hold
/// a clone so their graphics bridge can draw into host surfaces, while the
/// host keeps its own clone to add, remove and read them.
#[derive(Debug, Clone, Default)]
pub struct SurfaceHost {
    inner: Arc<Mutex<SurfaceTable>>,
}

impl SurfaceHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, SurfaceTable> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create (or replace) a surface. Replacing invalidates contexts bound
    /// to the previous surface under the same id.
    pub fn insert(&self, id: impl Into<String>, width: u32, height: u32) -> Result<(), SurfaceError> {
        let id = id.into();
        if width == 0 || height == 0 {
            return Err(SurfaceError::InvalidSize { id, width, height });
        }
        let mut table = self.table();
        table.next_generation += 1;
        let generation = table.next_generation;
        tracing::debug!(surface = %id, width, height, generation, "surface inserted");
        table.surfaces.insert(id, Surface::new(width, height, generation));
        Ok(())
    }

    /// Destroy a surface. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.table().surfaces.remove(id).is_some();
        if removed {
            tracing::debug!(surface = %id, "surface removed");
        }
        removed
    }

    pub fn contains(&self, id: &str) -> bool {
        self.table().surfaces.contains_key(id)
    }

    pub fn size(&self, id: &str) -> Option<(u32, u32)> {
        self.table().surfaces.get(id).map(|s| (s.width, s.height))
    }

    pub fn generation(&self, id: &str) -> Option<u64> {
        self.table().surfaces.get(id).map(|s| s.generation)
    }

    /// Copy a region of RGBA8 pixels out of a surface.
    pub fn read_pixels(
        &self,
        id: &str,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, SurfaceError> {
        let table = self.table();
        let surface = table
            .surfaces
            .get(id)
            .ok_or_else(|| SurfaceError::NotFound(id.to_string()))?;
        surface
            .read(Rect::new(x, y, width, height))
            .ok_or_else(|| SurfaceError::OutOfBounds {
                id: id.to_string(),
                x,
                y,
                width,
                height,
            })
    }

    /// Read a single pixel as `[r, g, b, a]`.
    pub fn pixel(&self, id: &str, x: u32, y: u32) -> Result<[u8; 4], SurfaceError> {
        let bytes = self.read_pixels(id, x, y, 1, 1)?;
        Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    /// Run `f` against a surface, but only if it is still the same surface
    /// (same generation) that the caller bound to.
    pub(crate) fn with_surface<R>(
        &self,
        id: &str,
        generation: u64,
        f: impl FnOnce(&mut Surface) -> R,
    ) -> Option<R> {
        let mut table = self.table();
        table
            .surfaces
            .get_mut(id)
            .filter(|s| s.generation == generation)
            .map(f)
    }
}
