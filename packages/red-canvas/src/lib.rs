//! An artifact that clears whatever surface it is handed to opaque red.
//!
//! Build with `cargo build --target wasm32-unknown-unknown --release` and
//! load the resulting `red_canvas.wasm` with `glbridge run`.

use glbridge_abi::context::{ContextAttributes, ResultCode};
use glbridge_abi::gl;
use std::alloc::{self, Layout};

#[link(wasm_import_module = "gl")]
extern "C" {
    fn create_context(id_ptr: *const u8, id_len: usize, flags: i32, major: i32, minor: i32) -> i32;
    fn make_current(handle: i32) -> i32;
    fn clear_color(r: f32, g: f32, b: f32, a: f32);
    fn clear(mask: i32);
}

#[link(wasm_import_module = "env")]
extern "C" {
    fn log(ptr: *const u8, len: usize);
}

fn log_str(msg: &str) {
    unsafe { log(msg.as_ptr(), msg.len()) }
}

/// The context for `surface_id`. The host hands back the existing handle
/// while that surface's context is alive.
fn context_for(surface_id: &str) -> Option<i32> {
    let attributes = ContextAttributes::DEFAULT;
    let handle = unsafe {
        create_context(
            surface_id.as_ptr(),
            surface_id.len(),
            attributes.flags(),
            attributes.major_version,
            attributes.minor_version,
        )
    };
    if handle <= 0 {
        let reason = ResultCode::from_code(handle).map_or("unknown error", |c| c.describe());
        log_str(&format!("create_context({surface_id}) failed: {reason}"));
        return None;
    }
    Some(handle)
}

#[no_mangle]
pub extern "C" fn add(a: i32, b: i32) -> i32 {
    glbridge_abi::compute::add(a, b)
}

/// # Safety
///
/// `ptr` must point to `len` bytes handed over by the host.
#[no_mangle]
pub unsafe extern "C" fn render(ptr: *const u8, len: usize) {
    let bytes = if len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(ptr, len)
    };
    let Ok(surface_id) = std::str::from_utf8(bytes) else {
        log_str("render: surface id is not UTF-8");
        return;
    };
    let Some(handle) = context_for(surface_id) else {
        return;
    };
    if make_current(handle) != ResultCode::Success.code() {
        return;
    }
    clear_color(1.0, 0.0, 0.0, 1.0);
    clear(gl::COLOR_BUFFER_BIT);
}

#[no_mangle]
pub extern "C" fn alloc(len: usize) -> *mut u8 {
    match Layout::array::<u8>(len) {
        Ok(layout) if len > 0 => unsafe { alloc::alloc(layout) },
        _ => std::ptr::null_mut(),
    }
}

/// # Safety
///
/// `ptr` and `len` must come from a previous call to [`alloc`].
#[no_mangle]
pub unsafe extern "C" fn dealloc(ptr: *mut u8, len: usize) {
    if let (false, Ok(layout)) = (ptr.is_null(), Layout::array::<u8>(len)) {
        if len > 0 {
            alloc::dealloc(ptr, layout);
        }
    }
}
