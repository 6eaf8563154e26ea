//! Test artifacts shared by the integration tests.

#![allow(dead_code)]

use glbridge::{BridgeConfig, Loader, MemoryFetcher, SurfaceHost};

/// A complete artifact: `add`, and a `render` that asks for the context of
/// the surface it is handed (the host returns the existing one while it is
/// alive), clears it to opaque red and logs "dealloc" every time the host
/// releases a string buffer.
pub const RED_CANVAS: &str = r#"
(module
    (import "gl" "create_context" (func $create_context (param i32 i32 i32 i32 i32) (result i32)))
    (import "gl" "make_current" (func $make_current (param i32) (result i32)))
    (import "gl" "clear_color" (func $clear_color (param f32 f32 f32 f32)))
    (import "gl" "clear" (func $clear (param i32)))
    (import "env" "log" (func $log (param i32 i32)))

    (memory (export "memory") 1)
    (data (i32.const 16) "dealloc")

    (global $heap (mut i32) (i32.const 1024))
    (global $live (mut i32) (i32.const 0))

    (func (export "alloc") (param $len i32) (result i32)
        (local $ptr i32)
        (local.set $ptr (global.get $heap))
        (global.set $heap (i32.add (global.get $heap) (local.get $len)))
        (global.set $live (i32.add (global.get $live) (i32.const 1)))
        (local.get $ptr)
    )

    (func (export "dealloc") (param $ptr i32) (param $len i32)
        (global.set $live (i32.sub (global.get $live) (i32.const 1)))
        (if (i32.eqz (global.get $live))
            (then (global.set $heap (i32.const 1024))))
        (call $log (i32.const 16) (i32.const 7))
    )

    (func (export "add") (param i32 i32) (result i32)
        (i32.add (local.get 0) (local.get 1))
    )

    (func (export "render") (param $ptr i32) (param $len i32)
        (local $ctx i32)
        (local.set $ctx
            (call $create_context
                (local.get $ptr) (local.get $len)
                (i32.const 7) (i32.const 2) (i32.const 0)))
        (if (i32.le_s (local.get $ctx) (i32.const 0))
            (then (return)))
        (if (i32.ne (call $make_current (local.get $ctx)) (i32.const 0))
            (then (return)))
        (call $clear_color (f32.const 1) (f32.const 0) (f32.const 0) (f32.const 1))
        (call $clear (i32.const 0x4000))
    )
)
"#;

/// Draws through the scissor and error imports, then reads the result back
/// into its own memory with `gl.read_pixels` and logs what it saw:
/// "readback ok" when pixel (0, 0) is opaque green, the bogus `enable`
/// raised `INVALID_ENUM` and the read succeeded; "readback failed" otherwise.
/// A read into memory the artifact does not have is logged as "oob rejected".
pub const READBACK: &str = r#"
(module
    (import "gl" "create_context" (func $create_context (param i32 i32 i32 i32 i32) (result i32)))
    (import "gl" "make_current" (func $make_current (param i32) (result i32)))
    (import "gl" "clear_color" (func $clear_color (param f32 f32 f32 f32)))
    (import "gl" "clear" (func $clear (param i32)))
    (import "gl" "scissor" (func $scissor (param i32 i32 i32 i32)))
    (import "gl" "enable" (func $enable (param i32)))
    (import "gl" "get_error" (func $get_error (result i32)))
    (import "gl" "read_pixels" (func $read_pixels (param i32 i32 i32 i32 i32) (result i32)))
    (import "env" "log" (func $log (param i32 i32)))

    (memory (export "memory") 1)
    (data (i32.const 16) "readback ok")
    (data (i32.const 32) "readback failed")
    (data (i32.const 48) "oob rejected")

    (func (export "alloc") (param i32) (result i32) (i32.const 1024))
    (func (export "dealloc") (param i32 i32))
    (func (export "add") (param i32 i32) (result i32)
        (i32.add (local.get 0) (local.get 1))
    )

    (func (export "render") (param $ptr i32) (param $len i32)
        (local $ctx i32)
        (local $error i32)
        (local $read i32)
        (local.set $ctx
            (call $create_context
                (local.get $ptr) (local.get $len)
                (i32.const 7) (i32.const 2) (i32.const 0)))
        (if (i32.le_s (local.get $ctx) (i32.const 0))
            (then (return)))
        (drop (call $make_current (local.get $ctx)))

        (call $enable (i32.const 0x0C11))
        (call $scissor (i32.const 0) (i32.const 0) (i32.const 1) (i32.const 1))
        (call $clear_color (f32.const 0) (f32.const 1) (f32.const 0) (f32.const 1))
        (call $clear (i32.const 0x4000))
        (call $enable (i32.const 0x1234))
        (local.set $error (call $get_error))

        (local.set $read
            (call $read_pixels (i32.const 0) (i32.const 0) (i32.const 1) (i32.const 1) (i32.const 512)))
        (if (i32.and
                (i32.and
                    (i32.eqz (local.get $read))
                    (i32.eq (local.get $error) (i32.const 0x0500)))
                (i32.eq (i32.load (i32.const 512)) (i32.const 0xFF00FF00)))
            (then (call $log (i32.const 16) (i32.const 11)))
            (else (call $log (i32.const 32) (i32.const 15))))

        (if (i32.eq
                (call $read_pixels (i32.const 0) (i32.const 0) (i32.const 1) (i32.const 1) (i32.const 0x10000))
                (i32.const -5))
            (then (call $log (i32.const 48) (i32.const 12))))
    )
)
"#;

/// Exports `add` but never spends time in it: it spins forever.
pub const SPINNING_ADD: &str = r#"
(module
    (memory (export "memory") 1)
    (func (export "alloc") (param i32) (result i32) (i32.const 1024))
    (func (export "dealloc") (param i32 i32))
    (func (export "add") (param i32 i32) (result i32)
        (loop $forever (br $forever))
        (unreachable)
    )
    (func (export "render") (param i32 i32))
)
"#;

/// Missing the `render` export.
pub const ADD_ONLY: &str = r#"
(module
    (memory (export "memory") 1)
    (func (export "alloc") (param i32) (result i32) (i32.const 1024))
    (func (export "dealloc") (param i32 i32))
    (func (export "add") (param i32 i32) (result i32)
        (i32.add (local.get 0) (local.get 1))
    )
)
"#;

/// `add` with the wrong result type.
pub const WRONG_ADD: &str = r#"
(module
    (memory (export "memory") 1)
    (func (export "alloc") (param i32) (result i32) (i32.const 1024))
    (func (export "dealloc") (param i32 i32))
    (func (export "add") (param i64 i64) (result i64)
        (i64.add (local.get 0) (local.get 1))
    )
    (func (export "render") (param i32 i32))
)
"#;

/// A surface host with a single `canvas` surface.
pub fn canvas(width: u32, height: u32) -> SurfaceHost {
    let surfaces = SurfaceHost::new();
    surfaces
        .insert("canvas", width, height)
        .expect("failed to create canvas");
    surfaces
}

/// A loader serving the given WAT artifacts as `mem:<name>`.
pub fn loader(surfaces: SurfaceHost, artifacts: &[(&str, &str)]) -> Loader {
    loader_with(BridgeConfig::default(), surfaces, artifacts)
}

pub fn loader_with(
    config: BridgeConfig,
    surfaces: SurfaceHost,
    artifacts: &[(&str, &str)],
) -> Loader {
    let mut fetcher = MemoryFetcher::new();
    for (name, wat) in artifacts {
        let bytes = wat::parse_str(wat).expect("failed to parse WAT");
        fetcher.insert(*name, bytes);
    }
    Loader::with_fetcher(config, surfaces, fetcher).expect("failed to create loader")
}
