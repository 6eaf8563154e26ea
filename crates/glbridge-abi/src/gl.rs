//! GL enum values accepted by the host's `gl` import module.

pub const DEPTH_BUFFER_BIT: i32 = 0x0100;
pub const STENCIL_BUFFER_BIT: i32 = 0x0400;
pub const COLOR_BUFFER_BIT: i32 = 0x4000;

pub const SCISSOR_TEST: i32 = 0x0C11;

pub const NO_ERROR: i32 = 0;
pub const INVALID_ENUM: i32 = 0x0500;
pub const INVALID_VALUE: i32 = 0x0501;
pub const INVALID_OPERATION: i32 = 0x0502;

/// Import function names in the `gl` module.
pub mod imports {
    pub const CREATE_CONTEXT: &str = "create_context";
    pub const MAKE_CURRENT: &str = "make_current";
    pub const CLEAR_COLOR: &str = "clear_color";
    pub const CLEAR_DEPTH: &str = "clear_depth";
    pub const CLEAR_STENCIL: &str = "clear_stencil";
    pub const CLEAR: &str = "clear";
    pub const SCISSOR: &str = "scissor";
    pub const ENABLE: &str = "enable";
    pub const DISABLE: &str = "disable";
    pub const GET_ERROR: &str = "get_error";
    pub const READ_PIXELS: &str = "read_pixels";
}
