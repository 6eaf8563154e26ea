//! Graphics context attributes and the sentinel result codes shared by the
//! host bridge and artifacts.

/// Attribute bit: allocate a depth buffer.
pub const ATTR_DEPTH: i32 = 1 << 0;
/// Attribute bit: allocate a stencil buffer.
pub const ATTR_STENCIL: i32 = 1 << 1;
/// Attribute bit: request antialiasing.
pub const ATTR_ANTIALIAS: i32 = 1 << 2;
/// Attribute bit: the artifact presents frames itself.
pub const ATTR_EXPLICIT_SWAP_CONTROL: i32 = 1 << 3;

const KNOWN_FLAGS: i32 = ATTR_DEPTH | ATTR_STENCIL | ATTR_ANTIALIAS | ATTR_EXPLICIT_SWAP_CONTROL;

/// Attributes fixed when a context is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContextAttributes {
    pub depth: bool,
    pub stencil: bool,
    pub antialias: bool,
    pub major_version: i32,
    pub minor_version: i32,
    pub explicit_swap_control: bool,
}

impl ContextAttributes {
    /// Depth, stencil and antialiasing on; API 2.0; no explicit swap control.
    pub const DEFAULT: Self = Self {
        depth: true,
        stencil: true,
        antialias: true,
        major_version: 2,
        minor_version: 0,
        explicit_swap_control: false,
    };

    pub const fn flags(&self) -> i32 {
        let mut flags = 0;
        if self.depth {
            flags |= ATTR_DEPTH;
        }
        if self.stencil {
            flags |= ATTR_STENCIL;
        }
        if self.antialias {
            flags |= ATTR_ANTIALIAS;
        }
        if self.explicit_swap_control {
            flags |= ATTR_EXPLICIT_SWAP_CONTROL;
        }
        flags
    }

    /// Decode the `(flags, major, minor)` triple passed across the import.
    ///
    /// Returns `None` when unknown flag bits are set.
    pub const fn from_raw(flags: i32, major_version: i32, minor_version: i32) -> Option<Self> {
        if flags & !KNOWN_FLAGS != 0 {
            return None;
        }
        Some(Self {
            depth: flags & ATTR_DEPTH != 0,
            stencil: flags & ATTR_STENCIL != 0,
            antialias: flags & ATTR_ANTIALIAS != 0,
            major_version,
            minor_version,
            explicit_swap_control: flags & ATTR_EXPLICIT_SWAP_CONTROL != 0,
        })
    }
}

impl Default for ContextAttributes {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Sentinel results returned by context operations.
///
/// Non-negative values are success; creation returns a positive handle
/// instead of [`ResultCode::Success`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ResultCode {
    Success = 0,
    NotSupported = -1,
    FailedNotDeferred = -2,
    InvalidTarget = -3,
    UnknownTarget = -4,
    InvalidParam = -5,
    Failed = -6,
    NoData = -7,
}

impl ResultCode {
    pub const fn code(self) -> i32 {
        self as i32
    }

    pub const fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => ResultCode::Success,
            -1 => ResultCode::NotSupported,
            -2 => ResultCode::FailedNotDeferred,
            -3 => ResultCode::InvalidTarget,
            -4 => ResultCode::UnknownTarget,
            -5 => ResultCode::InvalidParam,
            -6 => ResultCode::Failed,
            -7 => ResultCode::NoData,
            _ => return None,
        })
    }

    pub const fn describe(self) -> &'static str {
        match self {
            ResultCode::Success => "success",
            ResultCode::NotSupported => "not supported",
            ResultCode::FailedNotDeferred => "failed (not deferred)",
            ResultCode::InvalidTarget => "invalid target",
            ResultCode::UnknownTarget => "unknown target",
            ResultCode::InvalidParam => "invalid parameter",
            ResultCode::Failed => "failed",
            ResultCode::NoData => "no data",
        }
    }
}
