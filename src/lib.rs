/// Host window interface consumed by the swapchain layer (handle, size, property bag).
pub mod os;

/// Portable GPU abstraction (devices, command buffers, passes, resources).
pub mod gfx;

/// 2D renderer built on top of the portable GPU API.
pub mod draw2d;

/// Use bitflags for usage masks and format sets
#[macro_use]
extern crate bitflags;

/// Generic errors for modules to define their own
pub struct Error {
    pub msg: String,
}

impl Error {
    pub fn new(msg: impl Into<String>) -> Self {
        Error { msg: msg.into() }
    }
}

/// Generic debug for errors
impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.msg)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.msg)
    }
}

/// Conversion for windows-rs win32 errors
#[cfg(target_os = "windows")]
impl From<windows::core::Error> for Error {
    fn from(err: windows::core::Error) -> Error {
        Error {
            msg: err.message().to_string_lossy(),
        }
    }
}

/// std errors
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error {
            msg: err.to_string(),
        }
    }
}

/// This is a hardcoded compile time selection of gpu backend for windows as d3d12
#[cfg(target_os = "windows")]
pub use gfx::d3d12 as gfx_platform;

/// Fallback gpu backend selection for non-windows hosts
#[cfg(not(target_os = "windows"))]
pub use gfx::null as gfx_platform;
