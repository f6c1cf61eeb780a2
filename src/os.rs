/// In-process window implementation for tests and headless hosts
pub mod headless;

use serde::{Deserialize, Serialize};

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Describes a rectangle starting at the top left corner specified by x,y with the size of width and height
#[derive(Copy, Clone, Serialize, Deserialize, PartialEq, Debug)]
pub struct Rect<T> {
    /// Top left position x
    pub x: T,
    /// Top left position y
    pub y: T,
    /// Width of the rect starting at x
    pub width: T,
    /// Height of the rect starting at y
    pub height: T,
}

/// 2-Dimension point for screen coordinates
#[derive(Copy, Clone, Debug, Default)]
pub struct Point<T> {
    /// x position
    pub x: T,
    /// y position
    pub y: T,
}

/// 2-Dimension size for window coordinates
pub type Size<T> = Point<T>;

/// A string keyed bag of shared values hung off a window. The gpu layer stashes its
/// per-window swapchain record here so a window can be claimed and unclaimed without
/// the host having to know about gpu internals.
#[derive(Default)]
pub struct PropertyBag {
    entries: RefCell<HashMap<String, Rc<dyn Any>>>,
}

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or replace the value for `key`
    pub fn set(&self, key: &str, value: Rc<dyn Any>) {
        self.entries.borrow_mut().insert(key.to_string(), value);
    }

    /// Fetch the value for `key`, downcast to the requested type
    pub fn get<T: 'static>(&self, key: &str) -> Option<Rc<T>> {
        self.entries
            .borrow()
            .get(key)
            .cloned()
            .and_then(|v| v.downcast::<T>().ok())
    }

    /// Remove the entry for `key` if present
    pub fn clear(&self, key: &str) {
        self.entries.borrow_mut().remove(key);
    }

    /// Returns true if an entry exists for `key`
    pub fn contains(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key)
    }
}

/// The surface the gpu layer needs from a host window; the host video subsystem
/// (window creation, event loop, input) lives outside this crate.
pub trait Window {
    /// Returns the native platform handle (ie. HWND) as an isize
    fn native_handle(&self) -> isize;
    /// Returns the client area size in pixels
    fn size(&self) -> Size<u32>;
    /// Returns the property bag associated with this window
    fn properties(&self) -> &PropertyBag;
}
