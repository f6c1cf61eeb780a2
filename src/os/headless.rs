use super::PropertyBag;
use super::Size;

use std::cell::Cell;

/// A window with no backing surface. Pairs with the null gpu backend so swapchain
/// and presentation paths can run on hosts without a display.
pub struct Window {
    size: Cell<Size<u32>>,
    properties: PropertyBag,
}

impl Window {
    pub fn new(width: u32, height: u32) -> Self {
        Window {
            size: Cell::new(Size {
                x: width,
                y: height,
            }),
            properties: PropertyBag::new(),
        }
    }

    /// Change the reported client size, as a host would on a resize event
    pub fn set_size(&self, width: u32, height: u32) {
        self.size.set(Size {
            x: width,
            y: height,
        });
    }
}

impl super::Window for Window {
    fn native_handle(&self) -> isize {
        0
    }

    fn size(&self) -> Size<u32> {
        self.size.get()
    }

    fn properties(&self) -> &PropertyBag {
        &self.properties
    }
}
