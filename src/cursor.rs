// src/cursor.rs

//! Color cursors built from surfaces.
//!
//! A cursor is a refcount-free native resource: its release policy frees it
//! unconditionally, relying on the engine's guarantee that the active cursor
//! is never actually freed by that call.

use crate::error::Result;
use crate::resource::{NativeHandle, RefCountedResource, ResourceKind};
use crate::surface::Surface;
use crate::sys::{self, NativeCursor};

/// A color cursor snapshotted from a surface at creation time.
#[derive(Debug)]
pub struct Cursor {
    resource: RefCountedResource,
}

impl Cursor {
    /// Creates a cursor from an ARGB snapshot of `surface`, with the hot
    /// spot at (`hot_x`, `hot_y`). The surface is only read during creation
    /// and may die afterwards.
    pub fn from_surface(surface: &Surface, hot_x: i32, hot_y: i32) -> Result<Self> {
        // SAFETY: the surface's resource keeps the native struct alive;
        // create_color_cursor hands over the only claim on the cursor.
        let ptr = unsafe { sys::cursor::create_color_cursor(surface.raw(), hot_x, hot_y) };
        let handle = NativeHandle::new(ptr.cast(), ResourceKind::Cursor);
        Ok(Self {
            resource: RefCountedResource::acquire(handle)?,
        })
    }

    /// Makes this cursor the active one. While active it will survive its
    /// wrapper: the engine refuses to free the active cursor.
    pub fn activate(&self) {
        // SAFETY: the resource keeps the cursor alive for the call.
        unsafe { sys::cursor::set_cursor(self.raw()) };
    }

    /// Clears the active-cursor slot.
    pub fn deactivate() {
        sys::cursor::clear_cursor();
    }

    /// Whether this cursor is the active one.
    pub fn is_active(&self) -> bool {
        std::ptr::eq(sys::cursor::active_cursor(), self.raw())
    }

    fn raw(&self) -> *mut NativeCursor {
        self.resource.as_ptr().cast()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixels::PixelEncoding;

    fn test_surface() -> Surface {
        Surface::new(4, 4, PixelEncoding::Argb8888).unwrap()
    }

    #[test]
    fn it_should_create_and_release_an_inactive_cursor() {
        let cursor = Cursor::from_surface(&test_surface(), 1, 1).unwrap();
        assert!(!cursor.is_active());
        // drop frees the native cursor through the unconditional policy
    }

    #[test]
    fn it_should_never_free_the_active_cursor() {
        let cursor = Cursor::from_surface(&test_surface(), 0, 0).unwrap();
        cursor.activate();
        assert!(cursor.is_active());

        let raw = cursor.raw();
        drop(cursor); // policy calls the native free, which refuses

        // the engine still points at intact cursor memory
        let active = sys::cursor::active_cursor();
        assert_eq!(active, raw);
        unsafe {
            assert_eq!((*active).w, 4);
            assert_eq!((*active).h, 4);
        }

        // release the slot and reclaim the memory for real
        Cursor::deactivate();
        unsafe { sys::cursor::free_cursor(active) };
    }
}
