// src/surface/lock.rs

//! The scoped lock bracketing raw pixel-memory access.
//!
//! RLE-accelerated surfaces keep a decode cache that is only coherent while
//! the native lock is held; the guard below makes the unlock run on every
//! exit path (normal return, early `?`, or panic) so no error can leave a
//! surface perpetually locked.

use log::trace;

use super::Surface;
use crate::error::{Error, Result};
use crate::sys;

/// Holds the native lock on a surface; unlocks on drop.
struct LockGuard<'a> {
    surface: &'a Surface,
}

impl<'a> LockGuard<'a> {
    fn acquire(surface: &'a Surface) -> Result<Self> {
        // SAFETY: the surface's resource keeps the native struct alive.
        let rc = unsafe { sys::surface::lock_surface(surface.raw()) };
        if rc < 0 {
            return Err(Error::native());
        }
        trace!("locked surface {:p}", surface.raw());
        Ok(Self { surface })
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: the guard's lifetime keeps the surface borrowed and alive.
        unsafe { sys::surface::unlock_surface(self.surface.raw()) };
        trace!("unlocked surface {:p}", self.surface.raw());
    }
}

impl Surface {
    /// Runs `body` with the native lock held, releasing it on every exit
    /// path, including an `Err` return from the body.
    ///
    /// Nesting `with_lock` on the same surface within `body` is not
    /// supported: the engine tracks only a lock counter and the behavior of
    /// re-entrant locking is undefined. Callers must not nest.
    pub fn with_lock<T>(&self, body: impl FnOnce(&Surface) -> Result<T>) -> Result<T> {
        let _guard = LockGuard::acquire(self)?;
        body(self)
    }
}
