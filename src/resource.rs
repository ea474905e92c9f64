// src/resource.rs

//! The ownership core: bridges the engine's manual refcount-and-free protocol
//! to Rust's deterministic drop.
//!
//! Several independent wrapper instances may alias the same native address;
//! each holds exactly one counted claim and drops it exactly once, whatever
//! order the wrappers die in. Whether dropping a claim may also deallocate is
//! the release policy's decision, per resource kind, never the wrapper's.

use std::mem::offset_of;

use libc::{c_int, c_void};
use log::trace;

use crate::error::{Error, Result};
use crate::sys::{self, NativeSurface, SurfaceFlags};

/// An opaque native address plus the tag selecting its release policy.
///
/// Pure data: holding a `NativeHandle` confers no claim on the resource.
#[derive(Debug, Clone, Copy)]
pub struct NativeHandle {
    addr: *mut c_void,
    kind: ResourceKind,
}

impl NativeHandle {
    /// Wraps an address as returned by a native call. The address may be
    /// null; [`RefCountedResource::acquire`] turns that into the error.
    ///
    /// Constructing a handle is safe; it is pure data. The lifetime
    /// contract only starts once a [`RefCountedResource`] acquires it.
    pub fn new(addr: *mut c_void, kind: ResourceKind) -> Self {
        Self { addr, kind }
    }

    pub fn addr(&self) -> *mut c_void {
        self.addr
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn is_null(&self) -> bool {
        self.addr.is_null()
    }
}

/// The release policy: how one counted claim on a native resource is dropped.
#[derive(Debug, Clone, Copy)]
pub enum ResourceKind {
    /// Surfaces embed a refcount-and-flags header. A surface flagged
    /// "don't free" belongs to another entity (the engine's free routine
    /// refuses it outright and leaves the refcount alone), so the claim is
    /// dropped by decrementing the count directly; otherwise the native free
    /// routine both decrements and deallocates at zero.
    Surface,
    /// Cursors are freed unconditionally; the engine itself guarantees the
    /// active cursor survives the call.
    Cursor,
    /// Any other resource kind: the claim is dropped by calling the kind's
    /// native free routine.
    ///
    /// # Safety
    /// The routine is called at most once per wrapper with the wrapped
    /// address; it must accept an address that other wrappers still alias.
    Other(unsafe fn(*mut c_void)),
}

impl ResourceKind {
    /// Drops one claim on `addr` according to the policy.
    ///
    /// # Safety
    /// `addr` must be a live resource of this kind with an outstanding
    /// counted claim, and must not be used through this wrapper afterwards.
    unsafe fn release(self, addr: *mut c_void) {
        match self {
            ResourceKind::Surface => {
                // the flag word sits at byte offset 0 of the native struct
                let flags = SurfaceFlags::from_bits_retain((addr as *const u32).read());
                if flags.contains(SurfaceFlags::DONT_FREE) {
                    let refcount =
                        (addr as *mut u8).add(offset_of!(NativeSurface, refcount)) as *mut c_int;
                    *refcount -= 1;
                    trace!(
                        "released borrowed surface {addr:p}: refcount decremented to {}",
                        *refcount
                    );
                } else {
                    sys::surface::free_surface(addr as *mut NativeSurface);
                }
            }
            ResourceKind::Cursor => sys::cursor::free_cursor(addr as *mut sys::NativeCursor),
            ResourceKind::Other(free) => free(addr),
        }
    }
}

/// One counted claim on a native resource, released exactly once.
///
/// Acquired when a native call returns a non-null handle; the claim is
/// dropped either explicitly through [`release`](Self::release) or at drop
/// time, whichever comes first; the second path is always a no-op.
#[derive(Debug)]
pub struct RefCountedResource {
    handle: NativeHandle,
    released: bool,
}

impl RefCountedResource {
    /// Takes ownership of one claim on `handle`.
    ///
    /// Fails with [`Error::Resource`] when the address is null, i.e. the
    /// native allocation or lookup already failed; the engine's last error
    /// message is carried along (and may be empty).
    pub fn acquire(handle: NativeHandle) -> Result<Self> {
        if handle.is_null() {
            return Err(Error::Resource(sys::error::last_error()));
        }
        trace!("acquired {:?} resource {:p}", handle.kind(), handle.addr());
        Ok(Self {
            handle,
            released: false,
        })
    }

    /// Drops this wrapper's claim. Idempotent: every call after the first is
    /// a no-op, so an explicit early release composes with the drop-time
    /// release.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        // SAFETY: the claim was acquired with this handle and has not been
        // dropped before (guarded by `released`).
        unsafe { self.handle.kind().release(self.handle.addr()) }
    }

    /// The raw address for passing to native calls.
    ///
    /// Fails with [`Error::UseAfterRelease`] once the claim has been dropped.
    pub fn address(&self) -> Result<*mut c_void> {
        if self.released {
            return Err(Error::UseAfterRelease);
        }
        Ok(self.handle.addr())
    }

    /// Unchecked address accessor for owners that structurally keep the
    /// resource alive (they never release early, so the check cannot fire).
    pub(crate) fn as_ptr(&self) -> *mut c_void {
        debug_assert!(!self.released, "native resource used after release");
        self.handle.addr()
    }

    /// Whether this wrapper's claim has already been dropped.
    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for RefCountedResource {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests;
