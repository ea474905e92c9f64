// src/resource/tests.rs

use std::sync::atomic::{AtomicUsize, Ordering};

use libc::c_void;
use test_log::test; // route log output from release paths into test captures

use super::{NativeHandle, RefCountedResource, ResourceKind};
use crate::error::Error;
use crate::pixels::PixelEncoding;
use crate::sys::{self, SurfaceFlags};

#[test]
fn it_should_refuse_to_acquire_a_null_handle() {
    sys::error::set_error("lookup failed upstream");
    let err = RefCountedResource::acquire(NativeHandle::new(
        std::ptr::null_mut(),
        ResourceKind::Surface,
    ))
    .unwrap_err();
    match err {
        Error::Resource(msg) => assert_eq!(msg, "lookup failed upstream"),
        other => panic!("unexpected error: {other:?}"),
    }
}

static RELEASE_ONCE_CALLS: AtomicUsize = AtomicUsize::new(0);

unsafe fn count_release_once(_: *mut c_void) {
    RELEASE_ONCE_CALLS.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn it_should_release_at_most_once_per_wrapper() {
    let mut resource = RefCountedResource::acquire(NativeHandle::new(
        0x1 as *mut c_void,
        ResourceKind::Other(count_release_once),
    ))
    .unwrap();

    resource.release();
    resource.release(); // second explicit call is a no-op
    assert!(resource.is_released());
    drop(resource); // the drop-time release is a no-op too

    assert_eq!(RELEASE_ONCE_CALLS.load(Ordering::SeqCst), 1);
}

static ALIASED_CALLS: AtomicUsize = AtomicUsize::new(0);

unsafe fn count_aliased(_: *mut c_void) {
    ALIASED_CALLS.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn it_should_release_every_aliasing_wrapper_exactly_once() {
    let addr = 0x2 as *mut c_void;
    let wrappers: Vec<_> = (0..3)
        .map(|_| {
            RefCountedResource::acquire(NativeHandle::new(addr, ResourceKind::Other(count_aliased)))
                .unwrap()
        })
        .collect();
    drop(wrappers);
    assert_eq!(ALIASED_CALLS.load(Ordering::SeqCst), 3);
}

#[test]
fn it_should_decrement_the_shared_count_in_any_drop_order() {
    unsafe {
        let surf = sys::surface::create_surface(2, 2, PixelEncoding::Argb8888);
        assert!(!surf.is_null());
        // a second wrapper instance takes its own counted claim
        sys::surface::retain_surface(surf);
        assert_eq!((*surf).refcount, 2);

        let a = RefCountedResource::acquire(NativeHandle::new(
            surf as *mut c_void,
            ResourceKind::Surface,
        ))
        .unwrap();
        let b = RefCountedResource::acquire(NativeHandle::new(
            surf as *mut c_void,
            ResourceKind::Surface,
        ))
        .unwrap();

        drop(b);
        assert_eq!((*surf).refcount, 1, "one claim dropped, one outstanding");
        drop(a); // the last claim deallocates the surface
    }
}

#[test]
fn it_should_only_decrement_when_the_surface_is_marked_borrowed() {
    unsafe {
        let surf = sys::surface::create_surface(2, 2, PixelEncoding::Rgb565);
        assert!(!surf.is_null());
        // another entity owns this surface and will free it later
        (*surf).flags |= SurfaceFlags::DONT_FREE.bits();
        sys::surface::retain_surface(surf);
        assert_eq!((*surf).refcount, 2);

        let wrapper = RefCountedResource::acquire(NativeHandle::new(
            surf as *mut c_void,
            ResourceKind::Surface,
        ))
        .unwrap();
        drop(wrapper);

        // the wrapper's claim is gone but the surface was not deallocated
        assert_eq!((*surf).refcount, 1);
        assert!(SurfaceFlags::from_bits_retain((*surf).flags).contains(SurfaceFlags::DONT_FREE));

        // hand the surface back to its owner for cleanup
        (*surf).flags &= !SurfaceFlags::DONT_FREE.bits();
        sys::surface::free_surface(surf);
    }
}

#[test]
fn it_should_flag_address_use_after_release() {
    unsafe fn noop(_: *mut c_void) {}

    let mut resource =
        RefCountedResource::acquire(NativeHandle::new(0x3 as *mut c_void, ResourceKind::Other(noop)))
            .unwrap();
    assert!(resource.address().is_ok());
    resource.release();
    assert!(matches!(resource.address(), Err(Error::UseAfterRelease)));
}
