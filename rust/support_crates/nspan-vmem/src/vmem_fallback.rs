//! Emulated virtual-memory backend for targets without a dedicated
//! implementation.
//!
//! Allocation is backed by `alloc_zeroed` with page-sized alignment, so the
//! sizing and zero-fill contract of the real backends is preserved.
//! Hardware protection cannot be emulated: [`protect`] records success
//! without enforcing anything, and callers on such targets get bookkeeping
//! semantics only.

use std::alloc::{Layout, alloc_zeroed, dealloc};

use crate::protection::Protection;

/// Maps a `Protection` set to a pseudo-native constant (its raw bits).
pub fn native_protection(protection: Protection) -> u32 {
    protection.bits() as u32
}

/// Allocates `size` bytes of zero-filled memory, rounded up to the emulated
/// page size (4 KiB); a zero-byte request still yields one page.
pub fn allocate(size: usize) -> std::io::Result<(*mut std::ffi::c_void, usize)> {
    let page_size = get_page_size();
    assert!(page_size.is_power_of_two());
    let capacity = (size.max(1) + page_size - 1) & !(page_size - 1);

    let layout = Layout::from_size_align(capacity, page_size)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "Invalid layout"))?;

    let ptr = unsafe { alloc_zeroed(layout) };
    if ptr.is_null() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::OutOfMemory,
            "Failed to allocate memory",
        ));
    }
    Ok((ptr as *mut std::ffi::c_void, capacity))
}

/// Allocates `size` bytes of zero-filled memory, rounded up to the emulated
/// large-page size (2 MiB).
pub fn allocate_large_pages(size: usize) -> std::io::Result<(*mut std::ffi::c_void, usize)> {
    let page_size = get_large_page_size();
    assert!(page_size.is_power_of_two());
    let capacity = (size.max(1) + page_size - 1) & !(page_size - 1);

    let layout = Layout::from_size_align(capacity, page_size)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "Invalid layout"))?;

    let ptr = unsafe { alloc_zeroed(layout) };
    if ptr.is_null() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::OutOfMemory,
            "Failed to allocate memory",
        ));
    }
    Ok((ptr as *mut std::ffi::c_void, capacity))
}

pub fn try_enable_large_pages() -> std::io::Result<()> {
    Ok(())
}

/// Records a protection change without enforcing it (emulated).
///
/// # Safety
///
/// `ptr` and `size` must denote an allocation previously returned by
/// [`allocate`] or [`allocate_large_pages`] that has not been freed.
pub unsafe fn protect(
    ptr: *mut std::ffi::c_void,
    size: usize,
    protection: Protection,
) -> std::io::Result<()> {
    let _ = (ptr, size, protection);
    Ok(())
}

/// Frees an emulated standard-page allocation.
///
/// # Safety
///
/// `ptr` must come from [`allocate`], `size` must be the capacity that call
/// returned, and the allocation must not have been freed already.
pub unsafe fn free(ptr: *mut std::ffi::c_void, size: usize) -> std::io::Result<()> {
    let page_size = get_page_size();
    assert!(size.is_multiple_of(page_size));

    let layout = Layout::from_size_align(size, page_size)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "Invalid layout"))?;

    unsafe {
        dealloc(ptr as *mut u8, layout);
    }
    Ok(())
}

/// Frees an emulated large-page allocation.
///
/// # Safety
///
/// Same contract as [`free`], for allocations obtained through
/// [`allocate_large_pages`].
pub unsafe fn free_large_pages(ptr: *mut std::ffi::c_void, size: usize) -> std::io::Result<()> {
    let page_size = get_large_page_size();
    assert!(size.is_multiple_of(page_size));

    let layout = Layout::from_size_align(size, page_size)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "Invalid layout"))?;

    unsafe {
        dealloc(ptr as *mut u8, layout);
    }
    Ok(())
}

/// Returns the emulated standard page size in bytes.
pub fn get_page_size() -> usize {
    4 * 1024
}

/// Returns the emulated large page size in bytes.
pub fn get_large_page_size() -> usize {
    2 * 1024 * 1024
}
