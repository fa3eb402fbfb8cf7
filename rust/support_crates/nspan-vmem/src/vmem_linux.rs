//! Linux virtual-memory backend, built on `mmap`/`mprotect`/`munmap`.
//!
//! All allocations are anonymous private mappings. The kernel hands them out
//! zero-filled and the requested size is rounded up to the page boundary, so
//! every region produced here is page-aligned in both address and length —
//! the granularity at which protection changes operate.

use std::sync::OnceLock;

use crate::protection::Protection;

/// Maps a `Protection` set to the corresponding `PROT_*` union.
///
/// Every combination is representable on POSIX; the empty set maps to
/// `PROT_NONE`. Note that on some architectures the kernel grants read
/// access along with write or execute regardless of the requested set.
pub fn native_protection(protection: Protection) -> libc::c_int {
    let mut native = libc::PROT_NONE;
    if protection.contains(Protection::READ) {
        native |= libc::PROT_READ;
    }
    if protection.contains(Protection::WRITE) {
        native |= libc::PROT_WRITE;
    }
    if protection.contains(Protection::EXECUTE) {
        native |= libc::PROT_EXEC;
    }
    native
}

/// Reserves and commits `size` bytes of zero-filled, read-write memory using
/// standard pages.
///
/// The request is rounded up to the page boundary; a zero-byte request still
/// commits one page. Returns the mapping address together with the rounded
/// capacity, which is the value that must later be passed to [`free`].
pub fn allocate(size: usize) -> std::io::Result<(*mut std::ffi::c_void, usize)> {
    let page_size = get_page_size();
    assert!(page_size.is_power_of_two());
    let capacity = (size.max(1) + page_size - 1) & !(page_size - 1);
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            capacity,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if ptr.is_null() || ptr == libc::MAP_FAILED {
        return Err(std::io::Error::last_os_error());
    }
    Ok((ptr, capacity))
}

/// Reserves and commits `size` bytes of zero-filled, read-write memory using
/// large (huge) pages via `MAP_HUGETLB`.
///
/// Requires huge pages to be configured on the system, e.g. through
/// `/proc/sys/vm/nr_overcommit_hugepages`; see
/// <https://www.kernel.org/doc/Documentation/vm/hugetlbpage.txt>. The
/// returned capacity is rounded up to the large-page boundary and must be
/// passed to [`free_large_pages`] on release.
pub fn allocate_large_pages(size: usize) -> std::io::Result<(*mut std::ffi::c_void, usize)> {
    let page_size = get_large_page_size();
    assert!(page_size.is_power_of_two());
    let capacity = (size.max(1) + page_size - 1) & !(page_size - 1);
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            capacity,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_HUGETLB,
            -1,
            0,
        )
    };
    if ptr.is_null() || ptr == libc::MAP_FAILED {
        return Err(std::io::Error::last_os_error());
    }
    Ok((ptr, capacity))
}

/// Attempts to enable large-page support for the current process.
///
/// A no-op on Linux: huge-page availability is configured administratively
/// at the system level, not per process.
pub fn try_enable_large_pages() -> std::io::Result<()> {
    Ok(())
}

/// Changes the live protection of an existing mapping in place.
///
/// Never allocates, frees, moves or resizes the mapping. On failure the
/// mapping's protection is unchanged.
///
/// # Safety
///
/// `ptr` and `size` must denote (a subrange of) a mapping previously
/// returned by [`allocate`] or [`allocate_large_pages`] that has not been
/// freed. The caller is responsible for the consequences of revoking access
/// that other code may still rely on.
pub unsafe fn protect(
    ptr: *mut std::ffi::c_void,
    size: usize,
    protection: Protection,
) -> std::io::Result<()> {
    let res = unsafe { libc::mprotect(ptr, size, native_protection(protection)) };
    if res < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Returns a standard-page mapping to the system.
///
/// # Safety
///
/// `ptr` must come from [`allocate`], `size` must be the capacity that call
/// returned, and the mapping must not have been freed already.
pub unsafe fn free(ptr: *mut std::ffi::c_void, size: usize) -> std::io::Result<()> {
    let res = unsafe { libc::munmap(ptr, size) };
    if res < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Returns a large-page mapping to the system.
///
/// # Safety
///
/// Same contract as [`free`], for mappings obtained through
/// [`allocate_large_pages`].
pub unsafe fn free_large_pages(ptr: *mut std::ffi::c_void, size: usize) -> std::io::Result<()> {
    unsafe { free(ptr, size) }
}

/// Returns the system's standard page size in bytes, cached after the first
/// query. Falls back to 4 KiB if `sysconf` fails.
pub fn get_page_size() -> usize {
    static SIZE: OnceLock<usize> = OnceLock::new();
    *SIZE.get_or_init(|| read_page_size().unwrap_or(4 * 1024))
}

/// Returns the system's large (huge) page size in bytes, cached after the
/// first query. Falls back to 2 MiB if `/proc/meminfo` cannot be parsed.
pub fn get_large_page_size() -> usize {
    static SIZE: OnceLock<usize> = OnceLock::new();
    *SIZE.get_or_init(|| read_large_page_size().unwrap_or(2 * 1024 * 1024))
}

/// Reads the configured huge-page size from the `Hugepagesize:` line of
/// `/proc/meminfo` (reported in kilobytes).
fn read_large_page_size() -> std::io::Result<usize> {
    let meminfo = std::fs::read_to_string("/proc/meminfo")?;
    for line in meminfo.lines() {
        if line.starts_with("Hugepagesize:") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 2 {
                if let Ok(size_kb) = parts[1].parse::<usize>() {
                    return Ok(size_kb * 1024);
                }
            }
            break;
        }
    }
    Err(std::io::Error::other("Failed to read Hugepagesize"))
}

/// Queries the standard page size via `sysconf(_SC_PAGESIZE)`.
fn read_page_size() -> std::io::Result<usize> {
    let res = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if res < 0 {
        return Err(std::io::Error::last_os_error());
    }
    assert!(res < i32::MAX as _);
    Ok(res as usize)
}
