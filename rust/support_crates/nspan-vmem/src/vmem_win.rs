//! Windows virtual-memory backend, built on `VirtualAlloc`/`VirtualProtect`/
//! `VirtualFree`.
//!
//! Allocations reserve and commit in one step and arrive zero-filled. Sizes
//! are rounded up to the page boundary, so every region produced here is
//! page-aligned in both address and length.

use std::sync::OnceLock;
use windows_sys::Win32::{
    Foundation::{CloseHandle, ERROR_SUCCESS, GetLastError, HANDLE, LUID},
    Security::{
        AdjustTokenPrivileges, LookupPrivilegeValueW, SE_LOCK_MEMORY_NAME, TOKEN_ADJUST_PRIVILEGES,
        TOKEN_PRIVILEGES, TOKEN_QUERY,
    },
    System::{
        Memory::{
            MEM_COMMIT, MEM_LARGE_PAGES, MEM_RELEASE, MEM_RESERVE, PAGE_EXECUTE,
            PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE, PAGE_NOACCESS, PAGE_READONLY,
            PAGE_READWRITE, GetLargePageMinimum, VirtualAlloc, VirtualFree, VirtualProtect,
        },
        SystemInformation::{GetSystemInfo, SYSTEM_INFO},
        Threading::{GetCurrentProcess, OpenProcessToken},
    },
};

use crate::protection::Protection;

/// Maps a `Protection` set to the corresponding `PAGE_*` constant.
///
/// The `PAGE_*` lattice cannot express write access without read access, so
/// a WRITE-only request maps up to the read-write constant (and WRITE with
/// EXECUTE to the execute-read-write constant). The mapping itself is total;
/// combinations the platform refuses in practice are rejected by the
/// allocation or protection call, not here.
pub fn native_protection(protection: Protection) -> u32 {
    match (
        protection.is_readable(),
        protection.is_writable(),
        protection.is_executable(),
    ) {
        (false, false, false) => PAGE_NOACCESS,
        (true, false, false) => PAGE_READONLY,
        (_, true, false) => PAGE_READWRITE,
        (false, false, true) => PAGE_EXECUTE,
        (true, false, true) => PAGE_EXECUTE_READ,
        (_, true, true) => PAGE_EXECUTE_READWRITE,
    }
}

/// Reserves and commits `size` bytes of zero-filled, read-write memory using
/// standard pages.
///
/// The request is rounded up to the page boundary; a zero-byte request still
/// commits one page. Returns the base address together with the rounded
/// capacity, which is the value that must later be passed to [`free`].
pub fn allocate(size: usize) -> std::io::Result<(*mut std::ffi::c_void, usize)> {
    let page_size = get_page_size();
    assert!(page_size.is_power_of_two());
    let capacity = (size.max(1) + page_size - 1) & !(page_size - 1);

    unsafe {
        let ptr = VirtualAlloc(
            std::ptr::null_mut(),
            capacity,
            MEM_COMMIT | MEM_RESERVE,
            PAGE_READWRITE,
        );
        if ptr.is_null() {
            let error = GetLastError();
            return Err(std::io::Error::from_raw_os_error(error as i32));
        }
        Ok((ptr, capacity))
    }
}

/// Reserves and commits `size` bytes of zero-filled, read-write memory using
/// large pages.
///
/// Requires the `SeLockMemoryPrivilege` to be held by the process; see
/// [`try_enable_large_pages`] and
/// <https://learn.microsoft.com/en-us/windows/win32/memory/large-page-support>.
/// The returned capacity is rounded up to the large-page boundary and must
/// be passed to [`free_large_pages`] on release.
pub fn allocate_large_pages(size: usize) -> std::io::Result<(*mut std::ffi::c_void, usize)> {
    let page_size = get_large_page_size();
    assert!(page_size.is_power_of_two());
    let capacity = (size.max(1) + page_size - 1) & !(page_size - 1);

    unsafe {
        let ptr = VirtualAlloc(
            std::ptr::null_mut(),
            capacity,
            MEM_COMMIT | MEM_RESERVE | MEM_LARGE_PAGES,
            PAGE_READWRITE,
        );
        if ptr.is_null() {
            let error = GetLastError();
            return Err(std::io::Error::from_raw_os_error(error as i32));
        }
        Ok((ptr, capacity))
    }
}

/// Attempts to enable large-page support for the current process by
/// acquiring the `SeLockMemoryPrivilege`.
///
/// Typically requires administrator rights; the privilege, once granted,
/// persists for the lifetime of the process.
pub fn try_enable_large_pages() -> std::io::Result<()> {
    adjust_lock_memory_privilege()
}

/// Changes the live protection of an existing committed range in place.
///
/// Never allocates, frees, moves or resizes the range. On failure the
/// range's protection is unchanged.
///
/// # Safety
///
/// `ptr` and `size` must denote (a subrange of) a committed allocation
/// previously returned by [`allocate`] or [`allocate_large_pages`] that has
/// not been freed. The caller is responsible for the consequences of
/// revoking access that other code may still rely on.
pub unsafe fn protect(
    ptr: *mut std::ffi::c_void,
    size: usize,
    protection: Protection,
) -> std::io::Result<()> {
    let mut old_protection: u32 = 0;
    unsafe {
        let result = VirtualProtect(ptr, size, native_protection(protection), &mut old_protection);
        if result == 0 {
            let error = GetLastError();
            return Err(std::io::Error::from_raw_os_error(error as i32));
        }
    }
    Ok(())
}

/// Returns a standard-page allocation to the system.
///
/// # Safety
///
/// `ptr` must come from [`allocate`], `size` must be the capacity that call
/// returned, and the allocation must not have been freed already.
pub unsafe fn free(ptr: *mut std::ffi::c_void, size: usize) -> std::io::Result<()> {
    assert!(size.is_multiple_of(get_page_size()));
    unsafe {
        let result = VirtualFree(ptr, 0, MEM_RELEASE);
        if result == 0 {
            let error = GetLastError();
            return Err(std::io::Error::from_raw_os_error(error as i32));
        }
    }
    Ok(())
}

/// Returns a large-page allocation to the system.
///
/// # Safety
///
/// Same contract as [`free`], for allocations obtained through
/// [`allocate_large_pages`].
pub unsafe fn free_large_pages(ptr: *mut std::ffi::c_void, size: usize) -> std::io::Result<()> {
    assert!(size.is_multiple_of(get_large_page_size()));
    unsafe {
        let result = VirtualFree(ptr, 0, MEM_RELEASE);
        if result == 0 {
            let error = GetLastError();
            return Err(std::io::Error::from_raw_os_error(error as i32));
        }
    }
    Ok(())
}

/// Returns the system's standard page size in bytes, cached after the first
/// query.
pub fn get_page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

    *PAGE_SIZE.get_or_init(|| unsafe {
        let mut system_info: SYSTEM_INFO = std::mem::zeroed();
        GetSystemInfo(&mut system_info);
        system_info.dwPageSize as usize
    })
}

/// Returns the system's large page size in bytes, cached after the first
/// query. Falls back to 2 MiB if the minimum cannot be determined.
pub fn get_large_page_size() -> usize {
    static LARGE_PAGE_SIZE: OnceLock<usize> = OnceLock::new();

    *LARGE_PAGE_SIZE.get_or_init(|| unsafe {
        let large_page_size = GetLargePageMinimum();
        if large_page_size > 0 {
            large_page_size
        } else {
            2 * 1024 * 1024
        }
    })
}

/// Enables the `SeLockMemoryPrivilege` on the current process token, which
/// is required for large-page allocation.
fn adjust_lock_memory_privilege() -> std::io::Result<()> {
    unsafe {
        let mut token_handle: HANDLE = std::ptr::null_mut();
        let current_process = GetCurrentProcess();

        let result = OpenProcessToken(
            current_process,
            TOKEN_ADJUST_PRIVILEGES | TOKEN_QUERY,
            &mut token_handle,
        );
        if result == 0 {
            let error = GetLastError();
            return Err(std::io::Error::from_raw_os_error(error as i32));
        }

        let mut luid = LUID {
            LowPart: 0,
            HighPart: 0,
        };
        let result = LookupPrivilegeValueW(std::ptr::null(), SE_LOCK_MEMORY_NAME, &mut luid);
        if result == 0 {
            CloseHandle(token_handle);
            let error = GetLastError();
            return Err(std::io::Error::from_raw_os_error(error as i32));
        }

        let token_privileges = TOKEN_PRIVILEGES {
            PrivilegeCount: 1,
            Privileges: [windows_sys::Win32::Security::LUID_AND_ATTRIBUTES {
                Luid: luid,
                Attributes: windows_sys::Win32::Security::SE_PRIVILEGE_ENABLED,
            }],
        };
        let result = AdjustTokenPrivileges(
            token_handle,
            0,
            &token_privileges,
            0,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
        );
        CloseHandle(token_handle);
        if result == 0 {
            let error = GetLastError();
            return Err(std::io::Error::from_raw_os_error(error as i32));
        }

        // AdjustTokenPrivileges can report success without actually enabling
        // the privilege; GetLastError is authoritative.
        let last_error = GetLastError();
        if last_error != ERROR_SUCCESS {
            return Err(std::io::Error::from_raw_os_error(last_error as i32));
        }

        Ok(())
    }
}
