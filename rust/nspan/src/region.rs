//! The owning handle over a single native memory reservation.

use nspan_vmem::{Protection, vmem};

use crate::error::{Error, Result};

/// An exclusively owned, page-aligned native memory reservation with a
/// recorded hardware protection.
///
/// A `Region` is never shared between two live owners: transferring it
/// between allocators moves the value itself. Release is idempotent and also
/// runs on drop.
pub struct Region {
    /// Base address of the reservation; null once released.
    ptr: *mut u8,
    /// The requested size in bytes.
    len: usize,
    /// The committed capacity, rounded up to the page boundary.
    capacity: usize,
    /// The protection currently applied to the pages.
    protection: Protection,
    /// Whether the reservation is backed by large (huge) pages.
    uses_large_pages: bool,
    /// Page size used during allocation; base and capacity are multiples
    /// of it.
    alignment: usize,
}

impl Region {
    /// Reserves and commits `size` bytes at page granularity under
    /// `protection`.
    ///
    /// The pages are committed read-write and zero-filled first; the
    /// requested protection is applied as a final narrowing step, so a
    /// region narrower than read-write never exposes uninitialized bytes.
    /// If the narrowing is refused, the pages are freed and the acquisition
    /// fails as a whole.
    pub fn acquire(size: usize, protection: Protection) -> Result<Region> {
        let (ptr, capacity) =
            vmem::allocate(size).map_err(|e| Error::allocation("reserve_commit", e))?;
        assert!((ptr as usize).is_multiple_of(vmem::get_page_size()));
        Self::finish_acquire(ptr, size, capacity, protection, false, vmem::get_page_size())
    }

    /// Reserves and commits `size` bytes backed by large (huge) pages.
    ///
    /// Requires large pages to be available on the system; see
    /// [`Region::acquire_with_fallback`] for the tolerant variant.
    pub fn acquire_large(size: usize, protection: Protection) -> Result<Region> {
        vmem::try_enable_large_pages()
            .map_err(|e| Error::allocation("enable_large_pages", e))?;
        let (ptr, capacity) = vmem::allocate_large_pages(size)
            .map_err(|e| Error::allocation("reserve_commit_large", e))?;
        assert!((ptr as usize).is_multiple_of(vmem::get_large_page_size()));
        Self::finish_acquire(
            ptr,
            size,
            capacity,
            protection,
            true,
            vmem::get_large_page_size(),
        )
    }

    /// Acquires with large pages when available, falling back to standard
    /// pages otherwise.
    pub fn acquire_with_fallback(size: usize, protection: Protection) -> Result<Region> {
        if let Ok(region) = Self::acquire_large(size, protection) {
            return Ok(region);
        }
        Self::acquire(size, protection)
    }

    fn finish_acquire(
        ptr: *mut std::ffi::c_void,
        len: usize,
        capacity: usize,
        protection: Protection,
        uses_large_pages: bool,
        alignment: usize,
    ) -> Result<Region> {
        let mut region = Region {
            ptr: ptr as _,
            len,
            capacity,
            protection: Protection::READ_WRITE,
            uses_large_pages,
            alignment,
        };
        if protection != Protection::READ_WRITE {
            if let Err(e) = region.apply_protection(protection) {
                // `region` frees the pages on drop; no handle escapes.
                return Err(Error::protection(protection, e));
            }
        }
        log::debug!(
            "acquired region: base={:p} capacity={} protection={}",
            region.ptr,
            region.capacity,
            region.protection
        );
        Ok(region)
    }

    /// Changes the live protection of the reservation in place.
    ///
    /// Never allocates, frees or moves the pages. The recorded protection is
    /// updated only when the platform accepts the change; on failure it is
    /// left untouched and the `io::Error` is returned.
    pub fn apply_protection(&mut self, new_protection: Protection) -> std::io::Result<()> {
        unsafe { vmem::protect(self.ptr as _, self.capacity, new_protection) }?;
        log::trace!(
            "reprotected region {:p}: {} -> {}",
            self.ptr,
            self.protection,
            new_protection
        );
        self.protection = new_protection;
        Ok(())
    }

    /// Non-throwing protection change: `true` on success, `false` on
    /// platform rejection, with the recorded protection left unchanged on
    /// rejection.
    pub fn reprotect(&mut self, new_protection: Protection) -> bool {
        match self.apply_protection(new_protection) {
            Ok(()) => true,
            Err(e) => {
                log::debug!(
                    "reprotect of region {:p} to {} rejected: {}",
                    self.ptr,
                    new_protection,
                    e
                );
                false
            }
        }
    }

    /// Returns the reservation to the platform. Idempotent: releasing an
    /// already-released region is a no-op.
    pub fn release(&mut self) {
        if self.ptr.is_null() {
            return;
        }
        log::debug!("releasing region: base={:p} capacity={}", self.ptr, self.capacity);
        if self.uses_large_pages {
            let _ = unsafe { vmem::free_large_pages(self.ptr as _, self.capacity) };
        } else {
            let _ = unsafe { vmem::free(self.ptr as _, self.capacity) };
        }
        self.ptr = std::ptr::null_mut();
    }

    /// Base address of the reservation.
    #[inline]
    pub fn ptr(&self) -> *mut u8 {
        self.ptr
    }

    /// The requested size in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the requested size is 0.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The committed capacity in bytes, a positive multiple of the page
    /// size.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The protection currently applied to the pages.
    #[inline]
    pub fn protection(&self) -> Protection {
        self.protection
    }

    /// Returns `true` if the reservation is backed by large pages.
    #[inline]
    pub fn uses_large_pages(&self) -> bool {
        self.uses_large_pages
    }

    /// The page size the base address and capacity are aligned to.
    #[inline]
    pub fn alignment(&self) -> usize {
        self.alignment
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        self.release();
    }
}

// SAFETY: Region exclusively owns its reservation and releases it on drop;
// moving the handle across threads moves the ownership with it.
unsafe impl Send for Region {}

// SAFETY: shared references expose only metadata and the raw base address;
// callers performing concurrent access through that address are responsible
// for their own synchronization.
unsafe impl Sync for Region {}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .field("protection", &self.protection)
            .finish()
    }
}
