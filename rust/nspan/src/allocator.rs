//! The typed allocator: one native region, one logical allocation.

use std::cell::Cell;
use std::marker::PhantomData;

use nspan_vmem::{Protection, vmem};

use crate::error::{Error, Result};
use crate::region::Region;
use crate::view::BoundedView;

/// Number of platform pages an allocator commits when no capacity is given.
///
/// The observed contract is "one page's worth of elements"; the constant
/// exists so the default is named rather than scattered.
pub const DEFAULT_PAGE_SPAN: usize = 1;

/// Construction options for [`NativeAllocator`].
#[derive(Debug, Clone, Default)]
pub struct AllocOptions {
    capacity: Option<usize>,
    protection: Protection,
    large_pages: bool,
}

impl AllocOptions {
    pub fn new() -> AllocOptions {
        AllocOptions::default()
    }

    /// Sets the element capacity. When omitted, the allocator commits
    /// [`DEFAULT_PAGE_SPAN`] pages' worth of elements.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Sets the initial protection. Defaults to read-write.
    pub fn protection(mut self, protection: Protection) -> Self {
        self.protection = protection;
        self
    }

    /// Requests large (huge) page backing, falling back to standard pages
    /// when large pages are unavailable.
    pub fn large_pages(mut self, large_pages: bool) -> Self {
        self.large_pages = large_pages;
        self
    }
}

/// A typed allocator over a single contiguous, natively-backed memory
/// region with mutable hardware protection.
///
/// The allocator owns exactly one page-aligned reservation for its whole
/// lifetime ("linear": one region, one logical allocation). Element access
/// goes through bounds-checked [`BoundedView`]s re-derived on each request;
/// protection can be mutated in place ([`NativeAllocator::reprotect`]) or
/// the region can be handed to a fresh instance under different flags
/// ([`NativeAllocator::transfer`]), which invalidates the donor without
/// releasing the memory.
///
/// The element type must be plain data with a fixed, nonzero size
/// (`bytemuck::AnyBitPattern + NoUninit`); elements live flat in the region
/// with no per-element indirection.
///
/// Operations are synchronous and lock-free; serializing concurrent
/// mutation and access on one allocator is the caller's responsibility.
pub struct NativeAllocator<T> {
    /// `Some` while Active. Disposal releases and drops the region;
    /// ownership transfer takes it without releasing. Either way, `None`
    /// is the disposed state.
    region: Option<Region>,
    /// Element capacity, immutable for the allocator's lifetime.
    capacity: usize,
    /// Number of currently open pin scopes.
    pin_count: Cell<usize>,
    _marker: PhantomData<T>,
}

impl<T> NativeAllocator<T>
where
    T: bytemuck::AnyBitPattern + bytemuck::NoUninit,
{
    /// Creates an allocator with the default capacity (one page's worth of
    /// elements) and read-write protection.
    pub fn new() -> Result<NativeAllocator<T>> {
        Self::with_options(AllocOptions::new())
    }

    /// Creates a read-write allocator for `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Result<NativeAllocator<T>> {
        Self::with_options(AllocOptions::new().capacity(capacity))
    }

    /// Creates an allocator for `capacity` elements under `protection`.
    ///
    /// The pages are committed read-write and zero-filled before the
    /// requested protection is applied, so a narrower protection never
    /// exposes uninitialized bytes. A platform rejection of the combination
    /// fails the construction; nothing is leaked.
    pub fn with_capacity_and_protection(
        capacity: usize,
        protection: Protection,
    ) -> Result<NativeAllocator<T>> {
        Self::with_options(AllocOptions::new().capacity(capacity).protection(protection))
    }

    /// Creates an allocator from explicit [`AllocOptions`].
    pub fn with_options(options: AllocOptions) -> Result<NativeAllocator<T>> {
        const {
            assert!(size_of::<T>() > 0, "zero-sized element types are not supported");
        }
        let capacity = options
            .capacity
            .unwrap_or(DEFAULT_PAGE_SPAN * vmem::get_page_size() / size_of::<T>());
        let byte_len = capacity.checked_mul(size_of::<T>()).ok_or_else(|| {
            Error::allocation(
                "capacity",
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "byte length overflow"),
            )
        })?;
        let region = if options.large_pages {
            Region::acquire_with_fallback(byte_len, options.protection)?
        } else {
            Region::acquire(byte_len, options.protection)?
        };
        Ok(NativeAllocator {
            region: Some(region),
            capacity,
            pin_count: Cell::new(0),
            _marker: PhantomData,
        })
    }

    /// Returns a bounds-checked view of length [`NativeAllocator::capacity`]
    /// over the region's current base address.
    ///
    /// Views are not cached: every call re-derives the view from the current
    /// allocator state. A view issued before a protection transition keeps
    /// observing the same bytes afterwards; only the permission metadata
    /// differs.
    pub fn view(&self) -> Result<BoundedView<'_, T>> {
        match &self.region {
            Some(region) => Ok(BoundedView::new(region.ptr() as *mut T, self.capacity)),
            None => Err(Error::disposed("view")),
        }
    }
}

impl<T> NativeAllocator<T> {
    /// Element capacity of the region. Remains readable after disposal.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Size of one element in bytes.
    #[inline]
    pub fn element_size(&self) -> usize {
        size_of::<T>()
    }

    /// Logical byte length of the allocation (`capacity * element_size`).
    /// The committed reservation is this rounded up to the page size.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.capacity * size_of::<T>()
    }

    /// The protection currently applied to the region.
    pub fn protection(&self) -> Result<Protection> {
        match &self.region {
            Some(region) => Ok(region.protection()),
            None => Err(Error::disposed("protection")),
        }
    }

    /// Returns `true` once the allocator has been disposed or its region
    /// transferred away.
    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.region.is_none()
    }

    /// Mutates the region's protection in place. Dangerous: the caller is
    /// responsible for ensuring no other code concurrently relies on the
    /// prior protection (e.g. toggling a region writable while another
    /// party executes from it is a caller-level race this crate does not
    /// arbitrate).
    ///
    /// Platform rejection is reported as `Ok(false)` rather than through
    /// the error channel, keeping repeated toggling allocation-free; the
    /// recorded protection is then unchanged. Only the disposed state is an
    /// `Err`.
    pub fn reprotect(&mut self, new_protection: Protection) -> Result<bool> {
        match &mut self.region {
            Some(region) => Ok(region.reprotect(new_protection)),
            None => Err(Error::disposed("reprotect")),
        }
    }

    /// Reconstructs the allocation under `new_protection`, transferring
    /// region ownership to the returned instance.
    ///
    /// The region is reprotected first; if the platform refuses, the donor
    /// is left Active and unchanged and a `Protection` error is returned —
    /// there is no partial transfer. On success the new allocator adopts
    /// the region, capacity and element size, and the donor is left
    /// disposed *without releasing the memory*: every subsequent donor
    /// operation behaves as after disposal, and a later dispose of the
    /// donor is a no-op that cannot touch the transferred region.
    pub fn transfer(&mut self, new_protection: Protection) -> Result<NativeAllocator<T>> {
        match &mut self.region {
            None => Err(Error::disposed("transfer")),
            Some(region) => {
                region
                    .apply_protection(new_protection)
                    .map_err(|e| Error::protection(new_protection, e))?;
                log::debug!(
                    "transferring region {:p} to new owner under {}",
                    region.ptr(),
                    new_protection
                );
                Ok(NativeAllocator {
                    region: self.region.take(),
                    capacity: self.capacity,
                    pin_count: Cell::new(0),
                    _marker: PhantomData,
                })
            }
        }
    }

    /// Opens a pin scope: for as long as the returned guard lives, the
    /// region's base address does not change.
    ///
    /// A natively-backed region never moves, so pinning is bookkeeping
    /// only, but the contract is shared with allocator variants backed by
    /// relocatable storage, where an open pin scope suppresses relocation.
    /// The guard borrows the allocator, so disposal and transfer are
    /// statically impossible while a scope is open, and an unpin without a
    /// matching pin cannot be expressed.
    pub fn pin(&self) -> Result<PinGuard<'_, T>> {
        if self.region.is_none() {
            return Err(Error::disposed("pin"));
        }
        self.pin_count.set(self.pin_count.get() + 1);
        Ok(PinGuard { allocator: self })
    }

    /// Number of currently open pin scopes.
    #[inline]
    pub fn pin_count(&self) -> usize {
        self.pin_count.get()
    }

    /// Releases the region back to the platform.
    ///
    /// Idempotent: disposing an already-disposed allocator (including one
    /// whose region was transferred away) is a silent no-op, any number of
    /// times.
    pub fn dispose(&mut self) {
        if let Some(mut region) = self.region.take() {
            region.release();
        }
    }
}

impl<T> Drop for NativeAllocator<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T> std::fmt::Debug for NativeAllocator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeAllocator")
            .field("capacity", &self.capacity)
            .field("element_size", &size_of::<T>())
            .field("region", &self.region)
            .field("pin_count", &self.pin_count.get())
            .finish()
    }
}

/// An open pin scope over a [`NativeAllocator`]; dropping the guard closes
/// the scope.
pub struct PinGuard<'a, T> {
    allocator: &'a NativeAllocator<T>,
}

impl<T> Drop for PinGuard<'_, T> {
    fn drop(&mut self) {
        let count = self.allocator.pin_count.get();
        debug_assert!(count > 0);
        self.allocator.pin_count.set(count - 1);
    }
}

impl<T> std::fmt::Debug for PinGuard<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinGuard")
            .field("pin_count", &self.allocator.pin_count.get())
            .finish()
    }
}
