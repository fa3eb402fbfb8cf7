//! Bounds-checked, element-typed views over a region's contents.

use std::marker::PhantomData;

use crate::error::{Error, Result};

/// A length-limited, index-checked accessor over an allocator's region.
///
/// A view is re-derived from the allocator on every request and is not a
/// long-lived handle: it borrows the allocator for its lifetime, which keeps
/// it from outliving disposal or an ownership transfer. The bytes behind a
/// view survive protection transitions unchanged; only the permission
/// metadata differs.
///
/// Indexed access enforces `index < len` and reports [`ErrorKind::OutOfBounds`]
/// otherwise. It does *not* pre-validate the region's current hardware
/// protection per access — reading or writing through an improperly
/// protected region faults at the platform level, matching raw-memory
/// semantics.
///
/// [`ErrorKind::OutOfBounds`]: crate::error::ErrorKind::OutOfBounds
pub struct BoundedView<'a, T> {
    ptr: *mut T,
    len: usize,
    _region: PhantomData<&'a ()>,
}

impl<'a, T> BoundedView<'a, T>
where
    T: bytemuck::AnyBitPattern + bytemuck::NoUninit,
{
    pub(crate) fn new(ptr: *mut T, len: usize) -> BoundedView<'a, T> {
        BoundedView {
            ptr,
            len,
            _region: PhantomData,
        }
    }

    /// The logical length of the view, in elements. Equal to the
    /// allocator's capacity.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the view has a length of 0.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reads the element at `index`.
    #[inline]
    pub fn get(&self, index: usize) -> Result<T> {
        if index >= self.len {
            return Err(Error::out_of_bounds(index, self.len));
        }
        Ok(unsafe { self.ptr.add(index).read() })
    }

    /// Writes `value` into the element at `index`.
    ///
    /// Takes `&self`: the write goes through the raw region pointer, and
    /// serializing concurrent writers is the caller's contract, not the
    /// view's.
    #[inline]
    pub fn set(&self, index: usize, value: T) -> Result<()> {
        if index >= self.len {
            return Err(Error::out_of_bounds(index, self.len));
        }
        unsafe {
            self.ptr.add(index).write(value);
        }
        Ok(())
    }

    /// Copies `src` into the view starting at element `offset`.
    ///
    /// Fails without writing anything if the source does not fit.
    pub fn copy_from_slice(&self, offset: usize, src: &[T]) -> Result<()> {
        let end = offset
            .checked_add(src.len())
            .ok_or_else(|| Error::out_of_bounds(usize::MAX, self.len))?;
        if end > self.len {
            return Err(Error::out_of_bounds(end - 1, self.len));
        }
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.add(offset), src.len());
        }
        Ok(())
    }

    /// Returns a raw pointer to the first element.
    ///
    /// This is the address callers hand to an execution mechanism when the
    /// region is protected executable; invoking it as code is outside this
    /// crate's responsibility.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr
    }

    /// Returns a mutable raw pointer to the first element.
    #[inline]
    pub fn as_mut_ptr(&self) -> *mut T {
        self.ptr
    }

    /// Reinterprets the entire view as a slice.
    ///
    /// The slice is only dereferenceable while the region's protection
    /// includes read access; prefer [`BoundedView::get`] for checked access.
    #[inline]
    pub fn as_slice(&self) -> &'a [T] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl<T> std::fmt::Debug for BoundedView<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedView")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}
