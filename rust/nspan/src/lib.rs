//! Typed, bounds-checked allocation over protection-controlled native
//! memory.
//!
//! # Key Components
//!
//! - [`NativeAllocator`] — owns one contiguous, page-aligned native region
//!   holding a fixed number of plain-data elements; construction chooses
//!   the capacity and the initial [`Protection`].
//! - [`BoundedView`] — the bounds-checked accessor over the region's
//!   elements, re-derived from allocator state on every request.
//! - [`Protection`] — the combinable read/write/execute flag set, mapped to
//!   native constants by the platform layer (`nspan-vmem`).
//! - [`PinGuard`] — a scope during which the region's base address is
//!   guaranteed stable.
//!
//! # Protection transitions
//!
//! Two primitives cover the real-world needs: [`NativeAllocator::reprotect`]
//! toggles the live region's permissions in place (non-throwing, hot-path),
//! and [`NativeAllocator::transfer`] rebuilds the allocation as a new
//! instance under different flags — write a payload under read-write, then
//! hand back a read-execute-only owner so no code path retains write
//! access. The donor is invalidated without the memory being released.
//!
//! # Example
//!
//! ```no_run
//! use nspan::{NativeAllocator, Protection};
//!
//! let mut staging = NativeAllocator::<u8>::with_capacity(1024)?;
//! let view = staging.view()?;
//! for i in 0..view.len() {
//!     view.set(i, (i % 256) as u8)?;
//! }
//!
//! // Seal the contents: the new allocator owns the same pages read-only,
//! // and `staging` is left disposed without the memory being released.
//! let sealed = staging.transfer(Protection::READ)?;
//! assert_eq!(sealed.view()?.get(500)?, 244);
//! # Ok::<(), nspan::Error>(())
//! ```

pub mod allocator;
pub mod error;
pub mod region;
pub mod view;

pub use allocator::{AllocOptions, DEFAULT_PAGE_SPAN, NativeAllocator, PinGuard};
pub use error::{Error, ErrorKind, Result};
pub use nspan_vmem::Protection;
pub use region::Region;
pub use view::BoundedView;

#[cfg(test)]
mod tests;
