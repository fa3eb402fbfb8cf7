//! Hardware memory-protection descriptor.
//!
//! `Protection` is the combinable read/write/execute flag set that governs a
//! page range. The mapping from a flag combination to the platform's native
//! protection constant lives in the platform `vmem` module, since the legal
//! encodings differ between POSIX and Windows.

use std::fmt;

bitflags::bitflags! {
    /// A combinable set of hardware access permissions for a memory region.
    ///
    /// The empty set denotes a fully inaccessible region (`PROT_NONE` /
    /// `PAGE_NOACCESS`). Any union of the three base flags is a valid
    /// *request*; whether the platform honors a particular combination is
    /// reported by the protection call itself.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Protection: u8 {
        /// The region contents may be read.
        const READ = 1;
        /// The region contents may be written.
        const WRITE = 1 << 1;
        /// The region contents may be executed as code.
        const EXECUTE = 1 << 2;

        /// Read and write access, the default for freshly committed pages.
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
        /// Read and execute access, typical for published code regions.
        const READ_EXECUTE = Self::READ.bits() | Self::EXECUTE.bits();
        /// All three permissions.
        const ALL = Self::READ.bits() | Self::WRITE.bits() | Self::EXECUTE.bits();
    }
}

impl Protection {
    /// Returns `true` if the set includes read access.
    #[inline]
    pub fn is_readable(&self) -> bool {
        self.contains(Protection::READ)
    }

    /// Returns `true` if the set includes write access.
    #[inline]
    pub fn is_writable(&self) -> bool {
        self.contains(Protection::WRITE)
    }

    /// Returns `true` if the set includes execute access.
    #[inline]
    pub fn is_executable(&self) -> bool {
        self.contains(Protection::EXECUTE)
    }
}

impl Default for Protection {
    /// Defaults to read-write, matching the protection of newly committed
    /// pages.
    fn default() -> Protection {
        Protection::READ_WRITE
    }
}

impl fmt::Display for Protection {
    /// Formats the set in the conventional `rwx` notation, e.g. `r-x`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            if self.is_readable() { 'r' } else { '-' },
            if self.is_writable() { 'w' } else { '-' },
            if self.is_executable() { 'x' } else { '-' },
        )
    }
}
