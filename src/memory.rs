use std::{cell::Cell, ptr::NonNull};

use crate::{
    error::{Error, Result},
    kernel::{self, page_size},
    utils::{ALIGNMENT, align8, checked_align},
};

/// One committed, contiguous region of memory obtained from the OS.
///
/// Every [`crate::Arena`] and [`crate::Heap`] is carved out of a `Memory`
/// once, at construction time, by moving the `used` watermark forward:
///
/// ```text
/// base                                  base + used            base + size
///  +----------------+--------------------+------------------------+
///  |    Arena #1    |       Heap #1      |       untouched        |
///  +----------------+--------------------+------------------------+
/// ```
///
/// Sub regions are never given back individually. The whole region is
/// returned to the OS when the `Memory` is dropped, and the borrow checker
/// makes sure that only happens once every arena carved from it is gone.
pub struct Memory {
    base: NonNull<u8>,
    size: usize,
    used: Cell<usize>,
    /// What was actually asked from the OS (page aligned).
    mapped: usize,
}

/// A sub region handed out by [`Memory::reserve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub base: NonNull<u8>,
    pub size: usize,
}

impl Memory {
    /// Commits a new region of `size` bytes (rounded up to 8).
    pub fn new(size: usize) -> Result<Self> {
        let unavailable = Error::RegionUnavailable { size };

        let size = checked_align(size, ALIGNMENT).ok_or(unavailable)?;
        // mmap of length zero fails, still hand out a valid empty region.
        let mapped = checked_align(size.max(1), page_size()).ok_or(unavailable)?;

        let base = unsafe { kernel::request_memory(mapped) }.ok_or(unavailable)?;

        log::debug!("committed region {base:p} of {size} bytes");

        Ok(Self {
            base,
            size,
            used: Cell::new(0),
            mapped,
        })
    }

    /// Carves `align8(size)` bytes from the remaining capacity.
    pub fn reserve(&self, size: usize) -> Result<Region> {
        let used = self.used.get();

        // `self.size - used` is a multiple of 8, so checking before rounding
        // is enough and keeps `align8` from overflowing.
        if size > self.size - used {
            log::error!("region {:p} cannot supply {size} bytes", self.base);
            return Err(Error::OutOfCapacity {
                requested: size,
                available: self.size - used,
            });
        }

        let size = align8(size);

        // SAFETY: `used + size <= self.size`, so we stay inside the mapping.
        let base = unsafe { self.base.add(used) };
        self.used.set(used + size);

        Ok(Region { base, size })
    }

    #[inline]
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn used(&self) -> usize {
        self.used.get()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.size - self.used.get()
    }
}

impl Drop for Memory {
    fn drop(&mut self) {
        log::debug!("releasing region {:p} of {} bytes", self.base, self.size);
        unsafe { kernel::return_memory(self.base, self.mapped) }
    }
}
