use std::{marker::PhantomData, ptr::NonNull};

use crate::{
    error::{Error, Result},
    memory::Memory,
};

/// Bump allocator over a fixed sub region of a [`Memory`].
///
/// ```text
/// base                 base + used                  base + size
///  +-----+-----+--------+------------------------------+
///  | A1  | A2  |   A3   |         free capacity        |
///  +-----+-----+--------+------------------------------+
///                       ^
///                       cursor
/// ```
///
/// Allocation moves the cursor forward, [`Arena::free_size`] moves it back.
/// Interior space is never reused, the caller has to release memory in the
/// reverse order it was pushed. Sizes are expected to be aligned already.
pub struct Arena<'m> {
    base: NonNull<u8>,
    size: usize,
    used: usize,
    marker: PhantomData<&'m Memory>,
}

impl<'m> Arena<'m> {
    /// Carves `align8(size)` bytes from `memory`.
    pub fn new(memory: &'m Memory, size: usize) -> Result<Self> {
        let region = memory.reserve(size)?;

        log::debug!("arena of {} bytes at {:p}", region.size, region.base);

        Ok(Self {
            base: region.base,
            size: region.size,
            used: 0,
            marker: PhantomData,
        })
    }

    /// Returns a pointer to `size` fresh bytes at the cursor.
    pub fn push_size(&mut self, size: usize) -> Result<NonNull<u8>> {
        if size > self.available() {
            log::error!("arena {:p} exhausted: {size} requested, {} left", self.base, self.available());
            return Err(Error::OutOfCapacity {
                requested: size,
                available: self.available(),
            });
        }

        // SAFETY: `used + size <= self.size`.
        let addr = unsafe { self.base.add(self.used) };
        self.used += size;

        Ok(addr)
    }

    /// Retracts the cursor by `size` bytes.
    pub fn free_size(&mut self, size: usize) -> Result<()> {
        if size > self.used {
            return Err(Error::CursorUnderflow {
                requested: size,
                used: self.used,
            });
        }

        self.used -= size;
        Ok(())
    }

    /// Moves the cursor by `offset` bytes in either direction. The heap uses
    /// this to grow or shrink its top block in place.
    pub fn push_offset(&mut self, offset: isize) -> Result<()> {
        if offset < 0 {
            self.free_size(offset.unsigned_abs())
        } else {
            self.push_size(offset as usize).map(|_| ())
        }
    }

    /// Start of the region owned by the arena.
    #[inline]
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Current position of the cursor.
    #[inline]
    pub fn cursor(&self) -> NonNull<u8> {
        // SAFETY: `used <= size`, one past the end at most.
        unsafe { self.base.add(self.used) }
    }

    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn available(&self) -> usize {
        self.size - self.used
    }
}
