use std::{fmt, ptr::NonNull};

use crate::{
    arena::Arena,
    block::{BLOCK_HEADER_SIZE, BLOCK_MIN_SIZE, Block},
    config::HeapConfig,
    error::{Error, Result},
    freelist::FreeList,
    list::{self, AddressList},
    memory::Memory,
    utils::{align8, safe_copy},
};

/// General purpose allocator over a fixed region.
///
/// Blocks are carved from an [`Arena`] and never given back to it, instead
/// freed blocks go to a free list and get reused by later allocations.
///
/// ```text
///                            Free List
///                  +---------------------------+
///                  |                           v
/// +-------+    +--------+    +-------+    +--------+    +-------+
/// | Block | -> |  Free  | -> | Block | -> |  Free  | -> | Block | -> cursor
/// +-------+    +--------+    +-------+    +--------+    +-------+
///                                                          top
/// ```
///
/// - Allocation looks for a free block (best fit by default), splits off the
///   tail when what is left is at least [`BLOCK_MIN_SIZE`], and carves a new
///   block at the cursor when nothing fits.
/// - Deallocation merges the block with its free neighbours, first right
///   then left, so there are never two adjacent free blocks.
/// - Reallocation of the `top` block, the one next to the cursor, only moves
///   the cursor. Other blocks try to grow into a free neighbour before
///   falling back to allocate + copy + free.
///
/// The heap does no locking. Share it between threads behind a mutex or use
/// one heap per thread.
pub struct Heap<'m> {
    arena: Arena<'m>,
    /// Every block in memory order. The tail is the `top` block.
    blocks: AddressList,
    free_list: FreeList,
    config: HeapConfig,
}

/// One entry of [`Heap::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Offset of the header from the start of the heap.
    pub offset: usize,
    /// Payload size.
    pub size: usize,
    pub used: bool,
    /// First word of the payload, if it is at least that big.
    pub preview: Option<u64>,
}

impl fmt::Display for BlockInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@{:<8} size: {:<8} {}",
            self.offset,
            self.size,
            if self.used { "used" } else { "free" }
        )?;

        if let Some(preview) = self.preview {
            write!(f, " data: {preview:#018x}")?;
        }

        Ok(())
    }
}

/// Address ordered walk over the blocks of a [`Heap`].
pub struct Blocks<'a> {
    inner: list::Iter<'a>,
    base: usize,
}

impl Iterator for Blocks<'_> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.inner.next()?;

        unsafe {
            let header = block.as_ref();
            let preview = (header.size() >= size_of::<u64>()).then(|| Block::data(block).cast::<u64>().read());

            Some(BlockInfo {
                offset: block.as_ptr() as usize - self.base,
                size: header.size(),
                used: !header.is_free(),
                preview,
            })
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'m> Heap<'m> {
    /// Carves a heap of `capacity` bytes from `memory` with the default
    /// configuration.
    pub fn new(memory: &'m Memory, capacity: usize) -> Result<Self> {
        Self::with_config(memory, capacity, HeapConfig::default())
    }

    pub fn with_config(memory: &'m Memory, capacity: usize, config: HeapConfig) -> Result<Self> {
        let arena = Arena::new(memory, capacity)?;

        log::debug!("heap at {:p}, {} bytes, {:?}", arena.base(), arena.size(), config.fit);

        Ok(Self {
            arena,
            blocks: AddressList::new(),
            free_list: FreeList::new(),
            config,
        })
    }

    /// Allocates `size` bytes, rounded up to a multiple of 8.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfCapacity`] when no free block fits and the arena has no
    /// room left for a new one. The heap is left untouched.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>> {
        let size = self.aligned(size)?;

        if let Some(block) = self.free_list.find(size, self.config.fit) {
            unsafe {
                self.split(block, size);
                self.free_list.remove(block);
                (*block.as_ptr()).set_free(false);
            }

            log::trace!("allocate({size}) -> {:p} reused", Block::data(block));
            self.debug_check();

            return Ok(Block::data(block));
        }

        let addr = self.arena.push_size(BLOCK_HEADER_SIZE + size)?;

        let block = unsafe {
            let block = Block::init(addr, size, false);
            self.blocks.append(block);
            block
        };

        log::trace!("allocate({size}) -> {:p} carved, {} bytes used", Block::data(block), self.used());
        self.debug_check();

        Ok(Block::data(block))
    }

    /// Releases the block behind `ptr` and merges it with its free neighbours.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`Heap::allocate`] or
    /// [`Heap::reallocate`] on this heap and not been freed since. Anything
    /// else is undefined behaviour, nothing is checked.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>) {
        unsafe {
            let block = Block::from_data(ptr);

            log::trace!("deallocate({ptr:p}) size {}", block.as_ref().size());

            self.merge_with_next(block);

            // The left neighbour is already free and on the free list, it
            // just grows.
            if self.merge_with_prev(block).is_none() {
                self.free_list.push(block);
                (*block.as_ptr()).set_free(true);
            }
        }

        self.debug_check();
    }

    /// Resizes the allocation behind `ptr` to `size` bytes (rounded up to 8).
    ///
    /// The first `min(old, new)` bytes of the payload are preserved. The
    /// returned pointer replaces `ptr`, which must not be used again unless
    /// both are equal.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfCapacity`] when the arena cannot hold the new size. `ptr`
    /// stays valid with its old contents.
    ///
    /// # Safety
    ///
    /// Same contract as [`Heap::deallocate`].
    pub unsafe fn reallocate(&mut self, ptr: NonNull<u8>, size: usize) -> Result<NonNull<u8>> {
        let size = self.aligned(size)?;

        unsafe {
            let mut block = Block::from_data(ptr);
            let current = block.as_ref().size();

            if current == size {
                return Ok(ptr);
            }

            if self.blocks.last() == Some(block) {
                // Both sizes are bounded by the arena size, no overflow as isize.
                self.arena.push_offset(size as isize - current as isize)?;
                block.as_mut().set_size(size);

                log::trace!("reallocate({ptr:p}) {current} -> {size} in place at top");
                self.debug_check();

                return Ok(ptr);
            }

            if size > current {
                if self.next_free_fits(block, size) {
                    self.merge_with_next(block);

                    log::trace!("reallocate({ptr:p}) {current} -> {size} grew right");
                    self.debug_check();

                    return Ok(ptr);
                }

                if let Some(prev) = self.prev_free_fits(block, size) {
                    self.free_list.remove(prev);
                    self.merge_with_prev(block);
                    (*prev.as_ptr()).set_free(false);

                    let data = Block::data(prev);
                    safe_copy(data, ptr, current);

                    log::trace!("reallocate({ptr:p}) {current} -> {size} grew left to {data:p}");
                    self.debug_check();

                    return Ok(data);
                }
            }

            // Non-top blocks are never shrunk in place, they take this path too.
            let data = self.allocate(size)?;
            safe_copy(data, ptr, current.min(size));
            self.deallocate(ptr);

            log::trace!("reallocate({ptr:p}) {current} -> {size} moved to {data:p}");

            Ok(data)
        }
    }

    /// Bytes carved from the arena so far, headers included.
    #[inline]
    pub fn used(&self) -> usize {
        self.arena.used()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.arena.size()
    }

    #[inline]
    pub fn config(&self) -> HeapConfig {
        self.config
    }

    /// Number of blocks currently on the free list.
    #[inline]
    pub fn free_blocks(&self) -> usize {
        self.free_list.len()
    }

    /// Walks every block in address order. Meant for debugging and tests.
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            inner: self.blocks.iter(),
            base: self.arena.base().as_ptr() as usize,
        }
    }

    /// Dumps [`Heap::blocks`] through `log::debug!`.
    pub fn log_state(&self) {
        log::debug!(
            "heap {:p}: {} blocks, {} free, {}/{} bytes",
            self.arena.base(),
            self.blocks.len(),
            self.free_list.len(),
            self.used(),
            self.capacity()
        );

        for (i, info) in self.blocks().enumerate() {
            log::debug!("  #{i:<4} {info}");
        }
    }

    /// Verifies that both lists still describe the memory layout:
    ///
    /// - blocks tile `[base, base + used)` with no gaps and no overlaps,
    /// - back links mirror forward links,
    /// - a block is on the free list if and only if its flag says free.
    pub fn check_integrity(&self) -> Result<()> {
        let mut expected = self.arena.base().as_ptr() as usize;
        let mut prev = None;
        let mut free = 0;

        for (count, block) in self.blocks.iter().enumerate() {
            if count >= self.blocks.len() {
                return Err(Error::Corrupted("cycle in address list"));
            }

            let header = unsafe { block.as_ref() };

            if block.as_ptr() as usize != expected {
                return Err(Error::Corrupted("gap or overlap between blocks"));
            }
            if header.prev != prev {
                return Err(Error::Corrupted("broken back link in address list"));
            }
            if header.is_free() {
                free += 1;
            }

            expected += header.total_size();
            prev = Some(block);
        }

        if prev != self.blocks.last() {
            return Err(Error::Corrupted("top is not the last block"));
        }
        if expected != self.arena.cursor().as_ptr() as usize {
            return Err(Error::Corrupted("blocks do not cover the used range"));
        }

        let mut prev_free = None;
        let mut listed = 0;

        for block in &self.free_list {
            if listed >= free {
                return Err(Error::Corrupted("free list longer than the number of free blocks"));
            }

            let header = unsafe { block.as_ref() };

            if !header.is_free() {
                return Err(Error::Corrupted("free list holds a used block"));
            }
            if header.prev_free != prev_free {
                return Err(Error::Corrupted("broken back link in free list"));
            }

            listed += 1;
            prev_free = Some(block);
        }

        if listed != free || listed != self.free_list.len() {
            return Err(Error::Corrupted("free block missing from free list"));
        }

        Ok(())
    }

    #[inline]
    fn debug_check(&self) {
        #[cfg(debug_assertions)]
        if let Err(err) = self.check_integrity() {
            self.log_state();
            panic!("{err}");
        }
    }

    /// Rounds `size` up to the block alignment, rejecting what could never
    /// fit before the rounding overflows.
    fn aligned(&self, size: usize) -> Result<usize> {
        if size > self.arena.size() {
            log::error!("request of {size} bytes exceeds heap capacity {}", self.arena.size());
            return Err(Error::OutOfCapacity {
                requested: size,
                available: self.arena.available(),
            });
        }

        Ok(align8(size))
    }

    /// Peels a free block off the tail of `block` when what is left after
    /// `size` bytes can hold a block of its own.
    ///
    /// ```text
    /// +--------+---------------------------+      +--------+------+--------+----------+
    /// | header |          payload          |  ->  | header | size | header | leftover |
    /// +--------+---------------------------+      +--------+------+--------+----------+
    /// ```
    ///
    /// **SAFETY**: `block` must be on the free list.
    unsafe fn split(&mut self, mut block: NonNull<Block>, size: usize) {
        unsafe {
            let leftover = block.as_ref().size() - size;

            if leftover < BLOCK_MIN_SIZE {
                return;
            }

            block.as_mut().set_size(size);

            let addr = Block::data(block).add(size);
            let new = Block::init(addr, leftover - BLOCK_HEADER_SIZE, true);

            self.blocks.insert_after(block, new);
            self.free_list.insert_after(block, new);

            log::trace!("split {leftover} bytes off {:p}", Block::data(block));
        }
    }

    /// Absorbs the right neighbour of `block` if it is free. `block` keeps its
    /// flag and its free list membership.
    ///
    /// **SAFETY**: `block` must be on the address list.
    unsafe fn merge_with_next(&mut self, mut block: NonNull<Block>) -> bool {
        unsafe {
            let Some(next) = block.as_ref().next else {
                return false;
            };

            if !next.as_ref().is_free() {
                return false;
            }

            // The current block should already be on the free_list, if it
            // has to be, so we just need to absorb the next one.
            self.free_list.remove(next);
            self.blocks.remove(next);

            let size = block.as_ref().size() + next.as_ref().total_size();
            block.as_mut().set_size(size);

            log::trace!("merged {:p} into {:p}", Block::data(next), Block::data(block));

            true
        }
    }

    /// Lets the left neighbour absorb `block` if that neighbour is free, and
    /// returns it. `block` leaves the address list but not the free list,
    /// that is up to the caller.
    ///
    /// **SAFETY**: `block` must be on the address list.
    unsafe fn merge_with_prev(&mut self, block: NonNull<Block>) -> Option<NonNull<Block>> {
        unsafe {
            let mut prev = block.as_ref().prev?;

            if !prev.as_ref().is_free() {
                return None;
            }

            let size = prev.as_ref().size() + block.as_ref().total_size();

            self.blocks.remove(block);
            prev.as_mut().set_size(size);

            log::trace!("merged {:p} into {:p}", Block::data(block), Block::data(prev));

            Some(prev)
        }
    }

    unsafe fn next_free_fits(&self, block: NonNull<Block>, size: usize) -> bool {
        unsafe {
            match block.as_ref().next {
                Some(next) => next.as_ref().is_free() && block.as_ref().size() + next.as_ref().size() >= size,
                None => false,
            }
        }
    }

    unsafe fn prev_free_fits(&self, block: NonNull<Block>, size: usize) -> Option<NonNull<Block>> {
        unsafe {
            let prev = block.as_ref().prev?;

            (prev.as_ref().is_free() && block.as_ref().size() + prev.as_ref().size() >= size).then_some(prev)
        }
    }
}

impl fmt::Debug for Heap<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("base", &self.arena.base())
            .field("used", &self.used())
            .field("capacity", &self.capacity())
            .field("blocks", &self.blocks.len())
            .field("free_blocks", &self.free_list.len())
            .field("config", &self.config)
            .finish()
    }
}
