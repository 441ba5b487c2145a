use std::{mem, ptr::NonNull};

use crate::{list::Link, utils::ALIGNMENT};

/// Header size of a block. The payload starts right after it.
pub const BLOCK_HEADER_SIZE: usize = mem::size_of::<Block>();

/// Smallest leftover that is worth turning into a block of its own: a header
/// plus room for at least one pointer sized value. Anything smaller stays
/// inside the allocated block as padding.
pub const BLOCK_MIN_SIZE: usize = BLOCK_HEADER_SIZE + ALIGNMENT;

/// Bit 0 of [`Block::size`]. Set means free.
const FREE_BIT: usize = 0x1;

/// This is the structure of a block. The fields of the block are it's metadata,
/// content is placed after this header.
///
/// ```text
/// +---------------------+ <------+
/// |        next         |        |
/// +---------------------+        |
/// |        prev         |        |
/// +---------------------+        |
/// |      next_free      |        | -> Header
/// +---------------------+        |
/// |      prev_free      |        |
/// +---------------------+        |
/// |  size  | free (1b)  |        |
/// +---------------------+ <------+
/// |       Content       |        |
/// |         ...         |        | -> Addressable content
/// |                     |        |
/// +---------------------+ <------+
/// ```
///
/// Every block takes part in the address ordered list through `next` and
/// `prev`. Only free blocks are also linked through `next_free` and
/// `prev_free`, see [`crate::freelist::FreeList`].
///
/// Payload sizes are always a multiple of [`ALIGNMENT`], so the lowest bit of
/// `size` is unused and we store the free flag there. Never read `size`
/// directly, go through [`Block::size`] and [`Block::is_free`].
#[repr(C)]
pub(crate) struct Block {
    /// Next block in memory.
    pub next: Link<Block>,
    /// Previous block in memory.
    pub prev: Link<Block>,
    /// Next block in the free list. Only meaningful while free.
    pub next_free: Link<Block>,
    /// Previous block in the free list. Only meaningful while free.
    pub prev_free: Link<Block>,
    size: usize,
}

impl Block {
    /// Writes a fresh, unlinked header at `addr`.
    ///
    /// **SAFETY**: `addr` must be aligned and valid for [`BLOCK_HEADER_SIZE`] bytes.
    pub unsafe fn init(addr: NonNull<u8>, size: usize, free: bool) -> NonNull<Block> {
        debug_assert_eq!(size & FREE_BIT, 0, "unaligned block size {size}");

        let block = addr.cast::<Block>();

        unsafe {
            block.as_ptr().write(Block {
                next: None,
                prev: None,
                next_free: None,
                prev_free: None,
                size: if free { size | FREE_BIT } else { size },
            });
        }

        block
    }

    /// Recovers the header of a payload returned to the user.
    ///
    /// **SAFETY**: `data` must come from [`Block::data`].
    #[inline]
    pub unsafe fn from_data(data: NonNull<u8>) -> NonNull<Block> {
        unsafe { data.sub(BLOCK_HEADER_SIZE).cast() }
    }

    /// First payload byte of `block`.
    #[inline]
    pub fn data(block: NonNull<Block>) -> NonNull<u8> {
        unsafe { block.cast::<u8>().add(BLOCK_HEADER_SIZE) }
    }

    /// Payload size, without the flag.
    #[inline]
    pub fn size(&self) -> usize {
        self.size & !FREE_BIT
    }

    /// Header plus payload.
    #[inline]
    pub fn total_size(&self) -> usize {
        BLOCK_HEADER_SIZE + self.size()
    }

    /// Changes the payload size keeping the current flag.
    #[inline]
    pub fn set_size(&mut self, size: usize) {
        debug_assert_eq!(size & FREE_BIT, 0, "unaligned block size {size}");
        self.size = size | (self.size & FREE_BIT);
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.size & FREE_BIT != 0
    }

    #[inline]
    pub fn set_free(&mut self, free: bool) {
        if free {
            self.size |= FREE_BIT;
        } else {
            self.size &= !FREE_BIT;
        }
    }
}
