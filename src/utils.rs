//! This file contains all the helper functions for the allocator.
//! This are functions that don't particularly belong to any concrete module of the program.

use std::{mem, ptr::NonNull};

/// Every size handed out by the allocator is a multiple of this. It also
/// guarantees that bit 0 of a stored size is always zero, see [`crate::block::Block`].
pub const ALIGNMENT: usize = mem::size_of::<u64>();

/// It aligns `to_be_aligned` using `aligment`.
///
/// This method is used to align the committed region to be a multiple of
/// [`crate::kernel::page_size`] and block sizes to be a multiple of [`ALIGNMENT`].
/// `aligment` must be a power of two.
#[inline]
pub const fn align(to_be_aligned: usize, aligment: usize) -> usize {
    debug_assert!(aligment.is_power_of_two());
    (to_be_aligned + aligment - 1) & !(aligment - 1)
}

/// Like [`align`], but `None` when the rounded value does not fit in a `usize`.
#[inline]
pub const fn checked_align(to_be_aligned: usize, aligment: usize) -> Option<usize> {
    debug_assert!(aligment.is_power_of_two());
    match to_be_aligned.checked_add(aligment - 1) {
        Some(sum) => Some(sum & !(aligment - 1)),
        None => None,
    }
}

/// Shorthand for [`align`] to [`ALIGNMENT`].
#[inline]
pub const fn align8(size: usize) -> usize {
    align(size, ALIGNMENT)
}

/// Copies `count` bytes from `src` to `dst`. Both ranges may overlap.
///
/// When a block gets merged into its left neighbour the payload is moved
/// towards lower addresses, and the old and new payload ranges overlap.
///
/// **SAFETY**: Both pointers must be valid for `count` bytes.
#[inline]
pub unsafe fn safe_copy(dst: NonNull<u8>, src: NonNull<u8>, count: usize) {
    if dst == src || count == 0 {
        return;
    }

    unsafe { std::ptr::copy(src.as_ptr(), dst.as_ptr(), count) }
}
