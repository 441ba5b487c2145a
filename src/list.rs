use std::{marker::PhantomData, ptr::NonNull};

use crate::block::Block;

/// Non-null pointer to `T`.
pub(crate) type Link<T> = Option<NonNull<T>>;

/// Every block of a heap, used or free, in increasing address order.
///
/// The list never allocates, the links live inside the block headers
/// themselves (see [`Block::next`] and [`Block::prev`]). Since blocks are
/// laid out back to back, `next` is always the block starting right where
/// the current one ends, and the tail is the block closest to the arena
/// cursor.
///
/// ```text
///    head                                              tail (top)
/// +---------+    +---------+    +---------+    +---------+
/// |  Block  | -> |  Block  | -> |  Block  | -> |  Block  | -> cursor
/// +---------+ <- +---------+ <- +---------+ <- +---------+
/// ```
pub(crate) struct AddressList {
    head: Link<Block>,
    tail: Link<Block>,
    len: usize,
}

pub(crate) struct Iter<'a> {
    current: Link<Block>,
    remaining: usize,
    marker: PhantomData<&'a Block>,
}

impl AddressList {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn last(&self) -> Link<Block> {
        self.tail
    }

    /// Appends `block` after the current tail, it becomes the new tail.
    ///
    /// **SAFETY**: `block` must be a valid header that is not linked yet and
    /// that starts exactly where the current tail ends.
    pub unsafe fn append(&mut self, mut block: NonNull<Block>) {
        unsafe {
            block.as_mut().next = None;
            block.as_mut().prev = self.tail;

            if let Some(mut tail) = self.tail {
                tail.as_mut().next = Some(block);
            } else {
                self.head = Some(block);
            }
        }

        self.tail = Some(block);
        self.len += 1;
    }

    /// Links `new` right after `block`.
    ///
    /// **SAFETY**: `block` must be on this list and `new` must be a valid,
    /// unlinked header placed between `block` and its current successor.
    pub unsafe fn insert_after(&mut self, mut block: NonNull<Block>, mut new: NonNull<Block>) {
        unsafe {
            let next = block.as_ref().next;

            new.as_mut().prev = Some(block);
            new.as_mut().next = next;
            block.as_mut().next = Some(new);

            match next {
                Some(mut next) => next.as_mut().prev = Some(new),
                None => self.tail = Some(new),
            }
        }

        self.len += 1;
    }

    /// Unlinks `block`. Its own links are cleared.
    ///
    /// **SAFETY**: `block` must be on this list.
    pub unsafe fn remove(&mut self, mut block: NonNull<Block>) {
        unsafe {
            let prev = block.as_ref().prev;
            let next = block.as_ref().next;

            match prev {
                Some(mut prev) => prev.as_mut().next = next,
                None => self.head = next,
            }

            match next {
                Some(mut next) => next.as_mut().prev = prev,
                None => self.tail = prev,
            }

            block.as_mut().prev = None;
            block.as_mut().next = None;
        }

        self.len -= 1;
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            current: self.head,
            remaining: self.len,
            marker: PhantomData,
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = NonNull<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.current?;

        unsafe {
            self.current = block.as_ref().next;
        }
        self.remaining = self.remaining.saturating_sub(1);

        Some(block)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a> IntoIterator for &'a AddressList {
    type Item = NonNull<Block>;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
