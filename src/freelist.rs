use std::{marker::PhantomData, ptr::NonNull};

use crate::{block::Block, config::FitPolicy, list::Link};

/// Linked list to keep track of free [`Block`].
///
/// The list is intrusive: it goes through [`Block::next_free`] and
/// [`Block::prev_free`] of the headers, so keeping track of a free block costs
/// no memory besides the header it already has. It is independent from the
/// address ordered list, a block's position here says nothing about where
/// it lives in memory.
///
/// ```text
///                              Free List
///
///          +-------------------------------------------+
///          |                                           |
///          |            +------------------+           |
///          |            |                  v           v
/// head -> +------+    +------+    +-------+    +------+    +-------+
///         | Free | -> | Free |    | Block |    | Free |    | Block |
///         +------+    +------+    +-------+    +------+    +-------+
///
/// ```
///
/// Newly freed blocks are pushed at the head, so a traversal sees the most
/// recently freed block first.
pub(crate) struct FreeList {
    head: Link<Block>,
    len: usize,
}

pub(crate) struct Iter<'a> {
    current: Link<Block>,
    marker: PhantomData<&'a Block>,
}

impl FreeList {
    /// Creates a new empty List
    pub const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Pushes `block` at the head of the list.
    ///
    /// **SAFETY**: `block` must be valid and not already on the list.
    pub unsafe fn push(&mut self, mut block: NonNull<Block>) {
        unsafe {
            block.as_mut().prev_free = None;
            block.as_mut().next_free = self.head;

            if let Some(mut head) = self.head {
                head.as_mut().prev_free = Some(block);
            }
        }

        self.head = Some(block);
        self.len += 1;
    }

    /// Links `new` right after `block`. Used when splitting, so the leftover
    /// takes the place of the block it was carved from.
    ///
    /// **SAFETY**: `block` must be on the list, `new` must not.
    pub unsafe fn insert_after(&mut self, mut block: NonNull<Block>, mut new: NonNull<Block>) {
        unsafe {
            let next = block.as_ref().next_free;

            new.as_mut().prev_free = Some(block);
            new.as_mut().next_free = next;
            block.as_mut().next_free = Some(new);

            if let Some(mut next) = next {
                next.as_mut().prev_free = Some(new);
            }
        }

        self.len += 1;
    }

    /// Removes `block` from the FreeList. Its free links are cleared.
    ///
    /// **SAFETY**: `block` must be on the list.
    pub unsafe fn remove(&mut self, mut block: NonNull<Block>) {
        unsafe {
            let prev = block.as_ref().prev_free;
            let next = block.as_ref().next_free;

            match prev {
                Some(mut prev) => prev.as_mut().next_free = next,
                None => self.head = next,
            }

            if let Some(mut next) = next {
                next.as_mut().prev_free = prev;
            }

            block.as_mut().prev_free = None;
            block.as_mut().next_free = None;
        }

        self.len -= 1;
    }

    /// Returns a free block with at least `size` bytes of payload, chosen
    /// according to `policy`.
    pub fn find(&self, size: usize, policy: FitPolicy) -> Link<Block> {
        match policy {
            FitPolicy::BestFit => self.best_fit(size),
            FitPolicy::FirstFit => self.first_fit(size),
        }
    }

    /// The first block on the list that can hold `size`.
    pub fn first_fit(&self, size: usize) -> Link<Block> {
        self.iter().find(|block| unsafe { block.as_ref().size() } >= size)
    }

    /// The smallest block that can hold `size`. On ties the one closer to
    /// the head wins, that is, the most recently freed one.
    ///
    /// This is a linear scan of the whole list. There is no size index on
    /// purpose: free lists stay short for the workloads this is meant for
    /// and the scan keeps the bookkeeping down to two links per block.
    pub fn best_fit(&self, size: usize) -> Link<Block> {
        let mut best: Option<(NonNull<Block>, usize)> = None;

        for block in self {
            let block_size = unsafe { block.as_ref().size() };

            if block_size < size {
                continue;
            }

            match best {
                Some((_, best_size)) if best_size <= block_size => {}
                _ => {
                    if block_size == size {
                        return Some(block);
                    }
                    best = Some((block, block_size));
                }
            }
        }

        best.map(|(block, _)| block)
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            current: self.head,
            marker: PhantomData,
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = NonNull<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.current?;

        unsafe {
            self.current = block.as_ref().next_free;
        }

        Some(block)
    }
}

impl<'a> IntoIterator for &'a FreeList {
    type Item = NonNull<Block>;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BLOCK_HEADER_SIZE;

    /// Headers with the given payload sizes. They are not laid out in
    /// memory order, the free list does not care.
    fn blocks(storage: &mut Vec<u64>, sizes: &[usize]) -> Vec<NonNull<Block>> {
        let stride = BLOCK_HEADER_SIZE;
        storage.resize(stride / 8 * sizes.len(), 0);
        let base = storage.as_mut_ptr().cast::<u8>();

        sizes
            .iter()
            .enumerate()
            .map(|(i, size)| unsafe { Block::init(NonNull::new(base.add(i * stride)).unwrap(), *size, true) })
            .collect()
    }

    #[test]
    fn push_is_lifo() {
        let mut storage = Vec::new();
        let nodes = blocks(&mut storage, &[8, 16, 24]);
        let mut list = FreeList::new();

        unsafe {
            for node in &nodes {
                list.push(*node);
            }
        }

        assert_eq!(list.iter().collect::<Vec<_>>(), vec![nodes[2], nodes[1], nodes[0]]);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn remove_relinks_neighbours() {
        let mut storage = Vec::new();
        let nodes = blocks(&mut storage, &[8, 16, 24]);
        let mut list = FreeList::new();

        unsafe {
            for node in &nodes {
                list.push(*node);
            }

            list.remove(nodes[1]);
            assert_eq!(list.iter().collect::<Vec<_>>(), vec![nodes[2], nodes[0]]);
            assert_eq!(nodes[0].as_ref().prev_free, Some(nodes[2]));

            list.remove(nodes[2]);
            assert_eq!(list.iter().next(), Some(nodes[0]));
            assert_eq!(nodes[0].as_ref().prev_free, None);

            list.remove(nodes[0]);
        }

        assert!(list.iter().next().is_none());
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn insert_after_takes_the_next_slot() {
        let mut storage = Vec::new();
        let nodes = blocks(&mut storage, &[8, 16, 24]);
        let mut list = FreeList::new();

        unsafe {
            list.push(nodes[2]);
            list.push(nodes[0]);
            list.insert_after(nodes[0], nodes[1]);

            assert_eq!(nodes[2].as_ref().prev_free, Some(nodes[1]));
        }

        assert_eq!(list.iter().collect::<Vec<_>>(), nodes);
    }

    #[test]
    fn best_fit_picks_the_smallest_that_fits() {
        let mut storage = Vec::new();
        let nodes = blocks(&mut storage, &[64, 16, 256, 24]);
        let mut list = FreeList::new();

        unsafe {
            for node in &nodes {
                list.push(*node);
            }
        }

        assert_eq!(list.best_fit(20), Some(nodes[3]));
        assert_eq!(list.best_fit(16), Some(nodes[1]));
        assert_eq!(list.best_fit(100), Some(nodes[2]));
        assert_eq!(list.best_fit(512), None);

        // First fit just takes the head when it is big enough.
        assert_eq!(list.first_fit(20), Some(nodes[3]));
        assert_eq!(list.first_fit(32), Some(nodes[2]));
    }

    #[test]
    fn best_fit_ties_go_to_the_most_recently_freed() {
        let mut storage = Vec::new();
        let nodes = blocks(&mut storage, &[32, 32, 48]);
        let mut list = FreeList::new();

        unsafe {
            for node in &nodes {
                list.push(*node);
            }
        }

        assert_eq!(list.find(24, FitPolicy::BestFit), Some(nodes[1]));
    }
}
