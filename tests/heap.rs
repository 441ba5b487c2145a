//! Integration tests for the heap, driven only through the public API.

use std::ptr::NonNull;

use memregion::{Arena, BLOCK_HEADER_SIZE, BLOCK_MIN_SIZE, Error, FitPolicy, Heap, HeapConfig, Memory};
use proptest::prelude::*;

const MIB: usize = 1024 * 1024;

/// Total bytes covered by the blocks of `heap`, headers included.
fn tiled(heap: &Heap) -> usize {
    heap.blocks().map(|info| BLOCK_HEADER_SIZE + info.size).sum()
}

fn fill(ptr: NonNull<u8>, len: usize, seed: u8) {
    for i in 0..len {
        unsafe { ptr.as_ptr().add(i).write(seed.wrapping_add(i as u8)) };
    }
}

fn holds(ptr: NonNull<u8>, len: usize, seed: u8) -> bool {
    (0..len).all(|i| unsafe { *ptr.as_ptr().add(i) } == seed.wrapping_add(i as u8))
}

#[test]
fn freed_neighbours_coalesce_and_get_reused() {
    let memory = Memory::new(MIB).unwrap();
    let mut heap = Heap::new(&memory, MIB).unwrap();

    let p1 = heap.allocate(8).unwrap();
    let p2 = heap.allocate(64).unwrap();
    let high_water = heap.used();

    unsafe {
        heap.deallocate(p2);
        heap.deallocate(p1);
    }

    let blocks: Vec<_> = heap.blocks().collect();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].offset, 0);
    assert_eq!(blocks[0].size, 8 + BLOCK_HEADER_SIZE + 64);
    assert!(!blocks[0].used);

    let p3 = heap.allocate(3).unwrap();
    assert_eq!(p3, p1);
    assert_eq!(heap.used(), high_water);

    // The rest was split off as a free block of its own.
    let blocks: Vec<_> = heap.blocks().map(|info| (info.size, info.used)).collect();
    assert_eq!(blocks, vec![(8, true), (64, false)]);
    heap.check_integrity().unwrap();
}

#[test]
fn arena_and_heap_share_a_region_without_overlap() {
    let memory = Memory::new(8192).unwrap();
    let mut arena = Arena::new(&memory, 4096).unwrap();
    let mut heap = Heap::new(&memory, 4096).unwrap();

    let scratch = arena.push_size(4096).unwrap();
    let block = heap.allocate(4096 - BLOCK_HEADER_SIZE).unwrap();

    assert!(block.as_ptr() as usize >= scratch.as_ptr() as usize + 4096);
    assert_eq!(memory.remaining(), 0);
    assert!(matches!(Heap::new(&memory, 8), Err(Error::OutOfCapacity { .. })));
}

#[test]
fn payloads_survive_unrelated_traffic() {
    let memory = Memory::new(MIB).unwrap();
    let mut heap = Heap::new(&memory, MIB).unwrap();

    let keep = heap.allocate(256).unwrap();
    fill(keep, 256, 7);

    let mut scratch = Vec::new();
    for i in 0..64 {
        let ptr = heap.allocate(8 * (i % 9 + 1)).unwrap();
        fill(ptr, 8 * (i % 9 + 1), 0xFF);
        scratch.push(ptr);
    }
    for ptr in scratch.into_iter().step_by(2) {
        unsafe { heap.deallocate(ptr) };
    }
    for _ in 0..32 {
        heap.allocate(16).unwrap();
    }

    assert!(holds(keep, 256, 7));
    heap.check_integrity().unwrap();
}

#[test]
fn reallocate_on_top_never_moves() {
    let memory = Memory::new(MIB).unwrap();
    let mut heap = Heap::new(&memory, MIB).unwrap();

    heap.allocate(40).unwrap();
    let top = heap.allocate(16).unwrap();
    fill(top, 16, 3);

    for size in [1024, 8, 4000, 24, 16] {
        assert_eq!(unsafe { heap.reallocate(top, size) }.unwrap(), top);
    }

    assert!(holds(top, 16, 3));
    assert_eq!(heap.used(), 2 * BLOCK_HEADER_SIZE + 40 + 16);
}

#[test]
fn reallocate_slow_path_keeps_the_prefix() {
    let memory = Memory::new(MIB).unwrap();
    let mut heap = Heap::new(&memory, MIB).unwrap();

    let a = heap.allocate(64).unwrap();
    let _guard = heap.allocate(8).unwrap();
    fill(a, 64, 42);

    let grown = unsafe { heap.reallocate(a, 512) }.unwrap();
    assert_ne!(grown, a);
    assert!(holds(grown, 64, 42));

    // The old block went back to the free list.
    assert_eq!(heap.free_blocks(), 1);
    assert_eq!(heap.allocate(64).unwrap(), a);
}

#[test]
fn reallocate_failure_leaves_the_block_alone() {
    let memory = Memory::new(4096).unwrap();
    let mut heap = Heap::new(&memory, 1024).unwrap();

    let a = heap.allocate(128).unwrap();
    let _guard = heap.allocate(8).unwrap();
    fill(a, 128, 9);

    let err = unsafe { heap.reallocate(a, 1000) }.unwrap_err();
    assert!(matches!(err, Error::OutOfCapacity { .. }));
    assert!(holds(a, 128, 9));
    heap.check_integrity().unwrap();
}

#[test]
fn first_fit_heap_still_reuses_memory() {
    let memory = Memory::new(MIB).unwrap();
    let mut heap = Heap::with_config(&memory, MIB, HeapConfig::new(FitPolicy::FirstFit)).unwrap();

    let ptrs: Vec<_> = (0..16).map(|_| heap.allocate(32).unwrap()).collect();
    let used = heap.used();

    for ptr in &ptrs {
        unsafe { heap.deallocate(*ptr) };
    }
    for _ in 0..16 {
        heap.allocate(32).unwrap();
    }

    assert_eq!(heap.used(), used);
    assert_eq!(heap.config().fit, FitPolicy::FirstFit);
}

#[derive(Debug, Clone)]
enum Op {
    Alloc(usize),
    Free(usize),
    Realloc(usize, usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1usize..512).prop_map(Op::Alloc),
        2 => any::<usize>().prop_map(Op::Free),
        2 => (any::<usize>(), 1usize..768).prop_map(|(i, size)| Op::Realloc(i, size)),
    ]
}

proptest! {
    /// Whatever the interleaving, blocks tile the used range, live payloads
    /// keep their bytes and no free block is smaller than the split minimum.
    #[test]
    fn random_traffic_keeps_the_heap_consistent(ops in prop::collection::vec(op(), 1..200)) {
        let memory = Memory::new(MIB).unwrap();
        let mut heap = Heap::new(&memory, MIB).unwrap();
        // (pointer, size, seed)
        let mut live: Vec<(NonNull<u8>, usize, u8)> = Vec::new();

        for (step, op) in ops.into_iter().enumerate() {
            let seed = step as u8;

            match op {
                Op::Alloc(size) => {
                    let ptr = heap.allocate(size).unwrap();
                    fill(ptr, size, seed);
                    live.push((ptr, size, seed));
                }
                Op::Free(i) if !live.is_empty() => {
                    let (ptr, size, seed) = live.swap_remove(i % live.len());
                    prop_assert!(holds(ptr, size, seed));
                    unsafe { heap.deallocate(ptr) };
                }
                Op::Realloc(i, size) if !live.is_empty() => {
                    let i = i % live.len();
                    let (ptr, old, seed) = live[i];
                    let new = unsafe { heap.reallocate(ptr, size) }.unwrap();
                    prop_assert!(holds(new, old.min(size), seed));
                    fill(new, size, seed);
                    live[i] = (new, size, seed);
                }
                _ => {}
            }

            prop_assert_eq!(heap.check_integrity(), Ok(()));
            prop_assert_eq!(tiled(&heap), heap.used());
        }

        for (ptr, size, seed) in &live {
            prop_assert!(holds(*ptr, *size, *seed));
        }
        for info in heap.blocks().filter(|info| !info.used) {
            prop_assert!(BLOCK_HEADER_SIZE + info.size >= BLOCK_MIN_SIZE);
        }
    }

    /// Freeing everything in any order leaves a single free block.
    #[test]
    fn freeing_everything_coalesces_to_one_block(
        sizes in prop::collection::vec(1usize..256, 1..64),
        order in any::<u64>(),
    ) {
        let memory = Memory::new(MIB).unwrap();
        let mut heap = Heap::new(&memory, MIB).unwrap();

        let mut ptrs: Vec<_> = sizes.iter().map(|size| heap.allocate(*size).unwrap()).collect();
        let used = heap.used();

        let mut state = order;
        while !ptrs.is_empty() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let ptr = ptrs.swap_remove((state >> 33) as usize % ptrs.len());
            unsafe { heap.deallocate(ptr) };
        }

        let blocks: Vec<_> = heap.blocks().collect();
        prop_assert_eq!(blocks.len(), 1);
        prop_assert!(!blocks[0].used);
        prop_assert_eq!(BLOCK_HEADER_SIZE + blocks[0].size, used);
        prop_assert_eq!(heap.free_blocks(), 1);
    }
}
