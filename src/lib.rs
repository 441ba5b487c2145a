//! Region based memory allocation.
//!
//! A [`Memory`] commits one contiguous region from the OS. Fixed size pieces
//! of it are handed to allocators when they are built:
//!
//! - [`Arena`]: bump allocator. Allocates by moving a cursor forward and frees
//!   by moving it back, like a stack.
//! - [`Heap`]: general purpose allocator on top of an arena. Out of order
//!   frees go to a free list, blocks get split on allocation and coalesced on
//!   deallocation, and the block next to the cursor is resized in place.
//!
//! ```text
//! +----------------------------------------------------------------+
//! |                          Memory                                |
//! | +------------------+ +--------------------------------------+  |
//! | |      Arena       | |                Heap                  |  |
//! | | ####......       | | +-------+ +------+ +-------+         |  |
//! | |                  | | | Block | | Free | | Block | ....    |  |
//! | |                  | | +-------+ +------+ +-------+         |  |
//! | +------------------+ +--------------------------------------+  |
//! +----------------------------------------------------------------+
//! ```
//!
//! Nothing here is thread safe and nothing ever returns memory to the OS
//! before the [`Memory`] itself is dropped.
//!
//! ```rust
//! use memregion::{Heap, Memory};
//!
//! let memory = Memory::new(1 << 20).unwrap();
//! let mut heap = Heap::new(&memory, 1 << 20).unwrap();
//!
//! let ptr = heap.allocate(64).unwrap();
//! unsafe {
//!     ptr.as_ptr().write_bytes(0, 64);
//!     let ptr = heap.reallocate(ptr, 128).unwrap();
//!     heap.deallocate(ptr);
//! }
//! ```

mod arena;
mod block;
mod config;
mod error;
mod freelist;
mod heap;
mod kernel;
mod list;
mod memory;
mod utils;

pub use arena::Arena;
pub use block::{BLOCK_HEADER_SIZE, BLOCK_MIN_SIZE};
pub use config::{FitPolicy, HeapConfig};
pub use error::{Error, Result};
pub use heap::{BlockInfo, Blocks, Heap};
pub use memory::{Memory, Region};
pub use utils::{ALIGNMENT, align, align8};
