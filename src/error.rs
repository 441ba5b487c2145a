use thiserror::Error;

/// Failures reported by [`crate::Memory`], [`crate::Arena`] and [`crate::Heap`].
///
/// None of them are transient. A region allocator only fails because it was
/// sized wrong or because its bookkeeping got corrupted, so retrying the same
/// call will fail again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// The operating system refused to commit the region.
    #[error("the OS could not commit a region of {size} bytes")]
    RegionUnavailable { size: usize },
    /// The request does not fit in what is left of the region or arena.
    #[error("requested {requested} bytes but only {available} are left")]
    OutOfCapacity { requested: usize, available: usize },
    /// Tried to move the bump cursor below the start of the arena.
    #[error("cannot release {requested} bytes, only {used} are in use")]
    CursorUnderflow { requested: usize, used: usize },
    /// The block lists no longer describe the memory layout.
    #[error("heap corrupted: {0}")]
    Corrupted(&'static str),
}

pub type Result<T> = core::result::Result<T, Error>;
