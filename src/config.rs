/// How [`crate::Heap::allocate`] picks a block from the free list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FitPolicy {
    /// Smallest free block that is large enough. Keeps fragmentation low.
    #[default]
    BestFit,
    /// First free block that is large enough, starting from the most
    /// recently freed one. Stops scanning early.
    FirstFit,
}

/// Tunables of a [`crate::Heap`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapConfig {
    pub fit: FitPolicy,
}

impl HeapConfig {
    pub const fn new(fit: FitPolicy) -> Self {
        Self { fit }
    }
}
