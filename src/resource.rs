use std::alloc::Layout;
use std::ptr::NonNull;

/// Raw-memory provider for the slot pool.
///
/// Implementations hand out blocks satisfying `layout` and take the same
/// blocks back. The pool calls `allocate` with its uniform slot layout only,
/// so an implementation may specialize for one size class.
pub trait MemoryResource: Send + Sync {
    /// Allocate a block for `layout`, or `None` if the resource cannot.
    ///
    /// `layout.size()` is never zero; the pool rejects zero-size slot
    /// configurations before reaching the resource.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Return a block to the resource.
    ///
    /// # Safety
    ///
    /// `ptr` must come from an `allocate` call on this same resource with
    /// this same `layout`, and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// Default resource: the process global allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResource;

impl MemoryResource for SystemResource {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        debug_assert!(layout.size() > 0);
        // SAFETY: layout is non-zero-sized per the trait contract.
        NonNull::new(unsafe { std::alloc::alloc(layout) })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        std::alloc::dealloc(ptr.as_ptr(), layout);
    }
}
