//! SlotPool: budgeted slot storage with LIFO recycling over a MemoryResource.

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::error::{ConfigError, PoolError};
use crate::resource::{MemoryResource, SystemResource};

/// Alignment of every slot. Covers the widest vector types node
/// implementations embed, so per-type alignment never exceeds it in practice.
pub const SLOT_ALIGN: usize = 64;

/// Slot size used until `set_slot_size` says otherwise.
pub const DEFAULT_SLOT_SIZE: usize = 512;

/// Live-slot budget used until `set_pool_capacity` says otherwise.
pub const DEFAULT_POOL_CAPACITY: u32 = 1024;

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Bytes per slot.
    pub slot_size: usize,
    /// Live-slot budget.
    pub capacity: u32,
    /// Slots currently handed out.
    pub live: u32,
    /// Freed slots waiting on the recycle list.
    pub recycled: u32,
}

/// Uniform-slot pool. Slots are drawn one at a time from the resource, kept
/// on a free list once released, and recycled LIFO so the most recently freed
/// address is the next one handed out.
///
/// `capacity` bounds live slots: with the budget exhausted, allocation fails
/// without disturbing existing slots. `live + free.len() == drawn <= capacity`
/// holds between calls.
pub(crate) struct SlotPool {
    slot_layout: Layout,
    capacity: u32,
    live: u32,
    drawn: u32,
    free: Vec<NonNull<u8>>,
    resource: Arc<dyn MemoryResource>,
}

// SAFETY: free-list pointers are owned by the pool exclusively; the resource
// they came from is Send + Sync.
unsafe impl Send for SlotPool {}

impl SlotPool {
    pub(crate) fn new() -> Self {
        Self::with_resource(Arc::new(SystemResource))
    }

    pub(crate) fn with_resource(resource: Arc<dyn MemoryResource>) -> Self {
        // SAFETY: SLOT_ALIGN is a power of two; DEFAULT_SLOT_SIZE rounded up
        // to it stays far below isize::MAX.
        let slot_layout =
            unsafe { Layout::from_size_align_unchecked(DEFAULT_SLOT_SIZE, SLOT_ALIGN) };
        Self {
            slot_layout,
            capacity: DEFAULT_POOL_CAPACITY,
            live: 0,
            drawn: 0,
            free: Vec::new(),
            resource,
        }
    }

    fn ensure_untouched(&self) -> Result<(), ConfigError> {
        if self.drawn > 0 {
            return Err(ConfigError::PoolInUse);
        }
        Ok(())
    }

    /// Change the live-slot budget. Only before the first draw.
    pub(crate) fn set_capacity(&mut self, slots: u32) -> Result<(), ConfigError> {
        self.ensure_untouched()?;
        self.capacity = slots;
        Ok(())
    }

    /// Change the slot size. Only before the first draw; zero is rejected.
    pub(crate) fn set_slot_size(&mut self, bytes: usize) -> Result<(), ConfigError> {
        self.ensure_untouched()?;
        if bytes == 0 {
            return Err(ConfigError::InvalidSlotSize { size: 0 });
        }
        self.slot_layout = Layout::from_size_align(bytes, SLOT_ALIGN)
            .map_err(|_| ConfigError::InvalidSlotSize { size: bytes })?;
        Ok(())
    }

    /// Swap the backing resource. Only before the first draw; retained slots
    /// would otherwise go back to a resource that never issued them.
    pub(crate) fn set_resource(
        &mut self,
        resource: Arc<dyn MemoryResource>,
    ) -> Result<(), ConfigError> {
        self.ensure_untouched()?;
        self.resource = resource;
        Ok(())
    }

    /// Hand out a slot able to hold `layout`, recycling before drawing.
    pub(crate) fn allocate(&mut self, layout: Layout) -> Result<NonNull<u8>, PoolError> {
        if layout.size() > self.slot_layout.size() {
            return Err(PoolError::NodeTooLarge {
                size: layout.size(),
                slot_size: self.slot_layout.size(),
            });
        }
        if layout.align() > self.slot_layout.align() {
            return Err(PoolError::AlignmentUnsupported {
                align: layout.align(),
                slot_align: self.slot_layout.align(),
            });
        }
        if let Some(slot) = self.free.pop() {
            self.live += 1;
            return Ok(slot);
        }
        if self.live >= self.capacity {
            log::debug!("node pool exhausted: {} slots live", self.capacity);
            return Err(PoolError::Exhausted { capacity: self.capacity });
        }
        let slot = self
            .resource
            .allocate(self.slot_layout)
            .ok_or(PoolError::ResourceExhausted {
                size: self.slot_layout.size(),
            })?;
        self.drawn += 1;
        self.live += 1;
        log::trace!("drew slot {}/{} from the memory resource", self.drawn, self.capacity);
        Ok(slot)
    }

    /// Take a slot back onto the free list.
    pub(crate) fn release(&mut self, slot: NonNull<u8>) {
        debug_assert!(self.live > 0, "slot released with no slots live");
        self.live -= 1;
        self.free.push(slot);
    }

    pub(crate) fn stats(&self) -> PoolStats {
        PoolStats {
            slot_size: self.slot_layout.size(),
            capacity: self.capacity,
            live: self.live,
            recycled: self.free.len() as u32,
        }
    }
}

impl Drop for SlotPool {
    fn drop(&mut self) {
        debug_assert_eq!(self.live, 0, "pool dropped with live slots");
        let layout = self.slot_layout;
        for slot in self.free.drain(..) {
            // SAFETY: every free-list entry came from `resource` with `layout`.
            unsafe { self.resource.deallocate(slot, layout) };
        }
    }
}
