//! NodeRegistry: allocation records, atomic reference counts, and the
//! process-wide slot pool behind them.

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{fence, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use slotmap::{Key, SlotMap};

use crate::error::{ConfigError, PoolError};
use crate::pool::{PoolStats, SlotPool};
use crate::resource::MemoryResource;

slotmap::new_key_type! {
    /// Opaque allocation identifier. Keys are generational, so an identifier
    /// is never reused while any handle still carries it; the null key is the
    /// sentinel of empty handles.
    pub(crate) struct AllocId;
}

/// Counts past this are unreachable in a correct program; crossing it means
/// the count is corrupt, so abort rather than wrap (`Arc` draws the same
/// line).
const MAX_REFCOUNT: u32 = u32::MAX / 2;

/// One registered allocation: its shared count and slot address. The
/// destructor is not stored here; the last handle supplies it at release,
/// since only the handle knows the pointee type.
struct AllocRecord {
    count: AtomicU32,
    address: NonNull<u8>,
}

/// Counting layer over the slot pool.
///
/// Counts live in the records table behind a read-write lock: increment and
/// decrement touch it read-only and stay lock-free with respect to each
/// other, while record insertion and removal take the write lock. Pool
/// mutation sits behind its own coarse mutex. No lock is ever held while a
/// node destructor runs, so destructors may release child handles freely.
pub(crate) struct NodeRegistry {
    records: RwLock<SlotMap<AllocId, AllocRecord>>,
    pool: Mutex<SlotPool>,
}

// SAFETY: record addresses are opaque words to the registry; they are only
// dereferenced by handle code holding a reference. All registry state is
// reached through the RwLock and Mutex.
unsafe impl Send for NodeRegistry {}
unsafe impl Sync for NodeRegistry {}

impl NodeRegistry {
    pub(crate) fn new() -> Self {
        Self {
            records: RwLock::new(SlotMap::with_key()),
            pool: Mutex::new(SlotPool::new()),
        }
    }

    /// Draw a slot able to hold `layout` and register it with count zero.
    ///
    /// The caller constructs the object at the returned address and performs
    /// the first increment when wrapping it in a handle.
    pub(crate) fn allocate_and_register(
        &self,
        layout: Layout,
    ) -> Result<(AllocId, NonNull<u8>), PoolError> {
        let address = self.pool.lock().allocate(layout)?;
        let id = self.records.write().insert(AllocRecord {
            count: AtomicU32::new(0),
            address,
        });
        Ok((id, address))
    }

    /// Add one reference. No-op for the sentinel; panics for an identifier
    /// that is not registered.
    #[inline]
    pub(crate) fn increment(&self, id: AllocId) {
        if id.is_null() {
            return;
        }
        let records = self.records.read();
        let record = records
            .get(id)
            .expect("increment on an unregistered allocation id");
        let prev = record.count.fetch_add(1, Ordering::Relaxed);
        if prev >= MAX_REFCOUNT {
            std::process::abort();
        }
    }

    /// Drop one reference. On the 1 -> 0 transition the record is removed,
    /// `destroy` runs (with no registry lock held), and the slot returns to
    /// the pool; all of that happens exactly once per allocation.
    ///
    /// `address` must be the record's slot address; `destroy` must drop the
    /// object living there.
    #[inline]
    pub(crate) fn decrement(&self, id: AllocId, address: NonNull<u8>, destroy: impl FnOnce()) {
        if id.is_null() {
            return;
        }
        let prev = {
            let records = self.records.read();
            let record = records
                .get(id)
                .expect("decrement on an unregistered allocation id");
            debug_assert_eq!(
                record.address, address,
                "handle address does not match its allocation record"
            );
            record.count.fetch_sub(1, Ordering::Release)
        };
        assert!(prev != 0, "decrement of a zero reference count");
        if prev == 1 {
            // Pair with the Release above so the destructor observes every
            // access made while other handles were alive.
            fence(Ordering::Acquire);
            let record = self
                .records
                .write()
                .remove(id)
                .expect("allocation record vanished before removal");
            destroy();
            self.pool.lock().release(record.address);
        }
    }

    /// Current count; zero for the sentinel or an unknown identifier. Racy
    /// unless the caller holds one of the counted references.
    pub(crate) fn reference_count(&self, id: AllocId) -> u32 {
        self.records
            .read()
            .get(id)
            .map_or(0, |record| record.count.load(Ordering::Acquire))
    }

    /// Slot address of a registered identifier. Debug-assertion support for
    /// the handle layer.
    pub(crate) fn address_of(&self, id: AllocId) -> Option<NonNull<u8>> {
        self.records.read().get(id).map(|record| record.address)
    }

    pub(crate) fn set_pool_capacity(&self, slots: u32) -> Result<(), ConfigError> {
        self.pool.lock().set_capacity(slots)?;
        log::debug!("node pool capacity set to {slots} slots");
        Ok(())
    }

    pub(crate) fn set_slot_size(&self, bytes: usize) -> Result<(), ConfigError> {
        self.pool.lock().set_slot_size(bytes)?;
        log::debug!("node pool slot size set to {bytes} bytes");
        Ok(())
    }

    pub(crate) fn set_memory_resource(
        &self,
        resource: Arc<dyn MemoryResource>,
    ) -> Result<(), ConfigError> {
        self.pool.lock().set_resource(resource)?;
        log::debug!("node pool memory resource replaced");
        Ok(())
    }

    pub(crate) fn pool_stats(&self) -> PoolStats {
        self.pool.lock().stats()
    }
}

static REGISTRY: OnceLock<NodeRegistry> = OnceLock::new();

/// The registry every handle in the process talks to. Lives in a static and
/// is never dropped, so no handle can outlive it.
pub(crate) fn registry() -> &'static NodeRegistry {
    REGISTRY.get_or_init(NodeRegistry::new)
}

/// Set the live-slot budget of the process-wide pool. Must happen before the
/// first allocation.
pub fn set_pool_capacity(slots: u32) -> Result<(), ConfigError> {
    registry().set_pool_capacity(slots)
}

/// Set the slot size of the process-wide pool. Must happen before the first
/// allocation; every node type must fit one slot.
pub fn set_slot_size(bytes: usize) -> Result<(), ConfigError> {
    registry().set_slot_size(bytes)
}

/// Replace the memory resource behind the process-wide pool. Must happen
/// before the first allocation.
pub fn set_memory_resource(resource: Arc<dyn MemoryResource>) -> Result<(), ConfigError> {
    registry().set_memory_resource(resource)
}

/// Counters of the process-wide pool.
pub fn pool_stats() -> PoolStats {
    registry().pool_stats()
}
