// Pool budget and configuration, end to end.
//
// The pool is process-wide and its configuration locks at the first
// allocation, so this file holds exactly one test and runs in its own test
// process. Invariants exercised:
// - Configuration applies before the first allocation and is rejected after.
// - A full pool fails the next allocation without disturbing live nodes.
// - Nodes larger than a slot are rejected outright.
// - Releasing a slot reopens the pool and the freed address is reused first.
use rc_nodepool::{
    pool_stats, set_memory_resource, set_pool_capacity, set_slot_size, ConfigError, GraphNode,
    NodeHandle, PoolError, SimdLevel, SystemResource,
};
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Small {
    tag: u32,
    drops: Arc<AtomicUsize>,
}

impl GraphNode for Small {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn simd_level(&self) -> SimdLevel {
        SimdLevel::Scalar
    }
}

impl Drop for Small {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::Relaxed);
    }
}

struct Big {
    _bytes: [u8; 512],
}

impl GraphNode for Big {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn simd_level(&self) -> SimdLevel {
        SimdLevel::Scalar
    }
}

fn small(tag: u32, drops: &Arc<AtomicUsize>) -> Result<NodeHandle<Small>, PoolError> {
    NodeHandle::new(Small {
        tag,
        drops: drops.clone(),
    })
}

fn addr_of<T: GraphNode>(h: &NodeHandle<T>) -> usize {
    h.get().map(|n| n as *const T as usize).expect("handle must not be empty")
}

#[test]
fn pool_budget_and_recycling_end_to_end() {
    set_slot_size(256).expect("configure before any allocation");
    set_pool_capacity(3).expect("configure before any allocation");
    assert_eq!(pool_stats().slot_size, 256);
    assert_eq!(pool_stats().capacity, 3);
    assert_eq!(pool_stats().live, 0);

    // A node that cannot fit a slot is rejected outright.
    assert_eq!(
        NodeHandle::new(Big { _bytes: [0; 512] }).err(),
        Some(PoolError::NodeTooLarge { size: 512, slot_size: 256 })
    );
    assert_eq!(pool_stats().live, 0);

    // Fill the budget.
    let drops = Arc::new(AtomicUsize::new(0));
    let a = small(1, &drops).expect("slot 1 of 3");
    let b = small(2, &drops).expect("slot 2 of 3");
    let c = small(3, &drops).expect("slot 3 of 3");
    assert_eq!(pool_stats().live, 3);

    // The budget is spent: the next allocation fails, its value is dropped
    // rather than leaked, and the three live nodes are untouched.
    let rejected_drops = Arc::new(AtomicUsize::new(0));
    assert_eq!(
        small(4, &rejected_drops).err(),
        Some(PoolError::Exhausted { capacity: 3 })
    );
    assert_eq!(rejected_drops.load(Ordering::Relaxed), 1);
    assert_eq!(a.tag, 1);
    assert_eq!(b.tag, 2);
    assert_eq!(c.tag, 3);
    assert_eq!(a.use_count(), 1);
    assert_eq!(drops.load(Ordering::Relaxed), 0);

    // Configuration is now locked.
    assert_eq!(set_pool_capacity(8), Err(ConfigError::PoolInUse));
    assert_eq!(set_slot_size(512), Err(ConfigError::PoolInUse));
    assert_eq!(
        set_memory_resource(Arc::new(SystemResource)),
        Err(ConfigError::PoolInUse)
    );

    // Releasing one slot reopens the pool, and the freed address is the next
    // one handed out.
    let c_addr = addr_of(&c);
    drop(c);
    assert_eq!(drops.load(Ordering::Relaxed), 1);
    assert_eq!(pool_stats().live, 2);
    assert_eq!(pool_stats().recycled, 1);

    let e = small(5, &drops).expect("freed slot must reopen the pool");
    assert_eq!(addr_of(&e), c_addr);
    assert_eq!(pool_stats().live, 3);

    drop(a);
    drop(b);
    drop(e);
    assert_eq!(drops.load(Ordering::Relaxed), 4);
    assert_eq!(pool_stats().live, 0);
    assert_eq!(pool_stats().recycled, 3);
}
