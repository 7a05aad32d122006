//! rc-nodepool: pooled storage for graph node objects with shared,
//! reference-counted handles whose counts live out of line in a
//! process-wide registry.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: give polymorphic node graphs `shared_ptr`-style ownership without
//!   per-object control blocks, in safe, separately verifiable layers.
//! - Layers:
//!   - MemoryResource: the raw-memory seam; `SystemResource` backs onto the
//!     global allocator, embedders may plug their own.
//!   - SlotPool: uniform slots drawn one at a time from the resource,
//!     recycled LIFO, with a hard live-slot budget. Exhaustion is an error
//!     value, never a silent null.
//!   - NodeRegistry: allocation records keyed by generational identifiers,
//!     each holding an atomic reference count and the slot address; owns the
//!     pool and the process-wide configuration surface.
//!   - NodeHandle<T>: public RAII handle; clone increments before adopting,
//!     drop decrements and, on the last release, destroys the node and
//!     returns its slot.
//!
//! Constraints
//! - One count per allocation, shared by every static view of it: a
//!   concrete-typed handle and a base-typed (`dyn GraphNode`) handle to the
//!   same node always agree.
//! - Identifiers are generational; a released identifier is never revived,
//!   and using one is a panic, not a lookup miss.
//! - Node types implement `GraphNode` (`Send + Sync + 'static`), so handles
//!   are `Send + Sync` and hand out `&T` only.
//!
//! Concurrency discipline
//! - Counts are atomic and touched under the records read lock only, so
//!   increment/decrement stay lock-free with respect to each other. Record
//!   insert/remove and all pool mutation take the coarse locks.
//! - No lock is held while a node destructor runs; destructors may drop
//!   child handles, cascading through a graph, without deadlock.
//! - Destruction happens exactly once per allocation, on whichever thread
//!   releases last.
//!
//! Overflow semantics
//! - Reference-count overflow aborts the process. The headroom check runs
//!   after the atomic add, the same line `Arc` draws.
//!
//! Configuration
//! - Slot size, live-slot capacity, and the memory resource are process-wide
//!   and settable only before the first allocation; afterwards the entry
//!   points return `ConfigError::PoolInUse`, because retained slots were
//!   drawn with the old layout and resource.
//!
//! Notes and non-goals
//! - No weak handles, no cycle detection, no garbage collection: a cycle of
//!   node handles leaks, and breaking it is the embedder's job.
//! - Dereferencing the empty handle panics; it is a programmer error, not a
//!   recoverable condition.
//! - Which concrete node type serves which SIMD level is decided by front-end
//!   factories outside this crate (`LevelFactory`); the crate only allocates,
//!   registers, and wraps.

mod error;
mod handle;
mod node;
mod pool;
mod registry;
mod resource;

// Public surface
pub use error::{ConfigError, PoolError};
pub use handle::NodeHandle;
pub use node::{new_for_level, GraphNode, LevelFactory, SimdLevel};
pub use pool::{PoolStats, DEFAULT_POOL_CAPACITY, DEFAULT_SLOT_SIZE, SLOT_ALIGN};
pub use registry::{pool_stats, set_memory_resource, set_pool_capacity, set_slot_size};
pub use resource::{MemoryResource, SystemResource};
