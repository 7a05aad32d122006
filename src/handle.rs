use std::alloc::Layout;
use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::ptr::{self, NonNull};

use slotmap::Key;

use crate::error::PoolError;
use crate::node::GraphNode;
use crate::registry::{registry, AllocId};

/// Shared-ownership handle to a pooled node object.
///
/// The reference count lives out of line, in the process-wide registry keyed
/// by the handle's allocation identifier, so handles of different static
/// types (a concrete node type and `dyn GraphNode`) share one count for one
/// allocation. Clone adds a reference before adopting the target; drop
/// releases one reference and, as the last one out, destroys the node and
/// returns its slot to the pool.
///
/// The sentinel ("empty") handle carries the null identifier and no pointer;
/// it never touches the registry.
pub struct NodeHandle<T: ?Sized + GraphNode> {
    id: AllocId,
    ptr: Option<NonNull<T>>,
}

impl<T: ?Sized + GraphNode> NodeHandle<T> {
    /// The empty handle.
    pub fn null() -> Self {
        Self {
            id: AllocId::null(),
            ptr: None,
        }
    }

    /// True for the empty handle.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    /// Borrow the node; `None` for the empty handle.
    #[inline]
    pub fn get(&self) -> Option<&T> {
        // SAFETY: a non-empty handle owns one reference, so the node stays
        // alive at least as long as &self.
        self.ptr.map(|p| unsafe { p.as_ref() })
    }

    /// Release this handle's reference and become empty.
    pub fn reset(&mut self) {
        *self = Self::null();
    }

    /// References currently held to this handle's allocation; zero for the
    /// empty handle. Exact while the caller keeps this handle alive, a
    /// snapshot otherwise.
    pub fn use_count(&self) -> u32 {
        registry().reference_count(self.id)
    }

    /// True when this handle is the only reference.
    pub fn unique(&self) -> bool {
        self.use_count() == 1
    }

    /// Thin payload address; null for the empty handle. Identity for
    /// equality and hashing across handle types.
    #[inline]
    fn thin(&self) -> *const u8 {
        self.ptr.map_or(ptr::null(), |p| p.as_ptr() as *const u8)
    }

    /// Wrap a freshly registered allocation, taking its first reference.
    /// `ptr` must point at the live object in the allocation's slot.
    pub(crate) fn from_registered(id: AllocId, ptr: NonNull<T>) -> Self {
        debug_assert_eq!(
            registry().address_of(id),
            Some(ptr.cast::<u8>()),
            "handle must point at its own allocation"
        );
        registry().increment(id);
        Self { id, ptr: Some(ptr) }
    }
}

impl<T: GraphNode> NodeHandle<T> {
    /// Build `value` in a pool slot and take the first reference to it.
    ///
    /// Fails when the pool budget is spent, the type does not fit a slot, or
    /// the memory resource refuses; the value is dropped in that case.
    pub fn new(value: T) -> Result<Self, PoolError> {
        let (id, address) = registry().allocate_and_register(Layout::new::<T>())?;
        let ptr = address.cast::<T>();
        // SAFETY: the slot satisfies T's layout and nothing else points at it
        // until the handle exists.
        unsafe { ptr.as_ptr().write(value) };
        Ok(Self::from_registered(id, ptr))
    }

    /// Move this handle to the base-typed view of the same allocation. The
    /// count is untouched; the concrete type stays recoverable through
    /// [`NodeHandle::downcast`].
    pub fn into_dyn(self) -> NodeHandle<dyn GraphNode> {
        let this = ManuallyDrop::new(self);
        let ptr = this.ptr.map(|p| {
            let wide: *mut dyn GraphNode = p.as_ptr();
            // SAFETY: p is non-null and unsizing keeps the address.
            unsafe { NonNull::new_unchecked(wide) }
        });
        NodeHandle { id: this.id, ptr }
    }

    /// Fresh base-typed handle to the same allocation; count +1.
    pub fn to_dyn(&self) -> NodeHandle<dyn GraphNode> {
        self.clone().into_dyn()
    }
}

impl NodeHandle<dyn GraphNode> {
    /// Recover the concrete-typed handle. `Err(self)` when the handle is
    /// empty, the node is not a `U`, or its `as_any` returns anything but
    /// the node itself; the reference count never changes.
    pub fn downcast<U: GraphNode>(self) -> Result<NodeHandle<U>, Self> {
        // The cast below re-types the stored pointer, so the matched value
        // must be the node itself: as_any has to land on this handle's own
        // address, not on some other U it borrowed.
        let is_own_u = self.get().is_some_and(|node| {
            let any = node.as_any();
            any.is::<U>() && ptr::eq(any as *const dyn Any as *const u8, self.thin())
        });
        if !is_own_u {
            return Err(self);
        }
        let this = ManuallyDrop::new(self);
        // SAFETY: the check above proved this handle's own slot holds a U,
        // whose wide pointer starts at the same address.
        let ptr = this.ptr.map(|p| p.cast::<U>());
        Ok(NodeHandle { id: this.id, ptr })
    }
}

impl<T: ?Sized + GraphNode> Clone for NodeHandle<T> {
    fn clone(&self) -> Self {
        // Count the new reference before adopting id and pointer; cloning the
        // empty handle stays a no-op.
        registry().increment(self.id);
        Self {
            id: self.id,
            ptr: self.ptr,
        }
    }
}

impl<T: ?Sized + GraphNode> Drop for NodeHandle<T> {
    fn drop(&mut self) {
        if let Some(p) = self.ptr {
            registry().decrement(self.id, p.cast::<u8>(), || {
                // SAFETY: runs at most once, after the last reference is
                // gone, while the slot still holds the live T.
                unsafe { ptr::drop_in_place(p.as_ptr()) }
            });
        }
    }
}

impl<T: ?Sized + GraphNode> Default for NodeHandle<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: ?Sized + GraphNode> Deref for NodeHandle<T> {
    type Target = T;

    /// Panics on the empty handle.
    #[inline]
    fn deref(&self) -> &T {
        self.get().expect("deref of an empty node handle")
    }
}

/// Handles are equal when they dereference to the same node, whatever their
/// static types; all empty handles are equal to each other.
impl<T: ?Sized + GraphNode, U: ?Sized + GraphNode> PartialEq<NodeHandle<U>> for NodeHandle<T> {
    fn eq(&self, other: &NodeHandle<U>) -> bool {
        self.thin() == other.thin()
    }
}

impl<T: ?Sized + GraphNode> Eq for NodeHandle<T> {}

/// Hashes the node address, so equal handles hash alike across types.
impl<T: ?Sized + GraphNode> Hash for NodeHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.thin() as usize).hash(state);
    }
}

impl<T: ?Sized + GraphNode> fmt::Debug for NodeHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("id", &self.id)
            .field("addr", &self.thin())
            .finish()
    }
}

// SAFETY: GraphNode requires Send + Sync and 'static. A handle hands out &T
// only, and the final drop may run T's destructor on whichever thread
// releases last; T: Send + Sync covers both.
unsafe impl<T: ?Sized + GraphNode> Send for NodeHandle<T> {}
unsafe impl<T: ?Sized + GraphNode> Sync for NodeHandle<T> {}
