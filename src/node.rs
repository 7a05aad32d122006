//! Node vocabulary: the GraphNode base trait, SIMD capability levels, and
//! the construction contract node front-ends implement.

use std::any::Any;

use crate::error::PoolError;
use crate::handle::NodeHandle;

/// Base trait of every pooled node object.
///
/// Nodes are shared read-only across worker threads once built, hence the
/// `Send + Sync` requirement; anything mutable inside a node goes through its
/// own interior mutability.
pub trait GraphNode: Send + Sync + 'static {
    /// Downcast seam used to recover concrete-typed handles. Implementations
    /// return `self`; [`NodeHandle::downcast`] refuses anything else.
    fn as_any(&self) -> &dyn Any;

    /// The capability level this node's implementation targets.
    fn simd_level(&self) -> SimdLevel;
}

/// Instruction-set levels a node implementation may target. Ordered by
/// vector width on x86; `Neon` is the arm64 lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum SimdLevel {
    #[default]
    Scalar,
    Sse2,
    Sse41,
    Avx2,
    Avx512,
    Neon,
}

/// Construction contract for node front-ends.
///
/// A front-end picks the concrete node type matching `level`, builds it in
/// pool memory (normally through [`NodeHandle::new`]), and hands back the
/// base-typed handle holding the allocation's first reference. Which concrete
/// type backs which level is entirely the front-end's business; this crate
/// only supplies the allocate/register/wrap machinery underneath.
pub trait LevelFactory {
    fn construct_for(level: SimdLevel) -> Result<NodeHandle<dyn GraphNode>, PoolError>;
}

/// Build a node through front-end `F` for `level`.
pub fn new_for_level<F: LevelFactory>(
    level: SimdLevel,
) -> Result<NodeHandle<dyn GraphNode>, PoolError> {
    F::construct_for(level)
}
