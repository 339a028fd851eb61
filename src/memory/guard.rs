/*!
 * Construction Guards
 *
 * Acquire raw storage, build a value into it, and give the storage back
 * through the same path if building fails.
 *
 * # Example
 *
 * ```ignore
 * let widget = router.construct(AcquirePath::Pool(&pool), || Widget::open(cfg))?;
 * widget.poll();
 * // Dropped: Widget's destructor runs, then the block returns to `pool`
 * ```
 */

use super::heap::SystemHeap;
use super::pool::MemoryPool;
use super::router::AllocationRouter;
use super::traits::RawHeap;
use super::types::{MemoryError, MemoryResult, Origin};
use crate::core::limits::MIN_HEAP_ALIGN;
use crate::core::types::Address;
use std::alloc::Layout;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use thiserror::Error;
use tracing::{debug, error};

/// Which router entry point backs a constructed value
#[derive(Debug, Clone, Copy)]
pub enum AcquirePath<'p> {
    /// `acquire` / `release`
    Plain,
    /// `acquire_tagged` / `release_tagged`
    Tagged { file: &'static str, line: u32 },
    /// `acquire_from_pool` / `release_to_pool`
    Pool(&'p MemoryPool),
}

impl AcquirePath<'_> {
    /// Tagged path naming the caller's own file and line
    #[track_caller]
    pub fn here() -> Self {
        let location = std::panic::Location::caller();
        AcquirePath::Tagged {
            file: location.file(),
            line: location.line(),
        }
    }

    fn acquire<H: RawHeap>(
        &self,
        router: &AllocationRouter<'_, H>,
        layout: Layout,
    ) -> MemoryResult<NonNull<u8>> {
        let align = layout.align().max(MIN_HEAP_ALIGN);
        match *self {
            AcquirePath::Plain => router.acquire_heap(layout.size(), align, Origin::Unknown),
            AcquirePath::Tagged { file, line } => {
                router.acquire_heap(layout.size(), align, Origin::Site { file, line })
            }
            AcquirePath::Pool(pool) => {
                let ptr = router.acquire_from_pool(pool, layout.size())?;
                let address = ptr.as_ptr() as Address;
                if address % layout.align() != 0 {
                    if let Err(e) = router.release_to_pool(pool, ptr) {
                        error!(address, error = %e, "Failed to return misaligned pool block");
                    }
                    return Err(MemoryError::AlignmentError {
                        address,
                        alignment: layout.align(),
                    });
                }
                Ok(ptr)
            }
        }
    }

    fn release<H: RawHeap>(
        &self,
        router: &AllocationRouter<'_, H>,
        ptr: NonNull<u8>,
    ) -> MemoryResult<()> {
        match *self {
            AcquirePath::Plain => router.release(ptr),
            AcquirePath::Tagged { file, line } => router.release_tagged(ptr, file, line),
            AcquirePath::Pool(pool) => router.release_to_pool(pool, ptr),
        }
    }
}

impl fmt::Display for AcquirePath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AcquirePath::Plain => write!(f, "plain"),
            AcquirePath::Tagged { file, line } => write!(f, "tagged({}:{})", file, line),
            AcquirePath::Pool(pool) => write!(f, "pool#{}", pool.id()),
        }
    }
}

/// Failure of `construct`
///
/// In both cases no storage remains acquired.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstructError<E> {
    #[error("Storage acquisition failed: {0}")]
    Alloc(MemoryError),

    #[error("Construction failed: {0}")]
    Init(E),
}

/// Raw storage that goes back through its path unless disarmed
///
/// Covers both an `Err` from the initialiser and a panic unwinding through it.
struct RawStorage<'a, 'p, H: RawHeap> {
    router: &'a AllocationRouter<'p, H>,
    path: AcquirePath<'p>,
    ptr: NonNull<u8>,
    armed: bool,
}

impl<H: RawHeap> RawStorage<'_, '_, H> {
    fn disarm(mut self) -> NonNull<u8> {
        self.armed = false;
        self.ptr
    }
}

impl<H: RawHeap> Drop for RawStorage<'_, '_, H> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        debug!(
            address = self.ptr.as_ptr() as Address,
            path = %self.path,
            "Construction abandoned; returning storage"
        );
        if let Err(e) = self.path.release(self.router, self.ptr) {
            error!(
                address = self.ptr.as_ptr() as Address,
                path = %self.path,
                error = %e,
                "Failed to return storage after construction failure"
            );
        }
    }
}

impl<'t, H: RawHeap + Clone> AllocationRouter<'t, H> {
    /// Acquire storage for a `T` through `path` and move `init()`'s value into it
    ///
    /// If `init` fails or panics the storage is released through `path`
    /// before the failure reaches the caller.
    pub fn construct<'p, T, E, F>(
        &self,
        path: AcquirePath<'p>,
        init: F,
    ) -> Result<TrackedBox<'p, T, H>, ConstructError<E>>
    where
        't: 'p,
        F: FnOnce() -> Result<T, E>,
    {
        let router: AllocationRouter<'p, H> = self.clone();

        let ptr = path
            .acquire(&router, Layout::new::<T>())
            .map_err(ConstructError::Alloc)?;
        let storage = RawStorage {
            router: &router,
            path,
            ptr,
            armed: true,
        };

        let value = init().map_err(ConstructError::Init)?;

        let ptr = storage.disarm().cast::<T>();
        // SAFETY: the storage is fresh, sized and aligned for T, and unaliased
        unsafe { ptr.as_ptr().write(value) };

        Ok(TrackedBox {
            ptr,
            router,
            path,
            active: true,
            _owns: PhantomData,
        })
    }
}

/// Construct through the process-wide router
pub fn construct<'p, T, E, F>(
    path: AcquirePath<'p>,
    init: F,
) -> Result<TrackedBox<'p, T>, ConstructError<E>>
where
    F: FnOnce() -> Result<T, E>,
{
    AllocationRouter::global().construct(path, init)
}

/// Owning handle to a value built by `construct`
///
/// Dropping it runs `T`'s destructor and releases the storage through the
/// path it was acquired from.
pub struct TrackedBox<'p, T, H: RawHeap = SystemHeap> {
    ptr: NonNull<T>,
    router: AllocationRouter<'p, H>,
    path: AcquirePath<'p>,
    active: bool,
    _owns: PhantomData<T>,
}

// SAFETY: the box owns its T uniquely; the router and path only hold shared
// references to Sync types
unsafe impl<T: Send, H: RawHeap> Send for TrackedBox<'_, T, H> {}
unsafe impl<T: Sync, H: RawHeap> Sync for TrackedBox<'_, T, H> {}

impl<'p, T, H: RawHeap> TrackedBox<'p, T, H> {
    #[inline]
    pub fn address(&self) -> Address {
        self.ptr.as_ptr() as Address
    }

    #[inline]
    pub fn path(&self) -> AcquirePath<'p> {
        self.path
    }

    /// Drop the value and release its storage now, reporting any failure
    pub fn release(mut self) -> MemoryResult<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> MemoryResult<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;

        // SAFETY: the value was written in `construct` and is dropped only here
        unsafe { ptr::drop_in_place(self.ptr.as_ptr()) };
        self.path.release(&self.router, self.ptr.cast())
    }
}

impl<T, H: RawHeap> Deref for TrackedBox<'_, T, H> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: initialised in `construct`, live until `release_inner`
        unsafe { self.ptr.as_ref() }
    }
}

impl<T, H: RawHeap> DerefMut for TrackedBox<'_, T, H> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as for `deref`; `&mut self` guarantees exclusivity
        unsafe { self.ptr.as_mut() }
    }
}

impl<T: fmt::Debug, H: RawHeap> fmt::Debug for TrackedBox<'_, T, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedBox")
            .field("address", &self.address())
            .field("path", &self.path)
            .field("value", &**self)
            .finish()
    }
}

impl<T, H: RawHeap> Drop for TrackedBox<'_, T, H> {
    fn drop(&mut self) {
        let address = self.address();
        if let Err(e) = self.release_inner() {
            error!(
                address,
                path = %self.path,
                error = %e,
                "Tracked box drop failed to release storage"
            );
        }
    }
}
