//! Object pooling with RAII checkout.
//!
//! This module provides [`ObjectPool`], a thread-safe free list of reusable
//! objects, and [`Pooled`], the guard that hands an object out and returns it
//! to the free list when dropped.
//!
//! # Motivation
//!
//! GPU objects such as fences, command buffers and descriptor sets are
//! expensive to create and limited in number. Frames are rebuilt every few
//! milliseconds, so instead of destroying these objects when a frame is done
//! with them they go back into a pool and get handed out again.
//!
//! # Strategies
//!
//! A pool is specialized by composition rather than by subtyping. The object
//! kind is described by a strategy:
//!
//! - [`Recycler`] knows how to destroy an object for good. Every pool needs it.
//! - [`PoolStrategy`] adds `create` and `reset`, which is what
//!   [`ObjectPool::acquire`] needs to fall back to a fresh object or to bring a
//!   reused one back to its ready state.
//!
//! Pools whose objects need extra parameters to be created (descriptor sets need
//! a layout) implement only [`Recycler`] and build on the lower level
//! [`ObjectPool::try_acquire_where`], [`ObjectPool::recycle_oldest`] and
//! [`ObjectPool::adopt`] operations.
//!
//! # Example
//!
//! ```
//! use vesta_core::pool::{ObjectPool, PoolStrategy, Recycler};
//!
//! struct Scratch;
//!
//! impl Recycler for Scratch {
//!     type Object = Vec<u8>;
//!     fn destroy(&self, _object: Vec<u8>) {}
//! }
//!
//! impl PoolStrategy for Scratch {
//!     type Error = std::convert::Infallible;
//!     fn create(&self) -> Result<Vec<u8>, Self::Error> {
//!         Ok(Vec::with_capacity(1024))
//!     }
//!     fn reset(&self, object: &mut Vec<u8>) -> Result<(), Self::Error> {
//!         object.clear();
//!         Ok(())
//!     }
//! }
//!
//! let pool = ObjectPool::new(Scratch);
//! {
//!     let mut buf = pool.acquire().unwrap();
//!     buf.extend_from_slice(&[1, 2, 3]);
//!     assert_eq!(pool.acquired(), 1);
//! } // returned to the pool here
//!
//! assert_eq!(pool.pooled(), 1);
//! let buf = pool.acquire().unwrap();
//! assert!(buf.is_empty());
//! assert!(buf.capacity() >= 1024);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;

/// Permanently destroys pooled objects.
///
/// Called for every object still sitting in the free list when the pool goes
/// away, and for objects that a failed [`PoolStrategy::reset`] left unusable.
pub trait Recycler: Send + Sync + 'static {
    /// The pooled object type.
    type Object: Send + 'static;

    /// Destroy an object. It will never be handed out again.
    fn destroy(&self, object: Self::Object);
}

/// Creation and reset hooks for pools that can build objects on their own.
pub trait PoolStrategy: Recycler {
    /// Error returned by [`create`](Self::create) and [`reset`](Self::reset).
    type Error;

    /// Build a fresh object in its ready-to-use state.
    fn create(&self) -> Result<Self::Object, Self::Error>;

    /// Bring a reused object back to its ready-to-use state.
    fn reset(&self, object: &mut Self::Object) -> Result<(), Self::Error>;
}

struct State<T> {
    /// Released objects, oldest first.
    free: VecDeque<T>,
    acquired: usize,
    created: usize,
}

struct Shared<R: Recycler> {
    recycler: R,
    state: Mutex<State<R::Object>>,
}

impl<R: Recycler> Shared<R> {
    fn release(&self, object: R::Object) {
        let mut state = self.state.lock();
        debug_assert!(state.acquired > 0);
        state.acquired -= 1;
        state.free.push_back(object);
    }

    /// Forget a checked-out object that was destroyed instead of released.
    fn forget(&self) {
        let mut state = self.state.lock();
        state.acquired -= 1;
        state.created -= 1;
    }
}

impl<R: Recycler> Drop for Shared<R> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let count = state.free.len();
        for object in state.free.drain(..) {
            self.recycler.destroy(object);
        }
        if count > 0 {
            log::trace!("ObjectPool: destroyed {count} pooled objects");
        }
    }
}

/// A thread-safe pool of reusable objects.
///
/// `ObjectPool` is a cheap handle: cloning it shares the same free list.
/// Objects are handed out wrapped in [`Pooled`] and come back automatically
/// when the guard is dropped.
///
/// # Invariant
///
/// `created() == acquired() + pooled()` holds after every operation, and an
/// object is never both checked out and on the free list.
pub struct ObjectPool<R: Recycler> {
    shared: Arc<Shared<R>>,
}

impl<R: Recycler> ObjectPool<R> {
    /// Create an empty pool driven by `recycler`.
    pub fn new(recycler: R) -> Self {
        Self {
            shared: Arc::new(Shared {
                recycler,
                state: Mutex::new(State {
                    free: VecDeque::new(),
                    acquired: 0,
                    created: 0,
                }),
            }),
        }
    }

    /// Get the strategy driving this pool.
    pub fn recycler(&self) -> &R {
        &self.shared.recycler
    }

    /// Check out the most recently released object, if any.
    ///
    /// Never creates an object. The returned object is handed out as it was
    /// released, without any reset.
    pub fn try_acquire(&self) -> Option<Pooled<R>> {
        let object = {
            let mut state = self.shared.state.lock();
            let object = state.free.pop_back()?;
            state.acquired += 1;
            object
        };
        Some(self.wrap(object))
    }

    /// Check out the oldest released object matching `predicate`, if any.
    pub fn try_acquire_where<P>(&self, mut predicate: P) -> Option<Pooled<R>>
    where
        P: FnMut(&R::Object) -> bool,
    {
        let object = {
            let mut state = self.shared.state.lock();
            let position = state.free.iter().position(&mut predicate)?;
            let object = state.free.remove(position)?;
            state.acquired += 1;
            object
        };
        Some(self.wrap(object))
    }

    /// Take the oldest released object and transform it before checking it out.
    ///
    /// Returns `None` when the free list is empty. If `transform` fails, the
    /// object it consumed is considered destroyed and no longer counts as
    /// created.
    pub fn recycle_oldest<E, F>(&self, transform: F) -> Option<Result<Pooled<R>, E>>
    where
        F: FnOnce(&R, R::Object) -> Result<R::Object, E>,
    {
        let object = {
            let mut state = self.shared.state.lock();
            let object = state.free.pop_front()?;
            state.acquired += 1;
            object
        };

        match transform(&self.shared.recycler, object) {
            Ok(object) => Some(Ok(self.wrap(object))),
            Err(e) => {
                self.shared.forget();
                Some(Err(e))
            }
        }
    }

    /// Check out an object that was built outside the pool.
    ///
    /// From now on the pool owns it: it counts as created and returns to the
    /// free list when the guard is dropped.
    pub fn adopt(&self, object: R::Object) -> Pooled<R> {
        {
            let mut state = self.shared.state.lock();
            state.created += 1;
            state.acquired += 1;
        }
        self.wrap(object)
    }

    /// Number of objects currently checked out.
    pub fn acquired(&self) -> usize {
        self.shared.state.lock().acquired
    }

    /// Number of objects waiting on the free list.
    pub fn pooled(&self) -> usize {
        self.shared.state.lock().free.len()
    }

    /// Number of live objects owned by this pool.
    pub fn created(&self) -> usize {
        self.shared.state.lock().created
    }

    fn wrap(&self, object: R::Object) -> Pooled<R> {
        Pooled {
            object: Some(object),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<R: PoolStrategy> ObjectPool<R> {
    /// Check out a ready-to-use object.
    ///
    /// Reuses a released object after resetting it, or creates a fresh one when
    /// the free list is empty. An object whose reset fails is destroyed.
    pub fn acquire(&self) -> Result<Pooled<R>, R::Error> {
        if let Some(mut pooled) = self.try_acquire() {
            return match self.shared.recycler.reset(&mut *pooled) {
                Ok(()) => Ok(pooled),
                Err(e) => {
                    pooled.discard();
                    Err(e)
                }
            };
        }

        let object = self.shared.recycler.create()?;
        Ok(self.adopt(object))
    }
}

impl<R: Recycler> Clone for ObjectPool<R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<R: Recycler> fmt::Debug for ObjectPool<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("ObjectPool")
            .field("acquired", &state.acquired)
            .field("pooled", &state.free.len())
            .field("created", &state.created)
            .finish()
    }
}

/// An object checked out of an [`ObjectPool`].
///
/// Dereferences to the pooled object. Dropping the guard returns the object to
/// the free list of the pool it came from, exactly once. The guard keeps that
/// pool alive, so release never races with pool destruction.
pub struct Pooled<R: Recycler> {
    object: Option<R::Object>,
    shared: Arc<Shared<R>>,
}

impl<R: Recycler> Pooled<R> {
    /// Destroy the object instead of returning it to the pool.
    pub fn discard(mut self) {
        if let Some(object) = self.object.take() {
            self.shared.forget();
            self.shared.recycler.destroy(object);
        }
    }
}

impl<R: Recycler> Deref for Pooled<R> {
    type Target = R::Object;

    fn deref(&self) -> &Self::Target {
        match &self.object {
            Some(object) => object,
            None => unreachable!("pooled object accessed after release"),
        }
    }
}

impl<R: Recycler> DerefMut for Pooled<R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.object {
            Some(object) => object,
            None => unreachable!("pooled object accessed after release"),
        }
    }
}

impl<R: Recycler> Drop for Pooled<R> {
    fn drop(&mut self) {
        if let Some(object) = self.object.take() {
            self.shared.release(object);
        }
    }
}

impl<R: Recycler> fmt::Debug for Pooled<R>
where
    R::Object: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled").field(&self.object).finish()
    }
}
