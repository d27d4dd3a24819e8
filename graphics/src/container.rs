//! Per-submission ownership bag.
//!
//! GPU commands execute asynchronously, one or more frames behind the CPU. A
//! descriptor set bound into a command buffer must stay out of its pool until
//! the GPU is done with that command buffer, not only until recording ends.
//!
//! A [`ResourceContainer`] belongs to one frame slot. Node callbacks register
//! everything their commands reference, and the frame scheduler drops the
//! whole container once the slot's fence is observed signaled:
//!
//! ```text
//! record:    callback ──add_resource──► container (slot N)
//! submit:    container travels with the slot
//! fence N:   signaled ──► container dropped ──► sets back in their pool
//! ```
//!
//! There is no way to take a single resource back out.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

enum Entry {
    Shared(Box<dyn Any + Send + Sync>),
    Deferred(Box<dyn FnOnce() + Send>),
}

/// An unordered bag of strong references released in bulk.
#[derive(Default)]
pub struct ResourceContainer {
    entries: Vec<Entry>,
}

impl ResourceContainer {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep a shared resource alive until the container is released.
    pub fn add_resource<T>(&mut self, resource: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.entries.push(Entry::Shared(Box::new(resource)));
    }

    /// Take ownership of a resource until the container is released.
    pub fn add_owned<T>(&mut self, resource: T)
    where
        T: Send + Sync + 'static,
    {
        self.entries.push(Entry::Shared(Box::new(resource)));
    }

    /// Keep several resources alive at once.
    ///
    /// Accepts an `Arc`, a `Vec` of `Arc`s, or a tuple of those.
    pub fn add_resources<B: ResourceBundle>(&mut self, resources: B) {
        resources.add_to(self);
    }

    /// Run `release` when the container is released.
    pub fn defer<F>(&mut self, release: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.entries.push(Entry::Deferred(Box::new(release)));
    }

    /// Move every entry of `other` into this container.
    pub fn inherit(&mut self, mut other: ResourceContainer) {
        self.entries.append(&mut other.entries);
    }

    /// Number of held entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the container holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry and run deferred releases, in insertion order.
    pub(crate) fn release(&mut self) {
        if self.entries.is_empty() {
            return;
        }

        log::trace!("ResourceContainer: releasing {} entries", self.entries.len());
        for entry in self.entries.drain(..) {
            match entry {
                Entry::Shared(resource) => drop(resource),
                Entry::Deferred(release) => release(),
            }
        }
    }
}

impl Drop for ResourceContainer {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ResourceContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let deferred = self
            .entries
            .iter()
            .filter(|entry| matches!(entry, Entry::Deferred(_)))
            .count();
        f.debug_struct("ResourceContainer")
            .field("shared", &(self.entries.len() - deferred))
            .field("deferred", &deferred)
            .finish()
    }
}

/// One or more strong references accepted by [`ResourceContainer::add_resources`].
pub trait ResourceBundle {
    fn add_to(self, container: &mut ResourceContainer);
}

impl<T> ResourceBundle for Arc<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    fn add_to(self, container: &mut ResourceContainer) {
        container.add_resource(self);
    }
}

impl<T> ResourceBundle for Vec<Arc<T>>
where
    T: ?Sized + Send + Sync + 'static,
{
    fn add_to(self, container: &mut ResourceContainer) {
        container.entries.reserve(self.len());
        for resource in self {
            container.add_resource(resource);
        }
    }
}

macro_rules! impl_bundle_for_tuple {
    ($($name:ident),+) => {
        impl<$($name: ResourceBundle),+> ResourceBundle for ($($name,)+) {
            #[allow(non_snake_case)]
            fn add_to(self, container: &mut ResourceContainer) {
                let ($($name,)+) = self;
                $($name.add_to(container);)+
            }
        }
    };
}

impl_bundle_for_tuple!(A);
impl_bundle_for_tuple!(A, B);
impl_bundle_for_tuple!(A, B, C);
impl_bundle_for_tuple!(A, B, C, D);
impl_bundle_for_tuple!(A, B, C, D, E);
impl_bundle_for_tuple!(A, B, C, D, E, F);
impl_bundle_for_tuple!(A, B, C, D, E, F, G);
impl_bundle_for_tuple!(A, B, C, D, E, F, G, H);
