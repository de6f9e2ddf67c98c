//! The per-operation execution context.
//!
//! A [`Context`] is created for each top-level GraphQL operation and dropped
//! when that operation finishes. It owns every request-scoped capability the
//! resolvers need, most importantly the batched loaders: a loader registered
//! here caches for exactly one operation, so one caller's authorized data can
//! never leak into another operation through a shared cache.

use std::any::Any;
use std::any::TypeId;
use std::sync::Arc;

use dashmap::DashMap;

/// Holds request-scoped state for one GraphQL operation.
///
/// Values are keyed by type. Retrieval clones, so anything expensive to clone
/// should be stored wrapped in an `Arc` (loaders already are internally).
#[derive(Clone, Default)]
pub struct Context {
    extensions: Arc<DashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Context {
    /// Creates an empty context for a new operation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value into the context.
    /// If a value of the same type already exists, it is replaced.
    pub fn insert<T: Clone + Send + Sync + 'static>(&self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Gets a value from the context by type. The value is cloned out.
    pub fn get<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        let value = self.extensions.get(&TypeId::of::<T>())?.value().clone();
        value.downcast::<T>().ok().map(|value| (*value).clone())
    }

    /// Gets a value from the context, inserting the result of `init` first if
    /// the type is not present yet.
    ///
    /// This is how resolvers obtain per-request loaders: the first resolver to
    /// ask constructs the loader, every later resolver shares it (and its
    /// request cache).
    pub fn get_or_insert_with<T, F>(&self, init: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let value = self
            .extensions
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Arc::new(init()))
            .value()
            .clone();
        value
            .downcast::<T>()
            .ok()
            .map(|value| (*value).clone())
            .expect("value is keyed by its own type id")
    }

    /// Removes a value from the context.
    pub fn remove<T: Clone + Send + Sync + 'static>(&self) {
        self.extensions.remove(&TypeId::of::<T>());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, PartialEq, Debug)]
    struct RequestUser(String);

    #[test]
    fn stores_and_retrieves_by_type() {
        let context = Context::new();
        context.insert(RequestUser("user-1".to_string()));
        context.insert(42_u64);

        assert_eq!(context.get::<RequestUser>(), Some(RequestUser("user-1".to_string())));
        assert_eq!(context.get::<u64>(), Some(42));

        context.remove::<u64>();
        assert_eq!(context.get::<u64>(), None);
    }

    #[test]
    fn get_or_insert_with_initializes_once() {
        let context = Context::new();
        let first = context.get_or_insert_with(|| RequestUser("first".to_string()));
        let second = context.get_or_insert_with(|| RequestUser("second".to_string()));
        assert_eq!(first, second);
    }

    #[test]
    fn contexts_do_not_share_state() {
        let a = Context::new();
        let b = Context::new();
        a.insert(RequestUser("user-a".to_string()));
        assert_eq!(b.get::<RequestUser>(), None);
    }
}
