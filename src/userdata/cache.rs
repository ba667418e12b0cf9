//! Process-wide cache of compiled bindings.
//!
//! Bindings are compiled at most once per host type and shared by every state in the
//! process. The cache is insert-once/read-many: lookups are lock-free reads of a
//! [`DashMap`], and a type compiled concurrently by two threads keeps whichever binding was
//! inserted first.

use std::{
    any::TypeId,
    sync::{Arc, LazyLock},
};

use dashmap::{mapref::entry::Entry, DashMap};

use crate::{
    userdata::{BindingBuilder, ReflectedBinding, UserData},
    Result,
};

static BINDINGS: LazyLock<DashMap<TypeId, Arc<ReflectedBinding>>> = LazyLock::new(DashMap::new);

/// Returns the binding of `T`, compiling it on first use.
///
/// Repeated calls return the same `Arc` (see [`Arc::ptr_eq`]).
///
/// # Errors
///
/// Returns the validation error of [`BindingBuilder::build`] if `T` declares an invalid
/// member set. Nothing is cached in that case.
pub fn binding_for<T: UserData>() -> Result<Arc<ReflectedBinding>> {
    let id = TypeId::of::<T>();
    if let Some(existing) = BINDINGS.get(&id) {
        return Ok(existing.value().clone());
    }

    // compiled outside the map lock: register() may itself request other bindings
    let mut builder = BindingBuilder::<T>::new();
    T::register(&mut builder);
    let compiled = Arc::new(builder.build()?);

    let binding = match BINDINGS.entry(id) {
        Entry::Occupied(entry) => entry.get().clone(),
        Entry::Vacant(entry) => {
            log::debug!(
                "compiled binding '{}' ({} fields, {} methods, {} operators)",
                compiled.name(),
                compiled.fields().len(),
                compiled.methods().len(),
                compiled.operators().count()
            );
            entry.insert(compiled.clone());
            compiled
        }
    };
    Ok(binding)
}

/// Returns `true` if the binding of `T` has been compiled.
pub fn is_registered<T: UserData>() -> bool {
    BINDINGS.contains_key(&TypeId::of::<T>())
}

/// Number of compiled bindings in the process.
pub fn registered_count() -> usize {
    BINDINGS.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    struct Probe;

    impl UserData for Probe {
        fn register(b: &mut BindingBuilder<Self>) {
            b.function("ping", |(): ()| Ok("pong"));
        }
    }

    struct Broken;

    impl UserData for Broken {
        fn register(b: &mut BindingBuilder<Self>) {
            b.function("twice", |(): ()| Ok(1.0))
                .function("twice", |(): ()| Ok(2.0));
        }
    }

    #[test]
    fn test_binding_is_compiled_once() {
        let first = binding_for::<Probe>().unwrap();
        let second = binding_for::<Probe>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(is_registered::<Probe>());
        assert!(registered_count() >= 1);
    }

    #[test]
    fn test_concurrent_registration_converges() {
        let handles: Vec<_> = (0..8)
            .map(|_| thread::spawn(|| binding_for::<Probe>().unwrap()))
            .collect();
        let bindings: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect();
        for binding in &bindings[1..] {
            assert!(Arc::ptr_eq(&bindings[0], binding));
        }
    }

    #[test]
    fn test_invalid_binding_is_not_cached() {
        assert!(binding_for::<Broken>().is_err());
        assert!(!is_registered::<Broken>());
    }
}
