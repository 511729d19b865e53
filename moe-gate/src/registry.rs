//! Named op registry.
//!
//! Maps `(op_name, TypeId)` to a typed function pointer plus a doc string,
//! so host bindings can look up an op by the name they expose it under.
//!
//! - [`register`] stores a function pointer for a name + type.
//! - [`get`] retrieves it (returns `None` if nothing matches).
//! - [`init`] runs all deferred registrations collected via `inventory`.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{LazyLock, PoisonError, RwLock};

use crate::routing::{TopkRouting, TopkSoftmaxParams, TOPK_SOFTMAX};
use crate::{Error, Result};

/// Function pointer type of a `topk_softmax` implementation for tensor `T`.
pub type TopkSoftmaxFn<T> = fn(&T, &TopkSoftmaxParams) -> Result<TopkRouting<T>>;

struct Entry {
    func: Box<dyn Any + Send + Sync>,
    doc: &'static str,
}

/// Key: (op name, function pointer `TypeId`).
type RegistryMap = HashMap<(&'static str, TypeId), Entry>;

static REGISTRY: LazyLock<RwLock<RegistryMap>> = LazyLock::new(|| RwLock::new(HashMap::new()));

/// Register a function pointer under `name`.
///
/// `T` is the concrete function pointer type, e.g. [`TopkSoftmaxFn<CpuTensor>`].
/// Registering the same `(name, T)` again replaces the previous entry.
pub fn register<T: Any + Send + Sync + Copy>(name: &'static str, doc: &'static str, f: T) {
    let key = (name, TypeId::of::<T>());
    let mut map = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    if map.insert(key, Entry { func: Box::new(f), doc }).is_none() {
        tracing::debug!(op = name, "registered op");
    }
}

/// Look up the function registered under `name` with type `T`.
///
/// Returns `None` if no op of that name and type was registered.
pub fn get<T: Any + Copy>(name: &str) -> Option<T> {
    let map = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
    let found = map
        .iter()
        .find(|((n, ty), _)| *n == name && *ty == TypeId::of::<T>())
        .and_then(|(_, entry)| entry.func.downcast_ref::<T>())
        .copied();
    found
}

/// Doc string of the op registered under `name`, if any.
#[must_use]
pub fn doc(name: &str) -> Option<&'static str> {
    let map = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
    let found = map
        .iter()
        .find(|((n, _), _)| *n == name)
        .map(|(_, entry)| entry.doc);
    found
}

/// Sorted, de-duplicated names of all registered ops.
#[must_use]
pub fn names() -> Vec<&'static str> {
    let map = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
    let mut names: Vec<&'static str> = map.keys().map(|(n, _)| *n).collect();
    names.sort_unstable();
    names.dedup();
    names
}

/// Look up `topk_softmax` for tensor type `T` and call it.
///
/// # Errors
/// Returns `OpNotFound` if no implementation for `T` is registered, and
/// otherwise forwards the op's own result unchanged.
pub fn call_topk_softmax<T: 'static>(
    gating_output: &T,
    params: &TopkSoftmaxParams,
) -> Result<TopkRouting<T>> {
    let op = get::<TopkSoftmaxFn<T>>(TOPK_SOFTMAX).ok_or_else(|| {
        Error::OpNotFound(format!(
            "{TOPK_SOFTMAX} for {}",
            std::any::type_name::<T>()
        ))
    })?;
    op(gating_output, params)
}

/// A deferred op registration collected across crates at link time.
///
/// Each `define_op!` invocation submits one of these.
pub struct OpInit(pub fn());

inventory::collect!(OpInit);

/// Run all op registrations.
///
/// Call once at load time before looking ops up. Calling it again just
/// re-registers the same entries.
pub fn init() {
    let mut count = 0usize;
    for entry in inventory::iter::<OpInit> {
        (entry.0)();
        count += 1;
    }
    tracing::info!(count, ops = ?names(), "op registry initialised");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_get() {
        type AddFn = fn(i32, i32) -> i32;
        let f: AddFn = |a, b| a + b;
        register::<AddFn>("test_add", "adds", f);

        let retrieved = get::<AddFn>("test_add").expect("registered");
        assert_eq!(retrieved(2, 3), 5);
        assert_eq!(doc("test_add"), Some("adds"));
        assert!(names().contains(&"test_add"));
    }

    #[test]
    fn test_get_missing() {
        type MulFn = fn(i32, i32) -> i32;
        assert!(get::<MulFn>("nonexistent_op").is_none());
        assert!(doc("nonexistent_op").is_none());
    }

    #[test]
    fn test_type_mismatch_returns_none() {
        type AddFn = fn(i32, i32) -> i32;
        type OtherFn = fn(f32, f32) -> f32;

        let f: AddFn = |a, b| a + b;
        register::<AddFn>("test_typed", "typed", f);

        assert!(get::<OtherFn>("test_typed").is_none());
        assert!(get::<AddFn>("test_typed").is_some());
    }

    #[test]
    fn test_reregister_replaces() {
        type ConstFn = fn() -> u8;
        register::<ConstFn>("test_replace", "first", || 1);
        register::<ConstFn>("test_replace", "second", || 2);
        assert_eq!(get::<ConstFn>("test_replace").unwrap()(), 2);
        assert_eq!(doc("test_replace"), Some("second"));
    }

    #[test]
    fn test_call_topk_softmax_missing_impl() {
        struct Unregistered;
        let err = call_topk_softmax(&Unregistered, &TopkSoftmaxParams::new(1))
            .err()
            .expect("no impl registered");
        assert!(matches!(err, Error::OpNotFound(_)));
    }

    inventory::submit! {
        OpInit(|| register::<fn() -> &'static str>("test_inventory_op", "deferred", || "ok"))
    }

    #[test]
    fn test_init_runs_inventory() {
        init();
        let op = get::<fn() -> &'static str>("test_inventory_op").expect("registered by init");
        assert_eq!(op(), "ok");
        assert_eq!(doc("test_inventory_op"), Some("deferred"));

        // Running again re-registers the same entry.
        init();
        assert!(get::<fn() -> &'static str>("test_inventory_op").is_some());
    }
}
